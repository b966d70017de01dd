use std::{fmt, str::FromStr};

use rand::{seq::SliceRandom, Rng};

use crate::question::{Difficulty, Question};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QuestionFilter {
    Any,
    Difficulty(Difficulty),
    /// Case-insensitive topic match.
    Topic(String),
}

impl QuestionFilter {
    pub fn matches(&self, question: &Question) -> bool {
        match self {
            QuestionFilter::Any => true,
            QuestionFilter::Difficulty(difficulty) => question.difficulty() == *difficulty,
            QuestionFilter::Topic(topic) => question
                .topic()
                .is_some_and(|candidate| candidate.trim().to_lowercase() == topic.trim().to_lowercase()),
        }
    }
}

/// Difficulty presets offered by the levels menu.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tier {
    Basic,
    Medium,
    Hard,
    Expert,
}

impl Tier {
    pub const ALL: [Tier; 4] = [Tier::Basic, Tier::Medium, Tier::Hard, Tier::Expert];

    pub fn question_count(&self) -> usize {
        match self {
            Tier::Basic => 5,
            Tier::Medium => 10,
            Tier::Hard => 15,
            Tier::Expert => 20,
        }
    }

    pub fn filter(&self) -> QuestionFilter {
        match self {
            Tier::Basic => QuestionFilter::Difficulty(Difficulty::Easy),
            Tier::Medium => QuestionFilter::Difficulty(Difficulty::Medium),
            Tier::Hard => QuestionFilter::Difficulty(Difficulty::Hard),
            Tier::Expert => QuestionFilter::Any,
        }
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Tier::Basic => "basic",
            Tier::Medium => "medium",
            Tier::Hard => "hard",
            Tier::Expert => "expert",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown tier '{0}'")]
pub struct UnknownTier(String);

impl FromStr for Tier {
    type Err = UnknownTier;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Tier::ALL
            .into_iter()
            .find(|tier| tier.to_string().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| UnknownTier(s.to_owned()))
    }
}

/// How many questions a sequence asks and where they come from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selection {
    pub count: usize,
    pub filter: QuestionFilter,
    /// Keep drawing past the end of the filtered pool, reshuffling it once
    /// every question has been used. Without it `count` is clamped to the
    /// pool size.
    pub refill: bool,
}

impl Selection {
    pub fn new(count: usize, filter: QuestionFilter) -> Self {
        Self {
            count,
            filter,
            refill: false,
        }
    }

    pub fn with_refill(mut self) -> Self {
        self.refill = true;
        self
    }

    /// Five questions from the whole pool.
    pub fn quick_game() -> Self {
        Self::new(5, QuestionFilter::Any).with_refill()
    }

    /// Always the tier's full count, reusing its pool when it is smaller.
    pub fn for_tier(tier: Tier) -> Self {
        Self::new(tier.question_count(), tier.filter()).with_refill()
    }

    /// Draws the question list for a new sequence. Empty when nothing
    /// matches the filter.
    pub fn draw<R: Rng + ?Sized>(&self, pool: &[Question], rng: &mut R) -> Vec<Question> {
        let eligible: Vec<&Question> = pool.iter().filter(|question| self.filter.matches(question)).collect();
        if eligible.is_empty() {
            return Vec::new();
        }

        if !self.refill {
            return eligible
                .choose_multiple(rng, self.count)
                .map(|question| (*question).clone())
                .collect();
        }

        let mut drawn = Vec::with_capacity(self.count);
        let mut unused: Vec<&Question> = Vec::new();
        while drawn.len() < self.count {
            if unused.is_empty() {
                unused = eligible.clone();
                unused.shuffle(rng);
            }
            if let Some(question) = unused.pop() {
                drawn.push(question.clone());
            }
        }
        drawn
    }
}
