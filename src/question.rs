use std::{fmt, fs, path::Path, time::Duration};

use serde::Deserialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Difficulty {
    Easy,
    Medium,
    Hard,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct AnswerOption {
    label: String,
    text: String,
}

/// A multiple-choice question. Immutable once loaded.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Question {
    prompt: String,
    options: Vec<AnswerOption>,
    answer: String,
    difficulty: Difficulty,
    /// Seconds the player has to answer.
    time_limit: u64,
    #[serde(default)]
    topic: Option<String>,
}

/// Read-only supplier of the question pool.
///
/// Filtering by difficulty or topic is done by the caller.
pub trait QuestionSource: Send + Sync + 'static {
    fn all_questions(&self) -> &[Question];
}

#[derive(Debug, thiserror::Error)]
pub enum QuestionBankError {
    #[error("failed to read question bank {path}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("question bank is not valid JSON")]
    Parse(#[from] serde_json::Error),

    #[error("question #{index} is invalid: {reason}")]
    Invalid { index: usize, reason: &'static str },
}

/// In-memory question pool, usually loaded from a JSON array on startup.
#[derive(Debug, Clone, Default)]
pub struct QuestionBank {
    questions: Vec<Question>,
}

impl fmt::Display for Difficulty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Difficulty::Easy => "easy",
            Difficulty::Medium => "medium",
            Difficulty::Hard => "hard",
        };
        f.write_str(name)
    }
}

impl fmt::Display for AnswerOption {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}) {}", self.label, self.text)
    }
}

impl fmt::Display for Question {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut options = String::new();
        for option in self.options() {
            options.push_str(&format!("{option}\n"));
        }

        write!(f, "{}\n\n{}", self.prompt(), options)
    }
}

impl AnswerOption {
    pub fn new(label: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            text: text.into(),
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn text(&self) -> &str {
        &self.text
    }
}

impl Question {
    pub fn new(
        prompt: impl Into<String>,
        options: Vec<AnswerOption>,
        answer: impl Into<String>,
        difficulty: Difficulty,
        time_limit_secs: u64,
        topic: Option<String>,
    ) -> Self {
        Self {
            prompt: prompt.into(),
            options,
            answer: answer.into(),
            difficulty,
            time_limit: time_limit_secs,
            topic,
        }
    }

    pub fn prompt(&self) -> &str {
        &self.prompt
    }

    pub fn options(&self) -> &[AnswerOption] {
        &self.options
    }

    /// Label of the correct option.
    pub fn answer(&self) -> &str {
        &self.answer
    }

    pub fn difficulty(&self) -> Difficulty {
        self.difficulty
    }

    pub fn time_limit(&self) -> Duration {
        Duration::from_secs(self.time_limit)
    }

    pub fn topic(&self) -> Option<&str> {
        self.topic.as_deref()
    }

    /// Labels are compared trimmed and case-insensitively.
    pub fn is_correct(&self, label: &str) -> bool {
        normalize(label) == normalize(&self.answer)
    }

    fn validate(&self) -> Result<(), &'static str> {
        if self.options.is_empty() {
            return Err("no answer options");
        }
        if self.time_limit == 0 {
            return Err("time limit must be positive");
        }
        if !self.options.iter().any(|option| self.is_correct(option.label())) {
            return Err("answer label does not match any option");
        }
        Ok(())
    }
}

fn normalize(label: &str) -> String {
    label.trim().to_lowercase()
}

impl QuestionBank {
    pub fn new(questions: Vec<Question>) -> Result<Self, QuestionBankError> {
        for (index, question) in questions.iter().enumerate() {
            question
                .validate()
                .map_err(|reason| QuestionBankError::Invalid { index, reason })?;
        }
        Ok(Self { questions })
    }

    pub fn from_json_str(json: &str) -> Result<Self, QuestionBankError> {
        let questions: Vec<Question> = serde_json::from_str(json)?;
        Self::new(questions)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, QuestionBankError> {
        let path = path.as_ref();
        let json = fs::read_to_string(path).map_err(|source| QuestionBankError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let bank = Self::from_json_str(&json)?;
        tracing::info!(path = %path.display(), questions = bank.len(), "question bank loaded");
        Ok(bank)
    }

    pub fn len(&self) -> usize {
        self.questions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.questions.is_empty()
    }
}

impl QuestionSource for QuestionBank {
    fn all_questions(&self) -> &[Question] {
        &self.questions
    }
}
