use std::{cmp::Ordering, fmt};

use dashmap::DashMap;

use crate::session::PlayerId;

pub const ANONYMOUS: &str = "Anonymous";

/// `correct / max(total, 1) * 100`, rounded to one decimal.
pub fn percentage(correct: u32, total: u32) -> f64 {
    let ratio = f64::from(correct) / f64::from(total.max(1));
    (ratio * 1000.0).round() / 10.0
}

/// Cumulative tally for one player over the process lifetime.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScoreRecord {
    display_name: String,
    correct: u32,
    incorrect: u32,
}

impl ScoreRecord {
    fn new(display_name: Option<&str>) -> Self {
        Self {
            display_name: display_name.unwrap_or(ANONYMOUS).to_owned(),
            correct: 0,
            incorrect: 0,
        }
    }

    pub fn display_name(&self) -> &str {
        &self.display_name
    }

    pub fn correct(&self) -> u32 {
        self.correct
    }

    pub fn incorrect(&self) -> u32 {
        self.incorrect
    }

    pub fn total(&self) -> u32 {
        self.correct + self.incorrect
    }

    pub fn percentage(&self) -> f64 {
        percentage(self.correct, self.total())
    }

    pub fn level(&self) -> SkillLevel {
        SkillLevel::from_percentage(self.percentage())
    }

    /// Orders by accuracy, then by raw correct count, best first. Accuracy is
    /// compared exactly by cross-multiplying rather than on the rounded value.
    fn rank_cmp(&self, other: &Self) -> Ordering {
        let ours = u64::from(self.correct) * u64::from(other.total().max(1));
        let theirs = u64::from(other.correct) * u64::from(self.total().max(1));
        theirs
            .cmp(&ours)
            .then_with(|| other.correct.cmp(&self.correct))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum SkillLevel {
    Beginner,
    Basic,
    Good,
    Advanced,
    Expert,
}

impl SkillLevel {
    pub fn from_percentage(percentage: f64) -> Self {
        match percentage {
            p if p >= 90.0 => SkillLevel::Expert,
            p if p >= 75.0 => SkillLevel::Advanced,
            p if p >= 60.0 => SkillLevel::Good,
            p if p >= 40.0 => SkillLevel::Basic,
            _ => SkillLevel::Beginner,
        }
    }
}

impl fmt::Display for SkillLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SkillLevel::Beginner => "Beginner",
            SkillLevel::Basic => "Basic",
            SkillLevel::Good => "Good",
            SkillLevel::Advanced => "Advanced",
            SkillLevel::Expert => "Expert",
        };
        f.write_str(name)
    }
}

/// One row of the leaderboard.
#[derive(Debug, Clone, PartialEq)]
pub struct Standing {
    pub rank: usize,
    pub player: PlayerId,
    pub display_name: String,
    pub correct: u32,
    pub total: u32,
    pub percentage: f64,
}

#[derive(Debug, Default)]
pub struct ScoreBoard {
    records: DashMap<PlayerId, ScoreRecord>,
}

impl ScoreBoard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Counts one resolved question for `player`, creating the record on
    /// first use. A provided name replaces the stored one.
    pub fn record_outcome(&self, player: PlayerId, display_name: Option<&str>, correct: bool) -> ScoreRecord {
        let mut record = self
            .records
            .entry(player)
            .or_insert_with(|| ScoreRecord::new(display_name));

        if let Some(name) = display_name {
            if record.display_name != name {
                record.display_name = name.to_owned();
            }
        }
        if correct {
            record.correct += 1;
        } else {
            record.incorrect += 1;
        }

        tracing::debug!(
            %player,
            correct = record.correct,
            total = record.total(),
            "score updated"
        );
        record.clone()
    }

    pub fn record(&self, player: PlayerId) -> Option<ScoreRecord> {
        self.records.get(&player).map(|record| record.clone())
    }

    /// 0.0 for a player with no history.
    pub fn percentage_for(&self, player: PlayerId) -> f64 {
        self.records
            .get(&player)
            .map(|record| record.percentage())
            .unwrap_or(0.0)
    }

    /// Top `limit` players by accuracy, ties broken by correct count.
    pub fn leaderboard(&self, limit: usize) -> Vec<Standing> {
        let mut records: Vec<(PlayerId, ScoreRecord)> = self
            .records
            .iter()
            .map(|entry| (*entry.key(), entry.value().clone()))
            .collect();

        records.sort_by(|(a_id, a), (b_id, b)| a.rank_cmp(b).then_with(|| a_id.cmp(b_id)));

        records
            .into_iter()
            .take(limit)
            .enumerate()
            .map(|(index, (player, record))| Standing {
                rank: index + 1,
                player,
                percentage: record.percentage(),
                correct: record.correct(),
                total: record.total(),
                display_name: record.display_name,
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seed(board: &ScoreBoard, player: i64, name: &str, correct: u32, incorrect: u32) {
        for _ in 0..correct {
            board.record_outcome(PlayerId(player), Some(name), true);
        }
        for _ in 0..incorrect {
            board.record_outcome(PlayerId(player), Some(name), false);
        }
    }

    #[test]
    fn percentage_rounds_to_one_decimal() {
        assert_eq!(percentage(7, 10), 70.0);
        assert_eq!(percentage(0, 0), 0.0);
        assert_eq!(percentage(1, 3), 33.3);
        assert_eq!(percentage(2, 3), 66.7);
    }

    #[test]
    fn percentage_for_unknown_player_is_zero() {
        let board = ScoreBoard::new();
        assert_eq!(board.percentage_for(PlayerId(404)), 0.0);

        seed(&board, 1, "ann", 7, 3);
        assert_eq!(board.percentage_for(PlayerId(1)), 70.0);
    }

    #[test]
    fn total_always_matches_counters() {
        let board = ScoreBoard::new();
        seed(&board, 1, "ann", 4, 6);

        let record = board.record(PlayerId(1)).unwrap();
        assert_eq!(record.correct(), 4);
        assert_eq!(record.incorrect(), 6);
        assert_eq!(record.total(), record.correct() + record.incorrect());
    }

    #[test]
    fn missing_name_defaults_and_later_name_wins() {
        let board = ScoreBoard::new();
        board.record_outcome(PlayerId(5), None, false);
        assert_eq!(board.record(PlayerId(5)).unwrap().display_name(), ANONYMOUS);

        board.record_outcome(PlayerId(5), Some("bob"), true);
        assert_eq!(board.record(PlayerId(5)).unwrap().display_name(), "bob");

        board.record_outcome(PlayerId(5), None, true);
        assert_eq!(board.record(PlayerId(5)).unwrap().display_name(), "bob");
    }

    #[test]
    fn leaderboard_orders_by_percentage_then_correct() {
        let board = ScoreBoard::new();
        seed(&board, 1, "A", 4, 1); // 80%, 4 correct
        seed(&board, 2, "B", 8, 2); // 80%, 8 correct
        seed(&board, 3, "C", 9, 1); // 90%, 9 correct

        let names: Vec<String> = board
            .leaderboard(10)
            .into_iter()
            .map(|standing| standing.display_name)
            .collect();
        assert_eq!(names, ["C", "B", "A"]);
    }

    #[test]
    fn leaderboard_respects_limit_and_ranks() {
        let board = ScoreBoard::new();
        seed(&board, 1, "A", 1, 0);
        seed(&board, 2, "B", 2, 0);
        seed(&board, 3, "C", 0, 3);

        let top = board.leaderboard(2);
        assert_eq!(top.len(), 2);
        assert_eq!(top[0].display_name, "B");
        assert_eq!(top[0].rank, 1);
        assert_eq!(top[1].display_name, "A");
        assert_eq!(top[1].rank, 2);
        assert!(board.leaderboard(0).is_empty());
    }

    #[test]
    fn skill_levels_follow_thresholds() {
        assert_eq!(SkillLevel::from_percentage(95.0), SkillLevel::Expert);
        assert_eq!(SkillLevel::from_percentage(75.0), SkillLevel::Advanced);
        assert_eq!(SkillLevel::from_percentage(60.0), SkillLevel::Good);
        assert_eq!(SkillLevel::from_percentage(40.0), SkillLevel::Basic);
        assert_eq!(SkillLevel::from_percentage(39.9), SkillLevel::Beginner);
    }
}
