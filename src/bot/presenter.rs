use teloxide::{
    payloads::SendMessageSetters,
    prelude::Requester,
    types::{ChatId, ParseMode},
    utils::html,
    Bot,
};

use crate::{
    bot::keyboard::{action_keyboard, answers_keyboard},
    engine::{Achievement, AnswerReport, Presenter, SessionSummary, Speed, Verdict},
    question::{Difficulty, Question},
    scoreboard::{ScoreRecord, Standing},
    session::{PlayerId, SessionMode},
    BoxError,
};

/// Renders engine output as Telegram HTML messages.
#[derive(Clone)]
pub struct TelegramPresenter {
    bot: Bot,
}

impl TelegramPresenter {
    pub fn new(bot: Bot) -> Self {
        Self { bot }
    }
}

impl Presenter for TelegramPresenter {
    async fn deliver_question(
        &self,
        player: PlayerId,
        question: &Question,
        index: usize,
        total: usize,
        seconds_remaining: u64,
    ) -> Result<(), BoxError> {
        self.bot
            .send_message(ChatId(player.0), render_question(question, index, total, seconds_remaining))
            .reply_markup(answers_keyboard(question, index))
            .parse_mode(ParseMode::Html)
            .await?;
        Ok(())
    }

    async fn deliver_result(&self, player: PlayerId, report: &AnswerReport) -> Result<(), BoxError> {
        self.bot
            .send_message(ChatId(player.0), render_result(report))
            .parse_mode(ParseMode::Html)
            .await?;
        Ok(())
    }

    async fn deliver_summary(&self, player: PlayerId, summary: &SessionSummary) -> Result<(), BoxError> {
        self.bot
            .send_message(ChatId(player.0), render_summary(summary))
            .reply_markup(action_keyboard())
            .parse_mode(ParseMode::Html)
            .await?;
        Ok(())
    }
}

fn difficulty_marker(difficulty: Difficulty) -> &'static str {
    match difficulty {
        Difficulty::Easy => "🟢",
        Difficulty::Medium => "🟡",
        Difficulty::Hard => "🔴",
    }
}

pub(crate) fn render_question(question: &Question, index: usize, total: usize, seconds_remaining: u64) -> String {
    let mut text = String::new();
    if total > 1 {
        text.push_str(&format!("🎯 Question {}/{}\n\n", index + 1, total));
    }
    text.push_str(&format!(
        "🧠 {} {}\n\n",
        difficulty_marker(question.difficulty()),
        html::bold(&html::escape(question.prompt()))
    ));
    for option in question.options() {
        text.push_str(&html::escape(&option.to_string()));
        text.push('\n');
    }
    text.push_str(&format!(
        "\n⏰ You have {} seconds to answer!",
        html::bold(&seconds_remaining.to_string())
    ));
    text
}

pub(crate) fn render_result(report: &AnswerReport) -> String {
    let correct = html::bold(&html::escape(&report.correct_label));
    let mut text = match report.verdict {
        Verdict::Correct => {
            let badge = match report.speed {
                Speed::Fast => " ⚡ Fast answer!",
                Speed::Good => " 👍 Good speed!",
                Speed::Normal => "",
            };
            format!("✅ Correct!{badge}")
        }
        Verdict::Incorrect => format!("❌ Wrong. Correct answer: {correct}"),
        Verdict::TimedOut => format!("⏰ Time's up! Correct answer: {correct}"),
    };

    if report.verdict != Verdict::TimedOut {
        text.push_str(&format!(
            "\n⏱️ Answer time: {}s of {}s",
            report.elapsed_seconds(),
            report.time_limit.as_secs()
        ));
    }
    if report.total > 1 {
        text.push_str(&format!("\n📊 Progress: {}/{}", report.index + 1, report.total));
    }
    text
}

pub(crate) fn render_summary(summary: &SessionSummary) -> String {
    let mut text = match summary.mode {
        SessionMode::Single => String::new(),
        SessionMode::Sequence => {
            let mut text = format!(
                "🏁 Session complete!\n📊 Result: {}/{} ({}%)\n",
                summary.correct, summary.total, summary.percentage
            );
            match summary.achievement {
                Achievement::Perfect => text.push_str("🏆 Perfect score!\n"),
                Achievement::Excellent => text.push_str("🥇 Excellent result!\n"),
                Achievement::Good => text.push_str("🥈 Good result!\n"),
                Achievement::None => {}
            }
            text.push('\n');
            text
        }
    };

    if let Some(record) = &summary.record {
        text.push_str(&render_record(record));
    }
    text
}

fn render_record(record: &ScoreRecord) -> String {
    format!(
        "📈 Overall: {} correct of {} ({}%)",
        record.correct(),
        record.total(),
        record.percentage()
    )
}

pub(crate) fn render_stats(record: Option<&ScoreRecord>) -> String {
    let Some(record) = record else {
        return "📊 You have no statistics yet. Start a quiz!".to_owned();
    };

    format!(
        "📊 <b>Your statistics</b>\n\n👤 Name: {}\n✅ Correct: {}\n❌ Incorrect: {}\n📝 Total: {}\n📈 Accuracy: {}%\n\n🏅 Level: <b>{}</b>",
        html::escape(record.display_name()),
        record.correct(),
        record.incorrect(),
        record.total(),
        record.percentage(),
        record.level()
    )
}

pub(crate) fn render_leaderboard(standings: &[Standing]) -> String {
    if standings.is_empty() {
        return "🏆 The leaderboard is empty. Start a quiz to get on it!".to_owned();
    }

    let mut text = format!("🏆 Top {} players:\n\n", standings.len());
    for standing in standings {
        text.push_str(&format!(
            "{}. {} - {}% ({}/{})\n",
            standing.rank,
            html::escape(&standing.display_name),
            standing.percentage,
            standing.correct,
            standing.total
        ));
    }
    text
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::{question::AnswerOption, scoreboard::ScoreBoard};

    fn record(correct: u32, incorrect: u32) -> ScoreRecord {
        let board = ScoreBoard::new();
        for _ in 0..correct {
            board.record_outcome(PlayerId(1), Some("ann"), true);
        }
        for _ in 0..incorrect {
            board.record_outcome(PlayerId(1), Some("ann"), false);
        }
        board.record(PlayerId(1)).unwrap()
    }

    #[test]
    fn question_text_escapes_html_and_shows_progress() {
        let question = Question::new(
            "Is 1 < 2?",
            vec![AnswerOption::new("A", "yes"), AnswerOption::new("B", "no")],
            "A",
            Difficulty::Easy,
            15,
            None,
        );

        let text = render_question(&question, 1, 3, 15);
        assert!(text.starts_with("🎯 Question 2/3"));
        assert!(text.contains("Is 1 &lt; 2?"));
        assert!(text.contains("A) yes"));
        assert!(text.contains("<b>15</b> seconds"));
    }

    #[test]
    fn timeout_result_names_correct_label() {
        let report = AnswerReport {
            verdict: Verdict::TimedOut,
            given: None,
            correct_label: "C".into(),
            elapsed: Duration::from_secs(10),
            time_limit: Duration::from_secs(10),
            speed: Speed::Normal,
            index: 0,
            total: 1,
            record: record(0, 1),
        };

        let text = render_result(&report);
        assert_eq!(text, "⏰ Time's up! Correct answer: <b>C</b>");
    }

    #[test]
    fn sequence_summary_mentions_achievement() {
        let summary = SessionSummary {
            mode: SessionMode::Sequence,
            correct: 4,
            total: 5,
            percentage: 80.0,
            achievement: Achievement::Excellent,
            record: Some(record(4, 1)),
        };

        let text = render_summary(&summary);
        assert!(text.contains("4/5 (80%)"));
        assert!(text.contains("Excellent"));
        assert!(text.contains("📈 Overall: 4 correct of 5 (80%)"));
    }

    #[test]
    fn empty_views_have_friendly_text() {
        assert!(render_stats(None).contains("no statistics"));
        assert!(render_leaderboard(&[]).contains("empty"));
    }
}
