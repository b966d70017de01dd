use teloxide::types::{InlineKeyboardButton, InlineKeyboardMarkup, KeyboardButton, KeyboardMarkup};

use crate::{question::Question, selection::Tier};

pub(crate) const ANSWER_PREFIX: &str = "answer:";
pub(crate) const TIER_PREFIX: &str = "tier:";

pub(crate) const MENU_QUIZ: &str = "🖋️ Test yourself";
pub(crate) const MENU_QUICK: &str = "🎮 Quick game";
pub(crate) const MENU_LEVELS: &str = "🎯 Difficulty levels";
pub(crate) const MENU_STATS: &str = "📊 My stats";
pub(crate) const MENU_LEADERBOARD: &str = "🏆 Leaderboard";
pub(crate) const MENU_HELP: &str = "❓ Help";

pub(crate) fn action_keyboard() -> KeyboardMarkup {
    let keyboard = vec![
        vec![KeyboardButton::new(MENU_QUIZ), KeyboardButton::new(MENU_QUICK)],
        vec![KeyboardButton::new(MENU_LEVELS), KeyboardButton::new(MENU_STATS)],
        vec![KeyboardButton::new(MENU_LEADERBOARD), KeyboardButton::new(MENU_HELP)],
    ];

    KeyboardMarkup::new(keyboard)
}

/// One button per option, in option order. Callback data is
/// `answer:<index>:<label>` so a press can be matched to its question.
pub(crate) fn answers_keyboard(question: &Question, index: usize) -> InlineKeyboardMarkup {
    let row: Vec<InlineKeyboardButton> = question
        .options()
        .iter()
        .map(|option| {
            InlineKeyboardButton::callback(option.label(), format!("{ANSWER_PREFIX}{index}:{}", option.label()))
        })
        .collect();

    InlineKeyboardMarkup::new(vec![row])
}

/// Splits the part after [`ANSWER_PREFIX`] into question index and label.
pub(crate) fn parse_answer(data: &str) -> Option<(usize, &str)> {
    let (index, label) = data.split_once(':')?;
    Some((index.parse().ok()?, label))
}

pub(crate) fn tiers_keyboard() -> InlineKeyboardMarkup {
    let keyboard = Tier::ALL.into_iter().map(|tier| {
        let marker = match tier {
            Tier::Basic => "🟢",
            Tier::Medium => "🟡",
            Tier::Hard => "🔴",
            Tier::Expert => "🏆",
        };
        let caption = format!("{marker} {} ({} questions)", capitalize(&tier.to_string()), tier.question_count());
        vec![InlineKeyboardButton::callback(caption, format!("{TIER_PREFIX}{tier}"))]
    });

    InlineKeyboardMarkup::new(keyboard)
}

pub(crate) fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
