use std::sync::Arc;

use teloxide::{
    payloads::SendMessageSetters,
    prelude::Requester,
    types::{ChatId, Message, ParseMode},
    utils::command::BotCommands,
    Bot,
};
use tracing::instrument;

use crate::{
    bot::{
        keyboard::{action_keyboard, capitalize, tiers_keyboard},
        presenter::{render_leaderboard, render_stats},
        HandlerResult, QuizEngine,
    },
    config::Config,
    engine::{CancelOutcome, EngineError, Started},
    selection::{Selection, Tier},
    session::PlayerId,
};

#[derive(Debug, Clone, BotCommands)]
#[command(rename_rule = "lowercase", description = "These commands are supported:")]
pub enum Command {
    #[command(description = "display help.")]
    Help,
    #[command(description = "show the main menu.")]
    Start,
    #[command(description = "answer one random question.")]
    Quiz,
    #[command(description = "play a quick five-question game.")]
    Quick,
    #[command(description = "choose a difficulty level.")]
    Levels,
    #[command(description = "show your statistics.")]
    Stats,
    #[command(description = "show the best players.")]
    Leaderboard,
    #[command(description = "abandon the current quiz.")]
    Cancel,
}

/// Leaderboard name: first name, else username. Commands read it from the
/// private chat and button presses from the sender, which carry the same
/// fields.
pub(crate) fn player_name(first_name: Option<&str>, username: Option<&str>) -> Option<String> {
    first_name
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .or(username)
        .map(str::to_owned)
}

fn display_name(msg: &Message) -> Option<String> {
    player_name(msg.chat.first_name(), msg.chat.username())
}

pub(crate) async fn help(bot: Bot, msg: Message) -> HandlerResult {
    bot.send_message(msg.chat.id, Command::descriptions().to_string())
        .await?;
    Ok(())
}

pub(crate) async fn start(bot: Bot, msg: Message) -> HandlerResult {
    bot.send_message(
        msg.chat.id,
        "👋 Welcome to the quiz! Every question has a time limit, so answer quickly.\nPlease choose what to do:",
    )
    .reply_markup(action_keyboard())
    .await?;
    Ok(())
}

#[instrument(level = "info", skip(bot, msg, engine), fields(chat = %msg.chat.id))]
pub(crate) async fn quiz(bot: Bot, msg: Message, engine: QuizEngine) -> HandlerResult {
    let started = engine
        .start_single(PlayerId(msg.chat.id.0), display_name(&msg))
        .await;
    report_start(&bot, msg.chat.id, started).await
}

#[instrument(level = "info", skip(bot, msg, engine), fields(chat = %msg.chat.id))]
pub(crate) async fn quick(bot: Bot, msg: Message, engine: QuizEngine) -> HandlerResult {
    bot.send_message(msg.chat.id, "🎮 Quick game: 5 random questions!\n\n🚀 Let's go!")
        .await?;
    let started = engine
        .start_sequence(PlayerId(msg.chat.id.0), display_name(&msg), &Selection::quick_game())
        .await;
    report_start(&bot, msg.chat.id, started).await
}

pub(crate) async fn levels(bot: Bot, msg: Message) -> HandlerResult {
    bot.send_message(msg.chat.id, "🎯 Choose a difficulty level:")
        .reply_markup(tiers_keyboard())
        .await?;
    Ok(())
}

pub(crate) async fn stats(bot: Bot, msg: Message, engine: QuizEngine) -> HandlerResult {
    let record = engine.scoreboard().record(PlayerId(msg.chat.id.0));
    bot.send_message(msg.chat.id, render_stats(record.as_ref()))
        .reply_markup(action_keyboard())
        .parse_mode(ParseMode::Html)
        .await?;
    Ok(())
}

pub(crate) async fn leaderboard(bot: Bot, msg: Message, engine: QuizEngine, config: Arc<Config>) -> HandlerResult {
    let standings = engine.scoreboard().leaderboard(config.leaderboard_size);
    bot.send_message(msg.chat.id, render_leaderboard(&standings))
        .reply_markup(action_keyboard())
        .parse_mode(ParseMode::Html)
        .await?;
    Ok(())
}

#[instrument(level = "info", skip(bot, msg, engine), fields(chat = %msg.chat.id))]
pub(crate) async fn cancel(bot: Bot, msg: Message, engine: QuizEngine) -> HandlerResult {
    let text = match engine.cancel(PlayerId(msg.chat.id.0)) {
        CancelOutcome::Cancelled => "Quiz cancelled.",
        CancelOutcome::NoActiveSession => "There is no quiz to cancel.",
    };
    bot.send_message(msg.chat.id, text)
        .reply_markup(action_keyboard())
        .await?;
    Ok(())
}

#[instrument(level = "info", skip(bot, engine))]
pub(crate) async fn start_tier(
    bot: &Bot,
    chat_id: ChatId,
    display_name: Option<String>,
    tier: Tier,
    engine: &QuizEngine,
) -> HandlerResult {
    bot.send_message(
        chat_id,
        format!(
            "🎯 Level: {}\n📝 {} questions\n\n🚀 Let's go!",
            capitalize(&tier.to_string()),
            tier.question_count()
        ),
    )
    .await?;
    let started = engine
        .start_sequence(PlayerId(chat_id.0), display_name, &Selection::for_tier(tier))
        .await;
    report_start(bot, chat_id, started).await
}

/// An empty pool is reported to the player; anything else goes up to the
/// dispatcher's error handler.
async fn report_start(bot: &Bot, chat_id: ChatId, started: Result<Started, EngineError>) -> HandlerResult {
    match started {
        Ok(_) => Ok(()),
        Err(EngineError::NoQuestionsAvailable) => {
            bot.send_message(chat_id, "Sorry, no questions are available for that choice.")
                .reply_markup(action_keyboard())
                .await?;
            Ok(())
        }
        Err(err) => Err(err.into()),
    }
}
