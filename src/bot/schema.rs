use std::sync::Arc;

use teloxide::{
    dispatching::{dialogue::GetChatId, UpdateFilterExt, UpdateHandler},
    dptree,
    payloads::SendMessageSetters,
    prelude::Requester,
    types::{CallbackQuery, Message, Update},
    Bot,
};
use tracing::instrument;

use crate::{
    bot::{
        commands::{self, Command},
        keyboard::{
            action_keyboard, parse_answer, ANSWER_PREFIX, MENU_HELP, MENU_LEADERBOARD, MENU_LEVELS, MENU_QUICK, MENU_QUIZ,
            MENU_STATS, TIER_PREFIX,
        },
        HandlerResult, QuizEngine,
    },
    config::Config,
    engine::SubmitOutcome,
    selection::Tier,
    session::PlayerId,
    BoxError,
};

pub fn schema() -> UpdateHandler<BoxError> {
    use dptree::case;

    let command_handler = teloxide::filter_command::<Command, _>()
        .branch(case![Command::Help].endpoint(commands::help))
        .branch(case![Command::Start].endpoint(commands::start))
        .branch(case![Command::Quiz].endpoint(commands::quiz))
        .branch(case![Command::Quick].endpoint(commands::quick))
        .branch(case![Command::Levels].endpoint(commands::levels))
        .branch(case![Command::Stats].endpoint(commands::stats))
        .branch(case![Command::Leaderboard].endpoint(commands::leaderboard))
        .branch(case![Command::Cancel].endpoint(commands::cancel));

    let message_handler = Update::filter_message()
        .branch(command_handler)
        .endpoint(choose_what_to_do);

    let callback_handler = Update::filter_callback_query().endpoint(take_callback);

    dptree::entry()
        .branch(message_handler)
        .branch(callback_handler)
}

/// Main-menu buttons. Any other text is taken as a typed answer while a
/// question is open.
async fn choose_what_to_do(bot: Bot, msg: Message, engine: QuizEngine, config: Arc<Config>) -> HandlerResult {
    let text = msg.text().map(str::to_owned);
    match text.as_deref() {
        Some(MENU_QUIZ) => commands::quiz(bot, msg, engine).await?,
        Some(MENU_QUICK) => commands::quick(bot, msg, engine).await?,
        Some(MENU_LEVELS) => commands::levels(bot, msg).await?,
        Some(MENU_STATS) => commands::stats(bot, msg, engine).await?,
        Some(MENU_LEADERBOARD) => commands::leaderboard(bot, msg, engine, config).await?,
        Some(MENU_HELP) => commands::help(bot, msg).await?,
        Some(text) if engine.has_session(PlayerId(msg.chat.id.0)) => {
            let outcome = engine.submit_answer(PlayerId(msg.chat.id.0), text).await?;
            if outcome == SubmitOutcome::NoActiveQuestion {
                bot.send_message(msg.chat.id, "⌛ Please wait for the next question.")
                    .await?;
            }
        }
        other => invalid_input(bot, msg, other).await?,
    }

    Ok(())
}

#[instrument(level = "info", skip(bot, msg))]
async fn invalid_input(bot: Bot, msg: Message, text: Option<&str>) -> HandlerResult {
    tracing::info!(chat = %msg.chat.id, "unhandled input");
    bot.send_message(
        msg.chat.id,
        "Unable to handle the message. Enter /help to see usages.",
    )
    .reply_markup(action_keyboard())
    .await?;
    Ok(())
}

#[instrument(level = "info", skip(bot, q, engine), fields(data = ?q.data))]
async fn take_callback(bot: Bot, q: CallbackQuery, engine: QuizEngine) -> HandlerResult {
    bot.answer_callback_query(&q.id).await?;

    let Some(chat_id) = q.chat_id() else {
        tracing::warn!("callback query without a chat");
        return Ok(());
    };
    let data = q.data.as_deref().unwrap_or_default();

    if let Some(answer) = data.strip_prefix(ANSWER_PREFIX) {
        let Some((index, label)) = parse_answer(answer) else {
            tracing::warn!("malformed answer callback");
            return Ok(());
        };
        let outcome = engine.submit_answer_at(PlayerId(chat_id.0), index, label).await?;
        if outcome == SubmitOutcome::NoActiveQuestion {
            bot.send_message(chat_id, "⌛ This question is already closed.")
                .await?;
        }
    } else if let Some(tier) = data.strip_prefix(TIER_PREFIX) {
        match tier.parse::<Tier>() {
            Ok(tier) => {
                let name = commands::player_name(Some(q.from.first_name.as_str()), q.from.username.as_deref());
                commands::start_tier(&bot, chat_id, name, tier, &engine).await?
            }
            Err(err) => tracing::warn!(error = %err, "unknown tier in callback"),
        }
    } else {
        tracing::warn!("unrecognized callback data");
    }

    Ok(())
}
