use std::sync::Arc;

use quizbot::{
    bot::{presenter::TelegramPresenter, schema::schema},
    config::Config,
    engine::SessionEngine,
    question::QuestionBank,
    BoxError,
};
use teloxide::{
    error_handlers::LoggingErrorHandler,
    prelude::*,
    update_listeners::webhooks::{self, Options},
};
use tracing::level_filters::LevelFilter;
use tracing_log::LogTracer;
use tracing_subscriber::{fmt::format::FmtSpan, EnvFilter};

#[tokio::main]
async fn main() -> Result<(), BoxError> {
    let config = Config::from_env()?;
    init_tracing(&config)?;

    let bank = QuestionBank::load(&config.questions_path)?;
    let bot = Bot::new(&config.token);
    let engine = SessionEngine::new(bank, TelegramPresenter::new(bot.clone()), config.engine());
    let sweeper = engine.spawn_sweeper(config.sweep_interval);
    tracing::info!("Starting bot...");

    let webhook = config.webhook.clone();
    let mut dispatcher = Dispatcher::builder(bot.clone(), schema())
        .dependencies(dptree::deps![engine, Arc::new(config)])
        .enable_ctrlc_handler()
        .build();

    if let Some(webhook) = webhook {
        tracing::info!(url = %webhook.url, addr = %webhook.addr, "listening for webhook updates");
        let listener = webhooks::axum(bot, Options::new(webhook.addr, webhook.url)).await?;
        dispatcher
            .dispatch_with_listener(
                listener,
                LoggingErrorHandler::with_custom_text("An error from the update listener"),
            )
            .await;
    } else {
        dispatcher.dispatch().await;
    }

    sweeper.abort();
    Ok(())
}

/// JSON logs on stdout. `RUST_LOG` directives override `LOG_LEVEL`; records
/// emitted through `log` by teloxide are bridged in.
fn init_tracing(config: &Config) -> Result<(), BoxError> {
    LogTracer::init()?;

    let filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::from_level(config.log_level).into())
        .from_env_lossy();
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .json()
        .with_span_events(FmtSpan::ENTER)
        .log_internal_errors(true)
        .with_line_number(true)
        .with_target(false)
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;
    Ok(())
}
