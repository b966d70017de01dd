//! Telegram front end: decodes commands and button presses into engine calls
//! and renders engine output back into chat messages.

pub mod commands;
pub mod keyboard;
pub mod presenter;
pub mod schema;

use crate::{engine::SessionEngine, question::QuestionBank, BoxError};

pub type QuizEngine = SessionEngine<QuestionBank, presenter::TelegramPresenter>;
pub type HandlerResult = Result<(), BoxError>;
