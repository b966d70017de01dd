pub mod bot;
pub mod config;
pub mod engine;
pub mod question;
pub mod scoreboard;
pub mod selection;
pub mod session;
pub mod timer;

pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;
