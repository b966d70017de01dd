use std::{net::SocketAddr, path::PathBuf, time::Duration};

use tracing::Level;
use url::Url;

use crate::engine::EngineConfig;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{0} should be set")]
    Missing(&'static str),

    #[error("{key} has an invalid value '{value}': {reason}")]
    Invalid {
        key: &'static str,
        value: String,
        reason: String,
    },
}

#[derive(Debug, Clone)]
pub struct WebhookConfig {
    pub url: Url,
    pub addr: SocketAddr,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub token: String,
    pub log_level: Level,
    pub questions_path: PathBuf,
    pub session_idle: Duration,
    pub sweep_interval: Duration,
    pub leaderboard_size: usize,
    /// Webhook listener; long polling when absent.
    pub webhook: Option<WebhookConfig>,
}

impl Config {
    /// Reads the process environment after loading `.env`, if present.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let token = lookup("TELOXIDE_TOKEN").ok_or(ConfigError::Missing("TELOXIDE_TOKEN"))?;

        let log_level = parse_or(&lookup, "LOG_LEVEL", Level::INFO)?;
        let questions_path = lookup("QUESTIONS_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("data/questions.json"));
        let session_idle = Duration::from_secs(parse_or(&lookup, "SESSION_IDLE_SECS", 30 * 60)?);
        let sweep_interval = Duration::from_secs(parse_or(&lookup, "SWEEP_INTERVAL_SECS", 5 * 60)?);
        let leaderboard_size = parse_or(&lookup, "LEADERBOARD_SIZE", 10)?;

        if sweep_interval.is_zero() {
            return Err(ConfigError::Invalid {
                key: "SWEEP_INTERVAL_SECS",
                value: "0".into(),
                reason: "must be positive".into(),
            });
        }

        let webhook = match (lookup("WEBHOOK_URL"), lookup("WEBHOOK_ADDR")) {
            (Some(url), Some(addr)) => Some(WebhookConfig {
                url: parse("WEBHOOK_URL", &url)?,
                addr: parse("WEBHOOK_ADDR", &addr)?,
            }),
            _ => None,
        };

        Ok(Self {
            token,
            log_level,
            questions_path,
            session_idle,
            sweep_interval,
            leaderboard_size,
            webhook,
        })
    }

    pub fn engine(&self) -> EngineConfig {
        EngineConfig {
            session_idle: self.session_idle,
        }
    }
}

fn parse<T>(key: &'static str, value: &str) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    value.trim().parse().map_err(|err: T::Err| ConfigError::Invalid {
        key,
        value: value.to_owned(),
        reason: err.to_string(),
    })
}

fn parse_or<T>(lookup: &impl Fn(&str) -> Option<String>, key: &'static str, default: T) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(key) {
        Some(value) => parse(key, &value),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn config(vars: &[(&str, &str)]) -> Result<Config, ConfigError> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(key, value)| (key.to_string(), value.to_string()))
            .collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn token_is_required() {
        assert!(matches!(config(&[]), Err(ConfigError::Missing("TELOXIDE_TOKEN"))));
    }

    #[test]
    fn defaults_apply() {
        let config = config(&[("TELOXIDE_TOKEN", "123:abc")]).unwrap();
        assert_eq!(config.log_level, Level::INFO);
        assert_eq!(config.session_idle, Duration::from_secs(1800));
        assert_eq!(config.sweep_interval, Duration::from_secs(300));
        assert_eq!(config.leaderboard_size, 10);
        assert_eq!(config.questions_path, PathBuf::from("data/questions.json"));
        assert!(config.webhook.is_none());
    }

    #[test]
    fn parses_overrides_and_webhook() {
        let config = config(&[
            ("TELOXIDE_TOKEN", "123:abc"),
            ("LOG_LEVEL", "debug"),
            ("SESSION_IDLE_SECS", "60"),
            ("LEADERBOARD_SIZE", "3"),
            ("WEBHOOK_URL", "https://example.org/hook"),
            ("WEBHOOK_ADDR", "127.0.0.1:8443"),
        ])
        .unwrap();

        assert_eq!(config.log_level, Level::DEBUG);
        assert_eq!(config.engine().session_idle, Duration::from_secs(60));
        assert_eq!(config.leaderboard_size, 3);
        let webhook = config.webhook.unwrap();
        assert_eq!(webhook.url.as_str(), "https://example.org/hook");
        assert_eq!(webhook.addr.port(), 8443);
    }

    #[test]
    fn rejects_garbage_numbers() {
        let err = config(&[("TELOXIDE_TOKEN", "t"), ("SESSION_IDLE_SECS", "soon")]).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { key: "SESSION_IDLE_SECS", .. }));
    }
}
