//! Configuration types, loaded from the environment (and `.env`).

use std::path::PathBuf;
use std::time::Duration;

use secrecy::SecretString;

use crate::error::ConfigError;

/// Which gateway the bot talks through.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelKind {
    /// Telegram Bot API (the production gateway).
    Telegram,
    /// stdin/stdout console, for local runs.
    Cli,
}

impl std::fmt::Display for ChannelKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Telegram => write!(f, "telegram"),
            Self::Cli => write!(f, "cli"),
        }
    }
}

impl std::str::FromStr for ChannelKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "telegram" => Ok(Self::Telegram),
            "cli" => Ok(Self::Cli),
            other => Err(ConfigError::InvalidValue {
                key: "REGIBOT_CHANNEL".into(),
                message: format!("expected 'telegram' or 'cli', got '{other}'"),
            }),
        }
    }
}

/// Bot configuration.
#[derive(Debug, Clone)]
pub struct BotConfig {
    /// Gateway to run against.
    pub channel: ChannelKind,
    /// Telegram bot token. Always present when `channel` is Telegram.
    pub bot_token: Option<SecretString>,
    /// Path of the libSQL database file.
    pub db_path: PathBuf,
    /// Long-poll timeout passed to `getUpdates`.
    pub poll_timeout: Duration,
    /// Upper bound for one outbound Bot API call.
    pub send_timeout: Duration,
    /// Upper bound for one Registration Store call.
    pub store_timeout: Duration,
    /// How long shutdown waits for in-flight conversations.
    pub shutdown_grace: Duration,
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            channel: ChannelKind::Telegram,
            bot_token: None,
            db_path: PathBuf::from("./data/regibot.db"),
            poll_timeout: Duration::from_secs(30),
            send_timeout: Duration::from_secs(10),
            store_timeout: Duration::from_secs(5),
            shutdown_grace: Duration::from_secs(10),
        }
    }
}

impl BotConfig {
    /// Build the configuration from process environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build the configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let channel = match lookup("REGIBOT_CHANNEL") {
            Some(value) => value.parse()?,
            None => defaults.channel,
        };

        let bot_token = lookup("BOT_TOKEN")
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
            .map(SecretString::from);
        if channel == ChannelKind::Telegram && bot_token.is_none() {
            return Err(ConfigError::MissingEnvVar("BOT_TOKEN".into()));
        }

        let db_path = lookup("REGIBOT_DB_PATH")
            .map(PathBuf::from)
            .unwrap_or(defaults.db_path);

        Ok(Self {
            channel,
            bot_token,
            db_path,
            poll_timeout: secs(&lookup, "REGIBOT_POLL_TIMEOUT_SECS", defaults.poll_timeout)?,
            send_timeout: secs(&lookup, "REGIBOT_SEND_TIMEOUT_SECS", defaults.send_timeout)?,
            store_timeout: secs(&lookup, "REGIBOT_STORE_TIMEOUT_SECS", defaults.store_timeout)?,
            shutdown_grace: secs(
                &lookup,
                "REGIBOT_SHUTDOWN_GRACE_SECS",
                defaults.shutdown_grace,
            )?,
        })
    }
}

/// Parse a positive number of seconds, falling back to `default` when unset.
fn secs<F>(lookup: &F, key: &str, default: Duration) -> Result<Duration, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let Some(raw) = lookup(key) else {
        return Ok(default);
    };
    match raw.trim().parse::<u64>() {
        Ok(0) => Err(ConfigError::InvalidValue {
            key: key.into(),
            message: "must be greater than zero".into(),
        }),
        Ok(n) => Ok(Duration::from_secs(n)),
        Err(e) => Err(ConfigError::InvalidValue {
            key: key.into(),
            message: e.to_string(),
        }),
    }
}
