use secrecy::SecretString;
use std::net::{Ipv4Addr, SocketAddr};
use std::num::NonZeroUsize;
use std::time::Duration;
use tracing::Level;

/// A custom error type for configuration loading failures.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingVar(String),
    #[error("Invalid value for environment variable {0}: {1}")]
    InvalidValue(String, String),
}

pub const DEFAULT_ORIGINATOR: &str = "telegram-assistant";
pub const DEFAULT_TELEGRAM_API_BASE: &str = "https://api.telegram.org";
pub const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 20_000;
pub const DEFAULT_MAX_CONCURRENT_SESSIONS: usize = 8;
pub const DEFAULT_PORT: u16 = 3000;

/// Holds all configuration loaded from the environment at startup.
#[derive(Debug)]
pub struct Config {
    pub agent_api_key: SecretString,
    pub agent_id: String,
    pub agent_originator: String,
    pub agent_endpoint: String,
    pub telegram_bot_token: SecretString,
    pub telegram_api_base: String,
    /// Deadline for one full exchange with the agent.
    pub request_timeout: Duration,
    pub max_concurrent_sessions: NonZeroUsize,
    pub bind_address: SocketAddr,
    pub log_level: Level,
}

impl Config {
    /// Loads configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Only load from .env in non-test mode to avoid contamination
        if !cfg!(test) {
            dotenvy::dotenv().ok();
        }

        let agent_api_key = required("ELEVENLABS_API_KEY")?;
        let agent_id = required("ELEVENLABS_AGENT_ID")?;
        let telegram_bot_token = required("TELEGRAM_BOT_TOKEN")?;

        let agent_originator =
            std::env::var("ELEVENLABS_ORIGINATOR").unwrap_or_else(|_| DEFAULT_ORIGINATOR.to_string());
        let agent_endpoint = std::env::var("ELEVENLABS_WS_URL")
            .unwrap_or_else(|_| convai_realtime::DEFAULT_ENDPOINT.to_string());
        let telegram_api_base = std::env::var("TELEGRAM_API_BASE")
            .map(|base| base.trim_end_matches('/').to_string())
            .unwrap_or_else(|_| DEFAULT_TELEGRAM_API_BASE.to_string());

        let request_timeout = Duration::from_millis(parsed(
            "REQUEST_TIMEOUT_MS",
            DEFAULT_REQUEST_TIMEOUT_MS,
        )?);
        if request_timeout.is_zero() {
            return Err(ConfigError::InvalidValue(
                "REQUEST_TIMEOUT_MS".to_string(),
                "must be greater than zero".to_string(),
            ));
        }

        let max_concurrent_sessions = NonZeroUsize::new(parsed(
            "MAX_CONCURRENT_SESSIONS",
            DEFAULT_MAX_CONCURRENT_SESSIONS,
        )?)
        .ok_or_else(|| {
            ConfigError::InvalidValue(
                "MAX_CONCURRENT_SESSIONS".to_string(),
                "must be at least 1".to_string(),
            )
        })?;

        let port: u16 = parsed("PORT", DEFAULT_PORT)?;
        let bind_address = SocketAddr::from((Ipv4Addr::UNSPECIFIED, port));

        let log_level_str = std::env::var("RUST_LOG").unwrap_or_else(|_| "INFO".to_string());
        let log_level = log_level_str.parse::<Level>().map_err(|_| {
            ConfigError::InvalidValue(
                "RUST_LOG".to_string(),
                format!("'{}' is not a valid log level", log_level_str),
            )
        })?;

        Ok(Self {
            agent_api_key: SecretString::from(agent_api_key),
            agent_id,
            agent_originator,
            agent_endpoint,
            telegram_bot_token: SecretString::from(telegram_bot_token),
            telegram_api_base,
            request_timeout,
            max_concurrent_sessions,
            bind_address,
            log_level,
        })
    }
}

fn required(name: &str) -> Result<String, ConfigError> {
    std::env::var(name)
        .ok()
        .filter(|value| !value.trim().is_empty())
        .ok_or_else(|| ConfigError::MissingVar(name.to_string()))
}

fn parsed<T>(name: &str, default: T) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .map_err(|e| ConfigError::InvalidValue(name.to_string(), e.to_string())),
        Err(_) => Ok(default),
    }
}
