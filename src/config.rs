use log::{info, warn};
use std::{env, fmt::Display, str::FromStr, time::Duration};
use thiserror::Error;

/// Minimum length `Key::derive_from` accepts.
const MIN_SECRET_LEN: usize = 32;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid {key} value {value:?}: {reason}")]
    Invalid {
        key: &'static str,
        value: String,
        reason: String,
    },

    #[error("SESSION_SECRET must be at least 32 bytes long")]
    ShortSecret,
}

#[derive(Clone, Debug)]
pub struct Config {
    pub bind_addr: String,
    pub api_base_url: String,
    pub storage_path: String,
    pub session_secret: Option<String>,
    pub session_ttl_hours: i64,
    pub secure_cookies: bool,
    pub api_timeout: Option<Duration>,
}

impl Config {
    pub fn load() -> Result<Self, ConfigError> {
        let session_secret = var("SESSION_SECRET");
        if session_secret
            .as_ref()
            .map_or(false, |s| s.len() < MIN_SECRET_LEN)
        {
            return Err(ConfigError::ShortSecret);
        }
        if session_secret.is_none() {
            warn!("SESSION_SECRET not set, sessions will not survive a restart");
        }

        Ok(Self {
            bind_addr: try_load("BIND_ADDR", "127.0.0.1:8080")?,
            api_base_url: try_load::<String>("API_BASE_URL", "http://127.0.0.1:5000")?
                .trim_end_matches('/')
                .to_owned(),
            storage_path: try_load("STORAGE_PATH", "reviewflix-data")?,
            session_secret,
            session_ttl_hours: try_load("SESSION_TTL_HOURS", "336")?,
            secure_cookies: try_load("SECURE_COOKIES", "false")?,
            api_timeout: var("API_TIMEOUT_SECS")
                .map(|value| parse::<u64>("API_TIMEOUT_SECS", value))
                .transpose()?
                .map(Duration::from_secs),
        })
    }
}

fn var(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.is_empty())
}

fn try_load<T: FromStr>(key: &'static str, default: &str) -> Result<T, ConfigError>
where
    T::Err: Display,
{
    let value = var(key).unwrap_or_else(|| {
        info!("{key} not set, using default: {default}");
        default.to_owned()
    });
    parse(key, value)
}

fn parse<T: FromStr>(key: &'static str, value: String) -> Result<T, ConfigError>
where
    T::Err: Display,
{
    value.parse().map_err(|err: T::Err| ConfigError::Invalid {
        key,
        reason: err.to_string(),
        value,
    })
}
