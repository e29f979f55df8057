use std::net::SocketAddr;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{var} has an invalid value {value:?}")]
    Invalid { var: &'static str, value: String },
}

/// Runtime settings, read from the environment after loading `.env`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppConfig {
    pub database_url: String,
    pub bind_addr: SocketAddr,
    pub log_filter: String,
    pub local_user_email: String,
    pub local_user_name: String,
    pub event_buffer: usize,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let _ = dotenvy::dotenv();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let get = |key: &str, default: &str| lookup(key).filter(|v| !v.trim().is_empty()).unwrap_or_else(|| default.to_string());

        let bind = get("BIND_ADDR", "127.0.0.1:3000");
        let bind_addr = bind.parse().map_err(|_| ConfigError::Invalid { var: "BIND_ADDR", value: bind.clone() })?;

        let buffer = get("MEDMINDER_EVENT_BUFFER", "64");
        let event_buffer = buffer
            .parse::<usize>()
            .ok()
            .filter(|n| *n > 0)
            .ok_or_else(|| ConfigError::Invalid { var: "MEDMINDER_EVENT_BUFFER", value: buffer.clone() })?;

        Ok(Self {
            database_url: get("DATABASE_URL", "sqlite://medminder.db"),
            bind_addr,
            log_filter: get("RUST_LOG", "info"),
            local_user_email: get("MEDMINDER_USER_EMAIL", "family@localhost"),
            local_user_name: get("MEDMINDER_USER_NAME", "Family"),
            event_buffer,
        })
    }
}
