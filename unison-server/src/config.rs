use std::{env, str::FromStr};

use log::LevelFilter;
use thiserror::Error;
use unison_core::Config;

/// The default port the server will listen on.
pub const DEFAULT_PORT: u16 = 9050;

/// Settings read from the environment on startup
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub port: u16,
    /// Base URL of the external persistence service. Rooms are kept in
    /// memory when unset.
    pub persistence_url: Option<String>,
    /// How much unison's own crates log
    pub log_level: LevelFilter,
    pub collab: Config,
}

#[derive(Debug, Error)]
#[error("{name} has an invalid value: \"{value}\"")]
pub struct ConfigError {
    name: &'static str,
    value: String,
}

impl ServerConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut collab = Config::default();

        if let Some(buffer) = lookup("UNISON_SYNC_BUFFER_MS") {
            collab.sync_buffer_ms = parse("UNISON_SYNC_BUFFER_MS", buffer)?;
        }

        if let Some(interval) = lookup("UNISON_HEARTBEAT_INTERVAL_MS") {
            collab.heartbeat_interval_ms = parse("UNISON_HEARTBEAT_INTERVAL_MS", interval)?;
        }

        let port = match lookup("UNISON_SERVER_PORT") {
            Some(port) => parse("UNISON_SERVER_PORT", port)?,
            None => DEFAULT_PORT,
        };

        let log_level = match lookup("UNISON_LOG") {
            Some(level) => parse("UNISON_LOG", level)?,
            None => LevelFilter::Info,
        };

        let persistence_url = lookup("UNISON_PERSISTENCE_URL").filter(|url| !url.is_empty());

        Ok(Self {
            port,
            persistence_url,
            log_level,
            collab,
        })
    }
}

fn parse<T>(name: &'static str, value: String) -> Result<T, ConfigError>
where
    T: FromStr,
{
    value.trim().parse().map_err(|_| ConfigError { name, value })
}
