use std::{env, fmt::Display, path::PathBuf, str::FromStr};

use log::info;
use thiserror::Error;

#[derive(Error, Debug)]
#[error("Invalid {key} value {value:?}: {reason}")]
pub struct ConfigError {
    pub key: &'static str,
    pub value: String,
    pub reason: String,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub bind_address: String,
    pub port: u16,
    pub database_url: String,
    pub pool_size: u32,
    pub media_root: PathBuf,
    pub media_url: String,
}

impl Config {
    /// Reads settings from the process environment (after `.env` has been
    /// loaded by the caller).
    pub fn load() -> Result<Self, ConfigError> {
        Self::from_source(|key| env::var(key).ok())
    }

    pub fn from_source<F>(source: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let config = Self {
            bind_address: try_load(&source, "BIND_ADDRESS", "127.0.0.1")?,
            port: try_load(&source, "PORT", "8080")?,
            database_url: try_load(&source, "DATABASE_URL", "recipes.db")?,
            pool_size: try_load(&source, "DATABASE_POOL_SIZE", "8")?,
            media_root: try_load(&source, "MEDIA_ROOT", "media")?,
            media_url: try_load(&source, "MEDIA_URL", "http://127.0.0.1:8080/media")?,
        };

        if config.pool_size == 0 {
            return Err(ConfigError {
                key: "DATABASE_POOL_SIZE",
                value: "0".to_string(),
                reason: "pool needs at least one connection".to_string(),
            });
        }

        Ok(config)
    }
}

fn try_load<F, T>(source: &F, key: &'static str, default: &str) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: Display,
{
    let value = source(key).unwrap_or_else(|| {
        info!("{key} not set, using default: {default}");
        default.to_string()
    });

    value.parse().map_err(|e: T::Err| ConfigError {
        key,
        reason: e.to_string(),
        value,
    })
}
