use anyhow::{Context, Result};
use dotenvy::dotenv;
use std::{env, str::FromStr};

#[derive(Clone, Debug)]
pub struct Config {
    pub server_addr: String,
    pub database_url: String,
    pub db_max_connections: u32,
    pub api_prefix: String,

    // Request limits
    pub json_limit_bytes: usize,
    pub max_upload_bytes: usize,

    /// Per-IP requests per minute on the API scope, 0 disables the limiter
    pub rate_api_per_min: u32,

    pub log_dir: String,
    pub log_level: tracing::Level,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds the config from any key lookup, so tests don't have to touch the process env.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        Ok(Self {
            server_addr: lookup("SERVER_ADDR").unwrap_or_else(|| "127.0.0.1:5001".to_string()),
            database_url: lookup("DATABASE_URL").context("DATABASE_URL must be set")?,
            db_max_connections: parse_or(&lookup, "DB_MAX_CONNECTIONS", 10)?,
            api_prefix: lookup("API_PREFIX").unwrap_or_else(|| "/api".to_string()),

            json_limit_bytes: parse_or(&lookup, "JSON_LIMIT_BYTES", 4 * 1024 * 1024)?,
            max_upload_bytes: parse_or(&lookup, "MAX_UPLOAD_BYTES", 10 * 1024 * 1024)?,

            rate_api_per_min: parse_or(&lookup, "RATE_API_PER_MIN", 600)?,

            log_dir: lookup("LOG_DIR").unwrap_or_else(|| "logs".to_string()),
            log_level: parse_or(&lookup, "LOG_LEVEL", tracing::Level::INFO)?,
        })
    }
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> Result<T>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|e| anyhow::anyhow!("{key} has an invalid value {raw:?}: {e}")),
        None => Ok(default),
    }
}
