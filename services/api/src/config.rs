//! services/api/src/config.rs
//!
//! Defines the application's configuration structure and loading logic.
//!
//! All configuration is loaded from environment variables at startup. The `.env`
//! file is used for local development.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use tracing::Level;

use crate::adapters::token::MAX_TTL_HOURS;

/// A custom error type for configuration loading failures.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing the environment variable {0}")]
    MissingVar(String),
    #[error("Invalid value for the environment variable {0}: {1}")]
    InvalidValue(String, String),
}

/// Holds all configuration loaded from the environment at startup.
#[derive(Clone, Debug)]
pub struct Config {
    pub bind_address: SocketAddr,
    /// `None` selects the in-memory store.
    pub redis_url: Option<String>,
    pub log_level: Level,
    pub files_dir: PathBuf,
    pub bin_retention: Duration,
    pub max_upload_bytes: usize,
    /// Deadline for requests that enumerate every bin.
    pub scan_timeout: Duration,
    /// `None` means a random secret is generated per process.
    pub jwt_secret: Option<String>,
    pub token_ttl_hours: u64,
}

impl Config {
    /// Loads configuration from environment variables.
    ///
    /// It will look for a `.env` file in the current directory for development,
    /// but this is skipped in test environments to ensure tests are hermetic.
    pub fn from_env() -> Result<Self, ConfigError> {
        if !cfg!(test) {
            dotenvy::dotenv().ok();
        }
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Builds the configuration from an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        // --- Server and Store Settings ---
        let bind_address: SocketAddr = parse_or(&var, "BIND_ADDRESS", "0.0.0.0:4000".parse().ok())?;
        let redis_url = var("REDIS_URL");

        let log_level_str = var("RUST_LOG").unwrap_or_else(|| "INFO".to_string());
        let log_level = log_level_str.parse::<Level>().map_err(|_| {
            ConfigError::InvalidValue(
                "RUST_LOG".to_string(),
                format!("'{}' is not a valid log level", log_level_str),
            )
        })?;

        // --- Bin Settings ---
        let files_dir = var("FILES_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("./files"));
        let retention_days: u64 = parse_or(&var, "BIN_RETENTION_DAYS", Some(30))?;
        if retention_days == 0 {
            return Err(ConfigError::InvalidValue(
                "BIN_RETENTION_DAYS".to_string(),
                "must be at least 1".to_string(),
            ));
        }
        let bin_retention = retention_days
            .checked_mul(24 * 60 * 60)
            .map(Duration::from_secs)
            .ok_or_else(|| {
                ConfigError::InvalidValue(
                    "BIN_RETENTION_DAYS".to_string(),
                    format!("{retention_days} days is out of range"),
                )
            })?;
        let max_upload_bytes: usize = parse_or(&var, "MAX_UPLOAD_BYTES", Some(10 * 1024 * 1024))?;
        let scan_timeout_secs: u64 = parse_or(&var, "SCAN_TIMEOUT_SECS", Some(10))?;

        // --- Auth Settings ---
        let jwt_secret = var("JWT_SECRET");
        let token_ttl_hours: u64 = parse_or(&var, "TOKEN_TTL_HOURS", Some(24))?;
        if token_ttl_hours > MAX_TTL_HOURS {
            return Err(ConfigError::InvalidValue(
                "TOKEN_TTL_HOURS".to_string(),
                format!("must be at most {MAX_TTL_HOURS}"),
            ));
        }

        Ok(Self {
            bind_address,
            redis_url,
            log_level,
            files_dir,
            bin_retention,
            max_upload_bytes,
            scan_timeout: Duration::from_secs(scan_timeout_secs),
            jwt_secret,
            token_ttl_hours,
        })
    }
}

/// Parses `name` when set, otherwise falls back to `default`.
/// A `None` default makes the variable required.
fn parse_or<T, F>(var: &F, name: &str, default: Option<T>) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    match var(name) {
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map_err(|e| ConfigError::InvalidValue(name.to_string(), e.to_string())),
        None => default.ok_or_else(|| ConfigError::MissingVar(name.to_string())),
    }
}
