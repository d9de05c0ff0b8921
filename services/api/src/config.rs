//! services/api/src/config.rs
//!
//! Defines the application's configuration structure and loading logic.
//!
//! All configuration is loaded from environment variables at startup. The `.env`
//! file is used for local development. The token signing secret is mandatory:
//! the process refuses to start without it rather than failing on first login.

use std::net::SocketAddr;
use std::time::Duration;
use tracing::Level;

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
    pub database_url: String,
    pub db_max_connections: u32,
    pub log_level: Level,
    pub jwt_secret: String,
    pub frontend_url: String,
    pub payment_api_base: String,
    pub payment_secret_key: Option<String>,
    pub payment_currency: String,
    pub payment_timeout: Duration,
    pub expiry_sweep_interval: Duration,
    pub session_purge_interval: Duration,
}

impl Config {
    /// Loads configuration from environment variables.
    ///
    /// It will look for a `.env` file in the current directory for development,
    /// but this is skipped in test environments to ensure tests are hermetic.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Only load from .env in non-test mode to avoid contamination.
        if !cfg!(test) {
            dotenvy::dotenv().ok();
        }
        Self::from_vars(|name| std::env::var(name).ok())
    }

    /// Builds the configuration from any variable lookup.
    pub fn from_vars<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        // --- Required Settings ---
        let jwt_secret = lookup("JWT_SECRET")
            .filter(|s| !s.trim().is_empty())
            .ok_or_else(|| ConfigError::MissingVar("JWT_SECRET".to_string()))?;

        let database_url = lookup("DATABASE_URL")
            .filter(|s| !s.trim().is_empty())
            .ok_or_else(|| ConfigError::MissingVar("DATABASE_URL".to_string()))?;

        // --- Server Settings ---
        let bind_address_str = lookup("BIND_ADDRESS").unwrap_or_else(|| "0.0.0.0:5000".to_string());
        let bind_address = bind_address_str.parse::<SocketAddr>().map_err(|e| {
            ConfigError::InvalidValue("BIND_ADDRESS".to_string(), e.to_string())
        })?;

        let log_level_str = lookup("RUST_LOG").unwrap_or_else(|| "INFO".to_string());
        let log_level = log_level_str.parse::<Level>().map_err(|_| {
            ConfigError::InvalidValue(
                "RUST_LOG".to_string(),
                format!("'{}' is not a valid log level", log_level_str),
            )
        })?;

        let db_max_connections = parse_or(&lookup, "DB_MAX_CONNECTIONS", 5u32)?;

        let frontend_url = lookup("FRONTEND_URL")
            .unwrap_or_else(|| "http://localhost:3000".to_string())
            .trim_end_matches('/')
            .to_string();

        // --- Payment Provider Settings ---
        let payment_api_base = lookup("PAYMENT_API_BASE")
            .unwrap_or_else(|| "https://api.flutterwave.com/v3".to_string())
            .trim_end_matches('/')
            .to_string();
        let payment_secret_key = lookup("FLUTTERWAVE_SECRET_KEY").filter(|s| !s.is_empty());
        let payment_currency = lookup("PAYMENT_CURRENCY").unwrap_or_else(|| "NGN".to_string());
        let payment_timeout = Duration::from_secs(parse_or(&lookup, "PAYMENT_TIMEOUT_SECS", 15u64)?);

        // --- Background Jobs ---
        let expiry_sweep_interval =
            Duration::from_secs(parse_or(&lookup, "EXPIRY_SWEEP_INTERVAL_SECS", 86_400u64)?);
        let session_purge_interval =
            Duration::from_secs(parse_or(&lookup, "SESSION_PURGE_INTERVAL_SECS", 3_600u64)?);
        if expiry_sweep_interval.is_zero() || session_purge_interval.is_zero() {
            return Err(ConfigError::InvalidValue(
                "EXPIRY_SWEEP_INTERVAL_SECS/SESSION_PURGE_INTERVAL_SECS".to_string(),
                "intervals must be greater than zero".to_string(),
            ));
        }

        Ok(Self {
            bind_address,
            database_url,
            db_max_connections,
            log_level,
            jwt_secret,
            frontend_url,
            payment_api_base,
            payment_secret_key,
            payment_currency,
            payment_timeout,
            expiry_sweep_interval,
            session_purge_interval,
        })
    }
}

fn parse_or<F, T>(lookup: &F, name: &str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(name) {
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map_err(|e| ConfigError::InvalidValue(name.to_string(), e.to_string())),
        None => Ok(default),
    }
}
