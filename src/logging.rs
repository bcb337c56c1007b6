// ABOUTME: Structured logging setup built on tracing-subscriber
// ABOUTME: Format and level come from the environment; RUST_LOG overrides everything
//
// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::errors::{AppError, AppResult};
use std::env;
use tracing_subscriber::EnvFilter;

/// Output format for log events
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// One JSON object per line, for log shippers
    Json,
    /// Human-readable multi-line output
    Pretty,
    /// Single-line human-readable output
    Compact,
}

impl std::str::FromStr for LogFormat {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "json" => Ok(Self::Json),
            "pretty" => Ok(Self::Pretty),
            "compact" => Ok(Self::Compact),
            other => Err(AppError::config(format!("unknown log format: {other}"))),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    /// Default level when RUST_LOG is unset
    pub level: String,
    /// Output format
    pub format: LogFormat,
}

impl LoggingConfig {
    /// Read `LOG_LEVEL` and `LOG_FORMAT` from the environment
    ///
    /// # Errors
    /// Returns an error for an unrecognized format name
    pub fn from_env() -> AppResult<Self> {
        Ok(Self {
            level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_owned()),
            format: env::var("LOG_FORMAT")
                .unwrap_or_else(|_| "compact".to_owned())
                .parse()?,
        })
    }
}

/// Install the global subscriber
///
/// # Errors
/// Returns an error if a global subscriber is already installed
pub fn init(config: &LoggingConfig) -> AppResult<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.level.clone()));

    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    let result = match config.format {
        LogFormat::Json => builder.json().try_init(),
        LogFormat::Pretty => builder.pretty().try_init(),
        LogFormat::Compact => builder.compact().try_init(),
    };
    result.map_err(|e| AppError::config(format!("failed to install tracing subscriber: {e}")))
}

/// Environment-driven setup in one call
///
/// # Errors
/// Returns an error for a malformed configuration or double initialization
pub fn init_from_env() -> AppResult<()> {
    init(&LoggingConfig::from_env()?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_parsing() {
        assert_eq!("json".parse::<LogFormat>().unwrap(), LogFormat::Json);
        assert_eq!("PRETTY".parse::<LogFormat>().unwrap(), LogFormat::Pretty);
        assert_eq!("compact".parse::<LogFormat>().unwrap(), LogFormat::Compact);
        assert!("xml".parse::<LogFormat>().is_err());
    }
}
