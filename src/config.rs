// ABOUTME: Environment-driven server configuration
// ABOUTME: Every knob has a default; only malformed values are errors
//
// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::errors::{AppError, AppResult};
use crate::tokens::TokenLifespans;
use std::env;

/// Top-level server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// HTTP listen port
    pub http_port: u16,
    /// Issuer URL embedded in every signed token
    pub issuer_url: String,
    /// Where device flow users are sent to approve
    pub verification_uri: String,
    /// Access token lifetime in seconds
    pub access_token_lifespan_secs: i64,
    /// Lifespans for opaque credentials
    pub lifespans: TokenLifespans,
    /// PKCS#8 PEM of the signing key; a fresh key is generated when absent
    pub signing_key_pem: Option<String>,
}

impl ServerConfig {
    /// Load configuration from environment variables
    ///
    /// `OAUTH2_SIGNING_KEY_PATH` points at a PKCS#8 PEM file; without it the
    /// server generates an ephemeral key at startup, which invalidates all
    /// outstanding access tokens across restarts.
    ///
    /// # Errors
    /// Returns an error when a variable is present but malformed
    pub fn from_env() -> AppResult<Self> {
        let issuer_url = env_var_or("OAUTH2_ISSUER_URL", "http://localhost:8080");
        url::Url::parse(&issuer_url)
            .map_err(|e| AppError::config(format!("invalid OAUTH2_ISSUER_URL: {e}")))?;
        let verification_uri =
            env_var_or("OAUTH2_VERIFICATION_URI", &format!("{issuer_url}/device"));

        let signing_key_pem = match env::var("OAUTH2_SIGNING_KEY_PATH") {
            Ok(path) => Some(std::fs::read_to_string(&path).map_err(|e| {
                AppError::config(format!("failed to read signing key at {path}: {e}"))
            })?),
            Err(_) => None,
        };

        let defaults = TokenLifespans::default();
        Ok(Self {
            http_port: parse_var("OAUTH2_HTTP_PORT", 8080)?,
            issuer_url,
            verification_uri,
            access_token_lifespan_secs: parse_var("OAUTH2_ACCESS_TOKEN_LIFESPAN_SECS", 3600)?,
            lifespans: TokenLifespans {
                auth_code_secs: parse_var("OAUTH2_AUTH_CODE_LIFESPAN_SECS", defaults.auth_code_secs)?,
                refresh_token_secs: parse_var(
                    "OAUTH2_REFRESH_TOKEN_LIFESPAN_SECS",
                    defaults.refresh_token_secs,
                )?,
                device_code_secs: parse_var(
                    "OAUTH2_DEVICE_CODE_LIFESPAN_SECS",
                    defaults.device_code_secs,
                )?,
                pkce_secs: parse_var("OAUTH2_PKCE_LIFESPAN_SECS", defaults.pkce_secs)?,
            },
            signing_key_pem,
        })
    }
}

fn env_var_or(name: &str, default: &str) -> String {
    env::var(name).unwrap_or_else(|_| default.to_owned())
}

fn parse_var<T: std::str::FromStr>(name: &str, default: T) -> AppResult<T> {
    match env::var(name) {
        Ok(raw) => raw
            .parse()
            .map_err(|_| AppError::config(format!("invalid value for {name}: {raw}"))),
        Err(_) => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_without_environment() {
        // Runs without any OAUTH2_* variables set in CI
        let config = ServerConfig::from_env().unwrap();
        assert_eq!(config.access_token_lifespan_secs, 3600);
        assert_eq!(config.lifespans.auth_code_secs, 600);
        assert!(config.verification_uri.ends_with("/device"));
    }

    #[test]
    fn test_parse_var_rejects_garbage() {
        env::set_var("OAUTH2_TEST_PORT_GARBAGE", "not-a-number");
        let result: AppResult<u16> = parse_var("OAUTH2_TEST_PORT_GARBAGE", 8080);
        env::remove_var("OAUTH2_TEST_PORT_GARBAGE");
        assert!(result.is_err());
    }
}
