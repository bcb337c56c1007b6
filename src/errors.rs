// ABOUTME: Unified error handling for the authorization server
// ABOUTME: Defines error codes, the AppError type, and HTTP status mapping
//
// SPDX-License-Identifier: MIT OR Apache-2.0

//! # Unified Error Handling
//!
//! Internal faults (storage, configuration, crypto) are carried as [`AppError`]
//! until they cross the protocol boundary, where the grant engine maps them to
//! tagged OAuth2 wire errors. Nothing escapes the engine as an unstructured
//! fault.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Standard error codes used throughout the application
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorCode {
    /// Credentials present but invalid
    #[serde(rename = "AUTH_INVALID")]
    AuthInvalid,
    /// Credential lifetime exceeded
    #[serde(rename = "AUTH_EXPIRED")]
    AuthExpired,
    /// Token could not be parsed at all
    #[serde(rename = "AUTH_MALFORMED")]
    AuthMalformed,
    /// Request input failed validation
    #[serde(rename = "INVALID_INPUT")]
    InvalidInput,
    /// Requested record does not exist
    #[serde(rename = "RESOURCE_NOT_FOUND")]
    ResourceNotFound,
    /// Underlying store failed
    #[serde(rename = "STORAGE_ERROR")]
    StorageError,
    /// Configuration missing or invalid
    #[serde(rename = "CONFIG_ERROR")]
    ConfigError,
    /// Key generation, signing, or RNG failure
    #[serde(rename = "CRYPTO_ERROR")]
    CryptoError,
    /// Unclassified internal failure
    #[serde(rename = "INTERNAL_ERROR")]
    InternalError,
}

impl ErrorCode {
    /// Get the HTTP status code for this error
    #[must_use]
    pub fn http_status(self) -> u16 {
        match self {
            Self::InvalidInput => 400,
            Self::AuthInvalid => 401,
            Self::AuthExpired | Self::AuthMalformed => 403,
            Self::ResourceNotFound => 404,
            Self::StorageError | Self::ConfigError | Self::CryptoError | Self::InternalError => 500,
        }
    }

    /// Get a short description of this error code
    #[must_use]
    pub fn description(self) -> &'static str {
        match self {
            Self::AuthInvalid => "The provided credentials are invalid",
            Self::AuthExpired => "The credential has expired",
            Self::AuthMalformed => "The token is malformed",
            Self::InvalidInput => "The provided input is invalid",
            Self::ResourceNotFound => "The requested resource was not found",
            Self::StorageError => "A storage operation failed",
            Self::ConfigError => "The server configuration is invalid",
            Self::CryptoError => "A cryptographic operation failed",
            Self::InternalError => "An internal error occurred",
        }
    }
}

/// Unified error type for the application
#[derive(Debug, Error)]
pub struct AppError {
    /// Error code
    pub code: ErrorCode,
    /// Human-readable error message
    pub message: String,
    /// Source error for error chaining
    #[source]
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl AppError {
    /// Create a new `AppError` with the given code and message
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            source: None,
        }
    }

    /// Add a source error for error chaining
    #[must_use]
    pub fn with_source(mut self, source: impl std::error::Error + Send + Sync + 'static) -> Self {
        self.source = Some(Box::new(source));
        self
    }

    /// Get the HTTP status code for this error
    #[must_use]
    pub fn http_status(&self) -> u16 {
        self.code.http_status()
    }

    /// Invalid authentication
    pub fn auth_invalid(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::AuthInvalid, message)
    }

    /// Expired credential
    pub fn auth_expired(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::AuthExpired, message)
    }

    /// Malformed token
    pub fn auth_malformed(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::AuthMalformed, message)
    }

    /// Invalid request input
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidInput, message)
    }

    /// Resource not found
    pub fn not_found(resource: impl Into<String>) -> Self {
        Self::new(ErrorCode::ResourceNotFound, resource)
    }

    /// Storage failure
    pub fn storage(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::StorageError, message)
    }

    /// Configuration failure
    pub fn config(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::ConfigError, message)
    }

    /// Cryptographic failure
    pub fn crypto(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::CryptoError, message)
    }

    /// Internal failure
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InternalError, message)
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code.description(), self.message)
    }
}

/// Result type alias for convenience
pub type AppResult<T> = Result<T, AppError>;
