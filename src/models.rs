// ABOUTME: Core data models for clients and stored credentials
// ABOUTME: Defines Client, TokenRecord, TokenType, and supported grant type constants
//
// SPDX-License-Identifier: MIT OR Apache-2.0

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Supported grant type identifiers
pub mod grant_types {
    /// Authorization code exchange (RFC 6749 §4.1)
    pub const AUTHORIZATION_CODE: &str = "authorization_code";
    /// Client credentials (RFC 6749 §4.4)
    pub const CLIENT_CREDENTIALS: &str = "client_credentials";
    /// Refresh token exchange (RFC 6749 §6)
    pub const REFRESH_TOKEN: &str = "refresh_token";
    /// Device authorization grant (RFC 8628)
    pub const DEVICE_CODE: &str = "urn:ietf:params:oauth:grant-type:device_code";
    /// JWT bearer assertion grant (RFC 7523)
    pub const JWT_BEARER: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";
}

/// Registered OAuth2 client application
///
/// The plaintext client secret is never stored; only the argon2 hash survives
/// registration. `client_id` is immutable after creation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Client {
    /// Unique client identifier
    pub client_id: String,
    /// Argon2 hash of the client secret
    #[serde(skip_serializing)]
    pub client_secret_hash: String,
    /// Display name
    pub name: String,
    /// Redirect URIs registered for authorization code flow
    pub redirect_uris: Vec<String>,
    /// Grant types this client may use
    pub grant_types: Vec<String>,
    /// Response types this client may use
    pub response_types: Vec<String>,
    /// Scopes this client may request
    pub scopes: Vec<String>,
    /// Key-publication URL for the jwt-bearer grant
    #[serde(skip_serializing_if = "Option::is_none")]
    pub jwks_url: Option<String>,
    /// When the client was registered
    pub created_at: DateTime<Utc>,
    /// When the registration was last modified
    pub updated_at: DateTime<Utc>,
}

impl Client {
    /// Whether the given grant type is on this client's allow-list
    #[must_use]
    pub fn allows_grant_type(&self, grant_type: &str) -> bool {
        self.grant_types.iter().any(|g| g == grant_type)
    }

    /// Whether the given redirect URI is a registered member
    #[must_use]
    pub fn has_redirect_uri(&self, redirect_uri: &str) -> bool {
        self.redirect_uris.iter().any(|u| u == redirect_uri)
    }
}

/// Type tag for a stored opaque credential
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenType {
    /// Single-use authorization code
    AuthorizationCode,
    /// Long-lived refresh token
    RefreshToken,
    /// Device flow polling credential
    DeviceCode,
}

/// Stored representation of an opaque credential
///
/// Only the SHA-256 signature of the raw secret is persisted; the raw value
/// exists solely in the response that delivered it to the client.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenRecord {
    /// One-way hash of the raw token, the storage key
    pub signature: String,
    /// Human-entry code for the device flow
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_code: Option<String>,
    /// Client the credential was issued to
    pub client_id: String,
    /// Resource owner, empty for client-only grants
    pub user_id: String,
    /// Scopes granted at issuance
    pub scopes: Vec<String>,
    /// Wall-clock expiry, enforced independently of store eviction
    pub expires_at: DateTime<Utc>,
    /// Credential type tag
    pub token_type: TokenType,
    /// Device flow approval flag
    pub approved: bool,
    /// When the credential was issued
    pub created_at: DateTime<Utc>,
}

impl TokenRecord {
    /// Whether the credential is past its wall-clock expiry
    #[must_use]
    pub fn is_expired(&self) -> bool {
        Utc::now() > self.expires_at
    }
}
