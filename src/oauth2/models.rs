// ABOUTME: OAuth2 wire types - token requests/responses and the protocol error vocabulary
// ABOUTME: Error responses use only RFC-registered codes; descriptions never leak internals
//
// SPDX-License-Identifier: MIT OR Apache-2.0

use serde::{Deserialize, Serialize};

/// Form-encoded body of a token endpoint request
///
/// One struct covers all grant types; each handler reads the fields its grant
/// defines and ignores the rest.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TokenRequest {
    /// Requested grant type
    pub grant_type: String,
    /// Authorization code (authorization_code grant)
    pub code: Option<String>,
    /// Redirect URI the code was issued against
    pub redirect_uri: Option<String>,
    /// Client identifier
    pub client_id: Option<String>,
    /// Client secret
    pub client_secret: Option<String>,
    /// Refresh token (refresh_token grant)
    pub refresh_token: Option<String>,
    /// Requested scope, space-delimited
    pub scope: Option<String>,
    /// PKCE code verifier
    pub code_verifier: Option<String>,
    /// Device code (device_code grant)
    pub device_code: Option<String>,
    /// Signed JWT assertion (jwt-bearer grant)
    pub assertion: Option<String>,
}

/// Successful token endpoint response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenResponse {
    /// The signed access token
    pub access_token: String,
    /// Always "Bearer"
    pub token_type: String,
    /// Access token lifetime in seconds
    pub expires_in: i64,
    /// Refresh token, when the grant mints one
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    /// Granted scope, space-delimited
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
}

impl TokenResponse {
    /// Build a bearer response
    #[must_use]
    pub fn bearer(access_token: String, expires_in: i64) -> Self {
        Self {
            access_token,
            token_type: "Bearer".to_owned(),
            expires_in,
            refresh_token: None,
            scope: None,
        }
    }

    /// Attach a refresh token
    #[must_use]
    pub fn with_refresh_token(mut self, refresh_token: String) -> Self {
        self.refresh_token = Some(refresh_token);
        self
    }

    /// Attach the granted scope
    #[must_use]
    pub fn with_scope(mut self, scopes: &[String]) -> Self {
        if !scopes.is_empty() {
            self.scope = Some(scopes.join(" "));
        }
        self
    }
}

/// OAuth2 protocol error response
///
/// `error` is always one of the RFC-registered codes; `error_description` is a
/// short operator-facing hint that never distinguishes absent from invalid
/// credentials.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OAuth2Error {
    /// RFC-registered error code
    pub error: String,
    /// Optional human-readable detail
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_description: Option<String>,
}

impl OAuth2Error {
    fn new(error: &str, description: impl Into<String>) -> Self {
        Self {
            error: error.to_owned(),
            error_description: Some(description.into()),
        }
    }

    /// The request is missing a parameter or is otherwise malformed
    #[must_use]
    pub fn invalid_request(description: impl Into<String>) -> Self {
        Self::new("invalid_request", description)
    }

    /// Client authentication failed
    #[must_use]
    pub fn invalid_client() -> Self {
        Self::new("invalid_client", "client authentication failed")
    }

    /// The grant (code, token, assertion) is invalid, expired, or revoked
    #[must_use]
    pub fn invalid_grant(description: impl Into<String>) -> Self {
        Self::new("invalid_grant", description)
    }

    /// The grant type is not supported by this server
    #[must_use]
    pub fn unsupported_grant_type() -> Self {
        Self::new("unsupported_grant_type", "grant type not supported")
    }

    /// The authenticated client is not allowed to use this grant type
    #[must_use]
    pub fn unauthorized_client() -> Self {
        Self::new("unauthorized_client", "client not authorized for this grant")
    }

    /// The requested scope exceeds what the client may be granted
    #[must_use]
    pub fn invalid_scope(description: impl Into<String>) -> Self {
        Self::new("invalid_scope", description)
    }

    /// Device flow: the user has not decided yet; the device should keep
    /// polling
    #[must_use]
    pub fn authorization_pending() -> Self {
        Self::new("authorization_pending", "user has not yet approved")
    }

    /// Device flow: the device code expired before approval
    #[must_use]
    pub fn expired_token() -> Self {
        Self::new("expired_token", "device code has expired")
    }

    /// Internal failure; carries no detail
    #[must_use]
    pub fn server_error() -> Self {
        Self::new("server_error", "internal server error")
    }

    /// HTTP status for this protocol error
    #[must_use]
    pub fn http_status(&self) -> u16 {
        match self.error.as_str() {
            "invalid_client" => 401,
            "authorization_pending" => 428,
            "server_error" => 500,
            _ => 400,
        }
    }
}

/// Form-encoded body of a device authorization request
#[derive(Debug, Clone, Deserialize)]
pub struct DeviceAuthorizationRequest {
    /// Client identifier
    pub client_id: String,
    /// Client secret
    pub client_secret: Option<String>,
    /// Requested scope, space-delimited
    pub scope: Option<String>,
}

/// Response to a device authorization request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceAuthorizationResponse {
    /// Polling credential for the device
    pub device_code: String,
    /// Short code the user types on another device
    pub user_code: String,
    /// Where the user goes to approve
    pub verification_uri: String,
    /// Device code lifetime in seconds
    pub expires_in: i64,
    /// Minimum polling interval in seconds
    pub interval: u64,
}

/// Form-encoded body of the device approval endpoint
#[derive(Debug, Clone, Deserialize)]
pub struct DeviceApprovalRequest {
    /// The user-entered code
    pub user_code: String,
}

/// Form-encoded body of introspection and revocation requests
///
/// Both endpoints are client-authenticated.
#[derive(Debug, Clone, Deserialize)]
pub struct TokenSubmission {
    /// The token under examination
    pub token: String,
    /// Caller's hint about the token type, accepted but not trusted
    pub token_type_hint: Option<String>,
    /// Client identifier
    pub client_id: Option<String>,
    /// Client secret
    pub client_secret: Option<String>,
}

/// Introspection response (RFC 7662)
///
/// `active: false` is the only field emitted for anything other than a live,
/// verifiable token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IntrospectionResponse {
    /// Whether the token is live
    pub active: bool,
    /// Granted scope, space-delimited
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
    /// Client the token was issued to
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,
    /// Subject
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sub: Option<String>,
    /// Expiry (unix seconds)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exp: Option<i64>,
    /// Issued at (unix seconds)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub iat: Option<i64>,
    /// Not valid before (unix seconds)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nbf: Option<i64>,
    /// Issuer
    #[serde(skip_serializing_if = "Option::is_none")]
    pub iss: Option<String>,
    /// Audience
    #[serde(skip_serializing_if = "Option::is_none")]
    pub aud: Option<Vec<String>>,
    /// Unique token id
    #[serde(skip_serializing_if = "Option::is_none")]
    pub jti: Option<String>,
    /// Token type tag
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token_type: Option<String>,
}

impl IntrospectionResponse {
    /// The undifferentiated negative response
    #[must_use]
    pub fn inactive() -> Self {
        Self {
            active: false,
            scope: None,
            client_id: None,
            sub: None,
            exp: None,
            iat: None,
            nbf: None,
            iss: None,
            aud: None,
            jti: None,
            token_type: None,
        }
    }
}
