// ABOUTME: JWT bearer assertion verification for the RFC 7523 grant
// ABOUTME: Fetches the client's published keys over HTTPS and verifies RS256 assertions
//
// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::errors::{AppError, AppResult};
use crate::jwks::{JsonWebKey, JsonWebKeySet};
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Timeout for fetching a client's key set
const JWKS_FETCH_TIMEOUT: Duration = Duration::from_secs(10);

/// Claims asserted by a client in a jwt-bearer assertion
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssertionClaims {
    /// Issuer, the asserting client's id
    pub iss: String,
    /// Subject the client is asserting on behalf of
    pub sub: String,
    /// Audience, this server's token endpoint URL
    pub aud: String,
    /// Expiry (unix seconds)
    pub exp: i64,
    /// Issued at (unix seconds)
    #[serde(default)]
    pub iat: i64,
}

/// Verifier for jwt-bearer assertions
///
/// Keys are fetched per verification from the client's registered JWKS URL;
/// caching is the client infrastructure's concern, not ours.
pub struct AssertionVerifier {
    http: reqwest::Client,
    expected_audience: String,
}

impl AssertionVerifier {
    /// Create a verifier whose expected audience is this server's token
    /// endpoint URL
    ///
    /// # Errors
    /// Returns an error if the HTTP client cannot be constructed
    pub fn new(token_endpoint_url: impl Into<String>) -> AppResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(JWKS_FETCH_TIMEOUT)
            .build()
            .map_err(|e| AppError::internal(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            http,
            expected_audience: token_endpoint_url.into(),
        })
    }

    /// Extract the issuer claim without verifying the signature
    ///
    /// Used only to locate the registration whose keys will verify the
    /// assertion; nothing is trusted until `verify` succeeds.
    ///
    /// # Errors
    /// Returns an error if the token cannot be parsed at all
    pub fn unverified_issuer(assertion: &str) -> AppResult<String> {
        let data = jsonwebtoken::dangerous::insecure_decode::<AssertionClaims>(assertion)
            .map_err(|_| AppError::auth_malformed("malformed assertion"))?;
        Ok(data.claims.iss)
    }

    /// Verify an assertion against the keys published at `jwks_url`
    ///
    /// Enforces RS256, signature against the selected published key, expiry,
    /// and that the audience is this server's token endpoint.
    ///
    /// # Errors
    /// Returns an auth error for any fetch, key selection, or verification
    /// failure
    pub async fn verify(&self, assertion: &str, jwks_url: &str) -> AppResult<AssertionClaims> {
        let header = jsonwebtoken::decode_header(assertion)
            .map_err(|_| AppError::auth_malformed("malformed assertion"))?;
        if header.alg != Algorithm::RS256 {
            return Err(AppError::auth_invalid("unsupported assertion algorithm"));
        }

        let key_set = self.fetch_key_set(jwks_url).await?;
        let jwk = select_key(&key_set, header.kid.as_deref())
            .ok_or_else(|| AppError::auth_invalid("no matching key in client JWKS"))?;
        let decoding_key = DecodingKey::from_rsa_components(&jwk.n, &jwk.e)
            .map_err(|_| AppError::auth_invalid("invalid key material in client JWKS"))?;

        let mut validation = Validation::new(Algorithm::RS256);
        validation.set_audience(&[&self.expected_audience]);

        decode::<AssertionClaims>(assertion, &decoding_key, &validation)
            .map(|data| data.claims)
            .map_err(|e| {
                tracing::debug!("assertion verification failed: {e}");
                AppError::auth_invalid("invalid assertion")
            })
    }

    async fn fetch_key_set(&self, jwks_url: &str) -> AppResult<JsonWebKeySet> {
        let response = self
            .http
            .get(jwks_url)
            .send()
            .await
            .map_err(|e| {
                tracing::warn!(%jwks_url, "failed to fetch client JWKS: {e}");
                AppError::auth_invalid("client JWKS unavailable")
            })?
            .error_for_status()
            .map_err(|_| AppError::auth_invalid("client JWKS unavailable"))?;

        response
            .json::<JsonWebKeySet>()
            .await
            .map_err(|_| AppError::auth_invalid("client JWKS unavailable"))
    }
}

/// Pick the published key matching the assertion header
///
/// With a `kid` in the header, the kid must match exactly. Without one, a
/// single-key set is unambiguous; anything else is a selection failure.
fn select_key<'a>(key_set: &'a JsonWebKeySet, kid: Option<&str>) -> Option<&'a JsonWebKey> {
    match kid {
        Some(kid) => key_set.keys.iter().find(|k| k.kid == kid),
        None if key_set.keys.len() == 1 => key_set.keys.first(),
        None => None,
    }
}
