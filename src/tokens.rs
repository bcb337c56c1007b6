// ABOUTME: Token lifecycle service - issuance, validation, and consumption of opaque credentials
// ABOUTME: Raw tokens leave this module exactly once; storage only ever sees their signatures
//
// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::crypto::pkce;
use crate::crypto::secrets::{generate_secure_token, hash_token};
use crate::errors::{AppError, AppResult};
use crate::models::{TokenRecord, TokenType};
use crate::storage::{PkceStore, TokenStore};
use chrono::{Duration, Utc};
use std::sync::Arc;

/// Entropy in bytes for authorization codes and device codes
const CODE_BYTES: usize = 32;
/// Entropy in bytes for refresh tokens
const REFRESH_TOKEN_BYTES: usize = 64;
/// Length in characters of the human-entry device code
const USER_CODE_CHARS: usize = 10;

/// Credential lifespans in seconds
#[derive(Debug, Clone, Copy)]
pub struct TokenLifespans {
    /// Authorization code validity
    pub auth_code_secs: i64,
    /// Refresh token validity
    pub refresh_token_secs: i64,
    /// Device code validity
    pub device_code_secs: i64,
    /// Pending PKCE challenge validity
    pub pkce_secs: i64,
}

impl Default for TokenLifespans {
    fn default() -> Self {
        Self {
            auth_code_secs: 600,
            refresh_token_secs: 30 * 24 * 3600,
            device_code_secs: 900,
            pkce_secs: 600,
        }
    }
}

/// Outcome of a device code redemption attempt
#[derive(Debug)]
pub enum DeviceGrantState {
    /// The user has not approved yet; the device keeps polling
    Pending,
    /// Approved and consumed; access may be granted exactly once
    Approved(TokenRecord),
}

/// Token lifecycle service over the token and PKCE stores
pub struct TokenService {
    tokens: Arc<dyn TokenStore>,
    pkce: Arc<dyn PkceStore>,
    lifespans: TokenLifespans,
}

impl TokenService {
    /// Create a service with default lifespans
    #[must_use]
    pub fn new(tokens: Arc<dyn TokenStore>, pkce: Arc<dyn PkceStore>) -> Self {
        Self::with_lifespans(tokens, pkce, TokenLifespans::default())
    }

    /// Create a service with explicit lifespans
    #[must_use]
    pub fn with_lifespans(
        tokens: Arc<dyn TokenStore>,
        pkce: Arc<dyn PkceStore>,
        lifespans: TokenLifespans,
    ) -> Self {
        Self {
            tokens,
            pkce,
            lifespans,
        }
    }

    /// Configured lifespans
    #[must_use]
    pub fn lifespans(&self) -> TokenLifespans {
        self.lifespans
    }

    /// Issue a single-use authorization code, optionally bound to a PKCE
    /// challenge
    ///
    /// Returns the raw code; only its signature is stored. The challenge, when
    /// present, is stored against the code's signature with its own expiry.
    ///
    /// # Errors
    /// Returns an error on RNG or storage failure
    pub async fn issue_authorization_code(
        &self,
        client_id: &str,
        user_id: &str,
        scopes: &[String],
        code_challenge: Option<&str>,
    ) -> AppResult<String> {
        let raw = generate_secure_token(CODE_BYTES)?;
        let signature = hash_token(&raw);

        self.tokens
            .save(TokenRecord {
                signature: signature.clone(),
                user_code: None,
                client_id: client_id.to_owned(),
                user_id: user_id.to_owned(),
                scopes: scopes.to_vec(),
                expires_at: Utc::now() + Duration::seconds(self.lifespans.auth_code_secs),
                token_type: TokenType::AuthorizationCode,
                approved: true,
                created_at: Utc::now(),
            })
            .await?;

        if let Some(challenge) = code_challenge {
            self.pkce
                .save(&signature, challenge, self.lifespans.pkce_secs)
                .await?;
        }

        Ok(raw)
    }

    /// Atomically consume an authorization code and verify its bindings
    ///
    /// The record is removed before any check runs, so a failed exchange still
    /// burns the code and a concurrent duplicate exchange finds nothing. The
    /// stored PKCE challenge is likewise taken atomically; a challenge without
    /// a verifier, or a verifier without a challenge, fails the exchange.
    ///
    /// # Errors
    /// Returns an auth error for unknown, expired, or mismatched codes and for
    /// PKCE failures
    pub async fn consume_authorization_code(
        &self,
        raw_code: &str,
        client_id: &str,
        code_verifier: Option<&str>,
    ) -> AppResult<TokenRecord> {
        let signature = hash_token(raw_code);
        let record = self
            .tokens
            .consume_by_signature(&signature)
            .await?
            .ok_or_else(|| AppError::auth_invalid("invalid authorization code"))?;

        if record.token_type != TokenType::AuthorizationCode {
            return Err(AppError::auth_invalid("invalid authorization code"));
        }
        if record.is_expired() {
            return Err(AppError::auth_expired("authorization code expired"));
        }
        if record.client_id != client_id {
            return Err(AppError::auth_invalid(
                "authorization code issued to a different client",
            ));
        }

        let stored_challenge = self.pkce.take(&signature).await?;
        match (stored_challenge, code_verifier) {
            (Some(challenge), Some(verifier)) => {
                if !pkce::is_valid_verifier(verifier) {
                    return Err(AppError::auth_invalid("malformed code_verifier"));
                }
                if !pkce::verify_challenge(&challenge, verifier) {
                    return Err(AppError::auth_invalid("code_verifier does not match"));
                }
            }
            (Some(_), None) => {
                return Err(AppError::auth_invalid("code_verifier required"));
            }
            (None, Some(_)) => {
                return Err(AppError::auth_invalid(
                    "no code_challenge associated with this code",
                ));
            }
            (None, None) => {}
        }

        Ok(record)
    }

    /// Issue a long-lived refresh token
    ///
    /// # Errors
    /// Returns an error on RNG or storage failure
    pub async fn issue_refresh_token(
        &self,
        client_id: &str,
        user_id: &str,
        scopes: &[String],
    ) -> AppResult<String> {
        let raw = generate_secure_token(REFRESH_TOKEN_BYTES)?;
        self.tokens
            .save(TokenRecord {
                signature: hash_token(&raw),
                user_code: None,
                client_id: client_id.to_owned(),
                user_id: user_id.to_owned(),
                scopes: scopes.to_vec(),
                expires_at: Utc::now() + Duration::seconds(self.lifespans.refresh_token_secs),
                token_type: TokenType::RefreshToken,
                approved: true,
                created_at: Utc::now(),
            })
            .await?;
        Ok(raw)
    }

    /// Validate a refresh token without consuming it
    ///
    /// Refresh tokens are multi-use until revoked or expired; an expired
    /// record is deleted on sight.
    ///
    /// # Errors
    /// Returns an auth error for unknown, expired, or mismatched tokens
    pub async fn validate_refresh_token(
        &self,
        raw_token: &str,
        client_id: &str,
    ) -> AppResult<TokenRecord> {
        let signature = hash_token(raw_token);
        let record = self
            .tokens
            .get_by_signature(&signature)
            .await?
            .ok_or_else(|| AppError::auth_invalid("invalid refresh token"))?;

        if record.token_type != TokenType::RefreshToken {
            return Err(AppError::auth_invalid("invalid refresh token"));
        }
        if record.is_expired() {
            self.tokens.delete_by_signature(&signature).await?;
            return Err(AppError::auth_expired("refresh token expired"));
        }
        if record.client_id != client_id {
            return Err(AppError::auth_invalid(
                "refresh token issued to a different client",
            ));
        }
        Ok(record)
    }

    /// Issue a device code pair: the polling credential and the human-entry
    /// code
    ///
    /// # Errors
    /// Returns an error on RNG or storage failure
    pub async fn issue_device_code(
        &self,
        client_id: &str,
        scopes: &[String],
    ) -> AppResult<(String, String)> {
        let raw = generate_secure_token(CODE_BYTES)?;
        // 3 random bytes encode to 4 base64url characters, so 7 bytes yield
        // exactly the 10-character code users type in.
        let user_code = generate_secure_token(USER_CODE_CHARS * 3 / 4)?.to_uppercase();

        self.tokens
            .save(TokenRecord {
                signature: hash_token(&raw),
                user_code: Some(user_code.clone()),
                client_id: client_id.to_owned(),
                user_id: String::new(),
                scopes: scopes.to_vec(),
                expires_at: Utc::now() + Duration::seconds(self.lifespans.device_code_secs),
                token_type: TokenType::DeviceCode,
                approved: false,
                created_at: Utc::now(),
            })
            .await?;

        Ok((raw, user_code))
    }

    /// Approve a pending device authorization by its human-entry code
    ///
    /// Binds the authenticated user to the record and flips the approval flag.
    ///
    /// # Errors
    /// Returns an error for unknown, expired, or already-approved codes
    pub async fn approve_device_code(&self, user_code: &str, user_id: &str) -> AppResult<()> {
        let normalized = user_code.trim().to_uppercase();
        let mut record = self
            .tokens
            .get_by_user_code(&normalized)
            .await?
            .ok_or_else(|| AppError::not_found("unknown user code"))?;

        if record.is_expired() {
            return Err(AppError::auth_expired("device code expired"));
        }
        if record.approved {
            return Err(AppError::invalid_input("device code already approved"));
        }

        record.approved = true;
        record.user_id = user_id.to_owned();
        self.tokens.update(record).await?;
        Ok(())
    }

    /// Attempt to redeem a device code from the polling loop
    ///
    /// Unapproved records are left in place and reported as pending. Approved
    /// records are consumed atomically, so of any number of concurrent polls
    /// exactly one redeems the grant.
    ///
    /// # Errors
    /// Returns an auth error for unknown, expired, or mismatched codes
    pub async fn redeem_device_code(
        &self,
        raw_code: &str,
        client_id: &str,
    ) -> AppResult<DeviceGrantState> {
        let signature = hash_token(raw_code);
        let record = self
            .tokens
            .get_by_signature(&signature)
            .await?
            .ok_or_else(|| AppError::auth_invalid("invalid device code"))?;

        if record.token_type != TokenType::DeviceCode {
            return Err(AppError::auth_invalid("invalid device code"));
        }
        // Client binding is checked before expiry: a non-owning client never
        // learns whether the code has expired.
        if record.client_id != client_id {
            return Err(AppError::auth_invalid(
                "device code issued to a different client",
            ));
        }
        if record.is_expired() {
            self.tokens.delete_by_signature(&signature).await?;
            return Err(AppError::auth_expired("device code expired"));
        }
        if !record.approved {
            return Ok(DeviceGrantState::Pending);
        }

        // Approved: consume exactly once. A concurrent winner leaves nothing
        // behind, and the loser is told the code is invalid.
        match self.tokens.consume_by_signature(&signature).await? {
            Some(consumed) => Ok(DeviceGrantState::Approved(consumed)),
            None => Err(AppError::auth_invalid("invalid device code")),
        }
    }

    /// Delete whatever record the raw token maps to
    ///
    /// Deleting an unknown token is a no-op; revocation never reports whether
    /// the token existed.
    ///
    /// # Errors
    /// Returns an error on storage failure
    pub async fn revoke(&self, raw_token: &str) -> AppResult<()> {
        self.tokens.delete_by_signature(&hash_token(raw_token)).await
    }

    /// Non-consuming lookup for introspection
    ///
    /// Expired records read as absent.
    ///
    /// # Errors
    /// Returns an error on storage failure
    pub async fn peek(&self, raw_token: &str) -> AppResult<Option<TokenRecord>> {
        let record = self.tokens.get_by_signature(&hash_token(raw_token)).await?;
        Ok(record.filter(|r| !r.is_expired()))
    }
}
