// ABOUTME: Secure token primitive - CSPRNG opaque strings and storage signatures
// ABOUTME: Raw tokens are handed out once; only the SHA-256 signature is ever persisted
//
// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::errors::{AppError, AppResult};
use base64::{engine::general_purpose, Engine as _};
use ring::rand::{SecureRandom, SystemRandom};
use sha2::{Digest, Sha256};

/// Generate a cryptographically random, URL-safe opaque string
///
/// `byte_length` is the entropy in bytes before encoding; the returned string
/// is base64url without padding (roughly 4/3 the length).
///
/// # Errors
/// Returns an error if the system RNG fails - the server cannot operate
/// securely without working RNG, so callers treat this as fatal.
pub fn generate_secure_token(byte_length: usize) -> AppResult<String> {
    let rng = SystemRandom::new();
    let mut bytes = vec![0u8; byte_length];

    rng.fill(&mut bytes).map_err(|e| {
        tracing::error!("CRITICAL: SystemRandom failed - cannot generate secure random bytes: {e}");
        AppError::crypto("System RNG failure")
    })?;

    Ok(general_purpose::URL_SAFE_NO_PAD.encode(&bytes))
}

/// Compute the storage signature of a raw token
///
/// Deterministic SHA-256, base64url-encoded. No secret key is involved, so any
/// holder of the raw token can re-derive the signature for lookup, while the
/// stored value reveals nothing about the raw token.
#[must_use]
pub fn hash_token(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    general_purpose::URL_SAFE_NO_PAD.encode(hasher.finalize())
}
