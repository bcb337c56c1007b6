// ABOUTME: PKCE (RFC 7636) challenge derivation and verifier checking
// ABOUTME: Only the S256 method is supported; comparison is constant-time
//
// SPDX-License-Identifier: MIT OR Apache-2.0

use base64::{engine::general_purpose, Engine as _};
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

/// The only supported code challenge method
pub const METHOD_S256: &str = "S256";

/// Minimum verifier length per RFC 7636 §4.1
const VERIFIER_MIN_LEN: usize = 43;
/// Maximum verifier length per RFC 7636 §4.1
const VERIFIER_MAX_LEN: usize = 128;

/// Derive the S256 code challenge from a verifier
///
/// SHA-256 of the verifier bytes, base64url-encoded without padding.
#[must_use]
pub fn challenge_from_verifier(verifier: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(verifier.as_bytes());
    general_purpose::URL_SAFE_NO_PAD.encode(hasher.finalize())
}

/// Validate the verifier format per RFC 7636 §4.1
///
/// Length 43-128 and only unreserved characters:
/// `[A-Z] / [a-z] / [0-9] / "-" / "." / "_" / "~"`.
#[must_use]
pub fn is_valid_verifier(verifier: &str) -> bool {
    if verifier.len() < VERIFIER_MIN_LEN || verifier.len() > VERIFIER_MAX_LEN {
        return false;
    }
    verifier
        .chars()
        .all(|c| matches!(c, 'A'..='Z' | 'a'..='z' | '0'..='9' | '-' | '.' | '_' | '~'))
}

/// Compare a stored challenge against the challenge recomputed from a verifier
///
/// Constant-time comparison: the duration is independent of where a mismatch
/// occurs.
#[must_use]
pub fn verify_challenge(stored_challenge: &str, verifier: &str) -> bool {
    let computed = challenge_from_verifier(verifier);
    computed
        .as_bytes()
        .ct_eq(stored_challenge.as_bytes())
        .into()
}

#[cfg(test)]
mod tests {
    use super::*;

    // RFC 7636 appendix B test vector
    const RFC_VERIFIER: &str = "dBjftJeZ4CVP-mB92K27uhbUJU1p1r_wW1gFWFOEjXk";
    const RFC_CHALLENGE: &str = "E9Melhoa2OwvFrEMTJguCHaoeK1t8URWbuGJSstw-cM";

    #[test]
    fn test_challenge_matches_rfc_vector() {
        assert_eq!(challenge_from_verifier(RFC_VERIFIER), RFC_CHALLENGE);
    }

    #[test]
    fn test_verify_round_trip() {
        let challenge = challenge_from_verifier(RFC_VERIFIER);
        assert!(verify_challenge(&challenge, RFC_VERIFIER));
        assert!(!verify_challenge(&challenge, "a".repeat(43).as_str()));
    }

    #[test]
    fn test_verifier_length_bounds() {
        assert!(!is_valid_verifier(&"a".repeat(42)));
        assert!(is_valid_verifier(&"a".repeat(43)));
        assert!(is_valid_verifier(&"a".repeat(128)));
        assert!(!is_valid_verifier(&"a".repeat(129)));
    }

    #[test]
    fn test_verifier_charset() {
        assert!(is_valid_verifier(
            "ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnop-._~0123"
        ));
        assert!(!is_valid_verifier(&format!("{}+", "a".repeat(43))));
        assert!(!is_valid_verifier(&format!("{}!", "a".repeat(43))));
    }
}
