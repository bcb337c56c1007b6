// ABOUTME: Asymmetric key management and RS256 access token signing/verification
// ABOUTME: Owns the process key pair, publishes the JWKS document, verifies inbound tokens
//
// SPDX-License-Identifier: MIT OR Apache-2.0

//! # Key/Signing Manager
//!
//! One RSA key pair is generated (or loaded) at startup, tagged with a key id,
//! and held immutably for the process lifetime. Access tokens are RS256-signed
//! JWTs carrying the `kid` in their header; only the public half is ever
//! published, as a JWKS document.
//!
//! Verification happens at untrusted boundaries (introspection callers,
//! resource servers), so any verification failure collapses to one generic
//! invalid outcome - no detail leaks about whether a token was expired,
//! malformed, or never issued.

use crate::errors::{AppError, AppResult};
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use rsa::{
    pkcs8::{DecodePrivateKey, EncodePrivateKey, EncodePublicKey},
    traits::PublicKeyParts,
    RsaPrivateKey, RsaPublicKey,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// RSA key size in bits for RS256
const RSA_KEY_SIZE: usize = 2048;

/// Claims encoded into every signed access token
///
/// Never persisted; any holder of the public key reconstructs them from the
/// token itself.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Issuer - this server's configured issuer URL
    pub iss: String,
    /// Subject - user id, or client id for client-only grants
    pub sub: String,
    /// Audience - the client the token was minted for
    pub aud: Vec<String>,
    /// Client the token was issued to
    pub client_id: String,
    /// Granted scopes
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub scope: Vec<String>,
    /// Expiry (unix seconds)
    pub exp: i64,
    /// Not valid before (unix seconds)
    pub nbf: i64,
    /// Issued at (unix seconds)
    pub iat: i64,
    /// Unique token id
    pub jti: String,
}

/// JWK (JSON Web Key) representation for the key-publication endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonWebKey {
    /// Key type (always "RSA")
    pub kty: String,
    /// Public key use (always "sig")
    #[serde(rename = "use")]
    pub key_use: String,
    /// Key ID
    pub kid: String,
    /// Algorithm (RS256)
    pub alg: String,
    /// RSA modulus (base64url encoded)
    pub n: String,
    /// RSA exponent (base64url encoded)
    pub e: String,
}

/// JWKS (JSON Web Key Set) container
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonWebKeySet {
    /// Array of public keys
    pub keys: Vec<JsonWebKey>,
}

/// RSA key pair tagged with a key id
#[derive(Clone)]
pub struct RsaKeyPair {
    /// Unique key identifier, embedded in token headers
    pub kid: String,
    /// Private key for signing
    private_key: RsaPrivateKey,
    /// Public key for verification
    public_key: RsaPublicKey,
}

impl RsaKeyPair {
    /// Generate a new key pair with the default key size
    ///
    /// # Errors
    /// Returns an error if key generation fails
    pub fn generate() -> AppResult<Self> {
        Self::generate_with_key_size(RSA_KEY_SIZE)
    }

    /// Generate a key pair with a specific key size (smaller keys for tests)
    ///
    /// # Errors
    /// Returns an error if key generation fails
    pub fn generate_with_key_size(key_size_bits: usize) -> AppResult<Self> {
        use rand::rngs::OsRng;

        let mut rng = OsRng;
        let private_key = RsaPrivateKey::new(&mut rng, key_size_bits)
            .map_err(|e| AppError::crypto(format!("failed to generate RSA private key: {e}")))?;
        let public_key = RsaPublicKey::from(&private_key);

        Ok(Self {
            kid: Uuid::new_v4().to_string(),
            private_key,
            public_key,
        })
    }

    /// Import a private key from PKCS#8 PEM, tagging it with a fresh key id
    ///
    /// # Errors
    /// Returns an error if PEM parsing fails
    pub fn from_private_key_pem(pem: &str) -> AppResult<Self> {
        let private_key = RsaPrivateKey::from_pkcs8_pem(pem)
            .map_err(|e| AppError::crypto(format!("failed to parse private key PEM: {e}")))?;
        let public_key = RsaPublicKey::from(&private_key);

        Ok(Self {
            kid: Uuid::new_v4().to_string(),
            private_key,
            public_key,
        })
    }

    /// Export the private key as PKCS#8 PEM
    ///
    /// # Errors
    /// Returns an error if PEM encoding fails
    pub fn export_private_key_pem(&self) -> AppResult<String> {
        self.private_key
            .to_pkcs8_pem(rsa::pkcs8::LineEnding::LF)
            .map(|pem| pem.to_string())
            .map_err(|e| AppError::crypto(format!("failed to export private key as PEM: {e}")))
    }

    /// Convert the public half to JWK format
    #[must_use]
    pub fn to_jwk(&self) -> JsonWebKey {
        let n_bytes = self.public_key.n().to_bytes_be();
        let e_bytes = self.public_key.e().to_bytes_be();

        JsonWebKey {
            kty: "RSA".to_owned(),
            key_use: "sig".to_owned(),
            kid: self.kid.clone(),
            alg: "RS256".to_owned(),
            n: URL_SAFE_NO_PAD.encode(&n_bytes),
            e: URL_SAFE_NO_PAD.encode(&e_bytes),
        }
    }
}

/// Key/Signing manager holding the process key pair
///
/// Constructed once at startup and shared read-only across request tasks; the
/// signing material never changes after construction.
pub struct JwksManager {
    kid: String,
    issuer: String,
    access_token_lifespan_secs: i64,
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    jwk: JsonWebKey,
}

impl JwksManager {
    /// Build a manager from a key pair, issuer URL, and access token lifespan
    ///
    /// # Errors
    /// Returns an error if the key material cannot be converted for signing
    pub fn new(
        key_pair: &RsaKeyPair,
        issuer: impl Into<String>,
        access_token_lifespan_secs: i64,
    ) -> AppResult<Self> {
        let private_pem = key_pair.export_private_key_pem()?;
        let encoding_key = EncodingKey::from_rsa_pem(private_pem.as_bytes())
            .map_err(|e| AppError::crypto(format!("failed to create encoding key: {e}")))?;

        let public_pem = key_pair
            .public_key
            .to_public_key_pem(rsa::pkcs8::LineEnding::LF)
            .map_err(|e| AppError::crypto(format!("failed to export public key as PEM: {e}")))?;
        let decoding_key = DecodingKey::from_rsa_pem(public_pem.as_bytes())
            .map_err(|e| AppError::crypto(format!("failed to create decoding key: {e}")))?;

        Ok(Self {
            kid: key_pair.kid.clone(),
            issuer: issuer.into(),
            access_token_lifespan_secs,
            encoding_key,
            decoding_key,
            jwk: key_pair.to_jwk(),
        })
    }

    /// The key id of the active signing key
    #[must_use]
    pub fn kid(&self) -> &str {
        &self.kid
    }

    /// The configured issuer URL
    #[must_use]
    pub fn issuer(&self) -> &str {
        &self.issuer
    }

    /// Configured access token lifespan in seconds
    #[must_use]
    pub fn access_token_lifespan_secs(&self) -> i64 {
        self.access_token_lifespan_secs
    }

    /// Mint a signed access token
    ///
    /// Claims: issuer from configuration, audience bound to the client, fresh
    /// random `jti`, `nbf`/`iat` at now, expiry at now + lifespan. The key id
    /// is embedded in the token header for verifier key selection.
    ///
    /// # Errors
    /// Returns an error if signing fails
    pub fn sign_access_token(
        &self,
        subject: &str,
        client_id: &str,
        scopes: &[String],
    ) -> AppResult<String> {
        let now = Utc::now();
        let claims = Claims {
            iss: self.issuer.clone(),
            sub: subject.to_owned(),
            aud: vec![client_id.to_owned()],
            client_id: client_id.to_owned(),
            scope: scopes.to_vec(),
            exp: (now + Duration::seconds(self.access_token_lifespan_secs)).timestamp(),
            nbf: now.timestamp(),
            iat: now.timestamp(),
            jti: Uuid::new_v4().to_string(),
        };

        let mut header = Header::new(Algorithm::RS256);
        header.kid = Some(self.kid.clone());

        encode(&header, &claims, &self.encoding_key)
            .map_err(|e| AppError::crypto(format!("failed to sign access token: {e}")))
    }

    /// Verify a signed access token and return its claims
    ///
    /// Enforces the RS256 algorithm family (algorithm-confusion defense),
    /// signature, expiry, and not-before. Every failure collapses to the same
    /// generic invalid outcome.
    ///
    /// # Errors
    /// Returns a generic invalid-token error on any verification failure
    pub fn verify_access_token(&self, token: &str) -> AppResult<Claims> {
        let mut validation = Validation::new(Algorithm::RS256);
        validation.validate_nbf = true;
        // Audience varies per issued token (it is the client_id); verifiers
        // that care about audience check the claim themselves.
        validation.validate_aud = false;
        validation.set_issuer(&[&self.issuer]);

        decode::<Claims>(token, &self.decoding_key, &validation)
            .map(|data| data.claims)
            .map_err(|e| {
                tracing::debug!("access token verification failed: {e}");
                AppError::auth_invalid("invalid token")
            })
    }

    /// The key-publication document: public key only, tagged with kid,
    /// algorithm, and signature usage
    #[must_use]
    pub fn key_set(&self) -> JsonWebKeySet {
        JsonWebKeySet {
            keys: vec![self.jwk.clone()],
        }
    }
}
