// ABOUTME: Client registry - registration, lookup, and secret authentication
// ABOUTME: Secrets are argon2-hashed at creation; authentication failures are indistinguishable
//
// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::crypto::secrets::generate_secure_token;
use crate::errors::{AppError, AppResult};
use crate::models::Client;
use crate::storage::ClientStore;
use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use chrono::Utc;
use std::sync::Arc;

/// Entropy in bytes for generated client ids
const CLIENT_ID_BYTES: usize = 16;
/// Entropy in bytes for generated client secrets
const CLIENT_SECRET_BYTES: usize = 32;

/// Parameters for registering a new client
#[derive(Debug, Clone)]
pub struct ClientRegistration {
    /// Display name
    pub name: String,
    /// Redirect URIs for authorization code flow
    pub redirect_uris: Vec<String>,
    /// Grant types the client may use
    pub grant_types: Vec<String>,
    /// Response types the client may use
    pub response_types: Vec<String>,
    /// Scopes the client may request
    pub scopes: Vec<String>,
    /// Key-publication URL for the jwt-bearer grant
    pub jwks_url: Option<String>,
}

/// A freshly registered client together with its plaintext secret
///
/// The secret exists only in this value; afterwards only its hash survives.
#[derive(Debug)]
pub struct RegisteredClient {
    /// The stored registration
    pub client: Client,
    /// Plaintext secret, shown exactly once
    pub client_secret: String,
}

/// Client registry coordinating storage and secret verification
pub struct ClientDirectory {
    store: Arc<dyn ClientStore>,
}

impl ClientDirectory {
    /// Create a directory over the given backend
    #[must_use]
    pub fn new(store: Arc<dyn ClientStore>) -> Self {
        Self { store }
    }

    /// Register a new client, generating its id and secret
    ///
    /// # Errors
    /// Returns an error on RNG failure, hashing failure, or storage failure
    pub async fn register(&self, registration: ClientRegistration) -> AppResult<RegisteredClient> {
        let client_id = format!("client_{}", generate_secure_token(CLIENT_ID_BYTES)?);
        let client_secret = generate_secure_token(CLIENT_SECRET_BYTES)?;
        let client_secret_hash = hash_client_secret(&client_secret)?;

        let now = Utc::now();
        let client = Client {
            client_id,
            client_secret_hash,
            name: registration.name,
            redirect_uris: registration.redirect_uris,
            grant_types: registration.grant_types,
            response_types: registration.response_types,
            scopes: registration.scopes,
            jwks_url: registration.jwks_url,
            created_at: now,
            updated_at: now,
        };
        self.store.create(client.clone()).await?;

        tracing::info!(client_id = %client.client_id, "registered OAuth2 client");
        Ok(RegisteredClient {
            client,
            client_secret,
        })
    }

    /// Look up a client without authenticating it
    ///
    /// # Errors
    /// Returns an error on storage failure
    pub async fn lookup(&self, client_id: &str) -> AppResult<Option<Client>> {
        self.store.get_by_client_id(client_id).await
    }

    /// Authenticate a client by id and secret
    ///
    /// An unknown client id and a wrong secret produce the same error, so a
    /// caller cannot probe which client ids exist.
    ///
    /// # Errors
    /// Returns an authentication error for unknown ids or mismatched secrets
    pub async fn authenticate(&self, client_id: &str, client_secret: &str) -> AppResult<Client> {
        let invalid = || AppError::auth_invalid("invalid client credentials");

        let client = self
            .store
            .get_by_client_id(client_id)
            .await?
            .ok_or_else(invalid)?;

        if verify_client_secret(client_secret, &client.client_secret_hash) {
            Ok(client)
        } else {
            Err(invalid())
        }
    }
}

/// Hash a plaintext client secret with argon2
///
/// # Errors
/// Returns an error if hashing fails
pub fn hash_client_secret(secret: &str) -> AppResult<String> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(secret.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| AppError::crypto(format!("failed to hash client secret: {e}")))
}

/// Verify a plaintext secret against a stored argon2 hash
#[must_use]
pub fn verify_client_secret(secret: &str, stored_hash: &str) -> bool {
    let Ok(parsed) = PasswordHash::new(stored_hash) else {
        return false;
    };
    Argon2::default()
        .verify_password(secret.as_bytes(), &parsed)
        .is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::grant_types;
    use crate::storage::memory::InMemoryClientStore;

    fn directory() -> ClientDirectory {
        ClientDirectory::new(Arc::new(InMemoryClientStore::new()))
    }

    fn sample_registration() -> ClientRegistration {
        ClientRegistration {
            name: "Test App".into(),
            redirect_uris: vec!["https://app.test/cb".into()],
            grant_types: vec![grant_types::AUTHORIZATION_CODE.into()],
            response_types: vec!["code".into()],
            scopes: vec!["read".into()],
            jwks_url: None,
        }
    }

    #[test]
    fn test_secret_hash_round_trip() {
        let hash = hash_client_secret("s3cret").unwrap();
        assert!(hash.starts_with("$argon2"));
        assert!(verify_client_secret("s3cret", &hash));
        assert!(!verify_client_secret("other", &hash));
    }

    #[test]
    fn test_verify_rejects_malformed_hash() {
        assert!(!verify_client_secret("s3cret", "not-a-phc-string"));
    }

    #[tokio::test]
    async fn test_register_then_authenticate() {
        let directory = directory();
        let registered = directory.register(sample_registration()).await.unwrap();
        assert!(registered.client.client_id.starts_with("client_"));

        let authenticated = directory
            .authenticate(&registered.client.client_id, &registered.client_secret)
            .await
            .unwrap();
        assert_eq!(authenticated.client_id, registered.client.client_id);
    }

    #[tokio::test]
    async fn test_unknown_client_and_wrong_secret_are_indistinguishable() {
        let directory = directory();
        let registered = directory.register(sample_registration()).await.unwrap();

        let unknown = directory
            .authenticate("client_nonexistent", "whatever")
            .await
            .unwrap_err();
        let mismatch = directory
            .authenticate(&registered.client.client_id, "wrong-secret")
            .await
            .unwrap_err();

        assert_eq!(unknown.code, mismatch.code);
        assert_eq!(unknown.message, mismatch.message);
    }

    #[tokio::test]
    async fn test_stored_client_never_holds_plaintext_secret() {
        let directory = directory();
        let registered = directory.register(sample_registration()).await.unwrap();
        assert!(!registered
            .client
            .client_secret_hash
            .contains(&registered.client_secret));
    }
}
