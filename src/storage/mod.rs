// ABOUTME: Storage contracts for tokens, PKCE challenges, and client registrations
// ABOUTME: Async traits so the in-memory backend can be swapped for a database later
//
// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::errors::AppResult;
use crate::models::{Client, TokenRecord};
use async_trait::async_trait;

/// In-memory backend backed by concurrent maps
pub mod memory;

/// Persistence contract for opaque credentials (codes, refresh tokens,
/// device codes)
///
/// Records are keyed by signature; raw token values never reach this layer.
#[async_trait]
pub trait TokenStore: Send + Sync {
    /// Persist a new record
    ///
    /// # Errors
    /// Returns an error if the backend rejects the write
    async fn save(&self, record: TokenRecord) -> AppResult<()>;

    /// Look up a record by signature without consuming it
    ///
    /// # Errors
    /// Returns an error on backend failure
    async fn get_by_signature(&self, signature: &str) -> AppResult<Option<TokenRecord>>;

    /// Look up a device flow record by its human-entry code
    ///
    /// # Errors
    /// Returns an error on backend failure
    async fn get_by_user_code(&self, user_code: &str) -> AppResult<Option<TokenRecord>>;

    /// Atomically fetch and delete a record by signature
    ///
    /// At most one caller observes any given record; concurrent callers with
    /// the same signature see `None`.
    ///
    /// # Errors
    /// Returns an error on backend failure
    async fn consume_by_signature(&self, signature: &str) -> AppResult<Option<TokenRecord>>;

    /// Replace an existing record (same signature)
    ///
    /// # Errors
    /// Returns an error on backend failure
    async fn update(&self, record: TokenRecord) -> AppResult<()>;

    /// Delete a record by signature; deleting a missing record is not an error
    ///
    /// # Errors
    /// Returns an error on backend failure
    async fn delete_by_signature(&self, signature: &str) -> AppResult<()>;

    /// Number of stored records
    ///
    /// # Errors
    /// Returns an error on backend failure
    async fn count(&self) -> AppResult<usize>;
}

/// Persistence contract for pending PKCE challenges
///
/// Challenges are keyed by the authorization code's signature and live only
/// until the code is exchanged or expires.
#[async_trait]
pub trait PkceStore: Send + Sync {
    /// Store a challenge against a code signature with a time-to-live
    ///
    /// # Errors
    /// Returns an error on backend failure
    async fn save(&self, code_signature: &str, challenge: &str, ttl_secs: i64) -> AppResult<()>;

    /// Atomically fetch and delete the challenge for a code signature
    ///
    /// Expired challenges are treated as absent.
    ///
    /// # Errors
    /// Returns an error on backend failure
    async fn take(&self, code_signature: &str) -> AppResult<Option<String>>;
}

/// Persistence contract for client registrations
#[async_trait]
pub trait ClientStore: Send + Sync {
    /// Look up a client by id
    ///
    /// # Errors
    /// Returns an error on backend failure
    async fn get_by_client_id(&self, client_id: &str) -> AppResult<Option<Client>>;

    /// Persist a new client registration
    ///
    /// # Errors
    /// Returns an error if the client id is already registered
    async fn create(&self, client: Client) -> AppResult<()>;

    /// Replace an existing registration (same client id)
    ///
    /// # Errors
    /// Returns an error if the client does not exist
    async fn update(&self, client: Client) -> AppResult<()>;

    /// Delete a registration
    ///
    /// # Errors
    /// Returns an error on backend failure
    async fn delete(&self, client_id: &str) -> AppResult<()>;
}
