// ABOUTME: In-memory storage backends built on concurrent hash maps
// ABOUTME: DashMap::remove provides the atomic fetch-and-delete that single-use codes need
//
// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::errors::{AppError, AppResult};
use crate::models::{Client, TokenRecord};
use crate::storage::{ClientStore, PkceStore, TokenStore};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;

/// In-memory token store keyed by signature
#[derive(Default)]
pub struct InMemoryTokenStore {
    records: DashMap<String, TokenRecord>,
}

impl InMemoryTokenStore {
    /// Create an empty store
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TokenStore for InMemoryTokenStore {
    async fn save(&self, record: TokenRecord) -> AppResult<()> {
        self.records.insert(record.signature.clone(), record);
        Ok(())
    }

    async fn get_by_signature(&self, signature: &str) -> AppResult<Option<TokenRecord>> {
        Ok(self.records.get(signature).map(|r| r.clone()))
    }

    async fn get_by_user_code(&self, user_code: &str) -> AppResult<Option<TokenRecord>> {
        Ok(self
            .records
            .iter()
            .find(|r| r.user_code.as_deref() == Some(user_code))
            .map(|r| r.clone()))
    }

    async fn consume_by_signature(&self, signature: &str) -> AppResult<Option<TokenRecord>> {
        // DashMap::remove is atomic per key: exactly one concurrent caller
        // gets the record, the rest get None.
        Ok(self.records.remove(signature).map(|(_, record)| record))
    }

    async fn update(&self, record: TokenRecord) -> AppResult<()> {
        if !self.records.contains_key(&record.signature) {
            return Err(AppError::not_found("token record not found"));
        }
        self.records.insert(record.signature.clone(), record);
        Ok(())
    }

    async fn delete_by_signature(&self, signature: &str) -> AppResult<()> {
        self.records.remove(signature);
        Ok(())
    }

    async fn count(&self) -> AppResult<usize> {
        Ok(self.records.len())
    }
}

struct PkceEntry {
    challenge: String,
    expires_at: DateTime<Utc>,
}

/// In-memory PKCE challenge store keyed by code signature
///
/// Expiry is enforced lazily at `take` time; entries for never-exchanged codes
/// are overwritten or dropped with the process.
#[derive(Default)]
pub struct InMemoryPkceStore {
    entries: DashMap<String, PkceEntry>,
}

impl InMemoryPkceStore {
    /// Create an empty store
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PkceStore for InMemoryPkceStore {
    async fn save(&self, code_signature: &str, challenge: &str, ttl_secs: i64) -> AppResult<()> {
        self.entries.insert(
            code_signature.to_owned(),
            PkceEntry {
                challenge: challenge.to_owned(),
                expires_at: Utc::now() + Duration::seconds(ttl_secs),
            },
        );
        Ok(())
    }

    async fn take(&self, code_signature: &str) -> AppResult<Option<String>> {
        match self.entries.remove(code_signature) {
            Some((_, entry)) if Utc::now() <= entry.expires_at => Ok(Some(entry.challenge)),
            _ => Ok(None),
        }
    }
}

/// In-memory client registry keyed by client id
#[derive(Default)]
pub struct InMemoryClientStore {
    clients: DashMap<String, Client>,
}

impl InMemoryClientStore {
    /// Create an empty store
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ClientStore for InMemoryClientStore {
    async fn get_by_client_id(&self, client_id: &str) -> AppResult<Option<Client>> {
        Ok(self.clients.get(client_id).map(|c| c.clone()))
    }

    async fn create(&self, client: Client) -> AppResult<()> {
        use dashmap::mapref::entry::Entry;

        match self.clients.entry(client.client_id.clone()) {
            Entry::Vacant(slot) => {
                slot.insert(client);
                Ok(())
            }
            Entry::Occupied(_) => Err(AppError::invalid_input("client_id already registered")),
        }
    }

    async fn update(&self, client: Client) -> AppResult<()> {
        if !self.clients.contains_key(&client.client_id) {
            return Err(AppError::not_found("client not found"));
        }
        self.clients.insert(client.client_id.clone(), client);
        Ok(())
    }

    async fn delete(&self, client_id: &str) -> AppResult<()> {
        self.clients.remove(client_id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::TokenType;

    fn sample_record(signature: &str) -> TokenRecord {
        TokenRecord {
            signature: signature.to_owned(),
            user_code: None,
            client_id: "client-1".into(),
            user_id: "user-1".into(),
            scopes: vec!["read".into()],
            expires_at: Utc::now() + Duration::minutes(10),
            token_type: TokenType::AuthorizationCode,
            approved: false,
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_consume_is_single_use() {
        let store = InMemoryTokenStore::new();
        store.save(sample_record("sig-1")).await.unwrap();

        assert!(store.consume_by_signature("sig-1").await.unwrap().is_some());
        assert!(store.consume_by_signature("sig-1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_concurrent_consume_yields_one_winner() {
        use std::sync::Arc;

        let store = Arc::new(InMemoryTokenStore::new());
        store.save(sample_record("sig-race")).await.unwrap();

        let mut handles = Vec::new();
        for _ in 0..16 {
            let store = Arc::clone(&store);
            handles.push(tokio::spawn(async move {
                store.consume_by_signature("sig-race").await.unwrap()
            }));
        }

        let mut winners = 0;
        for handle in handles {
            if handle.await.unwrap().is_some() {
                winners += 1;
            }
        }
        assert_eq!(winners, 1);
    }

    #[tokio::test]
    async fn test_user_code_lookup() {
        let store = InMemoryTokenStore::new();
        let mut record = sample_record("sig-device");
        record.token_type = TokenType::DeviceCode;
        record.user_code = Some("ABCD1234".into());
        store.save(record).await.unwrap();

        let found = store.get_by_user_code("ABCD1234").await.unwrap();
        assert_eq!(found.unwrap().signature, "sig-device");
        assert!(store.get_by_user_code("ZZZZ0000").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_update_requires_existing_record() {
        let store = InMemoryTokenStore::new();
        let record = sample_record("sig-missing");
        assert!(store.update(record.clone()).await.is_err());

        store.save(record.clone()).await.unwrap();
        let mut updated = record;
        updated.approved = true;
        store.update(updated).await.unwrap();
        assert!(store.get_by_signature("sig-missing").await.unwrap().unwrap().approved);
    }

    #[tokio::test]
    async fn test_count_tracks_saves_and_deletes() {
        let store = InMemoryTokenStore::new();
        assert_eq!(store.count().await.unwrap(), 0);

        store.save(sample_record("sig-a")).await.unwrap();
        store.save(sample_record("sig-b")).await.unwrap();
        assert_eq!(store.count().await.unwrap(), 2);

        store.delete_by_signature("sig-a").await.unwrap();
        assert_eq!(store.count().await.unwrap(), 1);
        assert!(store.consume_by_signature("sig-b").await.unwrap().is_some());
        assert_eq!(store.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_pkce_take_is_single_use() {
        let store = InMemoryPkceStore::new();
        store.save("code-sig", "challenge-value", 600).await.unwrap();

        assert_eq!(
            store.take("code-sig").await.unwrap().as_deref(),
            Some("challenge-value")
        );
        assert!(store.take("code-sig").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_pkce_expired_entry_treated_as_absent() {
        let store = InMemoryPkceStore::new();
        store.save("code-sig", "challenge-value", -1).await.unwrap();
        assert!(store.take("code-sig").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_client_create_rejects_duplicate_id() {
        use crate::models::grant_types;

        let store = InMemoryClientStore::new();
        let client = Client {
            client_id: "client-1".into(),
            client_secret_hash: "hash".into(),
            name: "First".into(),
            redirect_uris: vec![],
            grant_types: vec![grant_types::CLIENT_CREDENTIALS.into()],
            response_types: vec![],
            scopes: vec![],
            jwks_url: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        store.create(client.clone()).await.unwrap();
        assert!(store.create(client).await.is_err());
    }
}
