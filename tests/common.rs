// ABOUTME: Shared helpers for integration tests
// ABOUTME: Builds a full in-memory server stack and drives it through tower oneshot
//
// SPDX-License-Identifier: MIT OR Apache-2.0

#![allow(dead_code)]

use axum::body::{to_bytes, Body};
use axum::http::{header, HeaderMap, Request, StatusCode};
use axum::Router;
use oauth2_provider::clients::{ClientDirectory, ClientRegistration, RegisteredClient};
use oauth2_provider::jwks::{JwksManager, RsaKeyPair};
use oauth2_provider::oauth2::endpoints::AuthorizationServer;
use oauth2_provider::oauth2::routes;
use oauth2_provider::storage::memory::{
    InMemoryClientStore, InMemoryPkceStore, InMemoryTokenStore,
};
use oauth2_provider::tokens::TokenService;
use std::sync::{Arc, Once};
use tower::ServiceExt;

static INIT_LOGGING: Once = Once::new();

/// Install a test subscriber once per test binary
pub fn init_test_logging() {
    INIT_LOGGING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter("info")
            .with_test_writer()
            .try_init();
    });
}

pub const TEST_ISSUER: &str = "https://auth.test";

/// A fully wired in-memory server for HTTP-level tests
pub struct TestHarness {
    pub app: Router,
    pub clients: Arc<ClientDirectory>,
    pub server: Arc<AuthorizationServer>,
}

/// Build the full stack with a small test signing key
pub async fn harness() -> TestHarness {
    init_test_logging();

    let clients = Arc::new(ClientDirectory::new(Arc::new(InMemoryClientStore::new())));
    let tokens = Arc::new(TokenService::new(
        Arc::new(InMemoryTokenStore::new()),
        Arc::new(InMemoryPkceStore::new()),
    ));
    let key_pair = RsaKeyPair::generate_with_key_size(2048).unwrap();
    let jwks = Arc::new(JwksManager::new(&key_pair, TEST_ISSUER, 3600).unwrap());

    let server = Arc::new(
        AuthorizationServer::new(
            Arc::clone(&clients),
            tokens,
            jwks,
            format!("{TEST_ISSUER}/device"),
        )
        .unwrap(),
    );
    TestHarness {
        app: routes::routes(Arc::clone(&server)),
        clients,
        server,
    }
}

impl TestHarness {
    /// Register a client with the given grant types and scopes
    pub async fn register_client(
        &self,
        grant_types: &[&str],
        scopes: &[&str],
        jwks_url: Option<String>,
    ) -> RegisteredClient {
        self.clients
            .register(ClientRegistration {
                name: "Integration Test Client".into(),
                redirect_uris: vec!["https://app.test/cb".into()],
                grant_types: grant_types.iter().map(|s| (*s).to_owned()).collect(),
                response_types: vec!["code".into()],
                scopes: scopes.iter().map(|s| (*s).to_owned()).collect(),
                jwks_url,
            })
            .await
            .unwrap()
    }
}

/// POST a form body and decode the JSON response
pub async fn post_form(
    app: &Router,
    path: &str,
    params: &[(&str, &str)],
) -> (StatusCode, serde_json::Value, HeaderMap) {
    post_form_with_bearer(app, path, params, None).await
}

/// POST a form body with an optional bearer token
pub async fn post_form_with_bearer(
    app: &Router,
    path: &str,
    params: &[(&str, &str)],
    bearer: Option<&str>,
) -> (StatusCode, serde_json::Value, HeaderMap) {
    let body = serde_urlencoded::to_string(params).unwrap();
    let mut builder = Request::builder()
        .method("POST")
        .uri(path)
        .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded");
    if let Some(token) = bearer {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    let request = builder.body(Body::from(body)).unwrap();

    let response = app.clone().oneshot(request).await.unwrap();
    decompose(response).await
}

/// GET a path and decode the JSON response
pub async fn get_json(app: &Router, path: &str) -> (StatusCode, serde_json::Value, HeaderMap) {
    let request = Request::builder()
        .method("GET")
        .uri(path)
        .body(Body::empty())
        .unwrap();
    let response = app.clone().oneshot(request).await.unwrap();
    decompose(response).await
}

async fn decompose(
    response: axum::response::Response,
) -> (StatusCode, serde_json::Value, HeaderMap) {
    let status = response.status();
    let headers = response.headers().clone();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let json = if bytes.is_empty() {
        serde_json::Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, json, headers)
}
