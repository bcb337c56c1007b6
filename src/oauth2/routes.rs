// ABOUTME: Axum routes for the OAuth2 endpoints and key publication
// ABOUTME: Token responses carry no-store cache headers; JWKS is publicly cacheable
//
// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::oauth2::endpoints::AuthorizationServer;
use crate::oauth2::models::{
    DeviceApprovalRequest, DeviceAuthorizationRequest, OAuth2Error, TokenRequest, TokenSubmission,
};
use axum::{
    extract::{Form, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde_json::json;
use std::sync::Arc;

/// Build the router for all OAuth2 and discovery endpoints
pub fn routes(server: Arc<AuthorizationServer>) -> Router {
    Router::new()
        .route("/oauth2/token", post(token))
        .route("/oauth2/device_authorization", post(device_authorization))
        .route("/oauth2/device/approve", post(approve_device))
        .route("/oauth2/introspect", post(introspect))
        .route("/oauth2/revoke", post(revoke))
        .route("/.well-known/jwks.json", get(jwks))
        .route("/health", get(health))
        .with_state(server)
}

async fn token(
    State(server): State<Arc<AuthorizationServer>>,
    Form(request): Form<TokenRequest>,
) -> Response {
    match server.token(request).await {
        Ok(response) => {
            // Token responses must never be cached (RFC 6749 §5.1)
            (
                StatusCode::OK,
                [
                    (header::CACHE_CONTROL, "no-store"),
                    (header::PRAGMA, "no-cache"),
                ],
                Json(response),
            )
                .into_response()
        }
        Err(err) => protocol_error(err),
    }
}

async fn device_authorization(
    State(server): State<Arc<AuthorizationServer>>,
    Form(request): Form<DeviceAuthorizationRequest>,
) -> Response {
    match server.device_authorization(request).await {
        Ok(response) => (StatusCode::OK, Json(response)).into_response(),
        Err(err) => protocol_error(err),
    }
}

async fn approve_device(
    State(server): State<Arc<AuthorizationServer>>,
    headers: HeaderMap,
    Form(request): Form<DeviceApprovalRequest>,
) -> Response {
    // The approving user authenticates with a bearer access token issued by
    // this server.
    let Some(user_id) = bearer_subject(&server, &headers) else {
        return (
            StatusCode::UNAUTHORIZED,
            Json(json!({"error": "invalid_token"})),
        )
            .into_response();
    };

    match server.approve_device(&request.user_code, &user_id).await {
        Ok(()) => (StatusCode::OK, Json(json!({"status": "approved"}))).into_response(),
        Err(err) => (
            StatusCode::from_u16(err.code.http_status()).unwrap_or(StatusCode::BAD_REQUEST),
            Json(json!({"error": err.message})),
        )
            .into_response(),
    }
}

async fn introspect(
    State(server): State<Arc<AuthorizationServer>>,
    Form(request): Form<TokenSubmission>,
) -> Response {
    match server.introspect(request).await {
        Ok(response) => (StatusCode::OK, Json(response)).into_response(),
        Err(err) => protocol_error(err),
    }
}

async fn revoke(
    State(server): State<Arc<AuthorizationServer>>,
    Form(request): Form<TokenSubmission>,
) -> Response {
    match server.revoke(request).await {
        Ok(()) => StatusCode::OK.into_response(),
        Err(err) => protocol_error(err),
    }
}

async fn jwks(State(server): State<Arc<AuthorizationServer>>) -> Response {
    (
        StatusCode::OK,
        [(header::CACHE_CONTROL, "public, max-age=3600")],
        Json(server.jwks().key_set()),
    )
        .into_response()
}

async fn health() -> Response {
    (StatusCode::OK, Json(json!({"status": "ok"}))).into_response()
}

fn protocol_error(err: OAuth2Error) -> Response {
    let status = StatusCode::from_u16(err.http_status()).unwrap_or(StatusCode::BAD_REQUEST);
    (status, Json(err)).into_response()
}

fn bearer_subject(server: &AuthorizationServer, headers: &HeaderMap) -> Option<String> {
    let raw = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let token = raw.strip_prefix("Bearer ")?;
    server
        .jwks()
        .verify_access_token(token)
        .ok()
        .map(|claims| claims.sub)
}
