// ABOUTME: Grant engine - dispatches the five grant types and enforces client policy
// ABOUTME: Maps domain errors onto the RFC error vocabulary without leaking internals
//
// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::clients::ClientDirectory;
use crate::crypto::pkce;
use crate::errors::{AppError, AppResult, ErrorCode};
use crate::jwks::JwksManager;
use crate::models::{grant_types, Client, TokenType};
use crate::oauth2::assertion::AssertionVerifier;
use crate::oauth2::models::{
    DeviceAuthorizationRequest, DeviceAuthorizationResponse, IntrospectionResponse, OAuth2Error,
    TokenRequest, TokenResponse, TokenSubmission,
};
use crate::tokens::{DeviceGrantState, TokenService};
use std::sync::Arc;

/// Minimum device polling interval in seconds
const DEVICE_POLL_INTERVAL_SECS: u64 = 5;

/// The authorization server's grant engine
///
/// Owns no state of its own; it coordinates the client directory, the token
/// service, and the signing manager, and translates their outcomes into the
/// OAuth2 wire vocabulary.
pub struct AuthorizationServer {
    clients: Arc<ClientDirectory>,
    tokens: Arc<TokenService>,
    jwks: Arc<JwksManager>,
    assertions: AssertionVerifier,
    verification_uri: String,
}

impl AuthorizationServer {
    /// Assemble the engine
    ///
    /// `verification_uri` is where device flow users are sent to approve.
    ///
    /// # Errors
    /// Returns an error if the assertion verifier cannot be constructed
    pub fn new(
        clients: Arc<ClientDirectory>,
        tokens: Arc<TokenService>,
        jwks: Arc<JwksManager>,
        verification_uri: impl Into<String>,
    ) -> AppResult<Self> {
        let token_endpoint = format!("{}/oauth2/token", jwks.issuer());
        Ok(Self {
            clients,
            tokens,
            jwks,
            assertions: AssertionVerifier::new(token_endpoint)?,
            verification_uri: verification_uri.into(),
        })
    }

    /// The signing manager, for key publication and bearer verification
    #[must_use]
    pub fn jwks(&self) -> &JwksManager {
        &self.jwks
    }

    /// Token endpoint dispatch
    ///
    /// # Errors
    /// Returns the protocol error the failing step maps to
    pub async fn token(&self, request: TokenRequest) -> Result<TokenResponse, OAuth2Error> {
        match request.grant_type.as_str() {
            grant_types::AUTHORIZATION_CODE => self.handle_authorization_code(request).await,
            grant_types::CLIENT_CREDENTIALS => self.handle_client_credentials(request).await,
            grant_types::REFRESH_TOKEN => self.handle_refresh_token(request).await,
            grant_types::DEVICE_CODE => self.handle_device_code(request).await,
            grant_types::JWT_BEARER => self.handle_jwt_bearer(request).await,
            other => {
                tracing::debug!(grant_type = %other, "unsupported grant type requested");
                Err(OAuth2Error::unsupported_grant_type())
            }
        }
    }

    /// Issue an authorization code on behalf of the authorization endpoint
    ///
    /// Validates client existence, grant allow-list, redirect URI membership,
    /// scope subset, and the PKCE method before delegating to the token
    /// service. Only the S256 method is accepted.
    ///
    /// # Errors
    /// Returns the protocol error the failing check maps to
    pub async fn issue_authorization_code(
        &self,
        client_id: &str,
        redirect_uri: &str,
        user_id: &str,
        scope: Option<&str>,
        code_challenge: Option<&str>,
        code_challenge_method: Option<&str>,
    ) -> Result<String, OAuth2Error> {
        let client = self
            .lookup_client(client_id)
            .await?
            .ok_or_else(OAuth2Error::invalid_client)?;

        if !client.allows_grant_type(grant_types::AUTHORIZATION_CODE) {
            return Err(OAuth2Error::unauthorized_client());
        }
        if !client.has_redirect_uri(redirect_uri) {
            return Err(OAuth2Error::invalid_request("redirect_uri not registered"));
        }
        let scopes = self.resolve_scopes(&client, scope)?;

        if let Some(challenge) = code_challenge {
            if code_challenge_method != Some(pkce::METHOD_S256) {
                return Err(OAuth2Error::invalid_request(
                    "only the S256 code_challenge_method is supported",
                ));
            }
            if challenge.is_empty() {
                return Err(OAuth2Error::invalid_request("empty code_challenge"));
            }
        } else if code_challenge_method.is_some() {
            return Err(OAuth2Error::invalid_request(
                "code_challenge_method without code_challenge",
            ));
        }

        self.tokens
            .issue_authorization_code(client_id, user_id, &scopes, code_challenge)
            .await
            .map_err(internal_error)
    }

    /// Device authorization endpoint (RFC 8628 §3.1)
    ///
    /// # Errors
    /// Returns the protocol error the failing step maps to
    pub async fn device_authorization(
        &self,
        request: DeviceAuthorizationRequest,
    ) -> Result<DeviceAuthorizationResponse, OAuth2Error> {
        let client = self
            .authenticate(Some(&request.client_id), request.client_secret.as_deref())
            .await?;
        if !client.allows_grant_type(grant_types::DEVICE_CODE) {
            return Err(OAuth2Error::unauthorized_client());
        }
        let scopes = self.resolve_scopes(&client, request.scope.as_deref())?;

        let (device_code, user_code) = self
            .tokens
            .issue_device_code(&client.client_id, &scopes)
            .await
            .map_err(internal_error)?;

        tracing::info!(client_id = %client.client_id, "issued device authorization");
        Ok(DeviceAuthorizationResponse {
            device_code,
            user_code,
            verification_uri: self.verification_uri.clone(),
            expires_in: self.tokens.lifespans().device_code_secs,
            interval: DEVICE_POLL_INTERVAL_SECS,
        })
    }

    /// Approve a pending device authorization for an authenticated user
    ///
    /// # Errors
    /// Returns an error for unknown, expired, or already-approved codes
    pub async fn approve_device(&self, user_code: &str, user_id: &str) -> AppResult<()> {
        self.tokens.approve_device_code(user_code, user_id).await
    }

    /// Token revocation (RFC 7009)
    ///
    /// Only stored credentials are revocable, and only by their owning client.
    /// Once the caller has authenticated, every outcome is success: not-found,
    /// wrong owner, and actual deletion are indistinguishable, so the response
    /// never reveals whether the token existed.
    ///
    /// # Errors
    /// Returns `invalid_client` only when client authentication fails
    pub async fn revoke(&self, submission: TokenSubmission) -> Result<(), OAuth2Error> {
        let client = self
            .authenticate(
                submission.client_id.as_deref(),
                submission.client_secret.as_deref(),
            )
            .await?;

        match self.tokens.peek(&submission.token).await {
            Ok(Some(record)) if record.client_id == client.client_id => {
                if let Err(e) = self.tokens.revoke(&submission.token).await {
                    tracing::error!("revocation storage failure: {e}");
                }
            }
            Ok(_) => {}
            Err(e) => tracing::error!("revocation storage failure: {e}"),
        }
        Ok(())
    }

    /// Token introspection (RFC 7662)
    ///
    /// Tries the token first as a signed access token, then as an opaque
    /// stored credential. Anything else is `active: false` with no further
    /// detail.
    ///
    /// # Errors
    /// Returns `invalid_client` only when client authentication fails
    pub async fn introspect(
        &self,
        submission: TokenSubmission,
    ) -> Result<IntrospectionResponse, OAuth2Error> {
        self.authenticate(
            submission.client_id.as_deref(),
            submission.client_secret.as_deref(),
        )
        .await?;

        if let Ok(claims) = self.jwks.verify_access_token(&submission.token) {
            return Ok(IntrospectionResponse {
                active: true,
                scope: Some(claims.scope.join(" ")).filter(|s| !s.is_empty()),
                client_id: Some(claims.client_id),
                sub: Some(claims.sub),
                exp: Some(claims.exp),
                iat: Some(claims.iat),
                nbf: Some(claims.nbf),
                iss: Some(claims.iss),
                aud: Some(claims.aud),
                jti: Some(claims.jti),
                token_type: Some("access_token".to_owned()),
            });
        }

        Ok(match self.tokens.peek(&submission.token).await {
            Ok(Some(record)) => IntrospectionResponse {
                active: true,
                scope: Some(record.scopes.join(" ")).filter(|s| !s.is_empty()),
                client_id: Some(record.client_id),
                sub: Some(record.user_id).filter(|s| !s.is_empty()),
                exp: Some(record.expires_at.timestamp()),
                iat: Some(record.created_at.timestamp()),
                nbf: None,
                iss: None,
                aud: None,
                jti: None,
                token_type: Some(token_type_name(record.token_type).to_owned()),
            },
            Ok(None) => IntrospectionResponse::inactive(),
            Err(e) => {
                tracing::error!("introspection storage failure: {e}");
                IntrospectionResponse::inactive()
            }
        })
    }

    async fn handle_authorization_code(
        &self,
        request: TokenRequest,
    ) -> Result<TokenResponse, OAuth2Error> {
        let client = self
            .authenticate(request.client_id.as_deref(), request.client_secret.as_deref())
            .await?;
        if !client.allows_grant_type(grant_types::AUTHORIZATION_CODE) {
            return Err(OAuth2Error::unauthorized_client());
        }

        let code = request
            .code
            .as_deref()
            .ok_or_else(|| OAuth2Error::invalid_request("missing code"))?;
        if let Some(uri) = request.redirect_uri.as_deref() {
            if !client.has_redirect_uri(uri) {
                return Err(OAuth2Error::invalid_grant("redirect_uri mismatch"));
            }
        }

        let record = self
            .tokens
            .consume_authorization_code(code, &client.client_id, request.code_verifier.as_deref())
            .await
            .map_err(grant_error)?;

        let refresh_token = self
            .tokens
            .issue_refresh_token(&client.client_id, &record.user_id, &record.scopes)
            .await
            .map_err(internal_error)?;

        self.mint_response(&record.user_id, &client.client_id, &record.scopes)
            .map(|r| r.with_refresh_token(refresh_token))
    }

    async fn handle_client_credentials(
        &self,
        request: TokenRequest,
    ) -> Result<TokenResponse, OAuth2Error> {
        let client = self
            .authenticate(request.client_id.as_deref(), request.client_secret.as_deref())
            .await?;
        if !client.allows_grant_type(grant_types::CLIENT_CREDENTIALS) {
            return Err(OAuth2Error::unauthorized_client());
        }
        let scopes = self.resolve_scopes(&client, request.scope.as_deref())?;

        // Client-only grant: the client is its own subject, and no refresh
        // token is minted.
        self.mint_response(&client.client_id, &client.client_id, &scopes)
    }

    async fn handle_refresh_token(
        &self,
        request: TokenRequest,
    ) -> Result<TokenResponse, OAuth2Error> {
        let client = self
            .authenticate(request.client_id.as_deref(), request.client_secret.as_deref())
            .await?;
        if !client.allows_grant_type(grant_types::REFRESH_TOKEN) {
            return Err(OAuth2Error::unauthorized_client());
        }

        let refresh_token = request
            .refresh_token
            .as_deref()
            .ok_or_else(|| OAuth2Error::invalid_request("missing refresh_token"))?;
        let record = self
            .tokens
            .validate_refresh_token(refresh_token, &client.client_id)
            .await
            .map_err(grant_error)?;

        // Optional narrowing: a requested scope must stay within the original
        // grant.
        let scopes = match request.scope.as_deref() {
            Some(requested) => {
                let requested = parse_scope(requested);
                if requested.iter().any(|s| !record.scopes.contains(s)) {
                    return Err(OAuth2Error::invalid_scope(
                        "requested scope exceeds original grant",
                    ));
                }
                requested
            }
            None => record.scopes.clone(),
        };

        // Non-rotating: the presented refresh token stays valid, so the
        // response carries only the new access token.
        self.mint_response(&record.user_id, &client.client_id, &scopes)
    }

    async fn handle_device_code(
        &self,
        request: TokenRequest,
    ) -> Result<TokenResponse, OAuth2Error> {
        let client = self
            .authenticate(request.client_id.as_deref(), request.client_secret.as_deref())
            .await?;
        if !client.allows_grant_type(grant_types::DEVICE_CODE) {
            return Err(OAuth2Error::unauthorized_client());
        }

        let device_code = request
            .device_code
            .as_deref()
            .ok_or_else(|| OAuth2Error::invalid_request("missing device_code"))?;

        let record = match self
            .tokens
            .redeem_device_code(device_code, &client.client_id)
            .await
        {
            Ok(DeviceGrantState::Pending) => return Err(OAuth2Error::authorization_pending()),
            Ok(DeviceGrantState::Approved(record)) => record,
            Err(e) if e.code == ErrorCode::AuthExpired => return Err(OAuth2Error::expired_token()),
            Err(e) => return Err(grant_error(e)),
        };

        let refresh_token = self
            .tokens
            .issue_refresh_token(&client.client_id, &record.user_id, &record.scopes)
            .await
            .map_err(internal_error)?;

        self.mint_response(&record.user_id, &client.client_id, &record.scopes)
            .map(|r| r.with_refresh_token(refresh_token))
    }

    async fn handle_jwt_bearer(&self, request: TokenRequest) -> Result<TokenResponse, OAuth2Error> {
        let assertion = request
            .assertion
            .as_deref()
            .ok_or_else(|| OAuth2Error::invalid_request("missing assertion"))?;

        // The issuer claim locates the registration; nothing else is trusted
        // until the signature verifies against that client's published keys.
        let issuer = AssertionVerifier::unverified_issuer(assertion)
            .map_err(|_| OAuth2Error::invalid_grant("invalid assertion"))?;
        let client = self
            .lookup_client(&issuer)
            .await?
            .ok_or_else(OAuth2Error::invalid_client)?;

        // Both the allow-list and a registered key-publication URL gate this
        // grant.
        if !client.allows_grant_type(grant_types::JWT_BEARER) {
            return Err(OAuth2Error::unauthorized_client());
        }
        let jwks_url = client
            .jwks_url
            .as_deref()
            .ok_or_else(OAuth2Error::unauthorized_client)?;

        let claims = self
            .assertions
            .verify(assertion, jwks_url)
            .await
            .map_err(|_| OAuth2Error::invalid_grant("invalid assertion"))?;
        tracing::debug!(client_id = %client.client_id, asserted_sub = %claims.sub, "verified bearer assertion");

        // Assertion grants carry the client's full allowed scopes, with the
        // client itself as subject.
        self.mint_response(&client.client_id, &client.client_id, &client.scopes)
    }

    async fn authenticate(
        &self,
        client_id: Option<&str>,
        client_secret: Option<&str>,
    ) -> Result<Client, OAuth2Error> {
        let (Some(id), Some(secret)) = (client_id, client_secret) else {
            return Err(OAuth2Error::invalid_client());
        };
        self.clients.authenticate(id, secret).await.map_err(|e| {
            if e.code == ErrorCode::AuthInvalid {
                OAuth2Error::invalid_client()
            } else {
                internal_error(e)
            }
        })
    }

    async fn lookup_client(&self, client_id: &str) -> Result<Option<Client>, OAuth2Error> {
        self.clients.lookup(client_id).await.map_err(internal_error)
    }

    /// Resolve the effective scopes: the request's, checked against the
    /// client's allow-list, or the client's full allow-list when unspecified
    fn resolve_scopes(
        &self,
        client: &Client,
        requested: Option<&str>,
    ) -> Result<Vec<String>, OAuth2Error> {
        match requested {
            Some(raw) => {
                let scopes = parse_scope(raw);
                if let Some(unknown) = scopes.iter().find(|s| !client.scopes.contains(s)) {
                    return Err(OAuth2Error::invalid_scope(format!(
                        "scope not allowed for this client: {unknown}"
                    )));
                }
                Ok(scopes)
            }
            None => Ok(client.scopes.clone()),
        }
    }

    fn mint_response(
        &self,
        subject: &str,
        client_id: &str,
        scopes: &[String],
    ) -> Result<TokenResponse, OAuth2Error> {
        let access_token = self
            .jwks
            .sign_access_token(subject, client_id, scopes)
            .map_err(internal_error)?;
        Ok(
            TokenResponse::bearer(access_token, self.jwks.access_token_lifespan_secs())
                .with_scope(scopes),
        )
    }
}

fn parse_scope(raw: &str) -> Vec<String> {
    raw.split_whitespace().map(str::to_owned).collect()
}

/// Map a domain error from code/token validation onto the grant vocabulary
fn grant_error(err: AppError) -> OAuth2Error {
    match err.code {
        ErrorCode::AuthExpired => OAuth2Error::invalid_grant("grant has expired"),
        ErrorCode::AuthInvalid | ErrorCode::AuthMalformed => {
            OAuth2Error::invalid_grant(err.message)
        }
        _ => internal_error(err),
    }
}

fn internal_error(err: AppError) -> OAuth2Error {
    tracing::error!("internal failure in grant processing: {err}");
    OAuth2Error::server_error()
}

fn token_type_name(token_type: TokenType) -> &'static str {
    match token_type {
        TokenType::AuthorizationCode => "authorization_code",
        TokenType::RefreshToken => "refresh_token",
        TokenType::DeviceCode => "device_code",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clients::{ClientRegistration, RegisteredClient};
    use crate::jwks::RsaKeyPair;
    use crate::storage::memory::{InMemoryClientStore, InMemoryPkceStore, InMemoryTokenStore};

    async fn engine() -> (AuthorizationServer, Arc<ClientDirectory>) {
        let clients = Arc::new(ClientDirectory::new(Arc::new(InMemoryClientStore::new())));
        let tokens = Arc::new(TokenService::new(
            Arc::new(InMemoryTokenStore::new()),
            Arc::new(InMemoryPkceStore::new()),
        ));
        let key_pair = RsaKeyPair::generate_with_key_size(2048).unwrap();
        let jwks = Arc::new(JwksManager::new(&key_pair, "https://auth.test", 3600).unwrap());
        let server = AuthorizationServer::new(
            Arc::clone(&clients),
            tokens,
            jwks,
            "https://auth.test/device",
        )
        .unwrap();
        (server, clients)
    }

    async fn register(
        clients: &ClientDirectory,
        grant_types: &[&str],
        scopes: &[&str],
    ) -> RegisteredClient {
        clients
            .register(ClientRegistration {
                name: "Test".into(),
                redirect_uris: vec!["https://app.test/cb".into()],
                grant_types: grant_types.iter().map(|s| (*s).to_owned()).collect(),
                response_types: vec!["code".into()],
                scopes: scopes.iter().map(|s| (*s).to_owned()).collect(),
                jwks_url: None,
            })
            .await
            .unwrap()
    }

    fn credentials_request(registered: &RegisteredClient, grant_type: &str) -> TokenRequest {
        TokenRequest {
            grant_type: grant_type.to_owned(),
            client_id: Some(registered.client.client_id.clone()),
            client_secret: Some(registered.client_secret.clone()),
            ..TokenRequest::default()
        }
    }

    #[tokio::test]
    async fn test_unknown_grant_type_rejected() {
        let (server, _) = engine().await;
        let err = server
            .token(TokenRequest {
                grant_type: "password".into(),
                ..TokenRequest::default()
            })
            .await
            .unwrap_err();
        assert_eq!(err.error, "unsupported_grant_type");
    }

    #[tokio::test]
    async fn test_client_credentials_scope_subset() {
        let (server, clients) = engine().await;
        let registered = register(&clients, &[grant_types::CLIENT_CREDENTIALS], &["read", "write"])
            .await;

        let mut request = credentials_request(&registered, grant_types::CLIENT_CREDENTIALS);
        request.scope = Some("read".into());
        let response = server.token(request).await.unwrap();
        assert_eq!(response.scope.as_deref(), Some("read"));
        assert!(response.refresh_token.is_none());

        let mut request = credentials_request(&registered, grant_types::CLIENT_CREDENTIALS);
        request.scope = Some("delete".into());
        let err = server.token(request).await.unwrap_err();
        assert_eq!(err.error, "invalid_scope");
        assert_eq!(err.http_status(), 400);
    }

    #[tokio::test]
    async fn test_wrong_secret_maps_to_invalid_client() {
        let (server, clients) = engine().await;
        let registered = register(&clients, &[grant_types::CLIENT_CREDENTIALS], &[]).await;

        let mut request = credentials_request(&registered, grant_types::CLIENT_CREDENTIALS);
        request.client_secret = Some("wrong".into());
        let err = server.token(request).await.unwrap_err();
        assert_eq!(err.error, "invalid_client");
        assert_eq!(err.http_status(), 401);

        // Unknown client id produces the identical error
        let mut request = credentials_request(&registered, grant_types::CLIENT_CREDENTIALS);
        request.client_id = Some("client_unknown".into());
        let err2 = server.token(request).await.unwrap_err();
        assert_eq!(err.error, err2.error);
        assert_eq!(err.error_description, err2.error_description);
    }

    #[tokio::test]
    async fn test_grant_not_on_allow_list() {
        let (server, clients) = engine().await;
        let registered = register(&clients, &[grant_types::AUTHORIZATION_CODE], &[]).await;

        let err = server
            .token(credentials_request(&registered, grant_types::CLIENT_CREDENTIALS))
            .await
            .unwrap_err();
        assert_eq!(err.error, "unauthorized_client");
    }

    #[tokio::test]
    async fn test_authorization_code_end_to_end_with_pkce() {
        let (server, clients) = engine().await;
        let registered = register(
            &clients,
            &[grant_types::AUTHORIZATION_CODE, grant_types::REFRESH_TOKEN],
            &["read"],
        )
        .await;

        let verifier = "dBjftJeZ4CVP-mB92K27uhbUJU1p1r_wW1gFWFOEjXk";
        let challenge = pkce::challenge_from_verifier(verifier);
        let code = server
            .issue_authorization_code(
                &registered.client.client_id,
                "https://app.test/cb",
                "user-1",
                Some("read"),
                Some(&challenge),
                Some("S256"),
            )
            .await
            .unwrap();

        let mut request = credentials_request(&registered, grant_types::AUTHORIZATION_CODE);
        request.code = Some(code.clone());
        request.redirect_uri = Some("https://app.test/cb".into());
        request.code_verifier = Some(verifier.into());
        let response = server.token(request.clone()).await.unwrap();
        assert!(response.refresh_token.is_some());

        let claims = server.jwks().verify_access_token(&response.access_token).unwrap();
        assert_eq!(claims.sub, "user-1");
        assert_eq!(claims.scope, vec!["read".to_owned()]);

        // Replay of the same code fails
        let err = server.token(request).await.unwrap_err();
        assert_eq!(err.error, "invalid_grant");
    }

    #[tokio::test]
    async fn test_issue_code_rejects_plain_method() {
        let (server, clients) = engine().await;
        let registered = register(&clients, &[grant_types::AUTHORIZATION_CODE], &[]).await;

        let err = server
            .issue_authorization_code(
                &registered.client.client_id,
                "https://app.test/cb",
                "user-1",
                None,
                Some("some-challenge"),
                Some("plain"),
            )
            .await
            .unwrap_err();
        assert_eq!(err.error, "invalid_request");
    }

    #[tokio::test]
    async fn test_issue_code_rejects_unregistered_redirect_uri() {
        let (server, clients) = engine().await;
        let registered = register(&clients, &[grant_types::AUTHORIZATION_CODE], &[]).await;

        let err = server
            .issue_authorization_code(
                &registered.client.client_id,
                "https://evil.test/cb",
                "user-1",
                None,
                None,
                None,
            )
            .await
            .unwrap_err();
        assert_eq!(err.error, "invalid_request");
    }

    #[tokio::test]
    async fn test_token_exchange_redirect_uri_mismatch() {
        let (server, clients) = engine().await;
        let registered = register(&clients, &[grant_types::AUTHORIZATION_CODE], &[]).await;
        let code = server
            .issue_authorization_code(
                &registered.client.client_id,
                "https://app.test/cb",
                "user-1",
                None,
                None,
                None,
            )
            .await
            .unwrap();

        let mut request = credentials_request(&registered, grant_types::AUTHORIZATION_CODE);
        request.code = Some(code);
        request.redirect_uri = Some("https://evil.test/cb".into());
        let err = server.token(request).await.unwrap_err();
        assert_eq!(err.error, "invalid_grant");
    }

    #[tokio::test]
    async fn test_refresh_does_not_rotate() {
        let (server, clients) = engine().await;
        let registered = register(
            &clients,
            &[grant_types::AUTHORIZATION_CODE, grant_types::REFRESH_TOKEN],
            &["read"],
        )
        .await;
        let code = server
            .issue_authorization_code(
                &registered.client.client_id,
                "https://app.test/cb",
                "user-1",
                None,
                None,
                None,
            )
            .await
            .unwrap();

        let mut request = credentials_request(&registered, grant_types::AUTHORIZATION_CODE);
        request.code = Some(code);
        let refresh_token = server
            .token(request)
            .await
            .unwrap()
            .refresh_token
            .unwrap();

        for _ in 0..3 {
            let mut request = credentials_request(&registered, grant_types::REFRESH_TOKEN);
            request.refresh_token = Some(refresh_token.clone());
            let response = server.token(request).await.unwrap();
            assert!(response.refresh_token.is_none());
            assert!(server.jwks().verify_access_token(&response.access_token).is_ok());
        }
    }

    #[tokio::test]
    async fn test_refresh_scope_narrowing() {
        let (server, clients) = engine().await;
        let registered = register(
            &clients,
            &[grant_types::AUTHORIZATION_CODE, grant_types::REFRESH_TOKEN],
            &["read", "write"],
        )
        .await;
        let code = server
            .issue_authorization_code(
                &registered.client.client_id,
                "https://app.test/cb",
                "user-1",
                Some("read write"),
                None,
                None,
            )
            .await
            .unwrap();
        let mut request = credentials_request(&registered, grant_types::AUTHORIZATION_CODE);
        request.code = Some(code);
        let refresh_token = server.token(request).await.unwrap().refresh_token.unwrap();

        let mut request = credentials_request(&registered, grant_types::REFRESH_TOKEN);
        request.refresh_token = Some(refresh_token.clone());
        request.scope = Some("read".into());
        let response = server.token(request).await.unwrap();
        assert_eq!(response.scope.as_deref(), Some("read"));

        // Widening past the original grant fails
        let mut request = credentials_request(&registered, grant_types::REFRESH_TOKEN);
        request.refresh_token = Some(refresh_token);
        request.scope = Some("read admin".into());
        let err = server.token(request).await.unwrap_err();
        assert_eq!(err.error, "invalid_scope");
    }

    #[tokio::test]
    async fn test_device_flow_through_engine() {
        let (server, clients) = engine().await;
        let registered = register(
            &clients,
            &[grant_types::DEVICE_CODE, grant_types::REFRESH_TOKEN],
            &["read"],
        )
        .await;

        let authorization = server
            .device_authorization(DeviceAuthorizationRequest {
                client_id: registered.client.client_id.clone(),
                client_secret: Some(registered.client_secret.clone()),
                scope: Some("read".into()),
            })
            .await
            .unwrap();
        assert_eq!(authorization.interval, DEVICE_POLL_INTERVAL_SECS);

        let mut poll = credentials_request(&registered, grant_types::DEVICE_CODE);
        poll.device_code = Some(authorization.device_code.clone());

        let pending = server.token(poll.clone()).await.unwrap_err();
        assert_eq!(pending.error, "authorization_pending");
        assert_eq!(pending.http_status(), 428);

        server
            .approve_device(&authorization.user_code, "user-1")
            .await
            .unwrap();

        let response = server.token(poll.clone()).await.unwrap();
        let claims = server.jwks().verify_access_token(&response.access_token).unwrap();
        assert_eq!(claims.sub, "user-1");

        // The grant was consumed; a second poll does not mint again.
        assert!(server.token(poll).await.is_err());
    }

    #[tokio::test]
    async fn test_revoke_then_introspect() {
        let (server, clients) = engine().await;
        let registered = register(
            &clients,
            &[grant_types::AUTHORIZATION_CODE, grant_types::REFRESH_TOKEN],
            &["read"],
        )
        .await;
        let code = server
            .issue_authorization_code(
                &registered.client.client_id,
                "https://app.test/cb",
                "user-1",
                None,
                None,
                None,
            )
            .await
            .unwrap();
        let mut request = credentials_request(&registered, grant_types::AUTHORIZATION_CODE);
        request.code = Some(code);
        let refresh_token = server.token(request).await.unwrap().refresh_token.unwrap();

        let submission = |token: &str| TokenSubmission {
            token: token.to_owned(),
            token_type_hint: None,
            client_id: Some(registered.client.client_id.clone()),
            client_secret: Some(registered.client_secret.clone()),
        };

        let live = server.introspect(submission(&refresh_token)).await.unwrap();
        assert!(live.active);
        assert_eq!(live.token_type.as_deref(), Some("refresh_token"));

        server.revoke(submission(&refresh_token)).await.unwrap();
        // Revoking again is still silent success
        server.revoke(submission(&refresh_token)).await.unwrap();

        let dead = server.introspect(submission(&refresh_token)).await.unwrap();
        assert!(!dead.active);
        assert!(dead.client_id.is_none());
    }

    #[tokio::test]
    async fn test_revoke_by_non_owner_is_silent_noop() {
        let (server, clients) = engine().await;
        let owner = register(
            &clients,
            &[grant_types::AUTHORIZATION_CODE, grant_types::REFRESH_TOKEN],
            &[],
        )
        .await;
        let other = register(&clients, &[grant_types::CLIENT_CREDENTIALS], &[]).await;

        let code = server
            .issue_authorization_code(
                &owner.client.client_id,
                "https://app.test/cb",
                "user-1",
                None,
                None,
                None,
            )
            .await
            .unwrap();
        let mut request = credentials_request(&owner, grant_types::AUTHORIZATION_CODE);
        request.code = Some(code);
        let refresh_token = server.token(request).await.unwrap().refresh_token.unwrap();

        // The other client's revocation reports success but deletes nothing
        server
            .revoke(TokenSubmission {
                token: refresh_token.clone(),
                token_type_hint: None,
                client_id: Some(other.client.client_id.clone()),
                client_secret: Some(other.client_secret.clone()),
            })
            .await
            .unwrap();

        let mut request = credentials_request(&owner, grant_types::REFRESH_TOKEN);
        request.refresh_token = Some(refresh_token);
        assert!(server.token(request).await.is_ok());
    }

    #[tokio::test]
    async fn test_introspect_access_token_claims() {
        let (server, clients) = engine().await;
        let registered = register(&clients, &[grant_types::CLIENT_CREDENTIALS], &["read"]).await;
        let response = server
            .token(credentials_request(&registered, grant_types::CLIENT_CREDENTIALS))
            .await
            .unwrap();

        let submission = |token: &str| TokenSubmission {
            token: token.to_owned(),
            token_type_hint: None,
            client_id: Some(registered.client.client_id.clone()),
            client_secret: Some(registered.client_secret.clone()),
        };

        let introspection = server.introspect(submission(&response.access_token)).await.unwrap();
        assert!(introspection.active);
        assert_eq!(introspection.token_type.as_deref(), Some("access_token"));
        assert_eq!(
            introspection.client_id.as_deref(),
            Some(registered.client.client_id.as_str())
        );
        assert_eq!(introspection.iss.as_deref(), Some("https://auth.test"));
        assert!(introspection.jti.is_some());

        assert!(!server.introspect(submission("garbage-token")).await.unwrap().active);

        // Unauthenticated callers get invalid_client, not an active bit
        let err = server
            .introspect(TokenSubmission {
                token: response.access_token,
                token_type_hint: None,
                client_id: Some(registered.client.client_id.clone()),
                client_secret: Some("wrong".into()),
            })
            .await
            .unwrap_err();
        assert_eq!(err.error, "invalid_client");
    }
}
