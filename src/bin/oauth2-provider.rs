// ABOUTME: Server binary - wires configuration, storage, signing, and HTTP together
// ABOUTME: Runs until SIGINT, serving the OAuth2 endpoints on the configured port
//
// SPDX-License-Identifier: MIT OR Apache-2.0

//! OAuth2 provider server entry point.

use anyhow::{Context, Result};
use clap::Parser;
use oauth2_provider::clients::{ClientDirectory, ClientRegistration};
use oauth2_provider::config::ServerConfig;
use oauth2_provider::jwks::{JwksManager, RsaKeyPair};
use oauth2_provider::logging;
use oauth2_provider::models::grant_types;
use oauth2_provider::oauth2::endpoints::AuthorizationServer;
use oauth2_provider::oauth2::routes;
use oauth2_provider::storage::memory::{
    InMemoryClientStore, InMemoryPkceStore, InMemoryTokenStore,
};
use oauth2_provider::tokens::TokenService;
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "oauth2-provider")]
#[command(about = "OAuth2 authorization server")]
struct Args {
    /// Override the HTTP listen port from the environment
    #[arg(long)]
    port: Option<u16>,

    /// Register a demo client at startup and log its credentials
    #[arg(long)]
    demo_client: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    logging::init_from_env().context("failed to initialize logging")?;

    let mut config = ServerConfig::from_env().context("failed to load configuration")?;
    if let Some(port) = args.port {
        config.http_port = port;
    }

    let key_pair = match &config.signing_key_pem {
        Some(pem) => RsaKeyPair::from_private_key_pem(pem).context("invalid signing key PEM")?,
        None => {
            tracing::warn!(
                "no OAUTH2_SIGNING_KEY_PATH configured; using an ephemeral signing key"
            );
            RsaKeyPair::generate().context("failed to generate signing key")?
        }
    };
    let jwks = Arc::new(
        JwksManager::new(&key_pair, &config.issuer_url, config.access_token_lifespan_secs)
            .context("failed to initialize signing manager")?,
    );

    let clients = Arc::new(ClientDirectory::new(Arc::new(InMemoryClientStore::new())));
    let tokens = Arc::new(TokenService::with_lifespans(
        Arc::new(InMemoryTokenStore::new()),
        Arc::new(InMemoryPkceStore::new()),
        config.lifespans,
    ));

    if args.demo_client {
        register_demo_client(&clients).await?;
    }

    let server = Arc::new(
        AuthorizationServer::new(clients, tokens, jwks, config.verification_uri.clone())
            .context("failed to assemble authorization server")?,
    );
    let app = routes::routes(server);

    let listener = tokio::net::TcpListener::bind(("0.0.0.0", config.http_port))
        .await
        .with_context(|| format!("failed to bind port {}", config.http_port))?;
    tracing::info!(
        port = config.http_port,
        issuer = %config.issuer_url,
        "OAuth2 provider listening"
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    Ok(())
}

async fn register_demo_client(clients: &ClientDirectory) -> Result<()> {
    let registered = clients
        .register(ClientRegistration {
            name: "Demo Client".to_owned(),
            redirect_uris: vec!["http://localhost:3000/callback".to_owned()],
            grant_types: vec![
                grant_types::AUTHORIZATION_CODE.to_owned(),
                grant_types::CLIENT_CREDENTIALS.to_owned(),
                grant_types::REFRESH_TOKEN.to_owned(),
                grant_types::DEVICE_CODE.to_owned(),
            ],
            response_types: vec!["code".to_owned()],
            scopes: vec!["read".to_owned(), "write".to_owned()],
            jwks_url: None,
        })
        .await
        .context("failed to register demo client")?;

    // Demo only: credentials land in the log so they are usable immediately
    tracing::info!(
        client_id = %registered.client.client_id,
        client_secret = %registered.client_secret,
        "registered demo client"
    );
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("failed to listen for shutdown signal: {e}");
    }
    tracing::info!("shutdown signal received");
}
