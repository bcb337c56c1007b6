// ABOUTME: OAuth2 authorization server library
// ABOUTME: Token issuance, validation, introspection and revocation across five grant types
//
// SPDX-License-Identifier: MIT OR Apache-2.0

//! # OAuth2 Provider
//!
//! An OAuth2 authorization server supporting the authorization code (with
//! mandatory-S256 PKCE), client credentials, refresh token, device code, and
//! JWT bearer assertion grants.
//!
//! Access tokens are RS256-signed JWTs verifiable against the published JWKS;
//! every other credential is an opaque random string stored only as its
//! SHA-256 signature and, for single-use credentials, consumed atomically on
//! redemption.

/// Client registry and secret authentication
pub mod clients;
/// Environment-driven configuration
pub mod config;
/// Cryptographic primitives for tokens and PKCE
pub mod crypto;
/// Unified error types
pub mod errors;
/// RSA key management, token signing, and JWKS publication
pub mod jwks;
/// Structured logging setup
pub mod logging;
/// Core data models
pub mod models;
/// OAuth2 protocol layer
pub mod oauth2;
/// Storage contracts and the in-memory backend
pub mod storage;
/// Token lifecycle service
pub mod tokens;
