// ABOUTME: OAuth2 protocol layer - wire models, grant engine, and HTTP routes
// ABOUTME: Everything above this module is transport; everything below is domain services
//
// SPDX-License-Identifier: MIT OR Apache-2.0

/// JWT bearer assertion verification (RFC 7523)
pub mod assertion;
/// Grant engine dispatching the five supported grant types
pub mod endpoints;
/// Request and response wire types and protocol error vocabulary
pub mod models;
/// Axum router for the token, device, introspection, revocation, and JWKS
/// endpoints
pub mod routes;
