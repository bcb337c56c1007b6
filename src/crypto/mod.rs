// ABOUTME: Cryptographic primitives for opaque credentials and PKCE
// ABOUTME: Groups secure token generation, storage hashing, and challenge verification
//
// SPDX-License-Identifier: MIT OR Apache-2.0

/// PKCE S256 challenge derivation and constant-time verification
pub mod pkce;
/// Secure random token generation and one-way storage hashing
pub mod secrets;
