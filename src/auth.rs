// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2026 nervosys

//! Login signature for the Web Endpoint API
//!
//! The `/login` endpoint expects an `authorizationToken` of the form
//! `nonce:timestamp:sha256(timestamp + key)[:integration_id]`. The token
//! embeds wall-clock seconds, so the host clock must stay within a few
//! minutes of the server or logins are rejected with 403.

use sha2::{Digest, Sha256};

/// Generate an authorization token for the current Unix time
pub fn generate_auth_token(nonce: &str, key: &str, integration_id: &str) -> String {
    generate_auth_token_at(nonce, key, integration_id, chrono::Utc::now().timestamp())
}

/// Generate an authorization token for an explicit Unix timestamp (seconds)
pub fn generate_auth_token_at(
    nonce: &str,
    key: &str,
    integration_id: &str,
    timestamp: i64,
) -> String {
    let timestamp = timestamp.to_string();

    let mut hasher = Sha256::new();
    hasher.update(timestamp.as_bytes());
    hasher.update(key.as_bytes());
    let digest = hex::encode(hasher.finalize());

    let mut token = format!("{}:{}:{}", nonce, timestamp, digest);
    if !integration_id.is_empty() {
        token.push(':');
        token.push_str(integration_id);
    }
    token
}
