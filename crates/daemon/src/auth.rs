// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Bearer-token authentication.
//!
//! Tokens are never stored; `api_keys.token_hash` holds the SHA-256 hex
//! digest. The extractor resolves the header to a [`User`] or rejects with
//! 401. Everything past the front door works with the resolved user id.

use crate::app::AppState;
use crate::error::ApiError;
use axum::extract::FromRequestParts;
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;
use hangar_core::{Clock, User};
use hangar_sandbox::{AgentClient, SandboxDriver};
use hangar_storage::Store;
use sha2::{Digest, Sha256};
use std::sync::Arc;

/// Hex SHA-256 of a presented token, as stored in `api_keys.token_hash`.
pub fn hash_token(token: &str) -> String {
    let digest = Sha256::digest(token.as_bytes());
    let mut out = String::with_capacity(digest.len() * 2);
    for byte in digest {
        use std::fmt::Write;
        let _ = write!(out, "{byte:02x}");
    }
    out
}

/// The authenticated caller.
pub struct AuthUser(pub User);

impl<S, D, A, C> FromRequestParts<Arc<AppState<S, D, A, C>>> for AuthUser
where
    S: Store,
    D: SandboxDriver,
    A: AgentClient,
    C: Clock,
{
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState<S, D, A, C>>,
    ) -> Result<Self, Self::Rejection> {
        let token = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.strip_prefix("Bearer "))
            .filter(|token| !token.is_empty())
            .ok_or_else(ApiError::unauthorized)?;

        let user = state
            .store
            .find_user_by_token_hash(&hash_token(token))
            .await
            .map_err(ApiError::from)?
            .ok_or_else(ApiError::unauthorized)?;
        Ok(AuthUser(user))
    }
}

#[cfg(test)]
#[path = "auth_tests.rs"]
mod tests;
