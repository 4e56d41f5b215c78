// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Health, metrics, and the operator GC trigger.

use crate::app::AppState;
use crate::auth::AuthUser;
use crate::error::ApiError;
use axum::extract::State;
use axum::Json;
use hangar_core::Clock;
use hangar_sandbox::{AgentClient, SandboxDriver};
use hangar_storage::Store;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

pub async fn healthz() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "ok": true }))
}

pub async fn metrics<S, D, A, C>(
    State(state): State<Arc<AppState<S, D, A, C>>>,
    AuthUser(_user): AuthUser,
) -> Result<Json<std::collections::BTreeMap<String, u64>>, ApiError>
where
    S: Store,
    D: SandboxDriver,
    A: AgentClient,
    C: Clock,
{
    Ok(Json(state.metrics.snapshot()))
}

/// Run both retention sweeps synchronously.
pub async fn gc<S, D, A, C>(
    State(state): State<Arc<AppState<S, D, A, C>>>,
    AuthUser(_user): AuthUser,
) -> Result<Json<serde_json::Value>, ApiError>
where
    S: Store,
    D: SandboxDriver,
    A: AgentClient,
    C: Clock,
{
    let report = state.retention.collect(&CancellationToken::new()).await;
    Ok(Json(serde_json::json!({
        "workspacesDeleted": report.workspaces_deleted,
        "bundlesDeleted": report.bundles_deleted,
    })))
}
