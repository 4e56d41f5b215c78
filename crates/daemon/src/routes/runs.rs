// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Run detail and evidence download.

use crate::app::AppState;
use crate::auth::AuthUser;
use crate::error::ApiError;
use axum::extract::{Path, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use hangar_core::{BundleStatus, Clock, Run, RunId, UserId};
use hangar_sandbox::{AgentClient, SandboxDriver};
use hangar_storage::Store;
use std::sync::Arc;

pub async fn get_run<S, D, A, C>(
    State(state): State<Arc<AppState<S, D, A, C>>>,
    AuthUser(user): AuthUser,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError>
where
    S: Store,
    D: SandboxDriver,
    A: AgentClient,
    C: Clock,
{
    let run = resolve_run(&state, user.id, &id).await?;
    Ok(Json(serde_json::json!({ "run": run })))
}

pub async fn evidence<S, D, A, C>(
    State(state): State<Arc<AppState<S, D, A, C>>>,
    AuthUser(user): AuthUser,
    Path(id): Path<String>,
) -> Result<Response, ApiError>
where
    S: Store,
    D: SandboxDriver,
    A: AgentClient,
    C: Clock,
{
    let run = resolve_run(&state, user.id, &id).await?;
    let bundle = state.store.get_bundle_for_run(run.id).await?;

    let (status, path) = match bundle {
        // Scheduled but not yet upserted counts as pending too
        None => (BundleStatus::Pending, None),
        Some(bundle) => (bundle.status, bundle.bundle_path),
    };

    match status {
        BundleStatus::Pending => Ok((
            StatusCode::ACCEPTED,
            Json(serde_json::json!({ "status": "pending" })),
        )
            .into_response()),
        BundleStatus::Error => {
            let message = state
                .store
                .get_bundle_for_run(run.id)
                .await?
                .and_then(|b| b.error_message)
                .unwrap_or_else(|| "bundle build failed".to_string());
            Ok((
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(serde_json::json!({ "status": "error", "message": message })),
            )
                .into_response())
        }
        BundleStatus::Deleted => {
            Err(ApiError::not_found(format!("evidence for run {} was deleted", run.id)))
        }
        BundleStatus::Ready => {
            let path = path.ok_or_else(|| {
                ApiError::new(StatusCode::INTERNAL_SERVER_ERROR, "ready bundle has no path")
            })?;
            let bytes = tokio::fs::read(&path).await.map_err(|e| {
                ApiError::new(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    format!("bundle unreadable: {e}"),
                )
            })?;
            let disposition = format!("attachment; filename=\"{}.zip\"", run.id);
            Ok((
                StatusCode::OK,
                [
                    (header::CONTENT_TYPE, "application/zip".to_string()),
                    (header::CONTENT_DISPOSITION, disposition),
                ],
                bytes,
            )
                .into_response())
        }
    }
}

async fn resolve_run<S, D, A, C>(
    state: &AppState<S, D, A, C>,
    user_id: UserId,
    raw_id: &str,
) -> Result<Run, ApiError>
where
    S: Store,
    D: SandboxDriver,
    A: AgentClient,
    C: Clock,
{
    let run_id = RunId::parse(raw_id)?;
    state
        .store
        .get_run(run_id)
        .await?
        .filter(|run| run.user_id == user_id)
        .ok_or_else(|| ApiError::not_found(format!("run {run_id}")))
}
