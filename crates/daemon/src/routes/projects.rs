// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Project surface: CRUD-lite, open, message, stream, run listing.

use crate::app::AppState;
use crate::auth::AuthUser;
use crate::error::ApiError;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::sse::{Event as SseEvent, KeepAlive, Sse};
use axum::Json;
use chrono::{DateTime, Utc};
use hangar_core::{Clock, CoreError, Project, ProjectId, Run, RunEvent, UserId};
use hangar_sandbox::{AgentClient, SandboxDriver};
use hangar_storage::Store;
use serde::{Deserialize, Serialize};
use std::convert::Infallible;
use std::sync::Arc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::StreamExt;
use tokio_util::sync::CancellationToken;

const RUN_LIST_LIMIT: usize = 50;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ProjectEntry {
    id: ProjectId,
    name: String,
    repo_url: String,
    created_at: DateTime<Utc>,
}

impl From<Project> for ProjectEntry {
    fn from(p: Project) -> Self {
        Self { id: p.id, name: p.name, repo_url: p.repo_url, created_at: p.created_at }
    }
}

pub async fn list<S, D, A, C>(
    State(state): State<Arc<AppState<S, D, A, C>>>,
    AuthUser(user): AuthUser,
) -> Result<Json<serde_json::Value>, ApiError>
where
    S: Store,
    D: SandboxDriver,
    A: AgentClient,
    C: Clock,
{
    let projects: Vec<ProjectEntry> = state
        .store
        .list_projects(user.id)
        .await?
        .into_iter()
        .map(ProjectEntry::from)
        .collect();
    Ok(Json(serde_json::json!({ "projects": projects })))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateProjectBody {
    name: String,
    repo_url: String,
}

pub async fn create<S, D, A, C>(
    State(state): State<Arc<AppState<S, D, A, C>>>,
    AuthUser(user): AuthUser,
    Json(body): Json<CreateProjectBody>,
) -> Result<Json<serde_json::Value>, ApiError>
where
    S: Store,
    D: SandboxDriver,
    A: AgentClient,
    C: Clock,
{
    let name = body.name.trim();
    let repo_url = body.repo_url.trim();
    if name.is_empty() || repo_url.is_empty() {
        return Err(ApiError::bad_request("name and repoUrl are required"));
    }
    let project = Project {
        id: ProjectId::new(),
        user_id: user.id,
        name: name.to_string(),
        repo_url: repo_url.to_string(),
        created_at: Utc::now(),
    };
    let project_id = project.id;
    state.store.create_project(project).await?;
    Ok(Json(serde_json::json!({ "projectId": project_id })))
}

pub async fn open<S, D, A, C>(
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
    let project_id = ProjectId::parse(&id)?;
    match state.workspaces.open(user.id, project_id).await {
        Ok(result) => Ok(Json(serde_json::json!({
            "workspaceId": result.workspace_id,
            "state": result.state,
        }))),
        // Driver and clone failures surface as a conflict on this endpoint
        Err(e @ (CoreError::SandboxFailure(_) | CoreError::CloneFailure(_))) => {
            Err(ApiError::new(StatusCode::CONFLICT, e.to_string()))
        }
        Err(e) => Err(e.into()),
    }
}

#[derive(Debug, Deserialize)]
pub struct MessageBody {
    text: String,
}

pub async fn message<S, D, A, C>(
    State(state): State<Arc<AppState<S, D, A, C>>>,
    AuthUser(user): AuthUser,
    Path(id): Path<String>,
    Json(body): Json<MessageBody>,
) -> Result<Json<serde_json::Value>, ApiError>
where
    S: Store,
    D: SandboxDriver,
    A: AgentClient,
    C: Clock,
{
    let project_id = ProjectId::parse(&id)?;
    if body.text.trim().is_empty() {
        return Err(ApiError::bad_request("text is required"));
    }

    // The run executes in its own task so a client disconnect cannot drop
    // it mid-flight; the guard cancels the token instead, and the run
    // unwinds to `failed`/`canceled` on its own.
    let cancel = CancellationToken::new();
    let _disconnect_guard = cancel.clone().drop_guard();
    let task = tokio::spawn(async move {
        state.runs.run(&cancel, user.id, project_id, &body.text).await
    });
    let output = task
        .await
        .map_err(|e| ApiError::new(StatusCode::INTERNAL_SERVER_ERROR, format!("run task: {e}")))??;
    Ok(Json(serde_json::json!({
        "runId": output.run_id,
        "finalText": output.final_text,
        "diff": output.diff,
    })))
}

pub async fn message_stream<S, D, A, C>(
    State(state): State<Arc<AppState<S, D, A, C>>>,
    AuthUser(user): AuthUser,
    Path(id): Path<String>,
    Json(body): Json<MessageBody>,
) -> Result<Sse<impl tokio_stream::Stream<Item = Result<SseEvent, Infallible>>>, ApiError>
where
    S: Store,
    D: SandboxDriver,
    A: AgentClient,
    C: Clock,
{
    let project_id = ProjectId::parse(&id)?;
    if body.text.trim().is_empty() {
        return Err(ApiError::bad_request("text is required"));
    }
    // Visibility is decided before the stream opens; everything after
    // arrives as run events.
    resolve_project(&state, user.id, project_id).await?;

    let (tx, rx) = tokio::sync::mpsc::channel::<RunEvent>(64);
    let cancel = CancellationToken::new();
    let run_cancel = cancel.clone();
    tokio::spawn(async move {
        state.runs.stream(&run_cancel, user.id, project_id, &body.text, tx).await;
    });

    // Held by the response stream: dropping it (client disconnect) cancels
    // the in-flight run.
    let disconnect_guard = cancel.drop_guard();
    let stream = ReceiverStream::new(rx).map(move |event| {
        let _held = &disconnect_guard;
        Ok(sse_frame(&event))
    });
    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}

/// `event: <type>` + single-line JSON `data:` frame.
fn sse_frame(event: &RunEvent) -> SseEvent {
    let data = event
        .to_json_line()
        .unwrap_or_else(|e| format!("{{\"type\":\"error\",\"error\":\"{e}\"}}"));
    SseEvent::default().event(event.payload.type_name()).data(data)
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct RunSummary {
    id: hangar_core::RunId,
    status: hangar_core::RunStatus,
    prompt: String,
    started_at: DateTime<Utc>,
    finished_at: Option<DateTime<Utc>>,
    duration_ms: Option<u64>,
}

impl From<Run> for RunSummary {
    fn from(run: Run) -> Self {
        Self {
            id: run.id,
            status: run.status,
            prompt: run.prompt,
            started_at: run.started_at,
            finished_at: run.finished_at,
            duration_ms: run.duration_ms,
        }
    }
}

pub async fn runs<S, D, A, C>(
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
    let project_id = ProjectId::parse(&id)?;
    resolve_project(&state, user.id, project_id).await?;
    let runs: Vec<RunSummary> = state
        .store
        .list_runs(project_id, RUN_LIST_LIMIT)
        .await?
        .into_iter()
        .map(RunSummary::from)
        .collect();
    Ok(Json(serde_json::json!({ "runs": runs })))
}

async fn resolve_project<S, D, A, C>(
    state: &AppState<S, D, A, C>,
    user_id: UserId,
    project_id: ProjectId,
) -> Result<Project, ApiError>
where
    S: Store,
    D: SandboxDriver,
    A: AgentClient,
    C: Clock,
{
    state
        .store
        .get_project(project_id)
        .await?
        .filter(|p| p.user_id == user_id)
        .ok_or_else(|| ApiError::not_found(format!("project {project_id}")))
}
