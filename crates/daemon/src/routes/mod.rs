// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Route table. Auth is enforced per handler through the [`AuthUser`]
//! extractor; only `/healthz` is open.
//!
//! [`AuthUser`]: crate::auth::AuthUser

mod projects;
mod runs;
mod system;

use crate::app::AppState;
use axum::routing::{get, post};
use axum::Router;
use hangar_core::Clock;
use hangar_sandbox::{AgentClient, SandboxDriver};
use hangar_storage::Store;
use std::sync::Arc;

pub fn router<S, D, A, C>(state: Arc<AppState<S, D, A, C>>) -> Router
where
    S: Store,
    D: SandboxDriver,
    A: AgentClient,
    C: Clock,
{
    let router: Router<Arc<AppState<S, D, A, C>>> = Router::new()
        .route("/healthz", get(system::healthz))
        .route("/projects", get(projects::list).post(projects::create))
        .route("/projects/{id}/open", post(projects::open))
        .route("/projects/{id}/message", post(projects::message))
        .route("/projects/{id}/message/stream", post(projects::message_stream))
        .route("/projects/{id}/runs", get(projects::runs))
        .route("/runs/{id}", get(runs::get_run))
        .route("/runs/{id}/evidence", get(runs::evidence))
        .route("/metrics", get(system::metrics))
        .route("/ops/gc", post(system::gc));
    router.with_state(state)
}
