// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Daemon assembly: shared state, router, and background sweepers.
//!
//! Initialization order follows the control plane's dependency chain:
//! config → store → driver → sweepers → HTTP router. `build` returns the
//! router plus the sweeper handles and the cancellation token that stops
//! them between items on shutdown.

use crate::routes;
use hangar_core::{Clock, RunId};
use hangar_engine::{
    reaper::DEFAULT_REAP_INTERVAL,
    retention::{DEFAULT_RETENTION_INTERVAL, STARTUP_SWEEP_DELAY},
    EngineConfig, EvidenceBuilder, IdleReaper, Metrics, RetentionCollector, RunService,
    WorkspaceService,
};
use hangar_sandbox::{AgentClient, SandboxDriver};
use hangar_storage::Store;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Cadences for the background loops.
#[derive(Debug, Clone, Copy)]
pub struct BackgroundIntervals {
    pub reap: Duration,
    pub retention: Duration,
    pub retention_startup_delay: Duration,
    pub evidence_poll: Duration,
}

impl Default for BackgroundIntervals {
    fn default() -> Self {
        Self {
            reap: DEFAULT_REAP_INTERVAL,
            retention: DEFAULT_RETENTION_INTERVAL,
            retention_startup_delay: STARTUP_SWEEP_DELAY,
            evidence_poll: hangar_engine::evidence::DEFAULT_POLL_INTERVAL,
        }
    }
}

/// Everything the HTTP handlers reach for.
pub struct AppState<S, D, A, C>
where
    S: Store,
    D: SandboxDriver,
    A: AgentClient,
    C: Clock,
{
    pub store: Arc<S>,
    pub workspaces: WorkspaceService<S, D, C>,
    pub runs: RunService<S, D, A, C>,
    /// Collector instance for the synchronous `/ops/gc` trigger; the
    /// scheduled loop runs on its own instance.
    pub retention: RetentionCollector<S, D, C>,
    pub metrics: Metrics,
    pub config: EngineConfig,
}

/// A built daemon: router to serve, sweepers to join, token to stop them.
pub struct Daemon {
    pub router: axum::Router,
    pub cancel: CancellationToken,
    pub background: Vec<tokio::task::JoinHandle<()>>,
}

pub fn build<S, D, A, C>(
    store: Arc<S>,
    driver: Arc<D>,
    agent: Arc<A>,
    clock: C,
    config: EngineConfig,
    intervals: BackgroundIntervals,
) -> Daemon
where
    S: Store,
    D: SandboxDriver,
    A: AgentClient,
    C: Clock,
{
    let metrics = Metrics::new();
    let cancel = CancellationToken::new();
    let (evidence_tx, evidence_rx) = mpsc::channel::<RunId>(256);

    let workspaces = WorkspaceService::new(
        store.clone(),
        driver.clone(),
        clock.clone(),
        metrics.clone(),
        config.clone(),
    );
    let runs = RunService::new(
        store.clone(),
        driver.clone(),
        agent,
        clock.clone(),
        metrics.clone(),
        config.clone(),
        evidence_tx,
    );
    let retention = RetentionCollector::new(
        store.clone(),
        driver.clone(),
        clock.clone(),
        metrics.clone(),
        config.clone(),
    );

    let mut background = Vec::new();
    background.push(
        IdleReaper::new(store.clone(), driver.clone(), clock.clone(), metrics.clone())
            .spawn(intervals.reap, cancel.clone()),
    );
    background.push(
        RetentionCollector::new(
            store.clone(),
            driver.clone(),
            clock.clone(),
            metrics.clone(),
            config.clone(),
        )
        .spawn(intervals.retention, intervals.retention_startup_delay, cancel.clone()),
    );
    background.push(
        EvidenceBuilder::new(
            store.clone(),
            driver,
            clock,
            metrics.clone(),
            config.evidence_root.clone(),
        )
        .spawn_worker(evidence_rx, intervals.evidence_poll, cancel.clone()),
    );

    let state = Arc::new(AppState { store, workspaces, runs, retention, metrics, config });
    Daemon { router: routes::router(state), cancel, background }
}
