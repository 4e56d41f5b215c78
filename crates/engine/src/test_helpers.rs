// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared fixtures for engine tests: a store, a fake sandbox + agent, and
//! constructors for each service wired against them.

use crate::config::EngineConfig;
use crate::evidence::EvidenceBuilder;
use crate::metrics::Metrics;
use crate::reaper::IdleReaper;
use crate::retention::RetentionCollector;
use crate::run::RunService;
use crate::workspace::{OpenResult, WorkspaceService};
use hangar_core::{Clock, FakeClock, Project, ProjectId, RunId, SystemClock, User, UserId};
use hangar_sandbox::{FakeAgentClient, FakeSandbox};
use hangar_storage::{MemoryStore, Store};
use std::sync::Arc;
use tokio::sync::mpsc;

pub(crate) struct HarnessWith<C: Clock> {
    pub store: Arc<MemoryStore>,
    pub sandbox: Arc<FakeSandbox>,
    pub agent: Arc<FakeAgentClient>,
    pub clock: C,
    pub metrics: Metrics,
    pub config: EngineConfig,
    pub evidence_tx: mpsc::Sender<RunId>,
    pub evidence_rx: Option<mpsc::Receiver<RunId>>,
}

pub(crate) type Harness = HarnessWith<FakeClock>;

impl Harness {
    pub fn new() -> Self {
        Self::with_clock(FakeClock::new())
    }
}

impl HarnessWith<SystemClock> {
    pub fn new_system() -> Self {
        Self::with_clock(SystemClock)
    }
}

impl<C: Clock> HarnessWith<C> {
    pub fn with_clock(clock: C) -> Self {
        let sandbox = FakeSandbox::new();
        let agent = FakeAgentClient::new(sandbox.clone());
        let (evidence_tx, evidence_rx) = mpsc::channel(64);
        let config = EngineConfig {
            token_delay: std::time::Duration::ZERO,
            ..EngineConfig::default()
        };
        Self {
            store: Arc::new(MemoryStore::new()),
            sandbox: Arc::new(sandbox),
            agent: Arc::new(agent),
            clock,
            metrics: Metrics::new(),
            config,
            evidence_tx,
            evidence_rx: Some(evidence_rx),
        }
    }

    pub fn workspace_service(&self) -> WorkspaceService<MemoryStore, FakeSandbox, C> {
        WorkspaceService::new(
            self.store.clone(),
            self.sandbox.clone(),
            self.clock.clone(),
            self.metrics.clone(),
            self.config.clone(),
        )
    }

    pub fn run_service(&self) -> RunService<MemoryStore, FakeSandbox, FakeAgentClient, C> {
        RunService::new(
            self.store.clone(),
            self.sandbox.clone(),
            self.agent.clone(),
            self.clock.clone(),
            self.metrics.clone(),
            self.config.clone(),
            self.evidence_tx.clone(),
        )
    }

    pub fn reaper(&self) -> IdleReaper<MemoryStore, FakeSandbox, C> {
        IdleReaper::new(
            self.store.clone(),
            self.sandbox.clone(),
            self.clock.clone(),
            self.metrics.clone(),
        )
    }

    pub fn retention(&self) -> RetentionCollector<MemoryStore, FakeSandbox, C> {
        RetentionCollector::new(
            self.store.clone(),
            self.sandbox.clone(),
            self.clock.clone(),
            self.metrics.clone(),
            self.config.clone(),
        )
    }

    pub fn evidence_builder(&self) -> EvidenceBuilder<MemoryStore, FakeSandbox, C> {
        EvidenceBuilder::new(
            self.store.clone(),
            self.sandbox.clone(),
            self.clock.clone(),
            self.metrics.clone(),
            self.config.evidence_root.clone(),
        )
    }

    pub async fn seed_user(&self) -> UserId {
        let user = User::new(UserId::new(), self.clock.now_utc());
        let id = user.id;
        self.store.create_user(user).await.unwrap_or_else(|e| panic!("seed user: {e}"));
        id
    }

    pub async fn seed_project(&self, user_id: UserId) -> ProjectId {
        let project = Project {
            id: ProjectId::new(),
            user_id,
            name: "demo".into(),
            repo_url: "https://github.com/octocat/Hello-World.git".into(),
            created_at: self.clock.now_utc(),
        };
        let id = project.id;
        self.store
            .create_project(project)
            .await
            .unwrap_or_else(|e| panic!("seed project: {e}"));
        id
    }

    pub async fn open(&self, user_id: UserId, project_id: ProjectId) -> OpenResult {
        self.workspace_service()
            .open(user_id, project_id)
            .await
            .unwrap_or_else(|e| panic!("open workspace: {e}"))
    }
}
