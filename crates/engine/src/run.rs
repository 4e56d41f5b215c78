// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Run lifecycle: quota gate, per-workspace lock, agent dispatch, event
//! stream, and evidence scheduling.
//!
//! Unary and streaming entry points share one algorithm; they differ only
//! in how failures surface (errors vs. a terminal `run-complete` event)
//! and in whether the sink carries a transport.

use crate::config::EngineConfig;
use crate::events::{split_tokens, EventSink};
use crate::keyed_mutex::KeyedMutex;
use crate::metrics::Metrics;
use crate::quota::QuotaChecker;
use hangar_core::{
    Clock, CoreError, EvidenceBundle, ProjectId, Run, RunEvent, RunId, RunOutcome, RunPayload,
    RunStatus, UserId, Workspace, WorkspaceState,
};
use hangar_sandbox::{AgentClient, AgentReply, AgentRequest, SandboxDriver, AGENT_PORT};
use hangar_storage::Store;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Result of a unary run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunOutput {
    pub run_id: RunId,
    pub final_text: String,
    pub diff: String,
}

pub struct RunService<S, D, A, C> {
    store: Arc<S>,
    driver: Arc<D>,
    agent: Arc<A>,
    clock: C,
    locks: KeyedMutex,
    quota: QuotaChecker<S, C>,
    metrics: Metrics,
    config: EngineConfig,
    /// Nudge channel into the evidence build worker. The durable queue is
    /// the `pending` bundle rows; this only wakes the worker early.
    evidence_tx: mpsc::Sender<RunId>,
}

impl<S, D, A, C> RunService<S, D, A, C>
where
    S: Store,
    D: SandboxDriver,
    A: AgentClient,
    C: Clock,
{
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        store: Arc<S>,
        driver: Arc<D>,
        agent: Arc<A>,
        clock: C,
        metrics: Metrics,
        config: EngineConfig,
        evidence_tx: mpsc::Sender<RunId>,
    ) -> Self {
        let quota = QuotaChecker::new(store.clone(), clock.clone(), config.max_runs_per_day);
        Self {
            store,
            driver,
            agent,
            clock,
            locks: KeyedMutex::new(),
            quota,
            metrics,
            config,
            evidence_tx,
        }
    }

    /// Unary entry point: returns the final text and diff, or the error
    /// kind for the transport to map.
    pub async fn run(
        &self,
        cancel: &CancellationToken,
        user_id: UserId,
        project_id: ProjectId,
        prompt: &str,
    ) -> Result<RunOutput, CoreError> {
        if !self.quota.check(user_id).await? {
            return Err(CoreError::QuotaExceeded);
        }
        let mut sink = EventSink::unary();
        self.submit(cancel, user_id, project_id, prompt, &mut sink).await
    }

    /// Streaming entry point: every user-visible failure ends as a final
    /// `run-complete{status, error}` event on `tx`, never as an `Err`.
    pub async fn stream(
        &self,
        cancel: &CancellationToken,
        user_id: UserId,
        project_id: ProjectId,
        prompt: &str,
        tx: mpsc::Sender<RunEvent>,
    ) {
        let mut sink = EventSink::streaming(tx);

        match self.quota.check(user_id).await {
            Ok(true) => {}
            Ok(false) => {
                // Denied before any run row exists; the terminal event is
                // the only trace.
                self.emit_synthetic_terminal(&mut sink, "quota_exceeded").await;
                return;
            }
            Err(e) => {
                self.emit_synthetic_terminal(&mut sink, &e.run_error_message()).await;
                return;
            }
        }

        if let Err(e) = self.submit(cancel, user_id, project_id, prompt, &mut sink).await {
            if !sink.terminal_emitted() {
                self.emit_synthetic_terminal(&mut sink, &e.run_error_message()).await;
            }
        }
    }

    async fn emit_synthetic_terminal(&self, sink: &mut EventSink, error: &str) {
        sink.emit(RunEvent::new(
            self.clock.now_utc(),
            RunId::new(),
            RunPayload::RunComplete {
                status: RunOutcome::Failed,
                error: Some(error.to_string()),
            },
        ))
        .await;
    }

    /// Steps shared by both entry points. The caller has already passed
    /// the quota gate.
    async fn submit(
        &self,
        cancel: &CancellationToken,
        user_id: UserId,
        project_id: ProjectId,
        prompt: &str,
        sink: &mut EventSink,
    ) -> Result<RunOutput, CoreError> {
        self.store
            .get_project(project_id)
            .await?
            .filter(|p| p.user_id == user_id)
            .ok_or_else(|| CoreError::NotFound(format!("project {project_id}")))?;

        let workspace = self
            .store
            .find_workspace(user_id, project_id)
            .await?
            .filter(|w| w.state == WorkspaceState::Warm && w.container_id.is_some())
            .ok_or(CoreError::NoWarmWorkspace)?;

        // Serialize runs per workspace; all steps below hold the lock.
        let _guard = self.locks.acquire(&workspace.id.to_string()).await;

        // Re-read inside the lock; an eviction or reap may have landed
        // while we waited.
        let workspace = self
            .store
            .get_workspace(workspace.id)
            .await?
            .filter(|w| w.state == WorkspaceState::Warm && w.container_id.is_some())
            .ok_or(CoreError::NoWarmWorkspace)?;
        let container_id = workspace
            .container_id
            .clone()
            .ok_or(CoreError::NoWarmWorkspace)?;

        let started_at = self.clock.now_utc();
        let started = self.clock.now();
        let run_id = RunId::new();
        let mut run =
            Run::started(run_id, user_id, project_id, workspace.id, prompt.to_string(), started_at);
        run.image_name = workspace.image_name.clone();
        run.image_digest = workspace.image_digest.clone();
        run.env_snapshot = workspace.runtime_metadata.clone();
        self.store.insert_run(run.clone()).await?;

        sink.emit(RunEvent::new(self.clock.now_utc(), run_id, RunPayload::RunStart)).await;

        let result = self.call_agent(cancel, &container_id, run_id, prompt).await;
        let outcome = match result {
            Ok(reply) => {
                self.finish_success(sink, &mut run, &workspace, &container_id, reply, started)
                    .await
            }
            Err(e) => {
                self.finish_failure(sink, &mut run, &e, started).await;
                Err(e)
            }
        };

        // The complete event log lands in the sandbox before the bundle is
        // scheduled, so even failed runs are auditable.
        self.flush_events_and_schedule(sink, &run, &container_id).await;
        outcome
    }

    async fn call_agent(
        &self,
        cancel: &CancellationToken,
        container_id: &str,
        run_id: RunId,
        prompt: &str,
    ) -> Result<AgentReply, CoreError> {
        if cancel.is_cancelled() {
            return Err(CoreError::Canceled);
        }
        let info = self
            .driver
            .inspect(container_id)
            .await
            .map_err(|e| CoreError::SandboxFailure(e.to_string()))?;
        let addr = info
            .agent_addr(AGENT_PORT)
            .ok_or_else(|| CoreError::AgentFailure("agent address unavailable".into()))?;

        let request = AgentRequest { text: prompt.to_string(), run_id };
        tokio::select! {
            _ = cancel.cancelled() => Err(CoreError::Canceled),
            result = tokio::time::timeout(self.config.run_timeout, self.agent.execute(&addr, request)) => {
                match result {
                    Err(_) => Err(CoreError::AgentTimeout(self.config.run_timeout.as_millis() as u64)),
                    Ok(Ok(reply)) => Ok(reply),
                    Ok(Err(e)) => Err(CoreError::AgentFailure(e.to_string())),
                }
            }
        }
    }

    async fn finish_success(
        &self,
        sink: &mut EventSink,
        run: &mut Run,
        workspace: &Workspace,
        container_id: &str,
        reply: AgentReply,
        started: std::time::Instant,
    ) -> Result<RunOutput, CoreError> {
        // Pass through command events the worker reported; never synthesize.
        for command in &reply.commands {
            sink.emit(RunEvent::new(
                self.clock.now_utc(),
                run.id,
                RunPayload::CommandStarted {
                    command: command.command.clone(),
                    cwd: command.cwd.clone(),
                },
            ))
            .await;
            sink.emit(RunEvent::new(
                self.clock.now_utc(),
                run.id,
                RunPayload::command_finished(
                    command.command.clone(),
                    command.cwd.clone(),
                    command.exit_code,
                    &command.stdout,
                    &command.stderr,
                ),
            ))
            .await;
        }

        // Token synthesis from the final text, whitespace-preserving.
        for (sequence, delta) in split_tokens(&reply.final_text).into_iter().enumerate() {
            sink.emit(RunEvent::new(
                self.clock.now_utc(),
                run.id,
                RunPayload::Token { delta, sequence: sequence as u64 },
            ))
            .await;
            if sink.has_transport() && !self.config.token_delay.is_zero() {
                tokio::time::sleep(self.config.token_delay).await;
            }
        }

        if !reply.diff.is_empty() {
            sink.emit(RunEvent::new(
                self.clock.now_utc(),
                run.id,
                RunPayload::Diff { diff: Some(reply.diff.clone()), diff_summary: None },
            ))
            .await;
        }

        let evidence_dir = format!("/workspace/evidence/{}", run.id);
        let (has_command_log, has_outputs) =
            self.probe_worker_evidence(container_id, &evidence_dir).await;

        let finished_at = self.clock.now_utc();
        run.status = RunStatus::Succeeded;
        run.final_text = Some(reply.final_text.clone());
        run.diff = if reply.diff.is_empty() { None } else { Some(reply.diff.clone()) };
        run.git_commit = reply.git_commit.clone();
        run.finished_at = Some(finished_at);
        run.duration_ms = Some(elapsed_ms(started, self.clock.now()));
        run.env_snapshot = Some(augment_snapshot(
            run.env_snapshot.take(),
            &evidence_dir,
            has_command_log,
            has_outputs,
        ));
        self.store.update_run(run.clone()).await?;

        // Refresh the workspace's thread and idle deadline before the
        // terminal event goes out.
        let mut ws = self
            .store
            .get_workspace(workspace.id)
            .await?
            .ok_or_else(|| CoreError::Storage(format!("workspace {} vanished", workspace.id)))?;
        ws.thread_id = Some(reply.thread_id.clone());
        ws.last_active_at = finished_at;
        ws.idle_expires_at = Some(finished_at + self.config.warm_idle);
        self.store.update_workspace(ws).await?;

        sink.emit(RunEvent::new(
            self.clock.now_utc(),
            run.id,
            RunPayload::RunComplete { status: RunOutcome::Succeeded, error: None },
        ))
        .await;
        self.metrics.incr_labeled("runs_total", "status", "succeeded");

        Ok(RunOutput { run_id: run.id, final_text: reply.final_text, diff: reply.diff })
    }

    async fn finish_failure(
        &self,
        sink: &mut EventSink,
        run: &mut Run,
        error: &CoreError,
        started: std::time::Instant,
    ) {
        let status = match error {
            CoreError::AgentTimeout(_) => RunStatus::Timeout,
            _ => RunStatus::Failed,
        };
        let outcome = match status {
            RunStatus::Timeout => RunOutcome::Timeout,
            _ => RunOutcome::Failed,
        };

        run.status = status;
        run.error_message = Some(error.run_error_message());
        run.finished_at = Some(self.clock.now_utc());
        run.duration_ms = Some(elapsed_ms(started, self.clock.now()));
        if let Err(e) = self.store.update_run(run.clone()).await {
            tracing::error!(run_id = %run.id, error = %e, "failed to record run failure");
        }

        sink.emit(RunEvent::new(
            self.clock.now_utc(),
            run.id,
            RunPayload::RunComplete {
                status: outcome,
                error: Some(error.run_error_message()),
            },
        ))
        .await;
        self.metrics.incr_labeled("runs_total", "status", &run.status.to_string());
    }

    /// One `ls` in the evidence directory tells us which worker-owned
    /// files exist, for the snapshot augmentation.
    async fn probe_worker_evidence(
        &self,
        container_id: &str,
        evidence_dir: &str,
    ) -> (bool, bool) {
        let argv = vec!["ls".to_string(), evidence_dir.to_string()];
        match self.driver.exec(container_id, &argv, "/").await {
            Ok(output) if output.success() => {
                let names: Vec<&str> = output.stdout.lines().map(str::trim).collect();
                (names.contains(&"command_log.jsonl"), names.contains(&"outputs.json"))
            }
            _ => (false, false),
        }
    }

    async fn flush_events_and_schedule(
        &self,
        sink: &EventSink,
        run: &Run,
        container_id: &str,
    ) {
        match sink.to_jsonl() {
            Ok(jsonl) => {
                let path = format!("/workspace/evidence/{}/events.jsonl", run.id);
                if let Err(e) = self.driver.put_file(container_id, &path, jsonl.as_bytes()).await {
                    tracing::warn!(run_id = %run.id, error = %e, "failed to place events.jsonl");
                }
            }
            Err(e) => {
                tracing::error!(run_id = %run.id, error = %e, "event log serialization failed");
            }
        }

        let bundle = EvidenceBundle::pending(
            run.id,
            run.user_id,
            run.project_id,
            run.workspace_id,
            self.clock.now_utc(),
        );
        match self.store.upsert_pending_bundle(bundle).await {
            Ok(_) => {
                // Wake the builder; if the channel is full the poll loop
                // will pick the pending row up anyway.
                let _ = self.evidence_tx.try_send(run.id);
            }
            Err(e) => {
                tracing::warn!(run_id = %run.id, error = %e, "failed to schedule evidence build");
            }
        }
    }
}

fn elapsed_ms(started: std::time::Instant, now: std::time::Instant) -> u64 {
    now.saturating_duration_since(started).as_millis() as u64
}

/// Merge the evidence pointer into the run's environment snapshot.
fn augment_snapshot(
    snapshot: Option<serde_json::Value>,
    evidence_path: &str,
    has_command_log: bool,
    has_outputs_manifest: bool,
) -> serde_json::Value {
    let mut value = match snapshot {
        Some(serde_json::Value::Object(map)) => serde_json::Value::Object(map),
        _ => serde_json::Value::Object(serde_json::Map::new()),
    };
    if let Some(map) = value.as_object_mut() {
        map.insert("evidencePath".into(), serde_json::Value::String(evidence_path.into()));
        map.insert("hasCommandLog".into(), serde_json::Value::Bool(has_command_log));
        map.insert("hasOutputsManifest".into(), serde_json::Value::Bool(has_outputs_manifest));
    }
    value
}

#[cfg(test)]
#[path = "run_tests.rs"]
mod tests;
