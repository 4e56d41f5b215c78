// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Engine configuration. Values come from the environment (resolved by
//! the daemon) or from test harnesses directly.

use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Image every sandbox container runs.
    pub workspace_image: String,
    /// How long a warm workspace survives without activity.
    pub warm_idle: chrono::Duration,
    /// Daily per-user run quota (UTC days).
    pub max_runs_per_day: u32,
    /// Cold workspaces older than this lose their volume.
    pub workspace_cold_ttl: chrono::Duration,
    /// Ready bundles older than this lose their zip.
    pub evidence_ttl: chrono::Duration,
    /// Directory receiving `<run_id>.zip` files (and `temp/` staging).
    pub evidence_root: PathBuf,
    /// Hard per-run agent timeout, independent of any client timeout.
    pub run_timeout: Duration,
    /// Inter-token delay injected on streaming responses only.
    pub token_delay: Duration,
    /// Injected into every sandbox container when set.
    pub openai_api_key: Option<String>,
    /// Propagated into the sandbox when set.
    pub force_mock_codex: Option<String>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            workspace_image: "hangar-workspace:latest".to_string(),
            warm_idle: chrono::Duration::minutes(20),
            max_runs_per_day: 500,
            workspace_cold_ttl: chrono::Duration::days(30),
            evidence_ttl: chrono::Duration::days(180),
            evidence_root: PathBuf::from("./evidence"),
            run_timeout: Duration::from_secs(60),
            token_delay: Duration::from_millis(20),
            openai_api_key: None,
            force_mock_codex: None,
        }
    }
}
