// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Centralized environment variable access for the daemon crate.

use crate::app::BackgroundIntervals;
use hangar_engine::EngineConfig;
use std::net::SocketAddr;
use std::time::Duration;

fn parsed<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|value| value.parse().ok())
}

/// Engine configuration from the environment, defaults per variable:
/// `WORKSPACE_IMAGE`, `WARM_IDLE_MINUTES` (20), `MAX_RUNS_PER_DAY` (500),
/// `WORKSPACE_COLD_TTL_DAYS` (30), `EVIDENCE_TTL_DAYS` (180),
/// `EVIDENCE_ROOT`, `OPENAI_API_KEY`, `FORCE_MOCK_CODEX`,
/// `HANGAR_RUN_TIMEOUT_MS` (60000).
pub fn engine_config() -> EngineConfig {
    let mut config = EngineConfig::default();
    if let Ok(image) = std::env::var("WORKSPACE_IMAGE") {
        config.workspace_image = image;
    }
    if let Some(minutes) = parsed::<i64>("WARM_IDLE_MINUTES") {
        config.warm_idle = chrono::Duration::minutes(minutes);
    }
    if let Some(max) = parsed::<u32>("MAX_RUNS_PER_DAY") {
        config.max_runs_per_day = max;
    }
    if let Some(days) = parsed::<i64>("WORKSPACE_COLD_TTL_DAYS") {
        config.workspace_cold_ttl = chrono::Duration::days(days);
    }
    if let Some(days) = parsed::<i64>("EVIDENCE_TTL_DAYS") {
        config.evidence_ttl = chrono::Duration::days(days);
    }
    if let Ok(root) = std::env::var("EVIDENCE_ROOT") {
        config.evidence_root = root.into();
    }
    config.openai_api_key = std::env::var("OPENAI_API_KEY").ok().filter(|v| !v.is_empty());
    config.force_mock_codex = std::env::var("FORCE_MOCK_CODEX").ok().filter(|v| !v.is_empty());
    if let Some(ms) = parsed::<u64>("HANGAR_RUN_TIMEOUT_MS") {
        config.run_timeout = Duration::from_millis(ms);
    }
    config
}

/// Listen address (`HANGAR_HTTP_ADDR`, default `0.0.0.0:8080`).
pub fn http_addr() -> SocketAddr {
    parsed::<SocketAddr>("HANGAR_HTTP_ADDR")
        .unwrap_or_else(|| SocketAddr::from(([0, 0, 0, 0], 8080)))
}

/// Sweep cadences; only the reaper default is spec-fixed (60s), the rest
/// are overridable for tests.
pub fn intervals() -> BackgroundIntervals {
    let mut intervals = BackgroundIntervals::default();
    if let Some(ms) = parsed::<u64>("HANGAR_REAP_INTERVAL_MS") {
        intervals.reap = Duration::from_millis(ms);
    }
    if let Some(ms) = parsed::<u64>("HANGAR_RETENTION_INTERVAL_MS") {
        intervals.retention = Duration::from_millis(ms);
    }
    if let Some(ms) = parsed::<u64>("HANGAR_EVIDENCE_POLL_MS") {
        intervals.evidence_poll = Duration::from_millis(ms);
    }
    intervals
}

/// Development bootstrap credential. When set, startup seeds an admin user
/// whose API key is this token — user provisioning is otherwise external.
pub fn dev_token() -> Option<String> {
    std::env::var("HANGAR_DEV_TOKEN").ok().filter(|v| !v.is_empty())
}

#[cfg(test)]
#[path = "env_tests.rs"]
mod tests;
