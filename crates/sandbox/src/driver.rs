// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The `SandboxDriver` contract.
//!
//! Two very different implementations must fit behind this trait: a local
//! Docker daemon and a cluster scheduler. The one shared requirement is
//! that [`ContainerInfo`] exposes how the control plane reaches the agent
//! worker inside the container.

use async_trait::async_trait;
use thiserror::Error;

/// Errors from driver operations.
#[derive(Debug, Error)]
pub enum SandboxError {
    #[error("container not found: {0}")]
    NotFound(String),
    #[error("{op} failed: {message}")]
    CommandFailed { op: &'static str, message: String },
    #[error("{op} hit a transient error: {message}")]
    Transient { op: &'static str, message: String },
}

impl SandboxError {
    /// Transient connectivity errors are the only class the workspace
    /// service retries, and at most once.
    pub fn is_transient(&self) -> bool {
        matches!(self, SandboxError::Transient { .. })
    }
}

/// Everything needed to create one sandbox container.
#[derive(Debug, Clone, PartialEq)]
pub struct ContainerSpec {
    pub image: String,
    pub volume_name: String,
    /// Mount point of the workspace volume inside the container.
    pub volume_mount: String,
    pub env: Vec<(String, String)>,
    /// Container port published to the host (the agent worker's port).
    pub exposed_port: u16,
    pub cpu_limit: f64,
    pub memory_limit_mb: u64,
}

impl ContainerSpec {
    pub fn new(image: impl Into<String>, volume_name: impl Into<String>) -> Self {
        Self {
            image: image.into(),
            volume_name: volume_name.into(),
            volume_mount: "/workspace".to_string(),
            env: Vec::new(),
            exposed_port: crate::AGENT_PORT,
            cpu_limit: 0.5,
            memory_limit_mb: 512,
        }
    }

    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }
}

/// Inspection result for a running container.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ContainerInfo {
    pub image_name: String,
    pub image_digest: String,
    pub ip_address: Option<String>,
    /// Host port mapped to the container's published agent port, when the
    /// control plane and sandbox do not share a network.
    pub host_port: Option<u16>,
}

impl ContainerInfo {
    /// Address the control plane should dial to reach the agent worker.
    ///
    /// Prefers the published host port; falls back to the container IP on
    /// a shared network.
    pub fn agent_addr(&self, internal_port: u16) -> Option<String> {
        if let Some(port) = self.host_port {
            return Some(format!("127.0.0.1:{port}"));
        }
        self.ip_address.as_ref().map(|ip| format!("{ip}:{internal_port}"))
    }
}

/// Captured output of an in-container command.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ExecOutput {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
}

impl ExecOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// Abstraction over container/volume operations.
#[async_trait]
pub trait SandboxDriver: Send + Sync + 'static {
    /// Create the named volume if it does not already exist.
    async fn ensure_volume(&self, name: &str) -> Result<(), SandboxError>;
    async fn delete_volume(&self, name: &str) -> Result<(), SandboxError>;

    /// Create (but do not start) a container; returns the container id.
    async fn create_container(&self, spec: &ContainerSpec) -> Result<String, SandboxError>;
    async fn start_container(&self, container_id: &str) -> Result<(), SandboxError>;
    /// Stop and remove. Must be idempotent: a missing container is not an
    /// error.
    async fn stop_and_remove(&self, container_id: &str) -> Result<(), SandboxError>;

    async fn inspect(&self, container_id: &str) -> Result<ContainerInfo, SandboxError>;

    /// Run `argv` inside the container with `workdir` as working directory.
    async fn exec(
        &self,
        container_id: &str,
        argv: &[String],
        workdir: &str,
    ) -> Result<ExecOutput, SandboxError>;

    /// Tar archive of `path` inside the container (shape of the tar is
    /// driver-defined; consumers must not rely on it).
    async fn get_archive(&self, container_id: &str, path: &str)
        -> Result<Vec<u8>, SandboxError>;

    /// Write `bytes` as the file at absolute `path` inside the container,
    /// creating parent directories as needed.
    async fn put_file(
        &self,
        container_id: &str,
        path: &str,
        bytes: &[u8],
    ) -> Result<(), SandboxError>;
}
