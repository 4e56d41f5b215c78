// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Docker driver — container lifecycle through the docker CLI.
//!
//! Every workspace gets a named volume mounted at `/workspace` and a
//! container whose image entrypoint starts the agent worker on the
//! published agent port. Argument construction is kept in pure functions
//! so it can be tested without a daemon.

use crate::driver::{ContainerInfo, ContainerSpec, ExecOutput, SandboxDriver, SandboxError};
use async_trait::async_trait;
use std::process::Stdio;
use tokio::io::AsyncWriteExt;

/// Driver backed by the local `docker` binary.
#[derive(Clone, Default)]
pub struct DockerDriver;

impl DockerDriver {
    pub fn new() -> Self {
        Self
    }
}

/// Arguments for `docker create` from a container spec.
fn create_args(spec: &ContainerSpec) -> Vec<String> {
    let mut args = vec![
        "create".to_string(),
        "-v".to_string(),
        format!("{}:{}", spec.volume_name, spec.volume_mount),
        "-w".to_string(),
        spec.volume_mount.clone(),
        "-p".to_string(),
        spec.exposed_port.to_string(),
        format!("--cpus={}", spec.cpu_limit),
        format!("--memory={}m", spec.memory_limit_mb),
    ];
    for (key, value) in &spec.env {
        args.push("-e".to_string());
        args.push(format!("{key}={value}"));
    }
    args.push(spec.image.clone());
    args
}

/// Arguments for `docker exec` with an explicit working directory.
fn exec_args(container_id: &str, argv: &[String], workdir: &str) -> Vec<String> {
    let mut args =
        vec!["exec".to_string(), "-w".to_string(), workdir.to_string(), container_id.to_string()];
    args.extend(argv.iter().cloned());
    args
}

/// Classify a docker CLI failure. Connectivity problems are transient and
/// eligible for the workspace service's single retry.
fn classify(op: &'static str, message: String) -> SandboxError {
    let lower = message.to_lowercase();
    let transient = ["timeout", "timed out", "connection refused", "connection reset", "network is unreachable", "temporarily unavailable", "unexpected eof"]
        .iter()
        .any(|needle| lower.contains(needle));
    if transient {
        SandboxError::Transient { op, message }
    } else if lower.contains("no such container") || lower.contains("no such object") {
        SandboxError::NotFound(message)
    } else {
        SandboxError::CommandFailed { op, message }
    }
}

/// Run `docker <args>`, capturing output. Non-zero exit becomes an error
/// carrying stderr.
async fn run_docker(
    op: &'static str,
    args: &[String],
    stdin_bytes: Option<&[u8]>,
) -> Result<std::process::Output, SandboxError> {
    let mut cmd = tokio::process::Command::new("docker");
    cmd.args(args).stdout(Stdio::piped()).stderr(Stdio::piped());
    cmd.stdin(if stdin_bytes.is_some() { Stdio::piped() } else { Stdio::null() });

    let mut child = cmd.spawn().map_err(|e| classify(op, format!("spawn docker: {e}")))?;
    if let (Some(bytes), Some(mut stdin)) = (stdin_bytes, child.stdin.take()) {
        stdin.write_all(bytes).await.map_err(|e| classify(op, format!("write stdin: {e}")))?;
        drop(stdin);
    }
    let output =
        child.wait_with_output().await.map_err(|e| classify(op, format!("wait docker: {e}")))?;
    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        return Err(classify(op, stderr));
    }
    Ok(output)
}

#[async_trait]
impl SandboxDriver for DockerDriver {
    async fn ensure_volume(&self, name: &str) -> Result<(), SandboxError> {
        // `volume create` is idempotent for an existing name
        run_docker("volume create", &["volume".into(), "create".into(), name.into()], None)
            .await?;
        Ok(())
    }

    async fn delete_volume(&self, name: &str) -> Result<(), SandboxError> {
        match run_docker("volume rm", &["volume".into(), "rm".into(), name.into()], None).await {
            Ok(_) => Ok(()),
            Err(SandboxError::CommandFailed { message, .. })
                if message.to_lowercase().contains("no such volume") =>
            {
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    async fn create_container(&self, spec: &ContainerSpec) -> Result<String, SandboxError> {
        let output = run_docker("create container", &create_args(spec), None).await?;
        let container_id = String::from_utf8_lossy(&output.stdout).trim().to_string();
        if container_id.is_empty() {
            return Err(SandboxError::CommandFailed {
                op: "create container",
                message: "docker create printed no container id".to_string(),
            });
        }
        tracing::debug!(container_id = %container_id, image = %spec.image, "container created");
        Ok(container_id)
    }

    async fn start_container(&self, container_id: &str) -> Result<(), SandboxError> {
        run_docker("start container", &["start".into(), container_id.into()], None).await?;
        Ok(())
    }

    async fn stop_and_remove(&self, container_id: &str) -> Result<(), SandboxError> {
        match run_docker("remove container", &["rm".into(), "-f".into(), container_id.into()], None)
            .await
        {
            Ok(_) | Err(SandboxError::NotFound(_)) => Ok(()),
            Err(e) => Err(e),
        }
    }

    async fn inspect(&self, container_id: &str) -> Result<ContainerInfo, SandboxError> {
        let format = "{{.Config.Image}}\n{{.Image}}\n{{.NetworkSettings.IPAddress}}";
        let output = run_docker(
            "inspect container",
            &["inspect".into(), "--format".into(), format.into(), container_id.into()],
            None,
        )
        .await?;
        let text = String::from_utf8_lossy(&output.stdout);
        let mut lines = text.lines();
        let image_name = lines.next().unwrap_or_default().trim().to_string();
        let image_digest = lines.next().unwrap_or_default().trim().to_string();
        let ip = lines.next().unwrap_or_default().trim().to_string();
        let ip_address = if ip.is_empty() { None } else { Some(ip) };

        // Published host port for the agent's internal port, if any.
        let host_port = match run_docker(
            "inspect port",
            &["port".into(), container_id.into(), format!("{}/tcp", crate::AGENT_PORT)],
            None,
        )
        .await
        {
            Ok(out) => parse_host_port(&String::from_utf8_lossy(&out.stdout)),
            Err(_) => None,
        };

        Ok(ContainerInfo { image_name, image_digest, ip_address, host_port })
    }

    async fn exec(
        &self,
        container_id: &str,
        argv: &[String],
        workdir: &str,
    ) -> Result<ExecOutput, SandboxError> {
        let args = exec_args(container_id, argv, workdir);
        let mut cmd = tokio::process::Command::new("docker");
        cmd.args(&args).stdin(Stdio::null()).stdout(Stdio::piped()).stderr(Stdio::piped());
        let output = cmd
            .output()
            .await
            .map_err(|e| classify("exec", format!("spawn docker exec: {e}")))?;
        // `docker exec` propagates the inner command's exit code; non-zero
        // is a result, not a driver failure.
        Ok(ExecOutput {
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
            exit_code: output.status.code().unwrap_or(-1),
        })
    }

    async fn get_archive(
        &self,
        container_id: &str,
        path: &str,
    ) -> Result<Vec<u8>, SandboxError> {
        let output = run_docker(
            "get archive",
            &["cp".into(), format!("{container_id}:{path}"), "-".into()],
            None,
        )
        .await?;
        Ok(output.stdout)
    }

    async fn put_file(
        &self,
        container_id: &str,
        path: &str,
        bytes: &[u8],
    ) -> Result<(), SandboxError> {
        let (dir, file_name) = split_file_path(path)?;

        // Parent directory must exist before `docker cp` unpacks into it.
        let mkdir = ["mkdir".to_string(), "-p".to_string(), dir.clone()];
        let out = self.exec(container_id, &mkdir, "/").await?;
        if !out.success() {
            return Err(SandboxError::CommandFailed {
                op: "put file",
                message: format!("mkdir -p {dir} exited {}: {}", out.exit_code, out.stderr),
            });
        }

        let tarball = single_file_tar(&file_name, bytes)
            .map_err(|e| SandboxError::CommandFailed { op: "put file", message: e.to_string() })?;
        run_docker(
            "put file",
            &["cp".into(), "-".into(), format!("{container_id}:{dir}")],
            Some(&tarball),
        )
        .await?;
        Ok(())
    }
}

/// Parse `docker port` output (`0.0.0.0:49153`, possibly several lines).
fn parse_host_port(output: &str) -> Option<u16> {
    output
        .lines()
        .filter_map(|line| line.trim().rsplit(':').next())
        .find_map(|port| port.parse::<u16>().ok())
}

fn split_file_path(path: &str) -> Result<(String, String), SandboxError> {
    let trimmed = path.trim_end_matches('/');
    match trimmed.rsplit_once('/') {
        Some((dir, name)) if !name.is_empty() => {
            let dir = if dir.is_empty() { "/".to_string() } else { dir.to_string() };
            Ok((dir, name.to_string()))
        }
        _ => Err(SandboxError::CommandFailed {
            op: "put file",
            message: format!("not an absolute file path: {path}"),
        }),
    }
}

/// In-memory tar holding exactly one file.
fn single_file_tar(name: &str, bytes: &[u8]) -> std::io::Result<Vec<u8>> {
    let mut builder = tar::Builder::new(Vec::new());
    let mut header = tar::Header::new_gnu();
    header.set_size(bytes.len() as u64);
    header.set_mode(0o644);
    header.set_cksum();
    builder.append_data(&mut header, name, bytes)?;
    builder.into_inner()
}

#[cfg(test)]
#[path = "docker_tests.rs"]
mod tests;
