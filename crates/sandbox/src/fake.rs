// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Fake driver and agent for deterministic testing.
//!
//! `FakeSandbox` models volumes as in-memory file trees so workspace
//! contents survive cold/warm cycles exactly like a named Docker volume.
//! `FakeAgentClient` resolves the container it was dialed at, honors the
//! `CODEX_THREAD_ID` the control plane injected, and drops the worker-owned
//! evidence files (`command_log.jsonl`, `outputs.json`) into the sandbox.

use crate::agent::{AgentClient, AgentError, AgentReply, AgentRequest};
use crate::driver::{ContainerInfo, ContainerSpec, ExecOutput, SandboxDriver, SandboxError};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

/// Recorded call to [`FakeSandbox`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SandboxCall {
    EnsureVolume { name: String },
    DeleteVolume { name: String },
    CreateContainer { image: String, volume_name: String },
    StartContainer { container_id: String },
    StopAndRemove { container_id: String },
    Inspect { container_id: String },
    Exec { container_id: String, argv: Vec<String> },
    GetArchive { container_id: String, path: String },
    PutFile { container_id: String, path: String },
}

struct FakeContainer {
    spec: ContainerSpec,
    running: bool,
    host_port: u16,
}

#[derive(Default)]
struct FakeState {
    calls: Vec<SandboxCall>,
    /// volume name → absolute path → contents
    volumes: HashMap<String, BTreeMap<String, Vec<u8>>>,
    containers: HashMap<String, FakeContainer>,
    next_container: u64,
    next_port: u16,
    errors: HashMap<&'static str, VecDeque<SandboxError>>,
    exec_results: VecDeque<ExecOutput>,
}

/// Fake sandbox driver: records every call, supports programmable
/// failures per operation, and keeps volume contents in memory.
#[derive(Clone)]
pub struct FakeSandbox {
    inner: Arc<Mutex<FakeState>>,
}

impl Default for FakeSandbox {
    fn default() -> Self {
        Self::new()
    }
}

impl FakeSandbox {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(FakeState {
                next_port: 42000,
                ..FakeState::default()
            })),
        }
    }

    /// Queue an error for the named operation; consumed one per call.
    /// Operation names match the `SandboxDriver` method names.
    pub fn push_error(&self, op: &'static str, error: SandboxError) {
        self.inner.lock().errors.entry(op).or_default().push_back(error);
    }

    /// Queue the result of the next `exec` call.
    pub fn push_exec_result(&self, output: ExecOutput) {
        self.inner.lock().exec_results.push_back(output);
    }

    pub fn calls(&self) -> Vec<SandboxCall> {
        self.inner.lock().calls.clone()
    }

    pub fn running_containers(&self) -> Vec<String> {
        let state = self.inner.lock();
        let mut ids: Vec<String> = state
            .containers
            .iter()
            .filter(|(_, c)| c.running)
            .map(|(id, _)| id.clone())
            .collect();
        ids.sort();
        ids
    }

    pub fn volume_exists(&self, name: &str) -> bool {
        self.inner.lock().volumes.contains_key(name)
    }

    /// Environment the container was created with, resolved by host port.
    pub fn container_env_by_port(&self, port: u16) -> Option<Vec<(String, String)>> {
        let state = self.inner.lock();
        state
            .containers
            .values()
            .find(|c| c.host_port == port)
            .map(|c| c.spec.env.clone())
    }

    /// Write a file into the volume mounted by `container_id`.
    pub fn write_file(&self, container_id: &str, path: &str, bytes: &[u8]) -> bool {
        let mut state = self.inner.lock();
        let Some(volume) = state.containers.get(container_id).map(|c| c.spec.volume_name.clone())
        else {
            return false;
        };
        state.volumes.entry(volume).or_default().insert(path.to_string(), bytes.to_vec());
        true
    }

    /// Write a file into the volume mounted by the container published on
    /// `port`.
    pub fn write_file_by_port(&self, port: u16, path: &str, bytes: &[u8]) -> bool {
        let id = {
            let state = self.inner.lock();
            state
                .containers
                .iter()
                .find(|(_, c)| c.host_port == port)
                .map(|(id, _)| id.clone())
        };
        match id {
            Some(id) => self.write_file(&id, path, bytes),
            None => false,
        }
    }

    pub fn read_file(&self, container_id: &str, path: &str) -> Option<Vec<u8>> {
        let state = self.inner.lock();
        let volume = &state.containers.get(container_id)?.spec.volume_name;
        state.volumes.get(volume)?.get(path).cloned()
    }

    fn take_error(&self, op: &'static str) -> Option<SandboxError> {
        self.inner.lock().errors.get_mut(op).and_then(VecDeque::pop_front)
    }
}

#[async_trait]
impl SandboxDriver for FakeSandbox {
    async fn ensure_volume(&self, name: &str) -> Result<(), SandboxError> {
        self.inner.lock().calls.push(SandboxCall::EnsureVolume { name: name.to_string() });
        if let Some(err) = self.take_error("ensure_volume") {
            return Err(err);
        }
        self.inner.lock().volumes.entry(name.to_string()).or_default();
        Ok(())
    }

    async fn delete_volume(&self, name: &str) -> Result<(), SandboxError> {
        self.inner.lock().calls.push(SandboxCall::DeleteVolume { name: name.to_string() });
        if let Some(err) = self.take_error("delete_volume") {
            return Err(err);
        }
        self.inner.lock().volumes.remove(name);
        Ok(())
    }

    async fn create_container(&self, spec: &ContainerSpec) -> Result<String, SandboxError> {
        self.inner.lock().calls.push(SandboxCall::CreateContainer {
            image: spec.image.clone(),
            volume_name: spec.volume_name.clone(),
        });
        if let Some(err) = self.take_error("create_container") {
            return Err(err);
        }
        let mut state = self.inner.lock();
        state.next_container += 1;
        state.next_port += 1;
        let id = format!("ctr-{}", state.next_container);
        let port = state.next_port;
        state
            .containers
            .insert(id.clone(), FakeContainer { spec: spec.clone(), running: false, host_port: port });
        Ok(id)
    }

    async fn start_container(&self, container_id: &str) -> Result<(), SandboxError> {
        self.inner
            .lock()
            .calls
            .push(SandboxCall::StartContainer { container_id: container_id.to_string() });
        if let Some(err) = self.take_error("start_container") {
            return Err(err);
        }
        let mut state = self.inner.lock();
        match state.containers.get_mut(container_id) {
            Some(container) => {
                container.running = true;
                Ok(())
            }
            None => Err(SandboxError::NotFound(container_id.to_string())),
        }
    }

    async fn stop_and_remove(&self, container_id: &str) -> Result<(), SandboxError> {
        self.inner
            .lock()
            .calls
            .push(SandboxCall::StopAndRemove { container_id: container_id.to_string() });
        if let Some(err) = self.take_error("stop_and_remove") {
            return Err(err);
        }
        // Idempotent: removing a missing container succeeds
        self.inner.lock().containers.remove(container_id);
        Ok(())
    }

    async fn inspect(&self, container_id: &str) -> Result<ContainerInfo, SandboxError> {
        self.inner
            .lock()
            .calls
            .push(SandboxCall::Inspect { container_id: container_id.to_string() });
        if let Some(err) = self.take_error("inspect") {
            return Err(err);
        }
        let state = self.inner.lock();
        let container = state
            .containers
            .get(container_id)
            .ok_or_else(|| SandboxError::NotFound(container_id.to_string()))?;
        Ok(ContainerInfo {
            image_name: container.spec.image.clone(),
            image_digest: format!("sha256:fake-{}", container.spec.image.replace([':', '/'], "-")),
            ip_address: Some("172.17.0.2".to_string()),
            host_port: Some(container.host_port),
        })
    }

    async fn exec(
        &self,
        container_id: &str,
        argv: &[String],
        _workdir: &str,
    ) -> Result<ExecOutput, SandboxError> {
        self.inner.lock().calls.push(SandboxCall::Exec {
            container_id: container_id.to_string(),
            argv: argv.to_vec(),
        });
        if let Some(err) = self.take_error("exec") {
            return Err(err);
        }
        let mut state = self.inner.lock();
        if !state.containers.contains_key(container_id) {
            return Err(SandboxError::NotFound(container_id.to_string()));
        }
        if let Some(scripted) = state.exec_results.pop_front() {
            return Ok(scripted);
        }
        // Default `ls <dir>`: names of volume files directly under the dir
        if argv.first().map(String::as_str) == Some("ls") {
            if let Some(dir) = argv.get(1) {
                let prefix = format!("{}/", dir.trim_end_matches('/'));
                let volume = state
                    .containers
                    .get(container_id)
                    .map(|c| c.spec.volume_name.clone())
                    .unwrap_or_default();
                let mut names: Vec<String> = state
                    .volumes
                    .get(&volume)
                    .map(|files| {
                        files
                            .keys()
                            .filter_map(|p| p.strip_prefix(&prefix))
                            .filter(|rest| !rest.contains('/'))
                            .map(str::to_string)
                            .collect()
                    })
                    .unwrap_or_default();
                names.sort();
                names.dedup();
                if names.is_empty() {
                    return Ok(ExecOutput {
                        stdout: String::new(),
                        stderr: format!("ls: {dir}: No such file or directory\n"),
                        exit_code: 1,
                    });
                }
                let mut stdout = names.join("\n");
                stdout.push('\n');
                return Ok(ExecOutput { stdout, stderr: String::new(), exit_code: 0 });
            }
        }
        // Default: succeed; a clone materializes a .git marker in the volume
        if argv.iter().any(|a| a.contains("git clone")) {
            if let Some(volume) = state
                .containers
                .get(container_id)
                .map(|c| c.spec.volume_name.clone())
            {
                state
                    .volumes
                    .entry(volume)
                    .or_default()
                    .insert("/workspace/repo/.git/HEAD".into(), b"ref: refs/heads/main\n".to_vec());
            }
        }
        Ok(ExecOutput::default())
    }

    async fn get_archive(
        &self,
        container_id: &str,
        path: &str,
    ) -> Result<Vec<u8>, SandboxError> {
        self.inner.lock().calls.push(SandboxCall::GetArchive {
            container_id: container_id.to_string(),
            path: path.to_string(),
        });
        if let Some(err) = self.take_error("get_archive") {
            return Err(err);
        }
        let state = self.inner.lock();
        let container = state
            .containers
            .get(container_id)
            .ok_or_else(|| SandboxError::NotFound(container_id.to_string()))?;
        let files = state.volumes.get(&container.spec.volume_name);

        let trimmed = path.trim_end_matches('/');
        let base = trimmed.rsplit('/').next().unwrap_or(trimmed);
        let prefix = format!("{trimmed}/");
        let mut matched: Vec<(String, Vec<u8>)> = Vec::new();
        if let Some(files) = files {
            for (file_path, bytes) in files {
                if let Some(rest) = file_path.strip_prefix(&prefix) {
                    matched.push((format!("{base}/{rest}"), bytes.clone()));
                } else if file_path == trimmed {
                    matched.push((base.to_string(), bytes.clone()));
                }
            }
        }
        if matched.is_empty() {
            return Err(SandboxError::NotFound(format!("{container_id}:{path}")));
        }

        let mut builder = tar::Builder::new(Vec::new());
        for (name, bytes) in matched {
            let mut header = tar::Header::new_gnu();
            header.set_size(bytes.len() as u64);
            header.set_mode(0o644);
            header.set_cksum();
            builder
                .append_data(&mut header, name, bytes.as_slice())
                .map_err(|e| SandboxError::CommandFailed {
                    op: "get_archive",
                    message: e.to_string(),
                })?;
        }
        builder
            .into_inner()
            .map_err(|e| SandboxError::CommandFailed { op: "get_archive", message: e.to_string() })
    }

    async fn put_file(
        &self,
        container_id: &str,
        path: &str,
        bytes: &[u8],
    ) -> Result<(), SandboxError> {
        self.inner.lock().calls.push(SandboxCall::PutFile {
            container_id: container_id.to_string(),
            path: path.to_string(),
        });
        if let Some(err) = self.take_error("put_file") {
            return Err(err);
        }
        if self.write_file(container_id, path, bytes) {
            Ok(())
        } else {
            Err(SandboxError::NotFound(container_id.to_string()))
        }
    }
}

/// One recorded agent invocation.
#[derive(Debug, Clone)]
pub struct AgentCall {
    pub addr: String,
    pub text: String,
    pub run_id: hangar_core::RunId,
}

#[derive(Default)]
struct AgentState {
    calls: Vec<AgentCall>,
    scripted: VecDeque<Result<AgentReply, AgentError>>,
    delay: Option<Duration>,
    /// thread id → prompts seen, oldest first
    threads: HashMap<String, Vec<String>>,
    next_thread: u64,
    next_commit: u64,
}

/// Scripted agent worker.
///
/// Unscripted calls get a deterministic default behavior that mimics the
/// real worker closely enough for end-to-end specs: prompts of the form
/// `create <file>` produce a diff touching that file; `remember that my
/// name is X` / `what is my name?` exercise thread continuity.
#[derive(Clone)]
pub struct FakeAgentClient {
    sandbox: FakeSandbox,
    inner: Arc<Mutex<AgentState>>,
}

impl FakeAgentClient {
    pub fn new(sandbox: FakeSandbox) -> Self {
        Self { sandbox, inner: Arc::new(Mutex::new(AgentState::default())) }
    }

    /// Queue a reply (or error) for the next call, bypassing the default
    /// behavior.
    pub fn push_reply(&self, reply: Result<AgentReply, AgentError>) {
        self.inner.lock().scripted.push_back(reply);
    }

    /// Delay every call by `delay` — used to provoke timeouts and overlap.
    pub fn set_delay(&self, delay: Duration) {
        self.inner.lock().delay = Some(delay);
    }

    pub fn calls(&self) -> Vec<AgentCall> {
        self.inner.lock().calls.clone()
    }

    fn resolve_thread(&self, addr: &str) -> String {
        let port = addr.rsplit(':').next().and_then(|p| p.parse::<u16>().ok());
        let injected = port
            .and_then(|p| self.sandbox.container_env_by_port(p))
            .and_then(|env| env.into_iter().find(|(k, _)| k == "CODEX_THREAD_ID"))
            .map(|(_, v)| v);
        if let Some(thread_id) = injected {
            return thread_id;
        }
        let mut state = self.inner.lock();
        state.next_thread += 1;
        format!("thread-{}", state.next_thread)
    }

    fn default_reply(&self, thread_id: &str, text: &str) -> (String, String) {
        if let Some(rest) = text.strip_prefix("create ") {
            let file = rest.split_whitespace().next().unwrap_or("file.txt");
            let diff = format!(
                "diff --git a/{file} b/{file}\nnew file mode 100644\n--- /dev/null\n+++ b/{file}\n@@ -0,0 +1 @@\n+hello\n"
            );
            return (format!("Created {file}."), diff);
        }
        if text.contains("my name is") {
            return ("Okay, I'll remember that.".to_string(), String::new());
        }
        if text.contains("what is my name") {
            let state = self.inner.lock();
            let remembered = state
                .threads
                .get(thread_id)
                .and_then(|prompts| {
                    prompts.iter().find_map(|p| {
                        p.split_once("my name is ").map(|(_, rest)| {
                            rest.split(|c: char| !c.is_alphanumeric())
                                .next()
                                .unwrap_or("")
                                .to_string()
                        })
                    })
                })
                .filter(|name| !name.is_empty());
            return match remembered {
                Some(name) => (format!("Your name is {name}."), String::new()),
                None => ("I don't have a name on file.".to_string(), String::new()),
            };
        }
        (format!("ack: {text}"), String::new())
    }

    fn drop_worker_evidence(&self, addr: &str, run_id: hangar_core::RunId) {
        let Some(port) = addr.rsplit(':').next().and_then(|p| p.parse::<u16>().ok()) else {
            return;
        };
        let dir = format!("/workspace/evidence/{run_id}");
        let command_log = "{\"command\":\"true\",\"cwd\":\"/workspace/repo\",\"exitCode\":0}\n";
        self.sandbox.write_file_by_port(
            port,
            &format!("{dir}/command_log.jsonl"),
            command_log.as_bytes(),
        );
        self.sandbox.write_file_by_port(port, &format!("{dir}/outputs.json"), b"{\"files\":[]}");
    }
}

#[async_trait]
impl AgentClient for FakeAgentClient {
    async fn execute(&self, addr: &str, request: AgentRequest) -> Result<AgentReply, AgentError> {
        let delay = {
            let mut state = self.inner.lock();
            state.calls.push(AgentCall {
                addr: addr.to_string(),
                text: request.text.clone(),
                run_id: request.run_id,
            });
            state.delay
        };
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        // The worker always leaves its evidence files behind, even for
        // scripted replies, so bundle assembly stays realistic.
        self.drop_worker_evidence(addr, request.run_id);

        if let Some(scripted) = self.inner.lock().scripted.pop_front() {
            return scripted;
        }

        let thread_id = self.resolve_thread(addr);
        let (final_text, diff) = self.default_reply(&thread_id, &request.text);
        {
            let mut state = self.inner.lock();
            state.threads.entry(thread_id.clone()).or_default().push(request.text.clone());
        }
        let git_commit = if diff.is_empty() {
            None
        } else {
            let mut state = self.inner.lock();
            state.next_commit += 1;
            Some(format!("{:07x}", 0xabc0000u64 + state.next_commit))
        };
        Ok(AgentReply { final_text, diff, thread_id, git_commit, commands: Vec::new() })
    }
}

#[cfg(test)]
#[path = "fake_tests.rs"]
mod tests;
