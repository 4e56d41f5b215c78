// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Spec harness: an in-process daemon on an ephemeral port, fake sandbox
//! and agent, and a seeded user credential.

use hangar_core::{ApiKey, ApiKeyId, SystemClock, User, UserId};
use hangar_daemon::{app, auth, BackgroundIntervals};
use hangar_engine::EngineConfig;
use hangar_sandbox::{FakeAgentClient, FakeSandbox};
use hangar_storage::{MemoryStore, Store};
use std::sync::Arc;
use std::time::Duration;

pub struct Spec {
    pub base: String,
    pub client: reqwest::Client,
    pub token: String,
    pub user_id: UserId,
    pub store: Arc<MemoryStore>,
    pub sandbox: FakeSandbox,
    pub agent: FakeAgentClient,
    pub evidence_root: std::path::PathBuf,
    _evidence_dir: tempfile::TempDir,
    cancel: tokio_util::sync::CancellationToken,
}

impl Drop for Spec {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

impl Spec {
    pub async fn start() -> Self {
        Self::start_with(|_| {}).await
    }

    /// Boot the daemon with a tweaked engine config.
    pub async fn start_with(tweak: impl FnOnce(&mut EngineConfig)) -> Self {
        let store = Arc::new(MemoryStore::new());
        let sandbox = FakeSandbox::new();
        let agent = FakeAgentClient::new(sandbox.clone());

        let evidence_dir = tempfile::tempdir().expect("tempdir");
        let mut config = EngineConfig {
            evidence_root: evidence_dir.path().to_path_buf(),
            token_delay: Duration::from_millis(1),
            ..EngineConfig::default()
        };
        tweak(&mut config);

        let intervals = BackgroundIntervals {
            reap: Duration::from_millis(25),
            retention: Duration::from_secs(3600),
            retention_startup_delay: Duration::from_secs(3600),
            evidence_poll: Duration::from_millis(25),
        };

        let daemon = app::build(
            store.clone(),
            Arc::new(sandbox.clone()),
            Arc::new(agent.clone()),
            SystemClock,
            config.clone(),
            intervals,
        );
        let cancel = daemon.cancel.clone();

        let listener =
            tokio::net::TcpListener::bind("127.0.0.1:0").await.expect("bind ephemeral port");
        let addr = listener.local_addr().expect("local addr");
        tokio::spawn(async move {
            let _ = axum::serve(listener, daemon.router).await;
        });

        let mut spec = Self {
            base: format!("http://{addr}"),
            client: reqwest::Client::new(),
            token: String::new(),
            user_id: UserId::new(),
            store,
            sandbox,
            agent,
            evidence_root: config.evidence_root,
            _evidence_dir: evidence_dir,
            cancel,
        };
        let (user_id, token) = spec.seed_user("u1").await;
        spec.user_id = user_id;
        spec.token = token;
        spec
    }

    /// Seed a user + API key directly in the store (user provisioning is
    /// external tooling in production).
    pub async fn seed_user(&self, name: &str) -> (UserId, String) {
        let now = chrono::Utc::now();
        let mut user = User::new(UserId::new(), now);
        user.display_name = Some(name.to_string());
        let user_id = user.id;
        self.store.create_user(user).await.expect("create user");

        let token = format!("spec-token-{name}-{user_id}");
        self.store
            .create_api_key(ApiKey {
                id: ApiKeyId::new(),
                user_id,
                token_hash: auth::hash_token(&token),
                label: Some(name.to_string()),
                created_at: now,
                revoked_at: None,
            })
            .await
            .expect("create api key");
        (user_id, token)
    }

    pub async fn get(&self, path: &str) -> (reqwest::StatusCode, serde_json::Value) {
        self.get_as(path, &self.token).await
    }

    pub async fn get_as(
        &self,
        path: &str,
        token: &str,
    ) -> (reqwest::StatusCode, serde_json::Value) {
        let response = self
            .client
            .get(format!("{}{path}", self.base))
            .bearer_auth(token)
            .send()
            .await
            .expect("request");
        let status = response.status();
        let body = response.json().await.unwrap_or(serde_json::Value::Null);
        (status, body)
    }

    pub async fn post(
        &self,
        path: &str,
        body: serde_json::Value,
    ) -> (reqwest::StatusCode, serde_json::Value) {
        self.post_as(path, body, &self.token).await
    }

    pub async fn post_as(
        &self,
        path: &str,
        body: serde_json::Value,
        token: &str,
    ) -> (reqwest::StatusCode, serde_json::Value) {
        let response = self
            .client
            .post(format!("{}{path}", self.base))
            .bearer_auth(token)
            .json(&body)
            .send()
            .await
            .expect("request");
        let status = response.status();
        let body = response.json().await.unwrap_or(serde_json::Value::Null);
        (status, body)
    }

    pub async fn create_project(&self, name: &str) -> String {
        self.create_project_as(name, &self.token).await
    }

    pub async fn create_project_as(&self, name: &str, token: &str) -> String {
        let (status, body) = self
            .post_as(
                "/projects",
                serde_json::json!({
                    "name": name,
                    "repoUrl": "https://github.com/octocat/Hello-World.git"
                }),
                token,
            )
            .await;
        assert_eq!(status, 200, "create project: {body}");
        body["projectId"].as_str().expect("projectId").to_string()
    }

    pub async fn open(&self, project_id: &str) -> serde_json::Value {
        let (status, body) =
            self.post(&format!("/projects/{project_id}/open"), serde_json::json!({})).await;
        assert_eq!(status, 200, "open: {body}");
        body
    }

    pub async fn message(
        &self,
        project_id: &str,
        text: &str,
    ) -> (reqwest::StatusCode, serde_json::Value) {
        self.post(
            &format!("/projects/{project_id}/message"),
            serde_json::json!({ "text": text }),
        )
        .await
    }

    /// Raw SSE body of a streamed message, as received by the client.
    pub async fn message_stream_raw(&self, project_id: &str, text: &str) -> String {
        let response = self
            .client
            .post(format!("{}/projects/{project_id}/message/stream", self.base))
            .bearer_auth(&self.token)
            .json(&serde_json::json!({ "text": text }))
            .send()
            .await
            .expect("stream request");
        assert_eq!(response.status(), 200);
        assert_eq!(
            response.headers().get("content-type").and_then(|v| v.to_str().ok()),
            Some("text/event-stream")
        );
        response.text().await.expect("stream body")
    }
}

/// Poll `probe` until it returns true or `max` elapses.
pub async fn wait_for<F, Fut>(max: Duration, mut probe: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    let deadline = std::time::Instant::now() + max;
    loop {
        if probe().await {
            return true;
        }
        if std::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

/// Parse an SSE body into `(event, data-json)` pairs.
pub fn parse_sse(body: &str) -> Vec<(String, serde_json::Value)> {
    let mut frames = Vec::new();
    let mut event = None;
    for line in body.lines() {
        if let Some(name) = line.strip_prefix("event: ") {
            event = Some(name.to_string());
        } else if let Some(data) = line.strip_prefix("data: ") {
            if let (Some(name), Ok(json)) =
                (event.take(), serde_json::from_str::<serde_json::Value>(data))
            {
                frames.push((name, json));
            }
        }
    }
    frames
}
