// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `hangard` — the control-plane daemon.
//!
//! Config comes from the environment, the sandbox driver is the local
//! Docker daemon, and the agent worker is reached over HTTP inside each
//! container. Persistence here is the in-process store; a relational
//! backend plugs in behind the same `Store` trait.

use hangar_core::{ApiKey, ApiKeyId, SystemClock, User, UserId};
use hangar_daemon::{app, auth, env};
use hangar_sandbox::{DockerDriver, HttpAgentClient};
use hangar_storage::{MemoryStore, Store};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = env::engine_config();
    let addr = env::http_addr();
    tracing::info!(
        image = %config.workspace_image,
        evidence_root = %config.evidence_root.display(),
        %addr,
        "starting hangard"
    );

    let store = Arc::new(MemoryStore::new());
    if let Some(token) = env::dev_token() {
        seed_dev_credential(store.as_ref(), &token).await?;
    }

    let driver = Arc::new(DockerDriver::new());
    let agent = Arc::new(HttpAgentClient::new());
    let daemon =
        app::build(store, driver, agent, SystemClock, config, env::intervals());

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, daemon.router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // Sweepers stop between items, never mid-item.
    daemon.cancel.cancel();
    for handle in daemon.background {
        let _ = handle.await;
    }
    tracing::info!("hangard stopped");
    Ok(())
}

/// Bootstrap an admin user + API key so a fresh daemon is reachable.
/// Production provisioning is external tooling against the store.
async fn seed_dev_credential(
    store: &MemoryStore,
    token: &str,
) -> Result<(), hangar_storage::StoreError> {
    let now = chrono::Utc::now();
    let mut user = User::new(UserId::new(), now);
    user.display_name = Some("dev".to_string());
    user.is_admin = true;
    let user_id = user.id;
    store.create_user(user).await?;
    store
        .create_api_key(ApiKey {
            id: ApiKeyId::new(),
            user_id,
            token_hash: auth::hash_token(token),
            label: Some("HANGAR_DEV_TOKEN".to_string()),
            created_at: now,
            revoked_at: None,
        })
        .await?;
    tracing::warn!("dev credential seeded from HANGAR_DEV_TOKEN");
    Ok(())
}

async fn shutdown_signal() {
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "SIGTERM handler unavailable");
                std::future::pending::<()>().await;
            }
        }
    };
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {}
        _ = terminate => {}
    }
    tracing::info!("shutdown signal received");
}
