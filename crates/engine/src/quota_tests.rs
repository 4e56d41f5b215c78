// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use chrono::TimeZone;
use hangar_core::{FakeClock, Project, ProjectId, Run, RunId};
use hangar_storage::MemoryStore;

async fn seed(store: &MemoryStore) -> (UserId, ProjectId, hangar_core::WorkspaceId) {
    let now = Utc.with_ymd_and_hms(2026, 3, 1, 8, 0, 0).single().unwrap();
    let user = hangar_core::User::new(UserId::new(), now);
    let user_id = user.id;
    store.create_user(user).await.unwrap();
    let project = Project {
        id: ProjectId::new(),
        user_id,
        name: "demo".into(),
        repo_url: "https://example.com/repo.git".into(),
        created_at: now,
    };
    let project_id = project.id;
    store.create_project(project).await.unwrap();
    let ws = store.open_workspace(user_id, project_id, now).await.unwrap().target;
    (user_id, project_id, ws.id)
}

fn clock_at(hour: u32) -> FakeClock {
    let clock = FakeClock::new();
    clock.set_utc(Utc.with_ymd_and_hms(2026, 3, 1, hour, 0, 0).single().unwrap());
    clock
}

#[tokio::test]
async fn under_limit_allows() {
    let store = Arc::new(MemoryStore::new());
    let (user, _, _) = seed(&store).await;
    let quota = QuotaChecker::new(store, clock_at(9), 2);
    assert!(quota.check(user).await.unwrap());
}

#[tokio::test]
async fn at_limit_denies() {
    let store = Arc::new(MemoryStore::new());
    let (user, project, ws) = seed(&store).await;
    let clock = clock_at(9);
    for _ in 0..2 {
        store
            .insert_run(Run::started(RunId::new(), user, project, ws, "p".into(), clock.now_utc()))
            .await
            .unwrap();
    }
    let quota = QuotaChecker::new(store, clock, 2);
    assert!(!quota.check(user).await.unwrap());
}

#[tokio::test]
async fn yesterdays_runs_do_not_count() {
    let store = Arc::new(MemoryStore::new());
    let (user, project, ws) = seed(&store).await;
    let yesterday = Utc.with_ymd_and_hms(2026, 2, 28, 23, 59, 0).single().unwrap();
    store
        .insert_run(Run::started(RunId::new(), user, project, ws, "p".into(), yesterday))
        .await
        .unwrap();
    let quota = QuotaChecker::new(store, clock_at(0), 1);
    assert!(quota.check(user).await.unwrap());
}

#[tokio::test]
async fn quota_is_per_user() {
    let store = Arc::new(MemoryStore::new());
    let (user_a, project, ws) = seed(&store).await;
    let (user_b, _, _) = seed(&store).await;
    let clock = clock_at(9);
    store
        .insert_run(Run::started(RunId::new(), user_a, project, ws, "p".into(), clock.now_utc()))
        .await
        .unwrap();
    let quota = QuotaChecker::new(store, clock, 1);
    assert!(!quota.check(user_a).await.unwrap());
    assert!(quota.check(user_b).await.unwrap());
}
