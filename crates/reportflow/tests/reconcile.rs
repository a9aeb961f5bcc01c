mod common;

use std::sync::Arc;

use chrono::{Duration, Utc};

use common::{snapshot, stub_created_ago, Script, ScriptedGateway};
use reportflow::jobs::gc::RetentionPolicy;
use reportflow::jobs::reconcile::Reconciler;
use reportflow::jobs::LocalJobStore;
use reportflow::JobStatus;

fn reconciler(store: LocalJobStore, gateway: Arc<ScriptedGateway>) -> Reconciler {
    Reconciler::new(store, gateway, RetentionPolicy::default(), 25)
}

#[tokio::test]
async fn orphaned_job_is_removed() {
    let now = Utc::now();
    let store = LocalJobStore::in_memory("user");
    let gateway = Arc::new(ScriptedGateway::new());

    store.upsert(stub_created_ago("A", JobStatus::Running, Duration::minutes(1)), now);
    gateway.set_script("A", Script::NotFound);

    let report = reconciler(store.clone(), gateway).run_pass(false).await;

    assert_eq!(report.orphaned, vec!["A".to_string()]);
    assert!(store.get("A").is_none());
    assert!(store.list_all().is_empty());
}

#[tokio::test]
async fn transport_error_leaves_the_stub_untouched() {
    let now = Utc::now();
    let store = LocalJobStore::in_memory("user");
    let gateway = Arc::new(ScriptedGateway::new());

    store.upsert(stub_created_ago("A", JobStatus::Running, Duration::minutes(1)), now);
    gateway.set_script("A", Script::Transport);

    let report = reconciler(store.clone(), gateway).run_pass(false).await;

    assert_eq!(report.transport_failures, 1);
    assert!(report.orphaned.is_empty());
    // Never deleted or marked failed because the network blinked.
    assert_eq!(store.get("A").map(|s| s.status), Some(JobStatus::Running));
    assert!(!report.fully_successful());
}

#[tokio::test]
async fn recent_listing_discovers_jobs_from_other_devices() {
    let store = LocalJobStore::in_memory("user");
    let gateway = Arc::new(ScriptedGateway::new());
    gateway.set_recent(vec![snapshot("B", JobStatus::Done)]);

    let report = reconciler(store.clone(), gateway).run_pass(true).await;

    assert_eq!(report.discovered, vec!["B".to_string()]);
    let jobs = store.list_all();
    assert_eq!(jobs.len(), 1);
    assert_eq!(jobs[0].job_id, "B");
    assert_eq!(jobs[0].status, JobStatus::Done);
}

#[tokio::test]
async fn absence_from_the_recent_listing_never_removes() {
    let now = Utc::now();
    let store = LocalJobStore::in_memory("user");
    let gateway = Arc::new(ScriptedGateway::new());

    store.upsert(stub_created_ago("A", JobStatus::Running, Duration::minutes(1)), now);
    gateway.set_script("A", Script::Snapshot(JobStatus::Running));
    // The bounded listing does not mention A; that is not proof of anything.
    gateway.set_recent(Vec::new());

    let report = reconciler(store.clone(), gateway).run_pass(true).await;

    assert!(report.orphaned.is_empty());
    assert_eq!(store.get("A").map(|s| s.status), Some(JobStatus::Running));
}

#[tokio::test]
async fn completion_fires_once_across_repeated_passes() {
    let now = Utc::now();
    let store = LocalJobStore::in_memory("user");
    let gateway = Arc::new(ScriptedGateway::new());

    store.upsert(stub_created_ago("A", JobStatus::Running, Duration::minutes(1)), now);
    gateway.set_script("A", Script::Snapshot(JobStatus::Done));

    let reconciler = reconciler(store.clone(), gateway);

    let first = reconciler.run_pass(false).await;
    assert_eq!(first.completed, vec!["A".to_string()]);

    // Terminal jobs are not re-fetched, and even a forced re-merge of the
    // same snapshot reports nothing new.
    let second = reconciler.run_pass(false).await;
    let third = reconciler.run_pass(false).await;
    assert!(second.completed.is_empty());
    assert!(third.completed.is_empty());
}

#[tokio::test]
async fn terminal_jobs_are_not_refetched() {
    let now = Utc::now();
    let store = LocalJobStore::in_memory("user");
    let gateway = Arc::new(ScriptedGateway::new());

    let mut done = stub_created_ago("A", JobStatus::Done, Duration::minutes(1));
    done.completed_at = Some(now);
    store.upsert(done, now);

    reconciler(store, Arc::clone(&gateway)).run_pass(false).await;

    assert_eq!(gateway.get_calls(), 0);
}

#[tokio::test]
async fn failed_listing_counts_as_transport_failure() {
    let store = LocalJobStore::in_memory("user");
    let gateway = Arc::new(ScriptedGateway::new());
    gateway.set_fail_lookups(true);

    let report = reconciler(store, gateway).run_pass(true).await;

    assert_eq!(report.transport_failures, 1);
    assert!(!report.fully_successful());
}

#[tokio::test]
async fn fan_out_refreshes_every_active_job_in_one_pass() {
    let now = Utc::now();
    let store = LocalJobStore::in_memory("user");
    let gateway = Arc::new(ScriptedGateway::new());

    for i in 0..8 {
        let id = format!("job-{i}");
        store.upsert(stub_created_ago(&id, JobStatus::Queued, Duration::minutes(1)), now);
        gateway.set_script(&id, Script::Snapshot(JobStatus::Running));
    }
    // One job failing does not block the others.
    gateway.set_script("job-3", Script::Transport);

    let report = reconciler(store.clone(), Arc::clone(&gateway)).run_pass(false).await;

    assert_eq!(report.refreshed, 7);
    assert_eq!(report.transport_failures, 1);
    assert_eq!(gateway.get_calls(), 8);
    assert_eq!(store.get("job-3").map(|s| s.status), Some(JobStatus::Queued));
    assert_eq!(store.get("job-4").map(|s| s.status), Some(JobStatus::Running));
}
