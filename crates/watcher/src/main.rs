use std::sync::Arc;
use std::time::{Duration, Instant};

use serde_json::json;
use tracing_subscriber::EnvFilter;

use reportflow::{
    EngineConfig, EngineEvent, JobStatus, JobStub, RemoteJobGateway, ReportRequest, ReportSession,
};

mod sim;
use sim::SimulatedGateway;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let mut config = EngineConfig::from_env();
    // Demo pacing: fast polls so the session converges while you watch.
    config.scheduler.poll_interval = Duration::from_millis(500);
    config.scheduler.backoff.base_ms = 500;
    config.scheduler.backoff.max_ms = 4_000;
    config.scheduler.failure_threshold = 3;
    config.scheduler.recent_every_passes = 3;

    println!(
        "watcher starting... state_dir={} poll_interval_ms={} failure_threshold={}",
        config
            .state_dir
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "memory-only".to_string()),
        config.scheduler.poll_interval.as_millis(),
        config.scheduler.failure_threshold,
    );

    let gateway = Arc::new(SimulatedGateway::new());
    // A finished job "from another device": only the recent listing knows it.
    gateway.seed_remote_job("quarterly-revenue", JobStatus::Done);

    let session = ReportSession::start(
        "demo-user",
        Arc::clone(&gateway) as Arc<dyn RemoteJobGateway>,
        config,
    );
    let view = session.view().clone();

    let mut events = view.events();
    let events_task = tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            match event {
                EngineEvent::JobCompleted { job_id } => println!("[event] completed {job_id}"),
                EngineEvent::JobOrphaned { job_id } => println!("[event] orphaned {job_id}"),
                EngineEvent::ConnectivityDegraded => println!("[event] status updates delayed"),
                EngineEvent::ConnectivityRestored => println!("[event] status updates restored"),
            }
        }
    });

    let requests = [
        ReportRequest {
            template_ref: "sales-by-region".to_string(),
            title: Some("Sales by region, Q3".to_string()),
            parameters: json!({ "quarter": "2026-Q3" }),
        },
        ReportRequest {
            template_ref: "churn-cohorts".to_string(),
            title: None,
            parameters: json!({ "months": 6 }),
        },
        ReportRequest {
            template_ref: "inventory-aging".to_string(),
            title: Some("Inventory aging".to_string()),
            parameters: json!({}),
        },
    ];

    let mut submitted = Vec::new();
    for request in &requests {
        let job_id = view.submit(request).await?;
        println!("submitted {} -> {job_id}", request.template_ref);
        submitted.push(job_id);
    }

    let mut list_rx = view.subscribe();
    let started = Instant::now();
    let mut purged = false;
    let mut outage_started = false;
    let mut outage_cleared = false;

    while started.elapsed() < Duration::from_secs(14) {
        tokio::select! {
            changed = list_rx.changed() => {
                if changed.is_err() {
                    break;
                }
                print_list(&list_rx.borrow());
            }
            _ = tokio::time::sleep(Duration::from_millis(400)) => {}
        }

        // Scripted incidents to show orphan removal and backoff in action.
        if !purged && started.elapsed() > Duration::from_secs(2) {
            purged = true;
            if let Some(job_id) = submitted.first() {
                if gateway.purge(job_id) {
                    println!("-- server purged {job_id} --");
                }
            }
        }
        if !outage_started && started.elapsed() > Duration::from_secs(5) {
            outage_started = true;
            gateway.set_outage(true);
            println!("-- simulated outage begins --");
        }
        if !outage_cleared && started.elapsed() > Duration::from_secs(10) {
            outage_cleared = true;
            gateway.set_outage(false);
            println!("-- simulated outage over --");
        }
    }

    let stats = view.stats();
    println!(
        "passes={} failed={} transport_failures={} completed={} orphaned={} discovered={} pruned={}",
        stats.passes,
        stats.failed_passes,
        stats.transport_failures,
        stats.jobs_completed,
        stats.orphans_removed,
        stats.jobs_discovered,
        stats.stubs_pruned,
    );

    session.shutdown().await;
    events_task.abort();
    Ok(())
}

fn print_list(jobs: &[JobStub]) {
    println!("reports ({}):", jobs.len());
    for job in jobs {
        println!(
            "  {:7} {:28} {}",
            job.status.as_str(),
            job.display_title(),
            job.job_id
        );
    }
}
