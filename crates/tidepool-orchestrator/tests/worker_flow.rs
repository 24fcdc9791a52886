// crates/tidepool-orchestrator/tests/worker_flow.rs
// ============================================================================
// Module: Worker Flow Tests
// Description: Queue worker drain, retry, and dead-letter behavior.
// Purpose: Validate the worker loop end to end against in-memory stores.
// Dependencies: tidepool-orchestrator, tidepool-core, tokio
// ============================================================================

//! ## Overview
//! Runs [`tidepool_orchestrator::QueueWorker`] against the in-memory job
//! store: a healthy job drains, a failing job retries and eventually
//! dead-letters with its full payload.

#![allow(
    clippy::panic,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic_in_result_fn,
    clippy::unwrap_in_result,
    reason = "Test-only panic-based assertions are permitted."
)]

mod support;

use std::sync::Arc;
use std::time::Duration;

use support::MemoryJobs;
use support::MemoryRegistry;
use support::MockBackup;
use support::MockEngine;
use support::MockNotifier;
use support::project_fixture;
use support::test_vault;
use tidepool_core::JobPayload;
use tidepool_core::JobQueue;
use tidepool_core::JobStore;
use tidepool_core::ProjectId;
use tidepool_core::RetryPolicy;
use tidepool_core::Timestamp;
use tidepool_orchestrator::JobHandlers;
use tidepool_orchestrator::LifecycleIntervals;
use tidepool_orchestrator::NullTelemetry;
use tidepool_orchestrator::QueueWorker;
use tokio::sync::watch;

fn handlers(
    registry: &Arc<MemoryRegistry>,
    jobs: &Arc<MemoryJobs>,
    engine: &Arc<MockEngine>,
) -> Arc<JobHandlers> {
    Arc::new(JobHandlers::new(
        registry.clone(),
        jobs.clone(),
        engine.clone(),
        Arc::new(test_vault()),
        MockNotifier::shared(),
        MockBackup::shared(),
        Arc::new(NullTelemetry),
        LifecycleIntervals {
            delete_grace: Duration::from_secs(7 * 24 * 60 * 60),
            rotation_interval: Duration::from_secs(30 * 24 * 60 * 60),
            backup_interval: Duration::from_secs(7 * 24 * 60 * 60),
        },
    ))
}

#[tokio::test(flavor = "multi_thread")]
async fn worker_drains_due_jobs_and_stops_on_shutdown() {
    let registry = MemoryRegistry::with_projects(&[project_fixture("p1", &["acme_db"])]);
    let jobs = MemoryJobs::shared();
    let engine = MockEngine::shared();
    jobs.enqueue(
        &JobPayload::DeleteDatabase {
            project_id: ProjectId::new("p1"),
        },
        Timestamp::from_unix_millis(0),
        Timestamp::from_unix_millis(0),
    )
    .expect("enqueue");

    let worker = QueueWorker::new(
        JobQueue::Lifecycle,
        jobs.clone(),
        handlers(&registry, &jobs, &engine),
        RetryPolicy::default(),
        Duration::from_millis(10),
        Arc::new(NullTelemetry),
    );
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let handle = tokio::spawn(worker.run(shutdown_rx));

    tokio::time::sleep(Duration::from_millis(200)).await;
    assert!(jobs.pending(JobQueue::Lifecycle).is_empty(), "job must drain");

    shutdown_tx.send(true).expect("signal");
    handle.await.expect("worker exits");

    let project = registry
        .projects
        .lock()
        .expect("lock")
        .get("p1")
        .cloned()
        .expect("project");
    assert!(project.inactive_databases.is_empty(), "delete handler ran");
}

#[tokio::test(flavor = "multi_thread")]
async fn failing_job_is_dead_lettered_with_payload() {
    let registry = MemoryRegistry::with_projects(&[project_fixture("p1", &[])]);
    let jobs = MemoryJobs::shared();
    let engine = MockEngine::shared();
    engine.set_failing(true);

    let payload = JobPayload::RotatePassword {
        project_id: ProjectId::new("p1"),
    };
    jobs.enqueue(&payload, Timestamp::from_unix_millis(0), Timestamp::from_unix_millis(0))
        .expect("enqueue");

    let worker = QueueWorker::new(
        JobQueue::Maintenance,
        jobs.clone(),
        handlers(&registry, &jobs, &engine),
        RetryPolicy {
            max_attempts: 2,
            base_delay: Duration::from_millis(1),
        },
        Duration::from_millis(5),
        Arc::new(NullTelemetry),
    );
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let handle = tokio::spawn(worker.run(shutdown_rx));

    tokio::time::sleep(Duration::from_millis(300)).await;
    shutdown_tx.send(true).expect("signal");
    handle.await.expect("worker exits");

    let letters = jobs.dead_letters(JobQueue::Maintenance).expect("letters");
    assert_eq!(letters.len(), 1, "exhausted job must surface, not vanish");
    assert_eq!(letters[0].payload, payload);
    assert_eq!(letters[0].attempts, 2);
    assert!(letters[0].last_error.contains("mock engine unavailable"));
}
