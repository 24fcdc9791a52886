// crates/tidepool-orchestrator/tests/lifecycle_flow.rs
// ============================================================================
// Module: Lifecycle Flow Tests
// Description: End-to-end pause/delete/resume/rotate flows against mocks.
// Purpose: Validate idempotence and the re-fetch-before-mutate contract.
// Dependencies: tidepool-orchestrator, tidepool-core, tokio
// ============================================================================

//! ## Overview
//! Drives the idle scan, job handlers, and tenant resume against
//! in-memory collaborators, covering the grace-window race: a tenant
//! resume between pause and delete must turn the delete into a no-op.

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

use support::EngineOp;
use support::MemoryJobs;
use support::MemoryRegistry;
use support::MockBackup;
use support::MockEngine;
use support::MockNotifier;
use support::project_fixture;
use support::test_vault;
use tidepool_core::DatabaseName;
use tidepool_core::IdleDatabase;
use tidepool_core::JobKind;
use tidepool_core::JobPayload;
use tidepool_core::JobQueue;
use tidepool_core::NotificationKind;
use tidepool_core::OwnerId;
use tidepool_core::ProjectId;
use tidepool_core::RegistryStore;
use tidepool_core::RoleName;
use tidepool_core::Timestamp;
use tidepool_core::UsageStatus;
use tidepool_orchestrator::DirtyFlag;
use tidepool_orchestrator::IdleScan;
use tidepool_orchestrator::JobHandlers;
use tidepool_orchestrator::LifecycleIntervals;
use tidepool_orchestrator::NullTelemetry;
use tidepool_orchestrator::PeriodicTask;
use tidepool_orchestrator::TenantOps;

/// Seven days in milliseconds.
const GRACE_MS: i64 = 7 * 24 * 60 * 60 * 1_000;

fn intervals() -> LifecycleIntervals {
    LifecycleIntervals {
        delete_grace: Duration::from_millis(u64::try_from(GRACE_MS).expect("grace")),
        rotation_interval: Duration::from_secs(30 * 24 * 60 * 60),
        backup_interval: Duration::from_secs(7 * 24 * 60 * 60),
    }
}

struct Harness {
    registry: Arc<MemoryRegistry>,
    jobs: Arc<MemoryJobs>,
    engine: Arc<MockEngine>,
    notifier: Arc<MockNotifier>,
    backup: Arc<MockBackup>,
    handlers: JobHandlers,
}

fn harness(projects: &[tidepool_core::TenantProject]) -> Harness {
    let registry = MemoryRegistry::with_projects(projects);
    let jobs = MemoryJobs::shared();
    let engine = MockEngine::shared();
    let notifier = MockNotifier::shared();
    let backup = MockBackup::shared();
    let handlers = JobHandlers::new(
        registry.clone(),
        jobs.clone(),
        engine.clone(),
        Arc::new(test_vault()),
        notifier.clone(),
        backup.clone(),
        Arc::new(NullTelemetry),
        intervals(),
    );
    Harness {
        registry,
        jobs,
        engine,
        notifier,
        backup,
        handlers,
    }
}

fn ts(millis: i64) -> Timestamp {
    Timestamp::from_unix_millis(millis)
}

#[tokio::test]
async fn idle_scan_enqueues_one_batched_pause_job() {
    let h = harness(&[project_fixture("p1", &[])]);
    *h.engine.idle_reports.lock().expect("lock") = vec![
        IdleDatabase {
            database: DatabaseName::new("acme_db"),
            owner_role: RoleName::new("owner1_acme"),
            status: UsageStatus::Idle,
        },
        IdleDatabase {
            database: DatabaseName::new("acme_extra_db"),
            owner_role: RoleName::new("owner1_acme"),
            status: UsageStatus::NeverUsed,
        },
    ];
    let scan = IdleScan::new(
        h.engine.clone(),
        h.registry.clone(),
        h.jobs.clone(),
        Duration::from_secs(30 * 24 * 60 * 60),
        Duration::from_secs(60),
        Arc::new(NullTelemetry),
    );
    scan.run_once(ts(1_000)).await.expect("scan");

    let pending = h.jobs.pending(JobQueue::Lifecycle);
    assert_eq!(pending.len(), 1, "one batched job per project");
    assert_eq!(pending[0].payload.kind(), JobKind::PauseDbConnection);
    let project = h.registry.project(&ProjectId::new("p1")).expect("project");
    assert!(project.action_in_progress, "scan must set the overlap guard");

    // A second scan with the same reports must not double-schedule while
    // the action is in flight.
    scan.run_once(ts(2_000)).await.expect("scan");
    assert_eq!(h.jobs.pending(JobQueue::Lifecycle).len(), 1);
}

#[tokio::test]
async fn pause_revokes_merges_notifies_and_schedules_delete() {
    let h = harness(&[project_fixture("p1", &[])]);
    let payload = JobPayload::PauseDbConnection {
        project_id: ProjectId::new("p1"),
        newly_inactive: vec![DatabaseName::new("acme_db")],
        previously_inactive: vec![],
    };
    h.handlers.handle(&payload, ts(10_000)).await.expect("pause");

    let project = h.registry.project(&ProjectId::new("p1")).expect("project");
    assert!(project.is_inactive(&DatabaseName::new("acme_db")));
    assert!(!project.action_in_progress, "guard cleared by the handler");

    let ops = h.engine.recorded();
    assert!(
        ops.contains(&EngineOp::Revoke(vec!["acme_db".to_string()], "owner1_acme".to_string())),
        "public access must be revoked: {ops:?}"
    );

    let delete_jobs = h.jobs.pending(JobQueue::Lifecycle);
    assert_eq!(delete_jobs.len(), 1);
    assert_eq!(delete_jobs[0].payload.kind(), JobKind::DeleteDatabase);
    assert_eq!(delete_jobs[0].not_before, ts(10_000 + GRACE_MS));

    let delivered = h.notifier.delivered();
    assert_eq!(delivered.len(), 1);
    assert_eq!(delivered[0].kind, NotificationKind::DatabasePaused);
}

#[tokio::test]
async fn pause_handler_is_idempotent_under_redelivery() {
    let h = harness(&[project_fixture("p1", &[])]);
    let payload = JobPayload::PauseDbConnection {
        project_id: ProjectId::new("p1"),
        newly_inactive: vec![DatabaseName::new("acme_db")],
        previously_inactive: vec![],
    };
    h.handlers.handle(&payload, ts(10_000)).await.expect("pause");
    let once = h.registry.project(&ProjectId::new("p1")).expect("project").inactive_databases;
    h.handlers.handle(&payload, ts(11_000)).await.expect("pause replay");
    let twice = h.registry.project(&ProjectId::new("p1")).expect("project").inactive_databases;
    assert_eq!(once, twice, "replay must leave the inactive set set-equal");
}

#[tokio::test]
async fn delete_drops_paused_databases_and_clears_state() {
    let h = harness(&[project_fixture("p1", &["acme_db"])]);
    let payload = JobPayload::DeleteDatabase {
        project_id: ProjectId::new("p1"),
    };
    h.handlers.handle(&payload, ts(GRACE_MS + 10_000)).await.expect("delete");

    let project = h.registry.project(&ProjectId::new("p1")).expect("project");
    assert!(project.inactive_databases.is_empty());
    let ops = h.engine.recorded();
    assert!(ops.contains(&EngineOp::Terminate(vec!["acme_db".to_string()])));
    assert!(ops.contains(&EngineOp::Drop(vec!["acme_db".to_string()])));
    assert_eq!(h.notifier.delivered()[0].kind, NotificationKind::DatabaseDeleted);
}

#[tokio::test]
async fn resume_during_grace_window_makes_delete_a_no_op() {
    let h = harness(&[project_fixture("p1", &["acme_db"])]);

    // Tenant resumes before the grace period elapses.
    let ops_surface = TenantOps::new(
        h.registry.clone(),
        h.engine.clone(),
        Arc::new(test_vault()),
        Arc::new(DirtyFlag::new()),
    );
    let resumed = ops_surface
        .resume_databases(&ProjectId::new("p1"), &OwnerId::new("owner-1"))
        .await
        .expect("resume");
    assert_eq!(resumed, vec![DatabaseName::new("acme_db")]);

    // The delete job fires later and must observe the empty set.
    let payload = JobPayload::DeleteDatabase {
        project_id: ProjectId::new("p1"),
    };
    h.handlers.handle(&payload, ts(GRACE_MS + 10_000)).await.expect("delete");

    let ops = h.engine.recorded();
    assert!(
        ops.iter().all(|op| !matches!(op, EngineOp::Drop(_) | EngineOp::Terminate(_))),
        "no engine writes on a resumed project: {ops:?}"
    );
    assert!(ops.contains(&EngineOp::Grant(
        vec!["acme_db".to_string()],
        "owner1_acme".to_string()
    )));
}

#[tokio::test]
async fn delete_with_empty_inactive_set_performs_no_engine_writes() {
    let h = harness(&[project_fixture("p1", &[])]);
    let payload = JobPayload::DeleteDatabase {
        project_id: ProjectId::new("p1"),
    };
    h.handlers.handle(&payload, ts(1_000)).await.expect("delete");
    assert!(h.engine.recorded().is_empty());
    assert!(h.notifier.delivered().is_empty());
}

#[tokio::test]
async fn rotate_generates_fresh_password_and_reschedules() {
    let h = harness(&[project_fixture("p1", &[])]);
    let old_envelope =
        h.registry.project(&ProjectId::new("p1")).expect("project").binding.password_envelope;

    let payload = JobPayload::RotatePassword {
        project_id: ProjectId::new("p1"),
    };
    h.handlers.handle(&payload, ts(1_000)).await.expect("rotate");

    let project = h.registry.project(&ProjectId::new("p1")).expect("project");
    assert_ne!(project.binding.password_envelope, old_envelope);

    // The stored envelope opens to the password the engine received.
    let vault = test_vault();
    let stored = vault.decrypt(&project.binding.password_envelope).expect("decrypt");
    let ops = h.engine.recorded();
    let altered = ops.iter().find_map(|op| match op {
        EngineOp::AlterPassword(role, password) => Some((role.clone(), password.clone())),
        _ => None,
    });
    let (role, password) = altered.expect("alter recorded");
    assert_eq!(role, "owner1_acme");
    assert_eq!(password, stored);
    assert_ne!(password, "initial-password", "never reuse the old plaintext");

    let maintenance = h.jobs.pending(JobQueue::Maintenance);
    assert_eq!(maintenance.len(), 1);
    assert_eq!(maintenance[0].payload.kind(), JobKind::RotatePassword);
    assert_eq!(h.notifier.delivered()[0].kind, NotificationKind::PasswordRotated);
}

#[tokio::test]
async fn rotate_failure_leaves_envelope_untouched() {
    let h = harness(&[project_fixture("p1", &[])]);
    let old_envelope =
        h.registry.project(&ProjectId::new("p1")).expect("project").binding.password_envelope;
    h.engine.set_failing(true);

    let payload = JobPayload::RotatePassword {
        project_id: ProjectId::new("p1"),
    };
    assert!(h.handlers.handle(&payload, ts(1_000)).await.is_err());

    let project = h.registry.project(&ProjectId::new("p1")).expect("project");
    assert_eq!(
        project.binding.password_envelope, old_envelope,
        "previous envelope stays valid when the engine alter fails"
    );
    assert!(h.jobs.pending(JobQueue::Maintenance).is_empty(), "no reschedule on failure");
}

#[tokio::test]
async fn backup_runs_when_active_and_skips_when_paused() {
    let h = harness(&[project_fixture("p1", &[])]);
    let payload = JobPayload::DatabaseBackup {
        project_id: ProjectId::new("p1"),
        database_name: DatabaseName::new("acme_db"),
    };
    h.handlers.handle(&payload, ts(1_000)).await.expect("backup");
    assert_eq!(h.backup.recorded(), vec!["acme_db".to_string()]);
    assert_eq!(h.jobs.pending(JobQueue::Maintenance).len(), 1, "next backup scheduled");

    // Pause the database; the next run skips the dump but keeps the chain.
    let paused = harness(&[project_fixture("p1", &["acme_db"])]);
    let payload = JobPayload::DatabaseBackup {
        project_id: ProjectId::new("p1"),
        database_name: DatabaseName::new("acme_db"),
    };
    paused.handlers.handle(&payload, ts(1_000)).await.expect("backup");
    assert!(paused.backup.recorded().is_empty());
    assert_eq!(paused.jobs.pending(JobQueue::Maintenance).len(), 1);
}
