// crates/tidepool-orchestrator/src/lib.rs
// ============================================================================
// Module: Tidepool Orchestrator
// Description: Lifecycle runtime: scheduler, workers, handlers, and scans.
// Purpose: Drive tenant database lifecycle transitions durably.
// Dependencies: async-trait, serde, serde_json, thiserror, tidepool-backup,
// tidepool-core, tidepool-pg, tidepool-querygen, tidepool-vault, tokio
// ============================================================================

//! ## Overview
//! The orchestrator owns both scheduling mechanisms as one component:
//! periodic tasks (idle scan, access-control reconciliation) and one-shot
//! delayed jobs drained by a worker per queue from the persistent job
//! store. Every job handler re-fetches authoritative registry state at
//! the start of execution — payload fields are hints, not truth — which
//! is what makes pause/delete idempotent and lets a tenant resume cancel
//! a pending delete without an explicit cancellation primitive.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod clock;
pub mod dirty;
pub mod handlers;
pub mod ops;
pub mod scans;
pub mod scheduler;
pub mod telemetry;
pub mod worker;

// ============================================================================
// SECTION: Re-exports
// ============================================================================

pub use clock::wall_clock_now;
pub use dirty::DirtyFlag;
pub use handlers::HandlerError;
pub use handlers::JobHandlers;
pub use handlers::LifecycleIntervals;
pub use ops::TenantOpError;
pub use ops::TenantOps;
pub use scans::IdleScan;
pub use scans::ReconcileScan;
pub use scheduler::PeriodicTask;
pub use scheduler::Scheduler;
pub use scheduler::SchedulerHandle;
pub use telemetry::NullTelemetry;
pub use telemetry::OrchestratorEvent;
pub use telemetry::StderrTelemetry;
pub use telemetry::TelemetrySink;
pub use worker::QueueWorker;
