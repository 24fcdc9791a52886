// crates/tidepool-orchestrator/src/telemetry.rs
// ============================================================================
// Module: Orchestrator Telemetry
// Description: Typed runtime events without hard observability deps.
// Purpose: Provide event hooks deployments can route to their aggregator.
// Dependencies: serde, serde_json
// ============================================================================

//! ## Overview
//! This module exposes a thin event interface for job execution, scan
//! outcomes, and reconciliation results. It is intentionally
//! dependency-light so downstream deployments can plug in their own
//! aggregation without redesign; the default sink renders one JSON line
//! per event to stderr. Events must never carry secrets — payload
//! envelopes and passwords stay out of labels.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::io::Write;

use serde::Serialize;

// ============================================================================
// SECTION: Events
// ============================================================================

/// Orchestrator runtime events.
///
/// # Invariants
/// - Variants are stable for downstream aggregation.
/// - No variant carries credential material.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum OrchestratorEvent {
    /// A worker claimed a job.
    JobStarted {
        /// Queue label.
        queue: &'static str,
        /// Job kind label.
        kind: &'static str,
        /// Job identifier.
        job_id: i64,
    },
    /// A job handler finished successfully.
    JobCompleted {
        /// Queue label.
        queue: &'static str,
        /// Job kind label.
        kind: &'static str,
        /// Job identifier.
        job_id: i64,
    },
    /// A job failed and was rescheduled.
    JobRetried {
        /// Queue label.
        queue: &'static str,
        /// Job kind label.
        kind: &'static str,
        /// Job identifier.
        job_id: i64,
        /// Failure message.
        error: String,
        /// Next attempt time (unix millis).
        next_attempt_ms: i64,
    },
    /// A job exhausted its retries and was dead-lettered.
    JobDeadLettered {
        /// Queue label.
        queue: &'static str,
        /// Job kind label.
        kind: &'static str,
        /// Job identifier.
        job_id: i64,
        /// Final failure message.
        error: String,
    },
    /// The job store itself failed; the worker backs off.
    QueueFaulted {
        /// Queue label.
        queue: &'static str,
        /// Store failure message.
        error: String,
    },
    /// An idle scan finished.
    IdleScanCompleted {
        /// Pause candidates reported by telemetry.
        candidates: usize,
        /// Pause jobs enqueued this pass.
        jobs_enqueued: usize,
    },
    /// A reconciliation pass rebuilt and reloaded the ruleset.
    ReconcileCompleted {
        /// Rules rendered into the file.
        rules: usize,
        /// Pending rules flipped active.
        activated: u64,
    },
    /// A periodic task failed; it runs again next interval.
    PeriodicTaskFailed {
        /// Task name.
        task: &'static str,
        /// Failure message.
        error: String,
    },
    /// A fire-and-forget notification failed on every channel.
    NotifyFailed {
        /// Event kind label.
        kind: &'static str,
        /// Delivery failure message.
        error: String,
    },
    /// A delete handler observed an empty inactive set and did nothing.
    DeleteSkipped {
        /// Project identifier.
        project: String,
    },
    /// A backup was skipped because the database is paused.
    BackupSkipped {
        /// Project identifier.
        project: String,
        /// Database name.
        database: String,
    },
}

// ============================================================================
// SECTION: Sinks
// ============================================================================

/// Event sink consumed by the runtime.
pub trait TelemetrySink: Send + Sync {
    /// Records one event.
    fn record(&self, event: &OrchestratorEvent);
}

/// Default sink: one JSON line per event on stderr.
#[derive(Debug, Default, Clone, Copy)]
pub struct StderrTelemetry;

impl TelemetrySink for StderrTelemetry {
    fn record(&self, event: &OrchestratorEvent) {
        if let Ok(line) = serde_json::to_string(event) {
            let mut stderr = std::io::stderr();
            let _ = writeln!(stderr, "{line}");
        }
    }
}

/// Discarding sink for tests.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullTelemetry;

impl TelemetrySink for NullTelemetry {
    fn record(&self, _event: &OrchestratorEvent) {}
}
