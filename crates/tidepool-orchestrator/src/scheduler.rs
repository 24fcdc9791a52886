// crates/tidepool-orchestrator/src/scheduler.rs
// ============================================================================
// Module: Scheduler
// Description: One component owning periodic tasks and queue workers.
// Purpose: Run every-T scans and once-at-T jobs under a single shutdown.
// Dependencies: async-trait, tidepool-core, tokio, crate::{clock, telemetry,
// worker}
// ============================================================================

//! ## Overview
//! The scheduler unifies the two scheduling mechanisms: "run every T"
//! periodic tasks (idle scan, reconciliation) and "run once at T+delay"
//! jobs, which live in the persistent job store and are drained by the
//! registered queue workers. Everything spawns under one shutdown signal;
//! stopping the handle stops scans and workers together. A failing
//! periodic task is recorded and runs again at its next interval rather
//! than tearing the runtime down.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tidepool_core::Timestamp;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::clock::wall_clock_now;
use crate::telemetry::OrchestratorEvent;
use crate::telemetry::TelemetrySink;
use crate::worker::QueueWorker;

// ============================================================================
// SECTION: Periodic Tasks
// ============================================================================

/// One "run every T" task.
#[async_trait]
pub trait PeriodicTask: Send + Sync {
    /// Stable task name for telemetry.
    fn name(&self) -> &'static str;

    /// Cadence between runs.
    fn interval(&self) -> Duration;

    /// Runs one pass.
    ///
    /// # Errors
    ///
    /// Returns a message describing the failure; the scheduler records it
    /// and retries at the next interval.
    async fn run_once(&self, now: Timestamp) -> Result<(), String>;
}

// ============================================================================
// SECTION: Scheduler
// ============================================================================

/// Scheduler assembling periodic tasks and queue workers.
pub struct Scheduler {
    /// Registered periodic tasks.
    tasks: Vec<Arc<dyn PeriodicTask>>,
    /// Registered queue workers.
    workers: Vec<QueueWorker>,
    /// Telemetry sink.
    telemetry: Arc<dyn TelemetrySink>,
}

impl std::fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scheduler").field("tasks", &self.tasks.len()).finish_non_exhaustive()
    }
}

impl Scheduler {
    /// Creates an empty scheduler.
    #[must_use]
    pub fn new(telemetry: Arc<dyn TelemetrySink>) -> Self {
        Self {
            tasks: Vec::new(),
            workers: Vec::new(),
            telemetry,
        }
    }

    /// Registers a periodic task.
    #[must_use]
    pub fn periodic(mut self, task: impl PeriodicTask + 'static) -> Self {
        self.tasks.push(Arc::new(task));
        self
    }

    /// Registers a queue worker.
    #[must_use]
    pub fn worker(mut self, worker: QueueWorker) -> Self {
        self.workers.push(worker);
        self
    }

    /// Spawns every task and worker, returning the running handle.
    #[must_use]
    pub fn start(self) -> SchedulerHandle {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let mut handles = Vec::new();

        for task in self.tasks {
            let telemetry = Arc::clone(&self.telemetry);
            let mut shutdown = shutdown_rx.clone();
            handles.push(tokio::spawn(async move {
                let mut ticker = tokio::time::interval(task.interval());
                ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
                loop {
                    tokio::select! {
                        _ = ticker.tick() => {}
                        _ = shutdown.changed() => {}
                    }
                    if *shutdown.borrow() {
                        break;
                    }
                    if let Err(error) = task.run_once(wall_clock_now()).await {
                        telemetry.record(&OrchestratorEvent::PeriodicTaskFailed {
                            task: task.name(),
                            error,
                        });
                    }
                }
            }));
        }

        for worker in self.workers {
            let shutdown = shutdown_rx.clone();
            handles.push(tokio::spawn(worker.run(shutdown)));
        }

        SchedulerHandle {
            shutdown: shutdown_tx,
            handles,
        }
    }
}

// ============================================================================
// SECTION: Handle
// ============================================================================

/// Handle over a running scheduler.
///
/// # Invariants
/// - Dropping the handle without `stop` leaves tasks running detached.
pub struct SchedulerHandle {
    /// Shutdown signal sender.
    shutdown: watch::Sender<bool>,
    /// Spawned task handles.
    handles: Vec<JoinHandle<()>>,
}

impl std::fmt::Debug for SchedulerHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SchedulerHandle").field("tasks", &self.handles.len()).finish_non_exhaustive()
    }
}

impl SchedulerHandle {
    /// Signals shutdown and waits for every task to finish.
    pub async fn stop(self) {
        let _ = self.shutdown.send(true);
        for handle in self.handles {
            let _ = handle.await;
        }
    }
}
