// crates/tidepool-orchestrator/src/worker.rs
// ============================================================================
// Module: Queue Worker
// Description: Serial per-queue job execution with retry and dead-letter.
// Purpose: Drain one queue at-least-once without dropping any job.
// Dependencies: tidepool-core, tokio, crate::{clock, handlers, telemetry}
// ============================================================================

//! ## Overview
//! One worker drains one queue serially; queues run concurrently with
//! respect to each other, and handlers must not assume cross-queue
//! ordering. A job is removed only after its handler succeeds; a failure
//! reschedules it with backoff or, once retries are exhausted, moves it
//! to the dead-letter table. Store faults back the worker off for one
//! poll interval instead of spinning.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;
use std::time::Duration;

use tidepool_core::FailureOutcome;
use tidepool_core::JobQueue;
use tidepool_core::JobRecord;
use tidepool_core::JobStore;
use tidepool_core::RetryPolicy;
use tokio::sync::watch;

use crate::clock::wall_clock_now;
use crate::handlers::JobHandlers;
use crate::telemetry::OrchestratorEvent;
use crate::telemetry::TelemetrySink;

// ============================================================================
// SECTION: Worker
// ============================================================================

/// One queue's worker loop.
pub struct QueueWorker {
    /// Queue this worker drains.
    queue: JobQueue,
    /// Durable job store.
    store: Arc<dyn JobStore>,
    /// Handler set.
    handlers: Arc<JobHandlers>,
    /// Retry policy for this queue.
    policy: RetryPolicy,
    /// Sleep between polls when the queue is drained.
    poll_interval: Duration,
    /// Telemetry sink.
    telemetry: Arc<dyn TelemetrySink>,
}

impl std::fmt::Debug for QueueWorker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueueWorker").field("queue", &self.queue).finish_non_exhaustive()
    }
}

impl QueueWorker {
    /// Creates a worker for one queue.
    #[must_use]
    pub fn new(
        queue: JobQueue,
        store: Arc<dyn JobStore>,
        handlers: Arc<JobHandlers>,
        policy: RetryPolicy,
        poll_interval: Duration,
        telemetry: Arc<dyn TelemetrySink>,
    ) -> Self {
        Self {
            queue,
            store,
            handlers,
            policy,
            poll_interval,
            telemetry,
        }
    }

    /// Runs the worker until shutdown is signalled.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        loop {
            if *shutdown.borrow() {
                break;
            }
            let now = wall_clock_now();
            match self.store.claim_due(self.queue, now) {
                Ok(Some(job)) => self.execute(job).await,
                Ok(None) => {
                    tokio::select! {
                        () = tokio::time::sleep(self.poll_interval) => {}
                        _ = shutdown.changed() => {}
                    }
                }
                Err(err) => {
                    self.telemetry.record(&OrchestratorEvent::QueueFaulted {
                        queue: self.queue.as_str(),
                        error: err.to_string(),
                    });
                    tokio::select! {
                        () = tokio::time::sleep(self.poll_interval) => {}
                        _ = shutdown.changed() => {}
                    }
                }
            }
        }
    }

    /// Executes one claimed job and records its outcome.
    async fn execute(&self, job: JobRecord) {
        let queue = self.queue.as_str();
        let kind = job.payload.kind().as_str();
        let job_id = job.id.get();
        self.telemetry.record(&OrchestratorEvent::JobStarted {
            queue,
            kind,
            job_id,
        });

        let now = wall_clock_now();
        match self.handlers.handle(&job.payload, now).await {
            Ok(()) => {
                if self.store.complete(job.id).is_ok() {
                    self.telemetry.record(&OrchestratorEvent::JobCompleted {
                        queue,
                        kind,
                        job_id,
                    });
                }
            }
            Err(err) => {
                let message = err.to_string();
                match self.store.fail(job.id, &message, &self.policy, wall_clock_now()) {
                    Ok(FailureOutcome::Retried(next)) => {
                        self.telemetry.record(&OrchestratorEvent::JobRetried {
                            queue,
                            kind,
                            job_id,
                            error: message,
                            next_attempt_ms: next.as_unix_millis(),
                        });
                    }
                    Ok(FailureOutcome::DeadLettered) => {
                        self.telemetry.record(&OrchestratorEvent::JobDeadLettered {
                            queue,
                            kind,
                            job_id,
                            error: message,
                        });
                    }
                    Err(store_err) => {
                        self.telemetry.record(&OrchestratorEvent::QueueFaulted {
                            queue,
                            error: store_err.to_string(),
                        });
                    }
                }
            }
        }
    }
}
