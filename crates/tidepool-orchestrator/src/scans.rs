// crates/tidepool-orchestrator/src/scans.rs
// ============================================================================
// Module: Periodic Scans
// Description: Idle-detection scan and access-control reconciliation.
// Purpose: Turn telemetry and allow-list state into jobs and engine config.
// Dependencies: async-trait, tidepool-core, tidepool-pg, crate::{dirty,
// scheduler, telemetry}
// ============================================================================

//! ## Overview
//! The idle scan asks the engine for pause candidates, batches them into
//! at most one pause job per project, flags each project's action guard,
//! and enqueues the jobs. The reconciliation scan is gated by the dirty
//! flag: when set, it rebuilds the full host-based authentication file
//! from the registry, reloads the engine configuration, and only then
//! marks pending rules active. Any failure re-marks the flag so the next
//! interval retries the whole idempotent pass.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tidepool_core::EngineAdmin;
use tidepool_core::JobStore;
use tidepool_core::RegistryStore;
use tidepool_core::RoleName;
use tidepool_core::Timestamp;
use tidepool_core::plan_pause_batches;
use tidepool_pg::HbaFile;
use tidepool_pg::HbaSettings;
use tidepool_pg::render_ruleset;

use crate::dirty::DirtyFlag;
use crate::scheduler::PeriodicTask;
use crate::telemetry::OrchestratorEvent;
use crate::telemetry::TelemetrySink;

// ============================================================================
// SECTION: Idle Scan
// ============================================================================

/// Periodic idle-detection scan.
pub struct IdleScan {
    /// Engine telemetry interface.
    engine: Arc<dyn EngineAdmin>,
    /// Tenant registry.
    registry: Arc<dyn RegistryStore>,
    /// Delayed job store.
    jobs: Arc<dyn JobStore>,
    /// Idle threshold from configuration.
    idle_threshold: Duration,
    /// Scan cadence.
    interval: Duration,
    /// Telemetry sink.
    telemetry: Arc<dyn TelemetrySink>,
}

impl std::fmt::Debug for IdleScan {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IdleScan").field("idle_threshold", &self.idle_threshold).finish_non_exhaustive()
    }
}

impl IdleScan {
    /// Creates the scan.
    #[must_use]
    pub fn new(
        engine: Arc<dyn EngineAdmin>,
        registry: Arc<dyn RegistryStore>,
        jobs: Arc<dyn JobStore>,
        idle_threshold: Duration,
        interval: Duration,
        telemetry: Arc<dyn TelemetrySink>,
    ) -> Self {
        Self {
            engine,
            registry,
            jobs,
            idle_threshold,
            interval,
            telemetry,
        }
    }
}

#[async_trait]
impl PeriodicTask for IdleScan {
    fn name(&self) -> &'static str {
        "idle_scan"
    }

    fn interval(&self) -> Duration {
        self.interval
    }

    async fn run_once(&self, now: Timestamp) -> Result<(), String> {
        let reports = self
            .engine
            .find_idle(self.idle_threshold, now)
            .await
            .map_err(|err| err.to_string())?;

        let mut roles: Vec<RoleName> = reports.iter().map(|r| r.owner_role.clone()).collect();
        roles.sort();
        roles.dedup();
        let projects = self.registry.projects_by_roles(&roles).map_err(|err| err.to_string())?;

        let plans = plan_pause_batches(&reports, &projects);
        let mut enqueued = 0usize;
        for plan in plans {
            let Some(project) = projects.iter().find(|p| p.id == plan.project_id) else {
                continue;
            };
            // Guard the project before the job lands so the next scan
            // cannot double-schedule while the pause is in flight.
            self.registry
                .update_inactive_databases(&plan.project_id, &project.inactive_databases, true)
                .map_err(|err| err.to_string())?;
            self.jobs
                .enqueue(&plan.into_payload(), now, now)
                .map_err(|err| err.to_string())?;
            enqueued += 1;
        }

        self.telemetry.record(&OrchestratorEvent::IdleScanCompleted {
            candidates: reports.len(),
            jobs_enqueued: enqueued,
        });
        Ok(())
    }
}

// ============================================================================
// SECTION: Reconciliation Scan
// ============================================================================

/// Periodic access-control reconciliation, gated by the dirty flag.
pub struct ReconcileScan {
    /// Tenant registry.
    registry: Arc<dyn RegistryStore>,
    /// Engine interface for configuration reload.
    engine: Arc<dyn EngineAdmin>,
    /// Rule file handle.
    hba_file: HbaFile,
    /// Fixed rendering inputs.
    settings: HbaSettings,
    /// Reconciliation trigger.
    dirty: Arc<DirtyFlag>,
    /// Scan cadence.
    interval: Duration,
    /// Telemetry sink.
    telemetry: Arc<dyn TelemetrySink>,
}

impl std::fmt::Debug for ReconcileScan {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReconcileScan").field("hba_file", &self.hba_file).finish_non_exhaustive()
    }
}

impl ReconcileScan {
    /// Creates the scan.
    #[must_use]
    pub fn new(
        registry: Arc<dyn RegistryStore>,
        engine: Arc<dyn EngineAdmin>,
        hba_file: HbaFile,
        settings: HbaSettings,
        dirty: Arc<DirtyFlag>,
        interval: Duration,
        telemetry: Arc<dyn TelemetrySink>,
    ) -> Self {
        Self {
            registry,
            engine,
            hba_file,
            settings,
            dirty,
            interval,
            telemetry,
        }
    }

    /// Runs the full rebuild-write-reload-activate sequence.
    async fn reconcile(&self) -> Result<(), String> {
        let bindings = self.registry.rule_bindings().map_err(|err| err.to_string())?;
        let ruleset = render_ruleset(&bindings, &self.settings);
        self.hba_file.replace(&ruleset).map_err(|err| err.to_string())?;
        self.engine.reload_configuration().await.map_err(|err| err.to_string())?;
        let activated = self.registry.mark_rules_active().map_err(|err| err.to_string())?;
        self.telemetry.record(&OrchestratorEvent::ReconcileCompleted {
            rules: bindings.len(),
            activated,
        });
        Ok(())
    }
}

#[async_trait]
impl PeriodicTask for ReconcileScan {
    fn name(&self) -> &'static str {
        "access_control_reconcile"
    }

    fn interval(&self) -> Duration {
        self.interval
    }

    async fn run_once(&self, _now: Timestamp) -> Result<(), String> {
        if !self.dirty.take() {
            return Ok(());
        }
        if let Err(err) = self.reconcile().await {
            // Leave the flag set so the next interval retries the pass.
            self.dirty.mark();
            return Err(err);
        }
        Ok(())
    }
}
