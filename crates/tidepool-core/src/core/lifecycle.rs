// crates/tidepool-core/src/core/lifecycle.rs
// ============================================================================
// Module: Lifecycle State Machine
// Description: Per-database lifecycle states and pause-batch planning.
// Purpose: Decide transitions from usage telemetry without touching I/O.
// Dependencies: crate::core::{identifiers, job, project, usage}, serde
// ============================================================================

//! ## Overview
//! Every (project, database) pair moves through
//! `Active → IdleFlagged → Paused → ScheduledForDeletion → Deleted`.
//! There is no direct `Active → Deleted` edge, and a tenant can resume any
//! pause that has not yet reached `Deleted`. The periodic idle scan turns
//! telemetry reports into at most one pause job per project by batching
//! all newly idle databases together; databases already paused and
//! projects with a lifecycle action in flight are skipped, which is what
//! prevents duplicate job emission when a database goes idle again
//! immediately after a resume.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;

use serde::Deserialize;
use serde::Serialize;

use crate::core::identifiers::DatabaseName;
use crate::core::identifiers::ProjectId;
use crate::core::job::JobPayload;
use crate::core::project::TenantProject;
use crate::core::usage::IdleDatabase;

// ============================================================================
// SECTION: States
// ============================================================================

/// Lifecycle state for one (project, database) pair.
///
/// # Invariants
/// - Variants are stable for serialization and reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleState {
    /// Recent activity within the idle threshold.
    Active,
    /// Flagged by the idle scan; pause job enqueued.
    IdleFlagged,
    /// Public access revoked, connections terminated.
    Paused,
    /// Delete job scheduled after the grace period.
    ScheduledForDeletion,
    /// Database dropped; registry row retained for audit.
    Deleted,
}

impl LifecycleState {
    /// Returns whether a transition to `next` is permitted.
    ///
    /// Pause is reversible from any state short of `Deleted`; deletion is
    /// only reachable through the paused path, never directly from
    /// `Active`.
    #[must_use]
    pub const fn can_transition(self, next: Self) -> bool {
        match (self, next) {
            (Self::Active, Self::IdleFlagged)
            | (Self::IdleFlagged, Self::Paused)
            | (Self::Paused, Self::ScheduledForDeletion)
            | (Self::ScheduledForDeletion, Self::Deleted)
            // Tenant resume from any pre-delete state.
            | (Self::IdleFlagged | Self::Paused | Self::ScheduledForDeletion, Self::Active) => {
                true
            }
            _ => false,
        }
    }

    /// Returns whether a tenant resume is still possible.
    #[must_use]
    pub const fn is_resumable(self) -> bool {
        matches!(self, Self::IdleFlagged | Self::Paused | Self::ScheduledForDeletion)
    }
}

// ============================================================================
// SECTION: Pause Planning
// ============================================================================

/// One planned pause job covering every newly idle database in a project.
///
/// # Invariants
/// - `newly_inactive` is non-empty and disjoint from `previously_inactive`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PausePlan {
    /// Target project.
    pub project_id: ProjectId,
    /// Databases the triggering scan found idle.
    pub newly_inactive: Vec<DatabaseName>,
    /// Databases already paused when the scan ran.
    pub previously_inactive: Vec<DatabaseName>,
}

impl PausePlan {
    /// Converts the plan into a queue payload.
    #[must_use]
    pub fn into_payload(self) -> JobPayload {
        JobPayload::PauseDbConnection {
            project_id: self.project_id,
            newly_inactive: self.newly_inactive,
            previously_inactive: self.previously_inactive,
        }
    }
}

/// Groups idle-scan reports into at most one pause plan per project.
///
/// Reports whose owner role matches no registered project are ignored (the
/// engine may own databases Tidepool never provisioned). Databases already
/// in a project's inactive set are skipped, as are projects with a
/// lifecycle action in progress.
#[must_use]
pub fn plan_pause_batches(
    reports: &[IdleDatabase],
    projects: &[TenantProject],
) -> Vec<PausePlan> {
    let by_role: BTreeMap<&str, &TenantProject> = projects
        .iter()
        .map(|project| (project.binding.role_name.as_str(), project))
        .collect();

    let mut plans: BTreeMap<&ProjectId, PausePlan> = BTreeMap::new();
    for report in reports {
        let Some(project) = by_role.get(report.owner_role.as_str()) else {
            continue;
        };
        if project.action_in_progress || project.is_inactive(&report.database) {
            continue;
        }
        let plan = plans.entry(&project.id).or_insert_with(|| PausePlan {
            project_id: project.id.clone(),
            newly_inactive: Vec::new(),
            previously_inactive: project.inactive_databases.iter().cloned().collect(),
        });
        if !plan.newly_inactive.contains(&report.database) {
            plan.newly_inactive.push(report.database.clone());
        }
    }
    plans.into_values().collect()
}
