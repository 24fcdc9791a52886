// crates/tidepool-core/src/lib.rs
// ============================================================================
// Module: Tidepool Core
// Description: Domain model and interfaces for the tenant database orchestrator.
// Purpose: Define registry records, lifecycle rules, and collaborator contracts.
// Dependencies: async-trait, serde, serde_json, thiserror
// ============================================================================

//! ## Overview
//! Tidepool provisions, monitors, and retires isolated `PostgreSQL`
//! databases for independent tenant projects. This crate holds the parts
//! shared by every backend: strongly typed identifiers, registry records,
//! the lifecycle state machine, usage classification, the delayed-job
//! model, and the interfaces implemented by the engine, store, object
//! storage, and notification collaborators.
//!
//! The core never talks to an engine directly and never reads wall-clock
//! time; hosts supply timestamps so decision logic stays testable.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod core;
pub mod interfaces;

// ============================================================================
// SECTION: Re-exports
// ============================================================================

pub use crate::core::allowlist::AllowlistError;
pub use crate::core::allowlist::CidrRule;
pub use crate::core::allowlist::RuleBinding;
pub use crate::core::allowlist::WhitelistRule;
pub use crate::core::identifiers::BackupId;
pub use crate::core::identifiers::DatabaseName;
pub use crate::core::identifiers::JobId;
pub use crate::core::identifiers::OwnerId;
pub use crate::core::identifiers::ProjectId;
pub use crate::core::identifiers::RoleName;
pub use crate::core::identifiers::WhitelistRuleId;
pub use crate::core::job::DeadLetter;
pub use crate::core::job::JobKind;
pub use crate::core::job::JobPayload;
pub use crate::core::job::JobQueue;
pub use crate::core::job::JobRecord;
pub use crate::core::job::RetryPolicy;
pub use crate::core::lifecycle::LifecycleState;
pub use crate::core::lifecycle::PausePlan;
pub use crate::core::lifecycle::plan_pause_batches;
pub use crate::core::project::BackupRecord;
pub use crate::core::project::DatabaseBinding;
pub use crate::core::project::TenantProject;
pub use crate::core::time::Timestamp;
pub use crate::core::usage::DatabaseUsage;
pub use crate::core::usage::IdleDatabase;
pub use crate::core::usage::UsageStatus;
pub use crate::core::usage::UsageWindow;
pub use crate::interfaces::Channel;
pub use crate::interfaces::EngineAdmin;
pub use crate::interfaces::EngineError;
pub use crate::interfaces::FailureOutcome;
pub use crate::interfaces::JobStore;
pub use crate::interfaces::Notifier;
pub use crate::interfaces::NotificationEvent;
pub use crate::interfaces::NotificationKind;
pub use crate::interfaces::NotifyError;
pub use crate::interfaces::ObjectStore;
pub use crate::interfaces::ProvisionSpec;
pub use crate::interfaces::QueueError;
pub use crate::interfaces::RegistryError;
pub use crate::interfaces::RegistryStore;
pub use crate::interfaces::StorageError;
