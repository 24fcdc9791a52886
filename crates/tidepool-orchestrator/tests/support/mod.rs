// crates/tidepool-orchestrator/tests/support/mod.rs
// ============================================================================
// Module: Orchestrator Test Support
// Description: In-memory collaborator implementations for handler tests.
// Purpose: Exercise lifecycle logic without an engine, store, or network.
// Dependencies: tidepool-backup, tidepool-core
// ============================================================================

//! ## Overview
//! In-memory implementations of the core interfaces, recording every
//! engine operation and notification for assertions.

#![allow(
    clippy::panic,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic_in_result_fn,
    clippy::unwrap_in_result,
    dead_code,
    reason = "Test-only helpers; not every test uses every hook."
)]

use std::collections::BTreeMap;
use std::collections::BTreeSet;
use std::sync::Arc;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use tidepool_backup::BackupError;
use tidepool_backup::BackupRunner;
use tidepool_core::BackupId;
use tidepool_core::BackupRecord;
use tidepool_core::CidrRule;
use tidepool_core::DatabaseBinding;
use tidepool_core::DatabaseName;
use tidepool_core::DatabaseUsage;
use tidepool_core::DeadLetter;
use tidepool_core::EngineAdmin;
use tidepool_core::EngineError;
use tidepool_core::FailureOutcome;
use tidepool_core::IdleDatabase;
use tidepool_core::JobId;
use tidepool_core::JobPayload;
use tidepool_core::JobQueue;
use tidepool_core::JobRecord;
use tidepool_core::JobStore;
use tidepool_core::NotificationEvent;
use tidepool_core::Notifier;
use tidepool_core::NotifyError;
use tidepool_core::OwnerId;
use tidepool_core::ProjectId;
use tidepool_core::ProvisionSpec;
use tidepool_core::QueueError;
use tidepool_core::RegistryError;
use tidepool_core::RegistryStore;
use tidepool_core::RetryPolicy;
use tidepool_core::RoleName;
use tidepool_core::RuleBinding;
use tidepool_core::TenantProject;
use tidepool_core::Timestamp;
use tidepool_core::WhitelistRule;
use tidepool_core::WhitelistRuleId;

// ============================================================================
// SECTION: Fixtures
// ============================================================================

/// Builds a project fixture with the given inactive databases.
pub fn project_fixture(id: &str, inactive: &[&str]) -> TenantProject {
    TenantProject {
        id: ProjectId::new(id),
        owner_id: OwnerId::new("owner-1"),
        title: "Acme".to_string(),
        description: "demo".to_string(),
        binding: DatabaseBinding {
            role_name: RoleName::new("owner1_acme"),
            database_name: DatabaseName::new("acme_db"),
            host: "localhost".to_string(),
            port: 5432,
            password_envelope: sealed_envelope("initial-password"),
            schema_name: None,
        },
        inactive_databases: inactive.iter().map(|name| DatabaseName::new(*name)).collect(),
        action_in_progress: false,
        created_at: Timestamp::from_unix_millis(0),
    }
}

/// Seals a plaintext with the shared test vault key.
pub fn sealed_envelope(plaintext: &str) -> String {
    test_vault().encrypt(plaintext).expect("seal")
}

/// Returns a vault keyed with the shared test key.
pub fn test_vault() -> tidepool_vault::CredentialVault {
    tidepool_vault::CredentialVault::new(&[3u8; 32]).expect("vault")
}

// ============================================================================
// SECTION: Memory Registry
// ============================================================================

/// In-memory registry store.
#[derive(Default)]
pub struct MemoryRegistry {
    /// Projects by id.
    pub projects: Mutex<BTreeMap<String, TenantProject>>,
    /// Allow-list rules.
    pub rules: Mutex<Vec<WhitelistRule>>,
    /// Backup records.
    pub backups: Mutex<Vec<BackupRecord>>,
    /// Next rule id.
    next_rule_id: Mutex<i64>,
}

impl MemoryRegistry {
    /// Creates a registry preloaded with projects.
    pub fn with_projects(projects: &[TenantProject]) -> Arc<Self> {
        let registry = Self::default();
        for project in projects {
            registry
                .projects
                .lock()
                .expect("lock")
                .insert(project.id.as_str().to_string(), project.clone());
        }
        Arc::new(registry)
    }
}

impl RegistryStore for MemoryRegistry {
    fn create_project(&self, project: &TenantProject) -> Result<(), RegistryError> {
        self.projects
            .lock()
            .expect("lock")
            .insert(project.id.as_str().to_string(), project.clone());
        Ok(())
    }

    fn project(&self, id: &ProjectId) -> Result<TenantProject, RegistryError> {
        self.projects
            .lock()
            .expect("lock")
            .get(id.as_str())
            .cloned()
            .ok_or_else(|| RegistryError::NotFound(format!("project {id}")))
    }

    fn project_for_owner(
        &self,
        id: &ProjectId,
        owner: &OwnerId,
    ) -> Result<Option<TenantProject>, RegistryError> {
        Ok(self
            .projects
            .lock()
            .expect("lock")
            .get(id.as_str())
            .filter(|project| &project.owner_id == owner)
            .cloned())
    }

    fn projects_by_owner(&self, owner: &OwnerId) -> Result<Vec<TenantProject>, RegistryError> {
        Ok(self
            .projects
            .lock()
            .expect("lock")
            .values()
            .filter(|project| &project.owner_id == owner)
            .cloned()
            .collect())
    }

    fn projects_by_roles(&self, roles: &[RoleName]) -> Result<Vec<TenantProject>, RegistryError> {
        Ok(self
            .projects
            .lock()
            .expect("lock")
            .values()
            .filter(|project| roles.contains(&project.binding.role_name))
            .cloned()
            .collect())
    }

    fn update_inactive_databases(
        &self,
        id: &ProjectId,
        inactive: &BTreeSet<DatabaseName>,
        action_in_progress: bool,
    ) -> Result<(), RegistryError> {
        let mut projects = self.projects.lock().expect("lock");
        let project = projects
            .get_mut(id.as_str())
            .ok_or_else(|| RegistryError::NotFound(format!("project {id}")))?;
        project.inactive_databases = inactive.clone();
        project.action_in_progress = action_in_progress;
        Ok(())
    }

    fn set_password_envelope(&self, id: &ProjectId, envelope: &str) -> Result<(), RegistryError> {
        let mut projects = self.projects.lock().expect("lock");
        let project = projects
            .get_mut(id.as_str())
            .ok_or_else(|| RegistryError::NotFound(format!("project {id}")))?;
        project.binding.password_envelope = envelope.to_string();
        Ok(())
    }

    fn add_whitelist_rule(
        &self,
        project_id: &ProjectId,
        database_name: &DatabaseName,
        cidr: &CidrRule,
    ) -> Result<WhitelistRule, RegistryError> {
        let mut next = self.next_rule_id.lock().expect("lock");
        *next += 1;
        let rule = WhitelistRule {
            id: WhitelistRuleId::new(*next),
            project_id: project_id.clone(),
            database_name: database_name.clone(),
            cidr: cidr.clone(),
            is_active: false,
        };
        self.rules.lock().expect("lock").push(rule.clone());
        Ok(rule)
    }

    fn whitelist_rules(&self, project_id: &ProjectId) -> Result<Vec<WhitelistRule>, RegistryError> {
        Ok(self
            .rules
            .lock()
            .expect("lock")
            .iter()
            .filter(|rule| &rule.project_id == project_id)
            .cloned()
            .collect())
    }

    fn remove_whitelist_rule(
        &self,
        project_id: &ProjectId,
        rule_id: WhitelistRuleId,
    ) -> Result<(), RegistryError> {
        let mut rules = self.rules.lock().expect("lock");
        let before = rules.len();
        rules.retain(|rule| !(rule.id == rule_id && &rule.project_id == project_id));
        if rules.len() == before {
            return Err(RegistryError::NotFound(format!("whitelist rule {rule_id}")));
        }
        Ok(())
    }

    fn rule_bindings(&self) -> Result<Vec<RuleBinding>, RegistryError> {
        let projects = self.projects.lock().expect("lock");
        Ok(self
            .rules
            .lock()
            .expect("lock")
            .iter()
            .filter_map(|rule| {
                projects.get(rule.project_id.as_str()).map(|project| RuleBinding {
                    rule: rule.clone(),
                    role: project.binding.role_name.clone(),
                })
            })
            .collect())
    }

    fn mark_rules_active(&self) -> Result<u64, RegistryError> {
        let mut rules = self.rules.lock().expect("lock");
        let mut flipped = 0u64;
        for rule in rules.iter_mut() {
            if !rule.is_active {
                rule.is_active = true;
                flipped += 1;
            }
        }
        Ok(flipped)
    }

    fn record_backup(
        &self,
        project_id: &ProjectId,
        database_name: &DatabaseName,
        object_id: &str,
        created_at: Timestamp,
    ) -> Result<BackupRecord, RegistryError> {
        let mut backups = self.backups.lock().expect("lock");
        let record = BackupRecord {
            id: BackupId::new(i64::try_from(backups.len()).unwrap_or(0) + 1),
            project_id: project_id.clone(),
            database_name: database_name.clone(),
            object_id: object_id.to_string(),
            created_at,
        };
        backups.push(record.clone());
        Ok(record)
    }

    fn backups(&self, project_id: &ProjectId) -> Result<Vec<BackupRecord>, RegistryError> {
        Ok(self
            .backups
            .lock()
            .expect("lock")
            .iter()
            .filter(|record| &record.project_id == project_id)
            .cloned()
            .collect())
    }

    fn backup(
        &self,
        project_id: &ProjectId,
        backup_id: BackupId,
    ) -> Result<Option<BackupRecord>, RegistryError> {
        Ok(self
            .backups
            .lock()
            .expect("lock")
            .iter()
            .find(|record| record.id == backup_id && &record.project_id == project_id)
            .cloned())
    }
}

// ============================================================================
// SECTION: Memory Job Store
// ============================================================================

/// In-memory delayed job store.
#[derive(Default)]
pub struct MemoryJobs {
    /// Pending jobs.
    pub jobs: Mutex<Vec<JobRecord>>,
    /// Dead letters.
    pub letters: Mutex<Vec<DeadLetter>>,
    /// Next job id.
    next_id: Mutex<i64>,
}

impl MemoryJobs {
    /// Creates an empty store.
    pub fn shared() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Returns pending jobs on a queue, scheduled order.
    pub fn pending(&self, queue: JobQueue) -> Vec<JobRecord> {
        let mut jobs: Vec<JobRecord> = self
            .jobs
            .lock()
            .expect("lock")
            .iter()
            .filter(|job| job.queue == queue)
            .cloned()
            .collect();
        jobs.sort_by_key(|job| (job.not_before, job.id));
        jobs
    }
}

impl JobStore for MemoryJobs {
    fn enqueue(
        &self,
        payload: &JobPayload,
        not_before: Timestamp,
        now: Timestamp,
    ) -> Result<JobId, QueueError> {
        let mut next = self.next_id.lock().expect("lock");
        *next += 1;
        let id = JobId::new(*next);
        self.jobs.lock().expect("lock").push(JobRecord {
            id,
            queue: payload.kind().queue(),
            payload: payload.clone(),
            not_before,
            attempts: 0,
            created_at: now,
        });
        Ok(id)
    }

    fn claim_due(&self, queue: JobQueue, now: Timestamp) -> Result<Option<JobRecord>, QueueError> {
        let jobs = self.jobs.lock().expect("lock");
        Ok(jobs
            .iter()
            .filter(|job| job.queue == queue && job.not_before <= now)
            .min_by_key(|job| (job.not_before, job.id))
            .cloned())
    }

    fn complete(&self, id: JobId) -> Result<(), QueueError> {
        let mut jobs = self.jobs.lock().expect("lock");
        let before = jobs.len();
        jobs.retain(|job| job.id != id);
        if jobs.len() == before {
            return Err(QueueError::NotFound(id));
        }
        Ok(())
    }

    fn fail(
        &self,
        id: JobId,
        error: &str,
        policy: &RetryPolicy,
        now: Timestamp,
    ) -> Result<FailureOutcome, QueueError> {
        let mut jobs = self.jobs.lock().expect("lock");
        let Some(index) = jobs.iter().position(|job| job.id == id) else {
            return Err(QueueError::NotFound(id));
        };
        let attempts = jobs[index].attempts + 1;
        if policy.is_exhausted(attempts) {
            let job = jobs.remove(index);
            self.letters.lock().expect("lock").push(DeadLetter {
                id: job.id,
                queue: job.queue,
                payload: job.payload,
                attempts,
                failed_at: now,
                last_error: error.to_string(),
            });
            return Ok(FailureOutcome::DeadLettered);
        }
        let next = now.saturating_add(policy.backoff(attempts));
        jobs[index].attempts = attempts;
        jobs[index].not_before = next;
        Ok(FailureOutcome::Retried(next))
    }

    fn dead_letters(&self, queue: JobQueue) -> Result<Vec<DeadLetter>, QueueError> {
        Ok(self
            .letters
            .lock()
            .expect("lock")
            .iter()
            .filter(|letter| letter.queue == queue)
            .cloned()
            .collect())
    }
}

// ============================================================================
// SECTION: Mock Engine
// ============================================================================

/// Recorded engine operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineOp {
    /// Privileges revoked on databases for a role.
    Revoke(Vec<String>, String),
    /// Privileges granted on databases for a role.
    Grant(Vec<String>, String),
    /// Backends terminated on databases.
    Terminate(Vec<String>),
    /// Databases dropped.
    Drop(Vec<String>),
    /// Role password altered.
    AlterPassword(String, String),
    /// Configuration reloaded.
    Reload,
    /// Instance created.
    Create(String, String),
    /// Orphan cleanup executed.
    Cleanup(String, String),
}

/// Recording engine mock.
#[derive(Default)]
pub struct MockEngine {
    /// Operation log.
    pub ops: Mutex<Vec<EngineOp>>,
    /// Idle reports returned by `find_idle`.
    pub idle_reports: Mutex<Vec<IdleDatabase>>,
    /// When true, every mutating call fails transiently.
    pub failing: Mutex<bool>,
}

impl MockEngine {
    /// Creates a shared mock.
    pub fn shared() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Returns the recorded operations.
    pub fn recorded(&self) -> Vec<EngineOp> {
        self.ops.lock().expect("lock").clone()
    }

    /// Sets the failure switch.
    pub fn set_failing(&self, failing: bool) {
        *self.failing.lock().expect("lock") = failing;
    }

    /// Records an op unless the mock is failing.
    fn record(&self, op: EngineOp) -> Result<(), EngineError> {
        if *self.failing.lock().expect("lock") {
            return Err(EngineError::Transient("mock engine unavailable".to_string()));
        }
        self.ops.lock().expect("lock").push(op);
        Ok(())
    }
}

/// Converts database names into plain strings for the op log.
fn names(databases: &[DatabaseName]) -> Vec<String> {
    databases.iter().map(|name| name.as_str().to_string()).collect()
}

#[async_trait]
impl EngineAdmin for MockEngine {
    async fn create_instance(&self, spec: &ProvisionSpec) -> Result<(), EngineError> {
        self.record(EngineOp::Create(
            spec.role_name.as_str().to_string(),
            spec.database_name.as_str().to_string(),
        ))
    }

    async fn cleanup_orphans(
        &self,
        role: &RoleName,
        database: &DatabaseName,
    ) -> Result<(), EngineError> {
        self.record(EngineOp::Cleanup(
            role.as_str().to_string(),
            database.as_str().to_string(),
        ))
    }

    async fn list_owned_databases(
        &self,
        _owner_pattern: &str,
    ) -> Result<Vec<DatabaseUsage>, EngineError> {
        Ok(Vec::new())
    }

    async fn find_idle(
        &self,
        _idle_after: Duration,
        _now: Timestamp,
    ) -> Result<Vec<IdleDatabase>, EngineError> {
        Ok(self.idle_reports.lock().expect("lock").clone())
    }

    async fn revoke_access(
        &self,
        databases: &[DatabaseName],
        owner: &RoleName,
    ) -> Result<(), EngineError> {
        self.record(EngineOp::Revoke(names(databases), owner.as_str().to_string()))
    }

    async fn grant_access(
        &self,
        databases: &[DatabaseName],
        owner: &RoleName,
    ) -> Result<(), EngineError> {
        self.record(EngineOp::Grant(names(databases), owner.as_str().to_string()))
    }

    async fn terminate_connections(&self, databases: &[DatabaseName]) -> Result<(), EngineError> {
        self.record(EngineOp::Terminate(names(databases)))
    }

    async fn drop_databases(&self, databases: &[DatabaseName]) -> Result<(), EngineError> {
        self.record(EngineOp::Drop(names(databases)))
    }

    async fn alter_role_password(
        &self,
        role: &RoleName,
        new_password: &str,
    ) -> Result<(), EngineError> {
        self.record(EngineOp::AlterPassword(
            role.as_str().to_string(),
            new_password.to_string(),
        ))
    }

    async fn reload_configuration(&self) -> Result<(), EngineError> {
        self.record(EngineOp::Reload)
    }
}

// ============================================================================
// SECTION: Mock Notifier and Backup Runner
// ============================================================================

/// Recording notifier mock.
#[derive(Default)]
pub struct MockNotifier {
    /// Delivered events.
    pub events: Mutex<Vec<NotificationEvent>>,
}

impl MockNotifier {
    /// Creates a shared mock.
    pub fn shared() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Returns delivered events.
    pub fn delivered(&self) -> Vec<NotificationEvent> {
        self.events.lock().expect("lock").clone()
    }
}

#[async_trait]
impl Notifier for MockNotifier {
    async fn notify(&self, event: &NotificationEvent) -> Result<(), NotifyError> {
        self.events.lock().expect("lock").push(event.clone());
        Ok(())
    }
}

/// Recording backup runner mock.
#[derive(Default)]
pub struct MockBackup {
    /// Databases backed up, in order.
    pub runs: Mutex<Vec<String>>,
}

impl MockBackup {
    /// Creates a shared mock.
    pub fn shared() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Returns recorded runs.
    pub fn recorded(&self) -> Vec<String> {
        self.runs.lock().expect("lock").clone()
    }
}

#[async_trait]
impl BackupRunner for MockBackup {
    async fn run_backup(
        &self,
        project: &TenantProject,
        database: &DatabaseName,
        now: Timestamp,
    ) -> Result<BackupRecord, BackupError> {
        self.runs.lock().expect("lock").push(database.as_str().to_string());
        Ok(BackupRecord {
            id: BackupId::new(1),
            project_id: project.id.clone(),
            database_name: database.clone(),
            object_id: format!("{}/{}.sql.gz", project.id.as_str(), database.as_str()),
            created_at: now,
        })
    }
}
