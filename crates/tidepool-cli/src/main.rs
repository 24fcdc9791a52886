// crates/tidepool-cli/src/main.rs
// ============================================================================
// Module: Tidepool CLI Entry Point
// Description: Command dispatcher for the lifecycle orchestrator.
// Purpose: Serve the runtime, validate configuration, provision tenants.
// Dependencies: clap, serde_json, tidepool crates, tokio
// ============================================================================

//! ## Overview
//! The CLI wires configuration into the concrete backends (SQLite store,
//! `PostgreSQL` engine, S3 archive storage, vault) and runs the
//! orchestrator until interrupted. `config validate` checks a file
//! without touching any backend; `provision` stands up one tenant
//! instance and prints the one-time credentials.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::io::Write;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use clap::Subcommand;
use tidepool_backup::BackupManager;
use tidepool_backup::S3ObjectStore;
use tidepool_backup::S3ObjectStoreConfig;
use tidepool_config::TidepoolConfig;
use tidepool_core::CidrRule;
use tidepool_core::EngineAdmin;
use tidepool_core::JobQueue;
use tidepool_core::JobStore;
use tidepool_core::Notifier;
use tidepool_core::ObjectStore;
use tidepool_core::OwnerId;
use tidepool_core::RegistryStore;
use tidepool_core::RetryPolicy;
use tidepool_notify::CompositeNotifier;
use tidepool_orchestrator::DirtyFlag;
use tidepool_orchestrator::IdleScan;
use tidepool_orchestrator::JobHandlers;
use tidepool_orchestrator::LifecycleIntervals;
use tidepool_orchestrator::QueueWorker;
use tidepool_orchestrator::ReconcileScan;
use tidepool_orchestrator::Scheduler;
use tidepool_orchestrator::StderrTelemetry;
use tidepool_orchestrator::TelemetrySink;
use tidepool_orchestrator::wall_clock_now;
use tidepool_pg::HbaFile;
use tidepool_pg::HbaSettings;
use tidepool_pg::PgEngine;
use tidepool_pg::PgEngineConfig;
use tidepool_pg::Provisioner;
use tidepool_pg::provisioner::ProvisionSchedule;
use tidepool_store_sqlite::SqliteStore;
use tidepool_store_sqlite::SqliteStoreConfig;
use tidepool_vault::CredentialVault;

// ============================================================================
// SECTION: CLI Definition
// ============================================================================

/// Tidepool command-line interface.
#[derive(Parser, Debug)]
#[command(name = "tidepool", version, about = "Multi-tenant PostgreSQL lifecycle orchestrator")]
struct Cli {
    /// Selected subcommand to execute.
    #[command(subcommand)]
    command: Commands,
}

/// Supported CLI subcommands.
#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the orchestrator until interrupted.
    Serve(ServeCommand),
    /// Configuration utilities.
    Config {
        /// Selected config subcommand.
        #[command(subcommand)]
        command: ConfigCommand,
    },
    /// Provision a tenant instance and print its one-time credentials.
    Provision(ProvisionCommand),
}

/// Arguments for `serve`.
#[derive(clap::Args, Debug)]
struct ServeCommand {
    /// Path to the configuration file.
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,
}

/// Config subcommands.
#[derive(Subcommand, Debug)]
enum ConfigCommand {
    /// Load and validate a configuration file.
    Validate {
        /// Path to the configuration file.
        #[arg(long, value_name = "PATH")]
        config: Option<PathBuf>,
    },
}

/// Arguments for `provision`.
#[derive(clap::Args, Debug)]
struct ProvisionCommand {
    /// Path to the configuration file.
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,
    /// Owning platform-user identifier.
    #[arg(long)]
    owner: String,
    /// Project title.
    #[arg(long)]
    title: String,
    /// Project description.
    #[arg(long, default_value = "")]
    description: String,
}

// ============================================================================
// SECTION: Error Plumbing
// ============================================================================

/// CLI failure with a printable message.
#[derive(Debug)]
struct CliError {
    /// Human-readable error message.
    message: String,
}

impl CliError {
    /// Wraps any displayable error.
    fn from_display(error: impl std::fmt::Display) -> Self {
        Self {
            message: error.to_string(),
        }
    }
}

/// CLI result alias.
type CliResult<T> = Result<T, CliError>;

/// Writes one line to stdout.
fn write_stdout_line(message: &str) -> std::io::Result<()> {
    let mut stdout = std::io::stdout();
    writeln!(&mut stdout, "{message}")
}

/// Writes one line to stderr.
fn write_stderr_line(message: &str) -> std::io::Result<()> {
    let mut stderr = std::io::stderr();
    writeln!(&mut stderr, "{message}")
}

// ============================================================================
// SECTION: Entry Point
// ============================================================================

fn main() -> ExitCode {
    let cli = Cli::parse();
    let runtime = match tokio::runtime::Builder::new_multi_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(err) => {
            let _ = write_stderr_line(&format!("tidepool: runtime init failed: {err}"));
            return ExitCode::FAILURE;
        }
    };
    let outcome = runtime.block_on(async {
        match cli.command {
            Commands::Serve(command) => serve(command).await,
            Commands::Config {
                command: ConfigCommand::Validate {
                    config,
                },
            } => validate_config(config),
            Commands::Provision(command) => provision(command).await,
        }
    });
    match outcome {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            let _ = write_stderr_line(&format!("tidepool: {}", err.message));
            ExitCode::FAILURE
        }
    }
}

// ============================================================================
// SECTION: Commands
// ============================================================================

/// Validates a configuration file.
fn validate_config(path: Option<PathBuf>) -> CliResult<()> {
    TidepoolConfig::load(path.as_deref()).map_err(CliError::from_display)?;
    write_stdout_line("configuration ok").map_err(CliError::from_display)
}

/// Shared backend wiring for serve and provision.
struct Backends {
    /// Loaded configuration.
    config: TidepoolConfig,
    /// Credential vault.
    vault: Arc<CredentialVault>,
    /// Durable registry and queue store.
    store: Arc<SqliteStore>,
    /// Engine administrative interface.
    engine: Arc<dyn EngineAdmin>,
}

/// Loads configuration and connects the store, vault, and engine.
async fn backends(path: Option<PathBuf>) -> CliResult<Backends> {
    let config = TidepoolConfig::load(path.as_deref()).map_err(CliError::from_display)?;
    let key = config.vault_key().map_err(CliError::from_display)?;
    let vault = Arc::new(CredentialVault::new(&key).map_err(CliError::from_display)?);
    let store = Arc::new(
        SqliteStore::open(&SqliteStoreConfig {
            path: PathBuf::from(&config.registry.path),
            busy_timeout_ms: config.registry.busy_timeout_ms,
        })
        .map_err(CliError::from_display)?,
    );
    let engine: Arc<dyn EngineAdmin> = Arc::new(
        PgEngine::connect(PgEngineConfig {
            host: config.database.host.clone(),
            port: config.database.port,
            admin_user: config.database.admin_user.clone(),
            admin_password: config.database.admin_password.clone(),
            admin_database: config.database.admin_database.clone(),
        })
        .await
        .map_err(CliError::from_display)?,
    );
    Ok(Backends {
        config,
        vault,
        store,
        engine,
    })
}

/// Connects archive storage.
async fn archive_store(config: &TidepoolConfig) -> CliResult<Arc<dyn ObjectStore>> {
    let storage = S3ObjectStore::new(S3ObjectStoreConfig {
        bucket: config.storage.bucket.clone(),
        region: config.storage.region.clone(),
        endpoint: config.storage.endpoint.clone(),
        force_path_style: config.storage.force_path_style,
    })
    .await
    .map_err(CliError::from_display)?;
    Ok(Arc::new(storage))
}

/// Runs the orchestrator until interrupted.
async fn serve(command: ServeCommand) -> CliResult<()> {
    let backends = backends(command.config).await?;
    let config = &backends.config;
    let telemetry: Arc<dyn TelemetrySink> = Arc::new(StderrTelemetry);
    let registry: Arc<dyn RegistryStore> = backends.store.clone();
    let jobs: Arc<dyn JobStore> = backends.store.clone();
    let notifier: Arc<dyn Notifier> = Arc::new(CompositeNotifier::builder().build());

    let storage = archive_store(config).await?;
    let backup = Arc::new(BackupManager::new(
        Arc::clone(&registry),
        storage,
        Arc::clone(&backends.vault),
        config.storage.prefix.clone(),
    ));

    let handlers = Arc::new(JobHandlers::new(
        Arc::clone(&registry),
        Arc::clone(&jobs),
        Arc::clone(&backends.engine),
        Arc::clone(&backends.vault),
        notifier,
        backup,
        Arc::clone(&telemetry),
        LifecycleIntervals {
            delete_grace: config.delete_grace(),
            rotation_interval: config.rotation_interval(),
            backup_interval: config.backup_interval(),
        },
    ));

    let policy = RetryPolicy {
        max_attempts: config.queue.max_attempts,
        base_delay: config.retry_base_delay(),
    };
    let dirty = Arc::new(DirtyFlag::new());
    let platform_cidr = CidrRule::parse(&config.access_control.platform_cidr)
        .map_err(CliError::from_display)?;

    let mut scheduler = Scheduler::new(Arc::clone(&telemetry))
        .periodic(IdleScan::new(
            Arc::clone(&backends.engine),
            Arc::clone(&registry),
            Arc::clone(&jobs),
            config.idle_threshold(),
            config.idle_scan_interval(),
            Arc::clone(&telemetry),
        ))
        .periodic(ReconcileScan::new(
            Arc::clone(&registry),
            Arc::clone(&backends.engine),
            HbaFile::new(&config.database.hba_file_path),
            HbaSettings {
                admin_user: config.database.admin_user.clone(),
                platform_cidr,
                auth_method: config.access_control.auth_method.clone(),
            },
            Arc::clone(&dirty),
            config.reconcile_interval(),
            Arc::clone(&telemetry),
        ));
    for queue in JobQueue::ALL {
        scheduler = scheduler.worker(QueueWorker::new(
            queue,
            Arc::clone(&jobs),
            Arc::clone(&handlers),
            policy,
            config.worker_poll_interval(),
            Arc::clone(&telemetry),
        ));
    }

    let handle = scheduler.start();
    write_stdout_line("tidepool orchestrator running; ctrl-c to stop")
        .map_err(CliError::from_display)?;
    tokio::signal::ctrl_c().await.map_err(CliError::from_display)?;
    handle.stop().await;
    write_stdout_line("tidepool orchestrator stopped").map_err(CliError::from_display)
}

/// Provisions one tenant instance.
async fn provision(command: ProvisionCommand) -> CliResult<()> {
    let backends = backends(command.config).await?;
    let config = &backends.config;
    let registry: Arc<dyn RegistryStore> = backends.store.clone();
    let jobs: Arc<dyn JobStore> = backends.store.clone();
    let provisioner = Provisioner::new(
        Arc::clone(&backends.engine),
        registry,
        jobs,
        Arc::clone(&backends.vault),
        config.database.host.clone(),
        config.database.port,
        ProvisionSchedule {
            rotation_interval: config.rotation_interval(),
            backup_interval: config.backup_interval(),
        },
    );
    let provisioned = provisioner
        .provision(
            &OwnerId::new(command.owner),
            &command.title,
            &command.description,
            wall_clock_now(),
        )
        .await
        .map_err(CliError::from_display)?;

    let summary = serde_json::json!({
        "project_id": provisioned.project.id.as_str(),
        "role": provisioned.project.binding.role_name.as_str(),
        "database": provisioned.project.binding.database_name.as_str(),
        "password": provisioned.password,
    });
    let rendered =
        serde_json::to_string_pretty(&summary).map_err(CliError::from_display)?;
    write_stdout_line(&rendered).map_err(CliError::from_display)
}
