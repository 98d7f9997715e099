//! CLI binary for archivist.

use archivist::config::LoggingConfig;
use archivist::{
    ArchivistConfig, BackupService, OutboxSink, RecipientId, Scheduler, TaskId, TaskStore,
};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::prelude::*;

/// Archivist: scheduled, split-archive backups.
#[derive(Parser)]
#[command(name = "archivist", version, about)]
struct Cli {
    /// Path to TOML configuration file.
    #[arg(short, long, env = "ARCHIVIST_CONFIG")]
    config: Option<PathBuf>,

    /// Recipient that receives test backups and notices.
    #[arg(long = "as", value_name = "RECIPIENT")]
    requester: Option<String>,

    /// Subcommand to run.
    #[command(subcommand)]
    command: Option<Command>,
}

/// Available commands.
#[derive(Subcommand)]
enum Command {
    /// Run the scheduler until Ctrl+C.
    Run,

    /// List registered backup tasks.
    List,

    /// Register a path to be backed up every HOURS hours.
    Add { path: PathBuf, hours: u32 },

    /// Remove a task by id.
    Remove { id: TaskId },

    /// Send a one-off backup of a path.
    Backup { path: PathBuf },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = load_config(cli.config.as_ref())?;
    let _log_guard = init_tracing(&config.logging);

    let store = Arc::new(TaskStore::new(config.store.path.clone()));
    let outbox = Arc::new(OutboxSink::open(&config.delivery.outbox_dir)?);
    let requester = cli
        .requester
        .map(RecipientId::new)
        .or_else(|| config.delivery.recipients.first().cloned())
        .unwrap_or_else(|| RecipientId::new("local"));

    match cli.command.unwrap_or(Command::Run) {
        Command::Run => run_scheduler(&config, store, outbox).await,
        Command::List => list_tasks(&config, store, outbox).await,
        Command::Add { path, hours } => {
            let service = BackupService::from_config(&config, store, outbox.clone(), outbox);
            let task = service.register_task(&requester, &path, hours).await?;
            println!("Task {} created for {}", task.id, task.path.display());
            Ok(())
        }
        Command::Remove { id } => {
            let service = BackupService::from_config(&config, store, outbox.clone(), outbox);
            if service.delete_task(id).await? {
                println!("Task {id} removed");
            } else {
                println!("No task with id {id}");
            }
            Ok(())
        }
        Command::Backup { path } => {
            let service = BackupService::from_config(&config, store, outbox.clone(), outbox);
            let path = service.test_backup(&requester, &path).await?;
            println!("Backup of {} sent to {requester}", path.display());
            Ok(())
        }
    }
}

fn load_config(explicit: Option<&PathBuf>) -> anyhow::Result<ArchivistConfig> {
    if let Some(path) = explicit {
        return Ok(ArchivistConfig::from_file(path)?);
    }
    let default_path = ArchivistConfig::default_config_path();
    if default_path.is_file() {
        Ok(ArchivistConfig::from_file(&default_path)?)
    } else {
        Ok(ArchivistConfig::default())
    }
}

/// Stderr logging, plus a daily rolling file when a log dir is configured.
/// The returned guard flushes the file writer on drop.
fn init_tracing(logging: &LoggingConfig) -> Option<WorkerGuard> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("archivist=info"));
    let stderr = tracing_subscriber::fmt::layer().with_writer(std::io::stderr);

    match &logging.dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, "archivist.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            tracing_subscriber::registry()
                .with(filter)
                .with(stderr)
                .with(
                    tracing_subscriber::fmt::layer()
                        .with_ansi(false)
                        .with_writer(writer),
                )
                .init();
            Some(guard)
        }
        None => {
            tracing_subscriber::registry().with(filter).with(stderr).init();
            None
        }
    }
}

async fn run_scheduler(
    config: &ArchivistConfig,
    store: Arc<TaskStore>,
    outbox: Arc<OutboxSink>,
) -> anyhow::Result<()> {
    println!("archivist v{}", env!("CARGO_PKG_VERSION"));

    let cancel = CancellationToken::new();
    let cancel_clone = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("received Ctrl+C, shutting down...");
            cancel_clone.cancel();
        }
    });

    Scheduler::from_config(config, store, outbox)
        .run(cancel)
        .await??;
    Ok(())
}

async fn list_tasks(
    config: &ArchivistConfig,
    store: Arc<TaskStore>,
    outbox: Arc<OutboxSink>,
) -> anyhow::Result<()> {
    let service = BackupService::from_config(config, store, outbox.clone(), outbox);
    let tasks = service.list_tasks().await?;
    if tasks.is_empty() {
        println!("No backup tasks");
        return Ok(());
    }
    for task in tasks.values() {
        println!(
            "{:>4}  every {:>3}h  next {}  {}",
            task.id,
            task.interval_hours,
            archivist::store::format_timestamp(task.next_due_at),
            task.path.display()
        );
    }
    Ok(())
}
