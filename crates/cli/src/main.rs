//! `flowline` CLI entry-point.
//!
//! Available sub-commands:
//! - `serve`    : start the API server and the resume worker.
//! - `migrate`  : run pending database migrations.
//! - `validate` : validate a workflow JSON file.
//! - `import`   : publish a workflow JSON file to the database.
//! - `run`      : run a workflow JSON file once and print the execution.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use serde_json::{json, Value};
use tracing::info;
use tracing_subscriber::EnvFilter;

use engine::{DbJobStore, ExecutionController, ExecutionStatus, InstructionRegistry, JobStore, Workflow};
use queue::QueueConfig;

#[derive(Parser)]
#[command(name = "flowline", about = "Resumable workflow execution engine", version)]
struct Cli {
    #[command(flatten)]
    db: DbArgs,

    #[command(subcommand)]
    command: Command,
}

#[derive(Args)]
struct DbArgs {
    #[arg(long, env = "DATABASE_URL", default_value = "sqlite://flowline.db", global = true)]
    database_url: String,

    #[arg(long, default_value_t = 5, global = true)]
    max_connections: u32,
}

#[derive(Subcommand)]
enum Command {
    /// Start the REST API server and the resume worker.
    Serve {
        #[arg(long, default_value = "0.0.0.0:8080")]
        bind: SocketAddr,

        /// Capacity of the in-process resume queue.
        #[arg(long, default_value_t = QueueConfig::default().capacity)]
        queue_capacity: usize,
    },
    /// Run pending database migrations.
    Migrate,
    /// Validate a workflow definition JSON file.
    Validate {
        /// Path to the workflow JSON file.
        path: PathBuf,
    },
    /// Publish a workflow definition so it can be executed by id.
    Import {
        path: PathBuf,
    },
    /// Run a workflow definition once and print the resulting execution.
    Run {
        path: PathBuf,

        /// Trigger payload as inline JSON.
        #[arg(long, default_value = "{}")]
        context: String,

        /// Seconds to wait for deferred work of a suspended execution.
        #[arg(long, default_value_t = 30)]
        wait: u64,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();

    match cli.command {
        Command::Serve { bind, queue_capacity } => {
            let controller = connect(&cli.db, queue_capacity).await?;
            info!("Starting API server on {bind}");
            api::serve(bind, api::AppState { controller })
                .await
                .context("API server stopped")?;
        }
        Command::Migrate => {
            info!("Running migrations against {}", cli.db.database_url);
            let pool = db::pool::create_pool(&cli.db.database_url, cli.db.max_connections).await?;
            db::pool::run_migrations(&pool).await?;
            info!("Migrations applied successfully");
        }
        Command::Validate { path } => {
            let workflow = read_workflow(&path)?;
            match engine::validate_dag(&workflow) {
                Ok(order) => {
                    println!("✅ Workflow is valid. Execution order: {order:?}");
                }
                Err(e) => {
                    eprintln!("❌ Validation failed: {e}");
                    std::process::exit(1);
                }
            }
        }
        Command::Import { path } => {
            let workflow = read_workflow(&path)?;
            engine::validate_dag(&workflow)?;
            let controller = connect(&cli.db, QueueConfig::default().capacity).await?;
            controller.store().save_workflow(&workflow).await?;
            println!("Published workflow '{}' as {}", workflow.name, workflow.id);
        }
        Command::Run { path, context, wait } => {
            let workflow = read_workflow(&path)?;
            let context: Value = serde_json::from_str(&context).context("--context is not valid JSON")?;
            let controller = connect(&cli.db, QueueConfig::default().capacity).await?;

            let mut execution = controller.start(&workflow, context).await?;
            let deadline = Instant::now() + Duration::from_secs(wait);
            while execution.status == ExecutionStatus::Suspended && Instant::now() < deadline {
                tokio::time::sleep(Duration::from_millis(100)).await;
                execution = controller.inspect(execution.id).await?.0;
            }

            let (execution, jobs) = controller.inspect(execution.id).await?;
            println!("{}", serde_json::to_string_pretty(&json!({ "execution": execution, "jobs": jobs }))?);
        }
    }

    Ok(())
}

/// Open the database, apply migrations and wire a controller whose resume
/// queue is drained by a background worker.
async fn connect(db_args: &DbArgs, queue_capacity: usize) -> Result<Arc<ExecutionController>> {
    let pool = db::pool::create_pool(&db_args.database_url, db_args.max_connections)
        .await
        .with_context(|| format!("failed to connect to {}", db_args.database_url))?;
    db::pool::run_migrations(&pool).await?;

    let (tx, rx) = queue::channel(&QueueConfig { capacity: queue_capacity });
    let controller = Arc::new(ExecutionController::new(
        Arc::new(DbJobStore::new(pool)),
        Arc::new(InstructionRegistry::with_builtins()),
        tx,
    ));
    tokio::spawn(queue::run_worker(rx, controller.clone()));
    Ok(controller)
}

fn read_workflow(path: &Path) -> Result<Workflow> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("cannot read file {}", path.display()))?;
    serde_json::from_str(&content).with_context(|| format!("invalid workflow JSON in {}", path.display()))
}
