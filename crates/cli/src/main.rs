//! `flowlink` CLI entry-point.
//!
//! Available sub-commands:
//! - `serve`    — start the trigger API backed by Postgres.
//! - `migrate`  — run pending database migrations.
//! - `validate` — validate a workflow or step-graph JSON file.
//! - `import`   — validate a workflow file and store it.
//! - `run`      — execute a workflow file once, in memory, and print the history record.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use adapters::AdapterRegistry;
use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use engine::{
    ExecutionEngine, ExecutorConfig, HistoryRecorder, MemoryHistory, MemoryWorkflowStore, PgHistory,
    PgWorkflowStore, TriggerEvent, WorkflowDefinition,
};
use tracing::info;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

mod definition;

#[derive(Parser)]
#[command(
    name = "flowlink",
    about = "Trigger-driven integration workflows: read, transform, gate, write",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Args)]
struct DatabaseArgs {
    #[arg(long, env = "DATABASE_URL")]
    database_url: String,
    #[arg(long, env = "FLOWLINK_MAX_CONNECTIONS", default_value_t = 10)]
    max_connections: u32,
}

impl DatabaseArgs {
    async fn connect(&self) -> Result<db::DbPool> {
        db::pool::create_pool(&self.database_url, self.max_connections, Duration::from_secs(5))
            .await
            .context("failed to connect to database")
    }
}

#[derive(Args)]
struct EngineArgs {
    /// Upper bound on each adapter read or write.
    #[arg(long, env = "FLOWLINK_ADAPTER_TIMEOUT_MS", default_value_t = 30_000)]
    adapter_timeout_ms: u64,
}

impl EngineArgs {
    fn config(&self) -> ExecutorConfig {
        ExecutorConfig {
            adapter_timeout: Duration::from_millis(self.adapter_timeout_ms),
        }
    }
}

#[derive(Subcommand)]
enum Command {
    /// Start the HTTP trigger API.
    Serve {
        #[arg(long, env = "FLOWLINK_BIND", default_value = "0.0.0.0:8080")]
        bind: String,
        #[command(flatten)]
        database: DatabaseArgs,
        #[command(flatten)]
        engine: EngineArgs,
    },
    /// Run pending database migrations.
    Migrate {
        #[command(flatten)]
        database: DatabaseArgs,
    },
    /// Validate a workflow or step-graph JSON file.
    Validate {
        path: PathBuf,
    },
    /// Validate a workflow file and store it.
    Import {
        path: PathBuf,
        #[arg(long)]
        organization_id: Uuid,
        /// Store the workflow deactivated.
        #[arg(long)]
        inactive: bool,
        #[command(flatten)]
        database: DatabaseArgs,
    },
    /// Execute a workflow file once against the built-in adapters.
    Run {
        path: PathBuf,
        /// JSON file used as the manual trigger payload.
        #[arg(long)]
        payload: Option<PathBuf>,
        #[command(flatten)]
        engine: EngineArgs,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Command::Serve { bind, database, engine } => {
            let pool = database.connect().await?;
            let registry = AdapterRegistry::with_builtins();
            info!("registered integrations: {:?}", registry.integrations());

            let engine = ExecutionEngine::new(
                Arc::new(PgWorkflowStore::new(pool.clone())),
                Arc::new(PgHistory::new(pool)),
                Arc::new(registry),
                engine.config(),
            );
            api::serve(&bind, api::AppState::new(Arc::new(engine)))
                .await
                .context("API server stopped")?;
        }
        Command::Migrate { database } => {
            let pool = database.connect().await?;
            db::pool::run_migrations(&pool).await.context("migration failed")?;
            info!("Migrations applied successfully");
        }
        Command::Validate { path } => match definition::load(&path) {
            Ok(loaded) => println!("{}", loaded.summary()),
            Err(e) => {
                eprintln!("Validation failed: {e:#}");
                std::process::exit(1);
            }
        },
        Command::Import { path, organization_id, inactive, database } => {
            let loaded = definition::load(&path)?;
            let pool = database.connect().await?;
            let stored = PgWorkflowStore::new(pool)
                .create(organization_id, &loaded.name, !inactive, &loaded.pipeline)
                .await?;
            println!("{}", stored.id);
        }
        Command::Run { path, payload, engine } => {
            let loaded = definition::load(&path)?;
            let payload = definition::load_payload(payload.as_deref())?;

            let workflows = Arc::new(MemoryWorkflowStore::new());
            let history = Arc::new(MemoryHistory::new());
            let workflow = WorkflowDefinition::new(Uuid::nil(), loaded.name, loaded.pipeline);
            let workflow_id = workflow.id;
            workflows.insert(workflow)?;

            let engine = ExecutionEngine::new(
                workflows,
                history.clone(),
                Arc::new(AdapterRegistry::with_builtins()),
                engine.config(),
            );
            let result = engine
                .execute(workflow_id, TriggerEvent::manual(payload, None))
                .await?;

            let record = history
                .get(result.history_id)
                .await?
                .context("history record missing after run")?;
            println!("{}", serde_json::to_string_pretty(&record)?);

            if !result.success {
                std::process::exit(1);
            }
        }
    }

    Ok(())
}
