use std::sync::Arc;
use std::time::Duration;

use agents::{AgentRegistry, AgentRunner, HttpModelClient};
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use orchestrator::{
    OrchestratorConfig, ScanJobHandler, ScanOrchestrator, ScanService,
};
use queue::{JobQueue, QueueConfig, WorkerPool};
use server::{create_router, state::AppState};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const DEFAULT_DB: &str = "leadlens.db";
const DEFAULT_PORT: u16 = 3001;
const DEFAULT_WORKERS: usize = 2;
const DEFAULT_AGENT_TIMEOUT_SECS: u64 = 120;

#[derive(Parser)]
#[command(name = "leadlens")]
#[command(about = "LeadLens scan engine - multi-phase opportunity analysis", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run migrations, start the worker pool and serve the HTTP API.
    Serve {
        #[arg(short, long, default_value_t = DEFAULT_PORT)]
        port: u16,

        #[arg(long, default_value = DEFAULT_DB)]
        db: String,

        #[arg(long, default_value_t = DEFAULT_WORKERS)]
        workers: usize,

        /// Base URL of the structured-completion model endpoint.
        #[arg(long, env = "LEADLENS_MODEL_URL", default_value = "http://localhost:4010")]
        model_url: String,

        /// Model identifier passed to the endpoint.
        #[arg(long, env = "LEADLENS_MODEL", default_value = "scan-analyst-1")]
        model: String,

        /// API key for the model endpoint, if it requires one.
        #[arg(long, env = "LEADLENS_MODEL_KEY")]
        model_key: Option<String>,

        /// Per-agent timeout in seconds.
        #[arg(long, default_value_t = DEFAULT_AGENT_TIMEOUT_SECS)]
        agent_timeout: u64,
    },
    /// Print run and job counts from the store.
    Status {
        #[arg(long, default_value = DEFAULT_DB)]
        db: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    match Cli::parse().command {
        Commands::Serve {
            port,
            db,
            workers,
            model_url,
            model,
            model_key,
            agent_timeout,
        } => serve(port, &db, workers, model_url, model, model_key, agent_timeout).await,
        Commands::Status { db } => status(&db).await,
    }
}

async fn serve(
    port: u16,
    db_path: &str,
    workers: usize,
    model_url: String,
    model: String,
    model_key: Option<String>,
    agent_timeout: u64,
) -> Result<()> {
    let pool = db::create_pool(&format!("sqlite://{db_path}"))
        .await
        .context("failed to open database")?;
    db::run_migrations(&pool)
        .await
        .context("failed to run migrations")?;

    let runs = db::RunRepository::new(pool.clone());
    let bus = events::ProgressBus::new();
    let job_queue = JobQueue::new(pool.clone(), QueueConfig::default());

    let client = Arc::new(HttpModelClient::new(model_url, model, model_key));
    let runner = AgentRunner::new(client, Duration::from_secs(agent_timeout));
    let orchestrator = Arc::new(ScanOrchestrator::new(
        runs.clone(),
        bus.clone(),
        runner,
        AgentRegistry::standard(),
        OrchestratorConfig::default(),
    ));

    let handler = Arc::new(ScanJobHandler::new(orchestrator));
    let worker_pool = WorkerPool::start(job_queue.clone(), handler, workers);
    tracing::info!(workers, "Worker pool started");

    let service = ScanService::new(runs, job_queue, bus.clone());
    let app = create_router(AppState::new(service, bus));

    let listener = tokio::net::TcpListener::bind(("0.0.0.0", port))
        .await
        .context("failed to bind listener")?;
    tracing::info!("Server listening on {}", listener.local_addr()?);

    axum_serve(listener, app).await?;

    tracing::info!("Shutting down");
    worker_pool.shutdown().await;
    pool.close().await;
    Ok(())
}

async fn axum_serve(listener: tokio::net::TcpListener, app: axum::Router) -> Result<()> {
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await
        .context("server error")
}

async fn status(db_path: &str) -> Result<()> {
    let pool = db::create_pool(&format!("sqlite://{db_path}"))
        .await
        .context("failed to open database")?;
    db::run_migrations(&pool).await?;

    let runs = db::RunRepository::new(pool.clone());
    let job_queue = JobQueue::new(pool.clone(), QueueConfig::default());

    println!("Recent runs:");
    for run in runs.list_recent(20).await? {
        println!(
            "  {}  {:<16} {:>3}%  {}  {}",
            run.id,
            run.status.as_str(),
            run.progress,
            run.phase.as_deref().unwrap_or("-"),
            run.subject_id,
        );
    }

    println!("Jobs:");
    for (status, count) in job_queue.counts().await? {
        println!("  {status:<8} {count}");
    }

    pool.close().await;
    Ok(())
}
