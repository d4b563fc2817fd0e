use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use db::{KeyValueStore, MemoryStore, SqliteStore};
use events::EventBus;
use orchestrator::{OrchestrationEngine, OrchestratorConfig, StrategyKind};
use server::{create_router, state::AppState};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const DEFAULT_PORT: u16 = 3001;
const PURGE_INTERVAL: Duration = Duration::from_secs(300);

#[derive(Parser)]
#[command(name = "stackforge-server")]
#[command(about = "Job orchestration server", long_about = None)]
#[command(version)]
struct Cli {
    #[arg(long, default_value = "0.0.0.0")]
    host: String,

    #[arg(short, long, default_value_t = DEFAULT_PORT)]
    port: u16,

    /// SQLite URL for durable jobs, e.g. `sqlite:stackforge.db`. In-memory when omitted.
    #[arg(long)]
    database_url: Option<String>,

    /// `scripted` or `planned`. Overrides ORCHESTRATION_STRATEGY.
    #[arg(long)]
    strategy: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let mut config = OrchestratorConfig::from_env();
    if let Some(raw) = cli.strategy.as_deref() {
        let strategy = StrategyKind::parse(raw)
            .with_context(|| format!("Unknown strategy: {}", raw))?;
        config = config.with_strategy(strategy);
    }

    let store: Arc<dyn KeyValueStore> = match cli.database_url.as_deref() {
        Some(url) => Arc::new(
            SqliteStore::connect(url)
                .await
                .with_context(|| format!("Failed to open database {}", url))?,
        ),
        None => Arc::new(MemoryStore::new()),
    };

    if config.job_retention.is_some() {
        spawn_purge_task(Arc::clone(&store));
    }

    let engine = OrchestrationEngine::from_config(&config, store, EventBus::new());
    tracing::info!(
        strategy = config.strategy.as_str(),
        mode = %config.execution_mode,
        "Orchestration engine ready"
    );

    let app = create_router(AppState::new(engine));

    let addr = format!("{}:{}", cli.host, cli.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    tracing::info!("Server listening on {}", listener.local_addr()?);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

fn spawn_purge_task(store: Arc<dyn KeyValueStore>) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(PURGE_INTERVAL);
        loop {
            interval.tick().await;
            match store.purge_expired().await {
                Ok(0) => {}
                Ok(removed) => tracing::debug!(removed, "Purged expired entries"),
                Err(e) => tracing::warn!(error = %e, "Failed to purge expired entries"),
            }
        }
    });
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutting down");
}
