//! # viewbuf - Buffered view counting with periodic reconciliation
//!
//! This is the main entry point that wires everything together.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │  main.rs (this file) - Dependency Injection & Wiring           │
//! │    │                                                            │
//! │    ├── Creates: InMemoryBufferStore (adapter)                  │
//! │    ├── Creates: JsonFile / InMemory counter store (adapter)    │
//! │    ├── Creates: CounterBufferClient + Reconciler (use cases)   │
//! │    └── Runs: ReconcileScheduler until Ctrl-C                   │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Usage:
//!   viewbuf                                 - Run with defaults until Ctrl-C
//!   viewbuf --config viewbuf.yaml           - Load configuration
//!   viewbuf --demo-reads 500 --once         - Simulate reads, drain, exit

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use shared::ViewbufConfig;
use tokio::task::JoinSet;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use viewbuf_adapter::controller::scheduler::ReconcileScheduler;
use viewbuf_adapter::repository::in_memory::{InMemoryBufferStore, InMemoryCounterStore};
use viewbuf_adapter::repository::json_file::JsonFileCounterStore;
use viewbuf_domain::{
    CounterKey, DurableCounterStore, ReconcileScope, DEFAULT_ENTITY_KIND, VIEWS_METRIC,
};
use viewbuf_usecase::{CounterBufferClient, Reconciler, ReconcilerOptions};

#[derive(Parser)]
#[command(name = "viewbuf")]
#[command(about = "viewbuf - Buffered view counting with periodic reconciliation")]
#[command(version)]
struct Cli {
    /// Configuration file (.yaml, .yml or .json)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override reconcile.periodMs
    #[arg(long)]
    period_ms: Option<u64>,

    /// Simulated content reads to issue at startup
    #[arg(long, default_value_t = 0)]
    demo_reads: u64,

    /// Number of posts the simulated reads are spread over
    #[arg(long, default_value_t = 3, value_parser = clap::value_parser!(i64).range(1..))]
    demo_posts: i64,

    /// Stop after the simulated reads instead of waiting for Ctrl-C
    #[arg(long)]
    once: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => ViewbufConfig::from_file(path)
            .with_context(|| format!("failed to load {}", path.display()))?,
        None => ViewbufConfig::default(),
    };
    if let Some(period_ms) = cli.period_ms {
        config.reconcile.period_ms = period_ms;
        config.validate()?;
    }

    // Initialize logging
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.log_filter));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!("📈 viewbuf - buffered view counting");

    // ========================================
    // Dependency Injection - Wire up the stores
    // ========================================

    let buffer = Arc::new(InMemoryBufferStore::new());

    match config.durable_store_path.clone() {
        Some(path) => {
            let durable = JsonFileCounterStore::open(&path)
                .await
                .with_context(|| format!("failed to open {}", path.display()))?;
            if cli.demo_reads > 0 {
                for id in 1..=cli.demo_posts {
                    durable.register_entity(DEFAULT_ENTITY_KIND, id).await?;
                }
            }
            info!(path = %durable.path().display(), "using JSON file counter store");
            run(&config, &cli, buffer, Arc::new(durable)).await
        }
        None => {
            let durable = InMemoryCounterStore::new();
            if cli.demo_reads > 0 {
                for id in 1..=cli.demo_posts {
                    durable.register_entity(DEFAULT_ENTITY_KIND, id);
                }
            }
            info!("using in-memory counter store");
            run(&config, &cli, buffer, Arc::new(durable)).await
        }
    }
}

async fn run<D>(
    config: &ViewbufConfig,
    cli: &Cli,
    buffer: Arc<InMemoryBufferStore>,
    durable: Arc<D>,
) -> anyhow::Result<()>
where
    D: DurableCounterStore + 'static,
{
    let options = ReconcilerOptions {
        scope: ReconcileScope::new(
            config.reconcile.entity_kinds.clone(),
            config.reconcile.metrics.clone(),
        ),
        key_timeout: config.reconcile.key_timeout(),
    };

    let client = CounterBufferClient::new(buffer.clone(), durable.clone());
    let reconciler = Arc::new(Reconciler::new(buffer.clone(), durable.clone(), options));

    // ========================================
    // Start the scheduler
    // ========================================

    let scheduler = ReconcileScheduler::new(reconciler, config.reconcile.period())
        .with_drain_on_shutdown(config.reconcile.drain_on_shutdown)
        .start();

    if cli.demo_reads > 0 {
        simulate_reads(&client, cli.demo_reads, cli.demo_posts).await;
        info!(buffered_fields = buffer.field_count(), "simulated reads buffered");
    }

    if !cli.once {
        info!("press Ctrl-C to stop");
        tokio::signal::ctrl_c()
            .await
            .context("failed to listen for Ctrl-C")?;
    }

    // ========================================
    // Shutdown
    // ========================================

    scheduler
        .shutdown()
        .await
        .context("reconcile scheduler task failed")?;

    if cli.demo_reads > 0 {
        info!("📊 Durable counts");
        for id in 1..=cli.demo_posts {
            let key = CounterKey::new(DEFAULT_ENTITY_KIND, id, VIEWS_METRIC);
            match durable.get_current_count(&key).await {
                Ok(count) => info!("   {} = {}", key, count),
                Err(err) => warn!("   {} unavailable: {}", key, err),
            }
        }
    }

    info!("viewbuf stopped");
    Ok(())
}

/// Issue `reads` concurrent view events spread round-robin over the posts
async fn simulate_reads<D>(
    client: &CounterBufferClient<InMemoryBufferStore, D>,
    reads: u64,
    posts: i64,
) where
    D: DurableCounterStore + 'static,
{
    let mut tasks = JoinSet::new();
    for n in 0..reads {
        let client = client.clone();
        let post_id = i64::try_from(n % posts as u64).unwrap_or(0) + 1;
        tasks.spawn(async move {
            client
                .record_event(DEFAULT_ENTITY_KIND, post_id, VIEWS_METRIC)
                .await
        });
    }

    while let Some(joined) = tasks.join_next().await {
        if let Err(err) = joined {
            warn!(error = %err, "simulated read task failed");
        }
    }
}
