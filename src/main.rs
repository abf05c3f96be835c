use clap::{Parser, Subcommand};
use groundswell::cluster;
use groundswell::collector::{
    CollectorService, CredentialPool, DedupIndex, Harvester, RateGate, WatermarkStore,
};
use groundswell::config::Config;
use groundswell::forum::ForumClient;
use groundswell::llm::OpenAiClient;
use groundswell::metrics::Metrics;
use groundswell::pipeline::{Pipeline, StageCtx};
use groundswell::queue::{JobQueue, QueueRefiller, spawn_workers};
use groundswell::server::{AppState, groundswell_router};
use mimalloc::MiMalloc;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::{net::TcpListener, signal, sync::mpsc, sync::watch};
use tracing::info;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

#[derive(Parser)]
#[command(name = "groundswell", about = "Problem-post harvester and enrichment pipeline")]
struct Cli {
    #[command(subcommand)]
    mode: Option<Mode>,
}

#[derive(Subcommand)]
enum Mode {
    /// HTTP ingress plus queue workers and the refiller (default).
    Server,
    /// Queue workers and the refiller only.
    Worker,
    /// Continuous harvesting from the configured sub-sources.
    Collect,
}

struct Enrichment {
    db: groundswell::db::DbHandle,
    queue: Arc<JobQueue>,
    pipeline: Arc<Pipeline>,
    metrics: Arc<Metrics>,
}

async fn build_enrichment(cfg: &Config) -> Result<Enrichment, Box<dyn std::error::Error>> {
    let db = groundswell::db::spawn(cfg.basic.database_url.as_str()).await;
    let registry = cluster::spawn(db.clone()).await;
    let llm = Arc::new(OpenAiClient::new(&cfg.pipeline)?);
    let metrics = Arc::new(Metrics::new());

    let ctx = StageCtx {
        db: db.clone(),
        llm,
        registry,
        metrics: metrics.clone(),
        cfg: Arc::new(cfg.pipeline.clone()),
    };
    let pipeline = Arc::new(Pipeline::new(ctx));
    let queue = Arc::new(JobQueue::new(
        db.clone(),
        cfg.pipeline.job_attempts,
        cfg.pipeline.job_backoff_ms,
    ));

    Ok(Enrichment {
        db,
        queue,
        pipeline,
        metrics,
    })
}

/// Starts the worker pool and the refiller; completed jobs nudge the refiller.
fn start_workers(
    cfg: &Config,
    enrichment: &Enrichment,
    shutdown: watch::Receiver<bool>,
) -> tokio::task::JoinHandle<()> {
    let (refill_tx, refill_rx) = mpsc::channel(64);

    spawn_workers(
        enrichment.queue.clone(),
        enrichment.pipeline.clone(),
        cfg.pipeline.orch_concurrency,
        refill_tx,
        shutdown.clone(),
    );

    let refiller = QueueRefiller::new(
        enrichment.db.clone(),
        enrichment.queue.clone(),
        cfg.pipeline.refill_low_threshold,
        cfg.pipeline.refill_batch_size,
    );
    tokio::spawn(async move {
        refiller.run(refill_rx, shutdown).await;
    })
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let mode = cli.mode.unwrap_or(Mode::Server);

    let cfg = match mode {
        // Enrichment modes need a usable LLM key up front.
        Mode::Server | Mode::Worker => Config::load_validated(),
        Mode::Collect => Config::load(),
    };

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(cfg.basic.loglevel.clone()));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_level(true)
                .with_target(false),
        )
        .init();

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    match mode {
        Mode::Server => {
            let enrichment = build_enrichment(&cfg).await?;
            let _refiller = start_workers(&cfg, &enrichment, shutdown_rx.clone());

            let state = AppState::new(
                enrichment.db.clone(),
                enrichment.queue.clone(),
                enrichment.pipeline.clone(),
                enrichment.metrics.clone(),
                &cfg.basic.environment,
            );
            let app = groundswell_router(state);

            let addr = SocketAddr::from((cfg.basic.listen_addr, cfg.basic.listen_port));
            let listener = TcpListener::bind(addr).await?;
            info!("HTTP server listening on {}", addr);
            axum::serve(listener, app)
                .with_graceful_shutdown(shutdown_signal())
                .await?;
            let _ = shutdown_tx.send(true);
            info!("Server has shut down gracefully.");
        }

        Mode::Worker => {
            let enrichment = build_enrichment(&cfg).await?;
            let refiller = start_workers(&cfg, &enrichment, shutdown_rx.clone());

            info!("Worker mode running; waiting for shutdown signal.");
            shutdown_signal().await;
            let _ = shutdown_tx.send(true);
            let _ = refiller.await;
            info!("Workers have shut down gracefully.");
        }

        Mode::Collect => {
            if cfg.collector.accounts.is_empty() {
                return Err("collector.accounts must not be empty in collect mode".into());
            }
            if cfg.collector.sub_sources.is_empty() {
                return Err("collector.sub_sources must not be empty in collect mode".into());
            }

            let db = groundswell::db::spawn(cfg.basic.database_url.as_str()).await;
            let cache = groundswell::cache::spawn(cfg.basic.database_url.as_str()).await;

            let dedup = Arc::new(DedupIndex::new(
                cache.clone(),
                &cfg.collector.source,
                cfg.collector.dedup_ttl_days,
            ));
            dedup.warm_start(&db, &cfg.collector.source).await?;

            let pool = Arc::new(CredentialPool::new(
                cfg.collector.accounts.clone(),
                cache.clone(),
            ));
            let api_gate = Arc::new(RateGate::per_minute(
                "forum_api",
                cfg.collector.api_per_minute,
                cfg.collector.api_per_minute / 10,
            ));
            let poll_gate = Arc::new(RateGate::per_period(
                "rss_poll",
                Duration::from_secs(cfg.collector.rss_interval_secs.max(1)),
            ));
            let client = Arc::new(ForumClient::new(&cfg.collector)?);
            let harvester = Arc::new(Harvester::new(
                client,
                pool,
                api_gate,
                poll_gate,
                cfg.collector.api_concurrency,
                &cfg.collector.source,
                Duration::from_secs(cfg.collector.cooldown_secs),
            ));

            let service = CollectorService::new(
                cfg.collector.clone(),
                harvester,
                dedup,
                WatermarkStore::new(cache.clone()),
                cache,
                db,
            );

            info!("Collector running; waiting for shutdown signal.");
            tokio::select! {
                () = service.run_forever(shutdown_rx.clone()) => {}
                () = shutdown_signal() => {
                    let _ = shutdown_tx.send(true);
                }
            }
            info!("Collector has shut down gracefully.");
        }
    }

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => { /* ... */ },
        _ = terminate => { /* ... */ },
    }
}
