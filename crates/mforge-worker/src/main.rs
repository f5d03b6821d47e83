//! MediaForge worker binary.

use std::sync::Arc;

use anyhow::Context;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use mforge_media::{FfmpegRunner, StepRunner};
use mforge_provider::{GenerationProvider, HttpGenerationProvider};
use mforge_queue::{JobStore, SqliteJobStore, DEFAULT_POOL_SIZE};
use mforge_storage::{BlobStore, LocalBlobStore, S3BlobStore};
use mforge_worker::{metrics, JobExecutor, StorageBackend, WorkerConfig, WorkerContext};

fn init_tracing() {
    // Colored output for dev, JSON for production
    let use_json = std::env::var("LOG_FORMAT")
        .map(|v| v.to_lowercase() == "json")
        .unwrap_or(false);

    let mut env_filter = EnvFilter::from_default_env();
    for directive in ["mforge=info", "sqlx=warn"] {
        if let Ok(d) = directive.parse() {
            env_filter = env_filter.add_directive(d);
        }
    }

    if use_json {
        tracing_subscriber::registry()
            .with(fmt::layer().json())
            .with(env_filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(
                fmt::layer()
                    .with_ansi(true)
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_file(false)
                    .with_line_number(false),
            )
            .with(env_filter)
            .init();
    }
}

async fn blob_store(config: &WorkerConfig) -> anyhow::Result<Arc<dyn BlobStore>> {
    Ok(match config.storage {
        StorageBackend::Local => Arc::new(LocalBlobStore::new(config.static_dir.clone())),
        StorageBackend::S3 => Arc::new(
            S3BlobStore::from_env()
                .await
                .context("Failed to create S3 blob store")?,
        ),
    })
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Required for the HTTPS provider and S3 clients; fails only if already installed
    let _ = rustls::crypto::ring::default_provider().install_default();

    dotenvy::dotenv().ok();
    init_tracing();

    info!("Starting mforge-worker");

    let config = WorkerConfig::from_env();
    info!("Worker config: {:?}", config);

    if let Some(addr) = config.metrics_addr {
        metrics::init_metrics(addr)?;
        info!("Prometheus metrics listening on {}", addr);
    }

    tokio::fs::create_dir_all(&config.work_dir)
        .await
        .with_context(|| format!("Failed to create work dir {}", config.work_dir.display()))?;

    let store = SqliteJobStore::connect(&config.database_url, DEFAULT_POOL_SIZE)
        .await
        .context("Failed to open job store")?;
    store.init().await.context("Failed to initialise job store")?;
    let store: Arc<dyn JobStore> = Arc::new(store);

    let blobs = blob_store(&config).await?;
    let provider: Arc<dyn GenerationProvider> =
        Arc::new(HttpGenerationProvider::from_env().context("Failed to create generation provider")?);
    // Steps without their own timeout are bounded like the watchdog bounds strays
    let runner: Arc<dyn StepRunner> =
        Arc::new(FfmpegRunner::new().with_timeout(config.ffmpeg_max_age));

    let executor = Arc::new(JobExecutor::new(WorkerContext::new(
        config, store, blobs, provider, runner,
    )));

    let signal_executor = Arc::clone(&executor);
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to listen for shutdown signal: {}", e);
            return;
        }
        info!("Received shutdown signal");
        signal_executor.shutdown();
    });

    executor.run().await?;

    info!("Worker shutdown complete");
    Ok(())
}
