use std::path::Path;
use std::process::Command;

use mforge_queue::{JobStore, SqliteJobStore};
use mforge_storage::S3BlobStore;
use mforge_worker::{StorageBackend, WorkerConfig};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let config = WorkerConfig::from_env();

    println!(
        "worker-selfcheck: starting with work_dir={}",
        config.work_dir.display()
    );
    ensure_workdir(&config.work_dir).await?;
    ensure_tool("ffmpeg")?;
    ensure_tool("ffprobe")?;
    ensure_store(&config.database_url).await?;
    ensure_env_present(&["MFORGE_PROVIDER_URL", "MFORGE_PROVIDER_TOKEN"])?;
    if config.storage == StorageBackend::S3 {
        ensure_env_present(&["S3_BUCKET"])?;
        ensure_bucket().await?;
    }

    println!("worker-selfcheck: ok");
    Ok(())
}

async fn ensure_workdir<P: AsRef<Path>>(path: P) -> anyhow::Result<()> {
    let path = path.as_ref();
    tokio::fs::create_dir_all(path).await?;
    Ok(())
}

fn ensure_tool(tool: &str) -> anyhow::Result<()> {
    let output = Command::new(tool)
        .arg("-version")
        .output()
        .map_err(|e| anyhow::anyhow!("{} not available: {}", tool, e))?;

    if !output.status.success() {
        return Err(anyhow::anyhow!(
            "{} -version failed: {:?}",
            tool,
            output.status
        ));
    }
    Ok(())
}

async fn ensure_store(database_url: &str) -> anyhow::Result<()> {
    let store = SqliteJobStore::connect(database_url, 1)
        .await
        .map_err(|e| anyhow::anyhow!("job store unreachable at {}: {}", database_url, e))?;
    store.init().await?;
    Ok(())
}

async fn ensure_bucket() -> anyhow::Result<()> {
    let _ = rustls::crypto::ring::default_provider().install_default();
    let blobs = S3BlobStore::from_env().await?;
    blobs.check_connectivity().await?;
    println!("worker-selfcheck: bucket {} reachable", blobs.bucket());
    Ok(())
}

fn ensure_env_present(vars: &[&str]) -> anyhow::Result<()> {
    for var in vars {
        if std::env::var(var).is_err() {
            return Err(anyhow::anyhow!("missing required env var {}", var));
        }
    }
    Ok(())
}
