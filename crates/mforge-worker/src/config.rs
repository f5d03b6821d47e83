//! Worker configuration.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use mforge_media::{StitchConfig, WatchdogConfig, WatchdogScope};
use tracing::warn;

use crate::error::WorkerError;

/// Where job artifacts are written.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StorageBackend {
    #[default]
    Local,
    S3,
}

impl FromStr for StorageBackend {
    type Err = WorkerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "local" => Ok(StorageBackend::Local),
            "s3" => Ok(StorageBackend::S3),
            other => Err(WorkerError::config_error(format!(
                "unknown storage backend '{}'",
                other
            ))),
        }
    }
}

/// Worker configuration.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Job store location
    pub database_url: String,
    /// Maximum concurrent jobs
    pub max_concurrent_jobs: usize,
    /// Idle sleep between empty claim passes
    pub poll_interval: Duration,
    /// How often the process watchdog sweeps
    pub watchdog_interval: Duration,
    /// FFmpeg processes older than this are terminated
    pub ffmpeg_max_age: Duration,
    /// SIGTERM to SIGKILL grace period
    pub ffmpeg_kill_grace: Duration,
    pub watchdog_scope: WatchdogScope,
    /// Per-input stitch ceiling
    pub stitch_max_input_bytes: u64,
    pub stitch_fast_timeout: Duration,
    pub stitch_fallback_timeout: Duration,
    /// Outputs below this are treated as failed encodes
    pub min_output_bytes: u64,
    /// Parent of the job-scoped scratch directories
    pub work_dir: PathBuf,
    /// Graceful shutdown timeout
    pub shutdown_timeout: Duration,
    /// Prometheus listener, disabled when unset
    pub metrics_addr: Option<SocketAddr>,
    pub storage: StorageBackend,
    /// Local blob store root
    pub static_dir: PathBuf,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            database_url: "sqlite:jobs.db?mode=rwc".to_string(),
            max_concurrent_jobs: 2,
            poll_interval: Duration::from_secs(5),
            watchdog_interval: Duration::from_secs(30),
            ffmpeg_max_age: Duration::from_secs(300),
            ffmpeg_kill_grace: Duration::from_millis(1000),
            watchdog_scope: WatchdogScope::Children,
            stitch_max_input_bytes: 100 * 1024 * 1024,
            stitch_fast_timeout: Duration::from_secs(60),
            stitch_fallback_timeout: Duration::from_secs(120),
            min_output_bytes: 1024,
            work_dir: std::env::temp_dir().join("mforge"),
            shutdown_timeout: Duration::from_secs(60),
            metrics_addr: None,
            storage: StorageBackend::Local,
            static_dir: PathBuf::from("static"),
        }
    }
}

fn env_parse<T: FromStr>(name: &str) -> Option<T> {
    let raw = std::env::var(name).ok()?;
    match raw.trim().parse() {
        Ok(v) => Some(v),
        Err(_) => {
            warn!("Ignoring unparseable {}={}", name, raw);
            None
        }
    }
}

impl WorkerConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            database_url: std::env::var("MFORGE_DATABASE_URL").unwrap_or(defaults.database_url),
            max_concurrent_jobs: env_parse::<usize>("MFORGE_MAX_JOBS")
                .filter(|n| *n > 0)
                .unwrap_or(defaults.max_concurrent_jobs),
            poll_interval: env_parse::<u64>("MFORGE_POLL_INTERVAL_SECS")
                .filter(|n| *n > 0)
                .map(Duration::from_secs)
                .unwrap_or(defaults.poll_interval),
            watchdog_interval: env_parse::<u64>("MFORGE_WATCHDOG_INTERVAL_SECS")
                .filter(|n| *n > 0)
                .map(Duration::from_secs)
                .unwrap_or(defaults.watchdog_interval),
            ffmpeg_max_age: env_parse("MFORGE_FFMPEG_MAX_AGE_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.ffmpeg_max_age),
            ffmpeg_kill_grace: env_parse("MFORGE_FFMPEG_KILL_GRACE_MS")
                .map(Duration::from_millis)
                .unwrap_or(defaults.ffmpeg_kill_grace),
            watchdog_scope: env_parse("MFORGE_WATCHDOG_SCOPE").unwrap_or(defaults.watchdog_scope),
            stitch_max_input_bytes: env_parse("MFORGE_STITCH_MAX_INPUT_BYTES")
                .unwrap_or(defaults.stitch_max_input_bytes),
            stitch_fast_timeout: env_parse("MFORGE_STITCH_FAST_TIMEOUT_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.stitch_fast_timeout),
            stitch_fallback_timeout: env_parse("MFORGE_STITCH_FALLBACK_TIMEOUT_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.stitch_fallback_timeout),
            min_output_bytes: env_parse("MFORGE_MIN_OUTPUT_BYTES")
                .unwrap_or(defaults.min_output_bytes),
            work_dir: std::env::var("MFORGE_WORK_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.work_dir),
            shutdown_timeout: env_parse("MFORGE_SHUTDOWN_TIMEOUT_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.shutdown_timeout),
            metrics_addr: env_parse("MFORGE_METRICS_ADDR"),
            storage: env_parse("MFORGE_STORAGE").unwrap_or(defaults.storage),
            static_dir: std::env::var("MFORGE_STATIC_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.static_dir),
        }
    }

    pub fn stitch_config(&self) -> StitchConfig {
        StitchConfig {
            max_input_bytes: self.stitch_max_input_bytes,
            fast_timeout: self.stitch_fast_timeout,
            fallback_timeout: self.stitch_fallback_timeout,
            min_output_bytes: self.min_output_bytes,
        }
    }

    pub fn watchdog_config(&self) -> WatchdogConfig {
        WatchdogConfig {
            max_age: self.ffmpeg_max_age,
            kill_grace: self.ffmpeg_kill_grace,
            scope: self.watchdog_scope,
            ..WatchdogConfig::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = WorkerConfig::default();
        assert_eq!(config.max_concurrent_jobs, 2);
        assert_eq!(config.poll_interval, Duration::from_secs(5));
        assert_eq!(config.storage, StorageBackend::Local);
        assert!(config.metrics_addr.is_none());

        let stitch = config.stitch_config();
        assert_eq!(stitch.max_input_bytes, 104_857_600);
        assert_eq!(stitch.min_output_bytes, 1024);

        let watchdog = config.watchdog_config();
        assert_eq!(watchdog.max_age, Duration::from_secs(300));
        assert_eq!(watchdog.process_name, "ffmpeg");
    }

    #[test]
    fn test_storage_backend_parse() {
        assert_eq!("S3".parse::<StorageBackend>().unwrap(), StorageBackend::S3);
        assert_eq!(" local ".parse::<StorageBackend>().unwrap(), StorageBackend::Local);
        assert!("gcs".parse::<StorageBackend>().is_err());
    }
}
