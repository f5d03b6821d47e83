//! Worker metrics and the Prometheus exporter.

use std::net::SocketAddr;

use metrics::{counter, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;

use crate::error::{WorkerError, WorkerResult};

/// Metric names as constants for consistency.
pub mod names {
    pub const JOBS_CLAIMED_TOTAL: &str = "mforge_jobs_claimed_total";
    pub const JOBS_FINISHED_TOTAL: &str = "mforge_jobs_finished_total";
    pub const JOB_DURATION_SECONDS: &str = "mforge_job_duration_seconds";
    pub const RESOLVER_STITCHES_SPAWNED_TOTAL: &str = "mforge_resolver_stitches_spawned_total";
    pub const RESOLVER_PARENTS_FAILED_TOTAL: &str = "mforge_resolver_parents_failed_total";
    pub const RESOLVER_RELEASES_TOTAL: &str = "mforge_resolver_releases_total";
    pub const WRITE_BACK_DROPPED_TOTAL: &str = "mforge_write_back_dropped_total";
}

/// Install the Prometheus recorder with an HTTP scrape listener on `addr`.
pub fn init_metrics(addr: SocketAddr) -> WorkerResult<()> {
    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .map_err(|e| WorkerError::config_error(format!("Failed to install metrics exporter: {}", e)))
}

pub fn record_job_claimed(lane: &str) {
    let labels = [("lane", lane.to_string())];
    counter!(names::JOBS_CLAIMED_TOTAL, &labels).increment(1);
}

/// Record a job's terminal status and handler wall time.
pub fn record_job_finished(job_type: &str, status: &str, duration_secs: f64) {
    let labels = [
        ("job_type", job_type.to_string()),
        ("status", status.to_string()),
    ];
    counter!(names::JOBS_FINISHED_TOTAL, &labels).increment(1);
    histogram!(names::JOB_DURATION_SECONDS, &labels).record(duration_secs);
}

pub fn record_stitch_spawned() {
    counter!(names::RESOLVER_STITCHES_SPAWNED_TOTAL).increment(1);
}

pub fn record_parent_failed() {
    counter!(names::RESOLVER_PARENTS_FAILED_TOTAL).increment(1);
}

pub fn record_release() {
    counter!(names::RESOLVER_RELEASES_TOTAL).increment(1);
}

/// A terminal write skipped because the job left its processing status.
pub fn record_write_back_dropped() {
    counter!(names::WRITE_BACK_DROPPED_TOTAL).increment(1);
}
