//! Job executor.
//!
//! One scheduler loop per worker: each pass runs the dependency resolver,
//! then claims at most one job when a concurrency slot is free. Claimed jobs
//! run on their own tasks; a panicking handler fails only its job.

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use mforge_media::ProcessWatchdog;
use mforge_models::{ClaimLane, Job, JobId, JobStatus};
use mforge_queue::StoreError;
use tokio::sync::{watch, Semaphore};
use tokio::task::JoinError;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn, Instrument};
use uuid::Uuid;

use crate::context::WorkerContext;
use crate::error::{WorkerError, WorkerResult};
use crate::handlers::dispatch;
use crate::logging::JobLogger;
use crate::metrics;
use crate::outcome::{terminal_outcome, ParentLookup};
use crate::resolver::DependencyResolver;
use crate::retry::{retry_async, FailureTracker, RetryConfig};

/// Back-off after a failed claim.
const ERROR_BACKOFF: Duration = Duration::from_secs(5);
/// Consecutive sweep failures logged before suppression.
const MAX_LOGGED_FAILURES: u32 = 3;

/// Job executor that claims and runs jobs from the store.
pub struct JobExecutor {
    ctx: Arc<WorkerContext>,
    resolver: DependencyResolver,
    job_semaphore: Arc<Semaphore>,
    shutdown: watch::Sender<bool>,
    resolver_failures: Mutex<FailureTracker>,
    worker_name: String,
}

impl JobExecutor {
    /// Create a new job executor.
    pub fn new(ctx: WorkerContext) -> Self {
        let job_semaphore = Arc::new(Semaphore::new(ctx.config.max_concurrent_jobs));
        let (shutdown, _) = watch::channel(false);
        let resolver = DependencyResolver::new(Arc::clone(&ctx.store));

        Self {
            ctx: Arc::new(ctx),
            resolver,
            job_semaphore,
            shutdown,
            resolver_failures: Mutex::new(FailureTracker::new(MAX_LOGGED_FAILURES)),
            worker_name: format!("worker-{}", Uuid::new_v4()),
        }
    }

    /// Run until [`shutdown`](Self::shutdown) is signalled, then drain
    /// in-flight jobs.
    pub async fn run(&self) -> WorkerResult<()> {
        info!(
            "Starting job executor '{}' with {} max concurrent jobs",
            self.worker_name, self.ctx.config.max_concurrent_jobs
        );

        let watchdog_task = self.spawn_watchdog();
        let mut shutdown_rx = self.shutdown.subscribe();
        let mut resolve_tick = tokio::time::interval(self.ctx.config.poll_interval);
        resolve_tick.set_missed_tick_behavior(MissedTickBehavior::Delay);

        while !*shutdown_rx.borrow_and_update() {
            // Keep resolving dependencies while every slot is busy
            let permit = loop {
                tokio::select! {
                    _ = shutdown_rx.changed() => break None,
                    permit = Arc::clone(&self.job_semaphore).acquire_owned() => {
                        break Some(permit.map_err(|_| WorkerError::processing_failed("Semaphore closed"))?);
                    }
                    _ = resolve_tick.tick() => self.resolve().await,
                }
            };
            let Some(permit) = permit else {
                continue;
            };

            self.resolve().await;

            let idle = match self.ctx.store.claim_prioritized().await {
                Ok(Some((lane, job))) => {
                    let ctx = Arc::clone(&self.ctx);
                    tokio::spawn(async move {
                        let _permit = permit;
                        Self::execute_job(ctx, lane, job).await;
                    });
                    continue;
                }
                Ok(None) => self.ctx.config.poll_interval,
                Err(e) => {
                    error!("Failed to claim a job: {}", e);
                    ERROR_BACKOFF
                }
            };
            drop(permit);

            tokio::select! {
                _ = shutdown_rx.changed() => {}
                _ = tokio::time::sleep(idle) => {}
            }
        }

        info!("Shutdown signal received, stopping executor");
        watchdog_task.abort();

        info!("Waiting for in-flight jobs to complete...");
        if tokio::time::timeout(self.ctx.config.shutdown_timeout, self.wait_for_jobs())
            .await
            .is_err()
        {
            warn!(
                "In-flight jobs still running after {:?}, exiting anyway",
                self.ctx.config.shutdown_timeout
            );
        }

        info!("Job executor stopped");
        Ok(())
    }

    /// One scheduler pass run inline: resolve, claim, execute.
    ///
    /// Returns the id of the job that ran, if any.
    pub async fn process_next(&self) -> WorkerResult<Option<JobId>> {
        self.resolver.tick().await?;
        match self.ctx.store.claim_prioritized().await? {
            Some((lane, job)) => {
                let id = job.id;
                Self::execute_job(Arc::clone(&self.ctx), lane, job).await;
                Ok(Some(id))
            }
            None => Ok(None),
        }
    }

    /// Signal shutdown.
    pub fn shutdown(&self) {
        self.shutdown.send_replace(true);
    }

    pub fn context(&self) -> &WorkerContext {
        &self.ctx
    }

    async fn resolve(&self) {
        let result = self.resolver.tick().await;
        let Ok(mut failures) = self.resolver_failures.lock() else {
            return;
        };
        match result {
            Ok(report) => {
                failures.record_success();
                if report.stitches_spawned + report.parents_failed + report.released > 0 {
                    debug!(?report, "Dependency resolver pass");
                }
            }
            Err(e) => {
                if failures.record_failure() {
                    warn!("Dependency resolver failed: {}", e);
                }
            }
        }
    }

    fn spawn_watchdog(&self) -> tokio::task::JoinHandle<()> {
        let watchdog = ProcessWatchdog::new(self.ctx.config.watchdog_config());
        let period = self.ctx.config.watchdog_interval;
        let mut shutdown_rx = self.shutdown.subscribe();

        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            let mut failures = FailureTracker::new(MAX_LOGGED_FAILURES);
            loop {
                tokio::select! {
                    _ = shutdown_rx.changed() => {
                        if *shutdown_rx.borrow() {
                            break;
                        }
                    }
                    _ = interval.tick() => match watchdog.sweep().await {
                        Ok(report) => {
                            failures.record_success();
                            if report.terminated > 0 {
                                info!(
                                    "Watchdog terminated {} runaway ffmpeg processes ({} killed)",
                                    report.terminated, report.killed
                                );
                            }
                        }
                        Err(e) => {
                            if failures.record_failure() {
                                warn!("Process watchdog sweep failed: {}", e);
                            }
                        }
                    }
                }
            }
        })
    }

    /// Run one claimed job to its terminal write.
    async fn execute_job(ctx: Arc<WorkerContext>, lane: ClaimLane, job: Job) {
        let logger = JobLogger::for_claim(lane, &job);
        let span = logger.create_span();
        Self::run_claimed(ctx, lane, job, logger).instrument(span).await;
    }

    async fn run_claimed(ctx: Arc<WorkerContext>, lane: ClaimLane, job: Job, logger: JobLogger) {
        metrics::record_job_claimed(lane.as_str());
        logger.log_start(&format!("claimed from the {} lane", lane.as_str()));
        let started = Instant::now();

        // The handler runs on its own task so a panic surfaces as a JoinError
        let handler_ctx = Arc::clone(&ctx);
        let handler_job = job.clone();
        let joined = tokio::spawn(async move { dispatch(&handler_ctx, lane, &handler_job).await }).await;
        let result = match joined {
            Ok(Ok(output)) => Ok(output),
            Ok(Err(e)) => Err(e.to_string()),
            Err(e) => Err(format!("Unhandled worker exception: {}", panic_message(e))),
        };

        let parent = match job.parent_job_id {
            Some(parent_id) => {
                let config = RetryConfig::new("parent_lookup").with_max_retries(5);
                match retry_async(&config, StoreError::is_busy, || ctx.store.get(parent_id))
                    .await
                    .into_result()
                {
                    Ok(p) => ParentLookup::Found(p.job_type),
                    Err(e) => {
                        logger.log_warning(&format!("parent {} lookup failed: {}", parent_id, e));
                        ParentLookup::Unavailable
                    }
                }
            }
            None => ParentLookup::NoParent,
        };

        let outcome = terminal_outcome(lane, &job, parent, result);
        let status = outcome.write.status;
        if let Some(message) = &outcome.write.error_message {
            logger.log_error(message);
        }

        let config = RetryConfig::new("apply_write").with_max_retries(5);
        let written = retry_async(&config, StoreError::is_busy, || {
            ctx.store
                .apply_write(job.id, lane.processing_status(), &outcome.write)
        })
        .await
        .into_result();

        match written {
            Ok(true) => {}
            Ok(false) => {
                logger.log_warning("job left its processing status, result dropped");
                metrics::record_write_back_dropped();
                return;
            }
            Err(e) => {
                logger.log_error(&format!("failed to write terminal status: {}", e));
                return;
            }
        }

        if let Some((parent, result_ref)) = &outcome.complete_parent {
            match ctx.store.complete_parent(*parent, result_ref).await {
                Ok(true) => info!(job_id = %parent, "Boomerang parent completed with {}", result_ref),
                Ok(false) => debug!(job_id = %parent, "Boomerang parent was not stitching"),
                Err(e) => logger.log_error(&format!("failed to complete parent {}: {}", parent, e)),
            }
        }

        metrics::record_job_finished(
            job.job_type.as_str(),
            status.as_str(),
            started.elapsed().as_secs_f64(),
        );
        if status != JobStatus::Failed {
            logger.log_completion(&format!("-> {}", status));
        }
    }

    /// Wait for all in-flight jobs to complete.
    async fn wait_for_jobs(&self) {
        loop {
            let available = self.job_semaphore.available_permits();
            if available == self.ctx.config.max_concurrent_jobs {
                break;
            }
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
    }
}

fn panic_message(err: JoinError) -> String {
    if !err.is_panic() {
        return err.to_string();
    }
    let payload = err.into_panic();
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "panic".to_string()
    }
}
