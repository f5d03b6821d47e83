//! MediaForge job worker.
//!
//! This crate provides:
//! - The job executor: scheduler loop, claims and terminal writes
//! - Handlers for every job type and the keying pass
//! - The dependency resolver for boomerang fan-out and analysis fan-in
//! - The background FFmpeg watchdog
//! - Graceful shutdown

pub mod config;
pub mod context;
pub mod error;
pub mod executor;
pub mod handlers;
pub mod logging;
pub mod metrics;
pub mod outcome;
pub mod resolver;
pub mod retry;

pub use config::{StorageBackend, WorkerConfig};
pub use context::WorkerContext;
pub use error::{WorkerError, WorkerResult};
pub use executor::JobExecutor;
pub use handlers::{dispatch, HandlerOutput};
pub use logging::JobLogger;
pub use outcome::{terminal_outcome, Outcome, ParentLookup};
pub use resolver::{DependencyResolver, ResolverReport};
pub use retry::{retry_async, FailureTracker, RetryConfig, RetryResult};
