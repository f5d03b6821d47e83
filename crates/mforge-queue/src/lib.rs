//! Persistent job store for the MediaForge pipeline.
//!
//! Jobs live in a single SQLite `jobs` table. Claims and every multi-step
//! state change are atomic, so any number of workers can share one database.

pub mod db;
pub mod error;
pub mod row;
pub mod sqlite;
pub mod store;

pub use db::{begin_immediate, init_pool, run_migrations, DbPool, DEFAULT_POOL_SIZE};
pub use error::{StoreError, StoreResult};
pub use sqlite::SqliteJobStore;
pub use store::{JobStore, PromotionSummary, PurgeScope, SpawnOutcome};
