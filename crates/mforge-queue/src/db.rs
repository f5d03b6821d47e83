//! SQLite connection pool and schema.

use std::str::FromStr;
use std::time::Duration;

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{Pool, Sqlite};

use mforge_models::JobStatus;

use crate::error::StoreResult;

/// Database connection pool type alias.
pub type DbPool = Pool<Sqlite>;

/// Default busy timeout; concurrent claimers serialize on the SQLite write lock.
const DEFAULT_BUSY_TIMEOUT_MS: u64 = 10_000;

/// Default WAL auto-checkpoint threshold in pages.
const DEFAULT_WAL_AUTOCHECKPOINT_PAGES: i32 = 1000;

/// Default connection pool size.
pub const DEFAULT_POOL_SIZE: u32 = 8;

async fn apply_per_connection_pragmas(
    conn: &mut sqlx::SqliteConnection,
) -> Result<(), sqlx::Error> {
    sqlx::query(&format!(
        "PRAGMA wal_autocheckpoint = {}",
        DEFAULT_WAL_AUTOCHECKPOINT_PAGES
    ))
    .execute(&mut *conn)
    .await?;

    sqlx::query("PRAGMA temp_store = MEMORY")
        .execute(&mut *conn)
        .await?;

    Ok(())
}

/// Open a pool with WAL journaling and a busy timeout.
///
/// `database_url` is a sqlx SQLite URL such as `sqlite:jobs.db?mode=rwc`.
pub async fn init_pool(database_url: &str, max_connections: u32) -> StoreResult<DbPool> {
    let connect_options = SqliteConnectOptions::from_str(database_url)?
        .journal_mode(SqliteJournalMode::Wal)
        .synchronous(SqliteSynchronous::Normal)
        .busy_timeout(Duration::from_millis(DEFAULT_BUSY_TIMEOUT_MS))
        .create_if_missing(true);

    let pool = SqlitePoolOptions::new()
        .max_connections(max_connections.max(1))
        .acquire_timeout(Duration::from_secs(30))
        .after_connect(|conn, _meta| {
            Box::pin(async move { apply_per_connection_pragmas(&mut *conn).await })
        })
        .connect_with(connect_options)
        .await?;

    tracing::info!(
        "Job store pool initialized with WAL mode, {} max connections",
        max_connections
    );

    Ok(pool)
}

/// `CREATE TABLE` for the jobs table.
///
/// The status column is constrained to the known lifecycle states.
pub fn jobs_table_ddl() -> String {
    let statuses = JobStatus::ALL
        .iter()
        .map(|s| format!("'{}'", s.as_str()))
        .collect::<Vec<_>>()
        .join(", ");

    format!(
        r#"
        CREATE TABLE IF NOT EXISTS jobs (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            job_type TEXT NOT NULL,
            status TEXT NOT NULL CHECK (status IN ({statuses})),
            created_at INTEGER NOT NULL,
            priority INTEGER NOT NULL DEFAULT 0,
            prompt TEXT,
            input_params TEXT NOT NULL DEFAULT '{{}}',
            keying_settings TEXT,
            result_ref TEXT,
            keyed_result_ref TEXT,
            error_message TEXT,
            parent_job_id INTEGER
        )
        "#
    )
}

pub const INDEX_DDL: &[&str] = &[
    "CREATE INDEX IF NOT EXISTS idx_jobs_claim ON jobs (status, priority DESC, created_at, id)",
    "CREATE INDEX IF NOT EXISTS idx_jobs_parent ON jobs (parent_job_id, job_type)",
];

/// Create the schema if it does not exist yet.
pub async fn run_migrations(pool: &DbPool) -> StoreResult<()> {
    sqlx::query(&jobs_table_ddl()).execute(pool).await?;
    for ddl in INDEX_DDL {
        sqlx::query(ddl).execute(pool).await?;
    }
    Ok(())
}

/// Begin a transaction that takes the write lock up front.
///
/// Deferred transactions that read first and upgrade later can fail with
/// `SQLITE_BUSY` without consulting the busy handler.
pub async fn begin_immediate(pool: &DbPool) -> StoreResult<ImmediateTransaction> {
    let mut conn = pool.acquire().await?;
    sqlx::query("BEGIN IMMEDIATE").execute(&mut *conn).await?;
    Ok(ImmediateTransaction {
        conn,
        finished: false,
    })
}

/// Manual `BEGIN IMMEDIATE` transaction.
///
/// Dropping it without commit closes the connection, which rolls back.
pub struct ImmediateTransaction {
    conn: sqlx::pool::PoolConnection<Sqlite>,
    finished: bool,
}

impl ImmediateTransaction {
    pub async fn commit(mut self) -> StoreResult<()> {
        sqlx::query("COMMIT").execute(&mut *self.conn).await?;
        self.finished = true;
        Ok(())
    }

    pub async fn rollback(mut self) -> StoreResult<()> {
        sqlx::query("ROLLBACK").execute(&mut *self.conn).await?;
        self.finished = true;
        Ok(())
    }
}

impl std::ops::Deref for ImmediateTransaction {
    type Target = sqlx::SqliteConnection;

    fn deref(&self) -> &Self::Target {
        &self.conn
    }
}

impl std::ops::DerefMut for ImmediateTransaction {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.conn
    }
}

impl Drop for ImmediateTransaction {
    fn drop(&mut self) {
        if !self.finished {
            self.conn.close_on_drop();
        }
    }
}
