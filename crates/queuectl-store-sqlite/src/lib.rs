//! SQLite implementation of the queuectl [`JobStore`] trait.
//!
//! This is a single-file, embedded-database implementation of the durable job
//! store: everything a deployment needs lives in one `.db` file, no separate
//! database server to run alongside it.
//!
//! # Features
//!
//! - Atomic claim via `BEGIN IMMEDIATE` (SQLite's writer-serialization equivalent of
//!   `FOR UPDATE SKIP LOCKED`)
//! - Exponential backoff retry logic (delegated to `queuectl-core`'s scheduler policy)
//! - Dead letter queue for permanently failed jobs
//! - Stale-lock reclamation for crashed workers
//! - Conditional `update` keyed on the claiming worker's id
//!
//! # Database Schema
//!
//! ```sql
//! CREATE TABLE jobs (
//!     id              TEXT PRIMARY KEY,
//!     command         TEXT NOT NULL,
//!     state           TEXT NOT NULL,
//!     attempts        INTEGER NOT NULL,
//!     max_retries     INTEGER NOT NULL,
//!     created_at      TEXT NOT NULL,
//!     updated_at      TEXT NOT NULL,
//!     locked_by       TEXT,
//!     locked_at       TEXT,
//!     next_retry_at   TEXT,
//!     run_at          TEXT,
//!     timeout         INTEGER,
//!     output          TEXT
//! );
//!
//! CREATE INDEX idx_jobs_state ON jobs(state);
//! CREATE INDEX idx_jobs_next_retry ON jobs(next_retry_at);
//! CREATE INDEX idx_jobs_run_at ON jobs(run_at);
//! ```
//!
//! # Usage
//!
//! ```rust,ignore
//! use queuectl_store_sqlite::SqliteJobStore;
//!
//! let store = SqliteJobStore::connect("sqlite://jobs.db", 300).await?;
//! ```

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use queuectl_core::{Job, JobState, JobStore, QueueError, Result};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Row, SqlitePool};
use std::str::FromStr;
use tracing::warn;

/// SQLite-backed job store.
#[derive(Clone)]
pub struct SqliteJobStore {
    pool: SqlitePool,
    stale_lock_seconds: i64,
}

impl SqliteJobStore {
    /// Open (creating if needed) the database at `url` (e.g. `sqlite://jobs.db`,
    /// or `sqlite::memory:` for tests) and run the schema migration.
    pub async fn connect(url: &str, stale_lock_seconds: i64) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(url)
            .map_err(|e| QueueError::Storage(e.into()))?
            .create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await
            .map_err(|e| QueueError::Storage(e.into()))?;

        let store = Self {
            pool,
            stale_lock_seconds,
        };
        store.migrate().await?;
        Ok(store)
    }

    /// Wrap an already-open pool (e.g. shared with other subsystems in an embedding
    /// application). Does not run migrations; call [`SqliteJobStore::migrate`]
    /// yourself if the schema may not exist yet.
    pub fn from_pool(pool: SqlitePool, stale_lock_seconds: i64) -> Self {
        Self {
            pool,
            stale_lock_seconds,
        }
    }

    pub async fn migrate(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS jobs (
                id              TEXT PRIMARY KEY,
                command         TEXT NOT NULL,
                state           TEXT NOT NULL,
                attempts        INTEGER NOT NULL,
                max_retries     INTEGER NOT NULL,
                created_at      TEXT NOT NULL,
                updated_at      TEXT NOT NULL,
                locked_by       TEXT,
                locked_at       TEXT,
                next_retry_at   TEXT,
                run_at          TEXT,
                timeout         INTEGER,
                output          TEXT
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| QueueError::Storage(e.into()))?;

        for stmt in [
            "CREATE INDEX IF NOT EXISTS idx_jobs_state ON jobs(state)",
            "CREATE INDEX IF NOT EXISTS idx_jobs_next_retry ON jobs(next_retry_at)",
            "CREATE INDEX IF NOT EXISTS idx_jobs_run_at ON jobs(run_at)",
        ] {
            sqlx::query(stmt)
                .execute(&self.pool)
                .await
                .map_err(|e| QueueError::Storage(e.into()))?;
        }
        Ok(())
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

#[async_trait]
impl JobStore for SqliteJobStore {
    async fn add(&self, job: Job) -> Result<()> {
        let result = sqlx::query(
            r#"
            INSERT INTO jobs (
                id, command, state, attempts, max_retries,
                created_at, updated_at, locked_by, locked_at,
                next_retry_at, run_at, timeout, output
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)
            "#,
        )
        .bind(&job.id)
        .bind(&job.command)
        .bind(job.state.as_str())
        .bind(job.attempts)
        .bind(job.max_retries)
        .bind(job.created_at.to_rfc3339())
        .bind(job.updated_at.to_rfc3339())
        .bind(&job.locked_by)
        .bind(job.locked_at.map(|t| t.to_rfc3339()))
        .bind(job.next_retry_at.map(|t| t.to_rfc3339()))
        .bind(job.run_at.map(|t| t.to_rfc3339()))
        .bind(job.timeout)
        .bind(&job.output)
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(()),
            Err(sqlx::Error::Database(db_err)) if db_err.is_unique_violation() => {
                Err(QueueError::AlreadyExists(job.id))
            }
            Err(e) => Err(QueueError::Storage(e.into())),
        }
    }

    /// Atomically selects and locks one eligible job inside a `BEGIN IMMEDIATE`
    /// transaction. Storage errors are swallowed into `Ok(None)`: a worker treats
    /// "couldn't claim" the same whether that's because nothing is eligible or
    /// because the store hiccuped.
    async fn claim(&self, worker_id: &str, now: DateTime<Utc>) -> Result<Option<Job>> {
        let mut conn = match self.pool.acquire().await {
            Ok(conn) => conn,
            Err(e) => {
                warn!(error = %e, "claim: failed to acquire connection");
                return Ok(None);
            }
        };

        let outcome: std::result::Result<Option<Job>, sqlx::Error> = async {
            sqlx::query("BEGIN IMMEDIATE").execute(&mut *conn).await?;

            let stale_cutoff = now - chrono::Duration::seconds(self.stale_lock_seconds);
            let candidate = sqlx::query(
                r#"
                SELECT id FROM jobs
                WHERE (state = 'pending' OR state = 'failed')
                  AND (locked_by IS NULL OR locked_at < ?1)
                  AND (next_retry_at IS NULL OR next_retry_at <= ?2)
                  AND (run_at IS NULL OR run_at <= ?2)
                ORDER BY
                    CASE state WHEN 'pending' THEN 0 WHEN 'failed' THEN 1 END,
                    created_at ASC
                LIMIT 1
                "#,
            )
            .bind(stale_cutoff.to_rfc3339())
            .bind(now.to_rfc3339())
            .fetch_optional(&mut *conn)
            .await?;

            let Some(candidate) = candidate else {
                sqlx::query("COMMIT").execute(&mut *conn).await?;
                return Ok(None);
            };
            let id: String = candidate.get("id");

            sqlx::query(
                "UPDATE jobs SET state = 'processing', locked_by = ?1, locked_at = ?2, updated_at = ?2 WHERE id = ?3",
            )
            .bind(worker_id)
            .bind(now.to_rfc3339())
            .bind(&id)
            .execute(&mut *conn)
            .await?;

            let row = sqlx::query("SELECT * FROM jobs WHERE id = ?1")
                .bind(&id)
                .fetch_one(&mut *conn)
                .await?;

            sqlx::query("COMMIT").execute(&mut *conn).await?;
            Ok(Some(row_to_job(&row)))
        }
        .await;

        match outcome {
            Ok(job) => Ok(job),
            Err(e) => {
                let _ = sqlx::query("ROLLBACK").execute(&mut *conn).await;
                warn!(error = %e, "claim: storage error, treating as no job");
                Ok(None)
            }
        }
    }

    async fn update(&self, claimed_by: &str, job: &Job) -> Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE jobs
            SET state = ?1,
                attempts = ?2,
                updated_at = ?3,
                locked_by = NULL,
                locked_at = NULL,
                next_retry_at = ?4,
                output = ?5
            WHERE id = ?6 AND locked_by = ?7
            "#,
        )
        .bind(job.state.as_str())
        .bind(job.attempts)
        .bind(job.updated_at.to_rfc3339())
        .bind(job.next_retry_at.map(|t| t.to_rfc3339()))
        .bind(&job.output)
        .bind(&job.id)
        .bind(claimed_by)
        .execute(&self.pool)
        .await
        .map_err(|e| QueueError::Storage(e.into()))?;

        if result.rows_affected() == 0 {
            warn!(
                job_id = %job.id,
                claimed_by,
                "update: lock no longer held by this worker, dropping write"
            );
        }
        Ok(())
    }

    async fn list(&self, state: Option<JobState>) -> Result<Vec<Job>> {
        let rows = match state {
            Some(state) => sqlx::query("SELECT * FROM jobs WHERE state = ?1")
                .bind(state.as_str())
                .fetch_all(&self.pool)
                .await,
            None => sqlx::query("SELECT * FROM jobs").fetch_all(&self.pool).await,
        }
        .map_err(|e| QueueError::Storage(e.into()))?;

        Ok(rows.iter().map(row_to_job).collect())
    }

    async fn stats(&self) -> Result<Vec<(JobState, i64)>> {
        let rows = sqlx::query("SELECT state, COUNT(*) as count FROM jobs GROUP BY state")
            .fetch_all(&self.pool)
            .await
            .map_err(|e| QueueError::Storage(e.into()))?;

        Ok(rows
            .iter()
            .filter_map(|row| {
                let state: String = row.get("state");
                let count: i64 = row.get("count");
                JobState::parse(&state).map(|s| (s, count))
            })
            .collect())
    }

    async fn requeue(&self, id: &str, now: DateTime<Utc>) -> Result<()> {
        let existing = sqlx::query("SELECT state FROM jobs WHERE id = ?1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| QueueError::Storage(e.into()))?
            .ok_or_else(|| QueueError::NotFound(id.to_string()))?;

        let state: String = existing.get("state");
        if state != JobState::Dead.as_str() {
            return Err(QueueError::InvalidState {
                id: id.to_string(),
                state,
            });
        }

        sqlx::query(
            r#"
            UPDATE jobs
            SET state = 'pending',
                attempts = 0,
                locked_by = NULL,
                locked_at = NULL,
                next_retry_at = NULL,
                updated_at = ?2
            WHERE id = ?1
            "#,
        )
        .bind(id)
        .bind(now.to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(|e| QueueError::Storage(e.into()))?;

        Ok(())
    }
}

fn row_to_job(row: &sqlx::sqlite::SqliteRow) -> Job {
    let state_str: String = row.get("state");
    Job {
        id: row.get("id"),
        command: row.get("command"),
        state: JobState::parse(&state_str).unwrap_or(JobState::Pending),
        attempts: row.get("attempts"),
        max_retries: row.get("max_retries"),
        created_at: parse_ts(row.get::<String, _>("created_at")),
        updated_at: parse_ts(row.get::<String, _>("updated_at")),
        locked_by: row.get("locked_by"),
        locked_at: row.get::<Option<String>, _>("locked_at").map(parse_ts),
        next_retry_at: row.get::<Option<String>, _>("next_retry_at").map(parse_ts),
        run_at: row.get::<Option<String>, _>("run_at").map(parse_ts),
        timeout: row.get("timeout"),
        output: row.get("output"),
    }
}

fn parse_ts(s: String) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(&s)
        .map(|t| t.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}
