//! SQLite persistence for run history.
//!
//! - `task_runs`: one row per task execution (retries included)
//! - `pipeline_runs`: one row per pipeline run with its stage results
//!
//! The artifact store stays the source of truth for artifacts; these tables
//! only record what happened and when.

mod pipeline_runs;
mod records;
mod task_runs;

pub use records::*;

use anyhow::Result;
use chrono::Utc;
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::{Pool, Sqlite};
use std::path::Path;
use tracing::{debug, error, info, warn};

pub struct Database {
    pool: Pool<Sqlite>,
}

impl Database {
    /// Expose pool for integration test queries
    #[allow(dead_code)]
    pub fn pool(&self) -> &Pool<Sqlite> {
        &self.pool
    }

    /// Opens (creating if needed) the database at `database_path`;
    /// `":memory:"` gives a private in-memory database
    pub async fn new(database_path: &str) -> Result<Self> {
        info!("Opening database at {}", database_path);

        let pool = if database_path == ":memory:" {
            // every pooled connection would otherwise get its own database
            SqlitePoolOptions::new()
                .max_connections(1)
                .connect("sqlite::memory:")
                .await?
        } else {
            if let Some(parent) = Path::new(database_path).parent() {
                if !parent.as_os_str().is_empty() {
                    if let Err(e) = tokio::fs::create_dir_all(parent).await {
                        error!("Failed to create database directory {:?}: {}", parent, e);
                        return Err(e.into());
                    }
                }
            }

            let database_url = format!("sqlite:{}?mode=rwc", database_path);
            match SqlitePoolOptions::new().connect(&database_url).await {
                Ok(pool) => pool,
                Err(e) => {
                    error!("Failed to connect to database {}: {}", database_url, e);
                    return Err(e.into());
                }
            }
        };

        let database = Self { pool };
        database.initialize_tables().await?;

        match database.cleanup_interrupted_runs().await {
            Ok(0) => debug!("No interrupted task runs found"),
            Ok(count) => warn!("Marked {} interrupted task runs as failed", count),
            Err(e) => warn!("Failed to clean up interrupted task runs: {}", e),
        }

        info!("Database ready");
        Ok(database)
    }

    async fn initialize_tables(&self) -> Result<()> {
        let statements = [
            (
                "task_runs table",
                r#"
                CREATE TABLE IF NOT EXISTS task_runs (
                    id TEXT PRIMARY KEY,
                    task_id TEXT NOT NULL,
                    task_kind TEXT NOT NULL,
                    trigger TEXT NOT NULL,
                    status TEXT NOT NULL,
                    attempts INTEGER NOT NULL,
                    started_at DATETIME NOT NULL,
                    completed_at DATETIME,
                    error_message TEXT,
                    report TEXT
                )
                "#,
            ),
            (
                "task_runs index",
                "CREATE INDEX IF NOT EXISTS idx_task_runs_task_started ON task_runs(task_id, started_at DESC)",
            ),
            (
                "pipeline_runs table",
                r#"
                CREATE TABLE IF NOT EXISTS pipeline_runs (
                    id TEXT PRIMARY KEY,
                    pipeline TEXT NOT NULL,
                    trigger_kind TEXT NOT NULL,
                    git_ref TEXT NOT NULL,
                    state TEXT NOT NULL,
                    blocked_stage TEXT,
                    started_at DATETIME NOT NULL,
                    completed_at DATETIME,
                    run_json TEXT NOT NULL
                )
                "#,
            ),
            (
                "pipeline_runs index",
                "CREATE INDEX IF NOT EXISTS idx_pipeline_runs_pipeline_started ON pipeline_runs(pipeline, started_at DESC)",
            ),
        ];

        for (what, sql) in statements {
            if let Err(e) = sqlx::query(sql).execute(&self.pool).await {
                error!("Failed to create {}: {}", what, e);
                return Err(e.into());
            }
            debug!("Created {}", what);
        }

        Ok(())
    }

    /// Runs still marked "running" were cut short by a restart
    async fn cleanup_interrupted_runs(&self) -> Result<u64> {
        let result = sqlx::query(
            r#"
            UPDATE task_runs
            SET status = 'failed',
                completed_at = ?,
                error_message = 'Interrupted by restart while running'
            WHERE status = 'running'
            "#,
        )
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }
}
