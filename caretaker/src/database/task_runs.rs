use anyhow::Result;
use sqlx::sqlite::SqliteRow;
use sqlx::Row;
use tracing::{debug, error};

use super::records::TaskRunRecord;
use super::Database;

impl Database {
    /// Inserts or replaces the row with the record's id
    pub async fn store_task_run(&self, record: &TaskRunRecord) -> Result<()> {
        debug!("Storing task run {} ({})", record.id, record.status);

        let result = sqlx::query(
            r#"
            INSERT OR REPLACE INTO task_runs (
                id, task_id, task_kind, trigger, status, attempts,
                started_at, completed_at, error_message, report
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&record.id)
        .bind(&record.task_id)
        .bind(&record.task_kind)
        .bind(&record.trigger)
        .bind(&record.status)
        .bind(record.attempts)
        .bind(record.started_at)
        .bind(record.completed_at)
        .bind(&record.error_message)
        .bind(&record.report)
        .execute(&self.pool)
        .await;

        if let Err(e) = result {
            error!("Failed to store task run {}: {}", record.id, e);
            return Err(e.into());
        }
        Ok(())
    }

    /// Newest first, optionally filtered to one task
    pub async fn get_task_runs(
        &self,
        task_id: Option<&str>,
        limit: i64,
    ) -> Result<Vec<TaskRunRecord>> {
        let rows = match task_id {
            Some(task_id) => {
                sqlx::query(
                    r#"
                    SELECT id, task_id, task_kind, trigger, status, attempts,
                           started_at, completed_at, error_message, report
                    FROM task_runs
                    WHERE task_id = ?
                    ORDER BY started_at DESC
                    LIMIT ?
                    "#,
                )
                .bind(task_id)
                .bind(limit)
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query(
                    r#"
                    SELECT id, task_id, task_kind, trigger, status, attempts,
                           started_at, completed_at, error_message, report
                    FROM task_runs
                    ORDER BY started_at DESC
                    LIMIT ?
                    "#,
                )
                .bind(limit)
                .fetch_all(&self.pool)
                .await?
            }
        };

        rows.iter().map(task_run_from_row).collect()
    }

    pub async fn get_task_run(&self, run_id: &str) -> Result<Option<TaskRunRecord>> {
        let row = sqlx::query(
            r#"
            SELECT id, task_id, task_kind, trigger, status, attempts,
                   started_at, completed_at, error_message, report
            FROM task_runs
            WHERE id = ?
            "#,
        )
        .bind(run_id)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(task_run_from_row).transpose()
    }
}

fn task_run_from_row(row: &SqliteRow) -> Result<TaskRunRecord> {
    Ok(TaskRunRecord {
        id: row.try_get("id")?,
        task_id: row.try_get("task_id")?,
        task_kind: row.try_get("task_kind")?,
        trigger: row.try_get("trigger")?,
        status: row.try_get("status")?,
        attempts: row.try_get("attempts")?,
        started_at: row.try_get("started_at")?,
        completed_at: row.try_get("completed_at")?,
        error_message: row.try_get("error_message")?,
        report: row.try_get("report")?,
    })
}
