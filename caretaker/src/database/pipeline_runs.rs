use anyhow::Result;
use sqlx::sqlite::SqliteRow;
use sqlx::Row;
use tracing::{debug, error};

use super::records::PipelineRunRecord;
use super::Database;

impl Database {
    pub async fn store_pipeline_run(&self, record: &PipelineRunRecord) -> Result<()> {
        debug!("Storing pipeline run {} ({})", record.id, record.state);

        let result = sqlx::query(
            r#"
            INSERT OR REPLACE INTO pipeline_runs (
                id, pipeline, trigger_kind, git_ref, state, blocked_stage,
                started_at, completed_at, run_json
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&record.id)
        .bind(&record.pipeline)
        .bind(&record.trigger_kind)
        .bind(&record.git_ref)
        .bind(&record.state)
        .bind(&record.blocked_stage)
        .bind(record.started_at)
        .bind(record.completed_at)
        .bind(&record.run_json)
        .execute(&self.pool)
        .await;

        if let Err(e) = result {
            error!("Failed to store pipeline run {}: {}", record.id, e);
            return Err(e.into());
        }
        Ok(())
    }

    pub async fn get_pipeline_run(&self, run_id: &str) -> Result<Option<PipelineRunRecord>> {
        let row = sqlx::query(
            r#"
            SELECT id, pipeline, trigger_kind, git_ref, state, blocked_stage,
                   started_at, completed_at, run_json
            FROM pipeline_runs
            WHERE id = ?
            "#,
        )
        .bind(run_id)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(pipeline_run_from_row).transpose()
    }

    pub async fn get_pipeline_runs(
        &self,
        pipeline: &str,
        limit: i64,
    ) -> Result<Vec<PipelineRunRecord>> {
        let rows = sqlx::query(
            r#"
            SELECT id, pipeline, trigger_kind, git_ref, state, blocked_stage,
                   started_at, completed_at, run_json
            FROM pipeline_runs
            WHERE pipeline = ?
            ORDER BY started_at DESC
            LIMIT ?
            "#,
        )
        .bind(pipeline)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(pipeline_run_from_row).collect()
    }
}

fn pipeline_run_from_row(row: &SqliteRow) -> Result<PipelineRunRecord> {
    Ok(PipelineRunRecord {
        id: row.try_get("id")?,
        pipeline: row.try_get("pipeline")?,
        trigger_kind: row.try_get("trigger_kind")?,
        git_ref: row.try_get("git_ref")?,
        state: row.try_get("state")?,
        blocked_stage: row.try_get("blocked_stage")?,
        started_at: row.try_get("started_at")?,
        completed_at: row.try_get("completed_at")?,
        run_json: row.try_get("run_json")?,
    })
}
