//! SQLite store.
//!
//! Three tables, created idempotently on connect:
//! - `runs`, one row per run
//! - `run_steps`, the ordered trace, deleted with its run (`ON DELETE CASCADE`)
//! - `tool_settings`, per-tool overrides
//!
//! Step content is the full JSON payload, `type` tag included.

use crate::{RunFilter, RunStats, RunSummary, Store, ToolSetting, ToolSettingUpdate};
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use orchestrator_core::error::StoreError;
use orchestrator_core::run::{Run, RunStatus, Step, StepKind};
use sqlx::sqlite::{
    SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteRow, SqliteSynchronous,
};
use sqlx::{Row, SqlitePool};
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, info};

pub struct SqliteStore {
    pool: SqlitePool,
}

/// Fixed-width UTC timestamps so that text ordering matches time ordering.
fn encode_time(t: &DateTime<Utc>) -> String {
    t.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn decode_time(column: &str, raw: &str) -> Result<DateTime<Utc>, StoreError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| StoreError::Corrupt(format!("{column} '{raw}': {e}")))
}

fn query_failed(e: sqlx::Error) -> StoreError {
    StoreError::QueryFailed(e.to_string())
}

impl SqliteStore {
    /// Open (or create) the database at `url` and ensure the schema exists.
    ///
    /// Pass `"sqlite::memory:"` for an ephemeral database.
    pub async fn new(url: &str) -> Result<Self, StoreError> {
        let options = SqliteConnectOptions::from_str(url)
            .map_err(|e| StoreError::Storage(format!("Invalid SQLite path: {e}")))?
            .create_if_missing(true)
            .foreign_keys(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal);

        // Every connection to `:memory:` opens its own database.
        let in_memory = url.contains(":memory:");
        let pool = SqlitePoolOptions::new()
            .max_connections(if in_memory { 1 } else { 4 })
            .idle_timeout(if in_memory { None } else { Some(Duration::from_secs(600)) })
            .max_lifetime(if in_memory { None } else { Some(Duration::from_secs(1800)) })
            .connect_with(options)
            .await
            .map_err(|e| StoreError::Storage(format!("Failed to open SQLite: {e}")))?;

        let store = Self { pool };
        store.run_migrations().await?;
        info!("SQLite run store initialized at {url}");
        Ok(store)
    }

    async fn run_migrations(&self) -> Result<(), StoreError> {
        let statements = [
            (
                "runs table",
                r#"
                CREATE TABLE IF NOT EXISTS runs (
                    id            TEXT PRIMARY KEY,
                    user_query    TEXT NOT NULL,
                    status        TEXT NOT NULL DEFAULT 'running',
                    created_at    TEXT NOT NULL,
                    completed_at  TEXT
                )
                "#,
            ),
            (
                "run_steps table",
                r#"
                CREATE TABLE IF NOT EXISTS run_steps (
                    id         INTEGER PRIMARY KEY AUTOINCREMENT,
                    run_id     TEXT NOT NULL REFERENCES runs(id) ON DELETE CASCADE,
                    type       TEXT NOT NULL,
                    content    TEXT NOT NULL,
                    timestamp  TEXT NOT NULL,
                    "order"    INTEGER NOT NULL,
                    UNIQUE (run_id, "order")
                )
                "#,
            ),
            (
                "tool_settings table",
                r#"
                CREATE TABLE IF NOT EXISTS tool_settings (
                    id           TEXT PRIMARY KEY,
                    enabled      INTEGER NOT NULL DEFAULT 1,
                    description  TEXT
                )
                "#,
            ),
            (
                "runs created_at index",
                "CREATE INDEX IF NOT EXISTS idx_runs_created_at ON runs(created_at)",
            ),
        ];

        for (what, sql) in statements {
            sqlx::query(sql)
                .execute(&self.pool)
                .await
                .map_err(|e| StoreError::MigrationFailed(format!("{what}: {e}")))?;
        }

        debug!("SQLite store migrations complete");
        Ok(())
    }

    fn row_to_summary(row: &SqliteRow) -> Result<RunSummary, StoreError> {
        let id: String = row.try_get("id").map_err(query_failed)?;
        let user_query: String = row.try_get("user_query").map_err(query_failed)?;
        let status: String = row.try_get("status").map_err(query_failed)?;
        let created_at: String = row.try_get("created_at").map_err(query_failed)?;
        let completed_at: Option<String> = row.try_get("completed_at").map_err(query_failed)?;

        Ok(RunSummary {
            status: RunStatus::from_str(&status)
                .map_err(|e| StoreError::Corrupt(format!("run {id}: {e}")))?,
            created_at: decode_time("created_at", &created_at)?,
            completed_at: completed_at
                .as_deref()
                .map(|raw| decode_time("completed_at", raw))
                .transpose()?,
            id,
            user_query,
        })
    }

    fn row_to_step(run_id: &str, row: &SqliteRow) -> Result<Step, StoreError> {
        let kind: String = row.try_get("type").map_err(query_failed)?;
        let content: String = row.try_get("content").map_err(query_failed)?;
        let timestamp: String = row.try_get("timestamp").map_err(query_failed)?;
        let order: i64 = row.try_get("order").map_err(query_failed)?;

        Ok(Step {
            run_id: run_id.to_string(),
            order: u32::try_from(order)
                .map_err(|_| StoreError::Corrupt(format!("run {run_id}: step order {order}")))?,
            kind: StepKind::from_str(&kind)
                .map_err(|e| StoreError::Corrupt(format!("run {run_id}: {e}")))?,
            content: serde_json::from_str(&content)
                .map_err(|e| StoreError::Corrupt(format!("run {run_id}: step content: {e}")))?,
            timestamp: decode_time("timestamp", &timestamp)?,
        })
    }

    fn row_to_setting(row: &SqliteRow) -> Result<ToolSetting, StoreError> {
        Ok(ToolSetting {
            id: row.try_get("id").map_err(query_failed)?,
            enabled: row.try_get("enabled").map_err(query_failed)?,
            description: row.try_get("description").map_err(query_failed)?,
        })
    }
}

#[async_trait]
impl Store for SqliteStore {
    fn name(&self) -> &str {
        "sqlite"
    }

    async fn save_run(&self, run: &Run) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await.map_err(query_failed)?;

        sqlx::query(
            r#"
            INSERT INTO runs (id, user_query, status, created_at, completed_at)
            VALUES (?1, ?2, ?3, ?4, ?5)
            ON CONFLICT(id) DO UPDATE SET
                user_query = excluded.user_query,
                status = excluded.status,
                completed_at = excluded.completed_at
            "#,
        )
        .bind(&run.id)
        .bind(&run.user_query)
        .bind(run.status.as_str())
        .bind(encode_time(&run.created_at))
        .bind(run.completed_at.as_ref().map(encode_time))
        .execute(&mut *tx)
        .await
        .map_err(query_failed)?;

        sqlx::query("DELETE FROM run_steps WHERE run_id = ?1")
            .bind(&run.id)
            .execute(&mut *tx)
            .await
            .map_err(query_failed)?;

        for step in &run.steps {
            let content = serde_json::to_string(&step.content)
                .map_err(|e| StoreError::Storage(format!("step content: {e}")))?;
            sqlx::query(
                r#"
                INSERT INTO run_steps (run_id, type, content, timestamp, "order")
                VALUES (?1, ?2, ?3, ?4, ?5)
                "#,
            )
            .bind(&run.id)
            .bind(step.kind.as_str())
            .bind(content)
            .bind(encode_time(&step.timestamp))
            .bind(i64::from(step.order))
            .execute(&mut *tx)
            .await
            .map_err(query_failed)?;
        }

        tx.commit().await.map_err(query_failed)?;
        debug!(run_id = %run.id, steps = run.steps.len(), status = %run.status, "Run saved");
        Ok(())
    }

    async fn get_run(&self, id: &str) -> Result<Option<Run>, StoreError> {
        let row = sqlx::query(
            "SELECT id, user_query, status, created_at, completed_at FROM runs WHERE id = ?1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(query_failed)?;

        let Some(row) = row else {
            return Ok(None);
        };
        let summary = Self::row_to_summary(&row)?;

        let step_rows = sqlx::query(
            r#"
            SELECT type, content, timestamp, "order"
            FROM run_steps WHERE run_id = ?1
            ORDER BY "order" ASC
            "#,
        )
        .bind(id)
        .fetch_all(&self.pool)
        .await
        .map_err(query_failed)?;

        let steps = step_rows
            .iter()
            .map(|r| Self::row_to_step(id, r))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Some(Run {
            id: summary.id,
            user_query: summary.user_query,
            status: summary.status,
            created_at: summary.created_at,
            completed_at: summary.completed_at,
            steps,
        }))
    }

    async fn list_runs(&self, filter: &RunFilter) -> Result<Vec<RunSummary>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT id, user_query, status, created_at, completed_at FROM runs
            WHERE ?1 IS NULL OR status = ?1
            ORDER BY created_at DESC, id ASC
            LIMIT ?2 OFFSET ?3
            "#,
        )
        .bind(filter.status.map(|s| s.as_str()))
        .bind(i64::from(filter.limit))
        .bind(i64::from(filter.offset))
        .fetch_all(&self.pool)
        .await
        .map_err(query_failed)?;

        rows.iter().map(Self::row_to_summary).collect()
    }

    async fn delete_run(&self, id: &str) -> Result<bool, StoreError> {
        let result = sqlx::query("DELETE FROM runs WHERE id = ?1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(query_failed)?;
        Ok(result.rows_affected() > 0)
    }

    async fn run_stats(&self) -> Result<RunStats, StoreError> {
        let rows = sqlx::query("SELECT status, COUNT(*) AS n FROM runs GROUP BY status")
            .fetch_all(&self.pool)
            .await
            .map_err(query_failed)?;

        let mut stats = RunStats::default();
        for row in rows {
            let status: String = row.try_get("status").map_err(query_failed)?;
            let n: i64 = row.try_get("n").map_err(query_failed)?;
            let status = RunStatus::from_str(&status).map_err(StoreError::Corrupt)?;
            stats.add(status, n as u64);
        }
        Ok(stats)
    }

    async fn tool_settings(&self) -> Result<Vec<ToolSetting>, StoreError> {
        let rows = sqlx::query("SELECT id, enabled, description FROM tool_settings ORDER BY id")
            .fetch_all(&self.pool)
            .await
            .map_err(query_failed)?;
        rows.iter().map(Self::row_to_setting).collect()
    }

    async fn tool_setting(&self, id: &str) -> Result<Option<ToolSetting>, StoreError> {
        let row = sqlx::query("SELECT id, enabled, description FROM tool_settings WHERE id = ?1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(query_failed)?;
        row.as_ref().map(Self::row_to_setting).transpose()
    }

    async fn update_tool_setting(
        &self,
        id: &str,
        update: &ToolSettingUpdate,
    ) -> Result<ToolSetting, StoreError> {
        let mut tx = self.pool.begin().await.map_err(query_failed)?;

        let row = sqlx::query("SELECT id, enabled, description FROM tool_settings WHERE id = ?1")
            .bind(id)
            .fetch_optional(&mut *tx)
            .await
            .map_err(query_failed)?;
        let mut setting = match row {
            Some(row) => Self::row_to_setting(&row)?,
            None => ToolSetting::new(id),
        };
        setting.apply(update);

        sqlx::query(
            r#"
            INSERT INTO tool_settings (id, enabled, description) VALUES (?1, ?2, ?3)
            ON CONFLICT(id) DO UPDATE SET
                enabled = excluded.enabled,
                description = excluded.description
            "#,
        )
        .bind(&setting.id)
        .bind(setting.enabled)
        .bind(&setting.description)
        .execute(&mut *tx)
        .await
        .map_err(query_failed)?;

        tx.commit().await.map_err(query_failed)?;
        info!(tool = %id, enabled = setting.enabled, "Tool setting updated");
        Ok(setting)
    }
}
