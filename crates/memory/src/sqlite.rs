//! SQLite backend with FTS5 full-text search.
//!
//! Uses a single SQLite database file with two tables:
//! - `knowledge_chunks` the raw chunk rows
//! - `knowledge_fts` FTS5 external-content index ranked with BM25
//!
//! Triggers keep the FTS index in sync on insert and delete.

use async_trait::async_trait;
use chrono::Utc;
use orchestrator_core::error::MemoryError;
use orchestrator_core::memory::{KnowledgeChunk, MemoryBackend, MemoryQuery, query_terms};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{Row, SqlitePool};
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, info};
use uuid::Uuid;

/// SQLite knowledge backend with FTS5 keyword search.
pub struct SqliteBackend {
    pool: SqlitePool,
}

impl SqliteBackend {
    /// Open (or create) the database at `url` and ensure the schema exists.
    ///
    /// Pass `"sqlite::memory:"` for an ephemeral database.
    pub async fn new(url: &str) -> Result<Self, MemoryError> {
        let options = SqliteConnectOptions::from_str(url)
            .map_err(|e| MemoryError::Storage(format!("Invalid SQLite path: {e}")))?
            .create_if_missing(true)
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
            .map_err(|e| MemoryError::Storage(format!("Failed to open SQLite: {e}")))?;

        let backend = Self { pool };
        backend.run_migrations().await?;
        info!("SQLite knowledge backend initialized at {url}");
        Ok(backend)
    }

    async fn run_migrations(&self) -> Result<(), MemoryError> {
        let statements = [
            (
                "knowledge_chunks table",
                r#"
                CREATE TABLE IF NOT EXISTS knowledge_chunks (
                    iid          INTEGER PRIMARY KEY AUTOINCREMENT,
                    id           TEXT UNIQUE NOT NULL,
                    content      TEXT NOT NULL,
                    source       TEXT NOT NULL,
                    chunk_index  INTEGER NOT NULL,
                    created_at   TEXT NOT NULL
                )
                "#,
            ),
            (
                "FTS5 table",
                r#"
                CREATE VIRTUAL TABLE IF NOT EXISTS knowledge_fts USING fts5(
                    content,
                    content='knowledge_chunks',
                    content_rowid='iid',
                    tokenize='porter unicode61'
                )
                "#,
            ),
            (
                "insert trigger",
                r#"
                CREATE TRIGGER IF NOT EXISTS knowledge_ai AFTER INSERT ON knowledge_chunks BEGIN
                    INSERT INTO knowledge_fts(rowid, content) VALUES (new.iid, new.content);
                END
                "#,
            ),
            (
                "delete trigger",
                r#"
                CREATE TRIGGER IF NOT EXISTS knowledge_ad AFTER DELETE ON knowledge_chunks BEGIN
                    INSERT INTO knowledge_fts(knowledge_fts, rowid, content)
                    VALUES ('delete', old.iid, old.content);
                END
                "#,
            ),
            (
                "source index",
                "CREATE INDEX IF NOT EXISTS idx_knowledge_source ON knowledge_chunks(source)",
            ),
        ];

        for (what, sql) in statements {
            sqlx::query(sql)
                .execute(&self.pool)
                .await
                .map_err(|e| MemoryError::MigrationFailed(format!("{what}: {e}")))?;
        }

        debug!("SQLite knowledge migrations complete");
        Ok(())
    }

    fn row_to_chunk(row: &sqlx::sqlite::SqliteRow) -> Result<KnowledgeChunk, MemoryError> {
        let col = |name: &str, e: sqlx::Error| MemoryError::QueryFailed(format!("{name} column: {e}"));

        let id: String = row.try_get("id").map_err(|e| col("id", e))?;
        let content: String = row.try_get("content").map_err(|e| col("content", e))?;
        let source: String = row.try_get("source").map_err(|e| col("source", e))?;
        let chunk_index: i64 = row.try_get("chunk_index").map_err(|e| col("chunk_index", e))?;
        let created_at_str: String = row.try_get("created_at").map_err(|e| col("created_at", e))?;

        let created_at = chrono::DateTime::parse_from_rfc3339(&created_at_str)
            .map(|dt| dt.with_timezone(&Utc))
            .unwrap_or_else(|_| Utc::now());

        // bm25() is negative, lower is better
        let rank: f64 = row.try_get("rank").unwrap_or(0.0);

        Ok(KnowledgeChunk {
            id,
            content,
            source,
            chunk_index: chunk_index as usize,
            created_at,
            score: (-rank) as f32,
        })
    }

    /// Build a safe FTS5 query: each term quoted with prefix matching, ORed together.
    fn sanitize_fts_query(text: &str) -> String {
        query_terms(text)
            .into_iter()
            .map(|t| format!("\"{t}\"*"))
            .collect::<Vec<_>>()
            .join(" OR ")
    }
}

#[async_trait]
impl MemoryBackend for SqliteBackend {
    fn name(&self) -> &str {
        "sqlite"
    }

    async fn store(&self, mut chunk: KnowledgeChunk) -> Result<String, MemoryError> {
        if chunk.id.is_empty() {
            chunk.id = Uuid::new_v4().to_string();
        }

        sqlx::query(
            r#"
            INSERT INTO knowledge_chunks (id, content, source, chunk_index, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5)
            "#,
        )
        .bind(&chunk.id)
        .bind(&chunk.content)
        .bind(&chunk.source)
        .bind(chunk.chunk_index as i64)
        .bind(chunk.created_at.to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(|e| MemoryError::Storage(format!("INSERT failed: {e}")))?;

        debug!(id = %chunk.id, source = %chunk.source, "Stored knowledge chunk");
        Ok(chunk.id)
    }

    async fn search(&self, query: MemoryQuery) -> Result<Vec<KnowledgeChunk>, MemoryError> {
        let fts_query = Self::sanitize_fts_query(&query.text);
        if fts_query.is_empty() {
            return Ok(Vec::new());
        }

        let rows = sqlx::query(
            r#"
            SELECT k.*, bm25(knowledge_fts) AS rank
            FROM knowledge_fts f
            JOIN knowledge_chunks k ON k.iid = f.rowid
            WHERE knowledge_fts MATCH ?1
            ORDER BY rank
            LIMIT ?2
            "#,
        )
        .bind(&fts_query)
        .bind(query.limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| MemoryError::QueryFailed(format!("FTS5 search: {e}")))?;

        rows.iter().map(Self::row_to_chunk).collect()
    }

    async fn delete_source(&self, source: &str) -> Result<usize, MemoryError> {
        let result = sqlx::query("DELETE FROM knowledge_chunks WHERE source = ?1")
            .bind(source)
            .execute(&self.pool)
            .await
            .map_err(|e| MemoryError::Storage(format!("DELETE failed: {e}")))?;

        Ok(result.rows_affected() as usize)
    }

    async fn count(&self) -> Result<usize, MemoryError> {
        let row = sqlx::query("SELECT COUNT(*) AS cnt FROM knowledge_chunks")
            .fetch_one(&self.pool)
            .await
            .map_err(|e| MemoryError::QueryFailed(format!("COUNT: {e}")))?;

        let cnt: i64 = row
            .try_get("cnt")
            .map_err(|e| MemoryError::QueryFailed(format!("cnt column: {e}")))?;

        Ok(cnt as usize)
    }

    async fn clear(&self) -> Result<(), MemoryError> {
        sqlx::query("DELETE FROM knowledge_chunks")
            .execute(&self.pool)
            .await
            .map_err(|e| MemoryError::Storage(format!("CLEAR failed: {e}")))?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn test_backend() -> SqliteBackend {
        SqliteBackend::new("sqlite::memory:").await.unwrap()
    }

    fn chunk(content: &str, source: &str, chunk_index: usize) -> KnowledgeChunk {
        KnowledgeChunk {
            id: String::new(),
            content: content.into(),
            source: source.into(),
            chunk_index,
            created_at: Utc::now(),
            score: 0.0,
        }
    }

    #[tokio::test]
    async fn fts5_keyword_search() {
        let db = test_backend().await;
        db.store(chunk("Rust has zero-cost abstractions", "rust.md", 0)).await.unwrap();
        db.store(chunk("Python has a global interpreter lock", "py.md", 0)).await.unwrap();

        let results = db.search(MemoryQuery::new("abstractions")).await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].source, "rust.md");
        assert_eq!(results[0].chunk_index, 0);
    }

    #[tokio::test]
    async fn natural_language_question_matches_any_term() {
        let db = test_backend().await;
        db.store(chunk("The borrow checker enforces aliasing rules", "notes.md", 3))
            .await
            .unwrap();

        let results = db
            .search(MemoryQuery::new("What does the borrow checker do?"))
            .await
            .unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].chunk_index, 3);
    }

    #[tokio::test]
    async fn search_respects_limit() {
        let db = test_backend().await;
        for i in 0..5 {
            db.store(chunk(&format!("tokio chunk number {i}"), "t.md", i))
                .await
                .unwrap();
        }
        let results = db.search(MemoryQuery::new("tokio").with_limit(2)).await.unwrap();
        assert_eq!(results.len(), 2);
    }

    #[tokio::test]
    async fn delete_source_removes_from_index() {
        let db = test_backend().await;
        db.store(chunk("ephemeral fact", "gone.md", 0)).await.unwrap();
        db.store(chunk("ephemeral second", "gone.md", 1)).await.unwrap();
        db.store(chunk("ephemeral keeper", "kept.md", 0)).await.unwrap();

        assert_eq!(db.delete_source("gone.md").await.unwrap(), 2);
        let results = db.search(MemoryQuery::new("ephemeral")).await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].source, "kept.md");
    }

    #[tokio::test]
    async fn clear_and_count() {
        let db = test_backend().await;
        assert_eq!(db.count().await.unwrap(), 0);
        db.store(chunk("a", "a.md", 0)).await.unwrap();
        assert_eq!(db.count().await.unwrap(), 1);
        db.clear().await.unwrap();
        assert_eq!(db.count().await.unwrap(), 0);
    }

    #[test]
    fn sanitize_fts_query_quotes_terms() {
        assert_eq!(
            SqliteBackend::sanitize_fts_query("hello \"world\" OR"),
            "\"hello\"* OR \"world\"* OR \"or\"*"
        );
        assert_eq!(SqliteBackend::sanitize_fts_query("!!"), "");
    }
}
