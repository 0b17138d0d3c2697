//! Memory trait: knowledge chunk storage with keyword search.
//!
//! The knowledge base splits ingested documents into overlapping chunks and
//! stores them through a [`MemoryBackend`]. Recall is a keyword search over
//! chunk text; the best-matching chunks come back with their source path.

use crate::error::MemoryError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One stored slice of an ingested document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KnowledgeChunk {
    /// Unique ID for this chunk
    pub id: String,

    /// The chunk text
    pub content: String,

    /// Path of the document the chunk came from
    pub source: String,

    /// Position of the chunk within its document
    pub chunk_index: usize,

    /// When this chunk was stored
    pub created_at: DateTime<Utc>,

    /// Relevance score (set by search operations)
    #[serde(default)]
    pub score: f32,
}

/// A query for searching knowledge chunks.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryQuery {
    /// The search text
    pub text: String,

    /// Maximum number of results
    #[serde(default = "default_limit")]
    pub limit: usize,
}

fn default_limit() -> usize {
    3
}

impl MemoryQuery {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            limit: default_limit(),
        }
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }
}

/// Lowercased alphanumeric terms of a query, used by every backend.
pub fn query_terms(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(|t| t.to_lowercase())
        .collect()
}

/// The core MemoryBackend trait.
///
/// Implementations: SQLite (FTS5) and in-memory (for testing).
#[async_trait]
pub trait MemoryBackend: Send + Sync {
    /// The backend name (e.g., "sqlite", "in_memory").
    fn name(&self) -> &str;

    /// Store a chunk, returning its ID.
    async fn store(&self, chunk: KnowledgeChunk) -> std::result::Result<String, MemoryError>;

    /// Search chunks by query, best match first.
    async fn search(
        &self,
        query: MemoryQuery,
    ) -> std::result::Result<Vec<KnowledgeChunk>, MemoryError>;

    /// Delete every chunk that came from `source`. Returns how many were removed.
    async fn delete_source(&self, source: &str) -> std::result::Result<usize, MemoryError>;

    /// Get total chunk count.
    async fn count(&self) -> std::result::Result<usize, MemoryError>;

    /// Clear all chunks.
    async fn clear(&self) -> std::result::Result<(), MemoryError>;
}
