//! In-memory backend: useful for testing and ephemeral sessions.

use async_trait::async_trait;
use orchestrator_core::error::MemoryError;
use orchestrator_core::memory::{KnowledgeChunk, MemoryBackend, MemoryQuery, query_terms};
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

/// Stores chunks in a Vec and ranks them by query-term occurrences.
pub struct InMemoryBackend {
    chunks: Arc<RwLock<Vec<KnowledgeChunk>>>,
}

impl InMemoryBackend {
    pub fn new() -> Self {
        Self {
            chunks: Arc::new(RwLock::new(Vec::new())),
        }
    }
}

impl Default for InMemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

fn keyword_score(content: &str, terms: &[String]) -> f32 {
    let lower = content.to_lowercase();
    let hits: usize = terms.iter().map(|t| lower.matches(t.as_str()).count()).sum();
    hits as f32 / (content.len() as f32 / 100.0).max(1.0)
}

#[async_trait]
impl MemoryBackend for InMemoryBackend {
    fn name(&self) -> &str {
        "in_memory"
    }

    async fn store(&self, mut chunk: KnowledgeChunk) -> Result<String, MemoryError> {
        if chunk.id.is_empty() {
            chunk.id = Uuid::new_v4().to_string();
        }
        let id = chunk.id.clone();
        self.chunks.write().await.push(chunk);
        Ok(id)
    }

    async fn search(&self, query: MemoryQuery) -> Result<Vec<KnowledgeChunk>, MemoryError> {
        let terms = query_terms(&query.text);
        if terms.is_empty() {
            return Ok(Vec::new());
        }

        let chunks = self.chunks.read().await;
        let mut results: Vec<KnowledgeChunk> = chunks
            .iter()
            .filter_map(|c| {
                let score = keyword_score(&c.content, &terms);
                (score > 0.0).then(|| KnowledgeChunk {
                    score,
                    ..c.clone()
                })
            })
            .collect();

        results.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        results.truncate(query.limit);
        Ok(results)
    }

    async fn delete_source(&self, source: &str) -> Result<usize, MemoryError> {
        let mut chunks = self.chunks.write().await;
        let before = chunks.len();
        chunks.retain(|c| c.source != source);
        Ok(before - chunks.len())
    }

    async fn count(&self) -> Result<usize, MemoryError> {
        Ok(self.chunks.read().await.len())
    }

    async fn clear(&self) -> Result<(), MemoryError> {
        self.chunks.write().await.clear();
        Ok(())
    }
}
