//! Document ingestion and recall on top of a [`MemoryBackend`].
//!
//! Ingestion reads a text file, splits it into overlapping character windows
//! and stores each window as a chunk tagged with the file path. Re-ingesting
//! a path replaces its previous chunks.

use chrono::Utc;
use orchestrator_core::error::MemoryError;
use orchestrator_core::memory::{KnowledgeChunk, MemoryBackend, MemoryQuery};
use std::path::Path;
use std::sync::Arc;
use tracing::info;

/// Extensions the knowledge base can ingest.
pub const SUPPORTED_EXTENSIONS: &[&str] = &["txt", "md"];

pub const NO_RESULTS: &str = "No relevant information found in knowledge base.";

#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    #[error("File '{0}' not found.")]
    NotFound(String),

    #[error("Unsupported file type for '{0}'")]
    Unsupported(String),

    #[error("Failed to read '{path}': {reason}")]
    Read { path: String, reason: String },

    #[error(transparent)]
    Memory(#[from] MemoryError),
}

pub struct KnowledgeBase {
    backend: Arc<dyn MemoryBackend>,
    chunk_size: usize,
    chunk_overlap: usize,
}

impl KnowledgeBase {
    pub fn new(backend: Arc<dyn MemoryBackend>) -> Self {
        Self {
            backend,
            chunk_size: 1000,
            chunk_overlap: 200,
        }
    }

    /// Set the window size and overlap, in characters. Overlap is clamped below size.
    pub fn with_chunking(mut self, chunk_size: usize, chunk_overlap: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self.chunk_overlap = chunk_overlap.min(self.chunk_size - 1);
        self
    }

    pub fn backend_name(&self) -> &str {
        self.backend.name()
    }

    /// Ingest a `.txt` or `.md` file. Returns the number of chunks stored.
    pub async fn add_document(&self, path: &Path) -> Result<usize, IngestError> {
        let source = path.display().to_string();
        if !path.exists() {
            return Err(IngestError::NotFound(source));
        }

        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_lowercase)
            .unwrap_or_default();
        if !SUPPORTED_EXTENSIONS.contains(&ext.as_str()) {
            return Err(IngestError::Unsupported(source));
        }

        let text = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| IngestError::Read {
                path: source.clone(),
                reason: e.to_string(),
            })?;

        self.backend.delete_source(&source).await?;

        let pieces = split_text(&text, self.chunk_size, self.chunk_overlap);
        let now = Utc::now();
        for (chunk_index, content) in pieces.iter().enumerate() {
            self.backend
                .store(KnowledgeChunk {
                    id: String::new(),
                    content: content.clone(),
                    source: source.clone(),
                    chunk_index,
                    created_at: now,
                    score: 0.0,
                })
                .await?;
        }

        info!(source = %source, chunks = pieces.len(), "Document added to knowledge base");
        Ok(pieces.len())
    }

    /// Best-matching chunks for `text`.
    pub async fn query(&self, text: &str, n_results: usize) -> Result<Vec<KnowledgeChunk>, MemoryError> {
        self.backend
            .search(MemoryQuery::new(text).with_limit(n_results))
            .await
    }

    /// `[Source: path]` blocks separated by blank lines, or [`NO_RESULTS`].
    pub async fn recall(&self, text: &str, n_results: usize) -> Result<String, MemoryError> {
        let chunks = self.query(text, n_results).await?;
        Ok(format_results(&chunks))
    }

    pub async fn count(&self) -> Result<usize, MemoryError> {
        self.backend.count().await
    }

    pub async fn clear(&self) -> Result<(), MemoryError> {
        self.backend.clear().await
    }
}

pub fn format_results(chunks: &[KnowledgeChunk]) -> String {
    if chunks.is_empty() {
        return NO_RESULTS.to_string();
    }
    chunks
        .iter()
        .map(|c| format!("[Source: {}]\n{}", c.source, c.content))
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Split text into windows of at most `size` characters overlapping by `overlap`.
///
/// A window prefers to end just after a newline, then after a space, as long
/// as that keeps it at least half full. Blank windows are dropped.
pub fn split_text(text: &str, size: usize, overlap: usize) -> Vec<String> {
    let chars: Vec<char> = text.chars().collect();
    let len = chars.len();
    let size = size.max(1);
    let overlap = overlap.min(size - 1);

    let mut out = Vec::new();
    let mut start = 0;
    while start < len {
        let hard_end = (start + size).min(len);
        let end = if hard_end < len {
            find_break(&chars, start + size / 2, hard_end).unwrap_or(hard_end)
        } else {
            hard_end
        };

        let piece: String = chars[start..end].iter().collect();
        let trimmed = piece.trim();
        if !trimmed.is_empty() {
            out.push(trimmed.to_string());
        }

        if end >= len {
            break;
        }
        let next = end.saturating_sub(overlap);
        start = if next > start { next } else { end };
    }
    out
}

fn find_break(chars: &[char], lo: usize, hi: usize) -> Option<usize> {
    if lo >= hi {
        return None;
    }
    let window = &chars[lo..hi];
    window
        .iter()
        .rposition(|&c| c == '\n')
        .or_else(|| window.iter().rposition(|c| c.is_whitespace()))
        .map(|i| lo + i + 1)
}
