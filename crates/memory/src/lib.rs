//! Knowledge storage implementations for Orchestrator.

pub mod in_memory;
pub mod knowledge;
pub mod sqlite;

pub use in_memory::InMemoryBackend;
pub use knowledge::{IngestError, KnowledgeBase};
pub use sqlite::SqliteBackend;
