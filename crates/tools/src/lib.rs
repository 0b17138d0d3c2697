//! Built-in tool implementations for Orchestrator.
//!
//! Tools are registered explicitly by [`default_catalog`]; there is no
//! runtime discovery.

pub mod calculator;
pub mod file_io;
pub mod knowledge;
pub mod web_search;

use orchestrator_config::AppConfig;
use orchestrator_core::tool::ToolRegistry;
use orchestrator_memory::KnowledgeBase;
use std::sync::Arc;

pub use calculator::CalculatorTool;
pub use file_io::FileIoTool;
pub use knowledge::{RecallMemoryTool, RememberFileTool};
pub use web_search::WebSearchTool;

/// Build the registry of every built-in tool.
///
/// Creates the file tool's sandbox directory if it doesn't exist.
pub fn default_catalog(
    config: &AppConfig,
    kb: Arc<KnowledgeBase>,
) -> std::io::Result<ToolRegistry> {
    let mut registry = ToolRegistry::new();
    registry.register(Box::new(CalculatorTool));
    registry.register(Box::new(WebSearchTool));
    registry.register(Box::new(FileIoTool::new(&config.tools.files_dir)?));
    registry.register(Box::new(RememberFileTool::new(kb.clone())));
    registry.register(Box::new(RecallMemoryTool::new(
        kb,
        config.knowledge.default_results,
    )));
    Ok(registry)
}

#[cfg(test)]
mod tests {
    use super::*;
    use orchestrator_memory::InMemoryBackend;

    #[test]
    fn catalog_has_all_tools() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = AppConfig::default();
        config.tools.files_dir = dir.path().join("files");

        let kb = Arc::new(KnowledgeBase::new(Arc::new(InMemoryBackend::new())));
        let registry = default_catalog(&config, kb).unwrap();
        assert_eq!(
            registry.names(),
            vec![
                "calculator",
                "file_io",
                "recall_memory",
                "remember_file",
                "web_search"
            ]
        );
        assert!(config.tools.files_dir.is_dir());
    }
}
