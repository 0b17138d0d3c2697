//! Knowledge tools: `remember_file` ingests documents, `recall_memory` searches them.
//!
//! Both share one [`KnowledgeBase`] built at startup.

use async_trait::async_trait;
use orchestrator_core::error::ToolError;
use orchestrator_core::tool::Tool;
use orchestrator_memory::KnowledgeBase;
use std::path::Path;
use std::sync::Arc;

pub struct RememberFileTool {
    kb: Arc<KnowledgeBase>,
}

impl RememberFileTool {
    pub fn new(kb: Arc<KnowledgeBase>) -> Self {
        Self { kb }
    }
}

#[async_trait]
impl Tool for RememberFileTool {
    fn name(&self) -> &str {
        "remember_file"
    }

    fn display_name(&self) -> &str {
        "Remember File"
    }

    fn description(&self) -> &str {
        "Reads a file (TXT, MD) and stores its content in your long-term memory."
    }

    fn icon(&self) -> &str {
        "IconDatabase"
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "file_path": {
                    "type": "string",
                    "description": "Absolute path to the file to remember"
                }
            },
            "required": ["file_path"]
        })
    }

    async fn execute(&self, arguments: serde_json::Value) -> Result<String, ToolError> {
        let file_path = arguments["file_path"]
            .as_str()
            .ok_or_else(|| ToolError::InvalidArguments("Missing 'file_path' argument".into()))?;

        Ok(match self.kb.add_document(Path::new(file_path)).await {
            Ok(chunks) => format!(
                "Successfully added '{file_path}' to knowledge base. Created {chunks} chunks."
            ),
            Err(e) => format!("Error: {e}"),
        })
    }
}

pub struct RecallMemoryTool {
    kb: Arc<KnowledgeBase>,
    default_results: usize,
}

impl RecallMemoryTool {
    pub fn new(kb: Arc<KnowledgeBase>, default_results: usize) -> Self {
        Self {
            kb,
            default_results,
        }
    }
}

#[async_trait]
impl Tool for RecallMemoryTool {
    fn name(&self) -> &str {
        "recall_memory"
    }

    fn display_name(&self) -> &str {
        "Recall Memory"
    }

    fn description(&self) -> &str {
        "Searches your long-term memory (knowledge base) for information."
    }

    fn icon(&self) -> &str {
        "IconSearch"
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "query": {
                    "type": "string",
                    "description": "The question or topic to search for"
                }
            },
            "required": ["query"]
        })
    }

    async fn execute(&self, arguments: serde_json::Value) -> Result<String, ToolError> {
        let query = arguments["query"]
            .as_str()
            .ok_or_else(|| ToolError::InvalidArguments("Missing 'query' argument".into()))?;

        self.kb
            .recall(query, self.default_results)
            .await
            .map_err(|e| ToolError::ExecutionFailed {
                tool_name: "recall_memory".into(),
                reason: e.to_string(),
            })
    }
}
