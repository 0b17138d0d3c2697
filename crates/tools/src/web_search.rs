//! Web search tool: placeholder that echoes the query back.
//!
//! No search backend is wired in. The output tells the model this plainly
//! so it doesn't treat the text as real results.

use async_trait::async_trait;
use orchestrator_core::error::ToolError;
use orchestrator_core::tool::Tool;

pub struct WebSearchTool;

const DEFAULT_RESULTS: u64 = 5;

#[async_trait]
impl Tool for WebSearchTool {
    fn name(&self) -> &str {
        "web_search"
    }

    fn display_name(&self) -> &str {
        "Web Search"
    }

    fn description(&self) -> &str {
        "Searches the web for information and returns relevant results"
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
                    "description": "The search query"
                },
                "num_results": {
                    "type": "integer",
                    "description": "Number of results to return (default: 5)",
                    "default": DEFAULT_RESULTS
                }
            },
            "required": ["query"]
        })
    }

    async fn execute(&self, arguments: serde_json::Value) -> Result<String, ToolError> {
        let query = arguments["query"]
            .as_str()
            .ok_or_else(|| ToolError::InvalidArguments("Missing 'query' argument".into()))?;
        let num_results = arguments["num_results"].as_u64().unwrap_or(DEFAULT_RESULTS);

        Ok(format!(
            "Web Search Results for: \"{query}\"\n\n\
             [This is a placeholder implementation]\n\n\
             No search provider is configured, so no live results are available.\n\n\
             Requested {num_results} results."
        ))
    }
}
