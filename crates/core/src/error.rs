//! Error types for the Orchestrator domain.
//!
//! Uses `thiserror` for ergonomic error definitions.
//! Each bounded context has its own error variant.
//!
//! Only [`ProviderError`] is fatal to a run. Every [`ToolError`] is folded into
//! a string the model can read on its next turn.

use thiserror::Error;

/// The top-level error type for all Orchestrator operations.
#[derive(Debug, Error)]
pub enum Error {
    // --- Provider errors ---
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    // --- Tool errors ---
    #[error("Tool error: {0}")]
    Tool(#[from] ToolError),

    // --- Knowledge storage errors ---
    #[error("Memory error: {0}")]
    Memory(#[from] MemoryError),

    // --- Run history persistence ---
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    // --- Run lifecycle ---
    #[error("Run error: {0}")]
    Run(#[from] RunError),

    // --- Configuration errors ---
    #[error("Configuration error: {message}")]
    Config { message: String },

    // --- Serialization ---
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    // --- Generic ---
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias using our Error.
pub type Result<T> = std::result::Result<T, Error>;

// --- Bounded context errors ---

/// Failure of the LLM completion call itself (transport, auth, protocol).
#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    #[error("API request failed: {message} (status: {status_code})")]
    ApiError { status_code: u16, message: String },

    #[error("Rate limited by provider, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Malformed provider response: {0}")]
    MalformedResponse(String),

    #[error("Provider not configured: {0}")]
    NotConfigured(String),

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("Network error: {0}")]
    Network(String),
}

/// A recoverable failure while dispatching one tool call.
#[derive(Debug, Clone, Error)]
pub enum ToolError {
    #[error("Tool '{name}' not found. Available tools: {available}")]
    NotFound { name: String, available: String },

    #[error("Invalid tool arguments: {0}")]
    InvalidArguments(String),

    #[error("Tool execution failed: {tool_name}: {reason}")]
    ExecutionFailed { tool_name: String, reason: String },

    #[error("Permission denied: {tool_name}: {reason}")]
    PermissionDenied { tool_name: String, reason: String },
}

#[derive(Debug, Error)]
pub enum MemoryError {
    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Query failed: {0}")]
    QueryFailed(String),

    #[error("Migration failed: {0}")]
    MigrationFailed(String),
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Query failed: {0}")]
    QueryFailed(String),

    #[error("Migration failed: {0}")]
    MigrationFailed(String),

    #[error("Corrupt record: {0}")]
    Corrupt(String),
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RunError {
    #[error("Run {run_id} was already finalized as {status}")]
    AlreadyFinalized { run_id: String, status: String },

    #[error("Run {run_id} can only be finalized with a terminal status")]
    NotTerminal { run_id: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_error_displays_correctly() {
        let err = Error::Provider(ProviderError::ApiError {
            status_code: 502,
            message: "Bad gateway".into(),
        });
        assert!(err.to_string().contains("502"));
        assert!(err.to_string().contains("Bad gateway"));
    }

    #[test]
    fn tool_not_found_lists_available_tools() {
        let err = ToolError::NotFound {
            name: "teleport".into(),
            available: "calculator, web_search".into(),
        };
        let msg = err.to_string();
        assert!(msg.contains("teleport"));
        assert!(msg.contains("calculator, web_search"));
    }

    #[test]
    fn run_error_names_status() {
        let err = RunError::AlreadyFinalized {
            run_id: "abc".into(),
            status: "completed".into(),
        };
        assert!(err.to_string().contains("completed"));
    }
}
