//! # Orchestrator Core
//!
//! Domain types, traits, and error definitions for the Orchestrator agent.
//! This crate has **no framework dependencies**: it defines the domain model
//! that every other crate implements against.
//!
//! The agent loop only ever talks to the traits defined here:
//! - [`Provider`] is the LLM client (`complete(messages, tools, tool_choice)`)
//! - [`ToolRegistry`] is the tool catalog (`definitions()` / `execute()`)
//! - [`StepRecorder`] is the per-run event sink
//!
//! Implementations live in their respective crates, which keeps test doubles
//! trivial to write.

pub mod error;
pub mod memory;
pub mod message;
pub mod provider;
pub mod run;
pub mod tool;

// Re-export key types at crate root for ergonomics
pub use error::{Error, Result};
pub use memory::{KnowledgeChunk, MemoryBackend, MemoryQuery};
pub use message::{Conversation, Message, MessageToolCall, Role};
pub use provider::{Provider, ProviderRequest, ProviderResponse, ToolChoice, ToolDefinition};
pub use run::{Run, RunId, RunStatus, Step, StepEvent, StepKind, StepRecorder};
pub use tool::{Tool, ToolCall, ToolRegistry};
