//! LLM Provider implementations for Orchestrator.
//!
//! All providers implement the `orchestrator_core::Provider` trait.

pub mod openai_compat;

pub use openai_compat::OpenAiCompatProvider;
