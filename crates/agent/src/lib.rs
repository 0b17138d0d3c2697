//! The agent loop.
//!
//! One run goes like this:
//!
//! 1. Record the user request and seed the transcript
//! 2. Ask the model for a turn, offering the tools the run is allowed to use
//! 3. **If tool calls**: dispatch them, record calls and results, loop back to 2
//! 4. **If text**: record it as the final answer and return
//!
//! The loop stops at the first text-only reply or when the iteration cap is hit.
//! Every event lands in a [`StepRecorder`](orchestrator_core::StepRecorder).

pub mod loop_runner;
pub mod policy;

pub use loop_runner::{AgentLoop, RunOptions, SYSTEM_PROMPT};
pub use policy::ToolPolicy;
