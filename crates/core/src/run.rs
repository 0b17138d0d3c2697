//! Runs and their step-by-step trace.
//!
//! A [`Run`] is one end-to-end agent execution. The [`StepRecorder`] owns the
//! run while the loop executes, appends [`Step`]s with a sequence number it
//! assigns itself, and seals the run with a terminal status exactly once.

use crate::error::RunError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Run identifier (UUID v4, hyphenated).
pub type RunId = String;

/// Lifecycle state of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Running,
    Completed,
    Failed,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Running => "running",
            RunStatus::Completed => "completed",
            RunStatus::Failed => "failed",
        }
    }

    /// "Running", "Completed", "Failed"
    pub fn display_name(&self) -> &'static str {
        match self {
            RunStatus::Running => "Running",
            RunStatus::Completed => "Completed",
            RunStatus::Failed => "Failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, RunStatus::Running)
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RunStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "running" => Ok(RunStatus::Running),
            "completed" => Ok(RunStatus::Completed),
            "failed" => Ok(RunStatus::Failed),
            other => Err(format!("unknown run status '{other}'")),
        }
    }
}

/// Kind tag of a step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StepKind {
    UserRequest,
    AgentThought,
    ToolCall,
    ToolResult,
    AgentResponse,
}

impl StepKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            StepKind::UserRequest => "user-request",
            StepKind::AgentThought => "agent-thought",
            StepKind::ToolCall => "tool-call",
            StepKind::ToolResult => "tool-result",
            StepKind::AgentResponse => "agent-response",
        }
    }
}

impl fmt::Display for StepKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StepKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user-request" => Ok(StepKind::UserRequest),
            "agent-thought" => Ok(StepKind::AgentThought),
            "tool-call" => Ok(StepKind::ToolCall),
            "tool-result" => Ok(StepKind::ToolResult),
            "agent-response" => Ok(StepKind::AgentResponse),
            other => Err(format!("unknown step kind '{other}'")),
        }
    }
}

/// What happened, before the recorder stamps it with an order and a time.
#[derive(Debug, Clone, PartialEq)]
pub enum StepEvent {
    UserRequest(String),
    AgentThought(String),
    ToolCall { tool_name: String, params: Value },
    ToolResult { tool_name: String, result: String },
    AgentResponse(String),
}

impl StepEvent {
    pub fn kind(&self) -> StepKind {
        match self {
            StepEvent::UserRequest(_) => StepKind::UserRequest,
            StepEvent::AgentThought(_) => StepKind::AgentThought,
            StepEvent::ToolCall { .. } => StepKind::ToolCall,
            StepEvent::ToolResult { .. } => StepKind::ToolResult,
            StepEvent::AgentResponse(_) => StepKind::AgentResponse,
        }
    }

    /// The stored payload object. Always carries the `type` tag.
    pub fn to_payload(&self) -> Value {
        let kind = self.kind().as_str();
        match self {
            StepEvent::UserRequest(content)
            | StepEvent::AgentThought(content)
            | StepEvent::AgentResponse(content) => json!({ "type": kind, "content": content }),
            StepEvent::ToolCall { tool_name, params } => {
                json!({ "type": kind, "toolName": tool_name, "params": params })
            }
            StepEvent::ToolResult { tool_name, result } => {
                json!({ "type": kind, "toolName": tool_name, "result": result })
            }
        }
    }
}

/// One recorded event within a run. Immutable once appended.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Step {
    pub run_id: RunId,

    /// 0-based position within the run
    pub order: u32,

    #[serde(rename = "type")]
    pub kind: StepKind,

    /// Kind-specific payload object (includes `type`)
    pub content: Value,

    pub timestamp: DateTime<Utc>,
}

impl Step {
    /// The `content` field of user-request, agent-thought and agent-response steps.
    pub fn text(&self) -> Option<&str> {
        self.content.get("content").and_then(Value::as_str)
    }

    pub fn tool_name(&self) -> Option<&str> {
        self.content.get("toolName").and_then(Value::as_str)
    }

    pub fn params(&self) -> Option<&Value> {
        self.content.get("params")
    }

    pub fn result(&self) -> Option<&str> {
        self.content.get("result").and_then(Value::as_str)
    }
}

/// One end-to-end agent execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Run {
    pub id: RunId,
    pub user_query: String,
    pub status: RunStatus,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub steps: Vec<Step>,
}

impl Run {
    /// A fresh run in the `running` state with a new v4 id.
    pub fn new(user_query: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            user_query: user_query.into(),
            status: RunStatus::Running,
            created_at: Utc::now(),
            completed_at: None,
            steps: Vec::new(),
        }
    }

    /// "Run 1a2b3c4d"
    pub fn short_name(&self) -> String {
        let prefix: String = self.id.chars().take(8).collect();
        format!("Run {prefix}")
    }

    /// Final answer text, if the run has one.
    pub fn final_response(&self) -> Option<&str> {
        self.steps
            .iter()
            .rev()
            .find(|s| s.kind == StepKind::AgentResponse)
            .and_then(Step::text)
    }
}

/// Append-only step log for one run.
#[derive(Debug)]
pub struct StepRecorder {
    run: Run,
}

impl StepRecorder {
    /// Create the run and start recording.
    pub fn new(user_query: impl Into<String>) -> Self {
        Self {
            run: Run::new(user_query),
        }
    }

    pub fn run_id(&self) -> &str {
        &self.run.id
    }

    /// Append an event with the next sequence number and the current time.
    pub fn record(&mut self, event: StepEvent) -> &Step {
        let step = Step {
            run_id: self.run.id.clone(),
            order: self.run.steps.len() as u32,
            kind: event.kind(),
            content: event.to_payload(),
            timestamp: Utc::now(),
        };
        tracing::debug!(run_id = %self.run.id, order = step.order, kind = %step.kind, "Step recorded");
        self.run.steps.push(step);
        &self.run.steps[self.run.steps.len() - 1]
    }

    pub fn steps(&self) -> &[Step] {
        &self.run.steps
    }

    pub fn status(&self) -> RunStatus {
        self.run.status
    }

    /// Set the terminal status and completion time. Rejected once sealed.
    pub fn finalize(&mut self, status: RunStatus) -> Result<(), RunError> {
        if self.run.status.is_terminal() {
            return Err(RunError::AlreadyFinalized {
                run_id: self.run.id.clone(),
                status: self.run.status.to_string(),
            });
        }
        if !status.is_terminal() {
            return Err(RunError::NotTerminal {
                run_id: self.run.id.clone(),
            });
        }
        self.run.status = status;
        self.run.completed_at = Some(Utc::now());
        Ok(())
    }

    pub fn run(&self) -> &Run {
        &self.run
    }

    pub fn into_run(self) -> Run {
        self.run
    }
}
