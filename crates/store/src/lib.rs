//! Run history and tool settings persistence.
//!
//! A finished run is written once, with all of its steps, in a single
//! transaction. Tool settings are small per-tool overrides layered on top of
//! the code-defined catalog.

pub mod in_memory;
pub mod sqlite;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use orchestrator_core::error::StoreError;
use orchestrator_core::run::{Run, RunStatus};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

pub use in_memory::InMemoryStore;
pub use sqlite::SqliteStore;

/// Default and maximum page size for run listings.
pub const DEFAULT_LIST_LIMIT: u32 = 50;
pub const MAX_LIST_LIMIT: u32 = 100;

/// A run without its steps, for listings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    pub id: String,
    pub user_query: String,
    pub status: RunStatus,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl RunSummary {
    /// "Run 1a2b3c4d"
    pub fn short_name(&self) -> String {
        let prefix: String = self.id.chars().take(8).collect();
        format!("Run {prefix}")
    }
}

impl From<&Run> for RunSummary {
    fn from(run: &Run) -> Self {
        Self {
            id: run.id.clone(),
            user_query: run.user_query.clone(),
            status: run.status,
            created_at: run.created_at,
            completed_at: run.completed_at,
        }
    }
}

/// Page and filter for [`Store::list_runs`]. Newest runs come first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunFilter {
    pub limit: u32,
    pub offset: u32,
    pub status: Option<RunStatus>,
}

impl Default for RunFilter {
    fn default() -> Self {
        Self {
            limit: DEFAULT_LIST_LIMIT,
            offset: 0,
            status: None,
        }
    }
}

/// Run counts by status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunStats {
    pub total: u64,
    pub completed: u64,
    pub failed: u64,
    pub running: u64,
}

impl RunStats {
    fn add(&mut self, status: RunStatus, count: u64) {
        self.total += count;
        match status {
            RunStatus::Running => self.running += count,
            RunStatus::Completed => self.completed += count,
            RunStatus::Failed => self.failed += count,
        }
    }
}

/// Persisted override for one tool. Absent record means enabled with the
/// code-defined description.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolSetting {
    pub id: String,
    pub enabled: bool,
    pub description: Option<String>,
}

impl ToolSetting {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            enabled: true,
            description: None,
        }
    }

    fn apply(&mut self, update: &ToolSettingUpdate) {
        if let Some(enabled) = update.enabled {
            self.enabled = enabled;
        }
        if let Some(description) = &update.description {
            self.description = Some(description.clone());
        }
    }
}

/// Partial update; `None` fields are left as they are.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolSettingUpdate {
    pub enabled: Option<bool>,
    pub description: Option<String>,
}

/// Persistence for runs and tool settings.
#[async_trait]
pub trait Store: Send + Sync {
    /// Backend name, for logs.
    fn name(&self) -> &str;

    /// Insert or replace a run together with all of its steps.
    async fn save_run(&self, run: &Run) -> Result<(), StoreError>;

    /// Load a run with its steps in order.
    async fn get_run(&self, id: &str) -> Result<Option<Run>, StoreError>;

    async fn list_runs(&self, filter: &RunFilter) -> Result<Vec<RunSummary>, StoreError>;

    /// Delete a run and its steps. Returns false if it did not exist.
    async fn delete_run(&self, id: &str) -> Result<bool, StoreError>;

    async fn run_stats(&self) -> Result<RunStats, StoreError>;

    async fn tool_settings(&self) -> Result<Vec<ToolSetting>, StoreError>;

    async fn tool_setting(&self, id: &str) -> Result<Option<ToolSetting>, StoreError>;

    /// Apply `update` to the stored record, creating it from defaults first.
    async fn update_tool_setting(
        &self,
        id: &str,
        update: &ToolSettingUpdate,
    ) -> Result<ToolSetting, StoreError>;

    /// Ids of every tool switched off.
    async fn disabled_tools(&self) -> Result<BTreeSet<String>, StoreError> {
        Ok(self
            .tool_settings()
            .await?
            .into_iter()
            .filter(|s| !s.enabled)
            .map(|s| s.id)
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn summary_from_run() {
        let run = Run::new("hello");
        let summary = RunSummary::from(&run);
        assert_eq!(summary.id, run.id);
        assert_eq!(summary.short_name(), run.short_name());
        assert_eq!(summary.status, RunStatus::Running);
    }

    #[test]
    fn setting_update_is_partial() {
        let mut setting = ToolSetting::new("calculator");
        setting.apply(&ToolSettingUpdate {
            enabled: Some(false),
            description: None,
        });
        assert!(!setting.enabled);
        assert_eq!(setting.description, None);

        setting.apply(&ToolSettingUpdate {
            enabled: None,
            description: Some("Adds numbers".into()),
        });
        assert!(!setting.enabled);
        assert_eq!(setting.description.as_deref(), Some("Adds numbers"));
    }

    #[test]
    fn stats_accumulate() {
        let mut stats = RunStats::default();
        stats.add(RunStatus::Completed, 3);
        stats.add(RunStatus::Failed, 1);
        assert_eq!(
            stats,
            RunStats {
                total: 4,
                completed: 3,
                failed: 1,
                running: 0
            }
        );
    }
}
