//! In-memory store for tests and throwaway sessions.

use crate::{RunFilter, RunStats, RunSummary, Store, ToolSetting, ToolSettingUpdate};
use async_trait::async_trait;
use orchestrator_core::error::StoreError;
use orchestrator_core::run::Run;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::RwLock;

pub struct InMemoryStore {
    runs: Arc<RwLock<BTreeMap<String, Run>>>,
    tools: Arc<RwLock<BTreeMap<String, ToolSetting>>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            runs: Arc::new(RwLock::new(BTreeMap::new())),
            tools: Arc::new(RwLock::new(BTreeMap::new())),
        }
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Store for InMemoryStore {
    fn name(&self) -> &str {
        "in_memory"
    }

    async fn save_run(&self, run: &Run) -> Result<(), StoreError> {
        self.runs.write().await.insert(run.id.clone(), run.clone());
        Ok(())
    }

    async fn get_run(&self, id: &str) -> Result<Option<Run>, StoreError> {
        Ok(self.runs.read().await.get(id).cloned())
    }

    async fn list_runs(&self, filter: &RunFilter) -> Result<Vec<RunSummary>, StoreError> {
        let runs = self.runs.read().await;
        let mut matching: Vec<&Run> = runs
            .values()
            .filter(|r| filter.status.is_none_or(|s| r.status == s))
            .collect();
        matching.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(a.id.cmp(&b.id)));
        Ok(matching
            .into_iter()
            .skip(filter.offset as usize)
            .take(filter.limit as usize)
            .map(RunSummary::from)
            .collect())
    }

    async fn delete_run(&self, id: &str) -> Result<bool, StoreError> {
        Ok(self.runs.write().await.remove(id).is_some())
    }

    async fn run_stats(&self) -> Result<RunStats, StoreError> {
        let mut stats = RunStats::default();
        for run in self.runs.read().await.values() {
            stats.add(run.status, 1);
        }
        Ok(stats)
    }

    async fn tool_settings(&self) -> Result<Vec<ToolSetting>, StoreError> {
        Ok(self.tools.read().await.values().cloned().collect())
    }

    async fn tool_setting(&self, id: &str) -> Result<Option<ToolSetting>, StoreError> {
        Ok(self.tools.read().await.get(id).cloned())
    }

    async fn update_tool_setting(
        &self,
        id: &str,
        update: &ToolSettingUpdate,
    ) -> Result<ToolSetting, StoreError> {
        let mut tools = self.tools.write().await;
        let setting = tools
            .entry(id.to_string())
            .or_insert_with(|| ToolSetting::new(id));
        setting.apply(update);
        Ok(setting.clone())
    }
}
