//! Shared services and the run lifecycle used by both HTTP and CLI entry points.

use orchestrator_agent::{AgentLoop, RunOptions};
use orchestrator_config::{AppConfig, ModelCatalog};
use orchestrator_core::error::{ProviderError, StoreError};
use orchestrator_core::run::{Run, RunStatus, StepRecorder};
use orchestrator_core::tool::ToolRegistry;
use orchestrator_memory::{KnowledgeBase, SqliteBackend};
use orchestrator_providers::OpenAiCompatProvider;
use orchestrator_store::{SqliteStore, Store};
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};

/// Everything a request handler needs, built once at startup.
pub struct AppState {
    pub agent: Arc<AgentLoop>,
    pub store: Arc<dyn Store>,
    pub models: ModelCatalog,
    /// Backend id used when a request names no model.
    pub default_model: String,
    pub max_iterations: u32,
}

pub type SharedState = Arc<AppState>;

/// One agent run as requested by a caller.
#[derive(Debug, Clone, Default)]
pub struct RunRequest {
    pub goal: String,
    /// Display name from the model catalog.
    pub model: Option<String>,
    pub tools: Option<Vec<String>>,
    pub max_iterations: Option<u32>,
}

/// A persisted run and how it ended.
#[derive(Debug)]
pub struct RunOutcome {
    pub run: Run,
    pub answer: Result<String, ProviderError>,
}

impl AppState {
    pub fn new(agent: AgentLoop, store: Arc<dyn Store>, config: &AppConfig) -> Self {
        Self {
            agent: Arc::new(agent),
            store,
            models: config.models.clone(),
            default_model: config.default_model_id(),
            max_iterations: config.agent.max_iterations,
        }
    }

    pub fn tools(&self) -> &ToolRegistry {
        self.agent.tools()
    }

    pub fn resolve_model(&self, name: Option<&str>) -> String {
        match name {
            Some(name) => self.models.resolve(Some(name)),
            None => self.default_model.clone(),
        }
    }

    /// Create a run, drive the agent, seal the run and persist it.
    ///
    /// The run is stored as `running` before the loop starts and saved again
    /// once sealed, whether the agent succeeded or not. Only a storage failure
    /// is returned as `Err`.
    pub async fn execute(&self, request: RunRequest) -> Result<RunOutcome, StoreError> {
        let disabled = self.store.disabled_tools().await?;
        let options = RunOptions::new(self.resolve_model(request.model.as_deref()))
            .with_tools(request.tools)
            .with_max_iterations(request.max_iterations.unwrap_or(self.max_iterations))
            .with_disabled_tools(disabled);

        let mut recorder = StepRecorder::new(request.goal.as_str());
        self.store.save_run(recorder.run()).await?;
        info!(run_id = %recorder.run_id(), "Run created");

        let answer = self.agent.run(&request.goal, &options, &mut recorder).await;

        let status = if answer.is_ok() {
            RunStatus::Completed
        } else {
            RunStatus::Failed
        };
        if let Err(e) = recorder.finalize(status) {
            warn!(error = %e, "Run finalized twice");
        }

        let run = recorder.into_run();
        self.store.save_run(&run).await?;
        info!(run_id = %run.id, status = %run.status, steps = run.steps.len(), "Run persisted");
        Ok(RunOutcome { run, answer })
    }
}

/// Make sure the directory holding a `sqlite://` database file exists.
pub fn prepare_sqlite_path(url: &str) -> std::io::Result<()> {
    let Some(path) = url
        .strip_prefix("sqlite://")
        .or_else(|| url.strip_prefix("sqlite:"))
    else {
        return Ok(());
    };
    let path = path.split('?').next().unwrap_or(path);
    if path.is_empty() || path == ":memory:" {
        return Ok(());
    }
    match Path::new(path).parent() {
        Some(parent) if !parent.as_os_str().is_empty() => std::fs::create_dir_all(parent),
        _ => Ok(()),
    }
}

/// Open the run history database named in the config.
pub async fn open_store(config: &AppConfig) -> Result<Arc<dyn Store>, Box<dyn std::error::Error>> {
    prepare_sqlite_path(&config.store.database_url)?;
    let store: Arc<dyn Store> = Arc::new(SqliteStore::new(&config.store.database_url).await?);
    Ok(store)
}

/// Build the tool catalog, including the knowledge base behind the memory tools.
pub async fn build_catalog(config: &AppConfig) -> Result<ToolRegistry, Box<dyn std::error::Error>> {
    prepare_sqlite_path(&config.knowledge.database_url)?;
    let backend = SqliteBackend::new(&config.knowledge.database_url).await?;
    let kb = KnowledgeBase::new(Arc::new(backend))
        .with_chunking(config.knowledge.chunk_size, config.knowledge.chunk_overlap);
    Ok(orchestrator_tools::default_catalog(config, Arc::new(kb))?)
}

/// Wire provider, catalog, agent and store from config.
pub async fn build_state(config: &AppConfig) -> Result<SharedState, Box<dyn std::error::Error>> {
    let provider = OpenAiCompatProvider::from_config(&config.llm)?;
    let tools = build_catalog(config).await?;
    let store = open_store(config).await?;

    let agent = AgentLoop::new(Arc::new(provider), Arc::new(tools))
        .with_temperature(config.llm.temperature)
        .with_max_tokens(config.llm.max_tokens);

    info!(
        store = store.name(),
        tools = agent.tools().len(),
        model = %config.default_model_id(),
        "Services initialized"
    );
    Ok(Arc::new(AppState::new(agent, store, config)))
}
