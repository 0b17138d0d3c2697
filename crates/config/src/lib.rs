//! Configuration loading, validation, and management for Orchestrator.
//!
//! Loads configuration from `~/.orchestrator/config.toml` with environment
//! variable overrides. Validates all settings at startup.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// The root configuration structure.
///
/// Maps directly to `~/.orchestrator/config.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// LLM endpoint settings
    #[serde(default)]
    pub llm: LlmConfig,

    /// Agent loop settings
    #[serde(default)]
    pub agent: AgentConfig,

    /// Model catalog (display name → backend id)
    #[serde(default)]
    pub models: ModelCatalog,

    /// HTTP API configuration
    #[serde(default)]
    pub gateway: GatewayConfig,

    /// Run history database
    #[serde(default)]
    pub store: StoreConfig,

    /// Tool configuration
    #[serde(default)]
    pub tools: ToolsConfig,

    /// Knowledge base configuration
    #[serde(default)]
    pub knowledge: KnowledgeConfig,
}

/// Redact a secret for Debug output.
fn redact(s: &Option<String>) -> &'static str {
    match s {
        Some(_) => "[REDACTED]",
        None => "None",
    }
}

#[derive(Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// Base URL of an OpenAI-compatible chat completions API
    #[serde(default = "default_base_url")]
    pub base_url: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    #[serde(default = "default_temperature")]
    pub temperature: f32,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,

    /// Request timeout in seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_base_url() -> String {
    "https://api.openai.com/v1".into()
}
fn default_temperature() -> f32 {
    0.7
}
fn default_timeout_secs() -> u64 {
    120
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            api_key: None,
            temperature: default_temperature(),
            max_tokens: None,
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl std::fmt::Debug for LlmConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LlmConfig")
            .field("base_url", &self.base_url)
            .field("api_key", &redact(&self.api_key))
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    #[serde(default = "default_max_iterations")]
    pub max_iterations: u32,

    /// Display name from the model catalog, or a raw backend id
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_model: Option<String>,
}

fn default_max_iterations() -> u32 {
    10
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            max_iterations: default_max_iterations(),
            default_model: None,
        }
    }
}

/// Named models the API and CLI let callers choose between.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelCatalog {
    #[serde(default = "default_model_name")]
    pub default: String,

    /// Display name → backend model id
    #[serde(default = "default_model_mappings")]
    pub mappings: BTreeMap<String, String>,
}

fn default_model_name() -> String {
    "Gemini 2.5 Flash".into()
}

fn default_model_mappings() -> BTreeMap<String, String> {
    [
        ("Claude Sonnet 4.5", "claude-sonnet-4-5"),
        ("Claude Opus 4.1", "claude-opus-4-1"),
        ("Claude Haiku 4.5", "claude-haiku-4-5"),
        ("GPT-5.1", "gpt-5.1"),
        ("Gemini 2.5 Pro", "gemini-2.5-pro"),
        ("Gemini 2.5 Flash", "gemini-2.5-flash"),
        ("Gemini 2.5 Flash Lite", "gemini-2.5-flash-lite"),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v.to_string()))
    .collect()
}

impl Default for ModelCatalog {
    fn default() -> Self {
        Self {
            default: default_model_name(),
            mappings: default_model_mappings(),
        }
    }
}

impl ModelCatalog {
    /// Backend id for a display name. Unknown or absent names fall back to the default.
    pub fn resolve(&self, display_name: Option<&str>) -> String {
        display_name
            .and_then(|n| self.mappings.get(n))
            .or_else(|| self.mappings.get(&self.default))
            .cloned()
            .unwrap_or_else(|| self.default.clone())
    }

    /// Display names, sorted.
    pub fn names(&self) -> Vec<&str> {
        self.mappings.keys().map(String::as_str).collect()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default = "default_host")]
    pub host: String,

    /// CORS origins. Empty means any origin.
    #[serde(default = "default_allowed_origins")]
    pub allowed_origins: Vec<String>,
}

fn default_port() -> u16 {
    8000
}
fn default_host() -> String {
    "127.0.0.1".into()
}
fn default_allowed_origins() -> Vec<String> {
    vec![
        "http://localhost:5173".into(),
        "http://localhost:3000".into(),
    ]
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            host: default_host(),
            allowed_origins: default_allowed_origins(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// SQLx database URL for run history
    #[serde(default = "default_store_url")]
    pub database_url: String,
}

fn default_store_url() -> String {
    format!(
        "sqlite://{}",
        AppConfig::config_dir().join("orchestrator.db").display()
    )
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            database_url: default_store_url(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolsConfig {
    /// Sandbox directory for the file tool
    #[serde(default = "default_files_dir")]
    pub files_dir: PathBuf,
}

fn default_files_dir() -> PathBuf {
    PathBuf::from("agent_files")
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            files_dir: default_files_dir(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KnowledgeConfig {
    /// SQLx database URL for knowledge chunks
    #[serde(default = "default_knowledge_url")]
    pub database_url: String,

    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,

    #[serde(default = "default_chunk_overlap")]
    pub chunk_overlap: usize,

    /// How many chunks recall returns when the caller doesn't say
    #[serde(default = "default_results")]
    pub default_results: usize,
}

fn default_knowledge_url() -> String {
    format!(
        "sqlite://{}",
        AppConfig::config_dir().join("knowledge.db").display()
    )
}
fn default_chunk_size() -> usize {
    1000
}
fn default_chunk_overlap() -> usize {
    200
}
fn default_results() -> usize {
    3
}

impl Default for KnowledgeConfig {
    fn default() -> Self {
        Self {
            database_url: default_knowledge_url(),
            chunk_size: default_chunk_size(),
            chunk_overlap: default_chunk_overlap(),
            default_results: default_results(),
        }
    }
}

impl AppConfig {
    /// Load configuration from the default path (~/.orchestrator/config.toml).
    ///
    /// Environment overrides:
    /// - `ORCHESTRATOR_API_KEY`, then `API_KEY`, then `OPENAI_API_KEY`
    /// - `API_BASE_URL`, `MODEL`, `MAX_ITERATIONS`, `DATABASE_URL`
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_with_env(&Self::config_dir().join("config.toml"))
    }

    /// Load `path`, then apply the same environment overrides as [`AppConfig::load`].
    pub fn load_with_env(path: &Path) -> Result<Self, ConfigError> {
        let mut config = Self::load_from(path)?;
        config.apply_env(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific file path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::info!("No config file found at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Apply environment overrides through a lookup function.
    fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<(), ConfigError> {
        if self.llm.api_key.is_none() {
            self.llm.api_key = lookup("ORCHESTRATOR_API_KEY")
                .or_else(|| lookup("API_KEY"))
                .or_else(|| lookup("OPENAI_API_KEY"));
        }
        if let Some(url) = lookup("API_BASE_URL") {
            self.llm.base_url = url;
        }
        if let Some(model) = lookup("MODEL") {
            self.agent.default_model = Some(model);
        }
        if let Some(raw) = lookup("MAX_ITERATIONS") {
            self.agent.max_iterations = raw.parse().map_err(|_| {
                ConfigError::ValidationError(format!("MAX_ITERATIONS must be an integer, got '{raw}'"))
            })?;
        }
        if let Some(url) = lookup("DATABASE_URL") {
            self.store.database_url = url;
        }
        Ok(())
    }

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".orchestrator")
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0..=2.0).contains(&self.llm.temperature) {
            return Err(ConfigError::ValidationError(
                "llm.temperature must be between 0.0 and 2.0".into(),
            ));
        }

        if self.agent.max_iterations == 0 {
            return Err(ConfigError::ValidationError(
                "agent.max_iterations must be at least 1".into(),
            ));
        }

        if self.knowledge.chunk_overlap >= self.knowledge.chunk_size {
            return Err(ConfigError::ValidationError(
                "knowledge.chunk_overlap must be smaller than knowledge.chunk_size".into(),
            ));
        }

        Ok(())
    }

    /// Check if an API key is available (from config or environment).
    pub fn has_api_key(&self) -> bool {
        self.llm.api_key.is_some()
    }

    /// The backend model id used when a caller names no model.
    pub fn default_model_id(&self) -> String {
        match &self.agent.default_model {
            Some(name) if self.models.mappings.contains_key(name) => {
                self.models.resolve(Some(name))
            }
            Some(raw) => raw.clone(),
            None => self.models.resolve(None),
        }
    }

    /// Generate a default config TOML string.
    pub fn default_toml() -> String {
        toml::to_string_pretty(&Self::default()).unwrap_or_default()
    }
}

/// Get the user's home directory.
fn dirs_home() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        std::env::var("USERPROFILE")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("C:\\Users\\Default"))
    }
    #[cfg(not(target_os = "windows"))]
    {
        std::env::var("HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("/tmp"))
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file at {path}: {reason}")]
    ReadError { path: PathBuf, reason: String },

    #[error("Failed to parse config file at {path}: {reason}")]
    ParseError { path: PathBuf, reason: String },

    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}
