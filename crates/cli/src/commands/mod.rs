pub mod ask;
pub mod models;
pub mod runs;
pub mod serve;
pub mod tools;

use orchestrator_config::AppConfig;
use std::path::Path;

/// Load config from `path` or the default location, with env overrides applied.
pub fn load_config(path: Option<&Path>) -> Result<AppConfig, Box<dyn std::error::Error>> {
    let config = match path {
        Some(path) => AppConfig::load_with_env(path),
        None => AppConfig::load(),
    };
    Ok(config.map_err(|e| format!("Failed to load config: {e}"))?)
}
