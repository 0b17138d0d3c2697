//! `orchestrator tools`: list the tool catalog with its settings.

use orchestrator_config::AppConfig;
use orchestrator_gateway::{build_catalog, open_store};

pub async fn run(config: AppConfig) -> Result<(), Box<dyn std::error::Error>> {
    let catalog = build_catalog(&config).await?;
    let store = open_store(&config).await?;
    let disabled = store.disabled_tools().await?;

    println!("Tools ({})", catalog.len());
    println!("=========");
    for tool in catalog.iter() {
        let state = if disabled.contains(tool.name()) {
            "disabled"
        } else {
            "enabled"
        };
        println!("  {:<16} {:<16} [{state}]", tool.name(), tool.display_name());
        println!("      {}", tool.description());
    }
    Ok(())
}
