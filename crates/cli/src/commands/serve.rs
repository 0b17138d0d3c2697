//! `orchestrator serve`: start the HTTP API server.

use orchestrator_config::AppConfig;

pub async fn run(mut config: AppConfig, port_override: Option<u16>) -> Result<(), Box<dyn std::error::Error>> {
    if let Some(port) = port_override {
        config.gateway.port = port;
    }

    println!("Orchestrator API");
    println!("   Listening: http://{}:{}", config.gateway.host, config.gateway.port);
    println!("   Run store: {}", config.store.database_url);
    println!("   CORS:      {}", config.gateway.allowed_origins.join(", "));

    orchestrator_gateway::start(config).await?;

    Ok(())
}
