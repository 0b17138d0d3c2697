//! `orchestrator models`: list model display names.

use orchestrator_config::AppConfig;

pub fn run(config: &AppConfig) {
    let default_id = config.default_model_id();
    println!("Models");
    println!("======");
    for name in config.models.names() {
        let id = config.models.resolve(Some(name));
        let marker = if id == default_id { "*" } else { " " };
        println!("  {marker} {name:<24} {id}");
    }
    println!();
    println!("  * default");
}
