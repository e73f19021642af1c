pub mod memories;
pub mod onboard;
pub mod pipelines;
pub mod run;

use agentrelay_config::AppConfig;
use agentrelay_workflow::AgentOrchestrator;
use std::sync::Arc;

type CmdResult = Result<(), Box<dyn std::error::Error>>;

fn load_config() -> Result<AppConfig, Box<dyn std::error::Error>> {
    Ok(AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?)
}

/// Wire provider, memory store and orchestrator from `config`.
fn build_orchestrator(config: &AppConfig) -> Result<AgentOrchestrator, Box<dyn std::error::Error>> {
    if !config.has_api_key() && config.default_provider != "ollama" {
        tracing::warn!("No API key configured; run `agentrelay onboard` or set AGENTRELAY_API_KEY");
    }

    let router = agentrelay_providers::build_from_config(config);
    let provider = router
        .default()
        .ok_or_else(|| format!("Default provider '{}' is not available", config.default_provider))?;
    let store =
        agentrelay_memory::open_store(&config.memory.backend, config.memory.resolved_path());

    Ok(AgentOrchestrator::from_config(config, provider, Arc::clone(&store)))
}

fn print_section(title: &str, body: &str) {
    println!("\n{title}");
    println!("{}", "-".repeat(title.chars().count()));
    println!("{body}");
}
