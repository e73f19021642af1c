//! `agentrelay onboard`: first-time setup.

use agentrelay_config::AppConfig;

use super::CmdResult;

pub async fn run() -> CmdResult {
    let config_dir = AppConfig::config_dir();
    let config_path = config_dir.join("config.toml");
    let memory_dir = config_dir.join("memory");

    println!("agentrelay setup");
    println!("================\n");

    if !config_dir.exists() {
        std::fs::create_dir_all(&config_dir)?;
        println!("Created config directory: {}", config_dir.display());
    } else {
        println!("Config directory exists: {}", config_dir.display());
    }

    if !memory_dir.exists() {
        std::fs::create_dir_all(&memory_dir)?;
        println!("Created memory directory: {}", memory_dir.display());
    }

    if config_path.exists() {
        println!("\nConfig already exists at: {}", config_path.display());
        println!("Edit it manually or delete it and re-run onboard.");
    } else {
        std::fs::write(&config_path, AppConfig::default_toml())?;
        println!("Created config.toml at: {}", config_path.display());
        println!("\nNext steps:");
        println!("  1. Add your API key to {}", config_path.display());
        println!("     (or export AGENTRELAY_API_KEY)");
        println!("  2. agentrelay pipelines");
        println!("  3. agentrelay run analysis-only \"review this module\"");
    }

    Ok(())
}
