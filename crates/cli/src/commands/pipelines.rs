//! `agentrelay pipelines`: list what can be run.

use super::{CmdResult, build_orchestrator, load_config};

pub async fn run() -> CmdResult {
    let orchestrator = build_orchestrator(&load_config()?)?;

    println!("Available pipelines");
    println!("===================");
    for pipeline in orchestrator.list_pipelines() {
        println!("  {:<20} {}", pipeline.id, pipeline.name);
        if !pipeline.description.is_empty() {
            println!("  {:<20} {}", "", pipeline.description);
        }
        println!("  {:<20} steps: {}", "", pipeline.role_names().join(" -> "));
    }
    Ok(())
}
