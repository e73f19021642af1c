//! `agentrelay memories`: prune stored memories against a new prompt.

use agentrelay_core::memory::AgentMemory;

use super::{CmdResult, build_orchestrator, load_config, print_section};

pub async fn run(pipeline_id: &str, prompt: &str) -> CmdResult {
    let orchestrator = build_orchestrator(&load_config()?)?;

    let Some(result) = orchestrator.analyze_memories(pipeline_id, prompt).await? else {
        println!("No stored memories for pipeline '{pipeline_id}' yet.");
        println!("Run `agentrelay run {pipeline_id} <prompt> --memory` first.");
        return Ok(());
    };

    print_section("Relevant memories", &describe(&result.relevant_memories));
    print_section("Pruned memories", &describe(&result.pruned_memories));
    print_section("Summary", &result.context_summary);
    if !result.cleanup_recommendations.is_empty() {
        let lines: Vec<String> = result
            .cleanup_recommendations
            .iter()
            .map(|r| format!("- {r}"))
            .collect();
        print_section("Recommendations", &lines.join("\n"));
    }
    Ok(())
}

fn describe(memories: &[AgentMemory]) -> String {
    if memories.is_empty() {
        return "(none)".to_string();
    }
    memories
        .iter()
        .map(|m| {
            format!(
                "{} [{}] relevance {}/10, {}",
                m.agent_role,
                m.memory_type,
                m.relevance_score,
                m.timestamp.format("%Y-%m-%d %H:%M")
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}
