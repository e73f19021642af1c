//! `agentrelay run`, `smart` and `plan`.

use agentrelay_core::context::RunResult;

use super::{CmdResult, build_orchestrator, load_config, print_section};

/// Run a registered pipeline.
pub async fn pipeline(pipeline_id: &str, prompt: &str, with_memory: bool) -> CmdResult {
    let config = load_config()?;
    let orchestrator = build_orchestrator(&config)?;
    let result = if with_memory || config.orchestration.memory_enabled {
        orchestrator.execute_with_memory(pipeline_id, prompt).await?
    } else {
        orchestrator.execute(pipeline_id, prompt).await?
    };
    report(&result);
    Ok(())
}

/// Let the interpreter and director decide the steps.
pub async fn smart(prompt: &str) -> CmdResult {
    let orchestrator = build_orchestrator(&load_config()?)?;
    let result = orchestrator.execute_intelligent(prompt).await;
    report(&result);
    Ok(())
}

/// Describe the workflow without running it.
pub async fn plan(prompt: &str) -> CmdResult {
    let orchestrator = build_orchestrator(&load_config()?)?;
    let narrative = orchestrator.analyze_workflow_choice(prompt).await?;
    print_section("Proposed workflow", &narrative);
    Ok(())
}

fn report(result: &RunResult) {
    print_section("Execution log", &result.execution_log.join("\n"));

    if !result.context.errors.is_empty() {
        print_section("Errors", &result.context.errors.join("\n"));
    }

    if let Some(memories) = &result.agent_memories {
        let mut agents: Vec<_> = memories.iter().collect();
        agents.sort_by(|a, b| a.0.cmp(b.0));
        let lines: Vec<String> = agents
            .into_iter()
            .map(|(agent, list)| {
                let noun = if list.len() == 1 { "memory" } else { "memories" };
                format!("{agent}: {} {noun}", list.len())
            })
            .collect();
        print_section("Memories", &lines.join("\n"));
    }

    print_section("Result", &result.final_result);
    println!(
        "\n{} ({} step(s))",
        if result.success { "Succeeded" } else { "Finished with errors" },
        result.context.step_count
    );
}
