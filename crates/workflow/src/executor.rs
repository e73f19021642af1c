//! Static pipeline execution.
//!
//! Steps run strictly in order against one [`PipelineContext`]. A failed
//! completion call is recorded and the run moves on, except when the failing
//! step is the supervisor: nothing is scheduled after it, so the loop ends.

use agentrelay_core::agent::AgentRole;
use agentrelay_core::context::{PipelineContext, RunResult};
use agentrelay_core::error::{Error, PipelineError};
use agentrelay_core::event::DomainEvent;
use agentrelay_core::memory::AgentMemory;
use agentrelay_memory::MemoryEngine;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::pipeline::{Pipeline, PipelineRegistry};
use crate::runner::AgentRunner;

/// Per-agent memories collected during one run.
pub type AgentMemories = HashMap<String, Vec<AgentMemory>>;

/// Runs registered pipelines.
pub struct PipelineExecutor {
    registry: Arc<PipelineRegistry>,
    runner: AgentRunner,
    memory: MemoryEngine,
}

impl PipelineExecutor {
    pub fn new(registry: Arc<PipelineRegistry>, runner: AgentRunner) -> Self {
        let memory = MemoryEngine::new(runner.provider(), &runner.settings().model);
        Self {
            registry,
            runner,
            memory,
        }
    }

    pub fn registry(&self) -> &PipelineRegistry {
        &self.registry
    }

    /// Run a pipeline without memory generation.
    pub async fn execute(&self, pipeline_id: &str, user_prompt: &str) -> Result<RunResult, Error> {
        let pipeline = self.lookup(pipeline_id)?;
        Ok(self.run(pipeline, user_prompt, false).await)
    }

    /// Run a pipeline, generating a memory after every successful step that
    /// stores its output.
    pub async fn execute_with_memory(
        &self,
        pipeline_id: &str,
        user_prompt: &str,
    ) -> Result<RunResult, Error> {
        let pipeline = self.lookup(pipeline_id)?;
        Ok(self.run(pipeline, user_prompt, true).await)
    }

    fn lookup(&self, pipeline_id: &str) -> Result<&Pipeline, PipelineError> {
        let pipeline = self
            .registry
            .get(pipeline_id)
            .ok_or_else(|| PipelineError::NotFound(pipeline_id.to_string()))?;
        if !pipeline.enabled {
            return Err(PipelineError::Disabled(pipeline_id.to_string()));
        }
        Ok(pipeline)
    }

    async fn run(&self, pipeline: &Pipeline, user_prompt: &str, with_memory: bool) -> RunResult {
        let run_id = Uuid::new_v4().to_string();
        let total = pipeline.steps.len();
        let mut ctx = PipelineContext::new(user_prompt, total);
        let mut log = Vec::with_capacity(total);
        let mut memories = AgentMemories::new();

        info!(
            pipeline = %pipeline.id,
            run_id = %run_id,
            steps = total,
            with_memory,
            "Pipeline started"
        );

        for (index, step) in pipeline.steps.iter().enumerate() {
            if !ctx.begin_step() {
                break;
            }
            let n = ctx.step_count;
            let input = step.build_input(&ctx);

            match self
                .runner
                .run(&run_id, n, &step.role, &step.system_prompt, input)
                .await
            {
                Ok(output) => {
                    if let Some(key) = &step.output_key {
                        ctx.set_result(key, output.as_str());
                        if with_memory {
                            remember_with(
                                &self.memory,
                                &self.runner,
                                &run_id,
                                &step.role,
                                &output,
                                &ctx,
                                &mut memories,
                            )
                            .await;
                        }
                    }
                    log.push(format!("Step {n}/{total} ({}) completed", step.role));
                }
                Err(e) => {
                    let message = format!("Step {n}/{total} ({}) failed: {e}", step.role);
                    ctx.record_error(message.clone());
                    log.push(message);
                    if step.role.is_terminal() {
                        warn!(
                            pipeline = %pipeline.id,
                            step = n,
                            "Supervisor failed, stopping pipeline"
                        );
                        break;
                    }
                }
            }

            if index + 1 < total {
                self.runner.pace().await;
            }
        }

        let success = ctx.errors.is_empty();
        info!(
            pipeline = %pipeline.id,
            run_id = %run_id,
            success,
            errors = ctx.errors.len(),
            "Pipeline finished"
        );

        RunResult {
            success,
            final_result: ctx.final_result(),
            context: ctx,
            execution_log: log,
            agent_memories: with_memory.then_some(memories),
        }
    }
}

/// Generate and collect a memory. Failures are logged and dropped.
pub(crate) async fn remember_with(
    engine: &MemoryEngine,
    runner: &AgentRunner,
    run_id: &str,
    role: &AgentRole,
    output: &str,
    ctx: &PipelineContext,
    memories: &mut AgentMemories,
) {
    match engine.generate(role, output, &ctx.user_prompt, ctx).await {
        Ok(memory) => {
            runner.events().publish(DomainEvent::MemoryGenerated {
                run_id: run_id.to_string(),
                agent_role: role.to_string(),
                relevance_score: memory.relevance_score,
                timestamp: Utc::now(),
            });
            memories.entry(role.to_string()).or_default().push(memory);
        }
        Err(e) => warn!(run_id, role = %role, error = %e, "Memory generation failed"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::Step;
    use crate::runner::ExecutionSettings;
    use agentrelay_core::event::EventBus;
    use agentrelay_core::provider::Provider;
    use agentrelay_core::testing::{RuleProvider, ScriptedProvider, service_error, system_prompt_of};

    const MEMORY_REPLY: &str = r#"{"insights": ["x"], "technical_decisions": [],
        "contextual_info": {}, "lessons_learned": []}"#;

    fn executor(provider: Arc<dyn Provider>, registry: PipelineRegistry) -> PipelineExecutor {
        let runner = AgentRunner::new(
            provider,
            ExecutionSettings::new("mock-model"),
            Arc::new(EventBus::default()),
        );
        PipelineExecutor::new(Arc::new(registry), runner)
    }

    fn two_step() -> PipelineRegistry {
        let mut registry = PipelineRegistry::new();
        registry.register(
            Pipeline::new("two", "Two", "")
                .step(
                    Step::templated(AgentRole::Analysis, "{user_prompt}")
                        .with_output_key("analysis"),
                )
                .step(Step::templated(AgentRole::Coder, "{results.analysis}")),
        );
        registry
    }

    #[tokio::test]
    async fn unknown_pipeline_is_not_found() {
        let exec =
            executor(Arc::new(ScriptedProvider::new(vec![])), PipelineRegistry::with_builtins());
        let err = exec.execute("nope", "p").await.unwrap_err();
        assert!(matches!(err, Error::Pipeline(PipelineError::NotFound(id)) if id == "nope"));
    }

    #[tokio::test]
    async fn disabled_pipeline_is_refused() {
        let provider = Arc::new(ScriptedProvider::new(vec![]));
        let exec = executor(provider.clone(), PipelineRegistry::with_builtins());
        let err = exec.execute("legacy-review", "p").await.unwrap_err();
        assert!(matches!(err, Error::Pipeline(PipelineError::Disabled(_))));
        assert_eq!(provider.call_count(), 0);
    }

    #[tokio::test]
    async fn outputs_flow_into_later_inputs() {
        let provider = Arc::new(ScriptedProvider::texts(&["ANALYSIS", "CODE"]));
        let exec = executor(provider.clone(), two_step());

        let result = exec.execute("two", "prompt").await.unwrap();
        assert!(result.success);
        assert_eq!(result.context.step_count, 2);
        assert_eq!(result.context.result("analysis"), Some("ANALYSIS"));
        assert_eq!(result.context.results.len(), 1);
        assert_eq!(agentrelay_core::testing::user_input_of(&provider.requests()[1]), "ANALYSIS");
        assert!(result.agent_memories.is_none());
    }

    #[tokio::test]
    async fn failed_step_is_recorded_and_run_continues() {
        let provider = Arc::new(ScriptedProvider::new(vec![
            Err(service_error("down")),
            Ok("CODE".into()),
        ]));
        let exec = executor(provider.clone(), two_step());

        let result = exec.execute("two", "prompt").await.unwrap();
        assert!(!result.success);
        assert_eq!(result.context.errors.len(), 1);
        assert!(result.context.errors[0].contains("(analysis) failed"));
        assert_eq!(result.execution_log.len(), 2);
        assert_eq!(provider.call_count(), 2);
    }

    #[tokio::test]
    async fn supervisor_failure_stops_the_loop() {
        let mut registry = PipelineRegistry::new();
        registry.register(
            Pipeline::new("sup", "Sup", "")
                .step(
                    Step::templated(AgentRole::Supervisor, "{user_prompt}")
                        .with_output_key("final_summary"),
                )
                .step(Step::templated(AgentRole::Coder, "{user_prompt}")),
        );
        let provider = Arc::new(ScriptedProvider::new(vec![Err(service_error("down"))]));
        let exec = executor(provider.clone(), registry);

        let result = exec.execute("sup", "p").await.unwrap();
        assert_eq!(provider.call_count(), 1);
        assert_eq!(result.execution_log.len(), 1);
        assert_eq!(result.context.step_count, 1);
    }

    #[tokio::test]
    async fn memory_run_collects_per_agent_memories() {
        let provider = Arc::new(RuleProvider::new(|req| {
            if system_prompt_of(req).contains("memory agent") {
                Ok(MEMORY_REPLY.to_string())
            } else {
                Ok("step output".to_string())
            }
        }));
        let exec = executor(provider.clone(), two_step());

        let result = exec.execute_with_memory("two", "prompt").await.unwrap();
        let memories = result.agent_memories.as_ref().unwrap();
        // Only the analysis step stores its output.
        assert_eq!(memories.len(), 1);
        assert_eq!(memories["analysis"].len(), 1);
        assert_eq!(provider.call_count(), 3);
    }

    #[tokio::test]
    async fn memory_failure_does_not_fail_the_run() {
        let provider = Arc::new(RuleProvider::new(|req| {
            if system_prompt_of(req).contains("memory agent") {
                Err(service_error("memory service down"))
            } else {
                Ok("ok".to_string())
            }
        }));
        let exec = executor(provider, two_step());

        let result = exec.execute_with_memory("two", "prompt").await.unwrap();
        assert!(result.success);
        assert!(result.agent_memories.unwrap().is_empty());
    }
}
