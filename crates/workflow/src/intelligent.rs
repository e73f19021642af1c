//! Dynamic orchestration: the interpreter's reading of the request decides
//! which agents run.
//!
//! ```text
//! interpret ──► plan ──► execute planned steps ──► supervise
//!    │ fail       │ unparsable                        ▲
//!    ▼            ▼                                   │ always
//!  stop      fallback plan          required step fails ─┘
//! ```
//!
//! Phases only move forward. The one exception is the feedback retry: a
//! step that asked for it and whose output signals open issues is re-run
//! exactly once.

use agentrelay_core::agent::AgentRole;
use agentrelay_core::context::{FINAL_SUMMARY_KEY, PipelineContext, RunResult};
use agentrelay_core::error::{Error, ProviderError};
use agentrelay_core::event::DomainEvent;
use agentrelay_core::payload::extract_as;
use agentrelay_memory::MemoryEngine;
use agentrelay_memory::engine::truncate_chars;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::executor::{AgentMemories, remember_with};
use crate::runner::AgentRunner;

/// Final result when the interpreter phase fails.
pub const INTERPRETATION_FAILED: &str =
    "Intelligent orchestration failed: the request could not be interpreted.";
/// Agent categories the interpreter may pick from.
pub const AGENT_MENU: [&str; 4] = ["analysis", "retrieval", "coder", "judge"];
/// Case-insensitive markers of unresolved issues in a step's output.
pub const FEEDBACK_MARKERS: [&str; 3] = ["error", "issues", "fix needed"];
/// Feedback re-runs allowed per planned step.
pub const MAX_FEEDBACK_RETRIES: u8 = 1;

const PREVIEW_CHARS: usize = 500;

/// One step proposed by the workflow director.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlannedStep {
    #[serde(alias = "agentRole", alias = "agent", alias = "role")]
    pub agent_role: String,

    #[serde(default, alias = "instruction")]
    pub instructions: String,

    #[serde(default = "default_required")]
    pub required: bool,

    #[serde(default, alias = "iterativeFeedback")]
    pub iterative_feedback: bool,

    #[serde(default, alias = "feedbackOutputKey", skip_serializing_if = "Option::is_none")]
    pub feedback_output_key: Option<String>,
}

fn default_required() -> bool {
    true
}

impl PlannedStep {
    pub fn new(agent_role: &str, instructions: impl Into<String>, required: bool) -> Self {
        Self {
            agent_role: agent_role.to_string(),
            instructions: instructions.into(),
            required,
            iterative_feedback: false,
            feedback_output_key: None,
        }
    }

    pub fn role(&self) -> AgentRole {
        AgentRole::parse(&self.agent_role)
    }

    /// Where this step's output is stored.
    pub fn result_key(&self) -> String {
        result_key(&self.role())
    }

    /// Where the feedback check looks; defaults to the step's own result.
    pub fn feedback_key(&self) -> String {
        self.feedback_output_key
            .clone()
            .unwrap_or_else(|| self.result_key())
    }
}

/// The director may answer with a bare array or an object wrapping one.
#[derive(Deserialize)]
#[serde(untagged)]
enum PlanPayload {
    Steps(Vec<PlannedStep>),
    Wrapped {
        #[serde(alias = "plan", alias = "workflow")]
        steps: Vec<PlannedStep>,
    },
}

/// analysis → coder → judge, with the judge optional.
pub fn fallback_plan(user_prompt: &str) -> Vec<PlannedStep> {
    vec![
        PlannedStep::new("analysis", format!("Analyze the request: {user_prompt}"), true),
        PlannedStep::new("coder", "Implement a solution based on the analysis", true),
        PlannedStep::new("judge", "Review the solution and list remaining issues", false),
    ]
}

/// Result key for a role: `{role}_result`.
pub fn result_key(role: &AgentRole) -> String {
    format!("{}_result", role.as_str())
}

/// The first feedback marker found in `output`, if any.
pub fn feedback_signal(output: &str) -> Option<&'static str> {
    let lowered = output.to_lowercase();
    FEEDBACK_MARKERS.into_iter().find(|marker| lowered.contains(marker))
}

/// Parse the director's answer. `None` means use the fallback.
pub fn parse_plan(text: &str) -> Option<Vec<PlannedStep>> {
    let steps = match extract_as::<PlanPayload>(text) {
        Ok(PlanPayload::Steps(steps) | PlanPayload::Wrapped { steps }) => steps,
        Err(e) => {
            debug!(error = %e, "Plan payload unusable");
            return None;
        }
    };
    let steps: Vec<PlannedStep> = steps
        .into_iter()
        .filter(|s| !s.agent_role.trim().is_empty())
        .collect();
    (!steps.is_empty()).then_some(steps)
}

/// Runs interpret / plan / execute / supervise.
pub struct IntelligentOrchestrator {
    runner: AgentRunner,
    memory: MemoryEngine,
}

/// Mutable state of one orchestration run.
struct Run {
    id: String,
    ctx: PipelineContext,
    log: Vec<String>,
    memories: AgentMemories,
    interpretation: String,
    completed: usize,
    failed: usize,
}

impl Run {
    fn fail(&mut self, message: String) {
        self.ctx.record_error(message.clone());
        self.log.push(message);
    }

    fn finish(self, success: bool, final_result: String) -> RunResult {
        RunResult {
            success,
            final_result,
            context: self.ctx,
            execution_log: self.log,
            agent_memories: Some(self.memories),
        }
    }
}

impl IntelligentOrchestrator {
    pub fn new(runner: AgentRunner) -> Self {
        let memory = MemoryEngine::new(runner.provider(), &runner.settings().model);
        Self { runner, memory }
    }

    /// Run the four phases for `user_prompt`.
    pub async fn execute(&self, user_prompt: &str) -> RunResult {
        let mut run = Run {
            id: Uuid::new_v4().to_string(),
            ctx: PipelineContext::new(user_prompt, 1),
            log: Vec::new(),
            memories: AgentMemories::new(),
            interpretation: String::new(),
            completed: 0,
            failed: 0,
        };
        info!(run_id = %run.id, "Intelligent orchestration started");

        // Interpretation
        let interpreter = AgentRole::Interpreter;
        match self
            .execute_agent(&mut run, &interpreter, interpreter_input(user_prompt))
            .await
        {
            Ok(output) => {
                run.log.push("Interpretation completed".to_string());
                run.interpretation = output;
            }
            Err(e) => {
                run.fail(format!("Interpretation failed: {e}"));
                warn!(run_id = %run.id, "Interpreter failed, aborting run");
                return run.finish(false, INTERPRETATION_FAILED.to_string());
            }
        }

        // Planning
        let plan = self.plan(&mut run).await;
        // Interpreter, every planned step with its possible retry, supervisor.
        run.ctx.max_steps = 2 + plan.len() * (1 + MAX_FEEDBACK_RETRIES as usize);

        // Execution
        self.execute_plan(&mut run, &plan).await;

        // Supervision
        let supervisor = AgentRole::Supervisor;
        let input = supervisor_input(&run);
        let success = match self.execute_agent(&mut run, &supervisor, input).await {
            Ok(summary) => {
                run.ctx.set_result(FINAL_SUMMARY_KEY, summary);
                run.log.push("Supervision completed".to_string());
                true
            }
            Err(e) => {
                run.fail(format!("Supervision failed: {e}"));
                false
            }
        };

        info!(
            run_id = %run.id,
            success,
            completed = run.completed,
            failed = run.failed,
            "Intelligent orchestration finished"
        );
        let final_result = run.ctx.final_result();
        run.finish(success, final_result)
    }

    /// The generic single-agent primitive: role prompt, one call, output
    /// stored under `{role}_result`, then a best-effort memory.
    async fn execute_agent(
        &self,
        run: &mut Run,
        role: &AgentRole,
        input: String,
    ) -> Result<String, ProviderError> {
        // `max_steps` is sized to the plan, so this never refuses.
        run.ctx.begin_step();
        let output = self
            .runner
            .run(&run.id, run.ctx.step_count, role, &role.system_prompt(), input)
            .await?;

        run.ctx.set_result(result_key(role), output.as_str());
        remember_with(
            &self.memory,
            &self.runner,
            &run.id,
            role,
            &output,
            &run.ctx,
            &mut run.memories,
        )
        .await;
        Ok(output)
    }

    async fn plan(&self, run: &mut Run) -> Vec<PlannedStep> {
        let director = AgentRole::WorkflowDirector;
        let input = planner_input(&run.ctx.user_prompt, &run.interpretation);
        let reply = self
            .runner
            .run(&run.id, 0, &director, &director.system_prompt(), input)
            .await;

        let parsed = match reply {
            Ok(text) => parse_plan(&text),
            Err(e) => {
                run.fail(format!("Planning failed: {e}"));
                None
            }
        };
        let fallback = parsed.is_none();
        let plan = parsed.unwrap_or_else(|| {
            warn!(run_id = %run.id, "Plan unusable, using fallback plan");
            fallback_plan(&run.ctx.user_prompt)
        });

        let roles: Vec<String> = plan.iter().map(|s| s.agent_role.clone()).collect();
        run.log.push(format!(
            "Plan{}: {}",
            if fallback { " (fallback)" } else { "" },
            roles.join(" -> ")
        ));
        self.runner.events().publish(DomainEvent::PlanCreated {
            run_id: run.id.clone(),
            steps: roles,
            fallback,
            timestamp: Utc::now(),
        });
        plan
    }

    async fn execute_plan(&self, run: &mut Run, plan: &[PlannedStep]) {
        for (index, planned) in plan.iter().enumerate() {
            let role = planned.role();
            let input = step_input(run, &planned.instructions);

            match self.execute_agent(run, &role, input).await {
                Ok(_) => {
                    run.completed += 1;
                    run.log.push(format!("Step {} ({role}) completed", index + 1));
                }
                Err(e) => {
                    run.failed += 1;
                    run.fail(format!("Step {} ({role}) failed: {e}", index + 1));
                    if planned.required {
                        warn!(
                            run_id = %run.id,
                            role = %role,
                            "Required step failed, skipping rest of plan"
                        );
                        let skipped = plan.len() - index - 1;
                        run.log
                            .push(format!("Skipped {skipped} remaining planned step(s)"));
                        break;
                    }
                    continue;
                }
            }

            let retries = self.feedback_loop(run, planned, &role).await;
            debug!(run_id = %run.id, role = %role, retries, "Planned step done");

            if index + 1 < plan.len() {
                self.runner.pace().await;
            }
        }
    }

    /// Re-run a feedback-enabled step while its output still signals open
    /// issues, at most [`MAX_FEEDBACK_RETRIES`] times. Returns the retries made.
    async fn feedback_loop(&self, run: &mut Run, planned: &PlannedStep, role: &AgentRole) -> u8 {
        if !planned.iterative_feedback {
            return 0;
        }
        let key = planned.feedback_key();
        let mut retries: u8 = 0;
        while let Some(feedback) = run
            .ctx
            .result(&key)
            .filter(|text| feedback_signal(text).is_some())
            .map(str::to_string)
        {
            if retries == MAX_FEEDBACK_RETRIES {
                run.log.push(format!("Feedback retries exhausted ({role})"));
                break;
            }
            retries += 1;
            if !self.retry_with_feedback(run, planned, role, &feedback).await {
                break;
            }
        }
        retries
    }

    /// Re-run `role` with the detected feedback appended. The retry's output
    /// replaces the step's result. Returns whether the retry completed.
    async fn retry_with_feedback(
        &self,
        run: &mut Run,
        planned: &PlannedStep,
        role: &AgentRole,
        feedback: &str,
    ) -> bool {
        info!(run_id = %run.id, role = %role, "Re-running step with feedback");
        self.runner.events().publish(DomainEvent::FeedbackRetry {
            run_id: run.id.clone(),
            agent_role: role.to_string(),
            timestamp: Utc::now(),
        });

        let instructions = format!(
            "{}\n\nFeedback on your previous attempt:\n{}",
            planned.instructions,
            truncate_chars(feedback, PREVIEW_CHARS * 2)
        );
        let input = step_input(run, &instructions);
        match self.execute_agent(run, role, input).await {
            Ok(_) => {
                run.log.push(format!("Feedback retry ({role}) completed"));
                true
            }
            Err(e) => {
                run.fail(format!("Feedback retry ({role}) failed: {e}"));
                false
            }
        }
    }

    /// Describe, without executing, which agents would handle `user_prompt`.
    pub async fn analyze_workflow_choice(&self, user_prompt: &str) -> Result<String, Error> {
        let director = AgentRole::WorkflowDirector;
        let input = format!(
            "Request:\n{user_prompt}\n\nDo not perform the work. Describe which agents ({}) you \
             would use, in what order, and why.",
            AGENT_MENU.join(", ")
        );
        let narrative = self
            .runner
            .run("workflow-choice", 0, &director, &director.system_prompt(), input)
            .await?;
        Ok(narrative)
    }
}

fn interpreter_input(user_prompt: &str) -> String {
    format!(
        "User request:\n{user_prompt}\n\nDecide which kind of agent should handle this next. \
         Choose one of: {}. Justify your choice.",
        AGENT_MENU.join(", ")
    )
}

fn planner_input(user_prompt: &str, interpretation: &str) -> String {
    format!(
        "Original request:\n{user_prompt}\n\nInterpreter output:\n{interpretation}\n\n\
         Plan the agents to run. Respond ONLY with a JSON array; each element has \
         \"agent_role\" (one of {}), \"instructions\", \"required\" (bool), \
         \"iterative_feedback\" (bool) and optionally \"feedback_output_key\".",
        AGENT_MENU.join(", ")
    )
}

fn step_input(run: &Run, instructions: &str) -> String {
    format!(
        "Original request:\n{}\n\nInterpretation:\n{}\n\nResults so far:\n{}\n\n\
         Your instructions:\n{}",
        run.ctx.user_prompt,
        truncate_chars(&run.interpretation, PREVIEW_CHARS * 2),
        result_previews(&run.ctx),
        instructions
    )
}

fn supervisor_input(run: &Run) -> String {
    format!(
        "Original request:\n{}\n\nInterpretation:\n{}\n\nCompleted steps: {}\nFailed steps: {}\n\n\
         Results:\n{}\n\nWrite the final deliverable for the user.",
        run.ctx.user_prompt,
        truncate_chars(&run.interpretation, PREVIEW_CHARS),
        run.completed,
        run.failed,
        result_previews(&run.ctx)
    )
}

/// Truncated previews of every result, in key order.
fn result_previews(ctx: &PipelineContext) -> String {
    let mut keys: Vec<&String> = ctx.results.keys().collect();
    keys.sort();
    if keys.is_empty() {
        return "(none)".to_string();
    }
    keys.into_iter()
        .map(|k| format!("[{k}]\n{}", truncate_chars(&ctx.results[k], PREVIEW_CHARS)))
        .collect::<Vec<_>>()
        .join("\n\n")
}
