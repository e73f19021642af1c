//! Memory generation: distill what a step learned into a scored record.
//!
//! After a step completes, a role-specific meta-agent is asked to reflect on
//! the step's output and answer with a four-field structured payload. The
//! record is then scored against the user prompt and tagged with retention
//! flags. Both the score and the flags are simple rules, not learned.

use agentrelay_core::agent::AgentRole;
use agentrelay_core::context::PipelineContext;
use agentrelay_core::error::MemoryError;
use agentrelay_core::memory::{AgentMemory, RetentionFlag};
use agentrelay_core::payload::extract_structured_payload;
use agentrelay_core::provider::{Provider, ProviderRequest};
use chrono::Utc;
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{debug, warn};
use uuid::Uuid;

/// Near-deterministic generation for reflection.
pub const MEMORY_TEMPERATURE: f32 = 0.3;
pub const MEMORY_MAX_TOKENS: u32 = 1000;
/// Highest possible relevance score.
pub const MAX_RELEVANCE: u8 = 10;

/// Step output beyond this many characters is cut before reflection.
const MAX_OUTPUT_CHARS: usize = 6000;

/// Generates memory records for completed steps.
pub struct MemoryEngine {
    provider: Arc<dyn Provider>,
    model: String,
}

impl MemoryEngine {
    pub fn new(provider: Arc<dyn Provider>, model: impl Into<String>) -> Self {
        Self {
            provider,
            model: model.into(),
        }
    }

    /// Reflect on one step's output and build its memory.
    ///
    /// Failures are returned as [`MemoryError::Generation`]; callers treat
    /// them as non-fatal to the step.
    pub async fn generate(
        &self,
        agent_role: &AgentRole,
        step_output: &str,
        user_prompt: &str,
        context: &PipelineContext,
    ) -> Result<AgentMemory, MemoryError> {
        let generation_error = |reason: String| MemoryError::Generation {
            agent_role: agent_role.to_string(),
            reason,
        };

        let request = ProviderRequest::new(
            &self.model,
            reflection_system_prompt(agent_role),
            reflection_input(agent_role, step_output, user_prompt, context),
        )
        .with_temperature(MEMORY_TEMPERATURE)
        .with_max_tokens(MEMORY_MAX_TOKENS);

        let response = self
            .provider
            .complete(request)
            .await
            .map_err(|e| generation_error(e.to_string()))?;

        let content = extract_structured_payload(&response.message.content)
            .map_err(|e| generation_error(e.to_string()))?;
        if !content.is_object() {
            warn!(role = %agent_role, "Memory payload is not an object");
            return Err(generation_error("memory payload must be an object".into()));
        }

        let relevance_score = relevance_score(user_prompt, &content);
        let retention_flags = retention_flags(agent_role, &content);
        debug!(
            role = %agent_role,
            relevance_score,
            flags = retention_flags.len(),
            "Memory generated"
        );

        Ok(AgentMemory {
            id: Uuid::new_v4().to_string(),
            agent_role: agent_role.clone(),
            memory_type: agent_role.memory_type().to_string(),
            content,
            timestamp: Utc::now(),
            relevance_score,
            retention_flags,
        })
    }
}

fn reflection_system_prompt(agent_role: &AgentRole) -> String {
    format!(
        "You are the memory agent for the {role} agent. You read what the {role} agent just \
         produced and record what it learned so future runs can reuse it.\n\n\
         Respond ONLY with a JSON object with exactly these fields:\n\
         - \"insights\": array of strings, key insights gained\n\
         - \"technical_decisions\": array of strings, technical decisions made and why\n\
         - \"contextual_info\": object, facts about the project or request worth remembering\n\
         - \"lessons_learned\": array of strings, what to do differently next time",
        role = agent_role
    )
}

fn reflection_input(
    agent_role: &AgentRole,
    step_output: &str,
    user_prompt: &str,
    context: &PipelineContext,
) -> String {
    let mut completed: Vec<&str> = context.results.keys().map(String::as_str).collect();
    completed.sort_unstable();

    format!(
        "Original request:\n{user_prompt}\n\n\
         Completed results so far: {completed}\n\n\
         Output of the {agent_role} agent:\n{output}",
        completed = if completed.is_empty() {
            "none".to_string()
        } else {
            completed.join(", ")
        },
        output = truncate_chars(step_output, MAX_OUTPUT_CHARS),
    )
}

/// Keyword overlap between the prompt and the memory content.
///
/// Every whitespace-separated prompt token longer than three characters that
/// appears (case-insensitively) in the serialized content adds one point.
/// The score is clamped to [`MAX_RELEVANCE`].
pub fn relevance_score(user_prompt: &str, content: &serde_json::Value) -> u8 {
    let haystack = content.to_string().to_lowercase();
    let hits = user_prompt
        .split_whitespace()
        .filter(|token| token.chars().count() > 3)
        .filter(|token| haystack.contains(&token.to_lowercase()))
        .count();
    hits.min(MAX_RELEVANCE as usize) as u8
}

/// Rule-based retention flags for a memory.
pub fn retention_flags(
    agent_role: &AgentRole,
    content: &serde_json::Value,
) -> BTreeSet<RetentionFlag> {
    let mut flags = BTreeSet::new();
    let role = agent_role.as_str();

    if role == "interpreter" {
        flags.insert(RetentionFlag::CoreInterpretation);
        flags.insert(RetentionFlag::PermanentRetention);
    }
    if role == "coder" || role == "analysis" {
        flags.insert(RetentionFlag::ImplementationPatterns);
        flags.insert(RetentionFlag::TechnicalDecisions);
    }
    if role.contains("judge") {
        flags.insert(RetentionFlag::QualityInsights);
        flags.insert(RetentionFlag::ErrorPrevention);
    }

    let serialized = content.to_string();
    if ["error", "bug", "fix"].iter().any(|needle| serialized.contains(needle)) {
        flags.insert(RetentionFlag::ProblemResolution);
    }
    flags
}

/// Cut `text` to at most `max` characters, marking the cut.
pub fn truncate_chars(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((idx, _)) => format!("{}...", &text[..idx]),
        None => text.to_string(),
    }
}
