//! Memory pruning: which stored memories still matter for a new task.
//!
//! The pruning meta-agent sees at most [`MAX_CANDIDATES`] memories and answers
//! with the ids it wants to keep and drop. Its answer is matched back to the
//! candidates by id. When the answer cannot be used at all, pruning degrades
//! to a fixed rule: keep the first [`FALLBACK_RETAINED`] candidates.

use agentrelay_core::agent::AgentRole;
use agentrelay_core::error::MemoryError;
use agentrelay_core::memory::{
    AgentMemory, GroupedMemories, MemoryStore, PruningResult, flatten_groups, group_by_role,
};
use agentrelay_core::payload::extract_as;
use agentrelay_core::provider::{Provider, ProviderRequest};
use serde::Deserialize;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::engine::truncate_chars;
use crate::pipeline_memories;

pub const PRUNING_TEMPERATURE: f32 = 0.2;
pub const PRUNING_MAX_TOKENS: u32 = 2000;
/// Candidates sent to the pruning agent.
pub const MAX_CANDIDATES: usize = 10;
/// Candidates kept when the pruning answer is unusable.
pub const FALLBACK_RETAINED: usize = 5;
pub const FALLBACK_SUMMARY: &str = "Automatic fallback pruning applied: the pruning response could \
     not be parsed, so the first 5 memories were retained.";
pub const FALLBACK_RECOMMENDATION: &str = "Improve pruning response parsing";

const MAX_CONTENT_CHARS: usize = 800;

/// A memory reference in the pruning answer: a bare id or an object with one.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum MemoryRef {
    Id(String),
    Object { id: String },
}

impl MemoryRef {
    fn id(&self) -> &str {
        match self {
            Self::Id(id) | Self::Object { id } => id,
        }
    }
}

#[derive(Debug, Deserialize)]
struct PruningAnswer {
    #[serde(alias = "relevantMemories", alias = "relevant_memory_ids")]
    relevant_memories: Vec<MemoryRef>,
    #[serde(default, alias = "prunedMemories", alias = "pruned_memory_ids")]
    pruned_memories: Vec<MemoryRef>,
    #[serde(default, alias = "contextSummary")]
    context_summary: String,
    #[serde(default, alias = "cleanupRecommendations")]
    cleanup_recommendations: Vec<String>,
}

/// Classifies memories as relevant or pruned for a new prompt.
pub struct MemoryPruner {
    provider: Arc<dyn Provider>,
    model: String,
}

impl MemoryPruner {
    pub fn new(provider: Arc<dyn Provider>, model: impl Into<String>) -> Self {
        Self {
            provider,
            model: model.into(),
        }
    }

    /// Partition `memories` for `current_prompt`.
    ///
    /// Never fails: a failed call or an unusable answer yields the fallback
    /// result.
    pub async fn prune(
        &self,
        original_prompt: &str,
        memories: &GroupedMemories,
        current_prompt: &str,
    ) -> PruningResult {
        let candidates: Vec<AgentMemory> = flatten_groups(memories)
            .take(MAX_CANDIDATES)
            .cloned()
            .collect();

        let request = ProviderRequest::new(
            &self.model,
            AgentRole::MemoryPruner.system_prompt(),
            pruning_input(original_prompt, current_prompt, &candidates),
        )
        .with_temperature(PRUNING_TEMPERATURE)
        .with_max_tokens(PRUNING_MAX_TOKENS);

        let answer = match self.provider.complete(request).await {
            Ok(response) => extract_as::<PruningAnswer>(&response.message.content)
                .map_err(|e| MemoryError::Pruning(e.to_string())),
            Err(e) => Err(MemoryError::Pruning(e.to_string())),
        };

        match answer {
            Ok(answer) => {
                let result = classify(candidates, answer);
                info!(
                    relevant = result.relevant_memories.len(),
                    pruned = result.pruned_memories.len(),
                    "Memories pruned"
                );
                result
            }
            Err(e) => {
                warn!(error = %e, "Pruning answer unusable, applying fallback");
                fallback(candidates)
            }
        }
    }

    /// Prune every stored memory of `pipeline_id` against `user_prompt`.
    ///
    /// Returns `Ok(None)` when the pipeline has no stored memories yet.
    pub async fn analyze_for_pipeline(
        &self,
        store: &dyn MemoryStore,
        pipeline_id: &str,
        user_prompt: &str,
    ) -> Result<Option<PruningResult>, MemoryError> {
        let memories = pipeline_memories(store, pipeline_id).await?;
        if memories.is_empty() {
            debug!(pipeline = pipeline_id, "No stored memories to analyze");
            return Ok(None);
        }

        let grouped = group_by_role(memories);
        Ok(Some(self.prune(user_prompt, &grouped, user_prompt).await))
    }
}

fn pruning_input(
    original_prompt: &str,
    current_prompt: &str,
    candidates: &[AgentMemory],
) -> String {
    let mut input = format!(
        "Original request:\n{original_prompt}\n\nCurrent request:\n{current_prompt}\n\nMemories:\n"
    );
    for memory in candidates {
        input.push_str(&format!(
            "- id: {} | agent: {} | type: {} | relevance: {} | content: {}\n",
            memory.id,
            memory.agent_role,
            memory.memory_type,
            memory.relevance_score,
            truncate_chars(&memory.content.to_string(), MAX_CONTENT_CHARS),
        ));
    }
    input.push_str(
        "\nAlways keep the interpreter memory. Keep memories relevant to the current request \
         and drop stale or redundant ones. Respond ONLY with a JSON object: \
         {\"relevant_memories\": [ids], \"pruned_memories\": [ids], \
         \"context_summary\": string, \"cleanup_recommendations\": [strings]}",
    );
    input
}

/// Match the answer back to the candidates by id.
///
/// Unknown ids are ignored, memories the answer never mentions are pruned and
/// the interpreter memory is always kept.
fn classify(candidates: Vec<AgentMemory>, answer: PruningAnswer) -> PruningResult {
    let keep: HashSet<&str> = answer.relevant_memories.iter().map(MemoryRef::id).collect();
    let conflicting = answer
        .pruned_memories
        .iter()
        .filter(|r| keep.contains(r.id()))
        .count();
    if conflicting > 0 {
        debug!(conflicting, "Ids listed as both relevant and pruned are kept");
    }

    let (relevant_memories, pruned_memories): (Vec<_>, Vec<_>) = candidates
        .into_iter()
        .partition(|m| keep.contains(m.id.as_str()) || m.agent_role == AgentRole::Interpreter);

    PruningResult {
        relevant_memories,
        pruned_memories,
        context_summary: answer.context_summary,
        cleanup_recommendations: answer.cleanup_recommendations,
    }
}

fn fallback(mut candidates: Vec<AgentMemory>) -> PruningResult {
    let pruned_memories = candidates.split_off(candidates.len().min(FALLBACK_RETAINED));
    PruningResult {
        relevant_memories: candidates,
        pruned_memories,
        context_summary: FALLBACK_SUMMARY.to_string(),
        cleanup_recommendations: vec![FALLBACK_RECOMMENDATION.to_string()],
    }
}
