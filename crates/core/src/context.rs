//! The per-run accumulator and the result handed back to callers.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::memory::AgentMemory;

/// Result key written by supervisor steps.
pub const FINAL_SUMMARY_KEY: &str = "final_summary";
/// Result key written by code-generation steps.
pub const GENERATED_CODE_KEY: &str = "generated_code";
/// Final result when neither of the keys above was populated.
pub const FINAL_RESULT_PLACEHOLDER: &str = "Pipeline completed";

/// State threaded through one pipeline run.
///
/// Owned by exactly one run and mutated only by the executor driving it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PipelineContext {
    pub user_prompt: String,
    pub results: HashMap<String, String>,
    pub errors: Vec<String>,
    pub step_count: usize,
    pub max_steps: usize,
}

impl PipelineContext {
    pub fn new(user_prompt: impl Into<String>, max_steps: usize) -> Self {
        Self {
            user_prompt: user_prompt.into(),
            max_steps,
            ..Self::default()
        }
    }

    /// Advance the step counter. Returns `false` (and leaves the counter
    /// alone) once `max_steps` has been reached.
    pub fn begin_step(&mut self) -> bool {
        if self.step_count >= self.max_steps {
            return false;
        }
        self.step_count += 1;
        true
    }

    pub fn result(&self, key: &str) -> Option<&str> {
        self.results.get(key).map(String::as_str)
    }

    pub fn set_result(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.results.insert(key.into(), value.into());
    }

    pub fn record_error(&mut self, error: impl Into<String>) {
        self.errors.push(error.into());
    }

    /// `final_summary`, then `generated_code`, then the placeholder.
    pub fn final_result(&self) -> String {
        self.result(FINAL_SUMMARY_KEY)
            .or_else(|| self.result(GENERATED_CODE_KEY))
            .unwrap_or(FINAL_RESULT_PLACEHOLDER)
            .to_string()
    }
}

/// What a pipeline or orchestration run reports back.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunResult {
    pub success: bool,
    pub final_result: String,
    pub context: PipelineContext,
    pub execution_log: Vec<String>,
    /// Present only for memory-enabled runs; keyed by agent name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_memories: Option<HashMap<String, Vec<AgentMemory>>>,
}

impl RunResult {
    /// Every memory in the result, flattened.
    pub fn all_memories(&self) -> Vec<AgentMemory> {
        self.agent_memories
            .as_ref()
            .map(|m| m.values().flatten().cloned().collect())
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn step_count_never_exceeds_max() {
        let mut ctx = PipelineContext::new("prompt", 2);
        assert!(ctx.begin_step());
        assert!(ctx.begin_step());
        assert!(!ctx.begin_step());
        assert_eq!(ctx.step_count, 2);
    }

    #[test]
    fn final_result_prefers_summary_then_code() {
        let mut ctx = PipelineContext::new("p", 1);
        assert_eq!(ctx.final_result(), FINAL_RESULT_PLACEHOLDER);

        ctx.set_result(GENERATED_CODE_KEY, "fn main() {}");
        assert_eq!(ctx.final_result(), "fn main() {}");

        ctx.set_result(FINAL_SUMMARY_KEY, "all done");
        assert_eq!(ctx.final_result(), "all done");
    }

    #[test]
    fn result_keys_are_unique() {
        let mut ctx = PipelineContext::new("p", 1);
        ctx.set_result("analysis", "first");
        ctx.set_result("analysis", "second");
        assert_eq!(ctx.results.len(), 1);
        assert_eq!(ctx.result("analysis"), Some("second"));
    }
}
