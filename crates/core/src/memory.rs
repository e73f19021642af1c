//! Agent memory records and the store they are kept in.
//!
//! A memory is a distilled, scored record of what one step learned. Memories
//! are created once per completed step, never mutated afterwards, and copied
//! into a process-wide store keyed by run. Pruning classifies memories for a
//! later task but never deletes them from the store.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::agent::AgentRole;
use crate::error::MemoryError;

/// Rule-based tags describing why a memory should be kept around.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RetentionFlag {
    CoreInterpretation,
    PermanentRetention,
    ImplementationPatterns,
    TechnicalDecisions,
    QualityInsights,
    ErrorPrevention,
    ProblemResolution,
}

/// A single memory produced by one step of one run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentMemory {
    /// Unique ID for this memory
    pub id: String,

    /// The role whose output this memory describes
    pub agent_role: AgentRole,

    /// Derived from `agent_role` via the role table
    pub memory_type: String,

    /// Structured payload (insights, technical decisions, context, lessons)
    pub content: serde_json::Value,

    /// When the memory was created
    pub timestamp: DateTime<Utc>,

    /// Keyword overlap with the originating prompt, 0..=10
    pub relevance_score: u8,

    /// Why this memory is worth keeping
    #[serde(default)]
    pub retention_flags: BTreeSet<RetentionFlag>,
}

impl AgentMemory {
    pub fn has_flag(&self, flag: RetentionFlag) -> bool {
        self.retention_flags.contains(&flag)
    }
}

/// Memories grouped by the agent that produced them, groups in order of
/// first appearance.
pub type GroupedMemories = Vec<(String, Vec<AgentMemory>)>;

/// Group a flat list of memories by agent role name. Groups keep the order
/// in which their role first appeared, memories keep their order within a
/// group.
pub fn group_by_role(memories: impl IntoIterator<Item = AgentMemory>) -> GroupedMemories {
    let mut grouped = GroupedMemories::new();
    for memory in memories {
        let role = memory.agent_role.as_str();
        match grouped.iter_mut().find(|(name, _)| name == role) {
            Some((_, group)) => group.push(memory),
            None => grouped.push((role.to_string(), vec![memory])),
        }
    }
    grouped
}

/// Flatten grouped memories back into one list, group by group.
pub fn flatten_groups(grouped: &GroupedMemories) -> impl Iterator<Item = &AgentMemory> {
    grouped.iter().flat_map(|(_, group)| group)
}

/// Outcome of evaluating existing memories against a new task.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PruningResult {
    pub relevant_memories: Vec<AgentMemory>,
    pub pruned_memories: Vec<AgentMemory>,
    pub context_summary: String,
    pub cleanup_recommendations: Vec<String>,
}

/// Append-only store of run memories.
///
/// Keys are unique per run (`pipeline-{id}-{timestamp}`), so concurrent runs
/// never write the same key.
#[async_trait]
pub trait MemoryStore: Send + Sync {
    /// The backend name (e.g., "in_memory", "file").
    fn name(&self) -> &str;

    /// Record the memories of one run under `key`.
    async fn put(&self, key: &str, memories: Vec<AgentMemory>) -> Result<(), MemoryError>;

    /// Memories stored under exactly `key`; empty when the key is unknown.
    async fn get(&self, key: &str) -> Result<Vec<AgentMemory>, MemoryError>;

    /// All memories stored under keys starting with `prefix`, in key order.
    async fn query_by_prefix(&self, prefix: &str) -> Result<Vec<AgentMemory>, MemoryError>;

    /// All run keys currently held.
    async fn keys(&self) -> Result<Vec<String>, MemoryError>;

    /// Total number of memories across all keys.
    async fn len(&self) -> Result<usize, MemoryError>;

    async fn is_empty(&self) -> Result<bool, MemoryError> {
        Ok(self.len().await? == 0)
    }
}
