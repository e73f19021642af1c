//! Agent memory for agentrelay.
//!
//! [`MemoryEngine`] turns a completed step into a scored [`AgentMemory`],
//! [`MemoryPruner`] decides which stored memories matter for a new task, and
//! the store backends keep run memories between (file) or within (in-memory)
//! processes.

pub mod engine;
pub mod file_backend;
pub mod in_memory;
pub mod pruner;

pub use engine::MemoryEngine;
pub use file_backend::FileMemoryStore;
pub use in_memory::InMemoryStore;
pub use pruner::MemoryPruner;

use agentrelay_core::error::MemoryError;
use agentrelay_core::memory::{AgentMemory, MemoryStore};
use std::path::PathBuf;
use std::sync::Arc;

/// Store key for one pipeline run: `pipeline-{id}-{unix_millis}`.
pub fn run_key(pipeline_id: &str, unix_millis: i64) -> String {
    format!("{}{unix_millis}", run_key_prefix(pipeline_id))
}

/// Prefix shared by every run of one pipeline.
///
/// Not unique on its own: `pipeline-analysis-` also prefixes `analysis-only`
/// runs. Use [`is_run_of`] to attribute a key.
pub fn run_key_prefix(pipeline_id: &str) -> String {
    format!("pipeline-{pipeline_id}-")
}

/// Whether `key` was written by a run of `pipeline_id`.
pub fn is_run_of(key: &str, pipeline_id: &str) -> bool {
    key.strip_prefix(&run_key_prefix(pipeline_id))
        .is_some_and(|rest| !rest.is_empty() && rest.bytes().all(|b| b.is_ascii_digit()))
}

/// Every stored memory of `pipeline_id`, oldest run first.
pub async fn pipeline_memories(
    store: &dyn MemoryStore,
    pipeline_id: &str,
) -> Result<Vec<AgentMemory>, MemoryError> {
    let mut memories = Vec::new();
    for key in store.keys().await? {
        if is_run_of(&key, pipeline_id) {
            memories.extend(store.get(&key).await?);
        }
    }
    Ok(memories)
}

/// Open the store named by `backend` ("file" or "in_memory").
pub fn open_store(backend: &str, path: PathBuf) -> Arc<dyn MemoryStore> {
    match backend {
        "in_memory" => Arc::new(InMemoryStore::new()),
        _ => Arc::new(FileMemoryStore::open(path)),
    }
}

#[cfg(test)]
pub(crate) fn test_memory(
    role: agentrelay_core::AgentRole,
    id: &str,
) -> agentrelay_core::AgentMemory {
    agentrelay_core::AgentMemory {
        id: id.to_string(),
        memory_type: role.memory_type().to_string(),
        agent_role: role,
        content: serde_json::json!({
            "insights": [format!("insight from {id}")],
            "technical_decisions": [],
            "contextual_info": {},
            "lessons_learned": [],
        }),
        timestamp: chrono::Utc::now(),
        relevance_score: 1,
        retention_flags: Default::default(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_keys_share_pipeline_prefix() {
        let key = run_key("code-development", 1_700_000_000_000);
        assert_eq!(key, "pipeline-code-development-1700000000000");
        assert!(key.starts_with(&run_key_prefix("code-development")));
    }

    #[test]
    fn run_attribution_is_exact() {
        assert!(is_run_of(&run_key("analysis", 5), "analysis"));
        assert!(is_run_of(&run_key("analysis-only", 5), "analysis-only"));
        assert!(!is_run_of(&run_key("analysis-only", 5), "analysis"));
        assert!(!is_run_of("pipeline-analysis-", "analysis"));
    }

    #[tokio::test]
    async fn pipeline_memories_skip_lookalike_pipelines() {
        let store = InMemoryStore::new();
        let analysis = agentrelay_core::AgentRole::Analysis;
        for (key, id) in [
            (run_key("analysis", 2), "late"),
            (run_key("analysis", 1), "early"),
            (run_key("analysis-only", 3), "other"),
        ] {
            store.put(&key, vec![test_memory(analysis.clone(), id)]).await.unwrap();
        }

        let found = pipeline_memories(&store, "analysis").await.unwrap();
        let ids: Vec<&str> = found.iter().map(|m| m.id.as_str()).collect();
        assert_eq!(ids, vec!["early", "late"]);
        assert_eq!(store.get(&run_key("analysis-only", 3)).await.unwrap().len(), 1);
        assert!(store.get("missing").await.unwrap().is_empty());
    }

    #[test]
    fn open_store_by_backend_name() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("m.jsonl");
        assert_eq!(open_store("in_memory", path.clone()).name(), "in_memory");
        assert_eq!(open_store("file", path).name(), "file");
    }
}
