//! In-memory store: the default process-wide store and the test double.

use agentrelay_core::error::MemoryError;
use agentrelay_core::memory::{AgentMemory, MemoryStore};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Run memories kept in a map keyed by run key.
///
/// `put` on an existing key appends, so two runs that happen to share a
/// timestamp never overwrite each other.
pub struct InMemoryStore {
    runs: Arc<RwLock<BTreeMap<String, Vec<AgentMemory>>>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            runs: Arc::new(RwLock::new(BTreeMap::new())),
        }
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MemoryStore for InMemoryStore {
    fn name(&self) -> &str {
        "in_memory"
    }

    async fn put(&self, key: &str, memories: Vec<AgentMemory>) -> Result<(), MemoryError> {
        self.runs
            .write()
            .await
            .entry(key.to_string())
            .or_default()
            .extend(memories);
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Vec<AgentMemory>, MemoryError> {
        Ok(self.runs.read().await.get(key).cloned().unwrap_or_default())
    }

    async fn query_by_prefix(&self, prefix: &str) -> Result<Vec<AgentMemory>, MemoryError> {
        let runs = self.runs.read().await;
        Ok(runs
            .range(prefix.to_string()..)
            .take_while(|(key, _)| key.starts_with(prefix))
            .flat_map(|(_, memories)| memories.iter().cloned())
            .collect())
    }

    async fn keys(&self) -> Result<Vec<String>, MemoryError> {
        Ok(self.runs.read().await.keys().cloned().collect())
    }

    async fn len(&self) -> Result<usize, MemoryError> {
        Ok(self.runs.read().await.values().map(Vec::len).sum())
    }
}
