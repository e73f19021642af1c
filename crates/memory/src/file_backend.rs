//! File-based memory store: persistent JSON-lines storage.
//!
//! Each line is one `{ "key": ..., "memory": {...} }` record. The file is
//! loaded on open and appended to on every `put`, which lets run memories
//! survive between CLI invocations so later runs can prune against them.
//!
//! Storage location: `~/.agentrelay/memory/memories.jsonl` unless configured.

use agentrelay_core::error::MemoryError;
use agentrelay_core::memory::{AgentMemory, MemoryStore};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use tokio::sync::RwLock;
use tracing::{debug, warn};

#[derive(Serialize, Deserialize)]
struct StoredRecord {
    key: String,
    memory: AgentMemory,
}

/// A file-backed run memory store using JSONL.
pub struct FileMemoryStore {
    path: PathBuf,
    runs: RwLock<BTreeMap<String, Vec<AgentMemory>>>,
}

impl FileMemoryStore {
    /// Open the store at `path`. A missing file starts empty and is created
    /// on first write.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let runs = Self::load_from_disk(&path);
        debug!(path = %path.display(), runs = runs.len(), "File memory store loaded");
        Self {
            path,
            runs: RwLock::new(runs),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load_from_disk(path: &Path) -> BTreeMap<String, Vec<AgentMemory>> {
        let mut runs: BTreeMap<String, Vec<AgentMemory>> = BTreeMap::new();
        let Ok(content) = std::fs::read_to_string(path) else {
            return runs;
        };

        for line in content.lines().filter(|l| !l.trim().is_empty()) {
            match serde_json::from_str::<StoredRecord>(line) {
                Ok(record) => runs.entry(record.key).or_default().push(record.memory),
                Err(e) => warn!(error = %e, "Skipping corrupted memory record"),
            }
        }
        runs
    }

    fn append_to_disk(&self, key: &str, memories: &[AgentMemory]) -> Result<(), MemoryError> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                MemoryError::Storage(format!("Failed to create memory directory: {e}"))
            })?;
        }

        let mut content = String::new();
        for memory in memories {
            let record = StoredRecord {
                key: key.to_string(),
                memory: memory.clone(),
            };
            let line = serde_json::to_string(&record).map_err(|e| {
                MemoryError::Storage(format!("Failed to serialize memory record: {e}"))
            })?;
            content.push_str(&line);
            content.push('\n');
        }

        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|e| MemoryError::Storage(format!("Failed to open memory file: {e}")))?;
        file.write_all(content.as_bytes())
            .map_err(|e| MemoryError::Storage(format!("Failed to write memory file: {e}")))?;
        Ok(())
    }
}

#[async_trait]
impl MemoryStore for FileMemoryStore {
    fn name(&self) -> &str {
        "file"
    }

    async fn put(&self, key: &str, memories: Vec<AgentMemory>) -> Result<(), MemoryError> {
        let mut runs = self.runs.write().await;
        self.append_to_disk(key, &memories)?;
        runs.entry(key.to_string()).or_default().extend(memories);
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
