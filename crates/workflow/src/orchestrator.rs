//! The registry surface callers use: list, run, remember, analyze.

use agentrelay_config::AppConfig;
use agentrelay_core::context::RunResult;
use agentrelay_core::error::Error;
use agentrelay_core::event::{DomainEvent, EventBus};
use agentrelay_core::memory::{AgentMemory, MemoryStore, PruningResult};
use agentrelay_core::provider::Provider;
use agentrelay_memory::{MemoryPruner, run_key};
use chrono::Utc;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{info, warn};

use crate::executor::PipelineExecutor;
use crate::intelligent::IntelligentOrchestrator;
use crate::pipeline::{Pipeline, PipelineRegistry};
use crate::runner::{AgentRunner, ExecutionSettings};

/// Pipeline id under which intelligent runs store their memories.
pub const INTELLIGENT_PIPELINE_ID: &str = "intelligent";

/// Front door to pipelines, intelligent runs and stored memories.
pub struct AgentOrchestrator {
    executor: PipelineExecutor,
    intelligent: IntelligentOrchestrator,
    pruner: MemoryPruner,
    store: Arc<dyn MemoryStore>,
    events: Arc<EventBus>,
}

impl AgentOrchestrator {
    /// An orchestrator with the built-in pipelines.
    pub fn new(
        provider: Arc<dyn Provider>,
        store: Arc<dyn MemoryStore>,
        settings: ExecutionSettings,
    ) -> Self {
        Self::with_registry(provider, store, settings, PipelineRegistry::with_builtins())
    }

    pub fn with_registry(
        provider: Arc<dyn Provider>,
        store: Arc<dyn MemoryStore>,
        settings: ExecutionSettings,
        registry: PipelineRegistry,
    ) -> Self {
        let events = Arc::new(EventBus::default());
        let pruner = MemoryPruner::new(provider.clone(), &settings.model);
        let runner = AgentRunner::new(provider, settings, events.clone());

        info!(pipelines = registry.len(), store = store.name(), "Orchestrator ready");
        Self {
            executor: PipelineExecutor::new(Arc::new(registry), runner.clone()),
            intelligent: IntelligentOrchestrator::new(runner),
            pruner,
            store,
            events,
        }
    }

    /// Built-ins plus the pipelines declared in `config`.
    pub fn from_config(
        config: &AppConfig,
        provider: Arc<dyn Provider>,
        store: Arc<dyn MemoryStore>,
    ) -> Self {
        Self::with_registry(
            provider,
            store,
            ExecutionSettings::from(config),
            PipelineRegistry::from_config(&config.pipelines),
        )
    }

    /// Enabled pipelines, in registration order.
    pub fn list_pipelines(&self) -> Vec<&Pipeline> {
        self.executor.registry().enabled().collect()
    }

    pub fn get_pipeline(&self, id: &str) -> Option<&Pipeline> {
        self.executor.registry().get(id)
    }

    pub async fn execute(&self, pipeline_id: &str, user_prompt: &str) -> Result<RunResult, Error> {
        self.executor.execute(pipeline_id, user_prompt).await
    }

    /// Run with memory generation and persist the run's memories.
    pub async fn execute_with_memory(
        &self,
        pipeline_id: &str,
        user_prompt: &str,
    ) -> Result<RunResult, Error> {
        let result = self.executor.execute_with_memory(pipeline_id, user_prompt).await?;
        self.persist(pipeline_id, &result).await;
        Ok(result)
    }

    /// Interpret, plan, execute and supervise, then persist the memories.
    pub async fn execute_intelligent(&self, user_prompt: &str) -> RunResult {
        let result = self.intelligent.execute(user_prompt).await;
        self.persist(INTELLIGENT_PIPELINE_ID, &result).await;
        result
    }

    /// Prune the stored memories of `pipeline_id` against `user_prompt`.
    pub async fn analyze_memories(
        &self,
        pipeline_id: &str,
        user_prompt: &str,
    ) -> Result<Option<PruningResult>, Error> {
        Ok(self
            .pruner
            .analyze_for_pipeline(self.store.as_ref(), pipeline_id, user_prompt)
            .await?)
    }

    pub async fn analyze_workflow_choice(&self, user_prompt: &str) -> Result<String, Error> {
        self.intelligent.analyze_workflow_choice(user_prompt).await
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Arc<DomainEvent>> {
        self.events.subscribe()
    }

    pub fn store(&self) -> &Arc<dyn MemoryStore> {
        &self.store
    }

    /// Store failures are logged; the run result stands either way.
    async fn persist(&self, pipeline_id: &str, result: &RunResult) {
        let mut memories: Vec<AgentMemory> = result.all_memories();
        if memories.is_empty() {
            return;
        }
        memories.sort_by_key(|m| m.timestamp);

        let key = run_key(pipeline_id, Utc::now().timestamp_millis());
        let count = memories.len();
        match self.store.put(&key, memories).await {
            Ok(()) => info!(key = %key, count, "Run memories stored"),
            Err(e) => warn!(key = %key, error = %e, "Failed to store run memories"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use agentrelay_core::agent::AgentRole;
    use agentrelay_core::error::PipelineError;
    use agentrelay_core::testing::{RuleProvider, ScriptedProvider, system_prompt_of};
    use agentrelay_memory::InMemoryStore;
    use agentrelay_memory::pruner::FALLBACK_SUMMARY;

    const MEMORY_REPLY: &str = r#"{"insights": ["parser"], "technical_decisions": [],
        "contextual_info": {}, "lessons_learned": []}"#;

    fn memory_aware() -> Arc<RuleProvider> {
        Arc::new(RuleProvider::new(|req| {
            if system_prompt_of(req).contains("memory agent") {
                Ok(MEMORY_REPLY.to_string())
            } else if system_prompt_of(req) == AgentRole::MemoryPruner.system_prompt() {
                Ok("no idea".to_string())
            } else {
                Ok("done".to_string())
            }
        }))
    }

    fn orchestrator(provider: Arc<dyn Provider>) -> AgentOrchestrator {
        AgentOrchestrator::new(
            provider,
            Arc::new(InMemoryStore::new()),
            ExecutionSettings::new("mock-model"),
        )
    }

    #[test]
    fn list_pipelines_hides_disabled() {
        let orch = orchestrator(Arc::new(ScriptedProvider::new(vec![])));
        let ids: Vec<&str> = orch.list_pipelines().iter().map(|p| p.id.as_str()).collect();
        assert!(!ids.contains(&"legacy-review"));
        assert!(orch.get_pipeline("legacy-review").is_some());
    }

    #[tokio::test]
    async fn execute_unknown_pipeline() {
        let orch = orchestrator(Arc::new(ScriptedProvider::new(vec![])));
        let err = orch.execute("missing", "p").await.unwrap_err();
        assert!(matches!(err, Error::Pipeline(PipelineError::NotFound(_))));
    }

    #[tokio::test]
    async fn memory_runs_are_stored_and_analyzable() {
        let orch = orchestrator(memory_aware());

        assert!(orch.analyze_memories("quick-fix", "fix parser").await.unwrap().is_none());

        let result = orch.execute_with_memory("quick-fix", "fix parser").await.unwrap();
        assert_eq!(result.all_memories().len(), 3);
        assert_eq!(orch.store().len().await.unwrap(), 3);
        let keys = orch.store().keys().await.unwrap();
        assert!(keys[0].starts_with("pipeline-quick-fix-"));

        let pruning = orch.analyze_memories("quick-fix", "fix parser").await.unwrap().unwrap();
        assert_eq!(pruning.context_summary, FALLBACK_SUMMARY);
        assert_eq!(pruning.relevant_memories.len(), 3);
    }

    #[tokio::test]
    async fn plain_execute_stores_nothing() {
        let orch = orchestrator(memory_aware());
        orch.execute("analysis-only", "p").await.unwrap();
        assert!(orch.store().is_empty().await.unwrap());
    }

    #[tokio::test]
    async fn intelligent_runs_store_under_their_own_prefix() {
        let orch = orchestrator(memory_aware());
        let mut events = orch.subscribe();

        let result = orch.execute_intelligent("fix parser").await;
        assert!(result.success);

        let keys = orch.store().keys().await.unwrap();
        assert_eq!(keys.len(), 1);
        assert!(keys[0].starts_with("pipeline-intelligent-"));
        assert!(matches!(events.recv().await.unwrap().as_ref(), DomainEvent::StepStarted { .. }));
    }
}
