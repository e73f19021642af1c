//! Single-agent execution shared by both executors.

use agentrelay_config::AppConfig;
use agentrelay_core::agent::AgentRole;
use agentrelay_core::error::ProviderError;
use agentrelay_core::event::{DomainEvent, EventBus};
use agentrelay_core::provider::{Provider, ProviderRequest};
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Model parameters and pacing for step execution.
#[derive(Debug, Clone)]
pub struct ExecutionSettings {
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
    /// Pause between steps. Zero disables it.
    pub step_delay: Duration,
}

impl ExecutionSettings {
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            temperature: 0.7,
            max_tokens: 4096,
            step_delay: Duration::ZERO,
        }
    }

    pub fn with_step_delay(mut self, delay: Duration) -> Self {
        self.step_delay = delay;
        self
    }
}

impl From<&AppConfig> for ExecutionSettings {
    fn from(config: &AppConfig) -> Self {
        Self {
            model: config.model().to_string(),
            temperature: config.default_temperature,
            max_tokens: config.default_max_tokens,
            step_delay: Duration::from_millis(config.orchestration.step_delay_ms),
        }
    }
}

/// Runs one agent call and reports it on the event bus.
#[derive(Clone)]
pub struct AgentRunner {
    provider: Arc<dyn Provider>,
    settings: ExecutionSettings,
    events: Arc<EventBus>,
}

impl AgentRunner {
    pub fn new(
        provider: Arc<dyn Provider>,
        settings: ExecutionSettings,
        events: Arc<EventBus>,
    ) -> Self {
        Self {
            provider,
            settings,
            events,
        }
    }

    pub fn provider(&self) -> Arc<dyn Provider> {
        self.provider.clone()
    }

    pub fn settings(&self) -> &ExecutionSettings {
        &self.settings
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    /// Send `input` to `role` under `system_prompt` and return the reply text.
    pub async fn run(
        &self,
        run_id: &str,
        step: usize,
        role: &AgentRole,
        system_prompt: &str,
        input: String,
    ) -> Result<String, ProviderError> {
        self.events.publish(DomainEvent::StepStarted {
            run_id: run_id.to_string(),
            step,
            agent_role: role.to_string(),
            timestamp: Utc::now(),
        });

        let request = ProviderRequest::new(&self.settings.model, system_prompt, input)
            .with_temperature(self.settings.temperature)
            .with_max_tokens(self.settings.max_tokens);

        match self.provider.complete(request).await {
            Ok(response) => {
                let output = response.message.content;
                debug!(run_id, step, role = %role, output_chars = output.len(), "Agent replied");
                self.events.publish(DomainEvent::StepCompleted {
                    run_id: run_id.to_string(),
                    step,
                    agent_role: role.to_string(),
                    output_chars: output.len(),
                    timestamp: Utc::now(),
                });
                Ok(output)
            }
            Err(e) => {
                warn!(run_id, step, role = %role, error = %e, "Agent call failed");
                self.events.publish(DomainEvent::StepFailed {
                    run_id: run_id.to_string(),
                    step,
                    agent_role: role.to_string(),
                    error_message: e.to_string(),
                    timestamp: Utc::now(),
                });
                Err(e)
            }
        }
    }

    /// Pause between steps, if configured.
    pub async fn pace(&self) {
        if !self.settings.step_delay.is_zero() {
            tokio::time::sleep(self.settings.step_delay).await;
        }
    }
}
