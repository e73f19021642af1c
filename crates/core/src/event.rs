//! Domain event system: progress reporting without rendering.
//!
//! The executors publish events as steps start, finish, or fail. Presentation
//! layers subscribe and render however they like; the core never prints.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::broadcast;

/// All domain events in the system.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum DomainEvent {
    /// A step is about to call the completion service
    StepStarted {
        run_id: String,
        step: usize,
        agent_role: String,
        timestamp: DateTime<Utc>,
    },

    /// A step produced output
    StepCompleted {
        run_id: String,
        step: usize,
        agent_role: String,
        output_chars: usize,
        timestamp: DateTime<Utc>,
    },

    /// A step's completion call failed
    StepFailed {
        run_id: String,
        step: usize,
        agent_role: String,
        error_message: String,
        timestamp: DateTime<Utc>,
    },

    /// A memory record was generated for a step
    MemoryGenerated {
        run_id: String,
        agent_role: String,
        relevance_score: u8,
        timestamp: DateTime<Utc>,
    },

    /// The workflow director produced (or fell back to) a plan
    PlanCreated {
        run_id: String,
        steps: Vec<String>,
        fallback: bool,
        timestamp: DateTime<Utc>,
    },

    /// A step is being re-run once with feedback appended
    FeedbackRetry {
        run_id: String,
        agent_role: String,
        timestamp: DateTime<Utc>,
    },
}

/// A broadcast-based event bus for domain events.
///
/// Uses `tokio::sync::broadcast` for multi-consumer pub/sub.
pub struct EventBus {
    sender: broadcast::Sender<Arc<DomainEvent>>,
}

impl EventBus {
    /// Create a new event bus with the given capacity.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publish an event to all subscribers.
    pub fn publish(&self, event: DomainEvent) {
        // No subscribers is fine.
        let _ = self.sender.send(Arc::new(event));
    }

    /// Subscribe to receive events.
    pub fn subscribe(&self) -> broadcast::Receiver<Arc<DomainEvent>> {
        self.sender.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}
