//! # agentrelay core
//!
//! Domain types, traits, and error definitions for the agentrelay pipeline
//! orchestrator. This crate has no framework dependencies: it defines the
//! model that the provider, memory, and workflow crates implement against.
//!
//! ## Design Philosophy
//!
//! Every external collaborator is a trait here (`Provider` for the completion
//! service, `MemoryStore` for run memories). Implementations live in their
//! respective crates, so runs can be exercised with scripted test doubles.

pub mod agent;
pub mod context;
pub mod error;
pub mod event;
pub mod memory;
pub mod message;
pub mod payload;
pub mod provider;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

// Re-export key types at crate root for ergonomics
pub use agent::AgentRole;
pub use context::{PipelineContext, RunResult};
pub use error::{Error, Result};
pub use event::{DomainEvent, EventBus};
pub use memory::{AgentMemory, MemoryStore, PruningResult, RetentionFlag};
pub use message::{Message, Role};
pub use payload::{extract_as, extract_structured_payload};
pub use provider::{Provider, ProviderRequest, ProviderResponse, StreamChunk};
