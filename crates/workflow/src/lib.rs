//! Pipeline orchestration for agentrelay.
//!
//! Two ways to run a request:
//! - [`PipelineExecutor`] runs a registered [`Pipeline`], a fixed ordered list
//!   of steps.
//! - [`IntelligentOrchestrator`] lets an interpreter and a workflow director
//!   decide the steps at runtime.
//!
//! [`AgentOrchestrator`] puts both behind one surface together with the
//! memory store.

pub mod executor;
pub mod intelligent;
pub mod orchestrator;
pub mod pipeline;
pub mod runner;

pub use executor::{AgentMemories, PipelineExecutor};
pub use intelligent::{IntelligentOrchestrator, PlannedStep};
pub use orchestrator::AgentOrchestrator;
pub use pipeline::{InputBuilder, Pipeline, PipelineRegistry, Step, render_template};
pub use runner::{AgentRunner, ExecutionSettings};
