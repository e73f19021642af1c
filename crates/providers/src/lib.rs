//! Completion provider implementations for agentrelay.
//!
//! All providers implement the `agentrelay_core::Provider` trait.
//! The router selects the correct provider based on configuration.

pub mod openai_compat;
pub mod retry;
pub mod router;

pub use openai_compat::OpenAiCompatProvider;
pub use retry::{RetryPolicy, RetryProvider};
pub use router::{ProviderRouter, build_from_config};
