//! Error types for the agentrelay domain.
//!
//! Uses `thiserror` for ergonomic error definitions.
//! Each bounded context has its own error variant.

use thiserror::Error;

/// The top-level error type for all agentrelay operations.
#[derive(Debug, Error)]
pub enum Error {
    // --- Completion service errors ---
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    // --- Pipeline lookup errors ---
    #[error("Pipeline error: {0}")]
    Pipeline(#[from] PipelineError),

    // --- Memory errors ---
    #[error("Memory error: {0}")]
    Memory(#[from] MemoryError),

    // --- Structured payload extraction ---
    #[error("Payload error: {0}")]
    Payload(#[from] PayloadError),

    // --- Configuration errors ---
    #[error("Configuration error: {message}")]
    Config { message: String },

    // --- Serialization ---
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    // --- Generic ---
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias using our Error.
pub type Result<T> = std::result::Result<T, Error>;

// --- Bounded context errors ---

/// Failures of the external completion service.
#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    #[error("API request failed: {message} (status: {status_code})")]
    ApiError { status_code: u16, message: String },

    #[error("Rate limited by provider, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Provider not configured: {0}")]
    NotConfigured(String),

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("Network error: {0}")]
    Network(String),
}

impl ProviderError {
    /// Whether a retry could plausibly succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            ProviderError::RateLimited { .. }
            | ProviderError::Timeout(_)
            | ProviderError::Network(_) => true,
            ProviderError::ApiError { status_code, .. } => *status_code >= 500,
            ProviderError::AuthenticationFailed(_) | ProviderError::NotConfigured(_) => false,
        }
    }
}

/// Precondition failures when selecting a pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PipelineError {
    #[error("Pipeline not found: {0}")]
    NotFound(String),

    #[error("Pipeline is disabled: {0}")]
    Disabled(String),
}

#[derive(Debug, Error)]
pub enum MemoryError {
    #[error("Memory generation failed for {agent_role}: {reason}")]
    Generation { agent_role: String, reason: String },

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Pruning failed: {0}")]
    Pruning(String),
}

/// Failures while pulling a structured block out of model output.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PayloadError {
    #[error("response was empty")]
    Empty,

    #[error("fenced block was never closed")]
    UnterminatedFence,

    #[error("invalid structured payload: {0}")]
    Invalid(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_error_displays_correctly() {
        let err = Error::Provider(ProviderError::ApiError {
            status_code: 429,
            message: "Too many requests".into(),
        });
        assert!(err.to_string().contains("429"));
        assert!(err.to_string().contains("Too many requests"));
    }

    #[test]
    fn pipeline_error_displays_id() {
        let err = Error::from(PipelineError::NotFound("missing".into()));
        assert!(err.to_string().contains("missing"));
    }

    #[test]
    fn retryable_classification() {
        assert!(ProviderError::Timeout("slow".into()).is_retryable());
        assert!(ProviderError::RateLimited { retry_after_secs: 5 }.is_retryable());
        assert!(
            ProviderError::ApiError {
                status_code: 503,
                message: String::new()
            }
            .is_retryable()
        );
        assert!(
            !ProviderError::ApiError {
                status_code: 400,
                message: String::new()
            }
            .is_retryable()
        );
        assert!(!ProviderError::AuthenticationFailed("bad key".into()).is_retryable());
    }
}
