//! Configuration loading, validation, and management for agentrelay.
//!
//! Loads configuration from `~/.agentrelay/config.toml` with environment
//! variable overrides. Validates all settings at startup.

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

/// The root configuration structure.
///
/// Maps directly to `~/.agentrelay/config.toml`.
#[derive(Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// API key (can be overridden per-provider)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Default completion provider
    #[serde(default = "default_provider")]
    pub default_provider: String,

    /// Default model
    #[serde(default = "default_model")]
    pub default_model: String,

    /// Temperature for regular agent steps
    #[serde(default = "default_temperature")]
    pub default_temperature: f32,

    /// Max tokens per agent step response
    #[serde(default = "default_max_tokens")]
    pub default_max_tokens: u32,

    /// Retry policy for the completion service
    #[serde(default)]
    pub retry: RetryConfig,

    /// Pipeline execution settings
    #[serde(default)]
    pub orchestration: OrchestrationConfig,

    /// Memory store configuration
    #[serde(default)]
    pub memory: MemoryConfig,

    /// Provider-specific configurations
    #[serde(default)]
    pub providers: HashMap<String, ProviderConfig>,

    /// User-defined pipelines (replace built-ins with the same id)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub pipelines: Vec<PipelineConfig>,
}

fn default_provider() -> String {
    "openrouter".into()
}
fn default_model() -> String {
    "anthropic/claude-sonnet-4".into()
}
fn default_temperature() -> f32 {
    0.7
}
fn default_max_tokens() -> u32 {
    4096
}
fn default_true() -> bool {
    true
}

fn redact(s: &Option<String>) -> &'static str {
    match s {
        Some(_) => "[REDACTED]",
        None => "None",
    }
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("api_key", &redact(&self.api_key))
            .field("default_provider", &self.default_provider)
            .field("default_model", &self.default_model)
            .field("default_temperature", &self.default_temperature)
            .field("default_max_tokens", &self.default_max_tokens)
            .field("retry", &self.retry)
            .field("orchestration", &self.orchestration)
            .field("memory", &self.memory)
            .field("providers", &self.providers)
            .field("pipelines", &self.pipelines)
            .finish()
    }
}

impl std::fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("api_key", &redact(&self.api_key))
            .field("api_url", &self.api_url)
            .field("default_model", &self.default_model)
            .finish()
    }
}

/// Exponential backoff settings for completion calls.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,

    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
}

fn default_max_retries() -> u32 {
    3
}
fn default_base_delay_ms() -> u64 {
    1000
}
fn default_max_delay_ms() -> u64 {
    30_000
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestrationConfig {
    /// Pause between steps, purely for paced progress output. 0 disables.
    #[serde(default = "default_step_delay_ms")]
    pub step_delay_ms: u64,

    /// Generate memories on every `run`, as if `--memory` were passed
    #[serde(default)]
    pub memory_enabled: bool,
}

fn default_step_delay_ms() -> u64 {
    500
}

impl Default for OrchestrationConfig {
    fn default() -> Self {
        Self {
            step_delay_ms: default_step_delay_ms(),
            memory_enabled: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryConfig {
    /// "file" or "in_memory"
    #[serde(default = "default_memory_backend")]
    pub backend: String,

    /// JSONL file for the "file" backend (defaults under the config dir)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
}

fn default_memory_backend() -> String {
    "file".into()
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            backend: default_memory_backend(),
            path: None,
        }
    }
}

impl MemoryConfig {
    /// Resolved location of the memory file.
    pub fn resolved_path(&self) -> PathBuf {
        self.path
            .clone()
            .unwrap_or_else(|| AppConfig::config_dir().join("memory").join("memories.jsonl"))
    }
}

#[derive(Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_url: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_model: Option<String>,
}

/// A pipeline declared in the config file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    pub id: String,

    pub name: String,

    #[serde(default)]
    pub description: String,

    #[serde(default = "default_true")]
    pub enabled: bool,

    pub steps: Vec<StepConfig>,
}

/// One step of a config-declared pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepConfig {
    /// Agent role name (unknown names get a generic prompt)
    pub role: String,

    /// Result key to store the output under
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_key: Option<String>,

    /// Input template; supports `{user_prompt}` and `{results.KEY}`
    #[serde(default = "default_input_template")]
    pub input: String,
}

fn default_input_template() -> String {
    "{user_prompt}".into()
}

impl AppConfig {
    /// Load configuration from the default path (~/.agentrelay/config.toml).
    ///
    /// Also checks environment variables for API keys:
    /// - `AGENTRELAY_API_KEY` (highest priority)
    /// - `OPENROUTER_API_KEY`
    /// - `OPENAI_API_KEY`
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::config_dir().join("config.toml");
        let mut config = Self::load_from(&config_path)?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Load configuration from a specific file path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::info!("No config file found at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        config.validate()?;
        Ok(config)
    }

    fn apply_env_overrides(&mut self) {
        if self.api_key.is_none() {
            self.api_key = std::env::var("AGENTRELAY_API_KEY")
                .ok()
                .or_else(|| std::env::var("OPENROUTER_API_KEY").ok())
                .or_else(|| std::env::var("OPENAI_API_KEY").ok());
        }

        if let Ok(provider) = std::env::var("AGENTRELAY_PROVIDER") {
            self.default_provider = provider;
        }

        if let Ok(model) = std::env::var("AGENTRELAY_MODEL") {
            if let Some(provider) = self.providers.get_mut(&self.default_provider) {
                provider.default_model = Some(model.clone());
            }
            self.default_model = model;
        }
    }

    /// Model for agent calls: the default provider's own `default_model`
    /// when set, otherwise the top-level one.
    pub fn model(&self) -> &str {
        self.providers
            .get(&self.default_provider)
            .and_then(|p| p.default_model.as_deref())
            .unwrap_or(&self.default_model)
    }

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".agentrelay")
    }

    /// Validate the configuration.
    fn validate(&self) -> Result<(), ConfigError> {
        if self.default_temperature < 0.0 || self.default_temperature > 2.0 {
            return Err(ConfigError::ValidationError(
                "default_temperature must be between 0.0 and 2.0".into(),
            ));
        }

        if self.retry.max_delay_ms < self.retry.base_delay_ms {
            return Err(ConfigError::ValidationError(
                "retry.max_delay_ms must be >= retry.base_delay_ms".into(),
            ));
        }

        if !matches!(self.memory.backend.as_str(), "file" | "in_memory") {
            return Err(ConfigError::ValidationError(format!(
                "unknown memory backend '{}' (expected \"file\" or \"in_memory\")",
                self.memory.backend
            )));
        }

        let mut seen = HashSet::new();
        for pipeline in &self.pipelines {
            if !seen.insert(pipeline.id.as_str()) {
                return Err(ConfigError::ValidationError(format!(
                    "duplicate pipeline id '{}'",
                    pipeline.id
                )));
            }
            if pipeline.steps.is_empty() {
                return Err(ConfigError::ValidationError(format!(
                    "pipeline '{}' has no steps",
                    pipeline.id
                )));
            }
        }

        Ok(())
    }

    /// Check if an API key is available (from config or environment).
    pub fn has_api_key(&self) -> bool {
        self.api_key.is_some()
    }

    /// Generate a default config TOML string (for `onboard` command).
    pub fn default_toml() -> String {
        let config = Self::default();
        toml::to_string_pretty(&config).unwrap_or_default()
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            default_provider: default_provider(),
            default_model: default_model(),
            default_temperature: default_temperature(),
            default_max_tokens: default_max_tokens(),
            retry: RetryConfig::default(),
            orchestration: OrchestrationConfig::default(),
            memory: MemoryConfig::default(),
            providers: HashMap::new(),
            pipelines: vec![],
        }
    }
}

/// Get the user's home directory.
fn dirs_home() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        std::env::var("USERPROFILE")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("C:\\Users\\Default"))
    }
    #[cfg(not(target_os = "windows"))]
    {
        std::env::var("HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("/tmp"))
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file at {path}: {reason}")]
    ReadError { path: PathBuf, reason: String },

    #[error("Failed to parse config file at {path}: {reason}")]
    ParseError { path: PathBuf, reason: String },

    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = AppConfig::default();
        assert_eq!(config.default_provider, "openrouter");
        assert_eq!(config.retry.max_retries, 3);
        assert_eq!(config.orchestration.step_delay_ms, 500);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn config_roundtrip_toml() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).unwrap();
        let parsed: AppConfig = toml::from_str(&toml_str).unwrap();
        assert_eq!(parsed.default_provider, config.default_provider);
        assert_eq!(parsed.retry.base_delay_ms, config.retry.base_delay_ms);
    }

    #[test]
    fn invalid_temperature_rejected() {
        let config = AppConfig {
            default_temperature: 5.0,
            ..AppConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn inverted_retry_delays_rejected() {
        let config = AppConfig {
            retry: RetryConfig {
                max_retries: 1,
                base_delay_ms: 5000,
                max_delay_ms: 100,
            },
            ..AppConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn missing_config_file_returns_defaults() {
        let config = AppConfig::load_from(Path::new("/nonexistent/config.toml")).unwrap();
        assert_eq!(config.default_provider, "openrouter");
    }

    #[test]
    fn debug_redacts_api_key() {
        let config = AppConfig {
            api_key: Some("sk-secret".into()),
            ..AppConfig::default()
        };
        let rendered = format!("{config:?}");
        assert!(!rendered.contains("sk-secret"));
        assert!(rendered.contains("[REDACTED]"));
    }

    #[test]
    fn pipeline_config_parsing() {
        let toml_str = r#"
[[pipelines]]
id = "docs"
name = "Documentation"
description = "Write docs for a module"

[[pipelines.steps]]
role = "analysis"
output_key = "analysis"

[[pipelines.steps]]
role = "technical-writer"
output_key = "final_summary"
input = "Document this: {user_prompt}\nFindings: {results.analysis}"
"#;
        let config: AppConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.pipelines.len(), 1);
        let p = &config.pipelines[0];
        assert!(p.enabled);
        assert_eq!(p.steps.len(), 2);
        assert_eq!(p.steps[0].input, "{user_prompt}");
        assert_eq!(p.steps[1].output_key.as_deref(), Some("final_summary"));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn duplicate_and_empty_pipelines_rejected() {
        let step = StepConfig {
            role: "analysis".into(),
            output_key: None,
            input: default_input_template(),
        };
        let pipeline = PipelineConfig {
            id: "p".into(),
            name: "P".into(),
            description: String::new(),
            enabled: true,
            steps: vec![step],
        };

        let dup = AppConfig {
            pipelines: vec![pipeline.clone(), pipeline.clone()],
            ..AppConfig::default()
        };
        assert!(dup.validate().is_err());

        let empty = AppConfig {
            pipelines: vec![PipelineConfig {
                steps: vec![],
                ..pipeline
            }],
            ..AppConfig::default()
        };
        assert!(empty.validate().is_err());
    }

    #[test]
    fn load_from_file_validates() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "default_temperature = 9.0\n").unwrap();
        let err = AppConfig::load_from(&path).unwrap_err();
        assert!(matches!(err, ConfigError::ValidationError(_)));

        std::fs::write(&path, "default_model = \"gpt-4o\"\n[memory]\nbackend = \"in_memory\"\n")
            .unwrap();
        let config = AppConfig::load_from(&path).unwrap();
        assert_eq!(config.default_model, "gpt-4o");
        assert_eq!(config.memory.backend, "in_memory");
    }

    #[test]
    fn default_provider_model_wins() {
        let config: AppConfig = toml::from_str(
            r#"
default_provider = "openai"
default_model = "anthropic/claude-sonnet-4"

[providers.openai]
default_model = "gpt-4o-mini"

[providers.openrouter]
default_model = "meta-llama/llama-3-70b"
"#,
        )
        .unwrap();
        assert_eq!(config.model(), "gpt-4o-mini");

        let other = AppConfig {
            default_provider: "ollama".into(),
            ..config
        };
        assert_eq!(other.model(), "anthropic/claude-sonnet-4");
    }
}
