//! Configuration management
//!
//! This module handles loading, validation, and management of the PT configuration.
//! Configuration is stored in TOML format at ~/.pt/config.toml.
//!
//! # Configuration Sections
//!
//! - **core**: Log level, data directory (holds the SQLite database)
//! - **server**: HTTP bind address and CORS origins
//! - **llm**: Model identifiers per purpose, request timeout, backend endpoints
//! - **answer**: Answer strategy (single model or best-of candidates)
//! - **session**: Context window sizes, persistence caps, fact extraction policy
//!
//! Every field has a default, so a partial file is valid. API keys never live in
//! this file; each backend names the environment variable to read instead, with
//! the OS keychain as fallback.
//!
//! # Examples
//!
//! ```no_run
//! use pt_engine::config::Config;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = Config::load_or_create()?;
//! println!("Answer model: {}", config.llm.default_model);
//! # Ok(())
//! # }
//! ```

use crate::llm::{Backend, ModelSpec};
use sdk::errors::EngineError;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Config {
    #[serde(default)]
    pub core: CoreConfig,

    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub llm: LLMConfig,

    #[serde(default)]
    pub answer: AnswerConfig,

    #[serde(default)]
    pub session: SessionConfig,
}

/// Core engine configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CoreConfig {
    /// Log level (error, warn, info, debug, trace)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Data directory path (supports ~ expansion)
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
}

/// HTTP server configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,

    /// Origins allowed by CORS. `"*"` allows any origin.
    #[serde(default = "default_allowed_origins")]
    pub allowed_origins: Vec<String>,
}

/// Model selection and backend endpoints
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LLMConfig {
    /// Answer model used when a chat request names none
    #[serde(default = "default_model")]
    pub default_model: String,

    /// Model for the relevance check
    #[serde(default = "default_utility_model")]
    pub guardrail_model: String,

    /// Model for summary, facts, meal-plan and JSON repair calls
    #[serde(default = "default_utility_model")]
    pub utility_model: String,

    /// Upper bound on a single provider call
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    #[serde(default = "ProviderEndpoint::openai")]
    pub openai: ProviderEndpoint,

    #[serde(default = "ProviderEndpoint::openrouter")]
    pub openrouter: ProviderEndpoint,

    #[serde(default = "ProviderEndpoint::gemini")]
    pub gemini: ProviderEndpoint,

    #[serde(default)]
    pub ollama: OllamaConfig,
}

/// Hosted backend endpoint
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProviderEndpoint {
    pub base_url: String,

    /// Environment variable holding the API key
    pub api_key_env: String,
}

/// Ollama provider configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OllamaConfig {
    #[serde(default = "default_ollama_base_url")]
    pub base_url: String,

    /// Ollama is opt-in; a disabled backend is reported as unavailable
    #[serde(default)]
    pub enabled: bool,
}

/// How a reply is produced
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum AnswerStrategy {
    /// Ask one model (the request's model or `llm.default_model`)
    #[default]
    Single,
    /// Ask every candidate in parallel and let the evaluator pick
    BestOf,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AnswerConfig {
    #[serde(default)]
    pub strategy: AnswerStrategy,

    #[serde(default = "default_candidates")]
    pub candidates: Vec<String>,

    #[serde(default = "default_evaluator")]
    pub evaluator: String,

    /// Bound on concurrent candidate requests
    #[serde(default = "default_max_workers")]
    pub max_workers: usize,
}

/// What happens to the fact table when extraction fails
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum FactFailurePolicy {
    /// Clear the table
    #[default]
    Reset,
    /// Keep the last known good table
    Preserve,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SessionConfig {
    /// Window turns sent as context with the answer prompt
    #[serde(default = "default_answer_context_turns")]
    pub answer_context_turns: usize,

    /// Window turns the summary compactor reads
    #[serde(default = "default_summary_context_turns")]
    pub summary_context_turns: usize,

    /// Cap on persisted messages and on persisted responses
    #[serde(default = "default_persisted_turns")]
    pub persisted_turns_per_role: usize,

    #[serde(default = "default_true")]
    pub extract_facts: bool,

    #[serde(default)]
    pub fact_failure_policy: FactFailurePolicy,
}

// Default value functions
fn default_log_level() -> String {
    "info".to_string()
}

fn default_true() -> bool {
    true
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("~/.pt")
}

fn default_bind() -> String {
    "127.0.0.1:8000".to_string()
}

fn default_allowed_origins() -> Vec<String> {
    vec!["http://localhost:3000".to_string()]
}

fn default_model() -> String {
    "openai:gpt-4o".to_string()
}

fn default_utility_model() -> String {
    "openai:gpt-4o-mini".to_string()
}

fn default_request_timeout() -> u64 {
    60
}

fn default_ollama_base_url() -> String {
    "http://localhost:11434".to_string()
}

fn default_candidates() -> Vec<String> {
    vec![
        "gemini:gemini-1.5-flash".to_string(),
        "openrouter:anthropic/claude-3-haiku".to_string(),
    ]
}

fn default_evaluator() -> String {
    "openrouter:deepseek/deepseek-chat".to_string()
}

fn default_max_workers() -> usize {
    3
}

fn default_answer_context_turns() -> usize {
    6
}

fn default_summary_context_turns() -> usize {
    8
}

fn default_persisted_turns() -> usize {
    20
}

impl ProviderEndpoint {
    fn openai() -> Self {
        Self {
            base_url: "https://api.openai.com/v1".to_string(),
            api_key_env: "OPENAI_API_KEY".to_string(),
        }
    }

    fn openrouter() -> Self {
        Self {
            base_url: "https://openrouter.ai/api/v1".to_string(),
            api_key_env: "OPENROUTER_API_KEY".to_string(),
        }
    }

    fn gemini() -> Self {
        Self {
            base_url: "https://generativelanguage.googleapis.com/v1beta".to_string(),
            api_key_env: "GEMINI_API_KEY".to_string(),
        }
    }
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            data_dir: default_data_dir(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            allowed_origins: default_allowed_origins(),
        }
    }
}

impl LLMConfig {
    /// Endpoint of a hosted backend; `None` for Ollama
    pub fn endpoint(&self, backend: Backend) -> Option<&ProviderEndpoint> {
        match backend {
            Backend::OpenAi => Some(&self.openai),
            Backend::OpenRouter => Some(&self.openrouter),
            Backend::Gemini => Some(&self.gemini),
            Backend::Ollama => None,
        }
    }

    /// Environment variable consulted before the keychain
    pub fn api_key_env(&self, backend: Backend) -> Option<&str> {
        self.endpoint(backend).map(|e| e.api_key_env.as_str())
    }
}

impl Default for LLMConfig {
    fn default() -> Self {
        Self {
            default_model: default_model(),
            guardrail_model: default_utility_model(),
            utility_model: default_utility_model(),
            request_timeout_secs: default_request_timeout(),
            openai: ProviderEndpoint::openai(),
            openrouter: ProviderEndpoint::openrouter(),
            gemini: ProviderEndpoint::gemini(),
            ollama: OllamaConfig::default(),
        }
    }
}

impl Default for OllamaConfig {
    fn default() -> Self {
        Self {
            base_url: default_ollama_base_url(),
            enabled: false,
        }
    }
}

impl Default for AnswerConfig {
    fn default() -> Self {
        Self {
            strategy: AnswerStrategy::Single,
            candidates: default_candidates(),
            evaluator: default_evaluator(),
            max_workers: default_max_workers(),
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            answer_context_turns: default_answer_context_turns(),
            summary_context_turns: default_summary_context_turns(),
            persisted_turns_per_role: default_persisted_turns(),
            extract_facts: true,
            fact_failure_policy: FactFailurePolicy::Reset,
        }
    }
}

impl Config {
    /// Load configuration from the default location (~/.pt/config.toml)
    ///
    /// If the configuration file doesn't exist, creates a default configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, TOML parsing fails, or
    /// validation fails.
    pub fn load_or_create() -> Result<Self, EngineError> {
        let config_path = Self::default_config_path()?;
        Self::load_or_create_at(&config_path)
    }

    /// Same as [`Config::load_or_create`] for an explicit path (`--config`)
    pub fn load_or_create_at(path: &Path) -> Result<Self, EngineError> {
        if path.exists() {
            Self::load_from_path(path)
        } else {
            Self::create_default(path)
        }
    }

    /// Load configuration from a specific path
    pub fn load_from_path(path: &Path) -> Result<Self, EngineError> {
        let contents = fs::read_to_string(path)
            .map_err(|e| EngineError::Config(format!("Failed to read config file: {}", e)))?;

        let mut config: Config = toml::from_str(&contents)
            .map_err(|e| EngineError::Config(format!("Failed to parse config: {}", e)))?;

        config.validate_and_process()?;

        Ok(config)
    }

    /// Create default configuration and save to path
    fn create_default(path: &Path) -> Result<Self, EngineError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| {
                EngineError::Config(format!("Failed to create config directory: {}", e))
            })?;
        }

        let toml_string = toml::to_string_pretty(&Self::default())
            .map_err(|e| EngineError::Config(format!("Failed to serialize config: {}", e)))?;

        fs::write(path, toml_string)
            .map_err(|e| EngineError::Config(format!("Failed to write config file: {}", e)))?;

        tracing::info!("Wrote default configuration to {:?}", path);

        let mut config = Self::default();
        config.validate_and_process()?;
        Ok(config)
    }

    /// Get the default configuration file path (~/.pt/config.toml)
    pub fn default_config_path() -> Result<PathBuf, EngineError> {
        let home = dirs::home_dir()
            .ok_or_else(|| EngineError::Config("Could not determine home directory".to_string()))?;

        Ok(home.join(".pt").join("config.toml"))
    }

    /// Location of the SQLite snapshot database
    pub fn database_path(&self) -> PathBuf {
        self.core.data_dir.join("pt.db")
    }

    /// Check values without touching the filesystem
    ///
    /// # Errors
    ///
    /// Returns `EngineError::Config` naming the first offending field.
    pub fn validate(&self) -> Result<(), EngineError> {
        let valid_log_levels = ["error", "warn", "info", "debug", "trace"];
        if !valid_log_levels.contains(&self.core.log_level.as_str()) {
            return Err(EngineError::Config(format!(
                "Invalid log level '{}'. Must be one of: {}",
                self.core.log_level,
                valid_log_levels.join(", ")
            )));
        }

        let mut model_fields = vec![
            ("llm.default_model", &self.llm.default_model),
            ("llm.guardrail_model", &self.llm.guardrail_model),
            ("llm.utility_model", &self.llm.utility_model),
            ("answer.evaluator", &self.answer.evaluator),
        ];
        model_fields.extend(
            self.answer
                .candidates
                .iter()
                .map(|candidate| ("answer.candidates", candidate)),
        );
        for (field, value) in model_fields {
            value.parse::<ModelSpec>().map_err(|e| {
                EngineError::Config(format!("Invalid model id in {}: {}", field, e))
            })?;
        }

        if self.llm.request_timeout_secs == 0 {
            return Err(EngineError::Config(
                "llm.request_timeout_secs must be greater than 0".to_string(),
            ));
        }

        if self.answer.max_workers == 0 {
            return Err(EngineError::Config(
                "answer.max_workers must be greater than 0".to_string(),
            ));
        }

        if self.answer.strategy == AnswerStrategy::BestOf && self.answer.candidates.is_empty() {
            return Err(EngineError::Config(
                "answer.candidates cannot be empty with the best_of strategy".to_string(),
            ));
        }

        let session = &self.session;
        for (field, value) in [
            ("session.answer_context_turns", session.answer_context_turns),
            ("session.summary_context_turns", session.summary_context_turns),
            (
                "session.persisted_turns_per_role",
                session.persisted_turns_per_role,
            ),
        ] {
            if value == 0 {
                return Err(EngineError::Config(format!(
                    "{} must be greater than 0",
                    field
                )));
            }
        }

        Ok(())
    }

    /// Validate, expand `~` in the data directory and create it
    pub fn validate_and_process(&mut self) -> Result<(), EngineError> {
        self.validate()?;

        self.core.data_dir = expand_path(&self.core.data_dir)?;

        if !self.core.data_dir.exists() {
            fs::create_dir_all(&self.core.data_dir).map_err(|e| {
                EngineError::Config(format!("Failed to create data directory: {}", e))
            })?;
        }

        Ok(())
    }
}

/// Expand ~ in path to user's home directory
fn expand_path(path: &Path) -> Result<PathBuf, EngineError> {
    let path_str = path
        .to_str()
        .ok_or_else(|| EngineError::Config("Invalid UTF-8 in path".to_string()))?;

    if let Some(rest) = path_str.strip_prefix("~/") {
        let home = dirs::home_dir()
            .ok_or_else(|| EngineError::Config("Could not determine home directory".to_string()))?;

        Ok(home.join(rest))
    } else if path_str == "~" {
        dirs::home_dir()
            .ok_or_else(|| EngineError::Config("Could not determine home directory".to_string()))
    } else {
        Ok(path.to_path_buf())
    }
}
