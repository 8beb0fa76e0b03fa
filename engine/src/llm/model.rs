//! Tagged model identifiers
//!
//! Every model PT talks to is written `backend:model`, e.g. `openai:gpt-4o-mini`
//! or `ollama:llama3.1:8b`. Only the first colon separates the backend, so model
//! names may contain colons and slashes.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Text-generation backends PT can reach
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    OpenAi,
    OpenRouter,
    Gemini,
    Ollama,
}

impl Backend {
    pub fn as_str(&self) -> &'static str {
        match self {
            Backend::OpenAi => "openai",
            Backend::OpenRouter => "openrouter",
            Backend::Gemini => "gemini",
            Backend::Ollama => "ollama",
        }
    }

    /// Keychain entry holding this backend's API key
    pub fn secret_key(&self) -> &'static str {
        match self {
            Backend::OpenAi => "openai_api_key",
            Backend::OpenRouter => "openrouter_api_key",
            Backend::Gemini => "gemini_api_key",
            Backend::Ollama => "ollama_api_key",
        }
    }

    pub const ALL: [Backend; 4] = [
        Backend::OpenAi,
        Backend::OpenRouter,
        Backend::Gemini,
        Backend::Ollama,
    ];
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Backend {
    type Err = ModelSpecError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "openai" => Ok(Backend::OpenAi),
            "openrouter" => Ok(Backend::OpenRouter),
            "gemini" => Ok(Backend::Gemini),
            "ollama" => Ok(Backend::Ollama),
            other => Err(ModelSpecError::UnknownBackend(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ModelSpecError {
    #[error("model id '{0}' must be written as backend:model")]
    MissingBackend(String),

    #[error("unknown backend '{0}' (expected openai, openrouter, gemini or ollama)")]
    UnknownBackend(String),

    #[error("model id '{0}' has an empty model name")]
    EmptyModel(String),
}

/// A parsed `backend:model` identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ModelSpec {
    pub backend: Backend,
    pub model: String,
}

impl ModelSpec {
    pub fn new(backend: Backend, model: impl Into<String>) -> Self {
        Self {
            backend,
            model: model.into(),
        }
    }
}

impl fmt::Display for ModelSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.backend, self.model)
    }
}

impl FromStr for ModelSpec {
    type Err = ModelSpecError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let (backend, model) = trimmed
            .split_once(':')
            .ok_or_else(|| ModelSpecError::MissingBackend(trimmed.to_string()))?;

        let backend = backend.parse::<Backend>()?;
        let model = model.trim();
        if model.is_empty() {
            return Err(ModelSpecError::EmptyModel(trimmed.to_string()));
        }

        Ok(Self::new(backend, model))
    }
}

impl Serialize for ModelSpec {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for ModelSpec {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_each_backend() {
        let spec: ModelSpec = "openai:gpt-4o-mini".parse().unwrap();
        assert_eq!(spec, ModelSpec::new(Backend::OpenAi, "gpt-4o-mini"));

        let spec: ModelSpec = "openrouter:anthropic/claude-3-haiku".parse().unwrap();
        assert_eq!(spec.backend, Backend::OpenRouter);
        assert_eq!(spec.model, "anthropic/claude-3-haiku");

        let spec: ModelSpec = "Gemini:gemini-1.5-flash".parse().unwrap();
        assert_eq!(spec.backend, Backend::Gemini);
    }

    #[test]
    fn model_name_may_contain_colons() {
        let spec: ModelSpec = "ollama:llama3.1:8b".parse().unwrap();
        assert_eq!(spec.backend, Backend::Ollama);
        assert_eq!(spec.model, "llama3.1:8b");
        assert_eq!(spec.to_string(), "ollama:llama3.1:8b");
    }

    #[test]
    fn rejects_untagged_and_unknown() {
        assert_eq!(
            "gpt-4o".parse::<ModelSpec>(),
            Err(ModelSpecError::MissingBackend("gpt-4o".to_string()))
        );
        assert!(matches!(
            "claude:opus".parse::<ModelSpec>(),
            Err(ModelSpecError::UnknownBackend(_))
        ));
        assert!(matches!(
            "openai:  ".parse::<ModelSpec>(),
            Err(ModelSpecError::EmptyModel(_))
        ));
    }

    #[test]
    fn serde_uses_string_form() {
        let spec = ModelSpec::new(Backend::Gemini, "gemini-1.5-pro");
        let json = serde_json::to_string(&spec).unwrap();
        assert_eq!(json, r#""gemini:gemini-1.5-pro""#);
        let back: ModelSpec = serde_json::from_str(&json).unwrap();
        assert_eq!(back, spec);
    }
}
