//! Per-call provider construction
//!
//! The backend can change between turns (the chat request may name any model),
//! so providers are built on demand from a `ModelSpec` instead of being held
//! in a long-lived router.

use super::gemini::GeminiProvider;
use super::ollama::OllamaProvider;
use super::openai::OpenAIProvider;
use super::{Backend, LLMError, LLMProvider, ModelSpec};
use crate::config::LLMConfig;
use crate::secrets::{SecretCache, SecretString};

/// Builds a provider for a model id
pub trait ProviderFactory: Send + Sync {
    /// # Errors
    /// `AuthenticationFailed` when the backend's API key is not configured,
    /// `ProviderUnavailable` when the backend is disabled or the keychain fails.
    fn build(&self, spec: &ModelSpec) -> super::Result<Box<dyn LLMProvider>>;
}

/// Factory backed by the `[llm]` config section and the secret cache
pub struct ConfiguredProviders {
    llm: LLMConfig,
    secrets: SecretCache,
}

impl ConfiguredProviders {
    pub fn new(llm: LLMConfig, secrets: SecretCache) -> Self {
        Self { llm, secrets }
    }

    fn api_key(&self, backend: Backend) -> super::Result<(String, SecretString)> {
        let endpoint = self.llm.endpoint(backend).ok_or_else(|| {
            LLMError::InvalidRequest(format!("{} does not use an API key", backend))
        })?;

        let key = self
            .secrets
            .get_secret(backend.secret_key(), Some(&endpoint.api_key_env))
            .map_err(|e| LLMError::ProviderUnavailable(e.to_string()))?
            .ok_or_else(|| {
                LLMError::AuthenticationFailed(format!(
                    "no API key for {}; set ${} or store '{}' in the keychain",
                    backend,
                    endpoint.api_key_env,
                    backend.secret_key()
                ))
            })?;

        Ok((endpoint.base_url.clone(), key))
    }
}

impl ProviderFactory for ConfiguredProviders {
    fn build(&self, spec: &ModelSpec) -> super::Result<Box<dyn LLMProvider>> {
        match spec.backend {
            Backend::OpenAi => {
                let (base_url, key) = self.api_key(Backend::OpenAi)?;
                Ok(Box::new(OpenAIProvider::new(base_url, &spec.model, key)))
            }
            Backend::OpenRouter => {
                let (base_url, key) = self.api_key(Backend::OpenRouter)?;
                Ok(Box::new(OpenAIProvider::openrouter(
                    base_url,
                    &spec.model,
                    key,
                )))
            }
            Backend::Gemini => {
                let (base_url, key) = self.api_key(Backend::Gemini)?;
                Ok(Box::new(GeminiProvider::new(base_url, &spec.model, key)))
            }
            Backend::Ollama => {
                if !self.llm.ollama.enabled {
                    return Err(LLMError::ProviderUnavailable(
                        "ollama backend is disabled (llm.ollama.enabled = false)".to_string(),
                    ));
                }
                Ok(Box::new(OllamaProvider::new(
                    &self.llm.ollama.base_url,
                    &spec.model,
                )))
            }
        }
    }
}
