pub mod cache;
pub mod string;

pub use cache::SecretCache;
pub use string::SecretString;

use keyring::Entry;
use regex::Regex;
use sdk::errors::EngineError;
use std::sync::OnceLock;

/// Keychain service name PT stores provider keys under
pub const SERVICE_NAME: &str = "pt";

/// SecretManager resolves provider API keys.
///
/// Lookup order is the configured environment variable, then the OS keychain
/// (macOS Keychain, Windows Credential Manager, Linux Secret Service). The
/// server never prompts; keys are stored up front with `set_secret`.
///
/// It also scrubs key-shaped substrings out of provider error text before
/// that text reaches a log line.
pub struct SecretManager {
    service_name: String,
}

static SECRET_PATTERNS: OnceLock<Vec<Regex>> = OnceLock::new();

/// Patterns for the key formats PT's backends hand out.
///
/// - OpenAI / OpenRouter keys: sk-..., sk-or-v1-...
/// - Google API keys: AIza...
/// - Bearer tokens echoed back in error bodies
/// - `key=` query parameters (Gemini puts the key in the URL)
fn get_secret_patterns() -> &'static Vec<Regex> {
    SECRET_PATTERNS.get_or_init(|| {
        [
            r"sk-[a-zA-Z0-9\-_]{20,}",
            r"AIza[0-9A-Za-z\-_]{35}",
            r"Bearer\s+[^\s]{20,}",
            r"key=[0-9A-Za-z\-_]{16,}",
        ]
        .iter()
        .filter_map(|p| Regex::new(p).ok())
        .collect()
    })
}

impl SecretManager {
    pub fn new(service_name: impl Into<String>) -> Self {
        Self {
            service_name: service_name.into(),
        }
    }

    /// Resolve a secret without prompting.
    ///
    /// # Arguments
    /// * `key` - Keychain entry name (e.g., "openai_api_key")
    /// * `env_var` - Environment variable checked first (e.g., "OPENAI_API_KEY")
    ///
    /// # Returns
    /// `Ok(None)` when the secret is configured nowhere.
    ///
    /// # Errors
    /// Returns `EngineError::KeyringError` if the keychain itself fails
    pub fn resolve(&self, key: &str, env_var: Option<&str>) -> Result<Option<String>, EngineError> {
        if let Some(var) = env_var {
            if let Ok(value) = std::env::var(var) {
                let value = value.trim().to_string();
                if !value.is_empty() {
                    tracing::debug!("Resolved secret '{}' from ${}", key, var);
                    return Ok(Some(value));
                }
            }
        }

        let entry = Entry::new(&self.service_name, key).map_err(|e| {
            EngineError::KeyringError(format!("Failed to create keyring entry: {}", e))
        })?;

        match entry.get_password() {
            Ok(secret) => {
                tracing::debug!("Retrieved secret '{}' from keychain", key);
                Ok(Some(secret))
            }
            Err(keyring::Error::NoEntry) => Ok(None),
            // Headless hosts often have no secret service at all
            Err(keyring::Error::PlatformFailure(e)) | Err(keyring::Error::NoStorageAccess(e)) => {
                tracing::debug!("Keychain unavailable while looking up '{}': {}", key, e);
                Ok(None)
            }
            Err(e) => Err(EngineError::KeyringError(format!(
                "Failed to retrieve secret '{}': {}",
                key, e
            ))),
        }
    }

    /// Stores a secret in the OS keychain.
    ///
    /// # Errors
    /// Returns `EngineError::KeyringError` if keychain access fails
    pub fn set_secret(&self, key: &str, value: &str) -> Result<(), EngineError> {
        if value.trim().is_empty() {
            return Err(EngineError::KeyringError(
                "Secret cannot be empty".to_string(),
            ));
        }

        let entry = Entry::new(&self.service_name, key).map_err(|e| {
            EngineError::KeyringError(format!("Failed to create keyring entry: {}", e))
        })?;

        entry.set_password(value).map_err(|e| {
            EngineError::KeyringError(format!("Failed to store secret '{}': {}", key, e))
        })?;

        tracing::info!("Stored secret '{}' in keychain", key);
        Ok(())
    }

    /// Whether the secret can be resolved right now. Used by `pt doctor`.
    pub fn has_secret(&self, key: &str, env_var: Option<&str>) -> bool {
        matches!(self.resolve(key, env_var), Ok(Some(_)))
    }

    /// Replace every key-shaped substring with `[REDACTED]`.
    ///
    /// # Examples
    /// ```
    /// use pt_engine::secrets::SecretManager;
    ///
    /// let manager = SecretManager::new("test");
    /// let scrubbed = manager.scrub("My API key is sk-1234567890abcdefghij");
    /// assert_eq!(scrubbed, "My API key is [REDACTED]");
    /// ```
    pub fn scrub(&self, text: &str) -> String {
        scrub(text)
    }
}

/// Free-function form of [`SecretManager::scrub`] for call sites without a manager.
pub fn scrub(text: &str) -> String {
    let mut result = text.to_string();
    for pattern in get_secret_patterns() {
        result = pattern.replace_all(&result, "[REDACTED]").to_string();
    }
    result
}
