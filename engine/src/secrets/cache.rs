use crate::secrets::string::SecretString;
use crate::secrets::SecretManager;
use sdk::errors::EngineError;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

/// In-memory cache in front of `SecretManager`.
///
/// Providers are built per model call, so without this every turn would hit
/// the environment and the OS keychain several times.
#[derive(Clone)]
pub struct SecretCache {
    manager: Arc<SecretManager>,
    cache: Arc<RwLock<HashMap<String, SecretString>>>,
}

impl SecretCache {
    pub fn new(manager: Arc<SecretManager>) -> Self {
        Self {
            manager,
            cache: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Look up a secret, consulting the cache first.
    ///
    /// Returns `Ok(None)` when neither the environment variable nor the
    /// keychain holds a value. Misses are not cached so a key exported later
    /// is picked up on the next call.
    pub fn get_secret(
        &self,
        key: &str,
        env_var: Option<&str>,
    ) -> Result<Option<SecretString>, EngineError> {
        {
            let cache = self
                .cache
                .read()
                .map_err(|_| EngineError::KeyringError("secret cache poisoned".to_string()))?;
            if let Some(secret) = cache.get(key) {
                return Ok(Some(secret.clone()));
            }
        }

        let Some(raw_secret) = self.manager.resolve(key, env_var)? else {
            return Ok(None);
        };
        let secret = SecretString::new(raw_secret);

        {
            let mut cache = self
                .cache
                .write()
                .map_err(|_| EngineError::KeyringError("secret cache poisoned".to_string()))?;
            cache.insert(key.to_string(), secret.clone());
        }

        Ok(Some(secret))
    }

    /// Seed a value directly, bypassing env and keychain.
    pub fn insert(&self, key: &str, value: impl Into<SecretString>) {
        if let Ok(mut cache) = self.cache.write() {
            cache.insert(key.to_string(), value.into());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seeded_secret_is_returned_without_lookup() {
        let cache = SecretCache::new(Arc::new(SecretManager::new("pt-test")));
        cache.insert("openai_api_key", "sk-seeded");
        let secret = cache
            .get_secret("openai_api_key", Some("PT_TEST_UNSET_VAR_1"))
            .unwrap()
            .unwrap();
        assert_eq!(secret.unsecure(), "sk-seeded");
    }

    #[test]
    fn env_var_is_read_and_cached() {
        std::env::set_var("PT_TEST_CACHE_ENV_KEY", "from-env");
        let cache = SecretCache::new(Arc::new(SecretManager::new("pt-test")));
        let secret = cache
            .get_secret("cache_env_key", Some("PT_TEST_CACHE_ENV_KEY"))
            .unwrap()
            .unwrap();
        assert_eq!(secret.unsecure(), "from-env");

        std::env::remove_var("PT_TEST_CACHE_ENV_KEY");
        let cached = cache
            .get_secret("cache_env_key", Some("PT_TEST_CACHE_ENV_KEY"))
            .unwrap()
            .unwrap();
        assert_eq!(cached.unsecure(), "from-env");
    }
}
