use crate::domain::ports::SecretStore;
use crate::utils::error::{DataflowError, Result};
use std::collections::HashMap;

const ENV_PREFIX: &str = "DATAFLOW_SECRET";

/// `DATAFLOW_SECRET_<SCOPE>_<KEY>`，非英數字元換成底線並轉大寫
pub fn env_var_name(scope: &str, key: &str) -> String {
    let normalize = |s: &str| -> String {
        s.chars()
            .map(|c| if c.is_ascii_alphanumeric() { c.to_ascii_uppercase() } else { '_' })
            .collect()
    };
    format!("{}_{}_{}", ENV_PREFIX, normalize(scope), normalize(key))
}

/// 從環境變數讀取 secret
#[derive(Debug, Clone, Default)]
pub struct EnvSecretStore;

impl SecretStore for EnvSecretStore {
    fn get(&self, scope: &str, key: &str) -> Result<String> {
        let var = env_var_name(scope, key);
        tracing::debug!("Resolving secret {}/{} from {}", scope, key, var);
        std::env::var(&var).map_err(|_| DataflowError::SecretNotFoundError {
            scope: scope.to_string(),
            key: key.to_string(),
        })
    }
}

/// 記憶體中的 secret，嵌入使用或測試用
#[derive(Debug, Clone, Default)]
pub struct StaticSecretStore {
    secrets: HashMap<(String, String), String>,
}

impl StaticSecretStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_secret(mut self, scope: &str, key: &str, value: &str) -> Self {
        self.secrets
            .insert((scope.to_string(), key.to_string()), value.to_string());
        self
    }
}

impl SecretStore for StaticSecretStore {
    fn get(&self, scope: &str, key: &str) -> Result<String> {
        self.secrets
            .get(&(scope.to_string(), key.to_string()))
            .cloned()
            .ok_or_else(|| DataflowError::SecretNotFoundError {
                scope: scope.to_string(),
                key: key.to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_env_var_name() {
        assert_eq!(
            env_var_name("kafka-scope", "bootstrap.servers"),
            "DATAFLOW_SECRET_KAFKA_SCOPE_BOOTSTRAP_SERVERS"
        );
    }

    #[test]
    fn test_env_secret_store() {
        std::env::set_var("DATAFLOW_SECRET_UNIT_SCOPE_UNIT_KEY", "broker:9092");
        let store = EnvSecretStore;
        assert_eq!(store.get("unit_scope", "unit_key").unwrap(), "broker:9092");
        std::env::remove_var("DATAFLOW_SECRET_UNIT_SCOPE_UNIT_KEY");

        assert!(store.get("unit_scope", "missing_key").is_err());
    }

    #[test]
    fn test_static_secret_store() {
        let store = StaticSecretStore::new().with_secret("scope", "key", "value");
        assert_eq!(store.get("scope", "key").unwrap(), "value");
        assert!(store.get("scope", "other").is_err());
    }
}
