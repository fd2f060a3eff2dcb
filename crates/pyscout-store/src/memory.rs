use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;
use pyscout_core::{EnvsStore, PythonEnvInfo, StoreError};

/// Store that keeps the last written set in memory.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    envs: Mutex<Vec<PythonEnvInfo>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start with `envs` already stored.
    pub fn seeded(envs: Vec<PythonEnvInfo>) -> Self {
        Self {
            envs: Mutex::new(envs),
        }
    }

    pub fn snapshot(&self) -> Vec<PythonEnvInfo> {
        self.envs
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[async_trait]
impl EnvsStore for InMemoryStore {
    async fn load(&self) -> Result<Vec<PythonEnvInfo>, StoreError> {
        Ok(self.snapshot())
    }

    async fn store(&self, envs: Vec<PythonEnvInfo>) -> Result<(), StoreError> {
        *self.envs.lock().unwrap_or_else(PoisonError::into_inner) = envs;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pyscout_core::{EnvInit, build_env_info};

    #[tokio::test]
    async fn test_store_replaces_previous_set() {
        let store =
            InMemoryStore::seeded(vec![build_env_info(EnvInit::executable("/a/bin/python"))]);
        assert_eq!(store.load().await.unwrap().len(), 1);
        store.store(Vec::new()).await.unwrap();
        assert!(store.load().await.unwrap().is_empty());
    }
}
