//! Persistence port for the environment cache.

use async_trait::async_trait;

use super::StoreError;
use crate::domain::PythonEnvInfo;

/// Backing store for complete environment records.
///
/// `store` always receives the full set of complete entries, never a diff.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait EnvsStore: Send + Sync {
    async fn load(&self) -> Result<Vec<PythonEnvInfo>, StoreError>;

    async fn store(&self, envs: Vec<PythonEnvInfo>) -> Result<(), StoreError>;
}

/// Store that persists nothing.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopEnvsStore;

#[async_trait]
impl EnvsStore for NoopEnvsStore {
    async fn load(&self) -> Result<Vec<PythonEnvInfo>, StoreError> {
        Ok(Vec::new())
    }

    async fn store(&self, _envs: Vec<PythonEnvInfo>) -> Result<(), StoreError> {
        Ok(())
    }
}
