//! Data-root resolution.

use std::path::PathBuf;

use super::env::EnvSource;
use super::error::PathError;

/// Environment variable overriding the data root.
pub const DATA_DIR_ENV: &str = "PYSCOUT_DATA_DIR";

/// File name of the persisted environment cache inside the data root.
pub const STORE_FILE_NAME: &str = "envs-cache.json";

/// Get the root directory for pyscout data.
///
/// Resolution order:
/// 1. `PYSCOUT_DATA_DIR` environment variable
/// 2. System data directory (e.g. `~/.local/share/pyscout`)
pub fn data_root(env: &dyn EnvSource) -> Result<PathBuf, PathError> {
    if let Some(path) = env.path_var(DATA_DIR_ENV) {
        return Ok(path);
    }
    let data_dir = dirs::data_local_dir().ok_or(PathError::NoDataDir)?;
    Ok(data_dir.join("pyscout"))
}

/// Default location of the persisted environment cache.
pub fn default_store_path(env: &dyn EnvSource) -> Result<PathBuf, PathError> {
    Ok(data_root(env)?.join(STORE_FILE_NAME))
}
