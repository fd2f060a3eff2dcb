//! JSON file store.
//!
//! Format:
//! ```text
//! { "version": 1, "envs": [ <PythonEnvInfo>, ... ] }
//! ```
//! A document with another version, or one that does not parse, loads as
//! an empty set. Writes go to a sibling temp file that is then renamed
//! over the target.

use std::ffi::OsString;
use std::io;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use pyscout_core::{EnvsStore, PythonEnvInfo, StoreError};
use serde::{Deserialize, Serialize};
use tokio::fs;
use tokio::sync::Mutex;
use tracing::{debug, warn};

pub const STORE_FORMAT_VERSION: u32 = 1;

#[derive(Deserialize)]
struct Header {
    version: u32,
}

#[derive(Serialize, Deserialize)]
struct Document<T> {
    version: u32,
    envs: T,
}

pub struct JsonFileStore {
    path: PathBuf,
    // Serialises writers so temp files are never shared.
    write_lock: Mutex<()>,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map_or_else(|| OsString::from("envs"), ToOwned::to_owned);
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

fn io_error(path: &Path, err: &io::Error) -> StoreError {
    StoreError::Io(format!("{}: {err}", path.display()))
}

/// Decode a stored document, treating anything unreadable as empty.
fn decode(path: &Path, text: &str) -> Vec<PythonEnvInfo> {
    let header: Header = match serde_json::from_str(text) {
        Ok(header) => header,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Ignoring unreadable environment cache");
            return Vec::new();
        }
    };
    if header.version != STORE_FORMAT_VERSION {
        let err = StoreError::UnsupportedVersion {
            found: header.version,
            expected: STORE_FORMAT_VERSION,
        };
        warn!(path = %path.display(), error = %err, "Ignoring environment cache");
        return Vec::new();
    }
    match serde_json::from_str::<Document<Vec<PythonEnvInfo>>>(text) {
        Ok(document) => document.envs,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Ignoring unreadable environment cache");
            Vec::new()
        }
    }
}

#[async_trait]
impl EnvsStore for JsonFileStore {
    async fn load(&self) -> Result<Vec<PythonEnvInfo>, StoreError> {
        let text = match fs::read_to_string(&self.path).await {
            Ok(text) => text,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "No environment cache yet");
                return Ok(Vec::new());
            }
            Err(e) => return Err(io_error(&self.path, &e)),
        };
        let envs = decode(&self.path, &text);
        debug!(path = %self.path.display(), count = envs.len(), "Loaded environment cache");
        Ok(envs)
    }

    async fn store(&self, envs: Vec<PythonEnvInfo>) -> Result<(), StoreError> {
        let document = Document {
            version: STORE_FORMAT_VERSION,
            envs: &envs,
        };
        let content = serde_json::to_vec_pretty(&document)
            .map_err(|e| StoreError::Serialization(e.to_string()))?;

        let _guard = self.write_lock.lock().await;
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| io_error(parent, &e))?;
        }
        let temp = self.temp_path();
        fs::write(&temp, content)
            .await
            .map_err(|e| io_error(&temp, &e))?;
        fs::rename(&temp, &self.path)
            .await
            .map_err(|e| io_error(&self.path, &e))?;
        debug!(path = %self.path.display(), count = envs.len(), "Stored environment cache");
        Ok(())
    }
}
