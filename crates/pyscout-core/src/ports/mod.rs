//! Port definitions (trait abstractions) for discovery sources and
//! infrastructure.
//!
//! Ports define the interfaces the collection service expects. They use
//! only domain types; filesystem scanning, process spawning and on-disk
//! persistence live in adapter crates.
//!
//! # Design Rules
//!
//! - Locators never fail at the boundary: scan errors degrade to an empty
//!   yield and are logged
//! - Optional capabilities are exposed through `Option`, never probed at
//!   runtime
//! - Change notification goes through typed broadcast channels

pub mod envs_store;
pub mod execution_policy;
pub mod interpreter_probe;
pub mod locator;

use thiserror::Error;

pub use envs_store::{EnvsStore, NoopEnvsStore};
pub use execution_policy::{AllowAll, DenyAll, ExecutionPolicy};
pub use interpreter_probe::{InterpreterInformation, InterpreterProbe};
pub use locator::{
    CompletenessCheck, EnvIterator, EnvResolver, EnvStream, IteratorUpdates, Locator,
    default_completeness_check,
};

#[cfg(test)]
pub use envs_store::MockEnvsStore;

/// Errors raised inside a locator while scanning or watching.
///
/// These never cross the [`Locator`] boundary; locators log them and yield
/// nothing for the failing source.
#[derive(Debug, Error)]
pub enum LocatorError {
    /// A filesystem operation failed.
    #[error("I/O error at {path}: {reason}")]
    Io { path: String, reason: String },

    /// A filesystem watcher could not be created or registered.
    #[error("Watch error: {0}")]
    Watch(String),

    /// An environment-manager command (conda, poetry) failed.
    #[error("Command failed: {0}")]
    Command(String),
}

impl LocatorError {
    pub fn io(path: &std::path::Path, err: &std::io::Error) -> Self {
        Self::Io {
            path: path.display().to_string(),
            reason: err.to_string(),
        }
    }
}

/// Errors from running an interpreter to collect its information.
#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("Failed to spawn {executable}: {reason}")]
    Spawn { executable: String, reason: String },

    #[error("Interpreter exited with status {status}: {stderr}")]
    NonZeroExit { status: String, stderr: String },

    #[error("Probe cancelled")]
    Cancelled,

    #[error("Probe timed out after {0} ms")]
    TimedOut(u64),

    #[error("Invalid probe output: {0}")]
    InvalidOutput(String),

    #[error("Unparseable version: {0}")]
    UnparseableVersion(String),
}

/// Errors from the persisted environment store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Store I/O error: {0}")]
    Io(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Unsupported store version {found} (expected {expected})")]
    UnsupportedVersion { found: u32, expected: u32 },
}

/// Umbrella error for callers that compose several ports.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error(transparent)]
    Locator(#[from] LocatorError),

    #[error(transparent)]
    Probe(#[from] ProbeError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Settings(#[from] crate::settings::SettingsError),

    #[error(transparent)]
    Path(#[from] crate::paths::PathError),
}
