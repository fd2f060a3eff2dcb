//! Events produced at the locator layer.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::domain::{PythonEnvInfo, PythonEnvKind};

/// What happened on disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileChangeType {
    Created,
    Changed,
    Deleted,
}

/// Raw change notification from a locator. Absent fields mean "any".
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PythonEnvsChangedEvent {
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub change: Option<FileChangeType>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kind: Option<PythonEnvKind>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub search_location: Option<PathBuf>,
}

impl PythonEnvsChangedEvent {
    /// "Something may have changed anywhere."
    pub fn any() -> Self {
        Self::default()
    }

    pub const fn new(change: FileChangeType, kind: Option<PythonEnvKind>) -> Self {
        Self {
            change: Some(change),
            kind,
            search_location: None,
        }
    }

    #[must_use]
    pub fn with_search_location(mut self, root: impl Into<PathBuf>) -> Self {
        self.search_location = Some(root.into());
        self
    }
}

/// Background refinement of an environment an iterator already yielded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PythonEnvUpdatedEvent {
    /// Yield-order index of the environment within its iterator.
    pub index: usize,
    /// The record as previously known.
    pub old: Option<PythonEnvInfo>,
    /// The refined record. `None` means the environment turned out to be
    /// invalid and must be purged.
    pub update: Option<PythonEnvInfo>,
}

/// Item on an iterator's update channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IteratorUpdate {
    Updated(PythonEnvUpdatedEvent),
    /// Terminal sentinel: no further updates will arrive.
    Complete,
}
