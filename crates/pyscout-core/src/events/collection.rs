//! Diff events emitted by the collection service.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::domain::{PythonEnvCompleteInfo, are_same_env};

/// Change to the collection's cached snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum EnvCollectionEvent {
    /// A reconciliation pass is about to report changes; derived indexes
    /// may be rebuilt from scratch. Carries no change to the snapshot itself.
    ClearAll,
    Add { env: PythonEnvCompleteInfo },
    Update {
        old: PythonEnvCompleteInfo,
        new: PythonEnvCompleteInfo,
    },
    Remove { old: PythonEnvCompleteInfo },
}

impl EnvCollectionEvent {
    pub const fn event_name(&self) -> &'static str {
        match self {
            Self::ClearAll => "envs:clear-all",
            Self::Add { .. } => "envs:add",
            Self::Update { .. } => "envs:update",
            Self::Remove { .. } => "envs:remove",
        }
    }

    /// Interpreter path the event concerns, if any.
    pub fn path(&self) -> Option<&Path> {
        match self {
            Self::ClearAll => None,
            Self::Add { env } => Some(env.filename()),
            Self::Update { new, .. } => Some(new.filename()),
            Self::Remove { old } => Some(old.filename()),
        }
    }
}

/// Apply `event` to a mirrored snapshot.
///
/// Replaying every event of a refresh, in order, onto the pre-refresh list
/// reproduces the post-refresh list.
pub fn apply_collection_event(envs: &mut Vec<PythonEnvCompleteInfo>, event: &EnvCollectionEvent) {
    let position = |envs: &[PythonEnvCompleteInfo], target: &PythonEnvCompleteInfo| {
        envs.iter()
            .position(|e| e.filename() == target.filename())
            .or_else(|| {
                envs.iter()
                    .position(|e| are_same_env(e, target, false) == Some(true))
            })
    };
    match event {
        EnvCollectionEvent::ClearAll => {}
        EnvCollectionEvent::Add { env } => envs.push(env.clone()),
        EnvCollectionEvent::Update { old, new } => match position(envs, old) {
            Some(index) => envs[index] = new.clone(),
            None => envs.push(new.clone()),
        },
        EnvCollectionEvent::Remove { old } => {
            if let Some(index) = position(envs, old) {
                envs.remove(index);
            }
        }
    }
}
