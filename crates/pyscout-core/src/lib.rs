//! Domain model, ports and the collection service of the pyscout Python
//! environment discovery pipeline.
//!
//! Data flows from low-level locators through the composite locator and the
//! resolver into [`services::EnvsCollectionService`], which persists,
//! deduplicates and diffs what was found.
#![deny(unused_crate_dependencies)]

pub mod domain;
pub mod events;
pub mod paths;
pub mod ports;
pub mod services;
pub mod settings;
pub mod utils;

pub use domain::{
    Architecture, EnvInit, EnvRef, PythonDistroInfo, PythonEnvCompleteInfo, PythonEnvInfo,
    PythonEnvKind, PythonEnvSource, PythonExecutableInfo, PythonLocatorQuery, PythonVersion,
    ReleaseLevel, SearchLocations, are_same_env, build_env_info, copy_env_info,
    get_minimal_partial_info, get_query_filter, merge_environments, resolve_env_collision,
};
pub use events::{
    EnvCollectionEvent, EventBroadcaster, FileChangeType, IteratorUpdate, PythonEnvUpdatedEvent,
    PythonEnvsChangedEvent, apply_collection_event,
};
pub use paths::{EnvSource, PathError, ProcessEnv, StaticEnv};
pub use ports::{
    AllowAll, CompletenessCheck, CoreError, DenyAll, EnvIterator, EnvResolver, EnvStream,
    EnvsStore, ExecutionPolicy, InterpreterInformation, InterpreterProbe, IteratorUpdates,
    Locator, LocatorError, NoopEnvsStore, ProbeError, StoreError, default_completeness_check,
};
pub use services::{EnvsCache, EnvsCollectionService, RefreshHandle};
pub use settings::{DiscoverySettings, SettingsError, validate_settings};

#[cfg(test)]
use tokio_test as _;
