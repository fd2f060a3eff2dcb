//! Domain types for Python environment discovery.
//!
//! These types have no infrastructure dependencies: no filesystem access,
//! no process execution, no channels.

pub mod info;
pub mod kind;
pub mod query;
pub mod version;

pub use info::{
    Architecture, EnvInit, EnvRef, PythonDistroInfo, PythonEnvCompleteInfo, PythonEnvInfo,
    PythonEnvSource, PythonExecutableInfo, UNKNOWN_TIMESTAMP, are_same_env, build_env_info,
    copy_env_info, get_minimal_partial_info, merge_environments, resolve_env_collision,
};
pub use kind::PythonEnvKind;
pub use query::{PythonLocatorQuery, SearchLocations, get_query_filter};
pub use version::{PythonVersion, PythonVersionRelease, ReleaseLevel, UNKNOWN_COMPONENT};
