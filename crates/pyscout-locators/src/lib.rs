//! Locators for pyscout: filesystem scans, manager CLIs and the Windows
//! registry, plus the composite that fans them into one stream.
//!
//! Everything here implements [`pyscout_core::Locator`]. Locators only
//! report what they can learn without running an interpreter; running
//! interpreters is the resolver's job in `pyscout-runtime`.
#![deny(unused_crate_dependencies)]

pub mod composite;
pub mod env_builder;
pub mod factory;
pub mod fs;
pub mod identification;
pub mod locators;
pub mod metadata;
pub mod tool;
pub mod watcher;

pub use composite::{ChangeRelay, DisableableLocator, Locators};
pub use env_builder::DiscoveredEnv;
pub use factory::{compose, default_locators};
pub use identification::identify_environment;
pub use locators::{
    CondaLocator, GlobalVirtualEnvLocator, NoRegistry, PathEnvVarLocator, PoetryLocator,
    PosixKnownPathsLocator, PyenvLocator, RegistryInterpreter, RegistryReader,
    WindowsRegistryLocator, WindowsStoreLocator, WorkspaceVirtualEnvLocator,
};
#[cfg(windows)]
pub use locators::WinRegistry;
pub use watcher::{LocatorWatch, WatchFilter, WatchSpec};

#[cfg(test)]
use tokio_test as _;
