//! Out-of-process interpreter probing and background resolution.
//!
//! - [`ProcessInterpreterProbe`] runs an interpreter and parses what it
//!   reports about itself.
//! - [`EnvironmentInfoService`] deduplicates and bounds those probes.
//! - [`ResolvingLocator`] wraps a locator, yields its environments
//!   immediately and publishes the probed records as iterator updates.
#![deny(unused_crate_dependencies)]

mod info_service;
mod probe;
mod resolving;

pub use info_service::EnvironmentInfoService;
pub use probe::{PROBE_SCRIPT, ProcessInterpreterProbe, parse_probe_output};
pub use resolving::ResolvingLocator;

#[cfg(test)]
use tokio_test as _;
