//! The `pyscout` command-line adapter.
//!
//! [`bootstrap`] is the composition root: it wires the locators, the
//! resolver, the store and the collection service together. Handlers only
//! talk to the resulting [`CliContext`].
#![deny(unused_crate_dependencies)]

#[cfg(test)]
use tokio_test as _;

// Used by the binary target only.
use anyhow as _;
use tracing_subscriber as _;

pub mod bootstrap;
pub mod commands;
pub mod error;
pub mod handlers;
pub mod parser;
pub mod presentation;

pub use bootstrap::{CliContext, bootstrap, load_settings};
pub use commands::Commands;
pub use error::CliError;
pub use parser::Cli;
