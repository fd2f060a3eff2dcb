//! [`EnvsStore`](pyscout_core::EnvsStore) implementations.
#![deny(unused_crate_dependencies)]

mod json_file;
mod memory;

pub use json_file::{JsonFileStore, STORE_FORMAT_VERSION};
pub use memory::InMemoryStore;

#[cfg(test)]
use tokio_test as _;
