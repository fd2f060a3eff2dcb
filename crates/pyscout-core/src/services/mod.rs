//! Core services - the discovery pipeline's consistency layer.
//!
//! Services orchestrate between ports and domain logic; they never know
//! about concrete locators or stores.

mod collection_service;
mod envs_cache;

pub use collection_service::{EnvsCollectionService, RefreshHandle};
pub use envs_cache::EnvsCache;
