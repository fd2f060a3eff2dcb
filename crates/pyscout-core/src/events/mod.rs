//! Change-notification vocabularies.
//!
//! Two related event families exist:
//!
//! - `locator` - raw events a locator emits when its watched locations
//!   change, plus the per-iteration `onUpdated` refinement channel
//! - `collection` - diff events the collection service emits after it
//!   reconciles its cache
//!
//! # Wire Format
//!
//! Events are serialized with a `type` tag:
//!
//! ```json
//! { "type": "update", "old": { ... }, "new": { ... } }
//! ```

mod broadcaster;
mod collection;
mod locator;

pub use broadcaster::EventBroadcaster;
pub use collection::{EnvCollectionEvent, apply_collection_event};
pub use locator::{FileChangeType, IteratorUpdate, PythonEnvUpdatedEvent, PythonEnvsChangedEvent};
