//! Command handlers.
//!
//! Handlers are thin: build the query, call the collection service or the
//! locator switches through [`CliContext`](crate::CliContext), format the
//! result.

pub mod list;
pub mod locators;
pub mod refresh;
pub mod resolve;
pub mod watch;
