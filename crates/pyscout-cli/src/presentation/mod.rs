//! Shared CLI presentation utilities.
//!
//! Format-only: no domain transforms.

mod tables;

pub use tables::{describe_event, env_row, print_env_table, print_separator, truncate_string};
