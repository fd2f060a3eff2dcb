//! Shared helpers.

pub mod path;

pub use path::{are_paths_same, is_parent_path, norm_case_path, parent_dir};
