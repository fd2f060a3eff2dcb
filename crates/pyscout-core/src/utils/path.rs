//! Path comparison helpers that respect platform case rules.

use std::path::{Component, Path, PathBuf};

/// Lexically normalize a path: drop `.` segments, resolve `..` against
/// preceding segments, and lowercase on case-insensitive platforms.
pub fn norm_case_path(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !out.pop() {
                    out.push("..");
                }
            }
            other => out.push(other.as_os_str()),
        }
    }
    if cfg!(windows) {
        PathBuf::from(out.to_string_lossy().to_lowercase())
    } else {
        out
    }
}

/// Whether two paths name the same location after normalization.
pub fn are_paths_same(left: &Path, right: &Path) -> bool {
    norm_case_path(left) == norm_case_path(right)
}

/// Whether `parent` is `path` itself or one of its ancestors.
pub fn is_parent_path(path: &Path, parent: &Path) -> bool {
    norm_case_path(path).starts_with(norm_case_path(parent))
}

/// Parent directory, or an empty path for a bare file name.
pub fn parent_dir(path: &Path) -> &Path {
    path.parent().unwrap_or_else(|| Path::new(""))
}
