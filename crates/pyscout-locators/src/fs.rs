//! Filesystem helpers shared by the locators.
//!
//! Every helper swallows I/O errors: a missing or unreadable directory is
//! logged at `debug` and reads as empty.

use std::path::{Path, PathBuf};
use std::time::SystemTime;

use pyscout_core::LocatorError;
use pyscout_core::domain::UNKNOWN_TIMESTAMP;
use tracing::debug;

/// Entries of `dir`, sorted by file name.
pub async fn read_dir_entries(dir: &Path) -> Vec<PathBuf> {
    let mut reader = match tokio::fs::read_dir(dir).await {
        Ok(reader) => reader,
        Err(e) => {
            debug!(error = %LocatorError::io(dir, &e), "Skipping unreadable directory");
            return Vec::new();
        }
    };
    let mut entries = Vec::new();
    loop {
        match reader.next_entry().await {
            Ok(Some(entry)) => entries.push(entry.path()),
            Ok(None) => break,
            Err(e) => {
                debug!(error = %LocatorError::io(dir, &e), "Directory listing interrupted");
                break;
            }
        }
    }
    entries.sort();
    entries
}

/// Subdirectories of `dir`, sorted by name.
pub async fn subdirectories(dir: &Path) -> Vec<PathBuf> {
    let mut dirs = Vec::new();
    for entry in read_dir_entries(dir).await {
        if is_dir(&entry).await {
            dirs.push(entry);
        }
    }
    dirs
}

pub async fn is_dir(path: &Path) -> bool {
    tokio::fs::metadata(path).await.is_ok_and(|m| m.is_dir())
}

pub async fn is_file(path: &Path) -> bool {
    tokio::fs::metadata(path).await.is_ok_and(|m| m.is_file())
}

pub async fn read_to_string(path: &Path) -> Option<String> {
    match tokio::fs::read_to_string(path).await {
        Ok(text) => Some(text),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => None,
        Err(e) => {
            debug!(error = %LocatorError::io(path, &e), "Failed to read file");
            None
        }
    }
}

/// Whether `name` looks like a CPython launcher: `python`, `python3`,
/// `python3.11` (with `.exe` on Windows).
pub fn is_python_executable_name(name: &str) -> bool {
    let stem = if cfg!(windows) {
        let lower = name.to_ascii_lowercase();
        match lower.strip_suffix(".exe") {
            Some(stem) => return is_python_stem(stem),
            None => return false,
        }
    } else {
        name
    };
    is_python_stem(stem)
}

fn is_python_stem(stem: &str) -> bool {
    let Some(rest) = stem.strip_prefix("python") else {
        return false;
    };
    if rest.is_empty() {
        return true;
    }
    let mut parts = rest.split('.');
    let major_ok = parts
        .next()
        .is_some_and(|p| !p.is_empty() && p.chars().all(|c| c.is_ascii_digit()));
    let minor_ok = parts
        .next()
        .is_none_or(|p| !p.is_empty() && p.chars().all(|c| c.is_ascii_digit()));
    major_ok && minor_ok && parts.next().is_none()
}

/// Interpreter files directly inside `dir`.
pub async fn find_interpreters(dir: &Path) -> Vec<PathBuf> {
    let mut found = Vec::new();
    for entry in read_dir_entries(dir).await {
        let named_like_python = entry
            .file_name()
            .and_then(|n| n.to_str())
            .is_some_and(is_python_executable_name);
        if named_like_python && is_file(&entry).await {
            found.push(entry);
        }
    }
    found
}

/// Name of the scripts directory inside an environment.
pub const fn bin_dir_name() -> &'static str {
    if cfg!(windows) { "Scripts" } else { "bin" }
}

/// The preferred interpreter of the environment rooted at `env_dir`.
pub async fn find_env_interpreter(env_dir: &Path) -> Option<PathBuf> {
    let candidates: Vec<PathBuf> = if cfg!(windows) {
        vec![
            env_dir.join("Scripts").join("python.exe"),
            env_dir.join("python.exe"),
        ]
    } else {
        vec![
            env_dir.join("bin").join("python"),
            env_dir.join("bin").join("python3"),
        ]
    };
    for candidate in candidates {
        if is_file(&candidate).await {
            return Some(candidate);
        }
    }
    find_interpreters(&env_dir.join(bin_dir_name()))
        .await
        .into_iter()
        .next()
}

/// Directory of the environment that owns `executable`: the parent of a
/// `bin`/`Scripts` directory, otherwise the executable's own directory.
pub fn env_dir_of(executable: &Path) -> PathBuf {
    let Some(dir) = executable.parent() else {
        return PathBuf::new();
    };
    let is_scripts_dir = dir
        .file_name()
        .and_then(|n| n.to_str())
        .is_some_and(|n| n == "bin" || n.eq_ignore_ascii_case("Scripts"));
    match dir.parent() {
        Some(parent) if is_scripts_dir => parent.to_path_buf(),
        _ => dir.to_path_buf(),
    }
}

fn millis(time: std::io::Result<SystemTime>) -> i64 {
    time.ok()
        .and_then(|t| t.duration_since(SystemTime::UNIX_EPOCH).ok())
        .and_then(|d| i64::try_from(d.as_millis()).ok())
        .unwrap_or(UNKNOWN_TIMESTAMP)
}

/// `(ctime, mtime)` of `path` in milliseconds since the epoch.
pub async fn file_times(path: &Path) -> (i64, i64) {
    match tokio::fs::metadata(path).await {
        Ok(meta) => (millis(meta.created()), millis(meta.modified())),
        Err(_) => (UNKNOWN_TIMESTAMP, UNKNOWN_TIMESTAMP),
    }
}

/// Canonical location of `path`, following symlinks.
pub async fn canonical(path: &Path) -> PathBuf {
    tokio::fs::canonicalize(path)
        .await
        .unwrap_or_else(|_| path.to_path_buf())
}
