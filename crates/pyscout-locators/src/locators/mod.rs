//! Low-level locators, one per environment manager or discovery technique.
//!
//! # Design Rules
//!
//! - Scans never fail: an unreadable directory or a failing manager CLI
//!   degrades to fewer results and a log line
//! - Watchers are started by the first `iter_envs` call and stopped by
//!   `dispose`
//! - Each resolver accepts only the kinds its locator reports

mod conda;
mod global_dirs;
mod global_virtualenv;
mod poetry;
mod pyenv;
mod windows_registry;
mod windows_store;
mod workspace_virtualenv;

use std::path::{Path, PathBuf};

use pyscout_core::utils::is_parent_path;
use pyscout_core::{PythonEnvInfo, PythonEnvKind, PythonLocatorQuery};

use crate::fs;

pub use conda::CondaLocator;
pub use global_dirs::{PathEnvVarLocator, PosixKnownPathsLocator};
pub use global_virtualenv::GlobalVirtualEnvLocator;
pub use poetry::PoetryLocator;
pub use pyenv::PyenvLocator;
pub use windows_registry::{NoRegistry, RegistryInterpreter, RegistryReader, WindowsRegistryLocator};
#[cfg(windows)]
pub use windows_registry::WinRegistry;
pub use windows_store::WindowsStoreLocator;
pub use workspace_virtualenv::WorkspaceVirtualEnvLocator;

/// Whether a query admits environments without a search location.
pub(crate) fn accepts_non_rooted(query: &PythonLocatorQuery) -> bool {
    query
        .search_locations
        .as_ref()
        .is_none_or(|locations| locations.include_non_rooted)
}

/// The configured roots that fall under the roots a query asks for.
pub(crate) fn roots_in_scope(query: &PythonLocatorQuery, roots: &[PathBuf]) -> Vec<PathBuf> {
    match &query.search_locations {
        None => roots.to_vec(),
        Some(locations) => roots
            .iter()
            .filter(|root| locations.roots.iter().any(|wanted| is_parent_path(root, wanted)))
            .cloned()
            .collect(),
    }
}

/// The configured root containing `path`.
pub(crate) fn root_of<'a>(path: &Path, roots: &'a [PathBuf]) -> Option<&'a PathBuf> {
    roots.iter().find(|root| is_parent_path(path, root))
}

/// The interpreter of `env` when it exists on disk.
pub(crate) async fn existing_interpreter(env: &PythonEnvInfo) -> Option<PathBuf> {
    let filename = env.filename();
    if filename.as_os_str().is_empty() || !fs::is_file(filename).await {
        return None;
    }
    Some(filename.to_path_buf())
}

/// Interpreters outside any recognized manager are reported as
/// [`PythonEnvKind::OtherGlobal`] by the global locators.
pub(crate) fn global_kind(kind: PythonEnvKind) -> PythonEnvKind {
    if kind == PythonEnvKind::Unknown {
        PythonEnvKind::OtherGlobal
    } else {
        kind
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pyscout_core::SearchLocations;

    #[test]
    fn test_query_scoping() {
        let roots = vec![PathBuf::from("/w/a"), PathBuf::from("/w/b")];
        assert!(accepts_non_rooted(&PythonLocatorQuery::all()));
        assert_eq!(roots_in_scope(&PythonLocatorQuery::all(), &roots), roots);

        let query = PythonLocatorQuery::all()
            .with_search_locations(SearchLocations::new(vec![PathBuf::from("/w/b")]));
        assert!(!accepts_non_rooted(&query));
        assert_eq!(roots_in_scope(&query, &roots), vec![PathBuf::from("/w/b")]);
        assert_eq!(root_of(Path::new("/w/a/.venv/bin/python"), &roots), Some(&roots[0]));
    }
}
