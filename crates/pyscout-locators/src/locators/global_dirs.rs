//! Interpreters found directly in well-known directories: `$PATH` entries
//! and the standard POSIX install locations.

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;

use async_stream::stream;
use async_trait::async_trait;
use pyscout_core::paths::{path_entries, posix_known_dirs, pyenv_shims_dir, windows_apps_dir};
use pyscout_core::utils::are_paths_same;
use pyscout_core::{
    EnvIterator, EnvResolver, EnvSource, Locator, PythonEnvInfo, PythonEnvSource,
    PythonEnvsChangedEvent, PythonLocatorQuery,
};
use tokio::sync::broadcast;
use tracing::debug;

use super::{accepts_non_rooted, existing_interpreter, global_kind};
use crate::env_builder::DiscoveredEnv;
use crate::fs;
use crate::identification::identify_environment;
use crate::watcher::{LocatorWatch, WatchSpec};

#[derive(Debug, Clone, Copy)]
enum DirSet {
    PathVar,
    PosixKnown,
}

struct DirScan {
    dirs: DirSet,
    source: PythonEnvSource,
    env: Arc<dyn EnvSource>,
    watch: LocatorWatch,
}

impl DirScan {
    fn search_dirs(&self) -> Vec<PathBuf> {
        let env = self.env.as_ref();
        match self.dirs {
            DirSet::PathVar => {
                // Store launchers and pyenv shims are reported by their own
                // locators.
                let excluded: Vec<PathBuf> = [windows_apps_dir(env), pyenv_shims_dir(env)]
                    .into_iter()
                    .flatten()
                    .collect();
                path_entries(env)
                    .into_iter()
                    .filter(|dir| !excluded.iter().any(|ex| are_paths_same(dir, ex)))
                    .collect()
            }
            DirSet::PosixKnown if cfg!(windows) => Vec::new(),
            DirSet::PosixKnown => posix_known_dirs(env),
        }
    }

    async fn locate(&self, executable: PathBuf) -> PythonEnvInfo {
        let kind = global_kind(identify_environment(&executable, self.env.as_ref()).await);
        DiscoveredEnv::new(executable, kind, self.source).build().await
    }

    fn iter_envs(self: &Arc<Self>, query: &PythonLocatorQuery) -> EnvIterator {
        if !accepts_non_rooted(query) {
            return EnvIterator::empty();
        }
        self.watch.start_once(|| {
            self.search_dirs()
                .into_iter()
                .map(WatchSpec::executables)
                .collect()
        });
        let scan = Arc::clone(self);
        EnvIterator::new(Box::pin(stream! {
            let mut seen = HashSet::new();
            for dir in scan.search_dirs() {
                for executable in fs::find_interpreters(&dir).await {
                    if !seen.insert(fs::canonical(&executable).await) {
                        debug!(path = %executable.display(), "Skipping interpreter alias");
                        continue;
                    }
                    yield scan.locate(executable).await;
                }
            }
        }))
    }
}

/// Interpreters on `$PATH`. Its resolver accepts any existing interpreter
/// and therefore belongs last in a composite.
pub struct PathEnvVarLocator {
    scan: Arc<DirScan>,
}

impl PathEnvVarLocator {
    pub const NAME: &'static str = "path";

    pub fn new(env: Arc<dyn EnvSource>) -> Self {
        Self {
            scan: Arc::new(DirScan {
                dirs: DirSet::PathVar,
                source: PythonEnvSource::PathEnvVar,
                env,
                watch: LocatorWatch::new(),
            }),
        }
    }
}

impl Locator for PathEnvVarLocator {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn iter_envs(&self, query: &PythonLocatorQuery) -> EnvIterator {
        self.scan.iter_envs(query)
    }

    fn subscribe(&self) -> broadcast::Receiver<PythonEnvsChangedEvent> {
        self.scan.watch.subscribe()
    }

    fn resolver(&self) -> Option<&dyn EnvResolver> {
        Some(self)
    }

    fn dispose(&self) {
        self.scan.watch.dispose();
    }
}

#[async_trait]
impl EnvResolver for PathEnvVarLocator {
    async fn resolve_env(&self, env: &PythonEnvInfo) -> Option<PythonEnvInfo> {
        let executable = existing_interpreter(env).await?;
        Some(self.scan.locate(executable).await)
    }
}

/// Interpreters in `/usr/bin`, `/usr/local/bin` and similar. Reports
/// nothing on Windows.
pub struct PosixKnownPathsLocator {
    scan: Arc<DirScan>,
}

impl PosixKnownPathsLocator {
    pub const NAME: &'static str = "posixKnownPaths";

    pub fn new(env: Arc<dyn EnvSource>) -> Self {
        Self {
            scan: Arc::new(DirScan {
                dirs: DirSet::PosixKnown,
                source: PythonEnvSource::KnownPath,
                env,
                watch: LocatorWatch::new(),
            }),
        }
    }
}

impl Locator for PosixKnownPathsLocator {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn iter_envs(&self, query: &PythonLocatorQuery) -> EnvIterator {
        self.scan.iter_envs(query)
    }

    fn subscribe(&self) -> broadcast::Receiver<PythonEnvsChangedEvent> {
        self.scan.watch.subscribe()
    }

    fn resolver(&self) -> Option<&dyn EnvResolver> {
        Some(self)
    }

    fn dispose(&self) {
        self.scan.watch.dispose();
    }
}

#[async_trait]
impl EnvResolver for PosixKnownPathsLocator {
    async fn resolve_env(&self, env: &PythonEnvInfo) -> Option<PythonEnvInfo> {
        let executable = existing_interpreter(env).await?;
        let dir = executable.parent()?;
        let known = self
            .scan
            .search_dirs()
            .iter()
            .any(|known| are_paths_same(dir, known));
        if !known {
            return None;
        }
        Some(self.scan.locate(executable).await)
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use futures_util::StreamExt;
    use pyscout_core::{PythonEnvKind, SearchLocations, StaticEnv};

    fn touch(path: &std::path::Path) {
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, "").unwrap();
    }

    #[tokio::test]
    async fn test_path_scan_skips_shims_and_non_interpreters() {
        let root = tempfile::tempdir().unwrap();
        let bin = root.path().join("bin");
        let shims = root.path().join("pyenv").join("shims");
        touch(&bin.join("python3"));
        touch(&bin.join("python3-config"));
        touch(&shims.join("python"));
        let path = std::env::join_paths([&bin, &shims]).unwrap();
        let env: Arc<dyn EnvSource> = Arc::new(
            StaticEnv::new()
                .with_var("PATH", path.to_string_lossy())
                .with_var("PYENV_ROOT", root.path().join("pyenv").to_string_lossy()),
        );

        let locator = PathEnvVarLocator::new(env);
        let envs: Vec<PythonEnvInfo> =
            locator.iter_envs(&PythonLocatorQuery::all()).envs.collect().await;
        assert_eq!(envs.len(), 1);
        assert_eq!(envs[0].filename(), bin.join("python3"));
        assert_eq!(envs[0].kind, PythonEnvKind::OtherGlobal);
        assert_eq!(envs[0].source, vec![PythonEnvSource::PathEnvVar]);
        locator.dispose();
    }

    #[tokio::test]
    async fn test_rooted_query_excludes_path_envs() {
        let root = tempfile::tempdir().unwrap();
        touch(&root.path().join("python"));
        let env: Arc<dyn EnvSource> =
            Arc::new(StaticEnv::new().with_var("PATH", root.path().to_string_lossy()));
        let locator = PathEnvVarLocator::new(env);
        let query = PythonLocatorQuery::all()
            .with_search_locations(SearchLocations::new(vec![root.path().to_path_buf()]));
        assert_eq!(locator.iter_envs(&query).envs.count().await, 0);
    }

    #[tokio::test]
    async fn test_path_resolver_is_catch_all_for_existing_files() {
        let root = tempfile::tempdir().unwrap();
        let exe = root.path().join("anywhere").join("python3.12");
        touch(&exe);
        let locator = PathEnvVarLocator::new(Arc::new(StaticEnv::new()));
        let resolver = locator.resolver().unwrap();

        let resolved = resolver
            .resolve_env(&pyscout_core::get_minimal_partial_info(exe.as_path()).unwrap())
            .await
            .unwrap();
        assert_eq!(resolved.version, pyscout_core::PythonVersion::new(3, 12, -1));

        let nope = root.path().join("nope");
        let missing = pyscout_core::get_minimal_partial_info(nope.as_path()).unwrap();
        assert!(resolver.resolve_env(&missing).await.is_none());
    }
}
