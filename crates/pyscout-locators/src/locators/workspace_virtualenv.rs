//! Virtual environments inside workspace folders: the root itself, its
//! direct children (`.venv`, `venv`, `env`, ...) and `.direnv/*`.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_stream::stream;
use async_trait::async_trait;
use pyscout_core::{
    EnvIterator, EnvResolver, EnvSource, Locator, PythonEnvInfo, PythonEnvKind, PythonEnvSource,
    PythonEnvsChangedEvent, PythonLocatorQuery,
};
use tokio::sync::broadcast;

use super::{existing_interpreter, root_of, roots_in_scope};
use crate::env_builder::DiscoveredEnv;
use crate::fs;
use crate::identification::{identify_environment, is_virtual_layout};
use crate::watcher::{LocatorWatch, WatchSpec};

struct Inner {
    roots: Vec<PathBuf>,
    env: Arc<dyn EnvSource>,
    watch: LocatorWatch,
}

impl Inner {
    /// Kind of the virtual environment behind `executable`, or `None` when
    /// it is not one this locator reports.
    async fn workspace_kind(&self, executable: &Path) -> Option<PythonEnvKind> {
        if !is_virtual_layout(executable).await {
            return None;
        }
        let kind = identify_environment(executable, self.env.as_ref()).await;
        (kind.is_virtual() && kind != PythonEnvKind::Conda).then_some(kind)
    }

    async fn candidate_dirs(root: &Path) -> Vec<PathBuf> {
        let mut dirs = vec![root.to_path_buf()];
        dirs.extend(fs::subdirectories(root).await);
        dirs.extend(fs::subdirectories(&root.join(".direnv")).await);
        dirs
    }
}

pub struct WorkspaceVirtualEnvLocator {
    inner: Arc<Inner>,
}

impl WorkspaceVirtualEnvLocator {
    pub const NAME: &'static str = "workspaceVirtualEnv";

    pub fn new(roots: Vec<PathBuf>, env: Arc<dyn EnvSource>) -> Self {
        Self {
            inner: Arc::new(Inner {
                roots,
                env,
                watch: LocatorWatch::new(),
            }),
        }
    }
}

impl Locator for WorkspaceVirtualEnvLocator {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn iter_envs(&self, query: &PythonLocatorQuery) -> EnvIterator {
        let inner = Arc::clone(&self.inner);
        inner.watch.start_once(|| {
            inner
                .roots
                .iter()
                .flat_map(|root| {
                    [
                        WatchSpec::entries(root).with_search_location(root),
                        WatchSpec::entries(root.join(".direnv")).with_search_location(root),
                    ]
                })
                .collect()
        });
        let roots = roots_in_scope(query, &inner.roots);
        EnvIterator::new(Box::pin(stream! {
            for root in roots {
                for dir in Inner::candidate_dirs(&root).await {
                    let Some(executable) = fs::find_env_interpreter(&dir).await else {
                        continue;
                    };
                    let Some(kind) = inner.workspace_kind(&executable).await else {
                        continue;
                    };
                    yield DiscoveredEnv::new(executable, kind, PythonEnvSource::WorkspaceVirtualEnv)
                        .with_search_location(&root)
                        .build()
                        .await;
                }
            }
        }))
    }

    fn subscribe(&self) -> broadcast::Receiver<PythonEnvsChangedEvent> {
        self.inner.watch.subscribe()
    }

    fn resolver(&self) -> Option<&dyn EnvResolver> {
        Some(self)
    }

    fn dispose(&self) {
        self.inner.watch.dispose();
    }
}

#[async_trait]
impl EnvResolver for WorkspaceVirtualEnvLocator {
    async fn resolve_env(&self, env: &PythonEnvInfo) -> Option<PythonEnvInfo> {
        let executable = existing_interpreter(env).await?;
        let root = root_of(&executable, &self.inner.roots)?.clone();
        let kind = self.inner.workspace_kind(&executable).await?;
        Some(
            DiscoveredEnv::new(executable, kind, PythonEnvSource::WorkspaceVirtualEnv)
                .with_search_location(root)
                .build()
                .await,
        )
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use futures_util::StreamExt;
    use pyscout_core::{SearchLocations, StaticEnv};

    fn make_venv(dir: &Path) -> PathBuf {
        std::fs::create_dir_all(dir.join("bin")).unwrap();
        std::fs::write(dir.join("pyvenv.cfg"), "version = 3.10.12\n").unwrap();
        let exe = dir.join("bin").join("python");
        std::fs::write(&exe, "").unwrap();
        exe
    }

    #[tokio::test]
    async fn test_finds_child_and_direnv_environments() {
        let work = tempfile::tempdir().unwrap();
        let root = work.path().join("proj");
        make_venv(&root.join(".venv"));
        make_venv(&root.join(".direnv").join("python-3.10"));
        std::fs::create_dir_all(root.join("src")).unwrap();
        let conda = root.join("condaenv");
        std::fs::create_dir_all(conda.join("conda-meta")).unwrap();
        std::fs::create_dir_all(conda.join("bin")).unwrap();
        std::fs::write(conda.join("bin").join("python"), "").unwrap();
        std::fs::write(conda.join("bin").join("activate"), "").unwrap();

        let locator =
            WorkspaceVirtualEnvLocator::new(vec![root.clone()], Arc::new(StaticEnv::new()));
        let envs: Vec<PythonEnvInfo> =
            locator.iter_envs(&PythonLocatorQuery::all()).envs.collect().await;
        let mut names: Vec<&str> = envs.iter().map(|e| e.name.as_str()).collect();
        names.sort_unstable();
        assert_eq!(names, vec![".venv", "python-3.10"]);
        assert!(envs.iter().all(|e| e.search_location.as_deref() == Some(root.as_path())));
        assert!(envs.iter().all(|e| e.kind == PythonEnvKind::Venv));
        locator.dispose();
    }

    #[tokio::test]
    async fn test_query_outside_roots_yields_nothing() {
        let work = tempfile::tempdir().unwrap();
        let root = work.path().join("proj");
        make_venv(&root.join(".venv"));
        let locator = WorkspaceVirtualEnvLocator::new(vec![root], Arc::new(StaticEnv::new()));
        let query = PythonLocatorQuery::all()
            .with_search_locations(SearchLocations::new(vec![work.path().join("other")]));
        assert_eq!(locator.iter_envs(&query).envs.count().await, 0);
    }

    #[tokio::test]
    async fn test_resolver_requires_workspace_root() {
        let work = tempfile::tempdir().unwrap();
        let root = work.path().join("proj");
        let inside = make_venv(&root.join("venv"));
        let outside = make_venv(&work.path().join("elsewhere"));
        let locator =
            WorkspaceVirtualEnvLocator::new(vec![root.clone()], Arc::new(StaticEnv::new()));
        let resolver = locator.resolver().unwrap();

        let resolved = resolver
            .resolve_env(&pyscout_core::get_minimal_partial_info(inside.as_path()).unwrap())
            .await
            .unwrap();
        assert_eq!(resolved.search_location, Some(root));
        assert!(resolver
            .resolve_env(&pyscout_core::get_minimal_partial_info(outside.as_path()).unwrap())
            .await
            .is_none());
    }
}
