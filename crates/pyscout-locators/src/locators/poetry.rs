//! Poetry-managed environments of workspace projects: the in-project
//! `.venv` and the environments poetry keeps in its cache directory.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_stream::stream;
use async_trait::async_trait;
use pyscout_core::paths::poetry_virtualenvs_dir;
use pyscout_core::{
    EnvIterator, EnvResolver, EnvSource, Locator, PythonEnvInfo, PythonEnvKind, PythonEnvSource,
    PythonEnvsChangedEvent, PythonLocatorQuery,
};
use tokio::sync::broadcast;
use tracing::warn;

use super::{existing_interpreter, root_of, roots_in_scope};
use crate::env_builder::DiscoveredEnv;
use crate::fs;
use crate::identification::identify_environment;
use crate::metadata::{PoetryProject, poetry_env_name_prefix, read_poetry_project};
use crate::tool::{parse_poetry_env_list, run_tool};
use crate::watcher::{LocatorWatch, WatchSpec};

struct Inner {
    roots: Vec<PathBuf>,
    poetry: Option<PathBuf>,
    env: Arc<dyn EnvSource>,
    watch: LocatorWatch,
}

impl Inner {
    /// Environment directories that belong to `project`.
    async fn project_env_dirs(&self, project: &PoetryProject) -> Vec<PathBuf> {
        let mut dirs = vec![project.root.join(".venv")];
        if let (Some(name), Some(cache)) =
            (&project.name, poetry_virtualenvs_dir(self.env.as_ref()))
        {
            let prefix = poetry_env_name_prefix(name);
            for dir in fs::subdirectories(&cache).await {
                let matches = dir
                    .file_name()
                    .is_some_and(|n| n.to_string_lossy().to_lowercase().starts_with(&prefix));
                if matches {
                    dirs.push(dir);
                }
            }
        }
        if let Some(poetry) = &self.poetry {
            match run_tool(poetry, &["env", "list", "--full-path"], Some(&project.root)).await {
                Ok(stdout) => dirs.extend(parse_poetry_env_list(&stdout)),
                Err(e) => {
                    warn!(error = %e, root = %project.root.display(), "poetry env list failed");
                }
            }
        }
        dirs
    }

    fn build(executable: PathBuf, root: &Path) -> DiscoveredEnv {
        DiscoveredEnv::new(executable, PythonEnvKind::Poetry, PythonEnvSource::Poetry)
            .with_search_location(root)
    }
}

pub struct PoetryLocator {
    inner: Arc<Inner>,
}

impl PoetryLocator {
    pub const NAME: &'static str = "poetry";

    pub fn new(roots: Vec<PathBuf>, env: Arc<dyn EnvSource>) -> Self {
        Self::with_poetry(roots, None, env)
    }

    /// Also ask `poetry env list` for each project's environments.
    pub fn with_poetry(
        roots: Vec<PathBuf>,
        poetry: Option<PathBuf>,
        env: Arc<dyn EnvSource>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                roots,
                poetry,
                env,
                watch: LocatorWatch::new(),
            }),
        }
    }
}

impl Locator for PoetryLocator {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn iter_envs(&self, query: &PythonLocatorQuery) -> EnvIterator {
        let inner = Arc::clone(&self.inner);
        inner.watch.start_once(|| {
            let mut specs: Vec<WatchSpec> = inner
                .roots
                .iter()
                .map(|root| {
                    WatchSpec::entries(root)
                        .with_kind(PythonEnvKind::Poetry)
                        .with_search_location(root)
                })
                .collect();
            if let Some(cache) = poetry_virtualenvs_dir(inner.env.as_ref()) {
                specs.push(WatchSpec::entries(cache).with_kind(PythonEnvKind::Poetry));
            }
            specs
        });
        let roots = roots_in_scope(query, &inner.roots);
        EnvIterator::new(Box::pin(stream! {
            let mut seen = HashSet::new();
            for root in roots {
                let Some(project) = read_poetry_project(&root).await else {
                    continue;
                };
                for env_dir in inner.project_env_dirs(&project).await {
                    if !seen.insert(fs::canonical(&env_dir).await) {
                        continue;
                    }
                    if let Some(executable) = fs::find_env_interpreter(&env_dir).await {
                        yield Inner::build(executable, &root).build().await;
                    }
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
impl EnvResolver for PoetryLocator {
    async fn resolve_env(&self, env: &PythonEnvInfo) -> Option<PythonEnvInfo> {
        let executable = existing_interpreter(env).await?;
        let kind = identify_environment(&executable, self.inner.env.as_ref()).await;
        if kind != PythonEnvKind::Poetry {
            return None;
        }
        let discovered = match root_of(&executable, &self.inner.roots) {
            Some(root) => Inner::build(executable, root),
            None => DiscoveredEnv::new(executable, PythonEnvKind::Poetry, PythonEnvSource::Poetry),
        };
        Some(discovered.build().await)
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use futures_util::StreamExt;
    use pyscout_core::StaticEnv;

    fn make_venv(dir: &Path) {
        std::fs::create_dir_all(dir.join("bin")).unwrap();
        std::fs::write(dir.join("pyvenv.cfg"), "version = 3.11.6\n").unwrap();
        std::fs::write(dir.join("bin").join("python"), "").unwrap();
    }

    #[tokio::test]
    async fn test_in_project_and_cached_envs() {
        let tmp = tempfile::tempdir().unwrap();
        let project = tmp.path().join("api");
        std::fs::create_dir_all(&project).unwrap();
        std::fs::write(project.join("pyproject.toml"), "[tool.poetry]\nname = \"Api\"\n").unwrap();
        make_venv(&project.join(".venv"));
        let cache = tmp.path().join("cache");
        make_venv(&cache.join("api-AbCdEf12-py3.11"));
        make_venv(&cache.join("other-12345678-py3.11"));

        let plain = tmp.path().join("plain");
        std::fs::create_dir_all(&plain).unwrap();
        make_venv(&plain.join(".venv"));

        let env: Arc<dyn EnvSource> = Arc::new(
            StaticEnv::new().with_var("POETRY_VIRTUALENVS_PATH", cache.to_string_lossy()),
        );
        let locator = PoetryLocator::new(vec![project.clone(), plain], env);
        let envs: Vec<PythonEnvInfo> =
            locator.iter_envs(&PythonLocatorQuery::all()).envs.collect().await;
        let names: Vec<&str> = envs.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec![".venv", "api-AbCdEf12-py3.11"]);
        assert!(envs.iter().all(|e| e.kind == PythonEnvKind::Poetry));
        assert!(envs.iter().all(|e| e.search_location.as_deref() == Some(project.as_path())));

        let resolver = locator.resolver().unwrap();
        let in_project = resolver.resolve_env(&envs[0]).await.unwrap();
        assert_eq!(in_project.search_location, Some(project));
        let cached = resolver.resolve_env(&envs[1]).await.unwrap();
        assert_eq!(cached.kind, PythonEnvKind::Poetry);
        assert_eq!(cached.search_location, None);
        locator.dispose();
    }
}
