//! Virtual environments kept in shared per-user directories
//! (`$WORKON_HOME`, `~/.virtualenvs`, pipenv's store, ...).

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;

use async_stream::stream;
use async_trait::async_trait;
use pyscout_core::paths::global_virtualenv_dirs;
use pyscout_core::utils::are_paths_same;
use pyscout_core::{
    EnvIterator, EnvResolver, EnvSource, Locator, PythonEnvInfo, PythonEnvKind, PythonEnvSource,
    PythonEnvsChangedEvent, PythonLocatorQuery,
};
use tokio::sync::broadcast;

use super::{accepts_non_rooted, existing_interpreter};
use crate::env_builder::DiscoveredEnv;
use crate::fs;
use crate::identification::{identify_environment, is_virtual_layout};
use crate::watcher::{LocatorWatch, WatchSpec};

struct Inner {
    env: Arc<dyn EnvSource>,
    watch: LocatorWatch,
}

impl Inner {
    fn dirs(&self) -> Vec<PathBuf> {
        global_virtualenv_dirs(self.env.as_ref())
    }

    async fn locate(&self, executable: PathBuf) -> Option<PythonEnvInfo> {
        if !is_virtual_layout(&executable).await {
            return None;
        }
        let kind = identify_environment(&executable, self.env.as_ref()).await;
        if !kind.is_virtual() || kind == PythonEnvKind::Conda {
            return None;
        }
        Some(
            DiscoveredEnv::new(executable, kind, PythonEnvSource::GlobalVirtualEnv)
                .build()
                .await,
        )
    }
}

pub struct GlobalVirtualEnvLocator {
    inner: Arc<Inner>,
}

impl GlobalVirtualEnvLocator {
    pub const NAME: &'static str = "globalVirtualEnv";

    pub fn new(env: Arc<dyn EnvSource>) -> Self {
        Self {
            inner: Arc::new(Inner {
                env,
                watch: LocatorWatch::new(),
            }),
        }
    }
}

impl Locator for GlobalVirtualEnvLocator {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn iter_envs(&self, query: &PythonLocatorQuery) -> EnvIterator {
        if !accepts_non_rooted(query) {
            return EnvIterator::empty();
        }
        let inner = Arc::clone(&self.inner);
        inner
            .watch
            .start_once(|| inner.dirs().into_iter().map(WatchSpec::entries).collect());
        EnvIterator::new(Box::pin(stream! {
            let mut seen = HashSet::new();
            for dir in inner.dirs() {
                for env_dir in fs::subdirectories(&dir).await {
                    if !seen.insert(fs::canonical(&env_dir).await) {
                        continue;
                    }
                    let Some(executable) = fs::find_env_interpreter(&env_dir).await else {
                        continue;
                    };
                    if let Some(env) = inner.locate(executable).await {
                        yield env;
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
impl EnvResolver for GlobalVirtualEnvLocator {
    async fn resolve_env(&self, env: &PythonEnvInfo) -> Option<PythonEnvInfo> {
        let executable = existing_interpreter(env).await?;
        let env_dir = fs::env_dir_of(&executable);
        let under_known_dir = self
            .inner
            .dirs()
            .iter()
            .any(|dir| env_dir.parent().is_some_and(|parent| are_paths_same(parent, dir)));
        if !under_known_dir {
            return None;
        }
        self.inner.locate(executable).await
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use futures_util::StreamExt;
    use pyscout_core::StaticEnv;

    #[tokio::test]
    async fn test_workon_home_envs_are_wrapper_kind() {
        let home = tempfile::tempdir().unwrap();
        let workon = home.path().join("workon");
        let env_dir = workon.join("tools");
        std::fs::create_dir_all(env_dir.join("bin")).unwrap();
        std::fs::write(env_dir.join("pyvenv.cfg"), "version = 3.9.18\n").unwrap();
        std::fs::write(env_dir.join("bin").join("python"), "").unwrap();
        // Not an environment: no interpreter.
        std::fs::create_dir_all(workon.join("empty")).unwrap();

        let env: Arc<dyn EnvSource> = Arc::new(
            StaticEnv::new()
                .with_home(home.path())
                .with_var("WORKON_HOME", workon.to_string_lossy()),
        );
        let locator = GlobalVirtualEnvLocator::new(env);
        let envs: Vec<PythonEnvInfo> =
            locator.iter_envs(&PythonLocatorQuery::all()).envs.collect().await;
        assert_eq!(envs.len(), 1);
        assert_eq!(envs[0].kind, PythonEnvKind::VirtualEnvWrapper);
        assert_eq!(envs[0].name, "tools");
        assert_eq!(envs[0].search_location, None);

        let resolved = locator
            .resolver()
            .unwrap()
            .resolve_env(&envs[0])
            .await
            .unwrap();
        assert_eq!(resolved.filename(), envs[0].filename());
    }
}
