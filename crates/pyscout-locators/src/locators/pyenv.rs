//! Interpreters installed by pyenv under `$PYENV_ROOT/versions`.

use std::path::Path;
use std::sync::Arc;

use async_stream::stream;
use async_trait::async_trait;
use pyscout_core::paths::pyenv_versions_dir;
use pyscout_core::utils::are_paths_same;
use pyscout_core::{
    EnvIterator, EnvResolver, EnvSource, Locator, PythonEnvInfo, PythonEnvKind, PythonEnvSource,
    PythonEnvsChangedEvent, PythonLocatorQuery,
};
use tokio::sync::broadcast;

use super::{accepts_non_rooted, existing_interpreter};
use crate::env_builder::DiscoveredEnv;
use crate::fs;
use crate::metadata::parse_pyenv_version_dir;
use crate::watcher::{LocatorWatch, WatchSpec};

struct Inner {
    env: Arc<dyn EnvSource>,
    watch: LocatorWatch,
}

impl Inner {
    async fn locate(version_dir: &Path) -> Option<PythonEnvInfo> {
        let executable = fs::find_env_interpreter(version_dir).await?;
        let dir_name = version_dir.file_name()?.to_string_lossy().into_owned();
        let parsed = parse_pyenv_version_dir(&dir_name);

        let mut discovered =
            DiscoveredEnv::new(executable, PythonEnvKind::Pyenv, PythonEnvSource::Pyenv)
                .with_name(&dir_name)
                .with_version(parsed.version);
        if let Some(org) = parsed.org {
            discovered = discovered.with_org(org);
        }
        let mut env = discovered.build().await;
        env.distro.version = parsed.distro_version;
        Some(env)
    }
}

pub struct PyenvLocator {
    inner: Arc<Inner>,
}

impl PyenvLocator {
    pub const NAME: &'static str = "pyenv";

    pub fn new(env: Arc<dyn EnvSource>) -> Self {
        Self {
            inner: Arc::new(Inner {
                env,
                watch: LocatorWatch::new(),
            }),
        }
    }
}

impl Locator for PyenvLocator {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn iter_envs(&self, query: &PythonLocatorQuery) -> EnvIterator {
        if !accepts_non_rooted(query) {
            return EnvIterator::empty();
        }
        let versions = pyenv_versions_dir(self.inner.env.as_ref());
        self.inner.watch.start_once(|| {
            versions
                .iter()
                .map(|dir| WatchSpec::entries(dir).with_kind(PythonEnvKind::Pyenv))
                .collect()
        });
        EnvIterator::new(Box::pin(stream! {
            let Some(versions) = versions else {
                return;
            };
            for version_dir in fs::subdirectories(&versions).await {
                if let Some(env) = Inner::locate(&version_dir).await {
                    yield env;
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
impl EnvResolver for PyenvLocator {
    async fn resolve_env(&self, env: &PythonEnvInfo) -> Option<PythonEnvInfo> {
        let executable = existing_interpreter(env).await?;
        let versions = pyenv_versions_dir(self.inner.env.as_ref())?;
        let version_dir = fs::env_dir_of(&executable);
        if !version_dir.parent().is_some_and(|p| are_paths_same(p, &versions)) {
            return None;
        }
        let mut located = Inner::locate(&version_dir).await?;
        if located.filename() != executable {
            located.executable.filename = executable;
        }
        Some(located)
    }
}
