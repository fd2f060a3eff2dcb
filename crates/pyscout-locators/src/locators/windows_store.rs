//! Microsoft Store Python launchers in
//! `%LOCALAPPDATA%\Microsoft\WindowsApps`.

use std::path::PathBuf;
use std::sync::Arc;

use async_stream::stream;
use async_trait::async_trait;
use pyscout_core::paths::windows_apps_dir;
use pyscout_core::{
    EnvIterator, EnvResolver, EnvSource, Locator, PythonEnvInfo, PythonEnvKind, PythonEnvSource,
    PythonEnvsChangedEvent, PythonLocatorQuery,
};
use tokio::sync::broadcast;

use super::{accepts_non_rooted, existing_interpreter};
use crate::env_builder::DiscoveredEnv;
use crate::fs;
use crate::identification::is_windows_store_interpreter;
use crate::metadata::windows_store_launcher_version;
use crate::watcher::{LocatorWatch, WatchSpec};

struct Inner {
    env: Arc<dyn EnvSource>,
    watch: LocatorWatch,
}

impl Inner {
    fn apps_dir(&self) -> Option<PathBuf> {
        if cfg!(windows) {
            windows_apps_dir(self.env.as_ref())
        } else {
            None
        }
    }

    /// Only the versioned `python3.X.exe` launchers are reported; the bare
    /// `python.exe` alias may point at the Store installer instead.
    async fn locate(executable: PathBuf) -> Option<PythonEnvInfo> {
        let version = windows_store_launcher_version(executable.file_name()?.to_str()?)?;
        Some(
            DiscoveredEnv::new(
                executable,
                PythonEnvKind::WindowsStore,
                PythonEnvSource::WindowsStore,
            )
            .with_version(version)
            .build()
            .await,
        )
    }
}

pub struct WindowsStoreLocator {
    inner: Arc<Inner>,
}

impl WindowsStoreLocator {
    pub const NAME: &'static str = "windowsStore";

    pub fn new(env: Arc<dyn EnvSource>) -> Self {
        Self {
            inner: Arc::new(Inner {
                env,
                watch: LocatorWatch::new(),
            }),
        }
    }
}

impl Locator for WindowsStoreLocator {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn iter_envs(&self, query: &PythonLocatorQuery) -> EnvIterator {
        if !accepts_non_rooted(query) {
            return EnvIterator::empty();
        }
        let Some(apps_dir) = self.inner.apps_dir() else {
            return EnvIterator::empty();
        };
        self.inner.watch.start_once(|| {
            vec![WatchSpec::executables(&apps_dir).with_kind(PythonEnvKind::WindowsStore)]
        });
        EnvIterator::new(Box::pin(stream! {
            for entry in fs::read_dir_entries(&apps_dir).await {
                if !fs::is_file(&entry).await {
                    continue;
                }
                if let Some(env) = Inner::locate(entry).await {
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
impl EnvResolver for WindowsStoreLocator {
    async fn resolve_env(&self, env: &PythonEnvInfo) -> Option<PythonEnvInfo> {
        let executable = existing_interpreter(env).await?;
        if !is_windows_store_interpreter(&executable, self.inner.env.as_ref()) {
            return None;
        }
        Inner::locate(executable).await
    }
}
