//! Conda base installs and their named environments.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_stream::stream;
use async_trait::async_trait;
use pyscout_core::paths::{conda_environments_file, conda_known_roots};
use pyscout_core::{
    EnvIterator, EnvResolver, EnvSource, Locator, PythonEnvInfo, PythonEnvKind, PythonEnvSource,
    PythonEnvsChangedEvent, PythonLocatorQuery,
};
use tokio::sync::broadcast;
use tracing::{debug, warn};

use super::{accepts_non_rooted, existing_interpreter};
use crate::env_builder::DiscoveredEnv;
use crate::fs;
use crate::identification::{identify_environment, is_conda_base};
use crate::metadata;
use crate::tool::{CondaInfo, run_tool};
use crate::watcher::{LocatorWatch, WatchSpec};

pub const CONDA_ORG: &str = "Anaconda";

struct Inner {
    /// `conda` binary to query with `conda info --json`. Only consulted
    /// when explicitly provided.
    conda: Option<PathBuf>,
    env: Arc<dyn EnvSource>,
    watch: LocatorWatch,
}

impl Inner {
    /// Candidate prefixes from conda's own registry of environments.
    async fn registered_prefixes(&self) -> Vec<PathBuf> {
        let Some(file) = conda_environments_file(self.env.as_ref()) else {
            return Vec::new();
        };
        fs::read_to_string(&file)
            .await
            .map(|text| {
                text.lines()
                    .map(str::trim)
                    .filter(|line| !line.is_empty() && !line.starts_with('#'))
                    .map(PathBuf::from)
                    .collect()
            })
            .unwrap_or_default()
    }

    async fn cli_prefixes(&self) -> Vec<PathBuf> {
        let Some(conda) = &self.conda else {
            return Vec::new();
        };
        let info = match run_tool(conda, &["info", "--json"], None).await {
            Ok(stdout) => CondaInfo::parse(&stdout),
            Err(e) => Err(e),
        };
        match info {
            Ok(info) => info.prefixes(),
            Err(e) => {
                warn!(error = %e, "conda info failed; using filesystem discovery only");
                Vec::new()
            }
        }
    }

    async fn candidate_prefixes(&self) -> Vec<PathBuf> {
        let mut candidates = self.registered_prefixes().await;
        for root in conda_known_roots(self.env.as_ref()) {
            candidates.push(root.clone());
            candidates.extend(fs::subdirectories(&root.join("envs")).await);
        }
        if let Some(active) = self.env.path_var("CONDA_PREFIX") {
            candidates.push(active);
        }
        candidates.extend(self.cli_prefixes().await);
        candidates
    }

    async fn locate_prefix(&self, prefix: &Path) -> Option<PythonEnvInfo> {
        if !metadata::is_conda_prefix(prefix).await {
            return None;
        }
        let executable = fs::find_env_interpreter(prefix).await?;
        let base = is_conda_base(prefix).await;
        Some(self.build(executable, prefix, base).await)
    }

    async fn build(&self, executable: PathBuf, prefix: &Path, base: bool) -> PythonEnvInfo {
        let (kind, name) = if base {
            (PythonEnvKind::CondaBase, "base".to_string())
        } else {
            let name = prefix
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            (PythonEnvKind::Conda, name)
        };
        DiscoveredEnv::new(executable, kind, PythonEnvSource::Conda)
            .with_name(name)
            .with_org(CONDA_ORG)
            .build()
            .await
    }

    fn watch_specs(&self) -> Vec<WatchSpec> {
        let mut specs = Vec::new();
        if let Some(parent) = conda_environments_file(self.env.as_ref())
            .and_then(|f| f.parent().map(Path::to_path_buf))
        {
            specs.push(WatchSpec::entries(parent).with_kind(PythonEnvKind::Conda));
        }
        for root in conda_known_roots(self.env.as_ref()) {
            specs.push(WatchSpec::entries(root.join("envs")).with_kind(PythonEnvKind::Conda));
        }
        specs
    }
}

pub struct CondaLocator {
    inner: Arc<Inner>,
}

impl CondaLocator {
    pub const NAME: &'static str = "conda";

    pub fn new(env: Arc<dyn EnvSource>) -> Self {
        Self::with_conda(None, env)
    }

    /// Also ask `conda` for its environments.
    pub fn with_conda(conda: Option<PathBuf>, env: Arc<dyn EnvSource>) -> Self {
        Self {
            inner: Arc::new(Inner {
                conda,
                env,
                watch: LocatorWatch::new(),
            }),
        }
    }
}

impl Locator for CondaLocator {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn iter_envs(&self, query: &PythonLocatorQuery) -> EnvIterator {
        if !accepts_non_rooted(query) {
            return EnvIterator::empty();
        }
        let inner = Arc::clone(&self.inner);
        inner.watch.start_once(|| inner.watch_specs());
        EnvIterator::new(Box::pin(stream! {
            let mut seen = HashSet::new();
            for prefix in inner.candidate_prefixes().await {
                if !seen.insert(fs::canonical(&prefix).await) {
                    continue;
                }
                match inner.locate_prefix(&prefix).await {
                    Some(env) => yield env,
                    None => debug!(prefix = %prefix.display(), "Not a conda environment"),
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
impl EnvResolver for CondaLocator {
    async fn resolve_env(&self, env: &PythonEnvInfo) -> Option<PythonEnvInfo> {
        let executable = existing_interpreter(env).await?;
        let kind = identify_environment(&executable, self.inner.env.as_ref()).await;
        if !matches!(kind, PythonEnvKind::Conda | PythonEnvKind::CondaBase) {
            return None;
        }
        let prefix = fs::env_dir_of(&executable);
        Some(
            self.inner
                .build(executable, &prefix, kind == PythonEnvKind::CondaBase)
                .await,
        )
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use futures_util::StreamExt;
    use pyscout_core::{PythonVersion, StaticEnv};

    fn make_prefix(prefix: &Path, version: &str) {
        std::fs::create_dir_all(prefix.join("conda-meta")).unwrap();
        std::fs::write(
            prefix.join("conda-meta").join(format!("python-{version}-h1234_0.json")),
            "{}",
        )
        .unwrap();
        std::fs::create_dir_all(prefix.join("bin")).unwrap();
        std::fs::write(prefix.join("bin").join("python"), "").unwrap();
    }

    #[tokio::test]
    async fn test_known_root_and_registered_envs() {
        let home = tempfile::tempdir().unwrap();
        let base = home.path().join("miniconda3");
        make_prefix(&base, "3.11.5");
        std::fs::create_dir_all(base.join("condabin")).unwrap();
        make_prefix(&base.join("envs").join("ml"), "3.10.13");
        let elsewhere = home.path().join("projects").join("conda-env");
        make_prefix(&elsewhere, "3.8.18");
        std::fs::create_dir_all(home.path().join(".conda")).unwrap();
        std::fs::write(
            home.path().join(".conda").join("environments.txt"),
            format!("{}\n{}\n", elsewhere.display(), base.display()),
        )
        .unwrap();

        let locator = CondaLocator::new(Arc::new(StaticEnv::new().with_home(home.path())));
        let envs: Vec<PythonEnvInfo> =
            locator.iter_envs(&PythonLocatorQuery::all()).envs.collect().await;
        // Machine-wide roots such as /opt/miniconda3 may add more prefixes.
        let envs: Vec<PythonEnvInfo> = envs
            .into_iter()
            .filter(|e| e.filename().starts_with(home.path()))
            .collect();
        let summary: Vec<(PythonEnvKind, String, PythonVersion)> = envs
            .iter()
            .map(|e| (e.kind, e.name.clone(), e.version.clone()))
            .collect();
        assert_eq!(
            summary,
            vec![
                (PythonEnvKind::Conda, "conda-env".to_string(), PythonVersion::new(3, 8, 18)),
                (PythonEnvKind::CondaBase, "base".to_string(), PythonVersion::new(3, 11, 5)),
                (PythonEnvKind::Conda, "ml".to_string(), PythonVersion::new(3, 10, 13)),
            ]
        );
        assert!(envs.iter().all(|e| e.distro.org == CONDA_ORG));
        locator.dispose();
    }

    #[tokio::test]
    async fn test_resolver_rejects_non_conda() {
        let home = tempfile::tempdir().unwrap();
        let venv = home.path().join("venv");
        std::fs::create_dir_all(venv.join("bin")).unwrap();
        std::fs::write(venv.join("bin").join("python"), "").unwrap();
        let locator = CondaLocator::new(Arc::new(StaticEnv::new()));
        let python = venv.join("bin").join("python");
        let partial = pyscout_core::get_minimal_partial_info(python.as_path()).unwrap();
        assert!(locator.resolver().unwrap().resolve_env(&partial).await.is_none());
    }
}
