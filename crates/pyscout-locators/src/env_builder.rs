//! Turn a located interpreter into a partial [`PythonEnvInfo`], filling in
//! whatever sidecar metadata is cheap to read.

use std::path::{Path, PathBuf};

use pyscout_core::{
    EnvInit, PythonEnvInfo, PythonEnvKind, PythonEnvSource, PythonVersion, build_env_info,
};

use crate::fs;
use crate::metadata;

/// A sighting of an interpreter by one locator.
#[derive(Debug, Clone)]
pub struct DiscoveredEnv {
    pub executable: PathBuf,
    pub kind: PythonEnvKind,
    pub source: PythonEnvSource,
    pub search_location: Option<PathBuf>,
    pub name: Option<String>,
    pub org: Option<String>,
    pub version: Option<PythonVersion>,
}

impl DiscoveredEnv {
    pub fn new(
        executable: impl Into<PathBuf>,
        kind: PythonEnvKind,
        source: PythonEnvSource,
    ) -> Self {
        Self {
            executable: executable.into(),
            kind,
            source,
            search_location: None,
            name: None,
            org: None,
            version: None,
        }
    }

    #[must_use]
    pub fn with_search_location(mut self, root: impl Into<PathBuf>) -> Self {
        self.search_location = Some(root.into());
        self
    }

    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    #[must_use]
    pub fn with_org(mut self, org: impl Into<String>) -> Self {
        self.org = Some(org.into());
        self
    }

    #[must_use]
    pub fn with_version(mut self, version: PythonVersion) -> Self {
        if !version.is_unknown() {
            self.version = Some(version);
        }
        self
    }

    pub async fn build(self) -> PythonEnvInfo {
        let env_dir = fs::env_dir_of(&self.executable);
        let has_env_dir = self.kind.is_virtual()
            || matches!(self.kind, PythonEnvKind::CondaBase | PythonEnvKind::Pyenv);

        let version = match self.version {
            Some(version) => Some(version),
            None => sidecar_version(&self.executable, &env_dir, self.kind).await,
        };
        let name = self.name.or_else(|| {
            (self.kind.is_virtual() || self.kind == PythonEnvKind::Pyenv)
                .then(|| dir_name(&env_dir))
                .flatten()
        });

        let mut init = EnvInit::executable(&self.executable)
            .with_kind(self.kind)
            .with_source(self.source);
        if has_env_dir {
            init = init.with_location(&env_dir);
        }
        if let Some(root) = self.search_location {
            init = init.with_search_location(root);
        }
        if let Some(version) = version {
            init = init.with_version(version);
        }
        if let Some(name) = name {
            init = init.with_name(name);
        }
        if let Some(org) = self.org {
            init = init.with_org(org);
        }

        let mut env = build_env_info(init);
        let (ctime, mtime) = fs::file_times(&self.executable).await;
        env.executable.ctime = ctime;
        env.executable.mtime = mtime;
        env
    }
}

fn dir_name(dir: &Path) -> Option<String> {
    dir.file_name().and_then(|n| n.to_str()).map(str::to_string)
}

/// Version readable without running the interpreter, most reliable first.
async fn sidecar_version(
    executable: &Path,
    env_dir: &Path,
    kind: PythonEnvKind,
) -> Option<PythonVersion> {
    if matches!(kind, PythonEnvKind::Conda | PythonEnvKind::CondaBase) {
        if let Some(version) = metadata::conda_python_version(env_dir).await {
            return Some(version);
        }
    }
    if let Some(version) = metadata::read_pyvenv_cfg(executable)
        .await
        .and_then(|cfg| cfg.version)
    {
        return Some(version);
    }
    let file_name = executable.file_name()?.to_str()?;
    if let Some(version) = metadata::windows_store_launcher_version(file_name) {
        return Some(version);
    }
    version_from_executable_name(file_name)
}

/// `python3.11` → 3.11, `python3` → 3.
fn version_from_executable_name(name: &str) -> Option<PythonVersion> {
    let lower = name.to_ascii_lowercase();
    let stem = lower.strip_suffix(".exe").unwrap_or(&lower);
    PythonVersion::parse(stem.strip_prefix("python")?)
}
