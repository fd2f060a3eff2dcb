//! Interpreters registered under the PEP 514 keys
//! `HKCU|HKLM\SOFTWARE\Python\<Company>\<Tag>`.

use std::path::PathBuf;
use std::sync::Arc;

use async_stream::stream;
use async_trait::async_trait;
use pyscout_core::utils::are_paths_same;
use pyscout_core::{
    Architecture, EnvIterator, EnvResolver, EnvSource, EventBroadcaster, Locator, PythonEnvInfo,
    PythonEnvKind, PythonEnvSource, PythonEnvsChangedEvent, PythonLocatorQuery, PythonVersion,
};
use tokio::sync::broadcast;
use tracing::warn;

use super::{accepts_non_rooted, existing_interpreter, global_kind};
use crate::env_builder::DiscoveredEnv;
use crate::fs;
use crate::identification::identify_environment;

/// The `py.exe` launcher registers itself under this company; it is not an
/// interpreter.
const PY_LAUNCHER_COMPANY: &str = "PyLauncher";
/// Company key written by Anaconda installers.
const CONDA_COMPANY: &str = "ContinuumAnalytics";

/// One `<Company>\<Tag>` registration.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RegistryInterpreter {
    pub company: String,
    pub tag: String,
    pub executable: PathBuf,
    pub install_path: Option<PathBuf>,
    pub version: Option<String>,
    /// `SysArchitecture`, e.g. `64bit`.
    pub arch: Option<String>,
    pub display_name: Option<String>,
}

/// Read access to the Python registrations.
pub trait RegistryReader: Send + Sync {
    fn interpreters(&self) -> Vec<RegistryInterpreter>;
}

/// Reader for platforms without a registry.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoRegistry;

impl RegistryReader for NoRegistry {
    fn interpreters(&self) -> Vec<RegistryInterpreter> {
        Vec::new()
    }
}

#[cfg(windows)]
pub use winreg_reader::WinRegistry;

#[cfg(windows)]
mod winreg_reader {
    use std::path::{Path, PathBuf};

    use winreg::RegKey;
    use winreg::enums::{
        HKEY_CURRENT_USER, HKEY_LOCAL_MACHINE, KEY_READ, KEY_WOW64_32KEY, KEY_WOW64_64KEY,
    };

    use super::{RegistryInterpreter, RegistryReader};

    /// Reads `HKCU` and both views of `HKLM`.
    #[derive(Debug, Default, Clone, Copy)]
    pub struct WinRegistry;

    fn read_view(hive: &RegKey, flags: u32, out: &mut Vec<RegistryInterpreter>) {
        let Ok(python) = hive.open_subkey_with_flags("SOFTWARE\\Python", KEY_READ | flags) else {
            return;
        };
        for company in python.enum_keys().filter_map(Result::ok) {
            let Ok(company_key) = python.open_subkey(&company) else {
                continue;
            };
            for tag in company_key.enum_keys().filter_map(Result::ok) {
                let Ok(tag_key) = company_key.open_subkey(&tag) else {
                    continue;
                };
                let Ok(install) = tag_key.open_subkey("InstallPath") else {
                    continue;
                };
                let install_path: Option<PathBuf> =
                    install.get_value::<String, _>("").ok().map(PathBuf::from);
                let executable = install
                    .get_value::<String, _>("ExecutablePath")
                    .ok()
                    .map(PathBuf::from)
                    .or_else(|| install_path.as_deref().map(|p: &Path| p.join("python.exe")));
                let Some(executable) = executable else {
                    continue;
                };
                let entry = RegistryInterpreter {
                    company: company.clone(),
                    tag,
                    executable,
                    install_path,
                    version: tag_key.get_value("SysVersion").ok(),
                    arch: tag_key.get_value("SysArchitecture").ok(),
                    display_name: tag_key.get_value("DisplayName").ok(),
                };
                if !out.iter().any(|e| e.executable == entry.executable) {
                    out.push(entry);
                }
            }
        }
    }

    impl RegistryReader for WinRegistry {
        fn interpreters(&self) -> Vec<RegistryInterpreter> {
            let mut found = Vec::new();
            read_view(&RegKey::predef(HKEY_CURRENT_USER), 0, &mut found);
            let machine = RegKey::predef(HKEY_LOCAL_MACHINE);
            read_view(&machine, KEY_WOW64_64KEY, &mut found);
            read_view(&machine, KEY_WOW64_32KEY, &mut found);
            found
        }
    }
}

fn parse_arch(raw: Option<&str>) -> Architecture {
    match raw.map(str::to_ascii_lowercase).as_deref() {
        Some("64bit") => Architecture::X64,
        Some("32bit") => Architecture::X86,
        _ => Architecture::Unknown,
    }
}

struct Inner {
    reader: Arc<dyn RegistryReader>,
    env: Arc<dyn EnvSource>,
    changes: EventBroadcaster<PythonEnvsChangedEvent>,
}

impl Inner {
    async fn registrations(&self) -> Vec<RegistryInterpreter> {
        let reader = Arc::clone(&self.reader);
        match tokio::task::spawn_blocking(move || reader.interpreters()).await {
            Ok(found) => found,
            Err(e) => {
                warn!(error = %e, "Registry scan failed");
                Vec::new()
            }
        }
    }

    async fn locate(&self, entry: RegistryInterpreter) -> Option<PythonEnvInfo> {
        if entry.company.eq_ignore_ascii_case(PY_LAUNCHER_COMPANY)
            || !fs::is_file(&entry.executable).await
        {
            return None;
        }
        let kind = if entry.company.eq_ignore_ascii_case(CONDA_COMPANY) {
            match identify_environment(&entry.executable, self.env.as_ref()).await {
                PythonEnvKind::CondaBase => PythonEnvKind::CondaBase,
                _ => PythonEnvKind::Conda,
            }
        } else {
            global_kind(identify_environment(&entry.executable, self.env.as_ref()).await)
        };
        let mut discovered =
            DiscoveredEnv::new(&entry.executable, kind, PythonEnvSource::WindowsRegistry)
                .with_org(&entry.company);
        if let Some(version) = entry.version.as_deref().and_then(PythonVersion::parse) {
            discovered = discovered.with_version(version);
        }
        let mut env = discovered.build().await;
        env.arch = parse_arch(entry.arch.as_deref());
        env.distro.default_display_name = entry.display_name;
        Some(env)
    }
}

/// Has no watchers; its change channel never fires.
pub struct WindowsRegistryLocator {
    inner: Arc<Inner>,
}

impl WindowsRegistryLocator {
    pub const NAME: &'static str = "windowsRegistry";

    pub fn new(reader: Arc<dyn RegistryReader>, env: Arc<dyn EnvSource>) -> Self {
        Self {
            inner: Arc::new(Inner {
                reader,
                env,
                changes: EventBroadcaster::new(),
            }),
        }
    }
}

impl Locator for WindowsRegistryLocator {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn iter_envs(&self, query: &PythonLocatorQuery) -> EnvIterator {
        if !accepts_non_rooted(query) {
            return EnvIterator::empty();
        }
        let inner = Arc::clone(&self.inner);
        EnvIterator::new(Box::pin(stream! {
            for entry in inner.registrations().await {
                if let Some(env) = inner.locate(entry).await {
                    yield env;
                }
            }
        }))
    }

    fn subscribe(&self) -> broadcast::Receiver<PythonEnvsChangedEvent> {
        self.inner.changes.subscribe()
    }

    fn resolver(&self) -> Option<&dyn EnvResolver> {
        Some(self)
    }
}

#[async_trait]
impl EnvResolver for WindowsRegistryLocator {
    async fn resolve_env(&self, env: &PythonEnvInfo) -> Option<PythonEnvInfo> {
        let executable = existing_interpreter(env).await?;
        let entry = self
            .inner
            .registrations()
            .await
            .into_iter()
            .find(|entry| are_paths_same(&entry.executable, &executable))?;
        self.inner.locate(entry).await
    }
}
