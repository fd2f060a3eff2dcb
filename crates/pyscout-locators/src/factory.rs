//! The standard locator set for a given configuration.

use std::sync::Arc;

use pyscout_core::{DiscoverySettings, EnvSource, Locator};
use tracing::debug;

use crate::composite::{DisableableLocator, Locators};
use crate::locators::{
    CondaLocator, GlobalVirtualEnvLocator, PathEnvVarLocator, PoetryLocator, PosixKnownPathsLocator,
    PyenvLocator, RegistryReader, WindowsRegistryLocator, WindowsStoreLocator,
    WorkspaceVirtualEnvLocator,
};
use crate::tool::find_tool;

fn registry_reader() -> Arc<dyn RegistryReader> {
    #[cfg(windows)]
    {
        Arc::new(crate::locators::WinRegistry)
    }
    #[cfg(not(windows))]
    {
        Arc::new(crate::locators::NoRegistry)
    }
}

/// Every low-level locator, each behind an on/off switch.
///
/// Ordered from the most specific resolver to the catch-all `$PATH`
/// resolver, since composite resolution stops at the first match.
pub fn default_locators(
    settings: &DiscoverySettings,
    env: &Arc<dyn EnvSource>,
) -> Vec<Arc<DisableableLocator>> {
    let roots = settings.workspace_roots.clone();
    let conda = settings
        .conda_path
        .clone()
        .or_else(|| env.path_var("CONDA_EXE"));
    let poetry = if roots.is_empty() {
        None
    } else {
        find_tool(settings.poetry_path.as_deref(), None, "poetry")
    };

    let locators: Vec<Arc<dyn Locator>> = vec![
        Arc::new(WindowsRegistryLocator::new(registry_reader(), Arc::clone(env))),
        Arc::new(WindowsStoreLocator::new(Arc::clone(env))),
        Arc::new(PyenvLocator::new(Arc::clone(env))),
        Arc::new(CondaLocator::with_conda(conda, Arc::clone(env))),
        Arc::new(PoetryLocator::with_poetry(roots.clone(), poetry, Arc::clone(env))),
        Arc::new(WorkspaceVirtualEnvLocator::new(roots, Arc::clone(env))),
        Arc::new(GlobalVirtualEnvLocator::new(Arc::clone(env))),
        Arc::new(PosixKnownPathsLocator::new(Arc::clone(env))),
        Arc::new(PathEnvVarLocator::new(Arc::clone(env))),
    ];

    locators
        .into_iter()
        .map(|locator| {
            let disabled = settings.is_locator_disabled(locator.name());
            let switch = DisableableLocator::new(locator);
            if disabled {
                debug!(locator = switch.name(), "Locator disabled by settings");
                Arc::new(switch.disabled())
            } else {
                Arc::new(switch)
            }
        })
        .collect()
}

/// Fan the switches into one composite.
pub fn compose(switches: &[Arc<DisableableLocator>]) -> Locators {
    Locators::new(
        switches
            .iter()
            .map(|switch| Arc::clone(switch) as Arc<dyn Locator>)
            .collect(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use pyscout_core::StaticEnv;

    #[test]
    fn test_default_order_and_disabled_names() {
        let settings = DiscoverySettings {
            disabled_locators: vec!["Conda".to_string()],
            ..DiscoverySettings::with_defaults()
        };
        let env: Arc<dyn EnvSource> = Arc::new(StaticEnv::new());
        let switches = default_locators(&settings, &env);
        let names: Vec<&str> = switches.iter().map(|s| s.name()).collect();
        assert_eq!(
            names,
            vec![
                "windowsRegistry",
                "windowsStore",
                "pyenv",
                "conda",
                "poetry",
                "workspaceVirtualEnv",
                "globalVirtualEnv",
                "posixKnownPaths",
                "path",
            ]
        );
        let enabled: Vec<bool> = switches.iter().map(|s| s.is_enabled()).collect();
        assert_eq!(enabled.iter().filter(|e| !**e).count(), 1);
        assert!(!switches[3].is_enabled());
        assert_eq!(compose(&switches).children().len(), 9);
    }
}
