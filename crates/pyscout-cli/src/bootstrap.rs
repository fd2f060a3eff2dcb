//! CLI bootstrap - the composition root.
//!
//! The only place concrete implementations are instantiated:
//! - Low-level locators and their composite (via pyscout-locators)
//! - Interpreter probing and background resolution (via pyscout-runtime)
//! - The persisted cache, or an in-memory one for ephemeral runs (via
//!   pyscout-store)
//! - The collection service (via pyscout-core)

use std::path::{Path, PathBuf};
use std::sync::Arc;

use pyscout_core::paths::default_store_path;
use pyscout_core::{
    AllowAll, DenyAll, DiscoverySettings, EnvSource, EnvsCollectionService, EnvsStore,
    ExecutionPolicy, InterpreterProbe, ProcessEnv, default_completeness_check, validate_settings,
};
use pyscout_locators::{DisableableLocator, compose, default_locators};
use pyscout_runtime::{EnvironmentInfoService, ProcessInterpreterProbe, ResolvingLocator};
use pyscout_store::{InMemoryStore, JsonFileStore};
use tracing::debug;

use crate::error::CliError;

/// Fully composed discovery stack for CLI commands.
pub struct CliContext {
    pub settings: DiscoverySettings,
    /// One switch per low-level locator, in composition order.
    pub switches: Vec<Arc<DisableableLocator>>,
    pub service: EnvsCollectionService,
    /// `None` for an ephemeral run that persists nothing.
    pub store_path: Option<PathBuf>,
}

impl CliContext {
    pub const fn service(&self) -> &EnvsCollectionService {
        &self.service
    }
}

/// Build settings from defaults, an optional JSON file and CLI overrides.
pub fn load_settings(
    config: Option<&Path>,
    roots: Vec<PathBuf>,
    store: Option<PathBuf>,
) -> Result<DiscoverySettings, CliError> {
    let mut settings = DiscoverySettings::with_defaults();
    if let Some(path) = config {
        let text = std::fs::read_to_string(path)
            .map_err(|e| CliError::Config(format!("{}: {e}", path.display())))?;
        let from_file: DiscoverySettings = serde_json::from_str(&text)
            .map_err(|e| CliError::Config(format!("{}: {e}", path.display())))?;
        settings.merge(from_file);
    }
    settings.merge(DiscoverySettings {
        workspace_roots: roots,
        store_path: store,
        ..DiscoverySettings::default()
    });
    validate_settings(&settings)?;
    Ok(settings)
}

fn execution_policy(settings: &DiscoverySettings) -> Arc<dyn ExecutionPolicy> {
    if settings.trusts_all_interpreters() {
        Arc::new(AllowAll)
    } else {
        Arc::new(DenyAll)
    }
}

/// Wire the discovery stack and load the persisted cache. With
/// `ephemeral` the cache lives in memory only.
pub async fn bootstrap(
    settings: DiscoverySettings,
    ephemeral: bool,
) -> Result<CliContext, CliError> {
    let env: Arc<dyn EnvSource> = Arc::new(ProcessEnv);
    let (store, store_path): (Arc<dyn EnvsStore>, _) = if ephemeral {
        debug!("Bootstrapping discovery without a persisted cache");
        (Arc::new(InMemoryStore::new()), None)
    } else {
        let path = match &settings.store_path {
            Some(path) => path.clone(),
            None => default_store_path(env.as_ref())?,
        };
        debug!(store = %path.display(), "Bootstrapping discovery");
        (Arc::new(JsonFileStore::new(&path)), Some(path))
    };

    let switches = default_locators(&settings, &env);
    let composite = Arc::new(compose(&switches));

    let probe: Arc<dyn InterpreterProbe> =
        Arc::new(ProcessInterpreterProbe::new().with_timeout(settings.probe_timeout()));
    let info = Arc::new(EnvironmentInfoService::new(
        probe,
        settings.effective_max_concurrent_probes(),
    ));
    let resolving = Arc::new(ResolvingLocator::new(
        composite,
        execution_policy(&settings),
        info,
    ));

    let service = EnvsCollectionService::new(resolving, store, default_completeness_check());
    service.initialize().await;

    Ok(CliContext {
        settings,
        switches,
        service,
        store_path,
    })
}
