//! An on/off gate around a single locator.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use pyscout_core::{
    EnvIterator, EnvResolver, IteratorUpdate, IteratorUpdates, Locator, PythonEnvInfo,
    PythonEnvsChangedEvent, PythonLocatorQuery,
};
use tokio::sync::{broadcast, mpsc};
use tracing::debug;

use super::relay::ChangeRelay;

/// While disabled the wrapped locator is invisible: scans yield nothing,
/// resolution declines and change events are dropped. Events suppressed
/// while disabled are not replayed on re-enable.
pub struct DisableableLocator {
    locator: Arc<dyn Locator>,
    enabled: Arc<AtomicBool>,
    relay: ChangeRelay,
}

impl DisableableLocator {
    pub fn new(locator: Arc<dyn Locator>) -> Self {
        let enabled = Arc::new(AtomicBool::new(true));
        Self {
            locator,
            relay: ChangeRelay::gated(Arc::clone(&enabled)),
            enabled,
        }
    }

    #[must_use]
    pub fn disabled(self) -> Self {
        self.disable();
        self
    }

    pub fn enable(&self) {
        self.enabled.store(true, Ordering::Release);
        debug!(locator = self.locator.name(), "Locator enabled");
    }

    pub fn disable(&self) {
        self.enabled.store(false, Ordering::Release);
        debug!(locator = self.locator.name(), "Locator disabled");
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Acquire)
    }
}

impl Locator for DisableableLocator {
    fn name(&self) -> &str {
        self.locator.name()
    }

    fn iter_envs(&self, query: &PythonLocatorQuery) -> EnvIterator {
        if self.is_enabled() {
            return self.locator.iter_envs(query);
        }
        let (tx, rx) = mpsc::unbounded_channel();
        let _ = tx.send(IteratorUpdate::Complete);
        EnvIterator::empty().with_updates(IteratorUpdates::new(rx))
    }

    fn subscribe(&self) -> broadcast::Receiver<PythonEnvsChangedEvent> {
        self.relay.subscribe(|| vec![self.locator.subscribe()])
    }

    fn resolver(&self) -> Option<&dyn EnvResolver> {
        Some(self)
    }

    fn dispose(&self) {
        self.relay.dispose();
        self.locator.dispose();
    }
}

#[async_trait]
impl EnvResolver for DisableableLocator {
    async fn resolve_env(&self, env: &PythonEnvInfo) -> Option<PythonEnvInfo> {
        if !self.is_enabled() {
            return None;
        }
        self.locator.resolver()?.resolve_env(env).await
    }
}
