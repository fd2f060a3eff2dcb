//! The locator port: lazy environment discovery with change notification.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use futures_util::stream::BoxStream;
use tokio::sync::{broadcast, mpsc};
use tokio_util::sync::DropGuard;

use crate::domain::{PythonEnvInfo, PythonLocatorQuery};
use crate::events::{IteratorUpdate, PythonEnvsChangedEvent};

/// Lazily produced environments. Every item has a non-empty executable
/// filename.
pub type EnvStream = BoxStream<'static, PythonEnvInfo>;

/// Caller-defined judgement of whether a record is complete enough to be
/// cached as complete and persisted.
pub type CompletenessCheck = Arc<dyn Fn(&PythonEnvInfo) -> bool + Send + Sync>;

/// Complete means the version is known down to the minor component and the
/// interpreter's `sys.prefix` has been recorded.
pub fn default_completeness_check() -> CompletenessCheck {
    Arc::new(|env: &PythonEnvInfo| {
        env.version.major >= 0
            && env.version.minor >= 0
            && !env.executable.sys_prefix.as_os_str().is_empty()
    })
}

/// Receiving side of an iterator's background-refinement channel.
///
/// Holds the cancellation guard of whatever task set produces the updates;
/// dropping the receiver stops that work.
pub struct IteratorUpdates {
    rx: mpsc::UnboundedReceiver<IteratorUpdate>,
    _guard: Option<DropGuard>,
}

impl IteratorUpdates {
    pub const fn new(rx: mpsc::UnboundedReceiver<IteratorUpdate>) -> Self {
        Self { rx, _guard: None }
    }

    /// Tie background work to the lifetime of this receiver.
    #[must_use]
    pub fn with_guard(mut self, guard: DropGuard) -> Self {
        self._guard = Some(guard);
        self
    }

    /// Next update. `None` means the producer went away without sending
    /// [`IteratorUpdate::Complete`].
    pub async fn recv(&mut self) -> Option<IteratorUpdate> {
        self.rx.recv().await
    }
}

impl fmt::Debug for IteratorUpdates {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IteratorUpdates").finish_non_exhaustive()
    }
}

/// Result of [`Locator::iter_envs`].
pub struct EnvIterator {
    pub envs: EnvStream,
    /// Present when the producer refines yielded environments in the
    /// background. The channel ends with exactly one
    /// [`IteratorUpdate::Complete`].
    pub updates: Option<IteratorUpdates>,
}

impl EnvIterator {
    pub const fn new(envs: EnvStream) -> Self {
        Self {
            envs,
            updates: None,
        }
    }

    #[must_use]
    pub fn with_updates(mut self, updates: IteratorUpdates) -> Self {
        self.updates = Some(updates);
        self
    }

    pub fn empty() -> Self {
        Self::new(Box::pin(futures_util::stream::empty()))
    }
}

impl fmt::Debug for EnvIterator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EnvIterator")
            .field("updates", &self.updates.is_some())
            .finish_non_exhaustive()
    }
}

/// Optional capability: resolve a single environment.
#[async_trait]
pub trait EnvResolver: Send + Sync {
    /// Resolve `env` (often only an executable path) into a fuller record.
    ///
    /// Returns `None` when the path is not a valid environment of the kind
    /// this resolver handles, or when resolution failed.
    async fn resolve_env(&self, env: &PythonEnvInfo) -> Option<PythonEnvInfo>;
}

/// A discovery source.
pub trait Locator: Send + Sync {
    /// Stable identifier, used for enabling and disabling locators.
    fn name(&self) -> &str;

    /// Start a fresh scan. Repeated calls issue independent scans.
    fn iter_envs(&self, query: &PythonLocatorQuery) -> EnvIterator;

    /// Subscribe to change notifications for the locations this locator
    /// watches.
    fn subscribe(&self) -> broadcast::Receiver<PythonEnvsChangedEvent>;

    /// Single-environment resolution, when supported.
    fn resolver(&self) -> Option<&dyn EnvResolver> {
        None
    }

    /// Stop every watcher this locator owns. No events are emitted
    /// afterwards.
    fn dispose(&self) {}
}
