//! Locator decorator that probes interpreters in the background.
//!
//! Environments from the wrapped locator are yielded as soon as they
//! arrive. Each one the execution policy allows is probed on a tracked
//! task; a successful probe is published on the iterator's update channel
//! keyed by yield index. The channel ends with exactly one
//! [`IteratorUpdate::Complete`] after the wrapped locator's own updates and
//! every probe task have finished.

use std::sync::Arc;

use async_stream::stream;
use async_trait::async_trait;
use futures_util::StreamExt;
use pyscout_core::{
    EnvInit, EnvIterator, EnvResolver, ExecutionPolicy, InterpreterInformation, IteratorUpdate,
    IteratorUpdates, Locator, PythonEnvInfo, PythonEnvSource, PythonEnvUpdatedEvent,
    PythonEnvsChangedEvent, PythonExecutableInfo, PythonLocatorQuery, build_env_info,
    get_minimal_partial_info, merge_environments,
};
use tokio::runtime::Handle;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, warn};

use crate::info_service::EnvironmentInfoService;

type UpdateSender = mpsc::UnboundedSender<IteratorUpdate>;

pub struct ResolvingLocator {
    parent: Arc<dyn Locator>,
    policy: Arc<dyn ExecutionPolicy>,
    info: Arc<EnvironmentInfoService>,
}

impl ResolvingLocator {
    pub const NAME: &'static str = "resolving";

    pub fn new(
        parent: Arc<dyn Locator>,
        policy: Arc<dyn ExecutionPolicy>,
        info: Arc<EnvironmentInfoService>,
    ) -> Self {
        Self {
            parent,
            policy,
            info,
        }
    }

    /// Identify `env` through the wrapped locator, falling back to the
    /// bare path.
    async fn identify(&self, env: &PythonEnvInfo) -> Option<PythonEnvInfo> {
        if let Some(resolver) = self.parent.resolver() {
            if let Some(identified) = resolver.resolve_env(env).await {
                return Some(identified);
            }
        }
        get_minimal_partial_info(env)
    }
}

/// What the interpreter reported about itself, keyed to `env`'s executable.
fn interpreter_record(env: &PythonEnvInfo, info: InterpreterInformation) -> PythonEnvInfo {
    let mut reported = build_env_info(EnvInit::executable(env.filename()).with_kind(env.kind));
    reported.executable = PythonExecutableInfo {
        sys_prefix: info.sys_prefix,
        ..env.executable.clone()
    };
    reported.version = info.version;
    reported.arch = info.arch;
    reported.add_source(PythonEnvSource::Resolved);
    reported
}

/// Merge what the interpreter reported into `env`. The interpreter's own
/// answers win; `env` fills in everything else.
fn apply_interpreter_info(env: &PythonEnvInfo, info: InterpreterInformation) -> PythonEnvInfo {
    merge_environments(&interpreter_record(env, info), env)
}

struct Background {
    policy: Arc<dyn ExecutionPolicy>,
    info: Arc<EnvironmentInfoService>,
    tracker: TaskTracker,
    runtime: Handle,
    tx: UpdateSender,
    cancel: CancellationToken,
}

impl Background {
    /// Probe `env` on a tracked task unless the policy rejects it.
    fn schedule(&self, index: usize, env: PythonEnvInfo) {
        if !self.policy.is_safe_to_execute(&env) {
            debug!(path = %env.filename().display(), "Not probing untrusted interpreter");
            return;
        }
        let info = Arc::clone(&self.info);
        let tx = self.tx.clone();
        let cancel = self.cancel.clone();
        self.tracker.spawn_on(
            async move {
                let probed = tokio::select! {
                    () = cancel.cancelled() => return,
                    probed = info.get_info(&env.executable) => probed,
                };
                if let Some(probed) = probed {
                    let update = apply_interpreter_info(&env, probed);
                    let _ = tx.send(IteratorUpdate::Updated(PythonEnvUpdatedEvent {
                        index,
                        old: Some(env),
                        update: Some(update),
                    }));
                }
            },
            &self.runtime,
        );
    }
}

/// Forward the wrapped locator's updates, then wait for iteration and every
/// probe before sending the terminal `Complete`.
async fn coordinate(
    background: Arc<Background>,
    parent_updates: Option<IteratorUpdates>,
    iteration_done: oneshot::Receiver<()>,
) {
    if let Some(mut updates) = parent_updates {
        loop {
            let update = tokio::select! {
                () = background.cancel.cancelled() => return,
                update = updates.recv() => update,
            };
            match update {
                Some(IteratorUpdate::Updated(event)) => {
                    if let Some(env) = event.update.clone() {
                        background.schedule(event.index, env);
                    }
                    let _ = background.tx.send(IteratorUpdate::Updated(event));
                }
                Some(IteratorUpdate::Complete) | None => break,
            }
        }
    }

    tokio::select! {
        () = background.cancel.cancelled() => return,
        _ = iteration_done => {}
    }
    background.tracker.close();
    tokio::select! {
        () = background.cancel.cancelled() => return,
        () = background.tracker.wait() => {}
    }
    let _ = background.tx.send(IteratorUpdate::Complete);
}

impl Locator for ResolvingLocator {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn iter_envs(&self, query: &PythonLocatorQuery) -> EnvIterator {
        let parent = self.parent.iter_envs(query);
        let Ok(handle) = Handle::try_current() else {
            warn!("No async runtime; environments are yielded unresolved");
            return parent;
        };

        let (tx, rx) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();
        let guard = cancel.clone().drop_guard();
        let background = Arc::new(Background {
            policy: Arc::clone(&self.policy),
            info: Arc::clone(&self.info),
            tracker: TaskTracker::new(),
            runtime: handle.clone(),
            tx,
            cancel,
        });

        let (done_tx, done_rx) = oneshot::channel();
        handle.spawn(coordinate(Arc::clone(&background), parent.updates, done_rx));

        let mut envs = parent.envs;
        let resolving = stream! {
            let mut index = 0;
            while let Some(env) = envs.next().await {
                background.schedule(index, env.clone());
                index += 1;
                yield env;
            }
            let _ = done_tx.send(());
        };

        EnvIterator::new(Box::pin(resolving))
            .with_updates(IteratorUpdates::new(rx).with_guard(guard))
    }

    fn subscribe(&self) -> broadcast::Receiver<PythonEnvsChangedEvent> {
        self.parent.subscribe()
    }

    fn resolver(&self) -> Option<&dyn EnvResolver> {
        Some(self)
    }

    fn dispose(&self) {
        self.parent.dispose();
        self.info.dispose();
    }
}

#[async_trait]
impl EnvResolver for ResolvingLocator {
    /// An environment the policy rejects comes back identified but
    /// unresolved. `None` means identification or the probe failed.
    async fn resolve_env(&self, env: &PythonEnvInfo) -> Option<PythonEnvInfo> {
        let identified = self.identify(env).await?;
        if !self.policy.is_safe_to_execute(&identified) {
            debug!(
                path = %identified.filename().display(),
                "Returning untrusted interpreter unresolved"
            );
            return Some(identified);
        }
        let probed = self.info.get_info(&identified.executable).await?;
        Some(apply_interpreter_info(&identified, probed))
    }
}
