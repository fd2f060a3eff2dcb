//! Fan-in over child locators.
//!
//! Environments are yielded as soon as any child produces them. Each
//! child's background updates are re-keyed into the composite's own index
//! space, and the composite's update channel ends with a single
//! [`IteratorUpdate::Complete`] once every child finished both iterating
//! and updating.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use async_stream::stream;
use async_trait::async_trait;
use futures_util::stream::{self as futures_stream, BoxStream, SelectAll};
use futures_util::StreamExt;
use pyscout_core::{
    EnvIterator, EnvResolver, IteratorUpdate, IteratorUpdates, Locator, PythonEnvInfo,
    PythonEnvUpdatedEvent, PythonEnvsChangedEvent, PythonLocatorQuery,
};
use tokio::runtime::Handle;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::relay::ChangeRelay;

/// `(child, child-local index)` → composite index.
type IndexMap = Arc<Mutex<HashMap<(usize, usize), usize>>>;

pub struct Locators {
    children: Vec<Arc<dyn Locator>>,
    relay: ChangeRelay,
}

impl Locators {
    pub const NAME: &'static str = "locators";

    pub fn new(children: Vec<Arc<dyn Locator>>) -> Self {
        Self {
            children,
            relay: ChangeRelay::new(),
        }
    }

    pub fn children(&self) -> &[Arc<dyn Locator>] {
        &self.children
    }
}

fn lookup(index_map: &IndexMap, child: usize, local: usize) -> Option<usize> {
    index_map
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .get(&(child, local))
        .copied()
}

/// A child's updates as a stream that always ends with `Complete`, even
/// when the child drops its sender without sending one.
fn child_updates(
    child: usize,
    updates: IteratorUpdates,
) -> BoxStream<'static, (usize, IteratorUpdate)> {
    futures_stream::unfold(Some(updates), |state| async move {
        let mut updates = state?;
        match updates.recv().await {
            Some(IteratorUpdate::Updated(event)) => {
                Some((IteratorUpdate::Updated(event), Some(updates)))
            }
            Some(IteratorUpdate::Complete) | None => Some((IteratorUpdate::Complete, None)),
        }
    })
    .map(move |update| (child, update))
    .boxed()
}

/// Re-key and forward child updates until every child and the iteration
/// itself are done.
async fn relay_updates(
    mut updates: SelectAll<BoxStream<'static, (usize, IteratorUpdate)>>,
    mut pending_children: usize,
    index_map: IndexMap,
    mut iteration_done: oneshot::Receiver<()>,
    tx: mpsc::UnboundedSender<IteratorUpdate>,
    cancel: CancellationToken,
) {
    let mut finished_iterating = false;
    let mut buffered: Vec<(usize, PythonEnvUpdatedEvent)> = Vec::new();

    let send = |child: usize,
                mut event: PythonEnvUpdatedEvent|
     -> Option<(usize, PythonEnvUpdatedEvent)> {
        match lookup(&index_map, child, event.index) {
            Some(index) => {
                event.index = index;
                let _ = tx.send(IteratorUpdate::Updated(event));
                None
            }
            None => Some((child, event)),
        }
    };

    while !(finished_iterating && pending_children == 0) {
        tokio::select! {
            () = cancel.cancelled() => return,
            _ = &mut iteration_done, if !finished_iterating => {
                finished_iterating = true;
            }
            item = updates.next(), if pending_children > 0 => match item {
                Some((child, IteratorUpdate::Updated(event))) => {
                    if let Some(unmapped) = send(child, event) {
                        buffered.push(unmapped);
                    }
                }
                Some((_, IteratorUpdate::Complete)) => pending_children -= 1,
                None => pending_children = 0,
            },
        }
        buffered = buffered
            .into_iter()
            .filter_map(|(child, event)| send(child, event))
            .collect();
    }

    for (child, event) in buffered {
        debug!(
            child,
            index = event.index,
            "Dropping update for an environment that was never yielded"
        );
    }
    let _ = tx.send(IteratorUpdate::Complete);
}

impl Locator for Locators {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn iter_envs(&self, query: &PythonLocatorQuery) -> EnvIterator {
        let index_map: IndexMap = Arc::new(Mutex::new(HashMap::new()));
        let mut envs = SelectAll::new();
        let mut updates = SelectAll::new();
        let mut pending_children = 0;

        for (child, locator) in self.children.iter().enumerate() {
            let iterator = locator.iter_envs(query);
            envs.push(
                iterator
                    .envs
                    .enumerate()
                    .map(move |(local, env)| (child, local, env))
                    .boxed(),
            );
            if let Some(child_stream) = iterator.updates {
                updates.push(child_updates(child, child_stream));
                pending_children += 1;
            }
        }

        let (done_tx, done_rx) = oneshot::channel();
        let (tx, rx) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();
        let guard = cancel.clone().drop_guard();

        match Handle::try_current() {
            Ok(handle) => {
                handle.spawn(relay_updates(
                    updates,
                    pending_children,
                    Arc::clone(&index_map),
                    done_rx,
                    tx,
                    cancel,
                ));
            }
            Err(_) => {
                warn!("No async runtime; background updates of child locators are dropped");
                let _ = tx.send(IteratorUpdate::Complete);
            }
        }

        let merged = stream! {
            let mut envs = envs;
            let mut next_index = 0;
            while let Some((child, local, env)) = envs.next().await {
                index_map
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .insert((child, local), next_index);
                next_index += 1;
                yield env;
            }
            let _ = done_tx.send(());
        };

        EnvIterator::new(Box::pin(merged)).with_updates(IteratorUpdates::new(rx).with_guard(guard))
    }

    fn subscribe(&self) -> broadcast::Receiver<PythonEnvsChangedEvent> {
        self.relay
            .subscribe(|| self.children.iter().map(|child| child.subscribe()).collect())
    }

    fn resolver(&self) -> Option<&dyn EnvResolver> {
        Some(self)
    }

    fn dispose(&self) {
        self.relay.dispose();
        for child in &self.children {
            child.dispose();
        }
    }
}

#[async_trait]
impl EnvResolver for Locators {
    /// First child that resolves wins; later children are not consulted.
    async fn resolve_env(&self, env: &PythonEnvInfo) -> Option<PythonEnvInfo> {
        for child in &self.children {
            let Some(resolver) = child.resolver() else {
                continue;
            };
            if let Some(resolved) = resolver.resolve_env(env).await {
                debug!(
                    locator = child.name(),
                    path = %resolved.filename().display(),
                    "Resolved environment"
                );
                return Some(resolved);
            }
        }
        None
    }
}
