//! The environment collection service.
//!
//! Owns the cache, drives refreshes against a (usually composite) locator
//! and publishes collection diff events.
//!
//! # Refresh coalescing
//!
//! At most one refresh runs at a time. A trigger arriving while one is in
//! flight schedules a single follow-up; further triggers join that
//! follow-up instead of queueing more work. A joining trigger widens the
//! follow-up's query so the follow-up still covers it.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Instant;

use futures_util::future::{BoxFuture, FutureExt, Shared};
use futures_util::{StreamExt, stream};
use tokio::sync::broadcast::{self, error::RecvError};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::envs_cache::EnvsCache;
use crate::domain::{
    EnvRef, PythonEnvCompleteInfo, PythonEnvInfo, PythonLocatorQuery, are_same_env,
    get_minimal_partial_info, get_query_filter, resolve_env_collision,
};
use crate::events::{EnvCollectionEvent, EventBroadcaster, IteratorUpdate};
use crate::ports::{CompletenessCheck, EnvIterator, EnvStream, EnvsStore, Locator};

/// Awaitable handle to an in-flight or scheduled refresh.
pub type RefreshHandle = Shared<BoxFuture<'static, ()>>;

struct ScheduledRefresh {
    handle: RefreshHandle,
    /// Read when the follow-up starts, so triggers joining before then
    /// are covered.
    query: Arc<Mutex<PythonLocatorQuery>>,
}

#[derive(Default)]
struct RefreshState {
    current: Option<RefreshHandle>,
    scheduled: Option<ScheduledRefresh>,
}

struct Inner {
    cache: EnvsCache,
    locator: Arc<dyn Locator>,
    events: EventBroadcaster<EnvCollectionEvent>,
    refresh: Mutex<RefreshState>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn spawn_refresh(handle: RefreshHandle) {
    match tokio::runtime::Handle::try_current() {
        Ok(runtime) => {
            runtime.spawn(handle);
        }
        Err(_) => debug!("No runtime available; refresh runs when awaited"),
    }
}

impl Inner {
    fn trigger_refresh(this: &Arc<Self>, query: PythonLocatorQuery) -> RefreshHandle {
        let mut state = lock(&this.refresh);
        if let Some(scheduled) = &state.scheduled {
            debug!("Refresh already scheduled; coalescing trigger");
            let mut planned = lock(&scheduled.query);
            if *planned != query {
                let widened = planned.widened(&query);
                *planned = widened;
            }
            return scheduled.handle.clone();
        }

        let inner = Arc::clone(this);
        let handle = match state.current.clone() {
            Some(current) => {
                debug!("Refresh in flight; scheduling one follow-up");
                let planned = Arc::new(Mutex::new(query));
                let follow_query = Arc::clone(&planned);
                let follow_up = async move {
                    current.await;
                    let query = lock(&follow_query).clone();
                    Self::run_refresh(inner, query).await;
                }
                .boxed()
                .shared();
                state.scheduled = Some(ScheduledRefresh {
                    handle: follow_up.clone(),
                    query: planned,
                });
                follow_up
            }
            None => {
                let run = Self::run_refresh(inner, query).boxed().shared();
                state.current = Some(run.clone());
                run
            }
        };
        drop(state);
        spawn_refresh(handle.clone());
        handle
    }

    fn refresh_promise(&self) -> Option<RefreshHandle> {
        let state = lock(&self.refresh);
        state
            .scheduled
            .as_ref()
            .map(|scheduled| scheduled.handle.clone())
            .or_else(|| state.current.clone())
    }

    async fn run_refresh(this: Arc<Self>, query: PythonLocatorQuery) {
        let started = Instant::now();
        let filter = get_query_filter(&query);
        let observed: Vec<PythonEnvInfo> = this
            .collect(&query)
            .await
            .into_iter()
            .filter(|env| filter(env))
            .collect();
        let observed_count = observed.len();

        let changes = this.cache.reconcile(observed, &filter);
        if !changes.is_empty() {
            this.events.broadcast(EnvCollectionEvent::ClearAll);
            for change in &changes {
                this.events.broadcast(change.clone());
            }
        }
        this.cache.flush().await;

        info!(
            observed = observed_count,
            changes = changes.len(),
            elapsed_ms = started.elapsed().as_millis(),
            "Environment refresh complete"
        );

        let mut state = lock(&this.refresh);
        state.current = state.scheduled.take().map(|scheduled| scheduled.handle);
    }

    /// Drain one iteration of the locator, collapsing duplicate sightings
    /// and applying background updates until the completion sentinel.
    async fn collect(&self, query: &PythonLocatorQuery) -> Vec<PythonEnvInfo> {
        let EnvIterator { mut envs, updates } = self.locator.iter_envs(query);
        let mut seen: Vec<Option<PythonEnvInfo>> = Vec::new();
        // Yield index -> slot in `seen`.
        let mut slots: Vec<Option<usize>> = Vec::new();

        while let Some(env) = envs.next().await {
            let Some(env) = get_minimal_partial_info(&env) else {
                debug!("Dropping environment without an executable");
                slots.push(None);
                continue;
            };
            let duplicate = seen.iter().position(|slot| {
                slot.as_ref().is_some_and(|known| match are_same_env(known, &env, true) {
                    Some(same) => same,
                    None => false,
                })
            });
            match duplicate {
                Some(index) => {
                    if let Some(known) = seen[index].take() {
                        seen[index] = Some(resolve_env_collision(&known, &env));
                    }
                    slots.push(Some(index));
                }
                None => {
                    slots.push(Some(seen.len()));
                    seen.push(Some(env));
                }
            }
        }

        if let Some(mut updates) = updates {
            loop {
                match updates.recv().await {
                    Some(IteratorUpdate::Updated(event)) => {
                        let Some(Some(index)) = slots.get(event.index).copied() else {
                            debug!(index = event.index, "Update for unknown index");
                            continue;
                        };
                        match event.update {
                            None => seen[index] = None,
                            Some(update) => {
                                if let Some(known) = seen[index].take() {
                                    seen[index] = Some(resolve_env_collision(&known, &update));
                                }
                            }
                        }
                    }
                    Some(IteratorUpdate::Complete) => break,
                    None => {
                        warn!("Update channel closed before completion");
                        break;
                    }
                }
            }
        }

        seen.into_iter().flatten().collect()
    }
}

/// Query-able, persisted collection of known environments.
pub struct EnvsCollectionService {
    inner: Arc<Inner>,
    watch_cancel: Mutex<Option<CancellationToken>>,
}

impl EnvsCollectionService {
    pub fn new(
        locator: Arc<dyn Locator>,
        store: Arc<dyn EnvsStore>,
        is_complete: CompletenessCheck,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                cache: EnvsCache::new(store, is_complete),
                locator,
                events: EventBroadcaster::new(),
                refresh: Mutex::new(RefreshState::default()),
            }),
            watch_cancel: Mutex::new(None),
        }
    }

    /// Load the persisted cache and start reacting to locator changes.
    pub async fn initialize(&self) {
        let loaded = self.inner.cache.initialize().await;
        info!(loaded, "Environment collection initialized");
        self.start_watching();
    }

    fn start_watching(&self) {
        let mut slot = lock(&self.watch_cancel);
        if slot.is_some() {
            return;
        }
        let token = CancellationToken::new();
        let cancel = token.clone();
        let mut changes = self.inner.locator.subscribe();
        let inner: Weak<Inner> = Arc::downgrade(&self.inner);

        tokio::spawn(async move {
            loop {
                let received = tokio::select! {
                    () = cancel.cancelled() => break,
                    received = changes.recv() => received,
                };
                match received {
                    Ok(event) => debug!(?event, "Environments changed; triggering refresh"),
                    Err(RecvError::Lagged(skipped)) => {
                        debug!(skipped, "Missed change events; triggering refresh");
                    }
                    Err(RecvError::Closed) => break,
                }
                let Some(inner) = inner.upgrade() else { break };
                drop(Inner::trigger_refresh(&inner, PythonLocatorQuery::all()));
            }
            debug!("Change watcher stopped");
        });
        *slot = Some(token);
    }

    /// Stop reacting to changes and dispose the underlying locator.
    pub fn dispose(&self) {
        if let Some(token) = lock(&self.watch_cancel).take() {
            token.cancel();
        }
        self.inner.locator.dispose();
    }

    pub fn subscribe(&self) -> broadcast::Receiver<EnvCollectionEvent> {
        self.inner.events.subscribe()
    }

    /// Cached entries matching `query`. Never blocks.
    ///
    /// An empty cache with no refresh in flight starts a background refresh.
    pub fn get_envs(&self, query: &PythonLocatorQuery) -> Vec<PythonEnvCompleteInfo> {
        if self.inner.cache.is_empty() && self.refresh_promise().is_none() {
            debug!("Environment cache empty; starting background refresh");
            drop(Inner::trigger_refresh(&self.inner, PythonLocatorQuery::all()));
        }
        self.inner.cache.query(query)
    }

    /// Environments matching `query`, refreshing first when the cache is
    /// empty or `ignore_cache` is set, and waiting for any refresh already
    /// in flight.
    pub fn iter_envs(&self, query: &PythonLocatorQuery) -> EnvStream {
        let inner = Arc::clone(&self.inner);
        let query = query.clone();
        let pending = if query.ignore_cache || inner.cache.is_empty() {
            Some(Inner::trigger_refresh(&inner, query.clone()))
        } else {
            inner.refresh_promise()
        };
        let envs = async move {
            if let Some(pending) = pending {
                pending.await;
            }
            inner
                .cache
                .query(&query)
                .into_iter()
                .map(PythonEnvCompleteInfo::into_inner)
                .collect::<Vec<_>>()
        };
        Box::pin(stream::once(envs).flat_map(stream::iter))
    }

    /// Start a refresh, or join the one already scheduled.
    pub fn trigger_refresh(&self, query: PythonLocatorQuery) -> RefreshHandle {
        Inner::trigger_refresh(&self.inner, query)
    }

    /// The refresh a caller would have to wait for right now, including a
    /// scheduled follow-up. `None` when idle.
    pub fn refresh_promise(&self) -> Option<RefreshHandle> {
        self.inner.refresh_promise()
    }

    /// Resolve one environment, from the cache when it is already complete.
    pub async fn resolve_env<'a>(&self, env: impl Into<EnvRef<'a>>) -> Option<PythonEnvInfo> {
        let env = get_minimal_partial_info(env)?;
        if let Some(cached) = self.inner.cache.find(&env) {
            if cached.has_complete_info {
                return Some(cached.env.clone());
            }
        }

        let Some(resolver) = self.inner.locator.resolver() else {
            debug!(path = %env.filename().display(), "Locator cannot resolve environments");
            return None;
        };
        let Some(resolved) = resolver.resolve_env(&env).await else {
            debug!(path = %env.filename().display(), "Could not resolve environment");
            return None;
        };

        if let Some(event) = self.inner.cache.upsert(resolved.clone()) {
            self.inner.events.broadcast(event);
        }
        self.inner.cache.flush().await;
        Some(resolved)
    }
}

impl Drop for EnvsCollectionService {
    fn drop(&mut self) {
        if let Some(token) = lock(&self.watch_cancel).take() {
            token.cancel();
        }
    }
}
