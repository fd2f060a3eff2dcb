//! In-memory snapshot of known environments, backed by an [`EnvsStore`].
//!
//! Entries are immutable `Arc`s: a mutation swaps the whole entry, so a
//! reader holding a snapshot sees either the old or the new record, never a
//! partially applied one.

use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use tracing::{debug, warn};

use crate::domain::{
    PythonEnvCompleteInfo, PythonEnvInfo, PythonLocatorQuery, are_same_env,
    get_minimal_partial_info, merge_environments,
};
use crate::events::EnvCollectionEvent;
use crate::ports::{CompletenessCheck, EnvsStore};

type Entry = Arc<PythonEnvCompleteInfo>;

pub struct EnvsCache {
    entries: RwLock<Vec<Entry>>,
    store: Arc<dyn EnvsStore>,
    is_complete: CompletenessCheck,
}

impl EnvsCache {
    pub fn new(store: Arc<dyn EnvsStore>, is_complete: CompletenessCheck) -> Self {
        Self {
            entries: RwLock::new(Vec::new()),
            store,
            is_complete,
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, Vec<Entry>> {
        self.entries.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Vec<Entry>> {
        self.entries.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Seed the cache from the store. Stored entries were complete when
    /// written and are trusted as complete. Returns the number loaded.
    pub async fn initialize(&self) -> usize {
        let stored = match self.store.load().await {
            Ok(envs) => envs,
            Err(e) => {
                warn!(error = %e, "Failed to load environment cache; starting empty");
                Vec::new()
            }
        };
        let mut seeded: Vec<Entry> = Vec::with_capacity(stored.len());
        for env in stored {
            let Some(env) = get_minimal_partial_info(&env) else {
                debug!("Skipping stored environment without an executable");
                continue;
            };
            if seeded.iter().any(|e| e.filename() == env.filename()) {
                continue;
            }
            seeded.push(Arc::new(PythonEnvCompleteInfo::new(env, true)));
        }
        let count = seeded.len();
        *self.write() = seeded;
        debug!(count, "Environment cache seeded");
        count
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn snapshot(&self) -> Vec<Entry> {
        self.read().clone()
    }

    /// Entries matching `query`, in cache order.
    pub fn query(&self, query: &PythonLocatorQuery) -> Vec<PythonEnvCompleteInfo> {
        self.read()
            .iter()
            .filter(|entry| query.matches(entry))
            .map(|entry| entry.as_ref().clone())
            .collect()
    }

    /// The cached entry denoting the same environment as `env`.
    pub fn find(&self, env: &PythonEnvInfo) -> Option<Entry> {
        let entries = self.read();
        find_position(&entries, env).map(|index| Arc::clone(&entries[index]))
    }

    pub fn is_complete(&self, env: &PythonEnvInfo) -> bool {
        (self.is_complete)(env)
    }

    /// Insert `env` or refresh the entry it matches.
    ///
    /// Returns the event describing the change, or `None` when the cached
    /// entry already carried exactly this information.
    pub fn upsert(&self, env: PythonEnvInfo) -> Option<EnvCollectionEvent> {
        let mut entries = self.write();
        match find_position(&entries, &env) {
            Some(index) => {
                let old = Arc::clone(&entries[index]);
                let new = self.refreshed_entry(&old, &env)?;
                entries[index] = Arc::new(new.clone());
                Some(EnvCollectionEvent::Update {
                    old: old.as_ref().clone(),
                    new,
                })
            }
            None => {
                let complete = self.is_complete(&env);
                let entry = PythonEnvCompleteInfo::new(env, complete);
                entries.push(Arc::new(entry.clone()));
                Some(EnvCollectionEvent::Add { env: entry })
            }
        }
    }

    /// Combine a fresh sighting with the cached entry. `None` means nothing
    /// changed.
    ///
    /// An interpreter modified since it was cached starts over from the
    /// sighting alone.
    fn refreshed_entry(
        &self,
        old: &PythonEnvCompleteInfo,
        observed: &PythonEnvInfo,
    ) -> Option<PythonEnvCompleteInfo> {
        if observed.executable.modified_since(&old.env.executable) {
            debug!(path = %observed.filename().display(), "Interpreter modified; replacing entry");
            let complete = self.is_complete(observed);
            return Some(PythonEnvCompleteInfo::new(observed.clone(), complete));
        }
        // Fresh data wins ties; the old record only fills gaps.
        let merged = merge_environments(observed, &old.env);
        let complete = old.has_complete_info || self.is_complete(&merged);
        if merged == old.env && complete == old.has_complete_info {
            return None;
        }
        Some(PythonEnvCompleteInfo::new(merged, complete))
    }

    /// Reconcile the entries within `in_scope` against the environments a
    /// refresh observed.
    ///
    /// Matched entries are updated in place, unmatched in-scope entries are
    /// removed and the remaining observations appended. The returned
    /// events, replayed in order onto the previous snapshot, reproduce the
    /// new one.
    pub fn reconcile(
        &self,
        observed: Vec<PythonEnvInfo>,
        in_scope: impl Fn(&PythonEnvInfo) -> bool,
    ) -> Vec<EnvCollectionEvent> {
        let mut entries = self.write();
        let mut matched = vec![false; observed.len()];
        let mut next: Vec<Entry> = Vec::with_capacity(entries.len().max(observed.len()));
        let mut events = Vec::new();

        for old in entries.iter() {
            if !in_scope(&old.env) {
                next.push(Arc::clone(old));
                continue;
            }
            let position = observed
                .iter()
                .enumerate()
                .position(|(i, env)| !matched[i] && env.filename() == old.filename())
                .or_else(|| {
                    observed.iter().enumerate().position(|(i, env)| {
                        !matched[i] && are_same_env(&old.env, env, true) == Some(true)
                    })
                });
            match position {
                Some(index) => {
                    matched[index] = true;
                    match self.refreshed_entry(old, &observed[index]) {
                        Some(new) => {
                            next.push(Arc::new(new.clone()));
                            events.push(EnvCollectionEvent::Update {
                                old: old.as_ref().clone(),
                                new,
                            });
                        }
                        None => next.push(Arc::clone(old)),
                    }
                }
                None => events.push(EnvCollectionEvent::Remove {
                    old: old.as_ref().clone(),
                }),
            }
        }

        for (env, _) in observed
            .into_iter()
            .zip(matched)
            .filter(|(_, matched)| !matched)
        {
            let complete = self.is_complete(&env);
            let entry = PythonEnvCompleteInfo::new(env, complete);
            next.push(Arc::new(entry.clone()));
            events.push(EnvCollectionEvent::Add { env: entry });
        }

        *entries = next;
        events
    }

    /// Write every complete entry to the store. Failures are logged; the
    /// in-memory state is kept either way.
    pub async fn flush(&self) {
        let complete: Vec<PythonEnvInfo> = self
            .read()
            .iter()
            .filter(|entry| entry.has_complete_info)
            .map(|entry| entry.env.clone())
            .collect();
        let count = complete.len();
        match self.store.store(complete).await {
            Ok(()) => debug!(count, "Flushed environment cache"),
            Err(e) => warn!(error = %e, "Failed to persist environment cache"),
        }
    }
}

fn find_position(entries: &[Entry], env: &PythonEnvInfo) -> Option<usize> {
    entries
        .iter()
        .position(|entry| entry.filename() == env.filename())
        .or_else(|| {
            entries
                .iter()
                .position(|entry| are_same_env(&entry.env, env, true) == Some(true))
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{EnvInit, PythonEnvKind, PythonVersion, build_env_info};
    use crate::events::apply_collection_event;
    use crate::ports::{MockEnvsStore, StoreError};

    fn env(path: &str, name: &str) -> PythonEnvInfo {
        build_env_info(
            EnvInit::executable(path)
                .with_kind(PythonEnvKind::Venv)
                .with_name(name)
                .with_version(PythonVersion::new(3, 11, 4)),
        )
    }

    fn always_complete() -> CompletenessCheck {
        Arc::new(|_: &PythonEnvInfo| true)
    }

    #[tokio::test]
    async fn test_initialize_seeds_complete_and_drops_invalid() {
        let mut store = MockEnvsStore::new();
        store.expect_load().times(1).returning(|| {
            Ok(vec![
                env("/a/bin/python", "a"),
                build_env_info(EnvInit::default()),
                env("/a/bin/python", "dup"),
            ])
        });
        let cache = EnvsCache::new(Arc::new(store), Arc::new(|_: &PythonEnvInfo| false));
        assert_eq!(cache.initialize().await, 1);
        let entries = cache.snapshot();
        assert!(entries[0].has_complete_info);
        assert_eq!(entries[0].name, "a");
    }

    #[tokio::test]
    async fn test_initialize_tolerates_store_failure() {
        let mut store = MockEnvsStore::new();
        store
            .expect_load()
            .returning(|| Err(StoreError::Io("disk gone".to_string())));
        let cache = EnvsCache::new(Arc::new(store), always_complete());
        assert_eq!(cache.initialize().await, 0);
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn test_flush_writes_only_complete_entries_and_survives_failure() {
        let mut store = MockEnvsStore::new();
        store
            .expect_store()
            .withf(|envs| envs.len() == 1 && envs[0].filename().ends_with("done/bin/python"))
            .times(1)
            .returning(|_| Err(StoreError::Io("read-only".to_string())));
        let cache = EnvsCache::new(
            Arc::new(store),
            Arc::new(|env: &PythonEnvInfo| env.name == "done"),
        );
        cache.upsert(env("/done/bin/python", "done"));
        cache.upsert(env("/partial/bin/python", "partial"));
        cache.flush().await;
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn test_upsert_add_update_and_noop() {
        let cache = EnvsCache::new(Arc::new(crate::ports::NoopEnvsStore), always_complete());
        assert!(matches!(
            cache.upsert(env("/a/bin/python", "a")),
            Some(EnvCollectionEvent::Add { .. })
        ));
        assert!(cache.upsert(env("/a/bin/python", "a")).is_none());
        match cache.upsert(env("/a/bin/python", "renamed")) {
            Some(EnvCollectionEvent::Update { old, new }) => {
                assert_eq!(old.name, "a");
                assert_eq!(new.name, "renamed");
            }
            other => panic!("unexpected event {other:?}"),
        }
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_modified_interpreter_replaces_cached_entry() {
        let cache = EnvsCache::new(
            Arc::new(crate::ports::NoopEnvsStore),
            Arc::new(|env: &PythonEnvInfo| env.version.micro >= 0),
        );
        let mut cached = env("/a/bin/python", "a");
        cached.executable.mtime = 100;
        cached.arch = crate::domain::Architecture::X64;
        cache.upsert(cached);
        assert!(cache.snapshot()[0].has_complete_info);

        let mut recreated = build_env_info(
            EnvInit::executable("/a/bin/python")
                .with_kind(PythonEnvKind::Venv)
                .with_name("a")
                .with_version(PythonVersion::new(3, 12, -1)),
        );
        recreated.executable.mtime = 200;
        let events = cache.reconcile(vec![recreated.clone()], |_| true);
        assert_eq!(events.len(), 1);

        let entry = cache.snapshot()[0].as_ref().clone();
        assert_eq!(entry.env, recreated);
        assert_eq!(entry.version, PythonVersion::new(3, 12, -1));
        assert_eq!(entry.arch, crate::domain::Architecture::Unknown);
        assert!(!entry.has_complete_info);

        // Same mtime again: an ordinary merge.
        let mut same = recreated;
        same.name = String::new();
        assert!(cache.upsert(same).is_none());
    }

    #[test]
    fn test_reconcile_respects_scope_and_replays() {
        let cache = EnvsCache::new(Arc::new(crate::ports::NoopEnvsStore), always_complete());
        let mut conda = env("/c/envs/x/bin/python", "x");
        conda.kind = PythonEnvKind::Conda;
        cache.upsert(conda.clone());
        cache.upsert(env("/gone/bin/python", "gone"));
        cache.upsert(env("/keep/bin/python", "keep"));
        let before: Vec<PythonEnvCompleteInfo> =
            cache.snapshot().iter().map(|e| e.as_ref().clone()).collect();

        // Only venvs are in scope; the conda entry must survive untouched.
        let events = cache.reconcile(
            vec![env("/keep/bin/python", "kept"), env("/new/bin/python", "new")],
            |env| env.kind == PythonEnvKind::Venv,
        );
        let names: Vec<&str> = events.iter().map(EnvCollectionEvent::event_name).collect();
        assert_eq!(names, vec!["envs:remove", "envs:update", "envs:add"]);

        let after: Vec<PythonEnvCompleteInfo> =
            cache.snapshot().iter().map(|e| e.as_ref().clone()).collect();
        assert_eq!(after[0].env, conda);
        let mut replayed = before;
        for event in &events {
            apply_collection_event(&mut replayed, event);
        }
        assert_eq!(replayed, after);
    }
}
