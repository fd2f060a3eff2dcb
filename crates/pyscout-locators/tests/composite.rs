//! Behaviour of the composite and disableable locators over scripted
//! child locators.

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use futures_util::StreamExt;
use pyscout_core::{
    EnvInit, EnvIterator, EnvResolver, EventBroadcaster, FileChangeType, IteratorUpdate,
    IteratorUpdates, Locator, PythonEnvInfo, PythonEnvKind, PythonEnvUpdatedEvent,
    PythonEnvsChangedEvent, PythonLocatorQuery, build_env_info,
};
use pyscout_locators::{DisableableLocator, Locators};
use tokio::sync::{broadcast, mpsc};

fn env(path: &str) -> PythonEnvInfo {
    build_env_info(EnvInit::executable(path).with_kind(PythonEnvKind::Venv))
}

struct FakeLocator {
    name: &'static str,
    envs: Vec<PythonEnvInfo>,
    updates: Mutex<Option<Vec<IteratorUpdate>>>,
    resolves_to: Option<PythonEnvInfo>,
    resolve_calls: AtomicUsize,
    changes: EventBroadcaster<PythonEnvsChangedEvent>,
    disposed: AtomicBool,
}

impl FakeLocator {
    fn new(name: &'static str, envs: Vec<PythonEnvInfo>) -> Self {
        Self {
            name,
            envs,
            updates: Mutex::new(None),
            resolves_to: None,
            resolve_calls: AtomicUsize::new(0),
            changes: EventBroadcaster::new(),
            disposed: AtomicBool::new(false),
        }
    }

    fn resolving_to(mut self, env: PythonEnvInfo) -> Self {
        self.resolves_to = Some(env);
        self
    }

    fn with_updates(self, updates: Vec<IteratorUpdate>) -> Self {
        *self.updates.lock().unwrap() = Some(updates);
        self
    }
}

impl Locator for FakeLocator {
    fn name(&self) -> &str {
        self.name
    }

    fn iter_envs(&self, _query: &PythonLocatorQuery) -> EnvIterator {
        let iterator = EnvIterator::new(futures_util::stream::iter(self.envs.clone()).boxed());
        match self.updates.lock().unwrap().take() {
            Some(updates) => {
                let (tx, rx) = mpsc::unbounded_channel();
                for update in updates {
                    tx.send(update).unwrap();
                }
                iterator.with_updates(IteratorUpdates::new(rx))
            }
            None => iterator,
        }
    }

    fn subscribe(&self) -> broadcast::Receiver<PythonEnvsChangedEvent> {
        self.changes.subscribe()
    }

    fn resolver(&self) -> Option<&dyn EnvResolver> {
        Some(self)
    }

    fn dispose(&self) {
        self.disposed.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl EnvResolver for FakeLocator {
    async fn resolve_env(&self, _env: &PythonEnvInfo) -> Option<PythonEnvInfo> {
        self.resolve_calls.fetch_add(1, Ordering::SeqCst);
        self.resolves_to.clone()
    }
}

async fn drain(iterator: EnvIterator) -> (Vec<PythonEnvInfo>, Vec<IteratorUpdate>) {
    let envs: Vec<PythonEnvInfo> = iterator.envs.collect().await;
    let mut updates = Vec::new();
    if let Some(mut rx) = iterator.updates {
        while let Some(update) = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("update channel stalled")
        {
            let done = update == IteratorUpdate::Complete;
            updates.push(update);
            if done {
                break;
            }
        }
    }
    (envs, updates)
}

fn filenames(envs: &[PythonEnvInfo]) -> HashSet<PathBuf> {
    envs.iter().map(|e| e.filename().to_path_buf()).collect()
}

#[tokio::test]
async fn fan_in_yields_the_union_and_one_complete() {
    let children: Vec<Arc<dyn Locator>> = vec![
        Arc::new(FakeLocator::new("a", vec![env("/a/1/bin/python"), env("/a/2/bin/python")])),
        Arc::new(FakeLocator::new("b", vec![])),
        Arc::new(
            FakeLocator::new("c", vec![env("/c/1/bin/python")])
                .with_updates(vec![IteratorUpdate::Complete]),
        ),
    ];
    let locators = Locators::new(children);

    let (envs, updates) = drain(locators.iter_envs(&PythonLocatorQuery::all())).await;
    assert_eq!(envs.len(), 3);
    assert_eq!(
        filenames(&envs),
        ["/a/1/bin/python", "/a/2/bin/python", "/c/1/bin/python"]
            .into_iter()
            .map(PathBuf::from)
            .collect()
    );
    assert_eq!(updates, vec![IteratorUpdate::Complete]);
}

#[tokio::test]
async fn child_updates_are_rekeyed_into_composite_indices() {
    let original = env("/b/1/bin/python");
    let mut refined = original.clone();
    refined.name = "refined".to_string();
    let children: Vec<Arc<dyn Locator>> = vec![
        Arc::new(FakeLocator::new("a", vec![env("/a/1/bin/python"), env("/a/2/bin/python")])),
        Arc::new(
            FakeLocator::new("b", vec![original.clone()]).with_updates(vec![
                IteratorUpdate::Updated(PythonEnvUpdatedEvent {
                    index: 0,
                    old: Some(original.clone()),
                    update: Some(refined.clone()),
                }),
                // The child never sends Complete; closing its channel counts.
            ]),
        ),
    ];
    let locators = Locators::new(children);

    let (envs, updates) = drain(locators.iter_envs(&PythonLocatorQuery::all())).await;
    let position = envs.iter().position(|e| e == &original).unwrap();
    assert_eq!(updates.len(), 2);
    match &updates[0] {
        IteratorUpdate::Updated(event) => {
            assert_eq!(event.index, position);
            assert_eq!(event.update.as_ref(), Some(&refined));
        }
        IteratorUpdate::Complete => panic!("update expected before completion"),
    }
    assert_eq!(updates[1], IteratorUpdate::Complete);
}

#[tokio::test]
async fn resolve_tries_children_in_order() {
    let e = env("/b/env/bin/python");
    let a = Arc::new(FakeLocator::new("a", vec![]));
    let b = Arc::new(FakeLocator::new("b", vec![e.clone()]).resolving_to(e.clone()));
    let c = Arc::new(FakeLocator::new("c", vec![]).resolving_to(env("/c/other/bin/python")));
    let locators = Locators::new(vec![
        Arc::clone(&a) as Arc<dyn Locator>,
        Arc::clone(&b) as Arc<dyn Locator>,
        Arc::clone(&c) as Arc<dyn Locator>,
    ]);

    let resolved = locators.resolver().unwrap().resolve_env(&e).await;
    assert_eq!(resolved, Some(e));
    assert_eq!(a.resolve_calls.load(Ordering::SeqCst), 1);
    assert_eq!(b.resolve_calls.load(Ordering::SeqCst), 1);
    assert_eq!(c.resolve_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn change_events_are_relayed_and_dispose_reaches_children() {
    let a = Arc::new(FakeLocator::new("a", vec![]));
    let b = Arc::new(FakeLocator::new("b", vec![]));
    let locators = Locators::new(vec![
        Arc::clone(&a) as Arc<dyn Locator>,
        Arc::clone(&b) as Arc<dyn Locator>,
    ]);
    let mut rx = locators.subscribe();

    let event = PythonEnvsChangedEvent::new(FileChangeType::Created, Some(PythonEnvKind::Conda));
    b.changes.broadcast(event.clone());
    let received = tokio::time::timeout(Duration::from_secs(5), rx.recv()).await.unwrap().unwrap();
    assert_eq!(received, event);

    locators.dispose();
    assert!(a.disposed.load(Ordering::SeqCst));
    assert!(b.disposed.load(Ordering::SeqCst));
}

#[tokio::test]
async fn disabled_locator_is_silent_and_resumes_without_replay() {
    let inner = Arc::new(
        FakeLocator::new("inner", vec![env("/x/bin/python")]).resolving_to(env("/x/bin/python")),
    );
    let switch = DisableableLocator::new(Arc::clone(&inner) as Arc<dyn Locator>);
    let mut rx = switch.subscribe();

    switch.disable();
    let (envs, updates) = drain(switch.iter_envs(&PythonLocatorQuery::all())).await;
    assert!(envs.is_empty());
    assert_eq!(updates, vec![IteratorUpdate::Complete]);
    assert!(switch.resolver().unwrap().resolve_env(&env("/x/bin/python")).await.is_none());

    let suppressed = PythonEnvsChangedEvent::new(FileChangeType::Deleted, None);
    inner.changes.broadcast(suppressed);
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(matches!(rx.try_recv(), Err(broadcast::error::TryRecvError::Empty)));

    switch.enable();
    let forwarded = PythonEnvsChangedEvent::new(FileChangeType::Created, None);
    inner.changes.broadcast(forwarded.clone());
    let received = tokio::time::timeout(Duration::from_secs(5), rx.recv()).await.unwrap().unwrap();
    assert_eq!(received, forwarded);
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert!(matches!(rx.try_recv(), Err(broadcast::error::TryRecvError::Empty)));

    assert_eq!(switch.iter_envs(&PythonLocatorQuery::all()).envs.count().await, 1);
    assert!(switch.resolver().unwrap().resolve_env(&env("/x/bin/python")).await.is_some());
}
