//! Filesystem watchers owned by locators.
//!
//! # Design Rules
//!
//! - Each locator owns one [`LocatorWatch`]; watchers start on the first
//!   scan and stop on dispose
//! - A root that cannot be watched (missing, permission denied) is logged
//!   and skipped
//! - After dispose no event is published, even from a callback already in
//!   flight on the notify thread

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use notify::event::ModifyKind;
use notify::{Config, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use pyscout_core::{
    EventBroadcaster, FileChangeType, LocatorError, PythonEnvKind, PythonEnvsChangedEvent,
};
use tokio::sync::broadcast;
use tracing::{debug, warn};

use crate::fs::is_python_executable_name;

/// Which paths under a watched root are relevant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchFilter {
    /// Only files named like an interpreter.
    Executables,
    /// Any entry, e.g. environment directories appearing under a root.
    AnyEntry,
}

/// One location a locator wants to hear about.
#[derive(Debug, Clone)]
pub struct WatchSpec {
    pub path: PathBuf,
    pub recursive: bool,
    pub filter: WatchFilter,
    /// Kind reported with the event, when the location implies one.
    pub kind: Option<PythonEnvKind>,
    /// Root reported with the event for rooted locators.
    pub search_location: Option<PathBuf>,
}

impl WatchSpec {
    pub fn executables(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            recursive: false,
            filter: WatchFilter::Executables,
            kind: None,
            search_location: None,
        }
    }

    pub fn entries(path: impl Into<PathBuf>) -> Self {
        Self {
            filter: WatchFilter::AnyEntry,
            ..Self::executables(path)
        }
    }

    #[must_use]
    pub const fn recursive(mut self) -> Self {
        self.recursive = true;
        self
    }

    #[must_use]
    pub const fn with_kind(mut self, kind: PythonEnvKind) -> Self {
        self.kind = Some(kind);
        self
    }

    #[must_use]
    pub fn with_search_location(mut self, root: impl Into<PathBuf>) -> Self {
        self.search_location = Some(root.into());
        self
    }
}

fn change_type(kind: &EventKind) -> Option<FileChangeType> {
    match kind {
        EventKind::Create(_) => Some(FileChangeType::Created),
        EventKind::Remove(_) => Some(FileChangeType::Deleted),
        EventKind::Modify(ModifyKind::Metadata(_)) => None,
        EventKind::Modify(_) => Some(FileChangeType::Changed),
        EventKind::Access(_) | EventKind::Any | EventKind::Other => None,
    }
}

fn is_relevant(filter: WatchFilter, path: &Path) -> bool {
    match filter {
        WatchFilter::AnyEntry => true,
        WatchFilter::Executables => path
            .file_name()
            .and_then(|n| n.to_str())
            .is_some_and(is_python_executable_name),
    }
}

/// Translate a raw notify event into the locator vocabulary.
pub fn translate_event(spec: &WatchSpec, event: &Event) -> Option<PythonEnvsChangedEvent> {
    let change = change_type(&event.kind)?;
    if !event.paths.iter().any(|p| is_relevant(spec.filter, p)) {
        return None;
    }
    Some(PythonEnvsChangedEvent {
        change: Some(change),
        kind: spec.kind,
        search_location: spec.search_location.clone(),
    })
}

/// The change channel and watchers of one locator.
pub struct LocatorWatch {
    changes: EventBroadcaster<PythonEnvsChangedEvent>,
    watchers: Mutex<Vec<RecommendedWatcher>>,
    started: AtomicBool,
    disposed: Arc<AtomicBool>,
}

impl LocatorWatch {
    pub fn new() -> Self {
        Self {
            changes: EventBroadcaster::new(),
            watchers: Mutex::new(Vec::new()),
            started: AtomicBool::new(false),
            disposed: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PythonEnvsChangedEvent> {
        self.changes.subscribe()
    }

    /// Publish an event that did not come from a watcher.
    pub fn publish(&self, event: PythonEnvsChangedEvent) {
        if !self.disposed.load(Ordering::Acquire) {
            self.changes.broadcast(event);
        }
    }

    /// Start watching on the first call; later calls are no-ops. Returns
    /// the number of roots actually watched.
    pub fn start_once(&self, specs: impl FnOnce() -> Vec<WatchSpec>) -> usize {
        if self.disposed.load(Ordering::Acquire) || self.started.swap(true, Ordering::AcqRel) {
            return 0;
        }
        let mut started = Vec::new();
        for spec in specs() {
            match self.watch(spec) {
                Ok(watcher) => started.push(watcher),
                Err(e) => debug!(error = %e, "Not watching location"),
            }
        }
        let count = started.len();
        self.watchers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .extend(started);
        count
    }

    fn watch(&self, spec: WatchSpec) -> Result<RecommendedWatcher, LocatorError> {
        if !spec.path.is_dir() {
            return Err(LocatorError::Watch(format!(
                "{} is not a directory",
                spec.path.display()
            )));
        }
        let sender = self.changes.sender();
        let disposed = Arc::clone(&self.disposed);
        let root = spec.path.clone();
        let mode = if spec.recursive {
            RecursiveMode::Recursive
        } else {
            RecursiveMode::NonRecursive
        };
        let mut watcher = RecommendedWatcher::new(
            move |result: notify::Result<Event>| {
                if disposed.load(Ordering::Acquire) {
                    return;
                }
                match result {
                    Ok(event) => {
                        if let Some(changed) = translate_event(&spec, &event) {
                            if sender.receiver_count() > 0 {
                                let _ = sender.send(changed);
                            }
                        }
                    }
                    Err(e) => warn!(error = %e, root = %spec.path.display(), "Watcher error"),
                }
            },
            Config::default(),
        )
        .map_err(|e| LocatorError::Watch(e.to_string()))?;
        watcher
            .watch(&root, mode)
            .map_err(|e| LocatorError::Watch(format!("{}: {e}", root.display())))?;
        debug!(root = %root.display(), "Watching for environment changes");
        Ok(watcher)
    }

    pub fn is_watching(&self) -> bool {
        !self
            .watchers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_empty()
    }

    /// Stop every watcher. Idempotent.
    pub fn dispose(&self) {
        self.disposed.store(true, Ordering::Release);
        self.watchers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}

impl Default for LocatorWatch {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use notify::event::{AccessKind, CreateKind, RemoveKind};

    fn event(kind: EventKind, path: &str) -> Event {
        Event::new(kind).add_path(PathBuf::from(path))
    }

    #[test]
    fn test_translate_event_filters_executables() {
        let spec = WatchSpec::executables("/usr/bin").with_kind(PythonEnvKind::OtherGlobal);
        let create = EventKind::Create(CreateKind::File);
        let created = translate_event(&spec, &event(create, "/usr/bin/python3.12")).unwrap();
        assert_eq!(created.change, Some(FileChangeType::Created));
        assert_eq!(created.kind, Some(PythonEnvKind::OtherGlobal));
        assert!(translate_event(&spec, &event(create, "/usr/bin/pip")).is_none());
        let access = EventKind::Access(AccessKind::Any);
        assert!(translate_event(&spec, &event(access, "/usr/bin/python")).is_none());
    }

    #[test]
    fn test_translate_event_any_entry_carries_root() {
        let spec = WatchSpec::entries("/w").with_search_location("/w");
        let remove = EventKind::Remove(RemoveKind::Folder);
        let removed = translate_event(&spec, &event(remove, "/w/.venv")).unwrap();
        assert_eq!(removed.change, Some(FileChangeType::Deleted));
        assert_eq!(removed.search_location, Some(PathBuf::from("/w")));
    }

    #[test]
    fn test_missing_root_is_skipped_and_dispose_stops_publishing() {
        let watch = LocatorWatch::new();
        let dir = tempfile::tempdir().unwrap();
        let count = watch.start_once(|| {
            vec![
                WatchSpec::executables(dir.path().join("missing")),
                WatchSpec::entries(dir.path()),
            ]
        });
        assert_eq!(count, 1);
        assert_eq!(watch.start_once(|| vec![WatchSpec::entries(dir.path())]), 0);

        let mut rx = watch.subscribe();
        watch.dispose();
        assert!(!watch.is_watching());
        watch.publish(PythonEnvsChangedEvent::any());
        assert!(rx.try_recv().is_err());
    }
}
