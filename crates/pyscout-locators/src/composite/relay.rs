//! Forwarding of child change events into a composite's own channel.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use pyscout_core::{EventBroadcaster, PythonEnvsChangedEvent};
use tokio::runtime::Handle;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Relays events from source channels into one broadcaster.
///
/// The relay tasks start with the first subscription and stop on
/// [`ChangeRelay::dispose`]. An optional gate drops events at forward time
/// while it reads `false`.
pub struct ChangeRelay {
    changes: EventBroadcaster<PythonEnvsChangedEvent>,
    cancel: Mutex<Option<CancellationToken>>,
    gate: Option<Arc<AtomicBool>>,
}

impl ChangeRelay {
    pub fn new() -> Self {
        Self {
            changes: EventBroadcaster::new(),
            cancel: Mutex::new(None),
            gate: None,
        }
    }

    pub fn gated(gate: Arc<AtomicBool>) -> Self {
        Self {
            gate: Some(gate),
            ..Self::new()
        }
    }

    /// Subscribe, starting the relay from `sources` on the first call.
    pub fn subscribe(
        &self,
        sources: impl FnOnce() -> Vec<broadcast::Receiver<PythonEnvsChangedEvent>>,
    ) -> broadcast::Receiver<PythonEnvsChangedEvent> {
        let rx = self.changes.subscribe();
        let mut cancel = self.cancel.lock().unwrap_or_else(PoisonError::into_inner);
        if cancel.is_some() {
            return rx;
        }
        let Ok(handle) = Handle::try_current() else {
            warn!("No async runtime; change events will not be relayed");
            return rx;
        };
        let token = CancellationToken::new();
        for source in sources() {
            handle.spawn(forward(source, self.changes.sender(), self.gate.clone(), token.clone()));
        }
        *cancel = Some(token);
        rx
    }

    /// Stop relaying. Idempotent; later subscriptions do not restart it.
    pub fn dispose(&self) {
        let mut cancel = self.cancel.lock().unwrap_or_else(PoisonError::into_inner);
        match cancel.as_ref() {
            Some(token) => token.cancel(),
            None => {
                let token = CancellationToken::new();
                token.cancel();
                *cancel = Some(token);
            }
        }
    }
}

impl Default for ChangeRelay {
    fn default() -> Self {
        Self::new()
    }
}

async fn forward(
    mut source: broadcast::Receiver<PythonEnvsChangedEvent>,
    sink: broadcast::Sender<PythonEnvsChangedEvent>,
    gate: Option<Arc<AtomicBool>>,
    cancel: CancellationToken,
) {
    loop {
        let event = tokio::select! {
            () = cancel.cancelled() => break,
            received = source.recv() => match received {
                Ok(event) => event,
                Err(RecvError::Lagged(skipped)) => {
                    debug!(skipped, "Change relay lagged; reporting a generic change");
                    PythonEnvsChangedEvent::any()
                }
                Err(RecvError::Closed) => break,
            },
        };
        if cancel.is_cancelled() {
            break;
        }
        if gate.as_ref().is_some_and(|open| !open.load(Ordering::Acquire)) {
            continue;
        }
        if sink.receiver_count() > 0 {
            let _ = sink.send(event);
        }
    }
}
