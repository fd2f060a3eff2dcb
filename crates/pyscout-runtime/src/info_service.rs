//! Deduplicated, concurrency-bounded interpreter probing.
//!
//! # Design Rules
//!
//! - One probe per normalised executable path and modification time;
//!   concurrent callers share it. A request carrying a different known
//!   mtime than the remembered result probes again.
//! - A failed probe is remembered as a failure until [`forget`] is called.
//!   A cancelled probe is not remembered.
//! - At most `max_concurrent` probes run at once.
//!
//! [`forget`]: EnvironmentInfoService::forget

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use pyscout_core::domain::UNKNOWN_TIMESTAMP;
use pyscout_core::utils::norm_case_path;
use pyscout_core::{InterpreterInformation, InterpreterProbe, ProbeError, PythonExecutableInfo};
use tokio::sync::{OnceCell, Semaphore};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

type Cell = Arc<OnceCell<Option<InterpreterInformation>>>;

struct Slot {
    mtime: i64,
    cell: Cell,
}

impl Slot {
    fn new(mtime: i64) -> Self {
        Self {
            mtime,
            cell: Arc::default(),
        }
    }
}

pub struct EnvironmentInfoService {
    probe: Arc<dyn InterpreterProbe>,
    permits: Semaphore,
    slots: Mutex<HashMap<PathBuf, Slot>>,
    cancel: CancellationToken,
}

impl EnvironmentInfoService {
    pub fn new(probe: Arc<dyn InterpreterProbe>, max_concurrent: usize) -> Self {
        Self {
            probe,
            permits: Semaphore::new(max_concurrent.max(1)),
            slots: Mutex::new(HashMap::new()),
            cancel: CancellationToken::new(),
        }
    }

    fn cell(&self, key: PathBuf, mtime: i64) -> Cell {
        let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        let slot = slots.entry(key).or_insert_with(|| Slot::new(mtime));
        if mtime != UNKNOWN_TIMESTAMP {
            if slot.mtime != UNKNOWN_TIMESTAMP && slot.mtime != mtime {
                debug!(
                    old = slot.mtime,
                    new = mtime,
                    "Interpreter changed on disk; probing again"
                );
                *slot = Slot::new(mtime);
            } else {
                slot.mtime = mtime;
            }
        }
        Arc::clone(&slot.cell)
    }

    /// Information reported by `executable`, probing it at most once per
    /// modification time.
    ///
    /// `None` means the interpreter could not be probed, now or before.
    pub async fn get_info(
        &self,
        executable: &PythonExecutableInfo,
    ) -> Option<InterpreterInformation> {
        let cell = self.cell(norm_case_path(&executable.filename), executable.mtime);
        let executable = executable.filename.as_path();
        let result = cell
            .get_or_try_init(|| async {
                let Ok(_permit) = self.permits.acquire().await else {
                    return Err(ProbeError::Cancelled);
                };
                match self.probe.probe(executable, self.cancel.child_token()).await {
                    Ok(info) => Ok(Some(info)),
                    Err(ProbeError::Cancelled) => Err(ProbeError::Cancelled),
                    Err(e) => {
                        warn!(
                            path = %executable.display(),
                            error = %e,
                            "Failed to probe interpreter"
                        );
                        Ok(None)
                    }
                }
            })
            .await;
        match result {
            Ok(info) => info.clone(),
            Err(_) => {
                debug!(path = %executable.display(), "Probe cancelled");
                None
            }
        }
    }

    /// Drop the remembered result for `executable` so the next request
    /// probes again.
    pub fn forget(&self, executable: &Path) {
        self.slots
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&norm_case_path(executable));
    }

    /// Cancel running probes and refuse new ones.
    pub fn dispose(&self) {
        self.cancel.cancel();
        self.permits.close();
    }
}
