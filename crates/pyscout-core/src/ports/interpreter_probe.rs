//! Interpreter probe port.
//!
//! Implementations run an interpreter out of process (see
//! `pyscout-runtime`). The core only sees the parsed result.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use super::ProbeError;
use crate::domain::{Architecture, PythonVersion};

/// What an interpreter reports about itself.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InterpreterInformation {
    pub executable: PathBuf,
    pub version: PythonVersion,
    pub arch: Architecture,
    pub sys_prefix: PathBuf,
}

#[async_trait]
pub trait InterpreterProbe: Send + Sync {
    /// Run `executable` and collect its information.
    ///
    /// Must settle promptly with [`ProbeError::Cancelled`] once `cancel`
    /// fires.
    async fn probe(
        &self,
        executable: &Path,
        cancel: CancellationToken,
    ) -> Result<InterpreterInformation, ProbeError>;
}
