//! Run an interpreter and parse the information it prints.

use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use pyscout_core::{
    Architecture, InterpreterInformation, InterpreterProbe, ProbeError, PythonVersion,
    ReleaseLevel,
};
use serde::Deserialize;
use tokio::process::Command;
use tokio_util::sync::CancellationToken;
use tracing::debug;

const START_MARKER: &str = ">>>JSON";
const END_MARKER: &str = "<<<JSON";

/// Passed to `python -c`. Runs on Python 2.7 and every Python 3.
pub const PROBE_SCRIPT: &str = r#"import json, sys
info = {
    "versionInfo": tuple(sys.version_info),
    "sysPrefix": sys.prefix,
    "sysVersion": sys.version,
    "is64Bit": sys.maxsize > 2**32,
}
print(">>>JSON")
print(json.dumps(info))
print("<<<JSON")
"#;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ProbeOutput {
    version_info: (i32, i32, i32, String, i32),
    sys_prefix: String,
    sys_version: String,
    #[serde(rename = "is64Bit")]
    is_64_bit: bool,
}

/// Parse the probe script's stdout. Anything printed outside the markers,
/// such as activation noise, is ignored.
pub fn parse_probe_output(
    executable: &Path,
    stdout: &str,
) -> Result<InterpreterInformation, ProbeError> {
    let start = stdout
        .find(START_MARKER)
        .ok_or_else(|| ProbeError::InvalidOutput("missing start marker".to_string()))?;
    let body = &stdout[start + START_MARKER.len()..];
    let end = body
        .find(END_MARKER)
        .ok_or_else(|| ProbeError::InvalidOutput("missing end marker".to_string()))?;

    let output: ProbeOutput = serde_json::from_str(body[..end].trim())
        .map_err(|e| ProbeError::InvalidOutput(e.to_string()))?;

    let (major, minor, micro, level, serial) = output.version_info;
    let level = ReleaseLevel::parse(&level).ok_or(ProbeError::UnparseableVersion(level))?;
    let mut version = PythonVersion::new(major, minor, micro).with_release(level, serial);
    version.sys_version = Some(output.sys_version);

    Ok(InterpreterInformation {
        executable: executable.to_path_buf(),
        version,
        arch: if output.is_64_bit {
            Architecture::X64
        } else {
            Architecture::X86
        },
        sys_prefix: output.sys_prefix.into(),
    })
}

/// [`InterpreterProbe`] that spawns the interpreter with [`PROBE_SCRIPT`].
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessInterpreterProbe {
    timeout: Option<Duration>,
}

impl ProcessInterpreterProbe {
    pub const fn new() -> Self {
        Self { timeout: None }
    }

    /// Kill interpreters that have not answered within `timeout`.
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }
}

#[async_trait]
impl InterpreterProbe for ProcessInterpreterProbe {
    async fn probe(
        &self,
        executable: &Path,
        cancel: CancellationToken,
    ) -> Result<InterpreterInformation, ProbeError> {
        debug!(path = %executable.display(), "Probing interpreter");
        let child = Command::new(executable)
            .arg("-c")
            .arg(PROBE_SCRIPT)
            .env("PYTHONIOENCODING", "utf-8")
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| ProbeError::Spawn {
                executable: executable.display().to_string(),
                reason: e.to_string(),
            })?;

        // Dropping the wait future drops the child, which kills it.
        let wait = async {
            let output = child.wait_with_output();
            let result = match self.timeout {
                Some(limit) => tokio::time::timeout(limit, output).await.map_err(|_| {
                    ProbeError::TimedOut(u64::try_from(limit.as_millis()).unwrap_or(u64::MAX))
                })?,
                None => output.await,
            };
            result.map_err(|e| ProbeError::InvalidOutput(e.to_string()))
        };

        let output = tokio::select! {
            () = cancel.cancelled() => return Err(ProbeError::Cancelled),
            output = wait => output?,
        };

        if !output.status.success() {
            return Err(ProbeError::NonZeroExit {
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        parse_probe_output(executable, &String::from_utf8_lossy(&output.stdout))
    }
}
