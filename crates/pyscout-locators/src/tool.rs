//! Running environment-manager CLIs (`conda`, `poetry`) for discovery.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use pyscout_core::LocatorError;
use serde::Deserialize;
use tokio::process::Command;
use tracing::debug;

/// Upper bound for a single manager invocation.
pub const TOOL_TIMEOUT: Duration = Duration::from_secs(15);

/// Pick the manager binary: an explicit setting wins, then an environment
/// variable naming it, then a `PATH` lookup.
pub fn find_tool(
    configured: Option<&Path>,
    from_env: Option<PathBuf>,
    name: &str,
) -> Option<PathBuf> {
    if let Some(path) = configured.filter(|p| !p.as_os_str().is_empty()) {
        return Some(path.to_path_buf());
    }
    if let Some(path) = from_env.filter(|p| p.is_file()) {
        return Some(path);
    }
    which::which(name).ok()
}

/// Run `program args...` and return its stdout.
pub async fn run_tool(
    program: &Path,
    args: &[&str],
    cwd: Option<&Path>,
) -> Result<String, LocatorError> {
    let mut command = Command::new(program);
    command
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    if let Some(cwd) = cwd {
        command.current_dir(cwd);
    }
    debug!(program = %program.display(), ?args, "Running environment manager");

    let output = tokio::time::timeout(TOOL_TIMEOUT, command.output())
        .await
        .map_err(|_| {
            LocatorError::Command(format!(
                "{} timed out after {}s",
                program.display(),
                TOOL_TIMEOUT.as_secs()
            ))
        })?
        .map_err(|e| LocatorError::Command(format!("{}: {e}", program.display())))?;

    if !output.status.success() {
        return Err(LocatorError::Command(format!(
            "{} {args:?} exited with {}: {}",
            program.display(),
            output.status,
            String::from_utf8_lossy(&output.stderr).trim()
        )));
    }
    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

/// The subset of `conda info --json` used for discovery.
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct CondaInfo {
    pub envs: Vec<PathBuf>,
    pub envs_dirs: Vec<PathBuf>,
    pub root_prefix: Option<PathBuf>,
    pub conda_prefix: Option<PathBuf>,
}

impl CondaInfo {
    pub fn parse(stdout: &str) -> Result<Self, LocatorError> {
        serde_json::from_str(stdout).map_err(|e| {
            LocatorError::Command(format!("unexpected `conda info --json` output: {e}"))
        })
    }

    /// Every prefix the info names, base first, without duplicates.
    pub fn prefixes(&self) -> Vec<PathBuf> {
        let mut prefixes: Vec<PathBuf> = Vec::new();
        let candidates = self
            .root_prefix
            .iter()
            .chain(self.conda_prefix.iter())
            .chain(self.envs.iter());
        for prefix in candidates {
            if !prefixes.contains(prefix) {
                prefixes.push(prefix.clone());
            }
        }
        prefixes
    }
}

/// Environment directories from `poetry env list --full-path`. Lines look
/// like `/path/to/env (Activated)`.
pub fn parse_poetry_env_list(stdout: &str) -> Vec<PathBuf> {
    stdout
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(|line| line.strip_suffix("(Activated)").map_or(line, str::trim_end))
        .map(PathBuf::from)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_conda_info_prefixes() {
        let info = CondaInfo::parse(
            r#"{"envs": ["/opt/conda", "/opt/conda/envs/ml"], "root_prefix": "/opt/conda", "conda_version": "23.1.0"}"#,
        )
        .unwrap();
        assert_eq!(
            info.prefixes(),
            vec![PathBuf::from("/opt/conda"), PathBuf::from("/opt/conda/envs/ml")]
        );
        assert!(CondaInfo::parse("Traceback").is_err());
    }

    #[test]
    fn test_poetry_env_list() {
        let out = concat!(
            "/c/pypoetry/virtualenvs/app-Xy12Ab34-py3.10\n",
            "/c/pypoetry/virtualenvs/app-Xy12Ab34-py3.11 (Activated)\n\n",
        );
        assert_eq!(
            parse_poetry_env_list(out),
            vec![
                PathBuf::from("/c/pypoetry/virtualenvs/app-Xy12Ab34-py3.10"),
                PathBuf::from("/c/pypoetry/virtualenvs/app-Xy12Ab34-py3.11"),
            ]
        );
    }

    #[test]
    fn test_configured_tool_wins() {
        let found = find_tool(Some(Path::new("/custom/conda")), None, "conda-that-does-not-exist");
        assert_eq!(found, Some(PathBuf::from("/custom/conda")));
    }
}
