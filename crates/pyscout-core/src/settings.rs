//! Discovery settings and validation.
//!
//! Pure domain types; loading from a file is the binary's concern.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Default bound on concurrently running interpreter probes.
pub const DEFAULT_MAX_CONCURRENT_PROBES: usize = 4;

/// Upper bound accepted for `max_concurrent_probes`.
pub const MAX_CONCURRENT_PROBES_LIMIT: usize = 64;

/// Settings for a discovery session.
///
/// Every field is optional so partial configuration files work.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct DiscoverySettings {
    /// Workspace folders searched by the rooted locators.
    pub workspace_roots: Vec<PathBuf>,

    /// Locator names that start disabled.
    pub disabled_locators: Vec<String>,

    /// Maximum number of interpreters probed at once (1-64).
    pub max_concurrent_probes: Option<usize>,

    /// Per-probe timeout in milliseconds. No timeout when unset.
    pub probe_timeout_ms: Option<u64>,

    /// Explicit `conda` executable.
    pub conda_path: Option<PathBuf>,

    /// Explicit `poetry` executable.
    pub poetry_path: Option<PathBuf>,

    /// Location of the persisted environment cache.
    pub store_path: Option<PathBuf>,

    /// Allow running any discovered interpreter to collect its details.
    pub trust_all_interpreters: Option<bool>,
}

impl DiscoverySettings {
    #[must_use]
    pub const fn with_defaults() -> Self {
        Self {
            workspace_roots: Vec::new(),
            disabled_locators: Vec::new(),
            max_concurrent_probes: Some(DEFAULT_MAX_CONCURRENT_PROBES),
            probe_timeout_ms: None,
            conda_path: None,
            poetry_path: None,
            store_path: None,
            trust_all_interpreters: Some(true),
        }
    }

    pub fn effective_max_concurrent_probes(&self) -> usize {
        self.max_concurrent_probes
            .unwrap_or(DEFAULT_MAX_CONCURRENT_PROBES)
    }

    pub fn probe_timeout(&self) -> Option<Duration> {
        self.probe_timeout_ms.map(Duration::from_millis)
    }

    pub fn trusts_all_interpreters(&self) -> bool {
        self.trust_all_interpreters.unwrap_or(true)
    }

    pub fn is_locator_disabled(&self, name: &str) -> bool {
        self.disabled_locators
            .iter()
            .any(|disabled| disabled.eq_ignore_ascii_case(name))
    }

    /// Overlay the values set in `other`.
    pub fn merge(&mut self, other: Self) {
        if !other.workspace_roots.is_empty() {
            self.workspace_roots = other.workspace_roots;
        }
        if !other.disabled_locators.is_empty() {
            self.disabled_locators = other.disabled_locators;
        }
        if other.max_concurrent_probes.is_some() {
            self.max_concurrent_probes = other.max_concurrent_probes;
        }
        if other.probe_timeout_ms.is_some() {
            self.probe_timeout_ms = other.probe_timeout_ms;
        }
        if other.conda_path.is_some() {
            self.conda_path = other.conda_path;
        }
        if other.poetry_path.is_some() {
            self.poetry_path = other.poetry_path;
        }
        if other.store_path.is_some() {
            self.store_path = other.store_path;
        }
        if other.trust_all_interpreters.is_some() {
            self.trust_all_interpreters = other.trust_all_interpreters;
        }
    }
}

/// Settings validation error.
#[derive(Debug, Clone, thiserror::Error)]
pub enum SettingsError {
    #[error("Max concurrent probes must be between 1 and 64, got {0}")]
    InvalidConcurrency(usize),

    #[error("Probe timeout must be at least 1 ms")]
    InvalidProbeTimeout,

    #[error("{0} path cannot be empty")]
    EmptyPath(&'static str),
}

/// Validate settings values.
pub fn validate_settings(settings: &DiscoverySettings) -> Result<(), SettingsError> {
    if let Some(limit) = settings.max_concurrent_probes {
        if !(1..=MAX_CONCURRENT_PROBES_LIMIT).contains(&limit) {
            return Err(SettingsError::InvalidConcurrency(limit));
        }
    }

    if settings.probe_timeout_ms == Some(0) {
        return Err(SettingsError::InvalidProbeTimeout);
    }

    let paths = [
        ("conda", settings.conda_path.as_ref()),
        ("poetry", settings.poetry_path.as_ref()),
        ("store", settings.store_path.as_ref()),
    ];
    for (label, path) in paths {
        if path.is_some_and(|p| p.as_os_str().is_empty()) {
            return Err(SettingsError::EmptyPath(label));
        }
    }

    if settings
        .workspace_roots
        .iter()
        .any(|root| root.as_os_str().is_empty())
    {
        return Err(SettingsError::EmptyPath("workspace root"));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        assert!(validate_settings(&DiscoverySettings::with_defaults()).is_ok());
        assert!(validate_settings(&DiscoverySettings::default()).is_ok());
    }

    #[test]
    fn test_concurrency_bounds() {
        for bad in [0, 65, 1000] {
            let settings = DiscoverySettings {
                max_concurrent_probes: Some(bad),
                ..DiscoverySettings::default()
            };
            assert!(matches!(
                validate_settings(&settings),
                Err(SettingsError::InvalidConcurrency(n)) if n == bad
            ));
        }
        let settings = DiscoverySettings {
            max_concurrent_probes: Some(64),
            ..DiscoverySettings::default()
        };
        assert!(validate_settings(&settings).is_ok());
    }

    #[test]
    fn test_zero_timeout_rejected() {
        let settings = DiscoverySettings {
            probe_timeout_ms: Some(0),
            ..DiscoverySettings::default()
        };
        assert!(matches!(
            validate_settings(&settings),
            Err(SettingsError::InvalidProbeTimeout)
        ));
    }

    #[test]
    fn test_empty_paths_rejected() {
        let settings = DiscoverySettings {
            store_path: Some(PathBuf::new()),
            ..DiscoverySettings::default()
        };
        assert!(matches!(
            validate_settings(&settings),
            Err(SettingsError::EmptyPath("store"))
        ));
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let json = r#"{"workspace_roots": ["/w"], "probe_timeout_ms": 500}"#;
        let settings: DiscoverySettings = serde_json::from_str(json).unwrap();
        assert_eq!(settings.workspace_roots, vec![PathBuf::from("/w")]);
        assert_eq!(settings.probe_timeout(), Some(Duration::from_millis(500)));
        assert_eq!(
            settings.effective_max_concurrent_probes(),
            DEFAULT_MAX_CONCURRENT_PROBES
        );
        assert!(settings.trusts_all_interpreters());
    }

    #[test]
    fn test_merge_and_disabled_lookup() {
        let mut base = DiscoverySettings::with_defaults();
        base.merge(DiscoverySettings {
            disabled_locators: vec!["Conda".to_string()],
            trust_all_interpreters: Some(false),
            ..DiscoverySettings::default()
        });
        assert!(base.is_locator_disabled("conda"));
        assert!(!base.is_locator_disabled("pyenv"));
        assert!(!base.trusts_all_interpreters());
        assert_eq!(base.max_concurrent_probes, Some(DEFAULT_MAX_CONCURRENT_PROBES));
    }
}
