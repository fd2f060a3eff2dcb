//! Environment kinds and their merge priority.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// The environment manager or technique that characterizes an environment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub enum PythonEnvKind {
    #[default]
    Unknown,
    // "global"
    System,
    MacDefault,
    WindowsStore,
    Pyenv,
    CondaBase,
    OtherGlobal,
    Custom,
    // "virtual"
    Conda,
    VirtualEnv,
    Pipenv,
    Venv,
    VirtualEnvWrapper,
    Poetry,
}

/// Kinds ordered from most to least preferred when two locators report the
/// same environment.
const PRIORITY: [PythonEnvKind; 14] = [
    PythonEnvKind::Pyenv,
    PythonEnvKind::CondaBase,
    PythonEnvKind::Conda,
    PythonEnvKind::WindowsStore,
    PythonEnvKind::Pipenv,
    PythonEnvKind::Poetry,
    PythonEnvKind::Venv,
    PythonEnvKind::VirtualEnvWrapper,
    PythonEnvKind::VirtualEnv,
    PythonEnvKind::OtherGlobal,
    PythonEnvKind::MacDefault,
    PythonEnvKind::System,
    PythonEnvKind::Custom,
    PythonEnvKind::Unknown,
];

impl PythonEnvKind {
    /// All kinds in priority order.
    pub const fn prioritized() -> &'static [Self] {
        &PRIORITY
    }

    /// Position in the priority order; lower ranks win collisions.
    pub fn rank(self) -> usize {
        PRIORITY
            .iter()
            .position(|k| *k == self)
            .unwrap_or(PRIORITY.len())
    }

    /// Whether environments of this kind are isolated from a base interpreter.
    pub const fn is_virtual(self) -> bool {
        matches!(
            self,
            Self::Conda
                | Self::VirtualEnv
                | Self::Pipenv
                | Self::Venv
                | Self::VirtualEnvWrapper
                | Self::Poetry
        )
    }

    /// Stable lowercase identifier used on the command line and in logs.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Unknown => "unknown",
            Self::System => "system",
            Self::MacDefault => "macDefault",
            Self::WindowsStore => "windowsStore",
            Self::Pyenv => "pyenv",
            Self::CondaBase => "condaBase",
            Self::OtherGlobal => "otherGlobal",
            Self::Custom => "custom",
            Self::Conda => "conda",
            Self::VirtualEnv => "virtualenv",
            Self::Pipenv => "pipenv",
            Self::Venv => "venv",
            Self::VirtualEnvWrapper => "virtualenvWrapper",
            Self::Poetry => "poetry",
        }
    }
}

impl fmt::Display for PythonEnvKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PythonEnvKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        PRIORITY
            .iter()
            .copied()
            .find(|k| k.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| format!("unknown environment kind: {s}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_priority_covers_every_kind_once() {
        let mut seen = std::collections::HashSet::new();
        for kind in PythonEnvKind::prioritized() {
            assert!(seen.insert(*kind), "{kind} listed twice");
        }
        assert_eq!(seen.len(), 14);
    }

    #[test]
    fn test_rank_prefers_managers_over_globals() {
        assert!(PythonEnvKind::Conda.rank() < PythonEnvKind::OtherGlobal.rank());
        assert!(PythonEnvKind::Venv.rank() < PythonEnvKind::VirtualEnv.rank());
        assert!(PythonEnvKind::Unknown.rank() > PythonEnvKind::System.rank());
    }

    #[test]
    fn test_parse_is_case_insensitive() {
        assert_eq!("VENV".parse::<PythonEnvKind>(), Ok(PythonEnvKind::Venv));
        assert_eq!(
            "virtualenvwrapper".parse::<PythonEnvKind>(),
            Ok(PythonEnvKind::VirtualEnvWrapper)
        );
        assert!("nope".parse::<PythonEnvKind>().is_err());
    }
}
