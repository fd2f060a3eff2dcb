//! Python version numbers with explicit "unknown" sentinels.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Sentinel for a version component that has not been determined.
///
/// `-1` means "unknown", never "zero".
pub const UNKNOWN_COMPONENT: i32 = -1;

/// Release level as reported by `sys.version_info.releaselevel`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReleaseLevel {
    Alpha,
    Beta,
    Candidate,
    Final,
}

impl ReleaseLevel {
    /// Parse the long (`candidate`) or short (`rc`) spelling.
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.to_ascii_lowercase().as_str() {
            "alpha" | "a" => Some(Self::Alpha),
            "beta" | "b" => Some(Self::Beta),
            "candidate" | "rc" | "c" => Some(Self::Candidate),
            "final" | "f" => Some(Self::Final),
            _ => None,
        }
    }

    const fn short(self) -> &'static str {
        match self {
            Self::Alpha => "a",
            Self::Beta => "b",
            Self::Candidate => "rc",
            Self::Final => "",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PythonVersionRelease {
    pub level: ReleaseLevel,
    pub serial: i32,
}

/// Version of a Python interpreter.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PythonVersion {
    pub major: i32,
    pub minor: i32,
    pub micro: i32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub release: Option<PythonVersionRelease>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sys_version: Option<String>,
}

impl Default for PythonVersion {
    fn default() -> Self {
        Self::unknown()
    }
}

impl PythonVersion {
    /// A version with every component unknown.
    pub const fn unknown() -> Self {
        Self {
            major: UNKNOWN_COMPONENT,
            minor: UNKNOWN_COMPONENT,
            micro: UNKNOWN_COMPONENT,
            release: None,
            sys_version: None,
        }
    }

    #[must_use]
    pub const fn new(major: i32, minor: i32, micro: i32) -> Self {
        Self {
            major,
            minor,
            micro,
            release: None,
            sys_version: None,
        }
    }

    #[must_use]
    pub const fn with_release(mut self, level: ReleaseLevel, serial: i32) -> Self {
        self.release = Some(PythonVersionRelease { level, serial });
        self
    }

    pub const fn is_unknown(&self) -> bool {
        self.major < 0
    }

    /// Parse a dotted version such as `3.8`, `3.8.5`, `3.9.0rc1` or
    /// `3.10.0a2`. Trailing build decorations (`+`, `-debug`) are ignored.
    pub fn parse(raw: &str) -> Option<Self> {
        let raw = raw.trim();
        let core_end = raw
            .find(|c: char| !(c.is_ascii_digit() || c == '.' || c.is_ascii_alphabetic()))
            .unwrap_or(raw.len());
        let core = &raw[..core_end];
        if !core.starts_with(|c: char| c.is_ascii_digit()) {
            return None;
        }

        let mut version = Self::unknown();
        let mut rest = core;
        for slot in 0..3 {
            let digits_end = rest
                .find(|c: char| !c.is_ascii_digit())
                .unwrap_or(rest.len());
            if digits_end == 0 {
                break;
            }
            let value: i32 = rest[..digits_end].parse().ok()?;
            match slot {
                0 => version.major = value,
                1 => version.minor = value,
                _ => version.micro = value,
            }
            rest = &rest[digits_end..];
            match rest.strip_prefix('.') {
                Some(next) if slot < 2 => rest = next,
                _ => break,
            }
        }

        if !rest.is_empty() {
            let level_end = rest
                .find(|c: char| c.is_ascii_digit())
                .unwrap_or(rest.len());
            if let Some(level) = ReleaseLevel::parse(&rest[..level_end]) {
                let serial = rest[level_end..].parse().unwrap_or(0);
                version.release = Some(PythonVersionRelease { level, serial });
            }
        }
        Some(version)
    }

    /// Weighted measure of how much of the version is known. Each weight
    /// exceeds the sum of all weights below it.
    pub fn specificity(&self) -> u32 {
        let mut score = 0;
        if self.major >= 0 {
            score += 20;
        }
        if self.minor >= 0 {
            score += 10;
        }
        if self.micro >= 0 {
            score += 5;
        }
        if self.release.is_some() {
            score += 3;
        }
        let has_serial = self.release.is_some_and(|r| r.serial > 0);
        if has_serial || self.sys_version.as_deref().is_some_and(|s| !s.is_empty()) {
            score += 1;
        }
        score
    }

    /// Exact match of the numeric components and release.
    pub fn is_identical(&self, other: &Self) -> bool {
        self.major == other.major
            && self.minor == other.minor
            && self.micro == other.micro
            && self.release == other.release
    }

    /// Match that tolerates components one side does not know yet.
    pub fn is_equivalent(&self, other: &Self) -> bool {
        // Python 2 installs are assumed to be 2.7.
        if self.major == 2 && other.major == 2 {
            return true;
        }
        if self.minor < 0 || other.minor < 0 {
            return self.major == other.major;
        }
        if self.micro < 0 || other.micro < 0 {
            return self.major == other.major && self.minor == other.minor;
        }
        self.is_identical(other)
    }
}

impl fmt::Display for PythonVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_unknown() {
            return f.write_str("unknown");
        }
        write!(f, "{}", self.major)?;
        if self.minor >= 0 {
            write!(f, ".{}", self.minor)?;
            if self.micro >= 0 {
                write!(f, ".{}", self.micro)?;
            }
        }
        if let Some(release) = &self.release {
            if release.level != ReleaseLevel::Final {
                write!(f, "{}{}", release.level.short(), release.serial.max(0))?;
            }
        }
        Ok(())
    }
}
