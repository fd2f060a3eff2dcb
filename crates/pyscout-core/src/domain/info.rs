//! The canonical environment record and the heuristics that compare and
//! combine records reported by different locators.

use std::ops::Deref;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use super::kind::PythonEnvKind;
use super::version::PythonVersion;
use crate::utils::{are_paths_same, parent_dir};

/// Sentinel for an unknown file timestamp.
pub const UNKNOWN_TIMESTAMP: i64 = -1;

/// Interpreter bitness.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Architecture {
    #[default]
    Unknown,
    X86,
    X64,
}

/// How an environment came to be known. Accumulates across merges.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PythonEnvSource {
    PathEnvVar,
    KnownPath,
    WindowsRegistry,
    WindowsStore,
    Conda,
    Pyenv,
    Poetry,
    WorkspaceVirtualEnv,
    GlobalVirtualEnv,
    Resolved,
    Other,
}

/// The interpreter binary backing an environment.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PythonExecutableInfo {
    /// Absolute path of the interpreter. Empty means unknown.
    pub filename: PathBuf,
    /// `sys.prefix` of the interpreter. Empty means unknown.
    pub sys_prefix: PathBuf,
    /// Creation time in milliseconds since the epoch.
    pub ctime: i64,
    /// Modification time in milliseconds since the epoch.
    pub mtime: i64,
}

impl Default for PythonExecutableInfo {
    fn default() -> Self {
        Self {
            filename: PathBuf::new(),
            sys_prefix: PathBuf::new(),
            ctime: UNKNOWN_TIMESTAMP,
            mtime: UNKNOWN_TIMESTAMP,
        }
    }
}

impl PythonExecutableInfo {
    pub fn new(filename: impl Into<PathBuf>) -> Self {
        Self {
            filename: filename.into(),
            ..Self::default()
        }
    }

    /// Whether both records carry a modification time and they differ,
    /// meaning the binary was replaced since `other` was observed.
    pub const fn modified_since(&self, other: &Self) -> bool {
        self.mtime != UNKNOWN_TIMESTAMP
            && other.mtime != UNKNOWN_TIMESTAMP
            && self.mtime != other.mtime
    }

    fn specificity(&self) -> u32 {
        let mut score = 0;
        if !self.filename.as_os_str().is_empty() {
            score += 5;
        }
        if self.mtime != UNKNOWN_TIMESTAMP {
            score += 2;
        }
        if self.ctime != UNKNOWN_TIMESTAMP {
            score += 1;
        }
        score
    }
}

/// A named distribution (Anaconda, PSF, PyPy, ...).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct PythonDistroInfo {
    /// Publishing organization. Empty means "no named distribution".
    pub org: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_display_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bin_dir: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<PythonVersion>,
}

impl PythonDistroInfo {
    pub fn new(org: impl Into<String>) -> Self {
        Self {
            org: org.into(),
            ..Self::default()
        }
    }

    fn specificity(&self) -> u32 {
        let mut score = 0;
        if !self.org.is_empty() {
            score += 20;
        }
        if self.default_display_name.as_deref().is_some_and(|n| !n.is_empty()) {
            score += 10;
        }
        if self.bin_dir.is_some() {
            score += 5;
        }
        if self.version.is_some() {
            score += 2;
        }
        score
    }
}

/// Everything known about one Python environment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PythonEnvInfo {
    pub kind: PythonEnvKind,
    pub executable: PythonExecutableInfo,
    /// Environment name (conda env name, venv directory name). Display only.
    pub name: String,
    /// Directory containing the environment. Empty means unknown.
    pub location: PathBuf,
    /// Root under which the environment was discovered. `None` means the
    /// environment is non-rooted (system wide or found through `$PATH`).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub search_location: Option<PathBuf>,
    pub version: PythonVersion,
    pub arch: Architecture,
    pub distro: PythonDistroInfo,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_display_name: Option<String>,
    pub source: Vec<PythonEnvSource>,
}

impl Default for PythonEnvInfo {
    fn default() -> Self {
        build_env_info(EnvInit::default())
    }
}

impl PythonEnvInfo {
    pub fn filename(&self) -> &Path {
        &self.executable.filename
    }

    /// Record a provenance tag once.
    pub fn add_source(&mut self, source: PythonEnvSource) {
        if !self.source.contains(&source) {
            self.source.push(source);
        }
    }

    /// Human readable label, e.g. `Python 3.8.5 64-bit ('proj': venv)`.
    pub fn display_name(&self) -> String {
        if let Some(name) = self.default_display_name.as_deref().filter(|n| !n.is_empty()) {
            return name.to_string();
        }
        let mut label = String::from("Python");
        if !self.version.is_unknown() {
            label.push(' ');
            label.push_str(&self.version.to_string());
        }
        match self.arch {
            Architecture::X64 => label.push_str(" 64-bit"),
            Architecture::X86 => label.push_str(" 32-bit"),
            Architecture::Unknown => {}
        }
        let env_name = if self.name.is_empty() {
            None
        } else {
            Some(self.name.as_str())
        };
        match (env_name, self.kind) {
            (Some(name), kind) => label.push_str(&format!(" ('{name}': {kind})")),
            (None, PythonEnvKind::Unknown) => {}
            (None, kind) => label.push_str(&format!(" ({kind})")),
        }
        label
    }
}

/// Fields that may be supplied when building or copying a record.
#[derive(Debug, Clone, Default)]
pub struct EnvInit {
    pub kind: Option<PythonEnvKind>,
    pub executable: Option<PathBuf>,
    pub name: Option<String>,
    pub location: Option<PathBuf>,
    pub search_location: Option<PathBuf>,
    pub version: Option<PythonVersion>,
    pub org: Option<String>,
    pub arch: Option<Architecture>,
    pub source: Option<PythonEnvSource>,
}

impl EnvInit {
    pub fn executable(path: impl Into<PathBuf>) -> Self {
        Self {
            executable: Some(path.into()),
            ..Self::default()
        }
    }

    #[must_use]
    pub const fn with_kind(mut self, kind: PythonEnvKind) -> Self {
        self.kind = Some(kind);
        self
    }

    #[must_use]
    pub fn with_location(mut self, location: impl Into<PathBuf>) -> Self {
        self.location = Some(location.into());
        self
    }

    #[must_use]
    pub fn with_search_location(mut self, root: impl Into<PathBuf>) -> Self {
        self.search_location = Some(root.into());
        self
    }

    #[must_use]
    pub fn with_version(mut self, version: PythonVersion) -> Self {
        self.version = Some(version);
        self
    }

    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    #[must_use]
    pub fn with_org(mut self, org: impl Into<String>) -> Self {
        self.org = Some(org.into());
        self
    }

    #[must_use]
    pub const fn with_source(mut self, source: PythonEnvSource) -> Self {
        self.source = Some(source);
        self
    }

    fn apply(self, env: &mut PythonEnvInfo) {
        if let Some(kind) = self.kind {
            env.kind = kind;
        }
        if let Some(filename) = self.executable {
            env.executable.filename = filename;
        }
        if let Some(name) = self.name {
            env.name = name;
        }
        if let Some(location) = self.location {
            env.location = location;
        }
        if let Some(root) = self.search_location {
            env.search_location = Some(root);
        }
        if let Some(version) = self.version {
            env.version = version;
        }
        if let Some(org) = self.org {
            env.distro.org = org;
        }
        if let Some(arch) = self.arch {
            env.arch = arch;
        }
        if let Some(source) = self.source {
            env.add_source(source);
        }
    }
}

/// Build a blank record (every version field unknown) overlaid with `init`.
pub fn build_env_info(init: EnvInit) -> PythonEnvInfo {
    let mut env = PythonEnvInfo {
        kind: PythonEnvKind::Unknown,
        executable: PythonExecutableInfo::default(),
        name: String::new(),
        location: PathBuf::new(),
        search_location: None,
        version: PythonVersion::unknown(),
        arch: Architecture::Unknown,
        distro: PythonDistroInfo::default(),
        default_display_name: None,
        source: Vec::new(),
    };
    init.apply(&mut env);
    env
}

/// Clone `env` and overlay `updates`. The input is never modified.
pub fn copy_env_info(env: &PythonEnvInfo, updates: Option<EnvInit>) -> PythonEnvInfo {
    let mut copy = env.clone();
    if let Some(updates) = updates {
        updates.apply(&mut copy);
    }
    copy
}

/// Something that can identify an environment: a bare interpreter path or
/// a (possibly partial) record.
#[derive(Debug, Clone, Copy)]
pub enum EnvRef<'a> {
    Path(&'a Path),
    Info(&'a PythonEnvInfo),
}

impl<'a> From<&'a Path> for EnvRef<'a> {
    fn from(path: &'a Path) -> Self {
        Self::Path(path)
    }
}

impl<'a> From<&'a PathBuf> for EnvRef<'a> {
    fn from(path: &'a PathBuf) -> Self {
        Self::Path(path.as_path())
    }
}

impl<'a> From<&'a PythonEnvInfo> for EnvRef<'a> {
    fn from(env: &'a PythonEnvInfo) -> Self {
        Self::Info(env)
    }
}

impl<'a> From<&'a PythonEnvCompleteInfo> for EnvRef<'a> {
    fn from(env: &'a PythonEnvCompleteInfo) -> Self {
        Self::Info(&env.env)
    }
}

impl<'a> EnvRef<'a> {
    fn filename(&self) -> &'a Path {
        match *self {
            Self::Path(path) => path,
            Self::Info(env) => &env.executable.filename,
        }
    }

    fn version(&self) -> Option<&'a PythonVersion> {
        match *self {
            Self::Path(_) => None,
            Self::Info(env) => Some(&env.version),
        }
    }
}

/// Normalize a path or partial record into a record carrying at least the
/// executable filename. Returns `None` when the filename is empty; nothing
/// without a filename can be compared, cached or deduplicated.
pub fn get_minimal_partial_info<'a>(env: impl Into<EnvRef<'a>>) -> Option<PythonEnvInfo> {
    match env.into() {
        EnvRef::Path(path) if path.as_os_str().is_empty() => None,
        EnvRef::Path(path) => Some(build_env_info(EnvInit::executable(path))),
        EnvRef::Info(info) if info.executable.filename.as_os_str().is_empty() => None,
        EnvRef::Info(info) => Some(info.clone()),
    }
}

/// Decide whether two references denote the same environment.
///
/// Returns `None` when either side lacks a filename (incomparable). Callers
/// must branch on all three outcomes.
pub fn are_same_env<'a, 'b>(
    left: impl Into<EnvRef<'a>>,
    right: impl Into<EnvRef<'b>>,
    allow_partial_match: bool,
) -> Option<bool> {
    let left = left.into();
    let right = right.into();
    let left_file = left.filename();
    let right_file = right.filename();
    if left_file.as_os_str().is_empty() || right_file.as_os_str().is_empty() {
        return None;
    }

    if are_paths_same(left_file, right_file) {
        return Some(true);
    }

    // Several launchers in one directory (Windows Store, python/python3)
    // are the same environment when their versions agree.
    if are_paths_same(parent_dir(left_file), parent_dir(right_file)) {
        if let (Some(lv), Some(rv)) = (left.version(), right.version()) {
            if lv.is_identical(rv) || (allow_partial_match && lv.is_equivalent(rv)) {
                return Some(true);
            }
        }
    }
    Some(false)
}

fn pick_non_empty(target: &Path, other: &Path) -> PathBuf {
    if target.as_os_str().is_empty() {
        other.to_path_buf()
    } else {
        target.to_path_buf()
    }
}

/// Merge `other` into a copy of `target`, keeping whichever side carries
/// more information for each field. `kind` always comes from `target`.
pub fn merge_environments(target: &PythonEnvInfo, other: &PythonEnvInfo) -> PythonEnvInfo {
    let mut merged = target.clone();

    if other.version.specificity() > target.version.specificity() {
        merged.version = other.version.clone();
    }
    if other.executable.specificity() > target.executable.specificity() {
        merged.executable = other.executable.clone();
    }
    if merged.executable.sys_prefix.as_os_str().is_empty() {
        merged.executable.sys_prefix = pick_non_empty(
            &target.executable.sys_prefix,
            &other.executable.sys_prefix,
        );
    }
    if other.distro.specificity() > target.distro.specificity() {
        merged.distro = other.distro.clone();
    }

    merged.location = pick_non_empty(&target.location, &other.location);
    if merged.name.is_empty() {
        merged.name.clone_from(&other.name);
    }
    if merged.search_location.is_none() {
        merged.search_location.clone_from(&other.search_location);
    }
    if merged.arch == Architecture::Unknown {
        merged.arch = other.arch;
    }
    if merged.default_display_name.is_none() {
        merged.default_display_name.clone_from(&other.default_display_name);
    }
    for source in &other.source {
        merged.add_source(*source);
    }
    merged
}

/// Collapse two sightings of the same environment: the side whose kind has
/// higher priority becomes the merge target. Ties favor `existing`.
pub fn resolve_env_collision(existing: &PythonEnvInfo, incoming: &PythonEnvInfo) -> PythonEnvInfo {
    if incoming.kind.rank() < existing.kind.rank() {
        merge_environments(incoming, existing)
    } else {
        merge_environments(existing, incoming)
    }
}

/// Cache variant of [`PythonEnvInfo`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PythonEnvCompleteInfo {
    #[serde(flatten)]
    pub env: PythonEnvInfo,
    #[serde(default)]
    pub has_complete_info: bool,
}

impl PythonEnvCompleteInfo {
    pub const fn new(env: PythonEnvInfo, has_complete_info: bool) -> Self {
        Self {
            env,
            has_complete_info,
        }
    }

    pub fn into_inner(self) -> PythonEnvInfo {
        self.env
    }
}

impl Deref for PythonEnvCompleteInfo {
    type Target = PythonEnvInfo;

    fn deref(&self) -> &Self::Target {
        &self.env
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::version::ReleaseLevel;

    fn env(path: &str, kind: PythonEnvKind, version: PythonVersion) -> PythonEnvInfo {
        build_env_info(EnvInit::executable(path).with_kind(kind).with_version(version))
    }

    #[test]
    fn test_build_env_info_uses_sentinels() {
        let info = build_env_info(EnvInit::default());
        assert_eq!(info.version.major, -1);
        assert_eq!(info.version.minor, -1);
        assert_eq!(info.version.micro, -1);
        assert_eq!(info.arch, Architecture::Unknown);
        assert_eq!(info.kind, PythonEnvKind::Unknown);
        assert_eq!(info.executable.mtime, UNKNOWN_TIMESTAMP);
    }

    #[test]
    fn test_copy_env_info_does_not_mutate_input() {
        let original = env("/e/bin/python", PythonEnvKind::Venv, PythonVersion::new(3, 9, 1));
        let copy = copy_env_info(&original, Some(EnvInit::default().with_name("renamed")));
        assert_eq!(copy.name, "renamed");
        assert!(original.name.is_empty());
        assert_eq!(copy.version, original.version);
    }

    #[test]
    fn test_minimal_info_gate() {
        assert!(get_minimal_partial_info(Path::new("")).is_none());
        assert!(get_minimal_partial_info(&build_env_info(EnvInit::default())).is_none());
        assert!(get_minimal_partial_info(&build_env_info(EnvInit::executable(""))).is_none());

        let from_path = get_minimal_partial_info(Path::new("/x/python")).unwrap();
        assert_eq!(from_path.filename(), Path::new("/x/python"));
        let partial = build_env_info(EnvInit::executable("/y/python"));
        assert!(get_minimal_partial_info(&partial).is_some());
    }

    #[test]
    fn test_same_env_exact_path() {
        let a = env("/e/bin/python", PythonEnvKind::Venv, PythonVersion::unknown());
        let b = env("/e/bin/python", PythonEnvKind::OtherGlobal, PythonVersion::new(3, 8, 0));
        assert_eq!(are_same_env(&a, &b, true), Some(true));
        assert_eq!(are_same_env(Path::new("/e/bin/python"), &b, true), Some(true));
    }

    #[test]
    fn test_same_env_incomparable_without_filename() {
        let blank = build_env_info(EnvInit::default());
        let a = env("/e/bin/python", PythonEnvKind::Venv, PythonVersion::unknown());
        assert_eq!(are_same_env(&blank, &a, true), None);
        assert_eq!(are_same_env(&a, &blank, true), None);
        assert_eq!(are_same_env(Path::new(""), Path::new(""), true), None);
    }

    #[test]
    fn test_same_env_sibling_launchers_with_matching_versions() {
        let store = "C:/Users/u/AppData/Local/Microsoft/WindowsApps";
        let launcher = |name: &str, version| {
            env(&format!("{store}/{name}"), PythonEnvKind::WindowsStore, version)
        };
        let a = launcher("python3.exe", PythonVersion::new(3, 8, 5));
        let b = launcher("python3.8.exe", PythonVersion::new(3, 8, -1));
        let c = launcher("python3.9.exe", PythonVersion::new(3, 9, -1));
        assert_eq!(are_same_env(&a, &b, true), Some(true));
        assert_eq!(are_same_env(&a, &b, false), Some(false));
        assert_eq!(are_same_env(&a, &c, true), Some(false));
        // A bare path carries no version, so only an exact match counts.
        assert_eq!(are_same_env(Path::new(&format!("{store}/python3.exe")), &b, true), Some(false));
    }

    #[test]
    fn test_same_env_is_symmetric() {
        let samples = vec![
            build_env_info(EnvInit::default()),
            env("/a/bin/python", PythonEnvKind::Venv, PythonVersion::new(3, 8, 5)),
            env("/a/bin/python3", PythonEnvKind::Venv, PythonVersion::new(3, 8, -1)),
            env("/a/bin/python3.9", PythonEnvKind::Venv, PythonVersion::new(3, 9, 0)),
            env("/b/bin/python", PythonEnvKind::Conda, PythonVersion::unknown()),
            env("/a/bin/python2", PythonEnvKind::System, PythonVersion::new(2, 7, 18)),
        ];
        for left in &samples {
            for right in &samples {
                for partial in [true, false] {
                    assert_eq!(
                        are_same_env(left, right, partial),
                        are_same_env(right, left, partial),
                        "{:?} vs {:?}",
                        left.filename(),
                        right.filename()
                    );
                }
            }
        }
    }

    #[test]
    fn test_merge_is_idempotent() {
        let mut a = env("/e/bin/python", PythonEnvKind::Conda, PythonVersion::new(3, 8, 5));
        a.name = "e".to_string();
        a.distro = PythonDistroInfo::new("Anaconda, Inc.");
        a.add_source(PythonEnvSource::Conda);
        assert_eq!(merge_environments(&a, &a), a);
    }

    #[test]
    fn test_merge_keeps_more_specific_fields_and_target_kind() {
        let mut sparse = env("/e/bin/python", PythonEnvKind::Venv, PythonVersion::new(3, -1, -1));
        sparse.add_source(PythonEnvSource::PathEnvVar);
        let mut rich = env(
            "/e/bin/python",
            PythonEnvKind::OtherGlobal,
            PythonVersion::new(3, 8, 5).with_release(ReleaseLevel::Final, 0),
        );
        rich.executable.mtime = 10;
        rich.arch = Architecture::X64;
        rich.distro = PythonDistroInfo::new("PSF");
        rich.add_source(PythonEnvSource::KnownPath);

        let merged = merge_environments(&sparse, &rich);
        assert_eq!(merged.kind, PythonEnvKind::Venv);
        assert_eq!(merged.version, rich.version);
        assert_eq!(merged.executable.mtime, 10);
        assert_eq!(merged.arch, Architecture::X64);
        assert_eq!(merged.distro.org, "PSF");
        assert_eq!(
            merged.source,
            vec![PythonEnvSource::PathEnvVar, PythonEnvSource::KnownPath]
        );

        for (left, right) in [(&sparse, &rich), (&rich, &sparse)] {
            let merged = merge_environments(left, right);
            assert!(
                merged.version.specificity()
                    >= left.version.specificity().max(right.version.specificity())
            );
        }
    }

    #[test]
    fn test_collision_prefers_higher_priority_kind() {
        let from_path = env(
            "/c/envs/x/bin/python",
            PythonEnvKind::OtherGlobal,
            PythonVersion::new(3, 8, 5),
        );
        let from_conda =
            env("/c/envs/x/bin/python", PythonEnvKind::Conda, PythonVersion::unknown());
        let resolved = resolve_env_collision(&from_path, &from_conda);
        assert_eq!(resolved.kind, PythonEnvKind::Conda);
        assert_eq!(resolved.version, PythonVersion::new(3, 8, 5));
        let reversed = resolve_env_collision(&from_conda, &from_path);
        assert_eq!(reversed.kind, PythonEnvKind::Conda);
    }

    #[test]
    fn test_complete_info_serializes_flat() {
        let entry = PythonEnvCompleteInfo::new(
            env("/e/bin/python", PythonEnvKind::Venv, PythonVersion::new(3, 10, 2)),
            true,
        );
        let json = serde_json::to_value(&entry).unwrap();
        assert_eq!(json["hasCompleteInfo"], true);
        assert_eq!(json["kind"], "venv");
        assert_eq!(json["version"]["major"], 3);
        let back: PythonEnvCompleteInfo = serde_json::from_value(json).unwrap();
        assert_eq!(back, entry);
    }

    #[test]
    fn test_display_name() {
        let mut info = env("/p/.venv/bin/python", PythonEnvKind::Venv, PythonVersion::new(3, 8, 5));
        info.arch = Architecture::X64;
        info.name = ".venv".to_string();
        assert_eq!(info.display_name(), "Python 3.8.5 64-bit ('.venv': venv)");
    }
}
