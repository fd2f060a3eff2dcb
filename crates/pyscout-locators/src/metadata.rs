//! Environment metadata that can be read without running the interpreter.
//!
//! Covers `pyvenv.cfg`, conda's `conda-meta` records, pyenv version
//! directory names, Windows Store launcher names and poetry's
//! `pyproject.toml`.

use std::path::{Path, PathBuf};

use pyscout_core::PythonVersion;
use toml_edit::{DocumentMut, Item};
use tracing::debug;

use crate::fs;

pub const PYVENV_CFG: &str = "pyvenv.cfg";
pub const CONDA_META: &str = "conda-meta";
pub const PYPROJECT_TOML: &str = "pyproject.toml";

/// Keys of interest from a `pyvenv.cfg` file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PyvenvCfg {
    pub version: Option<PythonVersion>,
    pub home: Option<PathBuf>,
}

/// Parse the `key = value` lines of a `pyvenv.cfg`.
///
/// `version` (written by `venv`) wins over `version_info` (written by
/// `virtualenv`) when both are present.
pub fn parse_pyvenv_cfg(text: &str) -> PyvenvCfg {
    let mut cfg = PyvenvCfg::default();
    let mut version_info = None;
    for line in text.lines() {
        let Some((key, value)) = line.split_once('=') else {
            continue;
        };
        let value = value.trim();
        match key.trim().to_ascii_lowercase().as_str() {
            "version" => cfg.version = PythonVersion::parse(value),
            "version_info" => version_info = PythonVersion::parse(value),
            "home" if !value.is_empty() => cfg.home = Some(PathBuf::from(value)),
            _ => {}
        }
    }
    if cfg.version.is_none() {
        cfg.version = version_info;
    }
    cfg
}

/// Location of the `pyvenv.cfg` governing `executable`: next to it, or one
/// level up.
pub async fn find_pyvenv_cfg(executable: &Path) -> Option<PathBuf> {
    let dir = executable.parent()?;
    for candidate in [dir.join(PYVENV_CFG), dir.parent()?.join(PYVENV_CFG)] {
        if fs::is_file(&candidate).await {
            return Some(candidate);
        }
    }
    None
}

pub async fn read_pyvenv_cfg(executable: &Path) -> Option<PyvenvCfg> {
    let path = find_pyvenv_cfg(executable).await?;
    let text = fs::read_to_string(&path).await?;
    Some(parse_pyvenv_cfg(&text))
}

/// Version from a conda package record name such as
/// `python-3.8.5-h7579374_1.json`.
pub fn parse_conda_python_file_name(name: &str) -> Option<PythonVersion> {
    let rest = name.strip_prefix("python-")?.strip_suffix(".json")?;
    let (version, _build) = rest.split_once('-')?;
    PythonVersion::parse(version)
}

/// Python version installed in the conda prefix at `prefix`.
pub async fn conda_python_version(prefix: &Path) -> Option<PythonVersion> {
    fs::read_dir_entries(&prefix.join(CONDA_META))
        .await
        .iter()
        .filter_map(|entry| entry.file_name()?.to_str())
        .find_map(parse_conda_python_file_name)
}

pub async fn is_conda_prefix(prefix: &Path) -> bool {
    fs::is_dir(&prefix.join(CONDA_META)).await
}

/// A distribution prefix used in pyenv version directory names.
struct PyenvDistro {
    prefix: &'static str,
    org: &'static str,
    /// The text after the first `-` is the Python version rather than the
    /// distribution's own version.
    suffix_is_python_version: bool,
}

const PYENV_DISTROS: &[PyenvDistro] = &[
    PyenvDistro { prefix: "anaconda", org: "Anaconda", suffix_is_python_version: false },
    PyenvDistro { prefix: "miniconda", org: "Anaconda", suffix_is_python_version: false },
    PyenvDistro { prefix: "miniforge", org: "conda-forge", suffix_is_python_version: false },
    PyenvDistro { prefix: "mambaforge", org: "conda-forge", suffix_is_python_version: false },
    PyenvDistro { prefix: "pypy", org: "PyPy", suffix_is_python_version: false },
    PyenvDistro { prefix: "activepython", org: "ActiveState", suffix_is_python_version: true },
    PyenvDistro { prefix: "stackless", org: "Stackless", suffix_is_python_version: true },
    PyenvDistro { prefix: "graalpython", org: "GraalVM", suffix_is_python_version: false },
    PyenvDistro { prefix: "ironpython", org: "IronPython", suffix_is_python_version: true },
    PyenvDistro { prefix: "jython", org: "Jython", suffix_is_python_version: true },
    PyenvDistro { prefix: "micropython", org: "MicroPython", suffix_is_python_version: false },
    PyenvDistro { prefix: "pyston", org: "Pyston", suffix_is_python_version: false },
];

/// What a pyenv version directory name says about its interpreter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PyenvVersionDir {
    pub version: PythonVersion,
    /// Distribution vendor; `None` for plain CPython builds.
    pub org: Option<&'static str>,
    pub distro_version: Option<PythonVersion>,
}

/// Interpret a directory name under `$PYENV_ROOT/versions`.
///
/// `3.8.5` and `3.9.0rc1` are CPython; `anaconda3-2020.07` is Anaconda with
/// Python 3; `pypy3.7-7.3.3` is PyPy for Python 3.7; `activepython-3.6.0`
/// is ActiveState's Python 3.6.0.
pub fn parse_pyenv_version_dir(name: &str) -> PyenvVersionDir {
    if name.starts_with(|c: char| c.is_ascii_digit()) {
        return PyenvVersionDir {
            version: PythonVersion::parse(name).unwrap_or_else(PythonVersion::unknown),
            org: None,
            distro_version: None,
        };
    }

    let lower = name.to_ascii_lowercase();
    let (head, tail) = match lower.split_once('-') {
        Some((head, tail)) => (head, Some(tail)),
        None => (lower.as_str(), None),
    };
    let Some(distro) = PYENV_DISTROS.iter().find(|d| head.starts_with(d.prefix)) else {
        return PyenvVersionDir {
            version: PythonVersion::unknown(),
            org: None,
            distro_version: None,
        };
    };

    let head_version = PythonVersion::parse(&head[distro.prefix.len()..]);
    let tail_version = tail.and_then(PythonVersion::parse);
    let (version, distro_version) = if distro.suffix_is_python_version {
        (head_version.or_else(|| tail_version.clone()), None)
    } else {
        (head_version, tail_version)
    };
    PyenvVersionDir {
        version: version.unwrap_or_else(PythonVersion::unknown),
        org: Some(distro.org),
        distro_version,
    }
}

/// Major/minor version of a Windows Store launcher such as `python3.8.exe`.
pub fn windows_store_launcher_version(name: &str) -> Option<PythonVersion> {
    let lower = name.to_ascii_lowercase();
    let raw = lower.strip_prefix("python")?.strip_suffix(".exe")?;
    let (major, minor) = raw.split_once('.')?;
    let major: i32 = major.parse().ok()?;
    let minor: i32 = minor.parse().ok()?;
    Some(PythonVersion::new(major, minor, -1))
}

/// The parts of a poetry project's `pyproject.toml` the locators use.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoetryProject {
    pub root: PathBuf,
    pub name: Option<String>,
}

/// Parse `text` as a `pyproject.toml` and return the project name when it
/// declares a `[tool.poetry]` table.
pub fn parse_poetry_pyproject(text: &str) -> Option<Option<String>> {
    let doc: DocumentMut = match text.parse() {
        Ok(doc) => doc,
        Err(e) => {
            debug!(error = %e, "Ignoring malformed pyproject.toml");
            return None;
        }
    };
    let poetry = doc.get("tool").and_then(|tool| tool.get("poetry"))?;
    if !poetry.is_table_like() {
        return None;
    }
    let name = poetry
        .get("name")
        .or_else(|| doc.get("project").and_then(|p| p.get("name")))
        .and_then(Item::as_str)
        .map(str::to_string);
    Some(name)
}

/// The poetry project rooted at `dir`, if any.
pub async fn read_poetry_project(dir: &Path) -> Option<PoetryProject> {
    let text = fs::read_to_string(&dir.join(PYPROJECT_TOML)).await?;
    parse_poetry_pyproject(&text).map(|name| PoetryProject {
        root: dir.to_path_buf(),
        name,
    })
}

/// Prefix of the virtualenv directory names poetry creates for a project:
/// the lowercased name with shell-unsafe characters replaced, truncated to
/// 42 characters, followed by `-`.
pub fn poetry_env_name_prefix(project_name: &str) -> String {
    let mut sanitized: String = project_name
        .to_lowercase()
        .chars()
        .map(|c| match c {
            ' ' | '$' | '`' | '!' | '*' | '@' | '"' | '\\' | '\r' | '\n' | '\t' => '_',
            other => other,
        })
        .take(42)
        .collect();
    sanitized.push('-');
    sanitized
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pyvenv_cfg_reads_version_and_home() {
        let cfg = parse_pyvenv_cfg(
            "home = /usr/bin\ninclude-system-site-packages = false\nversion = 3.11.4\n",
        );
        assert_eq!(cfg.version, Some(PythonVersion::new(3, 11, 4)));
        assert_eq!(cfg.home, Some(PathBuf::from("/usr/bin")));

        let cfg = parse_pyvenv_cfg(
            "home = C:\\Python38\nversion_info = 3.8.5.final.0\nvirtualenv = 20.0.31\n",
        );
        assert_eq!(cfg.version, Some(PythonVersion::new(3, 8, 5)));
    }

    #[test]
    fn test_pyvenv_cfg_without_version() {
        assert_eq!(parse_pyvenv_cfg("home = /usr/bin"), PyvenvCfg {
            version: None,
            home: Some(PathBuf::from("/usr/bin")),
        });
    }

    #[test]
    fn test_conda_python_file_name() {
        assert_eq!(
            parse_conda_python_file_name("python-3.8.5-h7579374_1.json"),
            Some(PythonVersion::new(3, 8, 5))
        );
        assert_eq!(parse_conda_python_file_name("python-dateutil-2.8.1-py_0.json"), None);
        assert_eq!(parse_conda_python_file_name("numpy-1.19.1-py38.json"), None);
    }

    #[test]
    fn test_pyenv_cpython_names() {
        let dir = parse_pyenv_version_dir("3.8.5");
        assert_eq!(dir.version, PythonVersion::new(3, 8, 5));
        assert_eq!(dir.org, None);

        let dir = parse_pyenv_version_dir("3.9.0rc1");
        assert_eq!(dir.version.to_string(), "3.9.0rc1");
    }

    #[test]
    fn test_pyenv_distribution_names() {
        let dir = parse_pyenv_version_dir("anaconda3-2020.07");
        assert_eq!(dir.version, PythonVersion::new(3, -1, -1));
        assert_eq!(dir.org, Some("Anaconda"));
        assert_eq!(dir.distro_version, Some(PythonVersion::new(2020, 7, -1)));

        let dir = parse_pyenv_version_dir("pypy3.7-7.3.3");
        assert_eq!(dir.version, PythonVersion::new(3, 7, -1));
        assert_eq!(dir.org, Some("PyPy"));

        let dir = parse_pyenv_version_dir("activepython-3.6.0");
        assert_eq!(dir.version, PythonVersion::new(3, 6, 0));
        assert_eq!(dir.org, Some("ActiveState"));

        let dir = parse_pyenv_version_dir("miniforge3-4.10");
        assert_eq!(dir.org, Some("conda-forge"));

        let dir = parse_pyenv_version_dir("my-custom-build");
        assert!(dir.version.is_unknown());
        assert_eq!(dir.org, None);
    }

    #[test]
    fn test_windows_store_launcher_version() {
        assert_eq!(
            windows_store_launcher_version("python3.10.exe"),
            Some(PythonVersion::new(3, 10, -1))
        );
        assert_eq!(windows_store_launcher_version("python.exe"), None);
        assert_eq!(windows_store_launcher_version("python3.exe"), None);
    }

    #[test]
    fn test_poetry_pyproject_detection() {
        let text = "[tool.poetry]\nname = \"My App\"\nversion = \"0.1.0\"\n";
        assert_eq!(parse_poetry_pyproject(text), Some(Some("My App".to_string())));
        assert_eq!(parse_poetry_pyproject("[project]\nname = \"x\"\n"), None);
        assert_eq!(parse_poetry_pyproject("not toml = = ="), None);
        assert_eq!(poetry_env_name_prefix("My App"), "my_app-");
    }
}
