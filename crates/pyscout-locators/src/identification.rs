//! Classify a bare interpreter path into a [`PythonEnvKind`].
//!
//! Checks run from the most specific manager to the most generic layout;
//! the first match wins.

use std::path::Path;

use pyscout_core::paths::{
    poetry_virtualenvs_dir, pyenv_versions_dir, windows_apps_dir, workon_home,
};
use pyscout_core::utils::is_parent_path;
use pyscout_core::{EnvSource, PythonEnvKind};

use crate::fs;
use crate::metadata;

const ACTIVATE_SCRIPTS: [&str; 4] = ["activate", "activate.sh", "activate.ps1", "activate.bat"];

pub async fn identify_environment(executable: &Path, env: &dyn EnvSource) -> PythonEnvKind {
    let env_dir = fs::env_dir_of(executable);

    if metadata::is_conda_prefix(&env_dir).await {
        return if is_conda_base(&env_dir).await {
            PythonEnvKind::CondaBase
        } else {
            PythonEnvKind::Conda
        };
    }
    if is_windows_store_interpreter(executable, env) {
        return PythonEnvKind::WindowsStore;
    }
    if pyenv_versions_dir(env).is_some_and(|dir| is_parent_path(executable, &dir)) {
        return PythonEnvKind::Pyenv;
    }

    let virtual_layout = is_virtual_layout(executable).await;
    if virtual_layout {
        if is_pipenv_environment(&env_dir).await {
            return PythonEnvKind::Pipenv;
        }
        if is_poetry_environment(&env_dir, env).await {
            return PythonEnvKind::Poetry;
        }
        if workon_home(env).is_some_and(|home| is_parent_path(&env_dir, &home) && env_dir != home) {
            return PythonEnvKind::VirtualEnvWrapper;
        }
        if metadata::find_pyvenv_cfg(executable).await.is_some() {
            return PythonEnvKind::Venv;
        }
        return PythonEnvKind::VirtualEnv;
    }

    if cfg!(target_os = "macos") && is_parent_path(executable, Path::new("/usr/bin")) {
        return PythonEnvKind::MacDefault;
    }
    PythonEnvKind::Unknown
}

/// A conda prefix is the base install when it also hosts `condabin` or the
/// `envs` directory of named environments.
pub async fn is_conda_base(prefix: &Path) -> bool {
    fs::is_dir(&prefix.join("condabin")).await || fs::is_dir(&prefix.join("envs")).await
}

pub fn is_windows_store_interpreter(executable: &Path, env: &dyn EnvSource) -> bool {
    if !cfg!(windows) {
        return false;
    }
    if windows_apps_dir(env).is_some_and(|dir| is_parent_path(executable, &dir)) {
        return true;
    }
    let lower = executable.to_string_lossy().to_lowercase();
    lower.contains("\\microsoft\\windowsapps\\") || lower.contains("\\program files\\windowsapps\\")
}

/// Whether the interpreter sits in a virtual environment: a `pyvenv.cfg`
/// governs it or an activation script lives next to it.
pub async fn is_virtual_layout(executable: &Path) -> bool {
    if metadata::find_pyvenv_cfg(executable).await.is_some() {
        return true;
    }
    let Some(dir) = executable.parent() else {
        return false;
    };
    for script in ACTIVATE_SCRIPTS {
        if fs::is_file(&dir.join(script)).await {
            return true;
        }
    }
    false
}

/// Pipenv records the project directory in a `.project` file inside
/// centrally stored environments; in-project environments are a `.venv`
/// beside the `Pipfile`.
async fn is_pipenv_environment(env_dir: &Path) -> bool {
    if let Some(project) = fs::read_to_string(&env_dir.join(".project")).await {
        let project = project.trim();
        if !project.is_empty() && fs::is_file(&Path::new(project).join("Pipfile")).await {
            return true;
        }
    }
    match in_project_root(env_dir) {
        Some(root) => fs::is_file(&root.join("Pipfile")).await,
        None => false,
    }
}

async fn is_poetry_environment(env_dir: &Path, env: &dyn EnvSource) -> bool {
    if poetry_virtualenvs_dir(env)
        .is_some_and(|dir| is_parent_path(env_dir, &dir) && env_dir != dir)
    {
        return true;
    }
    match in_project_root(env_dir) {
        Some(root) => metadata::read_poetry_project(root).await.is_some(),
        None => false,
    }
}

/// The project directory of an in-project `.venv`.
fn in_project_root(env_dir: &Path) -> Option<&Path> {
    let named_venv = env_dir.file_name().is_some_and(|n| n == ".venv");
    if named_venv { env_dir.parent() } else { None }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::metadata::PYVENV_CFG;
    use pyscout_core::StaticEnv;
    use std::path::PathBuf;

    fn touch(path: &Path) {
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, "").unwrap();
    }

    fn venv(dir: &Path) -> PathBuf {
        touch(&dir.join(PYVENV_CFG));
        let exe = dir.join("bin").join("python");
        touch(&exe);
        exe
    }

    #[tokio::test]
    async fn test_conda_and_conda_base() {
        let root = tempfile::tempdir().unwrap();
        let base = root.path().join("miniconda3");
        std::fs::create_dir_all(base.join("conda-meta")).unwrap();
        std::fs::create_dir_all(base.join("condabin")).unwrap();
        let base_exe = base.join("bin").join("python");
        touch(&base_exe);
        let named = base.join("envs").join("data");
        std::fs::create_dir_all(named.join("conda-meta")).unwrap();
        let named_exe = named.join("bin").join("python");
        touch(&named_exe);

        let env = StaticEnv::new();
        assert_eq!(identify_environment(&base_exe, &env).await, PythonEnvKind::CondaBase);
        assert_eq!(identify_environment(&named_exe, &env).await, PythonEnvKind::Conda);
    }

    #[tokio::test]
    async fn test_pyenv_before_venv() {
        let root = tempfile::tempdir().unwrap();
        let exe = venv(&root.path().join("versions").join("3.11.4"));
        let env = StaticEnv::new().with_var("PYENV_ROOT", root.path().to_string_lossy());
        assert_eq!(identify_environment(&exe, &env).await, PythonEnvKind::Pyenv);
    }

    #[tokio::test]
    async fn test_in_project_pipenv_and_poetry() {
        let root = tempfile::tempdir().unwrap();
        let pipenv_project = root.path().join("svc");
        touch(&pipenv_project.join("Pipfile"));
        let pipenv_exe = venv(&pipenv_project.join(".venv"));

        let poetry_project = root.path().join("lib");
        std::fs::create_dir_all(&poetry_project).unwrap();
        let pyproject = poetry_project.join("pyproject.toml");
        std::fs::write(pyproject, "[tool.poetry]\nname = \"lib\"\n").unwrap();
        let poetry_exe = venv(&poetry_project.join(".venv"));

        let env = StaticEnv::new();
        assert_eq!(identify_environment(&pipenv_exe, &env).await, PythonEnvKind::Pipenv);
        assert_eq!(identify_environment(&poetry_exe, &env).await, PythonEnvKind::Poetry);
    }

    #[tokio::test]
    async fn test_central_pipenv_project_file() {
        let root = tempfile::tempdir().unwrap();
        let project = root.path().join("app");
        touch(&project.join("Pipfile"));
        let env_dir = root.path().join("store").join("app-AbCd1234");
        let exe = venv(&env_dir);
        std::fs::write(env_dir.join(".project"), project.to_string_lossy().as_bytes()).unwrap();
        assert_eq!(identify_environment(&exe, &StaticEnv::new()).await, PythonEnvKind::Pipenv);
    }

    #[tokio::test]
    async fn test_wrapper_venv_virtualenv_and_unknown() {
        let root = tempfile::tempdir().unwrap();
        let workon = root.path().join("workon");
        let wrapped = venv(&workon.join("tools"));
        let plain = venv(&root.path().join("plain"));
        let legacy = root.path().join("legacy").join("bin").join("python");
        touch(&legacy);
        touch(&root.path().join("legacy").join("bin").join("activate"));
        let bare = root.path().join("usr").join("bin").join("python3");
        touch(&bare);

        let env = StaticEnv::new().with_var("WORKON_HOME", workon.to_string_lossy());
        assert_eq!(identify_environment(&wrapped, &env).await, PythonEnvKind::VirtualEnvWrapper);
        assert_eq!(identify_environment(&plain, &env).await, PythonEnvKind::Venv);
        assert_eq!(identify_environment(&legacy, &env).await, PythonEnvKind::VirtualEnv);
        assert_eq!(identify_environment(&bare, &env).await, PythonEnvKind::Unknown);
    }
}
