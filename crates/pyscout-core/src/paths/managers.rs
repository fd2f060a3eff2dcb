//! Well-known roots of Python environment managers.

use std::path::PathBuf;

use super::env::EnvSource;

fn home_join(env: &dyn EnvSource, parts: &[&str]) -> Option<PathBuf> {
    let mut path = env.home_dir()?;
    for part in parts {
        path.push(part);
    }
    Some(path)
}

/// Directories listed in `PATH`, in order, without duplicates.
pub fn path_entries(env: &dyn EnvSource) -> Vec<PathBuf> {
    let Some(raw) = env.var("PATH") else {
        return Vec::new();
    };
    let mut entries: Vec<PathBuf> = Vec::new();
    for entry in std::env::split_paths(&raw) {
        if !entry.as_os_str().is_empty() && !entries.contains(&entry) {
            entries.push(entry);
        }
    }
    entries
}

/// The pyenv root: `PYENV_ROOT`, then `PYENV`, then `~/.pyenv`
/// (`~/.pyenv/pyenv-win` on Windows).
pub fn pyenv_root(env: &dyn EnvSource) -> Option<PathBuf> {
    if let Some(root) = env.path_var("PYENV_ROOT") {
        return Some(root);
    }
    if let Some(root) = env.path_var("PYENV") {
        return Some(root);
    }
    if cfg!(windows) {
        home_join(env, &[".pyenv", "pyenv-win"])
    } else {
        home_join(env, &[".pyenv"])
    }
}

pub fn pyenv_versions_dir(env: &dyn EnvSource) -> Option<PathBuf> {
    pyenv_root(env).map(|root| root.join("versions"))
}

pub fn pyenv_shims_dir(env: &dyn EnvSource) -> Option<PathBuf> {
    pyenv_root(env).map(|root| root.join("shims"))
}

/// The virtualenvwrapper home: `WORKON_HOME`, else `~/.virtualenvs`
/// (`~/Envs` on Windows).
pub fn workon_home(env: &dyn EnvSource) -> Option<PathBuf> {
    if let Some(home) = env.path_var("WORKON_HOME") {
        return Some(home);
    }
    if cfg!(windows) {
        home_join(env, &["Envs"])
    } else {
        home_join(env, &[".virtualenvs"])
    }
}

/// Directories that conventionally hold global virtual environments.
pub fn global_virtualenv_dirs(env: &dyn EnvSource) -> Vec<PathBuf> {
    let mut dirs = Vec::new();
    if let Some(home) = env.path_var("WORKON_HOME") {
        dirs.push(home);
    }
    let relative: &[&[&str]] = &[
        &["envs"],
        &[".direnv"],
        &[".venvs"],
        &[".virtualenvs"],
        &[".local", "share", "virtualenvs"],
    ];
    for parts in relative {
        if let Some(dir) = home_join(env, parts) {
            if !dirs.contains(&dir) {
                dirs.push(dir);
            }
        }
    }
    if cfg!(windows) {
        if let Some(dir) = home_join(env, &["Envs"]) {
            if !dirs.contains(&dir) {
                dirs.push(dir);
            }
        }
    }
    dirs
}

/// `~/.conda/environments.txt`, conda's registry of created environments.
pub fn conda_environments_file(env: &dyn EnvSource) -> Option<PathBuf> {
    home_join(env, &[".conda", "environments.txt"])
}

/// Common conda installation roots.
pub fn conda_known_roots(env: &dyn EnvSource) -> Vec<PathBuf> {
    const NAMES: [&str; 6] = [
        "anaconda",
        "anaconda3",
        "miniconda",
        "miniconda3",
        "miniforge3",
        "mambaforge",
    ];
    let mut roots = Vec::new();
    if let Some(home) = env.home_dir() {
        roots.extend(NAMES.iter().map(|name| home.join(name)));
        roots.push(home.join(".conda"));
    }
    if cfg!(windows) {
        if let Some(program_data) = env.path_var("PROGRAMDATA") {
            roots.extend(NAMES.iter().map(|name| program_data.join(name)));
        }
    } else {
        roots.extend(NAMES.iter().map(|name| PathBuf::from("/opt").join(name)));
        roots.extend(NAMES.iter().map(|name| PathBuf::from("/usr/local").join(name)));
    }
    roots
}

/// Poetry's shared virtualenvs directory.
pub fn poetry_virtualenvs_dir(env: &dyn EnvSource) -> Option<PathBuf> {
    if let Some(dir) = env.path_var("POETRY_VIRTUALENVS_PATH") {
        return Some(dir);
    }
    if cfg!(windows) {
        return env
            .path_var("LOCALAPPDATA")
            .map(|local| local.join("pypoetry").join("Cache").join("virtualenvs"));
    }
    if cfg!(target_os = "macos") {
        return home_join(env, &["Library", "Caches", "pypoetry", "virtualenvs"]);
    }
    env.path_var("XDG_CACHE_HOME")
        .or_else(|| home_join(env, &[".cache"]))
        .map(|cache| cache.join("pypoetry").join("virtualenvs"))
}

/// `%LOCALAPPDATA%\Microsoft\WindowsApps`, home of Store launchers.
pub fn windows_apps_dir(env: &dyn EnvSource) -> Option<PathBuf> {
    env.path_var("LOCALAPPDATA")
        .map(|local| local.join("Microsoft").join("WindowsApps"))
}

/// Standard interpreter directories on POSIX systems.
pub fn posix_known_dirs(env: &dyn EnvSource) -> Vec<PathBuf> {
    let mut dirs: Vec<PathBuf> = [
        "/usr/bin",
        "/usr/local/bin",
        "/bin",
        "/opt/homebrew/bin",
        "/opt/local/bin",
    ]
    .iter()
    .map(PathBuf::from)
    .collect();
    if let Some(local_bin) = home_join(env, &[".local", "bin"]) {
        dirs.push(local_bin);
    }
    dirs
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::paths::StaticEnv;

    #[test]
    fn test_pyenv_root_precedence() {
        let env = StaticEnv::new()
            .with_home("/home/u")
            .with_var("PYENV", "/opt/pyenv")
            .with_var("PYENV_ROOT", "/srv/pyenv");
        assert_eq!(pyenv_root(&env), Some(PathBuf::from("/srv/pyenv")));

        let env = StaticEnv::new().with_home("/home/u").with_var("PYENV", "/opt/pyenv");
        assert_eq!(pyenv_root(&env), Some(PathBuf::from("/opt/pyenv")));
        assert_eq!(
            pyenv_versions_dir(&env),
            Some(PathBuf::from("/opt/pyenv").join("versions"))
        );
    }

    #[test]
    fn test_workon_home_override() {
        let env = StaticEnv::new()
            .with_home("/home/u")
            .with_var("WORKON_HOME", "/data/venvs");
        assert_eq!(workon_home(&env), Some(PathBuf::from("/data/venvs")));
        let dirs = global_virtualenv_dirs(&env);
        assert_eq!(dirs[0], PathBuf::from("/data/venvs"));
        assert!(dirs.contains(&PathBuf::from("/home/u").join(".virtualenvs")));
    }

    #[test]
    fn test_path_entries_dedup_and_skip_empty() {
        let joined = std::env::join_paths(["/a", "/b", "/a"]).unwrap();
        let env = StaticEnv::new().with_var("PATH", joined.to_string_lossy());
        assert_eq!(
            path_entries(&env),
            vec![PathBuf::from("/a"), PathBuf::from("/b")]
        );
        assert!(path_entries(&StaticEnv::new()).is_empty());
    }

    #[test]
    fn test_no_home_means_no_home_relative_roots() {
        let env = StaticEnv::new();
        assert!(conda_environments_file(&env).is_none());
        assert!(global_virtualenv_dirs(&env).is_empty());
    }
}
