//! Path resolution for pyscout data and for the roots of Python
//! environment managers.
//!
//! # Design
//!
//! - Every resolver takes an [`EnvSource`] so tests never touch process
//!   environment variables
//! - Returns `PathBuf`/`Option<PathBuf>` and `PathError`; nothing here
//!   creates directories
//! - OS-specific defaults are kept private in `platform`

mod env;
mod error;
mod managers;
mod platform;

pub use env::{EnvSource, ProcessEnv, StaticEnv};
pub use error::PathError;
pub use managers::{
    conda_environments_file, conda_known_roots, global_virtualenv_dirs, path_entries,
    poetry_virtualenvs_dir, posix_known_dirs, pyenv_root, pyenv_shims_dir, pyenv_versions_dir,
    windows_apps_dir, workon_home,
};
pub use platform::{DATA_DIR_ENV, STORE_FILE_NAME, data_root, default_store_path};
