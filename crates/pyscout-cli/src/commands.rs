//! Subcommands.

use std::path::PathBuf;

use clap::Subcommand;
use pyscout_core::PythonEnvKind;

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// List known environments
    List {
        /// Only show environments of this kind (repeatable)
        #[arg(long = "kind")]
        kinds: Vec<PythonEnvKind>,
        /// With --root, also show environments not found under a root
        #[arg(long)]
        include_non_rooted: bool,
        /// Rediscover instead of reading the cache
        #[arg(long)]
        refresh: bool,
    },

    /// Resolve a single interpreter path
    Resolve {
        /// Path to a Python executable
        path: PathBuf,
    },

    /// Rediscover every environment and print what changed
    Refresh,

    /// Print collection changes as environments appear and disappear
    Watch,

    /// Show every locator and whether it is enabled
    Locators,
}
