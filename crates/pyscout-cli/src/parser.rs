//! Root CLI structure with the global options.

use std::path::PathBuf;

use clap::Parser;

use crate::commands::Commands;

/// Discover, resolve and watch Python environments.
#[derive(Debug, Parser)]
#[command(name = "pyscout")]
#[command(about = "Discover, resolve and watch Python environments")]
#[command(version)]
pub struct Cli {
    /// Workspace folder searched for project environments (repeatable)
    #[arg(long = "root", global = true)]
    pub roots: Vec<PathBuf>,

    /// Location of the persisted environment cache
    #[arg(long, global = true, env = "PYSCOUT_STORE")]
    pub store: Option<PathBuf>,

    /// Keep the environment cache in memory for this run only
    #[arg(long = "no-store", global = true, conflicts_with = "store")]
    pub no_store: bool,

    /// JSON file with discovery settings
    #[arg(long, global = true, env = "PYSCOUT_CONFIG")]
    pub config: Option<PathBuf>,

    /// Print machine-readable JSON
    #[arg(long, global = true)]
    pub json: bool,

    /// Enable debug logging for pyscout crates
    #[arg(short = 'v', long = "verbose", global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;
    use pyscout_core::PythonEnvKind;

    #[test]
    fn test_cli_parser_builds() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_global_args_after_subcommand() {
        let cli = Cli::parse_from([
            "pyscout", "list", "--root", "/w/a", "--root", "/w/b", "--kind", "venv", "--kind",
            "conda", "--json",
        ]);
        assert_eq!(cli.roots, vec![PathBuf::from("/w/a"), PathBuf::from("/w/b")]);
        assert!(cli.json);
        match cli.command {
            Some(Commands::List { kinds, refresh, .. }) => {
                assert_eq!(kinds, vec![PythonEnvKind::Venv, PythonEnvKind::Conda]);
                assert!(!refresh);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn test_unknown_kind_is_rejected() {
        assert!(Cli::try_parse_from(["pyscout", "list", "--kind", "snake"]).is_err());
    }

    #[test]
    fn test_no_store_conflicts_with_store() {
        let cli = Cli::parse_from(["pyscout", "refresh", "--no-store"]);
        assert!(cli.no_store);
        let both = ["pyscout", "--store", "/tmp/x.json", "--no-store", "refresh"];
        assert!(Cli::try_parse_from(both).is_err());
    }

    #[test]
    fn test_resolve_requires_path() {
        assert!(Cli::try_parse_from(["pyscout", "resolve"]).is_err());
        let cli = Cli::parse_from(["pyscout", "-v", "resolve", "/usr/bin/python3"]);
        assert!(cli.verbose);
        assert!(matches!(cli.command, Some(Commands::Resolve { .. })));
    }
}
