//! CLI entry point - the composition root.
//!
//! Logging is initialised here, settings are loaded and the discovery stack
//! is bootstrapped once; command dispatch routes to handlers.

use clap::{CommandFactory, Parser};
use tracing_subscriber::EnvFilter;

use pyscout_cli::handlers::{self, list::ListArgs};
use pyscout_cli::{Cli, CliError, Commands, bootstrap, load_settings};

const DEFAULT_FILTER: &str = "warn";
const VERBOSE_FILTER: &str =
    "warn,pyscout_core=debug,pyscout_locators=debug,pyscout_runtime=debug,pyscout_store=debug,pyscout_cli=debug";

fn init_logging(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new(VERBOSE_FILTER)
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

async fn run(cli: Cli) -> Result<(), CliError> {
    let Some(command) = cli.command else {
        Cli::command().print_help()?;
        return Ok(());
    };

    let settings = load_settings(cli.config.as_deref(), cli.roots, cli.store)?;
    let ctx = bootstrap(settings, cli.no_store).await?;

    match command {
        Commands::List {
            kinds,
            include_non_rooted,
            refresh,
        } => {
            let args = ListArgs {
                kinds,
                include_non_rooted,
                refresh,
                json: cli.json,
            };
            handlers::list::execute(&ctx, &args).await
        }
        Commands::Resolve { path } => handlers::resolve::execute(&ctx, &path, cli.json).await,
        Commands::Refresh => handlers::refresh::execute(&ctx, cli.json).await,
        Commands::Watch => handlers::watch::execute(&ctx, cli.json).await,
        Commands::Locators => handlers::locators::execute(&ctx, cli.json),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    if let Err(e) = run(cli).await {
        eprintln!("Error: {e}");
        std::process::exit(e.exit_code());
    }
    Ok(())
}
