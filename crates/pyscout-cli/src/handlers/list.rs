//! List command handler.

use futures_util::StreamExt;
use pyscout_core::{PythonEnvInfo, PythonEnvKind, PythonLocatorQuery, SearchLocations};

use crate::bootstrap::CliContext;
use crate::error::CliError;
use crate::presentation::print_env_table;

pub struct ListArgs {
    pub kinds: Vec<PythonEnvKind>,
    pub include_non_rooted: bool,
    pub refresh: bool,
    pub json: bool,
}

/// Query for the given flags. Roots only filter when the user passed some.
pub fn build_query(ctx: &CliContext, args: &ListArgs) -> PythonLocatorQuery {
    let mut query = PythonLocatorQuery::all();
    if !args.kinds.is_empty() {
        query = query.with_kinds(args.kinds.clone());
    }
    if !ctx.settings.workspace_roots.is_empty() {
        let mut locations = SearchLocations::new(ctx.settings.workspace_roots.clone());
        if args.include_non_rooted {
            locations = locations.including_non_rooted();
        }
        query = query.with_search_locations(locations);
    }
    if args.refresh {
        query = query.ignoring_cache();
    }
    query
}

pub async fn execute(ctx: &CliContext, args: &ListArgs) -> Result<(), CliError> {
    let query = build_query(ctx, args);
    let envs: Vec<PythonEnvInfo> = ctx.service().iter_envs(&query).collect().await;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&envs)?);
        return Ok(());
    }
    if envs.is_empty() {
        println!("No Python environments found.");
        return Ok(());
    }
    println!("Found {} environment(s):\n", envs.len());
    print_env_table(&envs);
    Ok(())
}
