//! Resolve command handler.

use std::path::Path;

use crate::bootstrap::CliContext;
use crate::error::CliError;
use crate::presentation::print_env_table;

pub async fn execute(ctx: &CliContext, path: &Path, json: bool) -> Result<(), CliError> {
    let path = std::path::absolute(path)?;
    let Some(env) = ctx.service().resolve_env(&path).await else {
        return Err(CliError::Unresolved(path.display().to_string()));
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&env)?);
    } else {
        print_env_table(std::slice::from_ref(&env));
        if !env.executable.sys_prefix.as_os_str().is_empty() {
            println!("\nsys.prefix: {}", env.executable.sys_prefix.display());
        }
    }
    Ok(())
}
