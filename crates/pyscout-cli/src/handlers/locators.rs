//! Locators command handler.

use pyscout_core::Locator;

use crate::bootstrap::CliContext;
use crate::error::CliError;
use crate::presentation::print_separator;

pub fn execute(ctx: &CliContext, json: bool) -> Result<(), CliError> {
    let rows: Vec<(String, bool)> = ctx
        .switches
        .iter()
        .map(|switch| (switch.name().to_string(), switch.is_enabled()))
        .collect();

    if json {
        let value: Vec<serde_json::Value> = rows
            .iter()
            .map(|(name, enabled)| serde_json::json!({ "name": name, "enabled": enabled }))
            .collect();
        println!("{}", serde_json::to_string_pretty(&value)?);
        return Ok(());
    }

    println!("{:<24} Status", "Locator");
    print_separator(36);
    for (name, enabled) in rows {
        println!("{:<24} {}", name, if enabled { "enabled" } else { "disabled" });
    }
    Ok(())
}
