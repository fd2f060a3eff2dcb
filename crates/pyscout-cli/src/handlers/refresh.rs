//! Refresh command handler.

use pyscout_core::{EnvCollectionEvent, PythonLocatorQuery};
use tokio::sync::broadcast::error::TryRecvError;

use crate::bootstrap::CliContext;
use crate::error::CliError;
use crate::presentation::describe_event;

pub async fn execute(ctx: &CliContext, json: bool) -> Result<(), CliError> {
    let mut events = ctx.service().subscribe();
    ctx.service()
        .trigger_refresh(PythonLocatorQuery::all().ignoring_cache())
        .await;

    let mut changes: Vec<EnvCollectionEvent> = Vec::new();
    loop {
        match events.try_recv() {
            Ok(event) => changes.push(event),
            Err(TryRecvError::Lagged(skipped)) => {
                tracing::warn!(skipped, "Missed collection events");
            }
            Err(TryRecvError::Empty | TryRecvError::Closed) => break,
        }
    }

    if json {
        println!("{}", serde_json::to_string_pretty(&changes)?);
    } else if changes.is_empty() {
        println!("No changes.");
    } else {
        for change in &changes {
            println!("{}", describe_event(change));
        }
    }
    Ok(())
}
