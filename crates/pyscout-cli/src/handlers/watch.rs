//! Watch command handler.

use pyscout_core::PythonLocatorQuery;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, warn};

use crate::bootstrap::CliContext;
use crate::error::CliError;
use crate::presentation::describe_event;

/// Refresh once, then print collection events until Ctrl+C.
pub async fn execute(ctx: &CliContext, json: bool) -> Result<(), CliError> {
    let mut events = ctx.service().subscribe();
    drop(ctx.service().trigger_refresh(PythonLocatorQuery::all().ignoring_cache()));
    if !json {
        println!("Watching for environment changes. Press Ctrl+C to stop.");
    }

    let mut ctrl_c = Box::pin(tokio::signal::ctrl_c());
    loop {
        tokio::select! {
            result = &mut ctrl_c => {
                result?;
                debug!("Interrupted; stopping watch");
                break;
            }
            received = events.recv() => match received {
                Ok(event) if json => println!("{}", serde_json::to_string(&event)?),
                Ok(event) => println!("{}", describe_event(&event)),
                Err(RecvError::Lagged(skipped)) => warn!(skipped, "Missed collection events"),
                Err(RecvError::Closed) => break,
            },
        }
    }

    ctx.service().dispose();
    Ok(())
}
