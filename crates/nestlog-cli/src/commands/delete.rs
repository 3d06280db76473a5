use nestlog_core::EventKind;

use crate::commands::common::{finish_pushes, normalize_event_id, CliContext};
use crate::error::CliError;

pub async fn run_delete(context: &CliContext, id: &str, kind: EventKind) -> Result<(), CliError> {
    let id = normalize_event_id(id)?;

    let engine = context.engine().await?;
    engine.delete_event(&id, kind).await?;
    finish_pushes(&engine).await;

    println!("Deleted {kind} {id}");
    Ok(())
}
