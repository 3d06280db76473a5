use nestlog_core::{Event, EventKind};

use crate::commands::common::{finish_pushes, normalize_event_id, parse_json_object, CliContext};
use crate::error::CliError;

pub async fn run_edit(
    context: &CliContext,
    id: &str,
    kind: EventKind,
    changes: &str,
) -> Result<(), CliError> {
    let event = edit_event(context, id, kind, changes).await?;
    println!("Updated {} {}", event.kind(), event.id);
    Ok(())
}

pub async fn edit_event(
    context: &CliContext,
    id: &str,
    kind: EventKind,
    changes: &str,
) -> Result<Event, CliError> {
    let id = normalize_event_id(id)?;
    let changes = parse_json_object(changes)?;

    let engine = context.engine().await?;
    let event = engine.update_event(&id, kind, &changes).await?;
    finish_pushes(&engine).await;
    Ok(event)
}
