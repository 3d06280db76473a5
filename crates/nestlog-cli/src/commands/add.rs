use chrono::{Local, NaiveDate};
use nestlog_core::{Event, EventKind};
use serde_json::Value;

use crate::commands::common::{finish_pushes, parse_json_object, CliContext};
use crate::error::CliError;

pub async fn run_add(
    context: &CliContext,
    kind: EventKind,
    payload: &str,
    date: Option<NaiveDate>,
) -> Result<(), CliError> {
    let event = add_event(context, kind, payload, date).await?;
    println!("{}", event.id);
    Ok(())
}

pub async fn add_event(
    context: &CliContext,
    kind: EventKind,
    payload: &str,
    date: Option<NaiveDate>,
) -> Result<Event, CliError> {
    let payload = complete_payload(
        parse_json_object(payload)?,
        date.unwrap_or_else(|| Local::now().date_naive()),
        context.config.user_id.as_deref(),
    );

    let engine = context.engine().await?;
    let event = engine.create_event(kind, &payload).await?;
    finish_pushes(&engine).await;
    Ok(event)
}

/// Fill `date` and `user_id` when the payload leaves them out.
pub fn complete_payload(mut payload: Value, date: NaiveDate, user_id: Option<&str>) -> Value {
    if let Some(object) = payload.as_object_mut() {
        object
            .entry("date")
            .or_insert_with(|| Value::String(date.to_string()));
        if let Some(user_id) = user_id {
            object
                .entry("user_id")
                .or_insert_with(|| Value::String(user_id.to_string()));
        }
    }
    payload
}
