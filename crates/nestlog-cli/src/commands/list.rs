use chrono::NaiveDate;

use crate::commands::common::{format_event_lines, CliContext};
use crate::error::CliError;

pub async fn run_list(
    context: &CliContext,
    date: Option<NaiveDate>,
    as_json: bool,
) -> Result<(), CliError> {
    let user_id = context.user_id()?;
    let engine = context.engine().await?;
    let events = engine.get_events(user_id, date).await?;

    if as_json {
        println!("{}", serde_json::to_string_pretty(&events)?);
    } else {
        for line in format_event_lines(&events) {
            println!("{line}");
        }
    }

    Ok(())
}
