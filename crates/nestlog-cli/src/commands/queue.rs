use crate::commands::common::{format_queue_lines, CliContext};
use crate::error::CliError;

pub async fn run_queue(context: &CliContext, as_json: bool) -> Result<(), CliError> {
    let engine = context.engine().await?;
    let items = engine.pending_operations().await?;

    if as_json {
        println!("{}", serde_json::to_string_pretty(&items)?);
    } else {
        for line in format_queue_lines(&items) {
            println!("{line}");
        }
    }

    Ok(())
}
