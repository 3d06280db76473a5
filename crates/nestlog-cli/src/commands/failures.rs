use crate::commands::common::{format_failure_lines, CliContext};
use crate::error::CliError;

pub async fn run_failures(context: &CliContext, limit: usize, as_json: bool) -> Result<(), CliError> {
    let engine = context.engine().await?;
    let failures = engine.failures(limit).await?;

    if as_json {
        println!("{}", serde_json::to_string_pretty(&failures)?);
    } else {
        for line in format_failure_lines(&failures) {
            println!("{line}");
        }
    }

    Ok(())
}
