use crate::commands::common::CliContext;
use crate::error::CliError;

pub async fn run_clear(context: &CliContext, confirmed: bool) -> Result<(), CliError> {
    if !confirmed {
        return Err(CliError::ConfirmationRequired);
    }

    let engine = context.engine().await?;
    engine.clear_all().await?;
    println!("Cleared local data at {}", context.db_path.display());
    Ok(())
}
