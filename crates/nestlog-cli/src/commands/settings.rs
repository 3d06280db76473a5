use crate::commands::common::{normalize_setting_key, parse_setting_value, CliContext};
use crate::error::CliError;

pub async fn run_settings_get(context: &CliContext, key: &str) -> Result<(), CliError> {
    let key = normalize_setting_key(key)?;
    let engine = context.engine().await?;

    match engine.get_setting(&key).await? {
        Some(value) => println!("{}", serde_json::to_string_pretty(&value)?),
        None => println!("{key} is not set"),
    }
    Ok(())
}

pub async fn run_settings_set(context: &CliContext, key: &str, raw_value: &str) -> Result<(), CliError> {
    let key = normalize_setting_key(key)?;
    let value = parse_setting_value(raw_value);

    let engine = context.engine().await?;
    engine.set_setting(&key, &value).await?;
    println!("{key} = {value}");
    Ok(())
}
