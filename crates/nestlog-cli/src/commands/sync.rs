use nestlog_core::SyncReport;

use crate::commands::common::{format_failure_lines, format_timestamp, CliContext};
use crate::error::CliError;

pub async fn run_sync(context: &CliContext, as_json: bool) -> Result<(), CliError> {
    if !context.has_remote()? {
        return Err(CliError::SyncNotConfigured);
    }

    let engine = context.engine().await?;
    let report = engine.sync_pending_operations().await?;

    if as_json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    for line in format_sync_report(&report) {
        println!("{line}");
    }
    if let Some(last_sync_at) = engine.last_sync_at().await? {
        println!("Last sync: {}", format_timestamp(last_sync_at));
    }
    Ok(())
}

pub fn format_sync_report(report: &SyncReport) -> Vec<String> {
    if report.processed == 0 {
        return vec!["Nothing to sync.".to_string()];
    }

    let mut lines = vec![format!(
        "Synced {} of {} pending operations ({} will be retried, {} gave up)",
        report.succeeded,
        report.processed,
        report.retried,
        report.evicted.len()
    )];
    if !report.evicted.is_empty() {
        lines.extend(format_failure_lines(&report.evicted));
    }
    lines
}
