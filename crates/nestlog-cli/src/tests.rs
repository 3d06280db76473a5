use std::collections::HashMap;
use std::path::PathBuf;

use chrono::NaiveDate;
use nestlog_core::models::{EventDetails, SyncOperation};
use nestlog_core::sync::{PushOutcome, PushStatus};
use nestlog_core::util::now_utc;
use nestlog_core::{Event, EventId, EventKind, SyncReport};
use pretty_assertions::assert_eq;
use serde_json::json;

use crate::cli::{parse_kind, CompletionShell};
use crate::commands::add::{add_event, complete_payload};
use crate::commands::clear::run_clear;
use crate::commands::common::{
    event_summary, format_event_lines, format_queue_lines, normalize_event_id,
    normalize_setting_key, parse_json_object, parse_setting_value, push_outcome_line,
    resolve_db_path, CliContext,
};
use crate::commands::completions::completion_script;
use crate::commands::delete::run_delete;
use crate::commands::edit::edit_event;
use crate::commands::settings::run_settings_set;
use crate::commands::sync::{format_sync_report, run_sync};
use crate::config::{CliConfig, ENV_ACCESS_TOKEN, ENV_DB_PATH, ENV_SUPABASE_URL, ENV_USER_ID};
use crate::error::CliError;

fn offline_context(dir: &tempfile::TempDir) -> CliContext {
    let config = CliConfig {
        user_id: Some("parent-1".to_string()),
        ..CliConfig::default()
    };
    CliContext::new(Some(dir.path().join("nestlog.db")), config)
}

fn diaper_event() -> Event {
    Event::from_payload(
        EventKind::Diaper,
        &json!({
            "user_id": "parent-1",
            "date": "2024-05-01",
            "time": "08:30",
            "pee": true,
            "poop": false
        }),
        now_utc(),
    )
    .unwrap()
}

#[test]
fn parse_kind_accepts_kind_and_table_names() {
    assert_eq!(parse_kind("feed").unwrap(), EventKind::Feed);
    assert_eq!(parse_kind("Diapers").unwrap(), EventKind::Diaper);
    assert!(parse_kind("bath").is_err());
}

#[test]
fn parse_json_object_rejects_non_objects() {
    assert!(parse_json_object(r#"{"pee": true}"#).is_ok());
    assert!(matches!(
        parse_json_object("[1, 2]"),
        Err(CliError::InvalidJson(_))
    ));
    assert!(matches!(
        parse_json_object("{not json"),
        Err(CliError::InvalidJson(_))
    ));
}

#[test]
fn parse_setting_value_falls_back_to_string() {
    assert_eq!(parse_setting_value("42"), json!(42));
    assert_eq!(parse_setting_value(r#"{"dark": true}"#), json!({"dark": true}));
    assert_eq!(parse_setting_value("metric"), json!("metric"));
}

#[test]
fn identifiers_and_keys_are_trimmed() {
    assert_eq!(normalize_event_id("  abc  ").unwrap().as_str(), "abc");
    assert!(matches!(normalize_event_id("   "), Err(CliError::EmptyEventId)));
    assert_eq!(normalize_setting_key(" theme ").unwrap(), "theme");
    assert!(matches!(
        normalize_setting_key(""),
        Err(CliError::EmptySettingKey)
    ));
}

#[test]
fn complete_payload_fills_only_missing_fields() {
    let date = NaiveDate::from_ymd_opt(2024, 5, 1).unwrap();

    let filled = complete_payload(json!({"time": "08:30"}), date, Some("parent-1"));
    assert_eq!(
        filled,
        json!({"time": "08:30", "date": "2024-05-01", "user_id": "parent-1"})
    );

    let explicit = complete_payload(
        json!({"date": "2024-04-30", "user_id": "parent-2"}),
        date,
        Some("parent-1"),
    );
    assert_eq!(explicit, json!({"date": "2024-04-30", "user_id": "parent-2"}));

    let anonymous = complete_payload(json!({}), date, None);
    assert_eq!(anonymous, json!({"date": "2024-05-01"}));
}

#[test]
fn config_missing_file_is_default() {
    let dir = tempfile::tempdir().unwrap();
    let config = CliConfig::load_from_path(&dir.path().join("missing.json")).unwrap();
    assert_eq!(config, CliConfig::default());
}

#[test]
fn config_file_is_parsed_and_normalized() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.json");
    std::fs::write(
        &path,
        r#"{
            "version": 1,
            "remote": {
                "supabase_url": " https://demo.supabase.co ",
                "supabase_anon_key": "anon"
            },
            "user_id": "  ",
            "engine": { "max_retries": 3, "request_timeout": 2.5 }
        }"#,
    )
    .unwrap();

    let config = CliConfig::load_from_path(&path).unwrap();
    assert_eq!(
        config.remote.supabase_url.as_deref(),
        Some("https://demo.supabase.co")
    );
    assert_eq!(config.user_id, None);
    assert_eq!(config.engine.max_retries, 3);
    assert_eq!(config.engine.request_timeout.as_millis(), 2500);
    assert!(config.engine.immediate_push);
}

#[test]
fn config_rejects_unknown_engine_fields() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.json");
    std::fs::write(&path, r#"{"engine": {"retries": 3}}"#).unwrap();

    assert!(matches!(
        CliConfig::load_from_path(&path),
        Err(CliError::Config(_))
    ));
}

#[test]
fn environment_overrides_config_values() {
    let env: HashMap<&str, &str> = HashMap::from([
        (ENV_SUPABASE_URL, "https://env.supabase.co"),
        (ENV_ACCESS_TOKEN, "token-1"),
        (ENV_USER_ID, "  "),
        (ENV_DB_PATH, "/tmp/nestlog-env.db"),
    ]);
    let mut config = CliConfig {
        user_id: Some("from-file".to_string()),
        ..CliConfig::default()
    };

    config.apply_env(|name| env.get(name).map(ToString::to_string));

    assert_eq!(
        config.remote.supabase_url.as_deref(),
        Some("https://env.supabase.co")
    );
    assert_eq!(config.access_token.as_deref(), Some("token-1"));
    assert_eq!(config.user_id.as_deref(), Some("from-file"));
    assert_eq!(config.db_path, Some(PathBuf::from("/tmp/nestlog-env.db")));
}

#[test]
fn db_path_prefers_flag_over_config() {
    let config = CliConfig {
        db_path: Some(PathBuf::from("/data/config.db")),
        ..CliConfig::default()
    };

    assert_eq!(
        resolve_db_path(Some(PathBuf::from("/data/flag.db")), &config),
        PathBuf::from("/data/flag.db")
    );
    assert_eq!(
        resolve_db_path(None, &config),
        PathBuf::from("/data/config.db")
    );
    assert!(resolve_db_path(None, &CliConfig::default()).ends_with("nestlog/nestlog.db"));
}

#[test]
fn event_lines_show_time_kind_and_fields() {
    let event = diaper_event();
    let lines = format_event_lines(std::slice::from_ref(&event));

    assert_eq!(lines.len(), 1);
    assert!(lines[0].starts_with("2024-05-01 08:30  diaper"));
    assert!(lines[0].contains(event.id.as_str()));
    assert!(lines[0].contains("pee=true"));
    assert!(lines[0].contains("poop=false"));

    let summary = event_summary(&event);
    assert!(!summary.contains("user_id"));
    assert!(!summary.contains("created_at"));
    assert!(!summary.contains("note"));
}

#[test]
fn empty_listings_have_placeholders() {
    assert_eq!(format_event_lines(&[]), vec!["No events recorded."]);
    assert_eq!(format_queue_lines(&[]), vec!["No pending operations."]);
}

#[test]
fn push_outcome_lines_only_for_pending_pushes() {
    let outcome = |status| PushOutcome {
        item_id: "q1".to_string(),
        operation: SyncOperation::Create,
        record_id: EventId::from("e1".to_string()),
        status,
    };

    assert_eq!(push_outcome_line(&outcome(PushStatus::Pushed)), None);
    assert!(push_outcome_line(&outcome(PushStatus::Deferred))
        .unwrap()
        .contains("earlier pending"));
    assert!(
        push_outcome_line(&outcome(PushStatus::Failed("offline".to_string())))
            .unwrap()
            .contains("offline")
    );
}

#[test]
fn sync_report_summary() {
    assert_eq!(
        format_sync_report(&SyncReport::default()),
        vec!["Nothing to sync."]
    );

    let report = SyncReport {
        processed: 3,
        succeeded: 2,
        retried: 1,
        evicted: Vec::new(),
    };
    assert_eq!(
        format_sync_report(&report),
        vec!["Synced 2 of 3 pending operations (1 will be retried, 0 gave up)"]
    );
}

#[test]
fn completion_scripts_name_the_binary() {
    for shell in [
        CompletionShell::Bash,
        CompletionShell::Zsh,
        CompletionShell::Fish,
    ] {
        let script = String::from_utf8(completion_script(shell)).unwrap();
        assert!(script.contains("nestlog"));
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn offline_add_is_listed_and_queued() {
    let dir = tempfile::tempdir().unwrap();
    let context = offline_context(&dir);

    let event = add_event(
        &context,
        EventKind::Diaper,
        r#"{"time": "08:30", "pee": true, "poop": false}"#,
        NaiveDate::from_ymd_opt(2024, 5, 1),
    )
    .await
    .unwrap();
    assert_eq!(event.user_id.as_deref(), Some("parent-1"));

    let engine = context.engine().await.unwrap();
    let events = engine
        .get_events("parent-1", NaiveDate::from_ymd_opt(2024, 5, 1))
        .await
        .unwrap();
    assert_eq!(events, vec![event.clone()]);

    let pending = engine.pending_operations().await.unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].operation, SyncOperation::Create);
    assert_eq!(pending[0].record_id, event.id);
}

#[tokio::test(flavor = "multi_thread")]
async fn offline_add_rejects_invalid_payload() {
    let dir = tempfile::tempdir().unwrap();
    let context = offline_context(&dir);

    let result = add_event(
        &context,
        EventKind::Weight,
        r#"{"time": "08:30", "kg": 900}"#,
        None,
    )
    .await;
    assert!(matches!(
        result,
        Err(CliError::Core(nestlog_core::Error::Validation(_)))
    ));

    let engine = context.engine().await.unwrap();
    assert!(engine.pending_operations().await.unwrap().is_empty());
}

#[tokio::test(flavor = "multi_thread")]
async fn edit_and_delete_queue_follow_up_operations() {
    let dir = tempfile::tempdir().unwrap();
    let context = offline_context(&dir);

    let event = add_event(
        &context,
        EventKind::Diaper,
        r#"{"time": "08:30", "pee": true, "poop": false}"#,
        NaiveDate::from_ymd_opt(2024, 5, 1),
    )
    .await
    .unwrap();

    let edited = edit_event(
        &context,
        event.id.as_str(),
        EventKind::Diaper,
        r#"{"poop": true}"#,
    )
    .await
    .unwrap();
    let EventDetails::Diaper(diaper) = &edited.details else {
        panic!("expected a diaper event");
    };
    assert!(diaper.poop);

    run_delete(&context, event.id.as_str(), EventKind::Diaper)
        .await
        .unwrap();

    let engine = context.engine().await.unwrap();
    assert_eq!(engine.store().get_by_id(&event.id).await.unwrap(), None);
    let operations = engine
        .pending_operations()
        .await
        .unwrap()
        .into_iter()
        .map(|item| item.operation)
        .collect::<Vec<_>>();
    assert_eq!(
        operations,
        vec![
            SyncOperation::Create,
            SyncOperation::Update,
            SyncOperation::Delete
        ]
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn sync_requires_a_remote_store() {
    let dir = tempfile::tempdir().unwrap();
    let context = offline_context(&dir);

    assert!(matches!(
        run_sync(&context, false).await,
        Err(CliError::SyncNotConfigured)
    ));
}

#[tokio::test(flavor = "multi_thread")]
async fn clear_requires_confirmation() {
    let dir = tempfile::tempdir().unwrap();
    let context = offline_context(&dir);

    run_settings_set(&context, "theme", "dark").await.unwrap();
    assert!(matches!(
        run_clear(&context, false).await,
        Err(CliError::ConfirmationRequired)
    ));

    let engine = context.engine().await.unwrap();
    assert_eq!(
        engine.get_setting("theme").await.unwrap(),
        Some(json!("dark"))
    );

    run_clear(&context, true).await.unwrap();
    assert_eq!(engine.get_setting("theme").await.unwrap(), None);
}
