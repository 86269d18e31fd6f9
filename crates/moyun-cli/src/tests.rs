use std::collections::HashMap;

use clap::Parser;
use moyun_core::config::EngineConfig;
use moyun_core::models::{
    BackupSummary, ChangeType, DeviceHeartbeat, DocumentIndexEntry, PendingChange,
};
use moyun_core::sync::{DrainReport, FailedChange, KindOutcome, SyncKind, SyncSummary};
use pretty_assertions::assert_eq;
use serde_json::{Map, Value};

use crate::cli::{BackupCommands, Cli, Commands};
use crate::commands::backup::format_backup_lines;
use crate::commands::common::{
    default_editor, format_document_lines, format_relative_time, format_timestamp,
    is_affirmative, normalize_content, normalize_document_id, resolve_remote_target,
    split_paragraphs, truncate,
};
use crate::commands::config::{apply_profile_update, ProfileUpdate};
use crate::commands::devices::format_device_lines;
use crate::commands::sync::{format_drain_lines, format_pending_lines, format_summary_lines};
use crate::config_profiles::CliProfile;
use crate::error::CliError;

fn vars(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
    let vars: HashMap<String, String> = pairs
        .iter()
        .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
        .collect();
    move |key| vars.get(key).cloned()
}

fn profile(url: Option<&str>, user: Option<&str>) -> CliProfile {
    CliProfile {
        database_url: url.map(ToString::to_string),
        user_id: user.map(ToString::to_string),
        engine: EngineConfig::default(),
    }
}

#[test]
fn cli_parses_nested_commands_with_global_flags() {
    let cli = Cli::try_parse_from([
        "moyun",
        "backup",
        "restore",
        "1700000000000",
        "--yes",
        "--profile",
        "work",
    ])
    .unwrap();
    assert_eq!(cli.profile.as_deref(), Some("work"));
    assert!(matches!(
        cli.command,
        Commands::Backup {
            command: BackupCommands::Restore { ref id, yes: true }
        } if id == "1700000000000"
    ));
}

#[test]
fn remote_target_from_profile_takes_token_from_env() {
    let stored = profile(Some("https://demo.firebaseio.com"), Some("uid-1"));
    let target =
        resolve_remote_target(Some(&stored), vars(&[("MOYUN_AUTH_TOKEN", "secret")])).unwrap();

    assert_eq!(target.user_id, "uid-1");
    assert_eq!(target.remote.database_url, "https://demo.firebaseio.com");
    assert_eq!(target.remote.auth_token.as_deref(), Some("secret"));
}

#[test]
fn remote_target_env_overrides_profile() {
    let stored = profile(Some("https://demo.firebaseio.com"), Some("uid-1"));
    let target = resolve_remote_target(
        Some(&stored),
        vars(&[
            ("MOYUN_DATABASE_URL", "https://other.firebaseio.com"),
            ("MOYUN_USER_ID", "uid-2"),
        ]),
    )
    .unwrap();

    assert_eq!(target.user_id, "uid-2");
    assert_eq!(target.remote.database_url, "https://other.firebaseio.com");
}

#[test]
fn remote_target_requires_url_and_user() {
    let missing_user = profile(Some("https://demo.firebaseio.com"), None);
    assert!(matches!(
        resolve_remote_target(Some(&missing_user), vars(&[])),
        Err(CliError::RemoteNotConfigured)
    ));
    assert!(matches!(
        resolve_remote_target(None, vars(&[("MOYUN_USER_ID", "uid")])),
        Err(CliError::RemoteNotConfigured)
    ));
}

#[test]
fn profile_update_validates_url_and_keeps_unset_fields() {
    let mut stored = profile(Some("https://demo.firebaseio.com"), Some("uid-1"));
    apply_profile_update(
        &mut stored,
        ProfileUpdate {
            backup_retention_days: Some(10),
            ..ProfileUpdate::default()
        },
    )
    .unwrap();
    assert_eq!(stored.user_id.as_deref(), Some("uid-1"));
    assert_eq!(stored.engine.backup_retention_days, 10);

    let result = apply_profile_update(
        &mut stored,
        ProfileUpdate {
            database_url: Some("demo.firebaseio.com".to_string()),
            ..ProfileUpdate::default()
        },
    );
    assert!(matches!(result, Err(CliError::Config(_))));
    assert_eq!(
        stored.database_url.as_deref(),
        Some("https://demo.firebaseio.com")
    );
}

#[test]
fn summary_lines_report_each_kind() {
    let mut documents = KindOutcome::new(SyncKind::DocumentIndex);
    documents.uploads = 2;
    documents.downloads = 1;
    documents.skipped = 1;
    let summary = SyncSummary {
        ran: true,
        outcomes: vec![
            KindOutcome::new(SyncKind::Settings),
            documents,
            KindOutcome::failed(SyncKind::Library, "offline"),
        ],
    };

    assert_eq!(
        format_summary_lines(&summary),
        vec![
            "settings   0 uploaded, 0 downloaded",
            "documents  2 uploaded, 1 downloaded, 1 malformed skipped",
            "library    failed: offline",
        ]
    );
    assert_eq!(
        format_summary_lines(&SyncSummary::skipped()),
        vec!["Not signed in; nothing synced."]
    );
}

#[test]
fn drain_lines_list_failures() {
    let change = PendingChange {
        id: 7,
        entity_id: "doc-1".to_string(),
        change_type: ChangeType::Update,
        payload: Value::Null,
        timestamp: 0,
    };
    let report = DrainReport {
        success: false,
        count: 3,
        failed: vec![FailedChange {
            change,
            reason: "unreachable".to_string(),
        }],
        reason: None,
    };

    assert_eq!(
        format_drain_lines(&report),
        vec!["Replayed 3 queued change(s)", "  #7 update doc-1: unreachable"]
    );
    assert_eq!(
        format_drain_lines(&DrainReport::not_run("offline")),
        vec!["Queue not drained: offline"]
    );
}

#[test]
fn pending_lines_show_kind_and_age() {
    let change = PendingChange {
        id: 1,
        entity_id: "a".to_string(),
        change_type: ChangeType::Delete,
        payload: Value::Null,
        timestamp: 0,
    };
    let lines = format_pending_lines(&[change], 120_000);
    assert_eq!(lines, vec!["#1     delete  a              2m ago"]);
}

#[test]
fn document_lines_truncate_long_titles() {
    let entry = DocumentIndexEntry {
        id: "0190a1b2-c3d4-7e5f".to_string(),
        title: "A very long title that keeps going past the column".to_string(),
        last_modified: 0,
        preview_text: String::new(),
        extra: Map::new(),
    };
    let line = &format_document_lines(&[entry])[0];
    assert!(line.starts_with("0190a1b2-c3d4  A very long title that keeps ..."));
}

#[test]
fn device_lines_mark_this_device() {
    let devices = vec![
        DeviceHeartbeat {
            device_id: "here".to_string(),
            last_seen: 0,
            client_descriptor: "moyun/test".to_string(),
        },
        DeviceHeartbeat {
            device_id: "there".to_string(),
            last_seen: 0,
            client_descriptor: String::new(),
        },
    ];
    let lines = format_device_lines(&devices, "here", 0);
    assert!(lines[0].starts_with("* here"));
    assert!(lines[1].starts_with("  there"));
}

#[test]
fn backup_lines_include_note_when_present() {
    let backups = vec![BackupSummary {
        id: "1700000000000".to_string(),
        timestamp: 1_700_000_000_000,
        note: "Auto backup".to_string(),
    }];
    assert_eq!(
        format_backup_lines(&backups),
        vec!["1700000000000    2023-11-14 22:13:20 UTC  Auto backup"]
    );
}

#[test]
fn split_paragraphs_on_blank_lines() {
    let paragraphs = split_paragraphs("First line\ncontinues\n\n\n  Second  \n\n");
    let contents: Vec<&str> = paragraphs.iter().map(|p| p.content.as_str()).collect();
    assert_eq!(contents, vec!["First line\ncontinues", "Second"]);
}

#[test]
fn small_helpers() {
    assert_eq!(normalize_content("  hi \n"), Some("hi".to_string()));
    assert_eq!(normalize_content(" \n\t "), None);
    assert!(normalize_document_id("  ").is_err());
    assert_eq!(normalize_document_id(" abc ").unwrap(), "abc");
    assert_eq!(truncate("short", 10), "short");
    assert_eq!(truncate("abcdefghijkl", 8), "abcde...");
    assert!(is_affirmative(" Yes\n"));
    assert!(!is_affirmative("n"));
    assert!(!is_affirmative(""));
    assert!(!default_editor().is_empty());
    assert_eq!(format_timestamp(0), "1970-01-01 00:00:00 UTC");
}

#[test]
fn format_relative_time_units() {
    let now = 10_000_000;
    assert_eq!(format_relative_time(now - 30_000, now), "just now");
    assert_eq!(format_relative_time(now - 120_000, now), "2m ago");
    assert_eq!(format_relative_time(now - 2 * 60 * 60_000, now), "2h ago");
}
