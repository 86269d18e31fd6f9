use std::env;
use std::io::{self, BufRead, IsTerminal, Read, Write};
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use chrono::Utc;
use moyun_core::clock::{Clock, SystemClock};
use moyun_core::config::{EngineConfig, RemoteConfig};
use moyun_core::models::{DocumentIndexEntry, Paragraph};
use moyun_core::remote::{AuthProvider, HttpTransport, RemoteStore, SessionAuth};
use moyun_core::services::LocalStore;
use moyun_core::{EngineContext, SyncEngine};
use serde::Serialize;

use crate::config_profiles::{normalize_text_option, CliProfile, CliProfilesConfig};
use crate::error::CliError;

const ENV_USER_ID: &str = "MOYUN_USER_ID";

#[derive(Debug, Serialize)]
pub struct DocumentListItem {
    pub id: String,
    pub title: String,
    pub preview: String,
    pub last_modified: i64,
    pub relative_time: String,
}

/// Everything needed to reach one account's remote data
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteTarget {
    pub remote: RemoteConfig,
    pub user_id: String,
    pub engine: EngineConfig,
}

pub fn default_db_path() -> Result<PathBuf, CliError> {
    dirs::data_dir()
        .map(|dir| dir.join("moyun").join("moyun.db"))
        .ok_or_else(|| CliError::Config("Failed to resolve CLI data directory".to_string()))
}

pub fn resolve_db_path(cli_db_path: Option<PathBuf>) -> Result<PathBuf, CliError> {
    match cli_db_path.or_else(|| env::var_os("MOYUN_DB_PATH").map(PathBuf::from)) {
        Some(path) => Ok(path),
        None => default_db_path(),
    }
}

pub async fn open_local_store(path: &Path) -> Result<LocalStore, CliError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    Ok(LocalStore::open_path(path.to_path_buf()).await?)
}

/// Combine environment variables with the stored profile.
///
/// Variables win over the profile; the auth token only ever comes from the
/// environment.
pub fn resolve_remote_target<F>(
    profile: Option<&CliProfile>,
    lookup: F,
) -> Result<RemoteTarget, CliError>
where
    F: Fn(&str) -> Option<String>,
{
    let user_id = normalize_text_option(lookup(ENV_USER_ID))
        .or_else(|| profile.and_then(CliProfile::user_id));
    let fallback_url = profile.and_then(CliProfile::database_url);
    let remote = RemoteConfig::from_lookup(lookup, fallback_url)?;

    let (Some(remote), Some(user_id)) = (remote, user_id) else {
        return Err(CliError::RemoteNotConfigured);
    };

    Ok(RemoteTarget {
        remote,
        user_id,
        engine: profile.map(|profile| profile.engine.clone()).unwrap_or_default(),
    })
}

pub fn load_remote_target(profile_name: Option<&str>) -> Result<RemoteTarget, CliError> {
    let config = CliProfilesConfig::load().map_err(CliError::Config)?;
    let profile_name = config.resolve_profile_name(profile_name);
    let target = resolve_remote_target(config.profile(&profile_name), |key| env::var(key).ok())?;
    tracing::debug!(
        "Using profile '{}' for account {}",
        profile_name,
        target.user_id
    );
    Ok(target)
}

pub async fn open_engine(
    db_path: &Path,
    profile_name: Option<&str>,
) -> Result<SyncEngine<HttpTransport>, CliError> {
    let target = load_remote_target(profile_name)?;
    let local = open_local_store(db_path).await?;

    let transport = Arc::new(HttpTransport::new(&target.remote)?);
    let auth: Arc<dyn AuthProvider> = Arc::new(SessionAuth::signed_in(target.user_id));
    let clock: Arc<dyn Clock> = Arc::new(SystemClock::new());
    let context = EngineContext::load(
        local,
        RemoteStore::new(transport, auth),
        clock,
        target.engine,
    )
    .await?;
    Ok(SyncEngine::new(context))
}

pub fn format_document_lines(entries: &[DocumentIndexEntry]) -> Vec<String> {
    let now_ms = Utc::now().timestamp_millis();
    entries
        .iter()
        .map(|entry| {
            let short_id = entry.id.chars().take(13).collect::<String>();
            let title = truncate(&entry.title, 32);
            let relative_time = format_relative_time(entry.last_modified, now_ms);
            format!("{short_id:<13}  {title:<32}  {relative_time}")
        })
        .collect()
}

pub fn document_to_list_item(entry: &DocumentIndexEntry) -> DocumentListItem {
    let now_ms = Utc::now().timestamp_millis();
    DocumentListItem {
        id: entry.id.clone(),
        title: entry.title.clone(),
        preview: truncate(&entry.preview_text, 80),
        last_modified: entry.last_modified,
        relative_time: format_relative_time(entry.last_modified, now_ms),
    }
}

pub fn truncate(text: &str, max_chars: usize) -> String {
    let collapsed = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if collapsed.chars().count() <= max_chars {
        collapsed
    } else {
        let take_len = max_chars.saturating_sub(3);
        let mut truncated = collapsed.chars().take(take_len).collect::<String>();
        truncated.push_str("...");
        truncated
    }
}

pub fn format_timestamp(timestamp_ms: i64) -> String {
    chrono::DateTime::from_timestamp_millis(timestamp_ms).map_or_else(
        || timestamp_ms.to_string(),
        |date_time| date_time.format("%Y-%m-%d %H:%M:%S UTC").to_string(),
    )
}

pub fn format_relative_time(timestamp_ms: i64, now_ms: i64) -> String {
    let diff = now_ms.saturating_sub(timestamp_ms);
    let minute = 60_000;
    let hour = 60 * minute;
    let day = 24 * hour;
    let week = 7 * day;
    let month = 30 * day;
    let year = 365 * day;

    if diff < minute {
        "just now".to_string()
    } else if diff < hour {
        format!("{}m ago", diff / minute)
    } else if diff < day {
        format!("{}h ago", diff / hour)
    } else if diff < week {
        format!("{}d ago", diff / day)
    } else if diff < month {
        format!("{}w ago", diff / week)
    } else if diff < year {
        format!("{}mo ago", diff / month)
    } else {
        format!("{}y ago", diff / year)
    }
}

pub fn normalize_document_id(id: &str) -> Result<String, CliError> {
    let trimmed = id.trim();
    if trimmed.is_empty() {
        Err(CliError::EmptyDocumentId)
    } else {
        Ok(trimmed.to_string())
    }
}

/// Split text into paragraphs on blank lines.
pub fn split_paragraphs(text: &str) -> Vec<Paragraph> {
    text.split("\n\n")
        .map(str::trim)
        .filter(|block| !block.is_empty())
        .map(Paragraph::new)
        .collect()
}

pub fn normalize_content(content: &str) -> Option<String> {
    let trimmed = content.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

/// Body text from piped stdin, or from `$EDITOR` when attached to a terminal.
pub fn read_body_input() -> Result<Option<String>, CliError> {
    if let Some(content) = read_piped_stdin()? {
        return Ok(Some(content));
    }
    capture_editor_input()
}

pub fn read_piped_stdin() -> Result<Option<String>, CliError> {
    let stdin = io::stdin();
    if stdin.is_terminal() {
        return Ok(None);
    }

    let mut buffer = String::new();
    stdin.lock().read_to_string(&mut buffer)?;
    Ok(normalize_content(&buffer))
}

pub fn capture_editor_input() -> Result<Option<String>, CliError> {
    let editor = preferred_editor();
    let temp_file = create_temp_document_path();
    std::fs::write(&temp_file, "")?;

    let launch_result = launch_editor(&editor, &temp_file);
    let content = std::fs::read_to_string(&temp_file)?;
    let _ = std::fs::remove_file(&temp_file);

    launch_result?;
    Ok(normalize_content(&content))
}

pub fn launch_editor(editor: &str, file_path: &Path) -> Result<(), CliError> {
    let mut parts = editor.split_whitespace();
    let Some(program) = parts.next() else {
        return Err(CliError::EditorFailed("empty EDITOR command".into()));
    };

    let status = Command::new(program).args(parts).arg(file_path).status()?;
    if status.success() {
        Ok(())
    } else {
        Err(CliError::EditorFailed(format!(
            "`{editor}` exited with status {status}"
        )))
    }
}

pub fn preferred_editor() -> String {
    env::var("VISUAL")
        .or_else(|_| env::var("EDITOR"))
        .unwrap_or_else(|_| default_editor().to_string())
}

pub const fn default_editor() -> &'static str {
    if cfg!(windows) {
        "notepad"
    } else {
        "vi"
    }
}

pub fn create_temp_document_path() -> PathBuf {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |duration| duration.as_nanos());
    env::temp_dir().join(format!("moyun-doc-{}-{now}.txt", std::process::id()))
}

/// Ask a yes/no question on the terminal. Anything but `y`/`yes` is a no.
pub fn confirm(prompt: &str) -> Result<bool, CliError> {
    print!("{prompt} [y/N] ");
    io::stdout().flush()?;
    let mut answer = String::new();
    io::stdin().lock().read_line(&mut answer)?;
    Ok(is_affirmative(&answer))
}

pub fn is_affirmative(answer: &str) -> bool {
    matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes")
}
