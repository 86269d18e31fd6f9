//! User-relative remote paths

use super::{RemoteError, RemoteResult};

pub const SETTINGS: &str = "settings";
pub const DOC_INDEX: &str = "docs/index";
pub const WORLD_LIBRARY: &str = "worldLibrary";
pub const BACKUP_INDEX: &str = "backupIndex";
pub const DEVICES: &str = "devices";

#[must_use]
pub fn document(id: &str) -> String {
    format!("docs/{id}")
}

#[must_use]
pub fn backup(id: &str) -> String {
    format!("backups/{id}")
}

#[must_use]
pub fn backup_summary(id: &str) -> String {
    format!("{BACKUP_INDEX}/{id}")
}

#[must_use]
pub fn device(id: &str) -> String {
    format!("{DEVICES}/{id}")
}

/// Check a slash-separated path: non-empty segments without reserved characters.
pub fn validate(path: &str) -> RemoteResult<()> {
    if path.trim().is_empty() {
        return Err(RemoteError::InvalidPath("path must not be empty".to_string()));
    }
    path.split('/').try_for_each(validate_segment)
}

/// Check a single path segment.
pub fn validate_segment(segment: &str) -> RemoteResult<()> {
    if segment.is_empty() {
        return Err(RemoteError::InvalidPath("empty path segment".to_string()));
    }
    if segment
        .chars()
        .any(|c| matches!(c, '.' | '#' | '$' | '[' | ']' | '/') || c.is_control())
    {
        return Err(RemoteError::InvalidPath(format!(
            "segment {segment:?} contains a reserved character"
        )));
    }
    Ok(())
}
