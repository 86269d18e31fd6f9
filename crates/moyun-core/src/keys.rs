//! Local cache keys.

/// Global settings record.
pub const GLOBAL_SETTINGS: &str = "moyun_global_settings";
/// Document index (always a list on disk).
pub const DOC_INDEX: &str = "moyun_doc_index";
/// Prefix of per-document body records.
pub const DOC_PREFIX: &str = "moyun_doc_";
/// Shared world library.
pub const WORLD_LIBRARY: &str = "moyun_world_library";
/// Per-installation device identifier.
pub const DEVICE_ID: &str = "moyun_device_id";
/// Unix ms of the last successful automatic backup.
pub const LAST_AUTO_BACKUP: &str = "moyun_last_auto_backup";

/// Key of a document body.
#[must_use]
pub fn document(id: &str) -> String {
    format!("{DOC_PREFIX}{id}")
}

/// Document id for a body key, `None` for the index or unrelated keys.
#[must_use]
pub fn document_id(key: &str) -> Option<&str> {
    if key == DOC_INDEX {
        return None;
    }
    key.strip_prefix(DOC_PREFIX).filter(|id| !id.is_empty())
}
