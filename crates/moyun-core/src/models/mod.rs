//! Data models for MoYun

mod backup;
mod device;
mod document;
mod library;
mod pending;
mod settings;

pub use backup::{BackupData, BackupRecord, BackupSummary};
pub use device::DeviceHeartbeat;
pub use document::{validate_document_id, Document, DocumentIndexEntry, Paragraph};
pub use library::LibraryItem;
pub use pending::{ChangeType, PendingChange};
pub use settings::{Settings, SECRET_FIELD};
