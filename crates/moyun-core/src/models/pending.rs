//! Pending change model

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::Error;

/// Kind of document mutation recorded for replay
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeType {
    Create,
    Update,
    Delete,
    /// A stored type this build does not recognise; never replayed
    #[serde(other)]
    Unknown,
}

impl ChangeType {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Update => "update",
            Self::Delete => "delete",
            Self::Unknown => "unknown",
        }
    }
}

impl fmt::Display for ChangeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

impl FromStr for ChangeType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "create" => Ok(Self::Create),
            "update" => Ok(Self::Update),
            "delete" => Ok(Self::Delete),
            other => Err(Error::InvalidInput(format!("unknown change type: {other}"))),
        }
    }
}

/// A recorded mutation awaiting confirmation from the remote store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingChange {
    /// Monotonic id assigned by the queue
    pub id: i64,
    pub entity_id: String,
    pub change_type: ChangeType,
    /// Entity snapshot at the time of the change
    pub payload: Value,
    /// Append timestamp (Unix ms)
    pub timestamp: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn change_type_parse_roundtrip() {
        for change_type in [ChangeType::Create, ChangeType::Update, ChangeType::Delete] {
            assert_eq!(change_type.as_str().parse::<ChangeType>().unwrap(), change_type);
        }
        assert!("rename".parse::<ChangeType>().is_err());
    }
}
