//! Global settings model

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// JSON field holding the secret that never leaves the device.
pub const SECRET_FIELD: &str = "apiKey";

/// Global application settings
///
/// Only `_lastModified` and the secret are interpreted by the engine; every
/// other field is carried through untouched.
#[derive(Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    /// Last update timestamp (Unix ms)
    #[serde(rename = "_lastModified", default)]
    pub last_modified: i64,
    /// Device-local secret, stripped from every remote representation
    #[serde(rename = "apiKey", default)]
    pub api_key: String,
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl Settings {
    /// Copy of these settings as they may be written to the remote store.
    pub fn remote_representation(&self) -> serde_json::Result<Value> {
        let mut value = serde_json::to_value(self)?;
        if let Some(object) = value.as_object_mut() {
            object.remove(SECRET_FIELD);
        }
        Ok(value)
    }

    /// Decode settings read from the remote store, discarding any secret it carries.
    pub fn from_remote(mut value: Value) -> serde_json::Result<Self> {
        if let Some(object) = value.as_object_mut() {
            object.remove(SECRET_FIELD);
        }
        serde_json::from_value(value)
    }

    /// Replace the secret with the locally held one.
    #[must_use]
    pub fn with_secret(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = api_key.into();
        self
    }

    /// Read a free-form field.
    #[must_use]
    pub fn field(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }
}

impl fmt::Debug for Settings {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("Settings")
            .field("last_modified", &self.last_modified)
            .field(
                "api_key",
                &if self.api_key.is_empty() {
                    ""
                } else {
                    "[REDACTED]"
                },
            )
            .field("fields", &self.fields)
            .finish()
    }
}
