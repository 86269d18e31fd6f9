//! Device heartbeat model

use serde::{Deserialize, Serialize};

/// Last-seen record of one installation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceHeartbeat {
    /// Filled from the slot key when read back
    #[serde(default, skip_serializing)]
    pub device_id: String,
    /// Last heartbeat timestamp (Unix ms)
    pub last_seen: i64,
    #[serde(default)]
    pub client_descriptor: String,
}

impl DeviceHeartbeat {
    /// Whether the heartbeat is inside the liveness window ending at `now_ms`.
    #[must_use]
    pub const fn is_active(&self, now_ms: i64, window_ms: i64) -> bool {
        self.last_seen >= now_ms.saturating_sub(window_ms)
    }
}
