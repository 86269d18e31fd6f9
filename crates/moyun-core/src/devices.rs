//! Device presence: heartbeats and the active-device count

use std::sync::Arc;

use serde_json::Value;

use crate::clock::{Clock, DeviceId};
use crate::models::DeviceHeartbeat;
use crate::remote::{paths, RemoteStore, RemoteTransport};
use crate::Result;

pub struct DeviceRegistry<T> {
    remote: RemoteStore<T>,
    clock: Arc<dyn Clock>,
    device_id: DeviceId,
    client_descriptor: String,
}

impl<T: RemoteTransport> DeviceRegistry<T> {
    pub fn new(
        remote: RemoteStore<T>,
        clock: Arc<dyn Clock>,
        device_id: DeviceId,
        client_descriptor: impl Into<String>,
    ) -> Self {
        Self {
            remote,
            clock,
            device_id,
            client_descriptor: client_descriptor.into(),
        }
    }

    #[must_use]
    pub const fn device_id(&self) -> &DeviceId {
        &self.device_id
    }

    /// Overwrite this device's slot with the current time.
    ///
    /// Returns `false` when nobody is signed in.
    pub async fn heartbeat(&self) -> Result<bool> {
        let heartbeat = DeviceHeartbeat {
            device_id: self.device_id.to_string(),
            last_seen: self.clock.now_ms(),
            client_descriptor: self.client_descriptor.clone(),
        };
        let written = self
            .remote
            .write(
                &paths::device(self.device_id.as_str()),
                &serde_json::to_value(&heartbeat)?,
            )
            .await?;
        if written {
            tracing::debug!("Heartbeat sent for device {}", self.device_id);
        }
        Ok(written)
    }

    /// Every readable device slot, most recently seen first.
    pub async fn devices(&self) -> Result<Vec<DeviceHeartbeat>> {
        let Some(Value::Object(slots)) = self.remote.read(paths::DEVICES).await? else {
            return Ok(Vec::new());
        };

        let mut devices: Vec<DeviceHeartbeat> = slots
            .into_iter()
            .filter_map(|(device_id, slot)| {
                match serde_json::from_value::<DeviceHeartbeat>(slot) {
                    Ok(mut heartbeat) => {
                        heartbeat.device_id = device_id;
                        Some(heartbeat)
                    }
                    Err(error) => {
                        tracing::warn!("Skipping malformed device slot {}: {}", device_id, error);
                        None
                    }
                }
            })
            .collect();
        devices.sort_by(|a, b| b.last_seen.cmp(&a.last_seen));
        Ok(devices)
    }

    /// Devices seen within `window_ms` of now. Stale slots are left in place.
    pub async fn active_device_count(&self, window_ms: i64) -> Result<usize> {
        let now = self.clock.now_ms();
        Ok(self
            .devices()
            .await?
            .iter()
            .filter(|device| device.is_active(now, window_ms))
            .count())
    }
}
