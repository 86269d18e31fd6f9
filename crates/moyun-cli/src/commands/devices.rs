use std::path::Path;

use chrono::Utc;
use moyun_core::models::DeviceHeartbeat;
use serde::Serialize;

use crate::cli::DevicesCommands;
use crate::commands::common::{format_relative_time, open_engine};
use crate::error::CliError;

#[derive(Debug, Serialize)]
pub struct DeviceListItem {
    pub device_id: String,
    pub last_seen: i64,
    pub client_descriptor: String,
    pub current: bool,
}

pub async fn run_devices(
    command: DevicesCommands,
    db_path: &Path,
    profile: Option<&str>,
) -> Result<(), CliError> {
    let engine = open_engine(db_path, profile).await?;
    match command {
        DevicesCommands::Heartbeat => {
            engine.heartbeat().await?;
            println!("Heartbeat sent for {}", engine.device_id());
        }
        DevicesCommands::List { json } => {
            let devices = engine.devices().await?;
            if json {
                let json_items = devices
                    .iter()
                    .map(|device| DeviceListItem {
                        device_id: device.device_id.clone(),
                        last_seen: device.last_seen,
                        client_descriptor: device.client_descriptor.clone(),
                        current: device.device_id == engine.device_id().as_str(),
                    })
                    .collect::<Vec<DeviceListItem>>();
                println!("{}", serde_json::to_string_pretty(&json_items)?);
            } else if devices.is_empty() {
                println!("No devices recorded.");
            } else {
                let lines = format_device_lines(
                    &devices,
                    engine.device_id().as_str(),
                    Utc::now().timestamp_millis(),
                );
                for line in lines {
                    println!("{line}");
                }
            }
        }
        DevicesCommands::Count => {
            println!("{}", engine.active_device_count().await?);
        }
    }
    Ok(())
}

pub fn format_device_lines(devices: &[DeviceHeartbeat], this_device: &str, now_ms: i64) -> Vec<String> {
    devices
        .iter()
        .map(|device| {
            let marker = if device.device_id == this_device { "*" } else { " " };
            format!(
                "{marker} {:<36}  {:<10}  {}",
                device.device_id,
                format_relative_time(device.last_seen, now_ms),
                device.client_descriptor
            )
        })
        .collect()
}
