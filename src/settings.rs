use std::collections::HashMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::accessories::{AdapterOptions, AdapterOptionsBuilder, AdapterOptionsBuilderError};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Log adapter options at start-up.
    pub debug: bool,
    /// Suppress the per-device state log lines.
    pub disable_device_logging: bool,
    /// Directory holding persisted accessory contexts.
    pub storage_dir: Option<String>,
    /// Directory for switch and thermostat history files.
    pub history_dir: Option<String>,
    /// Per-device overrides keyed by device id.
    pub devices: HashMap<String, DeviceSettings>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceSettings {
    pub override_disabled_logging: bool,
    /// Added to every temperature the device reports.
    pub offset: Option<f64>,
    /// Sensor model attached to a simulated thermostat, e.g. `DS18B20`.
    pub sensor_type: Option<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            debug: false,
            disable_device_logging: false,
            storage_dir: Some(String::from("persist")),
            history_dir: Some(String::from("history")),
            devices: HashMap::new(),
        }
    }
}

impl Settings {
    /// Reads settings from a JSON file, falling back to defaults when the file
    /// cannot be read.
    pub fn load(path: impl AsRef<Path>) -> serde_json::Result<Self> {
        match std::fs::read_to_string(path.as_ref()) {
            Ok(content) => serde_json::from_str(&content),
            Err(e) => {
                warn!(
                    "Failed to read settings file {}: {e}, using default settings",
                    path.as_ref().display()
                );
                Ok(Settings::default())
            }
        }
    }

    pub fn adapter_options(
        &self,
        device_id: &str,
    ) -> Result<AdapterOptions, AdapterOptionsBuilderError> {
        let device = self.devices.get(device_id).cloned().unwrap_or_default();
        AdapterOptionsBuilder::default()
            .debug(self.debug)
            .disable_device_logging(
                self.disable_device_logging && !device.override_disabled_logging,
            )
            .temperature_offset(device.offset.unwrap_or_default())
            .sensor_type(device.sensor_type)
            .build()
    }
}
