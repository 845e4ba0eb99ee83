use std::sync::Arc;

use dashmap::DashMap;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::accessories::{
    AdapterOptions, CurtainAccessory, DeviceAdapter, DeviceType, DiffuserAccessory, FanAccessory,
    SwitchAccessory, ThermostatAccessory,
};
use crate::error::AdapterError;
use crate::hap::AccessoryPointer;
use crate::platform::Platform;

/// Builds the adapter for a device type and provisions its accessory.
pub async fn create_adapter(
    device_type: DeviceType,
    platform: Arc<dyn Platform>,
    accessory: AccessoryPointer,
    options: AdapterOptions,
) -> Result<Arc<dyn DeviceAdapter>, AdapterError> {
    let adapter: Arc<dyn DeviceAdapter> = match device_type {
        DeviceType::Curtain => Arc::new(CurtainAccessory::new(platform, accessory, options).await?),
        DeviceType::Fan => Arc::new(FanAccessory::new(platform, accessory, options).await?),
        DeviceType::Diffuser => {
            Arc::new(DiffuserAccessory::new(platform, accessory, options).await?)
        }
        DeviceType::Thermostat => {
            Arc::new(ThermostatAccessory::new(platform, accessory, options).await?)
        }
        DeviceType::Switch => Arc::new(SwitchAccessory::new(platform, accessory, options).await?),
    };
    Ok(adapter)
}

/// Routes device payloads to the adapter registered for the device id.
#[derive(Default)]
pub struct DeviceRegistry {
    adapters: DashMap<String, Arc<dyn DeviceAdapter>>,
}

impl DeviceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, adapter: Arc<dyn DeviceAdapter>) {
        let id = adapter.device_id().to_string();
        info!("Registered {} device {id}", adapter.device_type().as_str());
        if self.adapters.insert(id.clone(), adapter).is_some() {
            warn!("Replaced existing adapter for device {id}");
        }
    }

    pub fn get(&self, device_id: &str) -> Option<Arc<dyn DeviceAdapter>> {
        self.adapters.get(device_id).map(|a| a.value().clone())
    }

    pub fn len(&self) -> usize {
        self.adapters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.adapters.is_empty()
    }

    /// Hands `params` to the device's adapter. Returns false for unknown devices.
    pub async fn dispatch(&self, device_id: &str, params: &Value) -> bool {
        // Clone out of the map so no shard lock is held while the adapter runs.
        let Some(adapter) = self.get(device_id) else {
            warn!("Received update for unknown device {device_id}");
            return false;
        };
        debug!("Dispatching {params} to {device_id}");
        adapter.external_update(params).await;
        true
    }
}
