mod curtain;
mod diffuser;
mod fan;
pub mod state;
mod switch;
mod thermostat;

use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use derive_builder::Builder;
use futures::FutureExt;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::{Mutex, MutexGuard};
use tracing::{debug, info};

use crate::debounce::{SettleHandle, SingleFlight};
use crate::error::AdapterError;
use crate::hap::{AccessoryPointer, Characteristic, HapType, ServiceType};
use crate::history::{HistoryEntry, HistoryLog};
use crate::platform::Platform;
use crate::telemetry::Metrics;

pub use curtain::CurtainAccessory;
pub use diffuser::DiffuserAccessory;
pub use fan::FanAccessory;
pub use switch::SwitchAccessory;
pub use thermostat::ThermostatAccessory;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceType {
    Curtain,
    Fan,
    Diffuser,
    Thermostat,
    Switch,
}

impl DeviceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeviceType::Curtain => "curtain",
            DeviceType::Fan => "fan",
            DeviceType::Diffuser => "diffuser",
            DeviceType::Thermostat => "thermostat",
            DeviceType::Switch => "switch",
        }
    }
}

/// Per-device behaviour switches resolved from the bridge settings.
#[derive(Debug, Clone, Default, Builder)]
#[builder(default, setter(into))]
pub struct AdapterOptions {
    pub debug: bool,
    pub disable_device_logging: bool,
    pub temperature_offset: f64,
    pub sensor_type: Option<String>,
}

impl AdapterOptions {
    /// DS18B20 sensors only report temperature.
    pub fn has_humidity_sensor(&self) -> bool {
        self.sensor_type.as_deref() != Some("DS18B20")
    }
}

/// Entry point the bridge calls with every payload received from the device.
#[async_trait]
pub trait DeviceAdapter: Send + Sync {
    fn device_id(&self) -> &str;

    fn device_type(&self) -> DeviceType;

    async fn external_update(&self, params: &Value);
}

/// What every adapter needs to talk to its accessory and to the platform.
pub(crate) struct AdapterCore {
    pub(crate) id: String,
    pub(crate) name: String,
    pub(crate) device_type: DeviceType,
    pub(crate) platform: Arc<dyn Platform>,
    pub(crate) accessory: AccessoryPointer,
    pub(crate) options: AdapterOptions,
    history: Option<Arc<dyn HistoryLog>>,
    edit_gate: Mutex<()>,
}

impl AdapterCore {
    pub(crate) async fn new(
        device_type: DeviceType,
        platform: Arc<dyn Platform>,
        accessory: AccessoryPointer,
        options: AdapterOptions,
    ) -> Self {
        let (id, name, history) = {
            let accessory = accessory.lock().await;
            (
                accessory.device_id().to_string(),
                accessory.display_name().to_string(),
                accessory.history(),
            )
        };
        Self {
            id,
            name,
            device_type,
            platform,
            accessory,
            options,
            history,
            edit_gate: Mutex::new(()),
        }
    }

    pub(crate) fn logging_enabled(&self) -> bool {
        !self.options.disable_device_logging
    }

    pub(crate) fn log_options(&self) {
        if self.options.debug {
            info!(
                "[{}] initialising {} with options {:?}.",
                self.name,
                self.device_type.as_str(),
                self.options
            );
        }
    }

    pub(crate) async fn send(&self, params: Value) -> Result<(), AdapterError> {
        debug!("[{}] sending {params}", self.name);
        match self.platform.send_device_update(&self.id, params).await {
            Ok(()) => {
                Metrics::inc_payloads_sent(self.device_type.as_str());
                Ok(())
            }
            Err(e) => {
                Metrics::inc_payload_failures(self.device_type.as_str());
                Err(e.into())
            }
        }
    }

    /// Waits for the turn to commit and send a local edit. Held across the
    /// send, never while sleeping, so payloads leave in commit order.
    pub(crate) async fn edit_turn(&self) -> MutexGuard<'_, ()> {
        self.edit_gate.lock().await
    }

    /// False once a newer edit arrived on the same control.
    pub(crate) fn is_latest(&self, edit: &SettleHandle) -> bool {
        if edit.is_current() {
            return true;
        }
        debug!("[{}] dropping superseded edit {:?}", self.name, edit.token());
        self.edit_superseded();
        false
    }

    pub(crate) fn report_local_error(&self, error: AdapterError) {
        self.platform.device_update_error(&self.id, &error, true);
    }

    pub(crate) fn report_external_error(&self, error: AdapterError) {
        self.platform.device_update_error(&self.id, &error, false);
    }

    pub(crate) fn echo_suppressed(&self) {
        debug!("[{}] ignoring device update during suppression window", self.name);
        Metrics::inc_echoes_suppressed(self.device_type.as_str());
    }

    pub(crate) fn echo_applied(&self) {
        Metrics::inc_echoes_applied(self.device_type.as_str());
    }

    pub(crate) fn edit_superseded(&self) {
        Metrics::inc_edits_superseded(self.device_type.as_str());
    }

    pub(crate) fn add_history(&self, entry: HistoryEntry) {
        if let Some(history) = &self.history {
            history.add_entry(entry);
        }
    }

    pub(crate) async fn update_characteristic(
        &self,
        service_type: ServiceType,
        hap_type: HapType,
        value: impl Into<Value>,
    ) -> Result<(), AdapterError> {
        self.accessory
            .lock()
            .await
            .update_characteristic(service_type, hap_type, value)
    }

    pub(crate) async fn characteristic_value<T: DeserializeOwned>(
        &self,
        service_type: ServiceType,
        hap_type: HapType,
    ) -> Option<T> {
        self.accessory
            .lock()
            .await
            .characteristic_value(service_type, hap_type)
    }
}

/// Decodes a device payload into the adapter's typed parameter set.
pub(crate) fn decode_params<T: DeserializeOwned>(params: &Value) -> Result<T, AdapterError> {
    Ok(T::deserialize(params)?)
}

/// Registers a local-edit handler that acknowledges the write immediately and
/// finishes the work on the runtime.
///
/// The edit's token is taken from `flight` when the write arrives, before the
/// handler is scheduled, so a later write supersedes an earlier one no matter
/// in which order the runtime polls the handlers.
///
/// The characteristic only keeps a weak reference to the adapter, so dropping
/// the adapter detaches its handlers.
pub(crate) fn on_local_edit<A, T, F, Fut>(
    characteristic: &mut Characteristic,
    adapter: &Arc<A>,
    flight: &SingleFlight,
    handler: F,
) where
    A: Send + Sync + 'static,
    T: DeserializeOwned + Send + 'static,
    F: Fn(Arc<A>, T, SettleHandle) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    let adapter = Arc::downgrade(adapter);
    let flight = flight.clone();
    characteristic.on_update_async(Some(move |_old: T, new: T| {
        let edit = flight.begin();
        if let Some(adapter) = adapter.upgrade() {
            tokio::spawn(handler(adapter, new, edit));
        }
        async { Ok::<(), anyhow::Error>(()) }.boxed()
    }));
}
