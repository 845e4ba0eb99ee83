use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::accessories::state::OnOff;
use crate::accessories::state::thermostat::{
    DEFAULT_TARGET, TARGET_CONTEXT_KEY, ThermostatParams, ThresholdPayload, heating_state,
    main_switch_params,
};
use crate::accessories::{
    AdapterCore, AdapterOptions, DeviceAdapter, DeviceType, decode_params, on_local_edit,
};
use crate::debounce::{SettleHandle, SingleFlight, SuppressionWindow};
use crate::error::AdapterError;
use crate::hap::{AccessoryPointer, HapType, Props, ServiceType, write_characteristic};
use crate::history::HistoryEntry;
use crate::platform::Platform;

/// Delay before the stored target is pushed back to the device after start-up.
const INITIAL_SYNC_DELAY: Duration = Duration::from_secs(5);

#[derive(Debug, Default)]
struct ThermostatCache {
    on: Option<bool>,
    heating: Option<bool>,
    temperature: Option<f64>,
    humidity: Option<f64>,
}

struct ThermostatInner {
    core: AdapterCore,
    cache: Mutex<ThermostatCache>,
    initial_sync: SingleFlight,
    mode_edits: SingleFlight,
    target_edits: SingleFlight,
    suppression: SuppressionWindow,
    has_humidity: bool,
}

/// Thermostat simulated on a heater relay with a temperature (and humidity)
/// sensor. The device runs the threshold automation itself, so the target
/// temperature is only known locally and is kept in the accessory context.
pub struct ThermostatAccessory {
    inner: Arc<ThermostatInner>,
}

impl ThermostatAccessory {
    pub async fn new(
        platform: Arc<dyn Platform>,
        accessory: AccessoryPointer,
        options: AdapterOptions,
    ) -> Result<Self, AdapterError> {
        let has_humidity = options.has_humidity_sensor();
        let core = AdapterCore::new(DeviceType::Thermostat, platform, accessory.clone(), options).await;
        let inner = Arc::new(ThermostatInner {
            core,
            cache: Mutex::new(ThermostatCache::default()),
            initial_sync: SingleFlight::new(),
            mode_edits: SingleFlight::new(),
            target_edits: SingleFlight::new(),
            suppression: SuppressionWindow::default(),
            has_humidity,
        });

        let (target, pending_save) = {
            let mut accessory = accessory.lock().await;
            for legacy in [
                ServiceType::Switch,
                ServiceType::TemperatureSensor,
                ServiceType::HumiditySensor,
            ] {
                accessory.remove_service(legacy);
            }

            let seeded = !accessory.context().contains_key(TARGET_CONTEXT_KEY);
            if seeded {
                accessory
                    .context_mut()
                    .set(TARGET_CONTEXT_KEY, DEFAULT_TARGET);
            }
            let target = accessory
                .context()
                .get::<f64>(TARGET_CONTEXT_KEY)
                .unwrap_or(DEFAULT_TARGET);
            let pending_save = if seeded {
                accessory
                    .storage()
                    .cloned()
                    .map(|storage| (storage, accessory.context().clone()))
            } else {
                None
            };

            let service = accessory.get_or_add_service(ServiceType::Thermostat, None);
            service
                .characteristic_mut(HapType::CurrentTemperature)
                .set_props(Props {
                    min_value: Some(-100.0),
                    min_step: Some(0.1),
                    ..Default::default()
                });
            on_local_edit(
                service
                    .characteristic_mut(HapType::TargetHeatingCoolingState)
                    .set_props(Props::range(0.0, 1.0, 1.0).with_valid_values(vec![0, 1])),
                &inner,
                &inner.mode_edits,
                ThermostatInner::set_mode,
            );
            on_local_edit(
                service
                    .characteristic_mut(HapType::TargetTemperature)
                    .set_props(Props::range(0.0, 30.0, 0.5)),
                &inner,
                &inner.target_edits,
                ThermostatInner::set_target,
            );
            if has_humidity {
                service.characteristic_mut(HapType::CurrentRelativeHumidity);
            }
            (target, pending_save)
        };

        if let Some((storage, context)) = pending_save {
            storage.save_context(&inner.core.id, &context).await?;
        }

        inner.schedule_initial_sync(target);
        inner.core.log_options();
        Ok(Self { inner })
    }
}

impl ThermostatInner {
    /// Re-applies the stored target so the device automation matches it.
    fn schedule_initial_sync(&self, target: f64) {
        let accessory = self.core.accessory.clone();
        let name = self.core.name.clone();
        self.initial_sync.schedule(INITIAL_SYNC_DELAY, async move {
            if let Err(e) = write_characteristic(
                &accessory,
                ServiceType::Thermostat,
                HapType::TargetTemperature,
                Value::from(target),
            )
            .await
            {
                warn!("[{name}] could not restore target temperature: {e}");
            }
        });
    }

    async fn current_temperature(&self) -> f64 {
        self.core
            .characteristic_value(ServiceType::Thermostat, HapType::CurrentTemperature)
            .await
            .unwrap_or_default()
    }

    async fn target(&self) -> f64 {
        self.core
            .accessory
            .lock()
            .await
            .context()
            .get(TARGET_CONTEXT_KEY)
            .unwrap_or(DEFAULT_TARGET)
    }

    async fn show_heating(&self, heating: bool) -> Result<(), AdapterError> {
        self.core
            .update_characteristic(
                ServiceType::Thermostat,
                HapType::CurrentHeatingCoolingState,
                u8::from(heating),
            )
            .await
    }

    async fn set_mode(self: Arc<Self>, mode: u8, edit: SettleHandle) {
        let _turn = self.core.edit_turn().await;
        if !self.core.is_latest(&edit) {
            return;
        }
        let on = mode != 0;
        {
            let mut cache = self.cache.lock().await;
            if cache.on == Some(on) {
                return;
            }
            cache.on = Some(on);
        }

        let heating = heating_state(on, self.current_temperature().await, self.target().await);
        self.cache.lock().await.heating = Some(heating);
        if let Err(e) = self.show_heating(heating).await {
            self.core.report_local_error(e);
            return;
        }

        self.suppression.arm();
        if let Err(e) = self.core.send(main_switch_params(on)).await {
            self.core.report_local_error(e);
            return;
        }
        if self.core.logging_enabled() {
            info!("[{}] current state [{}].", self.core.name, OnOff::from(on));
        }
    }

    async fn set_target(self: Arc<Self>, target: f64, edit: SettleHandle) {
        self.initial_sync.cancel();
        let _turn = self.core.edit_turn().await;
        if !self.core.is_latest(&edit) {
            return;
        }
        if let Err(e) = self.apply_target(target).await {
            self.core.report_local_error(e);
            return;
        }
        if self.core.logging_enabled() {
            info!("[{}] current target [{target}°C].", self.core.name);
        }
    }

    async fn apply_target(&self, target: f64) -> Result<(), AdapterError> {
        let pending_save = {
            let mut accessory = self.core.accessory.lock().await;
            accessory.context_mut().set(TARGET_CONTEXT_KEY, target);
            accessory.update_characteristic(
                ServiceType::Thermostat,
                HapType::TargetHeatingCoolingState,
                1,
            )?;
            accessory
                .storage()
                .cloned()
                .map(|storage| (storage, accessory.context().clone()))
        };
        if let Some((storage, context)) = pending_save {
            storage.save_context(&self.core.id, &context).await?;
        }

        let heating = heating_state(true, self.current_temperature().await, target);
        {
            let mut cache = self.cache.lock().await;
            cache.on = Some(true);
            cache.heating = Some(heating);
        }
        self.show_heating(heating).await?;

        self.suppression.arm();
        let params = serde_json::to_value(ThresholdPayload::new(target))?;
        self.core.send(params).await
    }

    async fn apply_echo(&self, params: &Value) -> Result<(), AdapterError> {
        let params: ThermostatParams = decode_params(params)?;
        let log = params.update_source && self.core.logging_enabled();
        let offset = self.core.options.temperature_offset;
        let mut cache = self.cache.lock().await;
        let mut accessory = self.core.accessory.lock().await;
        let mut changed = false;

        if let Some(main) = params.main_switch {
            if self.suppression.is_active() {
                self.core.echo_suppressed();
            } else if cache.on != Some(main.is_on()) {
                cache.on = Some(main.is_on());
                accessory.update_characteristic(
                    ServiceType::Thermostat,
                    HapType::TargetHeatingCoolingState,
                    u8::from(main.is_on()),
                )?;
                self.core.add_history(HistoryEntry::status(main.is_on()));
                if !main.is_on() {
                    cache.heating = Some(false);
                    accessory.update_characteristic(
                        ServiceType::Thermostat,
                        HapType::CurrentHeatingCoolingState,
                        0,
                    )?;
                }
                changed = true;
                // A heating report in the same payload gets its own line.
                if log && params.switch.is_none() {
                    info!("[{}] current state [{main}].", self.core.name);
                }
            }
        }

        if let Some(switch) = params.switch
            && cache.heating != Some(switch.is_on())
        {
            cache.heating = Some(switch.is_on());
            accessory.update_characteristic(
                ServiceType::Thermostat,
                HapType::CurrentHeatingCoolingState,
                u8::from(switch.is_on()),
            )?;
            changed = true;
            if log {
                info!("[{}] current heating [{switch}].", self.core.name);
            }
        }

        if let Some(reading) = params.current_temperature {
            let temperature = ((reading + offset) * 10.0).round() / 10.0;
            if cache.temperature != Some(temperature) {
                cache.temperature = Some(temperature);
                accessory.update_characteristic(
                    ServiceType::Thermostat,
                    HapType::CurrentTemperature,
                    temperature,
                )?;
                self.core.add_history(HistoryEntry::temperature(temperature));
                changed = true;
                if log {
                    info!("[{}] current temperature [{temperature}°C].", self.core.name);
                }
            }
        }

        if let Some(reading) = params.current_humidity
            && self.has_humidity
        {
            let humidity = reading.round();
            if cache.humidity != Some(humidity) {
                cache.humidity = Some(humidity);
                accessory.update_characteristic(
                    ServiceType::Thermostat,
                    HapType::CurrentRelativeHumidity,
                    humidity,
                )?;
                self.core.add_history(HistoryEntry::humidity(humidity));
                changed = true;
                if log {
                    info!("[{}] current humidity [{humidity}%].", self.core.name);
                }
            }
        }

        if changed {
            self.core.echo_applied();
        }
        Ok(())
    }
}

#[async_trait]
impl DeviceAdapter for ThermostatAccessory {
    fn device_id(&self) -> &str {
        &self.inner.core.id
    }

    fn device_type(&self) -> DeviceType {
        DeviceType::Thermostat
    }

    async fn external_update(&self, params: &Value) {
        if let Err(e) = self.inner.apply_echo(params).await {
            self.inner.core.report_external_error(e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::accessories::AdapterOptionsBuilder;
    use crate::hap::{Accessory, AccessoryContext, FileStorage};
    use crate::history::MemoryHistory;
    use crate::testing::{CapturedLogs, FakePlatform};
    use serde_json::json;
    use tempfile::TempDir;
    use tokio::time::sleep;

    async fn thermostat(
        platform: Arc<FakePlatform>,
        accessory: Accessory,
        options: AdapterOptions,
    ) -> (ThermostatAccessory, AccessoryPointer) {
        let accessory = accessory.into_pointer();
        let adapter = ThermostatAccessory::new(platform, accessory.clone(), options)
            .await
            .unwrap();
        (adapter, accessory)
    }

    fn plain() -> Accessory {
        Accessory::new("1000thermo", "Heater")
    }

    async fn write(accessory: &AccessoryPointer, hap: HapType, value: Value) {
        write_characteristic(accessory, ServiceType::Thermostat, hap, value)
            .await
            .unwrap();
        sleep(Duration::from_millis(10)).await;
    }

    async fn value<T: serde::de::DeserializeOwned>(
        accessory: &AccessoryPointer,
        hap: HapType,
    ) -> Option<T> {
        accessory
            .lock()
            .await
            .characteristic_value(ServiceType::Thermostat, hap)
    }

    #[tokio::test(start_paused = true)]
    async fn test_target_above_current_turns_heating_on() {
        let platform = FakePlatform::new();
        let (adapter, accessory) =
            thermostat(platform.clone(), plain(), AdapterOptions::default()).await;

        adapter
            .external_update(&json!({"currentTemperature": 20}))
            .await;
        write(&accessory, HapType::TargetTemperature, Value::from(22.5)).await;

        assert_eq!(
            platform.payloads(),
            vec![json!({
                "deviceType": "temperature",
                "targets": [
                    {"targetHigh": "22.5", "reaction": {"switch": "off"}},
                    {"targetLow": "22.5", "reaction": {"switch": "on"}},
                ]
            })]
        );
        assert_eq!(
            value::<u8>(&accessory, HapType::CurrentHeatingCoolingState).await,
            Some(1)
        );
        assert_eq!(
            value::<u8>(&accessory, HapType::TargetHeatingCoolingState).await,
            Some(1)
        );
        assert_eq!(
            accessory.lock().await.context().get::<f64>(TARGET_CONTEXT_KEY),
            Some(22.5)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_stored_target_is_restored_after_start() {
        let platform = FakePlatform::new();
        let mut context = AccessoryContext::default();
        context.set(TARGET_CONTEXT_KEY, 18.5);
        let (_adapter, _accessory) = thermostat(
            platform.clone(),
            plain().with_context(context),
            AdapterOptions::default(),
        )
        .await;

        sleep(Duration::from_millis(4_900)).await;
        assert!(platform.payloads().is_empty());

        sleep(Duration::from_millis(200)).await;
        let payloads = platform.payloads();
        assert_eq!(payloads.len(), 1);
        assert_eq!(payloads[0]["targets"][0]["targetHigh"], "18.5");
    }

    #[tokio::test(start_paused = true)]
    async fn test_user_target_cancels_initial_sync() {
        let platform = FakePlatform::new();
        let (_adapter, accessory) =
            thermostat(platform.clone(), plain(), AdapterOptions::default()).await;

        sleep(Duration::from_secs(1)).await;
        write(&accessory, HapType::TargetTemperature, Value::from(24)).await;
        sleep(Duration::from_secs(6)).await;

        let payloads = platform.payloads();
        assert_eq!(payloads.len(), 1);
        assert_eq!(payloads[0]["targets"][1]["targetLow"], "24.0");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_last_target_wins_when_written_from_a_worker() {
        for _ in 0..20 {
            let platform = FakePlatform::new();
            let (_adapter, accessory) =
                thermostat(platform.clone(), plain(), AdapterOptions::default()).await;

            let writer = accessory.clone();
            tokio::spawn(async move {
                for target in [21.0, 22.0, 23.0] {
                    write_characteristic(
                        &writer,
                        ServiceType::Thermostat,
                        HapType::TargetTemperature,
                        Value::from(target),
                    )
                    .await
                    .unwrap();
                }
            })
            .await
            .unwrap();

            let mut stored = None;
            for _ in 0..200 {
                stored = accessory
                    .lock()
                    .await
                    .context()
                    .get::<f64>(TARGET_CONTEXT_KEY);
                if stored == Some(23.0) {
                    break;
                }
                sleep(Duration::from_millis(5)).await;
            }
            sleep(Duration::from_millis(20)).await;

            assert_eq!(stored, Some(23.0));
            let payloads = platform.payloads();
            assert_eq!(payloads.last().unwrap()["targets"][0]["targetHigh"], "23.0");
            assert_eq!(
                accessory.lock().await.context().get::<f64>(TARGET_CONTEXT_KEY),
                Some(23.0)
            );
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_mode_edits() {
        let platform = FakePlatform::new();
        let (_adapter, accessory) =
            thermostat(platform.clone(), plain(), AdapterOptions::default()).await;

        write(&accessory, HapType::TargetHeatingCoolingState, Value::from(1)).await;
        write(&accessory, HapType::TargetHeatingCoolingState, Value::from(1)).await;
        write(&accessory, HapType::TargetHeatingCoolingState, Value::from(0)).await;

        assert_eq!(
            platform.payloads(),
            vec![
                json!({"mainSwitch": "on"}),
                json!({"mainSwitch": "off", "switch": "off"}),
            ]
        );
        assert_eq!(
            value::<u8>(&accessory, HapType::CurrentHeatingCoolingState).await,
            Some(0)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_main_switch_echo_suppressed_but_readings_applied() {
        let platform = FakePlatform::new();
        let (adapter, accessory) =
            thermostat(platform.clone(), plain(), AdapterOptions::default()).await;

        write(&accessory, HapType::TargetHeatingCoolingState, Value::from(1)).await;
        adapter
            .external_update(&json!({"mainSwitch": "off", "currentTemperature": "19.4"}))
            .await;

        assert_eq!(
            value::<u8>(&accessory, HapType::TargetHeatingCoolingState).await,
            Some(1)
        );
        assert_eq!(
            value::<f64>(&accessory, HapType::CurrentTemperature).await,
            Some(19.4)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_echo_readings_with_offset_and_history() {
        let logs = CapturedLogs::default();
        let _guard = logs.install();
        let platform = FakePlatform::new();
        let history = Arc::new(MemoryHistory::default());
        let options = AdapterOptionsBuilder::default()
            .temperature_offset(-0.5)
            .build()
            .unwrap();
        let (adapter, accessory) =
            thermostat(platform.clone(), plain().with_history(history.clone()), options).await;

        let echo = json!({
            "mainSwitch": "on",
            "switch": "on",
            "currentTemperature": "21.7",
            "currentHumidity": "48.6",
            "updateSource": true,
        });
        adapter.external_update(&echo).await;
        adapter.external_update(&echo).await;

        assert_eq!(
            value::<f64>(&accessory, HapType::CurrentTemperature).await,
            Some(21.2)
        );
        assert_eq!(
            value::<f64>(&accessory, HapType::CurrentRelativeHumidity).await,
            Some(49.0)
        );
        assert_eq!(
            value::<u8>(&accessory, HapType::CurrentHeatingCoolingState).await,
            Some(1)
        );

        let entries = history.entries();
        assert_eq!(entries.len(), 3);
        assert_eq!(entries[0].status, Some(1));
        assert_eq!(entries[1].temp, Some(21.2));
        assert_eq!(entries[2].humidity, Some(49.0));

        assert_eq!(logs.count("[Heater] current state"), 0);
        assert_eq!(logs.count("[Heater] current heating [on]."), 1);
        assert_eq!(logs.count("[Heater] current temperature [21.2°C]."), 1);
        assert_eq!(logs.count("[Heater] current humidity [49%]."), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_ds18b20_has_no_humidity() {
        let platform = FakePlatform::new();
        let options = AdapterOptionsBuilder::default()
            .sensor_type(Some("DS18B20".to_string()))
            .build()
            .unwrap();
        let (adapter, accessory) = thermostat(platform.clone(), plain(), options).await;

        adapter
            .external_update(&json!({"currentHumidity": 40}))
            .await;
        let accessory = accessory.lock().await;
        let service = accessory.get_service(ServiceType::Thermostat).unwrap();
        assert!(!service.has_characteristic(HapType::CurrentRelativeHumidity));
        assert!(platform.errors().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_legacy_services_removed() {
        let platform = FakePlatform::new();
        let mut accessory = plain();
        accessory.get_or_add_service(ServiceType::Switch, None);
        accessory.get_or_add_service(ServiceType::TemperatureSensor, None);
        let (_adapter, accessory) =
            thermostat(platform, accessory, AdapterOptions::default()).await;

        let accessory = accessory.lock().await;
        assert!(accessory.get_service(ServiceType::Switch).is_none());
        assert!(accessory.get_service(ServiceType::TemperatureSensor).is_none());
        assert!(accessory.get_service(ServiceType::Thermostat).is_some());
    }

    // Real time: file I/O runs on the blocking pool and would let a paused
    // clock jump straight to the start-up sync.
    #[tokio::test]
    async fn test_target_is_persisted() {
        let dir = TempDir::new().unwrap();
        let storage = FileStorage::new(dir.path());
        let platform = FakePlatform::new();
        let (_adapter, accessory) = thermostat(
            platform,
            plain().with_storage(storage.clone()),
            AdapterOptions::default(),
        )
        .await;

        let stored = storage.load_context("1000thermo").await.unwrap();
        assert_eq!(stored.get::<f64>(TARGET_CONTEXT_KEY), Some(DEFAULT_TARGET));

        write(&accessory, HapType::TargetTemperature, Value::from(21.5)).await;
        let mut target = None;
        for _ in 0..50 {
            target = storage
                .load_context("1000thermo")
                .await
                .and_then(|c| c.get::<f64>(TARGET_CONTEXT_KEY));
            if target == Some(21.5) {
                break;
            }
            sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(target, Some(21.5));
    }

    #[tokio::test(start_paused = true)]
    async fn test_send_failure_is_reported() {
        let platform = FakePlatform::failing();
        let (_adapter, accessory) =
            thermostat(platform.clone(), plain(), AdapterOptions::default()).await;

        write(&accessory, HapType::TargetTemperature, Value::from(21)).await;
        let errors = platform.errors();
        assert_eq!(errors.len(), 1);
        assert!(errors[0].2);
    }
}
