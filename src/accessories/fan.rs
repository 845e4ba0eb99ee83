use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::Mutex;
use tracing::info;

use crate::accessories::state::OnOff;
use crate::accessories::state::fan::{FanParams, FanState};
use crate::accessories::{
    AdapterCore, AdapterOptions, DeviceAdapter, DeviceType, decode_params, on_local_edit,
};
use crate::debounce::{SettleHandle, SingleFlight, SuppressionWindow};
use crate::error::AdapterError;
use crate::hap::{AccessoryPointer, HapType, ServiceType};
use crate::platform::Platform;

const SPEED_SETTLE: Duration = Duration::from_millis(450);

#[derive(Debug, Default)]
struct FanCache {
    state: Option<FanState>,
}

struct FanInner {
    core: AdapterCore,
    cache: Mutex<FanCache>,
    active_edits: SingleFlight,
    speed_edits: SingleFlight,
    light_edits: SingleFlight,
    suppression: SuppressionWindow,
}

/// Ceiling fan with light, emulated on a four channel relay.
pub struct FanAccessory {
    inner: Arc<FanInner>,
}

impl FanAccessory {
    pub async fn new(
        platform: Arc<dyn Platform>,
        accessory: AccessoryPointer,
        options: AdapterOptions,
    ) -> Result<Self, AdapterError> {
        let core = AdapterCore::new(DeviceType::Fan, platform, accessory.clone(), options).await;
        let inner = Arc::new(FanInner {
            core,
            cache: Mutex::new(FanCache::default()),
            active_edits: SingleFlight::new(),
            speed_edits: SingleFlight::new(),
            light_edits: SingleFlight::new(),
            suppression: SuppressionWindow::default(),
        });

        {
            let mut accessory = accessory.lock().await;
            let fan = accessory.get_or_add_service(ServiceType::Fanv2, None);
            on_local_edit(
                fan.characteristic_mut(HapType::Active),
                &inner,
                &inner.active_edits,
                FanInner::set_active,
            );
            on_local_edit(
                fan.characteristic_mut(HapType::RotationSpeed),
                &inner,
                &inner.speed_edits,
                FanInner::set_speed,
            );

            let light = accessory.get_or_add_service(ServiceType::Lightbulb, None);
            on_local_edit(
                light.characteristic_mut(HapType::On),
                &inner,
                &inner.light_edits,
                FanInner::set_light,
            );
        }

        inner.core.log_options();
        Ok(Self { inner })
    }
}

impl FanInner {
    async fn current(&self) -> FanState {
        self.cache.lock().await.state.unwrap_or_default()
    }

    async fn set_active(self: Arc<Self>, active: u8, edit: SettleHandle) {
        let _turn = self.core.edit_turn().await;
        if !self.core.is_latest(&edit) {
            return;
        }
        let candidate = self.current().await.with_power(active == 1);
        self.apply(candidate).await;
    }

    async fn set_light(self: Arc<Self>, on: bool, edit: SettleHandle) {
        let _turn = self.core.edit_turn().await;
        if !self.core.is_latest(&edit) {
            return;
        }
        let candidate = self.current().await.with_light(on);
        self.apply(candidate).await;
    }

    async fn set_speed(self: Arc<Self>, speed: f64, edit: SettleHandle) {
        let cached = self.cache.lock().await.state;
        if let Some(current) = cached
            && current.with_speed(speed) == current
        {
            // Snap the slider back to the tier the fan is already running at.
            // Taking this edit's token already dropped any pending speed.
            if let Err(e) = self.sync_characteristics(current).await {
                self.core.report_local_error(e);
            }
            return;
        }

        if !edit.settle(SPEED_SETTLE).await {
            self.core.edit_superseded();
            return;
        }

        let _turn = self.core.edit_turn().await;
        if !self.core.is_latest(&edit) {
            return;
        }
        let candidate = self.current().await.with_speed(speed);
        self.apply(candidate).await;
    }

    async fn apply(&self, candidate: FanState) {
        {
            let mut cache = self.cache.lock().await;
            if cache.state == Some(candidate) {
                return;
            }
            cache.state = Some(candidate);
        }

        self.suppression.arm();
        if let Err(e) = self.core.send(candidate.to_params()).await {
            self.core.platform.request_device_refresh(&self.core.id, &e);
            return;
        }

        if let Err(e) = self.sync_characteristics(candidate).await {
            self.core.report_local_error(e);
            return;
        }

        if self.core.logging_enabled() {
            self.log_state(candidate);
        }
    }

    async fn sync_characteristics(&self, state: FanState) -> Result<(), AdapterError> {
        let mut accessory = self.core.accessory.lock().await;
        accessory.update_characteristic(ServiceType::Lightbulb, HapType::On, state.light)?;
        accessory.update_characteristic(ServiceType::Fanv2, HapType::Active, u8::from(state.active))?;
        accessory.update_characteristic(ServiceType::Fanv2, HapType::RotationSpeed, state.speed)
    }

    fn log_state(&self, state: FanState) {
        info!(
            "[{}] current state [{}], speed [{}%], light [{}].",
            self.core.name,
            OnOff::from(state.active),
            state.speed,
            OnOff::from(state.light)
        );
    }

    async fn apply_echo(&self, params: &Value) -> Result<(), AdapterError> {
        if self.suppression.is_active() {
            self.core.echo_suppressed();
            return Ok(());
        }

        let params: FanParams = decode_params(params)?;
        let state = params.state()?;
        {
            let mut cache = self.cache.lock().await;
            if cache.state == Some(state) {
                return Ok(());
            }
            cache.state = Some(state);
        }

        self.sync_characteristics(state).await?;
        self.core.echo_applied();
        if params.update_source && self.core.logging_enabled() {
            self.log_state(state);
        }
        Ok(())
    }
}

#[async_trait]
impl DeviceAdapter for FanAccessory {
    fn device_id(&self) -> &str {
        &self.inner.core.id
    }

    fn device_type(&self) -> DeviceType {
        DeviceType::Fan
    }

    async fn external_update(&self, params: &Value) {
        if let Err(e) = self.inner.apply_echo(params).await {
            self.inner.core.report_external_error(e);
        }
    }
}
