use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Value, json};
use tokio::sync::Mutex;
use tracing::info;

use crate::accessories::state::OnOff;
use crate::accessories::state::diffuser::{DiffuserParams, speed_tier, speed_to_state};
use crate::accessories::{
    AdapterCore, AdapterOptions, DeviceAdapter, DeviceType, decode_params, on_local_edit,
};
use crate::color::{hs_to_rgb, rgb_to_hs};
use crate::debounce::{SettleHandle, SingleFlight, SuppressionWindow};
use crate::error::AdapterError;
use crate::hap::{AccessoryPointer, HapType, Props, ServiceType};
use crate::platform::Platform;

const SPEED_SETTLE: Duration = Duration::from_millis(450);
const BRIGHTNESS_SETTLE: Duration = Duration::from_millis(500);
const HUE_SETTLE: Duration = Duration::from_millis(400);

#[derive(Debug, Default)]
struct DiffuserCache {
    on: Option<bool>,
    speed: Option<u8>,
    light_on: Option<bool>,
    brightness: Option<u8>,
    hue: Option<u16>,
    rgb: Option<[u8; 3]>,
}

struct DiffuserInner {
    core: AdapterCore,
    cache: Mutex<DiffuserCache>,
    on_edits: SingleFlight,
    speed_edits: SingleFlight,
    light_edits: SingleFlight,
    brightness_edits: SingleFlight,
    hue_edits: SingleFlight,
    saturation_edits: SingleFlight,
    suppression: SuppressionWindow,
}

/// Aroma diffuser with a two speed mist fan and an RGB light.
pub struct DiffuserAccessory {
    inner: Arc<DiffuserInner>,
}

impl DiffuserAccessory {
    pub async fn new(
        platform: Arc<dyn Platform>,
        accessory: AccessoryPointer,
        options: AdapterOptions,
    ) -> Result<Self, AdapterError> {
        let core = AdapterCore::new(DeviceType::Diffuser, platform, accessory.clone(), options).await;
        let inner = Arc::new(DiffuserInner {
            core,
            cache: Mutex::new(DiffuserCache::default()),
            on_edits: SingleFlight::new(),
            speed_edits: SingleFlight::new(),
            light_edits: SingleFlight::new(),
            brightness_edits: SingleFlight::new(),
            hue_edits: SingleFlight::new(),
            saturation_edits: SingleFlight::new(),
            suppression: SuppressionWindow::default(),
        });

        {
            let mut accessory = accessory.lock().await;
            let fan = accessory.get_or_add_service(ServiceType::Fan, Some("Diffuser"));
            on_local_edit(
                fan.characteristic_mut(HapType::On),
                &inner,
                &inner.on_edits,
                DiffuserInner::set_on,
            );
            on_local_edit(
                fan.characteristic_mut(HapType::RotationSpeed).set_props(Props {
                    min_step: Some(50.0),
                    ..Default::default()
                }),
                &inner,
                &inner.speed_edits,
                DiffuserInner::set_speed,
            );

            let light = accessory.get_or_add_service(ServiceType::Lightbulb, Some("Light"));
            on_local_edit(
                light.characteristic_mut(HapType::On),
                &inner,
                &inner.light_edits,
                DiffuserInner::set_light,
            );
            on_local_edit(
                light.characteristic_mut(HapType::Brightness),
                &inner,
                &inner.brightness_edits,
                DiffuserInner::set_brightness,
            );
            on_local_edit(
                light.characteristic_mut(HapType::Hue),
                &inner,
                &inner.hue_edits,
                DiffuserInner::set_hue,
            );
            // Saturation is only accepted; colour is sent with the hue.
            on_local_edit(
                light.characteristic_mut(HapType::Saturation),
                &inner,
                &inner.saturation_edits,
                |_: Arc<DiffuserInner>, _: f64, _: SettleHandle| async {},
            );
        }

        inner.core.log_options();
        Ok(Self { inner })
    }
}

impl DiffuserInner {
    async fn set_on(self: Arc<Self>, on: bool, edit: SettleHandle) {
        let _turn = self.core.edit_turn().await;
        if !self.core.is_latest(&edit) {
            return;
        }
        {
            let mut cache = self.cache.lock().await;
            if cache.on == Some(on) {
                return;
            }
            cache.on = Some(on);
        }

        self.suppression.arm();
        if let Err(e) = self.core.send(json!({ "switch": OnOff::from(on) })).await {
            self.core.report_local_error(e);
            return;
        }
        if self.core.logging_enabled() {
            info!("[{}] current state [{}].", self.core.name, OnOff::from(on));
        }
    }

    async fn set_speed(self: Arc<Self>, value: f64, edit: SettleHandle) {
        // Zero comes with switching off, which the on/off handler covers.
        if value == 0.0 {
            return;
        }

        let speed = speed_tier(value);
        if self.cache.lock().await.speed == Some(speed) {
            self.show_speed(speed).await;
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

        {
            let mut cache = self.cache.lock().await;
            if cache.speed == Some(speed) {
                return;
            }
            cache.speed = Some(speed);
        }

        // Controllers that ignore min_step leave the slider where it was dropped.
        self.show_speed(speed).await;
        self.suppression.arm();
        if let Err(e) = self.core.send(json!({ "state": speed_to_state(speed) })).await {
            self.core.report_local_error(e);
            return;
        }
        if self.core.logging_enabled() {
            info!("[{}] current speed [{speed}%].", self.core.name);
        }
    }

    async fn show_speed(&self, speed: u8) {
        if let Err(e) = self
            .core
            .update_characteristic(ServiceType::Fan, HapType::RotationSpeed, speed)
            .await
        {
            self.core.report_local_error(e);
        }
    }

    async fn set_light(self: Arc<Self>, on: bool, edit: SettleHandle) {
        let _turn = self.core.edit_turn().await;
        if !self.core.is_latest(&edit) {
            return;
        }
        {
            let mut cache = self.cache.lock().await;
            if cache.light_on == Some(on) {
                return;
            }
            cache.light_on = Some(on);
        }

        self.suppression.arm();
        if let Err(e) = self.core.send(json!({ "lightswitch": u8::from(on) })).await {
            self.core.report_local_error(e);
            return;
        }
        if self.core.logging_enabled() {
            info!("[{}] current light [{}].", self.core.name, OnOff::from(on));
        }
    }

    async fn set_brightness(self: Arc<Self>, brightness: u8, edit: SettleHandle) {
        // A return to the cached value still took a token, which drops any
        // pending brightness.
        if self.cache.lock().await.brightness == Some(brightness) {
            return;
        }

        if !edit.settle(BRIGHTNESS_SETTLE).await {
            self.core.edit_superseded();
            return;
        }
        let _turn = self.core.edit_turn().await;
        if !self.core.is_latest(&edit) {
            return;
        }

        {
            let mut cache = self.cache.lock().await;
            if cache.brightness == Some(brightness) {
                return;
            }
            cache.brightness = Some(brightness);
        }

        self.suppression.arm();
        if let Err(e) = self.core.send(json!({ "lightbright": brightness })).await {
            self.core.report_local_error(e);
            return;
        }
        if self.core.logging_enabled() {
            info!("[{}] current brightness [{brightness}%].", self.core.name);
        }
    }

    async fn set_hue(self: Arc<Self>, value: f64, edit: SettleHandle) {
        let hue = (value.round() as u16) % 360;
        {
            let cache = self.cache.lock().await;
            // Colour only goes out while the diffuser itself is known to be on.
            if cache.on != Some(true) || cache.hue == Some(hue) {
                return;
            }
        }

        if !edit.settle(HUE_SETTLE).await {
            self.core.edit_superseded();
            return;
        }
        let _turn = self.core.edit_turn().await;
        if !self.core.is_latest(&edit) {
            return;
        }

        let saturation: f64 = self
            .core
            .characteristic_value(ServiceType::Lightbulb, HapType::Saturation)
            .await
            .unwrap_or(100.0);
        let rgb = hs_to_rgb(f64::from(hue), saturation);
        {
            let mut cache = self.cache.lock().await;
            if cache.on != Some(true) || cache.hue == Some(hue) {
                return;
            }
            cache.hue = Some(hue);
            cache.rgb = Some(rgb);
        }

        let [r, g, b] = rgb;
        self.suppression.arm();
        let params = json!({ "lightRcolor": r, "lightGcolor": g, "lightBcolor": b });
        if let Err(e) = self.core.send(params).await {
            self.core.report_local_error(e);
            return;
        }
        if self.core.logging_enabled() {
            info!("[{}] current colour [rgb {r} {g} {b}].", self.core.name);
        }
    }

    async fn apply_echo(&self, params: &Value) -> Result<(), AdapterError> {
        if self.suppression.is_active() {
            self.core.echo_suppressed();
            return Ok(());
        }

        let params: DiffuserParams = decode_params(params)?;
        let log = params.update_source && self.core.logging_enabled();
        let mut cache = self.cache.lock().await;
        let mut accessory = self.core.accessory.lock().await;
        let mut changed = false;

        if let Some(switch) = params.switch
            && cache.on != Some(switch.is_on())
        {
            cache.on = Some(switch.is_on());
            accessory.update_characteristic(ServiceType::Fan, HapType::On, switch.is_on())?;
            if switch.is_on()
                && params.state.is_none()
                && let Some(speed) = cache.speed
            {
                accessory.update_characteristic(ServiceType::Fan, HapType::RotationSpeed, speed)?;
            }
            changed = true;
            if log {
                info!("[{}] current state [{switch}].", self.core.name);
            }
        }

        if let Some(speed) = params.speed()
            && cache.speed != Some(speed)
        {
            cache.speed = Some(speed);
            accessory.update_characteristic(ServiceType::Fan, HapType::RotationSpeed, speed)?;
            changed = true;
            if log {
                info!("[{}] current speed [{speed}%].", self.core.name);
            }
        }

        if let Some(on) = params.light_on()
            && cache.light_on != Some(on)
        {
            cache.light_on = Some(on);
            accessory.update_characteristic(ServiceType::Lightbulb, HapType::On, on)?;
            changed = true;
            if log {
                info!("[{}] current light [{}].", self.core.name, OnOff::from(on));
            }
        }

        if let Some(brightness) = params.brightness()
            && cache.brightness != Some(brightness)
        {
            cache.brightness = Some(brightness);
            accessory.update_characteristic(ServiceType::Lightbulb, HapType::Brightness, brightness)?;
            changed = true;
            if log {
                info!("[{}] current brightness [{brightness}%].", self.core.name);
            }
        }

        if let Some(rgb) = params.rgb()
            && cache.rgb != Some(rgb)
        {
            let [r, g, b] = rgb;
            let (hue, _) = rgb_to_hs(r, g, b);
            cache.rgb = Some(rgb);
            cache.hue = Some(hue as u16);
            accessory.update_characteristic(ServiceType::Lightbulb, HapType::Hue, hue)?;
            accessory.update_characteristic(ServiceType::Lightbulb, HapType::Saturation, 100)?;
            changed = true;
            if log {
                info!("[{}] current colour [rgb {r} {g} {b}].", self.core.name);
            }
        }

        if changed {
            self.core.echo_applied();
        }
        Ok(())
    }
}

#[async_trait]
impl DeviceAdapter for DiffuserAccessory {
    fn device_id(&self) -> &str {
        &self.inner.core.id
    }

    fn device_type(&self) -> DeviceType {
        DeviceType::Diffuser
    }

    async fn external_update(&self, params: &Value) {
        if let Err(e) = self.inner.apply_echo(params).await {
            self.inner.core.report_external_error(e);
        }
    }
}
