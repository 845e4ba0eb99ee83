use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::Mutex;
use tracing::info;

use crate::accessories::state::curtain::{CurtainCommand, CurtainParams};
use crate::accessories::{
    AdapterCore, AdapterOptions, DeviceAdapter, DeviceType, decode_params, on_local_edit,
};
use crate::debounce::{SettleHandle, SingleFlight};
use crate::error::AdapterError;
use crate::hap::{AccessoryPointer, HapType, ServiceType};
use crate::platform::Platform;

/// `PositionState` value meaning the motor is idle.
const POSITION_STOPPED: u8 = 2;

#[derive(Debug, Default)]
struct CurtainCache {
    position: Option<u8>,
}

struct CurtainInner {
    core: AdapterCore,
    cache: Mutex<CurtainCache>,
    position_edits: SingleFlight,
}

/// Window covering driven by a curtain motor.
pub struct CurtainAccessory {
    inner: Arc<CurtainInner>,
}

impl CurtainAccessory {
    pub async fn new(
        platform: Arc<dyn Platform>,
        accessory: AccessoryPointer,
        options: AdapterOptions,
    ) -> Result<Self, AdapterError> {
        let core = AdapterCore::new(DeviceType::Curtain, platform, accessory.clone(), options).await;
        let inner = Arc::new(CurtainInner {
            core,
            cache: Mutex::new(CurtainCache::default()),
            position_edits: SingleFlight::new(),
        });

        {
            let mut accessory = accessory.lock().await;
            let service = accessory.get_or_add_service(ServiceType::WindowCovering, None);
            on_local_edit(
                service.characteristic_mut(HapType::TargetPosition),
                &inner,
                &inner.position_edits,
                CurtainInner::set_position,
            );
        }

        inner.core.log_options();
        Ok(Self { inner })
    }
}

impl CurtainInner {
    async fn set_position(self: Arc<Self>, position: u8, edit: SettleHandle) {
        let _turn = self.core.edit_turn().await;
        if !self.core.is_latest(&edit) {
            return;
        }
        {
            let mut cache = self.cache.lock().await;
            if cache.position == Some(position) {
                return;
            }
            cache.position = Some(position);
        }

        let command = CurtainCommand::from_position(position);
        if let Err(e) = self.core.send(command.to_params()).await {
            self.core.report_local_error(e);
            return;
        }

        if self.core.logging_enabled() {
            info!("[{}] current position [{position}%].", self.core.name);
        }
    }

    async fn apply_echo(&self, params: &Value) -> Result<(), AdapterError> {
        let params: CurtainParams = decode_params(params)?;
        let Some(position) = params.position() else {
            return Ok(());
        };

        {
            let mut accessory = self.core.accessory.lock().await;
            accessory.update_characteristic(
                ServiceType::WindowCovering,
                HapType::TargetPosition,
                position,
            )?;
            accessory.update_characteristic(
                ServiceType::WindowCovering,
                HapType::CurrentPosition,
                position,
            )?;
            accessory.update_characteristic(
                ServiceType::WindowCovering,
                HapType::PositionState,
                POSITION_STOPPED,
            )?;
        }

        {
            let mut cache = self.cache.lock().await;
            if cache.position == Some(position) {
                return Ok(());
            }
            cache.position = Some(position);
        }

        self.core.echo_applied();
        if params.update_source && self.core.logging_enabled() {
            info!("[{}] current position [{position}%].", self.core.name);
        }
        Ok(())
    }
}

#[async_trait]
impl DeviceAdapter for CurtainAccessory {
    fn device_id(&self) -> &str {
        &self.inner.core.id
    }

    fn device_type(&self) -> DeviceType {
        DeviceType::Curtain
    }

    async fn external_update(&self, params: &Value) {
        if let Err(e) = self.inner.apply_echo(params).await {
            self.inner.core.report_external_error(e);
        }
    }
}
