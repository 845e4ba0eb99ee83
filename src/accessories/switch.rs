use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Value, json};
use tokio::sync::Mutex;
use tracing::info;

use crate::accessories::state::OnOff;
use crate::accessories::state::switch::SwitchParams;
use crate::accessories::{
    AdapterCore, AdapterOptions, DeviceAdapter, DeviceType, decode_params, on_local_edit,
};
use crate::debounce::{SettleHandle, SingleFlight};
use crate::error::AdapterError;
use crate::hap::{AccessoryPointer, HapType, ServiceType};
use crate::history::HistoryEntry;
use crate::platform::Platform;

#[derive(Debug, Default)]
struct SwitchCache {
    on: Option<bool>,
}

struct SwitchInner {
    core: AdapterCore,
    cache: Mutex<SwitchCache>,
    on_edits: SingleFlight,
}

/// Single channel switch. State is only committed once the device accepted it.
pub struct SwitchAccessory {
    inner: Arc<SwitchInner>,
}

impl SwitchAccessory {
    pub async fn new(
        platform: Arc<dyn Platform>,
        accessory: AccessoryPointer,
        options: AdapterOptions,
    ) -> Result<Self, AdapterError> {
        let core = AdapterCore::new(DeviceType::Switch, platform, accessory.clone(), options).await;
        let inner = Arc::new(SwitchInner {
            core,
            cache: Mutex::new(SwitchCache::default()),
            on_edits: SingleFlight::new(),
        });

        {
            let mut accessory = accessory.lock().await;
            let service = accessory.get_or_add_service(ServiceType::Switch, None);
            on_local_edit(
                service.characteristic_mut(HapType::On),
                &inner,
                &inner.on_edits,
                SwitchInner::set_on,
            );
        }

        inner.core.log_options();
        Ok(Self { inner })
    }
}

impl SwitchInner {
    async fn set_on(self: Arc<Self>, on: bool, edit: SettleHandle) {
        let _turn = self.core.edit_turn().await;
        if !self.core.is_latest(&edit) {
            return;
        }
        if self.cache.lock().await.on == Some(on) {
            return;
        }

        if let Err(e) = self.core.send(json!({ "switch": OnOff::from(on) })).await {
            self.core.report_local_error(e);
            return;
        }

        self.cache.lock().await.on = Some(on);
        self.core.add_history(HistoryEntry::status(on));
        if self.core.logging_enabled() {
            info!("[{}] current state [{}].", self.core.name, OnOff::from(on));
        }
    }

    async fn apply_echo(&self, params: &Value) -> Result<(), AdapterError> {
        let params: SwitchParams = decode_params(params)?;
        let Some(switch) = params.switch else {
            return Ok(());
        };

        {
            let mut cache = self.cache.lock().await;
            if cache.on == Some(switch.is_on()) {
                return Ok(());
            }
            cache.on = Some(switch.is_on());
        }

        self.core
            .update_characteristic(ServiceType::Switch, HapType::On, switch.is_on())
            .await?;
        self.core.add_history(HistoryEntry::status(switch.is_on()));
        self.core.echo_applied();
        if params.update_source && self.core.logging_enabled() {
            info!("[{}] current state [{switch}].", self.core.name);
        }
        Ok(())
    }
}

#[async_trait]
impl DeviceAdapter for SwitchAccessory {
    fn device_id(&self) -> &str {
        &self.inner.core.id
    }

    fn device_type(&self) -> DeviceType {
        DeviceType::Switch
    }

    async fn external_update(&self, params: &Value) {
        if let Err(e) = self.inner.apply_echo(params).await {
            self.inner.core.report_external_error(e);
        }
    }
}
