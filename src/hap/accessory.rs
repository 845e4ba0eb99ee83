use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::sync::Mutex;
use tracing::debug;

use crate::error::AdapterError;
use crate::hap::characteristic::HapType;
use crate::hap::service::{Service, ServiceType};
use crate::hap::storage::{AccessoryContext, FileStorage};
use crate::history::HistoryLog;

pub type AccessoryPointer = Arc<Mutex<Accessory>>;

/// One physical device as exposed to HomeKit.
pub struct Accessory {
    device_id: String,
    display_name: String,
    services: Vec<Service>,
    context: AccessoryContext,
    storage: Option<FileStorage>,
    history: Option<Arc<dyn HistoryLog>>,
}

impl std::fmt::Debug for Accessory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Accessory")
            .field("device_id", &self.device_id)
            .field("display_name", &self.display_name)
            .field("services", &self.services)
            .field("context", &self.context)
            .finish()
    }
}

impl Accessory {
    pub fn new(device_id: &str, display_name: &str) -> Self {
        Self {
            device_id: device_id.to_string(),
            display_name: display_name.to_string(),
            services: vec![],
            context: AccessoryContext::default(),
            storage: None,
            history: None,
        }
    }

    pub fn with_context(mut self, context: AccessoryContext) -> Self {
        self.context = context;
        self
    }

    pub fn with_storage(mut self, storage: FileStorage) -> Self {
        self.storage = Some(storage);
        self
    }

    pub fn with_history(mut self, history: Arc<dyn HistoryLog>) -> Self {
        self.history = Some(history);
        self
    }

    pub fn into_pointer(self) -> AccessoryPointer {
        Arc::new(Mutex::new(self))
    }

    pub fn device_id(&self) -> &str {
        &self.device_id
    }

    pub fn display_name(&self) -> &str {
        &self.display_name
    }

    pub fn context(&self) -> &AccessoryContext {
        &self.context
    }

    pub fn context_mut(&mut self) -> &mut AccessoryContext {
        &mut self.context
    }

    pub fn storage(&self) -> Option<&FileStorage> {
        self.storage.as_ref()
    }

    pub fn history(&self) -> Option<Arc<dyn HistoryLog>> {
        self.history.clone()
    }

    pub fn get_service(&self, service_type: ServiceType) -> Option<&Service> {
        self.services
            .iter()
            .find(|s| s.service_type() == service_type)
    }

    pub fn get_mut_service(&mut self, service_type: ServiceType) -> Option<&mut Service> {
        self.services
            .iter_mut()
            .find(|s| s.service_type() == service_type)
    }

    /// Returns the service of the given type, creating it when absent.
    pub fn get_or_add_service(
        &mut self,
        service_type: ServiceType,
        name: Option<&str>,
    ) -> &mut Service {
        let index = match self
            .services
            .iter()
            .position(|s| s.service_type() == service_type)
        {
            Some(index) => index,
            None => {
                debug!("Adding {service_type:?} service to {}", self.display_name);
                self.services.push(Service::new(service_type, name));
                self.services.len() - 1
            }
        };
        &mut self.services[index]
    }

    pub fn remove_service(&mut self, service_type: ServiceType) -> Option<Service> {
        let index = self
            .services
            .iter()
            .position(|s| s.service_type() == service_type)?;
        debug!("Removing {service_type:?} service from {}", self.display_name);
        Some(self.services.remove(index))
    }

    pub fn characteristic_value<T: DeserializeOwned>(
        &self,
        service_type: ServiceType,
        hap_type: HapType,
    ) -> Option<T> {
        self.get_service(service_type)?
            .get_characteristic(hap_type)
            .and_then(|c| serde_json::from_value(c.value().clone()).ok())
    }

    pub fn update_characteristic(
        &mut self,
        service_type: ServiceType,
        hap_type: HapType,
        value: impl Into<Value>,
    ) -> Result<(), AdapterError> {
        self.get_mut_service(service_type)
            .ok_or(AdapterError::ServiceNotFound(service_type))?
            .update_characteristic(hap_type, value)
    }
}

/// Applies a controller write to a characteristic and runs its local-edit callback.
///
/// The accessory lock is released before the callback runs, so the callback is
/// free to lock the accessory again.
pub async fn write_characteristic(
    accessory: &AccessoryPointer,
    service_type: ServiceType,
    hap_type: HapType,
    value: Value,
) -> anyhow::Result<()> {
    let (old, callback) = {
        let mut accessory = accessory.lock().await;
        accessory
            .get_mut_service(service_type)
            .ok_or(AdapterError::ServiceNotFound(service_type))?
            .get_mut_characteristic(hap_type)
            .ok_or(AdapterError::CharacteristicNotFound(hap_type))?
            .set_value(value.clone())?
    };
    if let Some(callback) = callback {
        callback(old, value).await?;
    }
    Ok(())
}
