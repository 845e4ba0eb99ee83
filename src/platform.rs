use async_trait::async_trait;
use serde_json::Value;
use tracing::{error, info, warn};

use crate::error::{AdapterError, PlatformError};

/// Services the bridge provides to every adapter.
#[async_trait]
pub trait Platform: Send + Sync {
    /// Delivers a parameter payload to the vendor device.
    async fn send_device_update(&self, device_id: &str, params: Value)
    -> Result<(), PlatformError>;

    /// Central reporting for adapter failures. Must not fail.
    fn device_update_error(&self, device_id: &str, error: &AdapterError, is_local_edit: bool) {
        if is_local_edit {
            warn!("[{device_id}] could not be updated as {error}.");
        } else {
            error!("[{device_id}] could not process device update as {error}.");
        }
    }

    /// Asks the bridge to re-sync the device state after a failure.
    fn request_device_refresh(&self, device_id: &str, error: &AdapterError) {
        warn!("[{device_id}] requesting refresh after error: {error}.");
    }
}

/// Platform that only logs outbound payloads. Used for dry runs.
#[derive(Debug, Default, Clone)]
pub struct LoggingPlatform;

#[async_trait]
impl Platform for LoggingPlatform {
    async fn send_device_update(
        &self,
        device_id: &str,
        params: Value,
    ) -> Result<(), PlatformError> {
        info!("[{device_id}] sending {params}");
        Ok(())
    }
}
