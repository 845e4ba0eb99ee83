use std::io::Write;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;
use tracing::subscriber::DefaultGuard;
use tracing_subscriber::fmt::MakeWriter;

use crate::error::{AdapterError, PlatformError};
use crate::platform::Platform;

#[derive(Default)]
pub struct FakePlatform {
    pub sent: Mutex<Vec<(String, Value)>>,
    pub errors: Mutex<Vec<(String, String, bool)>>,
    pub refreshes: Mutex<Vec<String>>,
    pub should_fail: AtomicBool,
}

#[allow(dead_code)]
impl FakePlatform {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn failing() -> Arc<Self> {
        let platform = Self::default();
        platform.should_fail.store(true, Ordering::Relaxed);
        Arc::new(platform)
    }

    pub fn payloads(&self) -> Vec<Value> {
        self.sent.lock().iter().map(|(_, p)| p.clone()).collect()
    }

    pub fn errors(&self) -> Vec<(String, String, bool)> {
        self.errors.lock().clone()
    }

    pub fn refreshes(&self) -> Vec<String> {
        self.refreshes.lock().clone()
    }
}

#[async_trait]
impl Platform for FakePlatform {
    async fn send_device_update(
        &self,
        device_id: &str,
        params: Value,
    ) -> Result<(), PlatformError> {
        if self.should_fail.load(Ordering::Relaxed) {
            return Err(PlatformError::Offline(device_id.to_string()));
        }
        self.sent.lock().push((device_id.to_string(), params));
        Ok(())
    }

    fn device_update_error(&self, device_id: &str, error: &AdapterError, is_local_edit: bool) {
        self.errors
            .lock()
            .push((device_id.to_string(), error.to_string(), is_local_edit));
    }

    fn request_device_refresh(&self, device_id: &str, _error: &AdapterError) {
        self.refreshes.lock().push(device_id.to_string());
    }
}

/// Collects formatted log output of the current thread.
#[derive(Clone, Default)]
pub struct CapturedLogs(Arc<Mutex<Vec<u8>>>);

#[allow(dead_code)]
impl CapturedLogs {
    pub fn install(&self) -> DefaultGuard {
        let subscriber = tracing_subscriber::fmt()
            .with_writer(self.clone())
            .with_ansi(false)
            .with_max_level(tracing::Level::INFO)
            .finish();
        tracing::subscriber::set_default(subscriber)
    }

    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.lock()).into_owned()
    }

    pub fn count(&self, needle: &str) -> usize {
        self.contents().lines().filter(|l| l.contains(needle)).count()
    }
}

impl Write for CapturedLogs {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

impl<'a> MakeWriter<'a> for CapturedLogs {
    type Writer = CapturedLogs;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}
