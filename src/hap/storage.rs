use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, info};

use crate::error::AdapterError;

/// Key/value map attached to an accessory that survives bridge restarts.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AccessoryContext(Map<String, Value>);

impl AccessoryContext {
    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        self.0
            .get(key)
            .and_then(|v| serde_json::from_value(v.clone()).ok())
    }

    pub fn set(&mut self, key: &str, value: impl Into<Value>) {
        self.0.insert(key.to_string(), value.into());
    }
}

/// Stores one `<device_id>.json` file per accessory context.
#[derive(Debug, Clone)]
pub struct FileStorage {
    dir: PathBuf,
}

impl FileStorage {
    pub fn new(dir: impl AsRef<Path>) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
        }
    }

    pub fn current_dir() -> Result<Self, AdapterError> {
        Ok(Self::new(std::env::current_dir()?))
    }

    fn path_for(&self, device_id: &str) -> PathBuf {
        self.dir.join(format!("{device_id}.json"))
    }

    pub async fn load_context(&self, device_id: &str) -> Option<AccessoryContext> {
        let path = self.path_for(device_id);
        if let Ok(bytes) = tokio::fs::read(&path).await
            && let Ok(context) = serde_json::from_slice::<AccessoryContext>(&bytes)
        {
            info!("Loaded context for {device_id} from {}", path.display());
            return Some(context);
        }
        debug!("No stored context for {device_id}");
        None
    }

    pub async fn save_context(
        &self,
        device_id: &str,
        context: &AccessoryContext,
    ) -> Result<(), AdapterError> {
        tokio::fs::create_dir_all(&self.dir).await?;
        let bytes = serde_json::to_vec_pretty(context)?;
        tokio::fs::write(self.path_for(device_id), bytes).await?;
        Ok(())
    }
}
