//! Replays recorded controller writes and device payloads against adapters.
//!
//! A script is JSON lines. `device` lines declare the accessories to build,
//! `set` lines are controller writes and `echo` lines are device payloads:
//!
//! ```text
//! {"kind": "device", "id": "1000abcd", "name": "Lamp", "type": "switch"}
//! {"kind": "set", "at_ms": 0, "device": "1000abcd", "service": "Switch", "characteristic": "On", "value": true}
//! {"kind": "echo", "at_ms": 1500, "device": "1000abcd", "params": {"switch": "off", "updateSource": true}}
//! ```

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;
use tokio::time::{Instant, sleep_until};
use tracing::{info, warn};

use crate::accessories::DeviceType;
use crate::bridge::{DeviceRegistry, create_adapter};
use crate::hap::{Accessory, AccessoryPointer, FileStorage, HapType, ServiceType, write_characteristic};
use crate::history::FileHistory;
use crate::platform::Platform;
use crate::settings::Settings;

#[derive(Error, Debug)]
pub enum ReplayError {
    #[error("line {line}: {source}")]
    Parse {
        line: usize,
        #[source]
        source: serde_json::Error,
    },
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
enum ScriptLine {
    Device(DeviceSpec),
    Set {
        #[serde(default)]
        at_ms: u64,
        device: String,
        service: ServiceType,
        characteristic: HapType,
        value: Value,
    },
    Echo {
        #[serde(default)]
        at_ms: u64,
        device: String,
        params: Value,
    },
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct DeviceSpec {
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub device_type: DeviceType,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ReplayAction {
    Set {
        service: ServiceType,
        characteristic: HapType,
        value: Value,
    },
    Echo(Value),
}

#[derive(Debug, Clone, PartialEq)]
pub struct ReplayEvent {
    pub at: Duration,
    pub device: String,
    pub action: ReplayAction,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReplayScript {
    pub devices: Vec<DeviceSpec>,
    /// Sorted by time; events sharing a time keep their script order.
    pub events: Vec<ReplayEvent>,
}

impl ReplayScript {
    pub fn parse(text: &str) -> Result<Self, ReplayError> {
        let mut script = ReplayScript::default();
        for (index, line) in text.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let parsed: ScriptLine = serde_json::from_str(line).map_err(|source| {
                ReplayError::Parse {
                    line: index + 1,
                    source,
                }
            })?;
            match parsed {
                ScriptLine::Device(spec) => script.devices.push(spec),
                ScriptLine::Set {
                    at_ms,
                    device,
                    service,
                    characteristic,
                    value,
                } => script.events.push(ReplayEvent {
                    at: Duration::from_millis(at_ms),
                    device,
                    action: ReplayAction::Set {
                        service,
                        characteristic,
                        value,
                    },
                }),
                ScriptLine::Echo {
                    at_ms,
                    device,
                    params,
                } => script.events.push(ReplayEvent {
                    at: Duration::from_millis(at_ms),
                    device,
                    action: ReplayAction::Echo(params),
                }),
            }
        }
        script.events.sort_by_key(|e| e.at);
        Ok(script)
    }

    pub async fn load(path: &str) -> Result<Self, ReplayError> {
        let text = tokio::fs::read_to_string(path).await?;
        Self::parse(&text)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReplayStats {
    pub writes: usize,
    pub echoes: usize,
    pub skipped: usize,
}

/// Accessories and adapters built from a script's device lines.
pub struct ReplaySession {
    registry: DeviceRegistry,
    accessories: HashMap<String, AccessoryPointer>,
}

impl ReplaySession {
    pub async fn setup(
        devices: &[DeviceSpec],
        platform: Arc<dyn Platform>,
        settings: &Settings,
    ) -> anyhow::Result<Self> {
        let storage = settings.storage_dir.as_ref().map(FileStorage::new);
        let registry = DeviceRegistry::new();
        let mut accessories = HashMap::new();

        for spec in devices {
            let mut accessory = Accessory::new(&spec.id, &spec.name);
            if let Some(storage) = &storage {
                if let Some(context) = storage.load_context(&spec.id).await {
                    accessory = accessory.with_context(context);
                }
                accessory = accessory.with_storage(storage.clone());
            }
            if matches!(spec.device_type, DeviceType::Switch | DeviceType::Thermostat)
                && let Some(dir) = &settings.history_dir
            {
                let history = FileHistory::open(dir, &spec.id)
                    .await
                    .with_context(|| format!("Failed to open history for {}", spec.id))?;
                accessory = accessory.with_history(Arc::new(history));
            }

            let options = settings.adapter_options(&spec.id)?;
            let accessory = accessory.into_pointer();
            let adapter = create_adapter(spec.device_type, platform.clone(), accessory.clone(), options)
                .await
                .with_context(|| format!("Failed to set up {} ({})", spec.name, spec.id))?;
            registry.insert(adapter);
            accessories.insert(spec.id.clone(), accessory);
        }

        Ok(Self {
            registry,
            accessories,
        })
    }

    pub fn registry(&self) -> &DeviceRegistry {
        &self.registry
    }

    /// Plays `events` on their schedule, then waits `tail` for pending
    /// settles and timers to finish.
    pub async fn run(&self, events: &[ReplayEvent], tail: Duration) -> ReplayStats {
        let start = Instant::now();
        let mut stats = ReplayStats::default();

        for event in events {
            sleep_until(start + event.at).await;
            match &event.action {
                ReplayAction::Set {
                    service,
                    characteristic,
                    value,
                } => {
                    let Some(accessory) = self.accessories.get(&event.device) else {
                        warn!("Skipping write to unknown device {}", event.device);
                        stats.skipped += 1;
                        continue;
                    };
                    match write_characteristic(accessory, *service, *characteristic, value.clone())
                        .await
                    {
                        Ok(()) => stats.writes += 1,
                        Err(e) => {
                            warn!(
                                "Write {characteristic:?}={value} on {} rejected: {e}",
                                event.device
                            );
                            stats.skipped += 1;
                        }
                    }
                }
                ReplayAction::Echo(params) => {
                    if self.registry.dispatch(&event.device, params).await {
                        stats.echoes += 1;
                    } else {
                        stats.skipped += 1;
                    }
                }
            }
        }

        tokio::time::sleep(tail).await;
        info!(
            "Replay finished: {} writes, {} echoes, {} skipped",
            stats.writes, stats.echoes, stats.skipped
        );
        stats
    }
}
