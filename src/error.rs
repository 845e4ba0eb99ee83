use thiserror::Error;

use crate::hap::{HapType, ServiceType};

/// Failure reported by the transport that talks to the vendor device.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PlatformError {
    #[error("Device {0} is offline")]
    Offline(String),
    #[error("Device update timed out: {0}")]
    Timeout(String),
    #[error("Device update rejected: {0}")]
    Rejected(String),
    #[error("Transport failed: {0}")]
    Transport(String),
}

#[derive(Error, Debug)]
pub enum AdapterError {
    #[error("Device update failed: {0}")]
    SendError(#[from] PlatformError),
    #[error("Malformed payload: {0}")]
    MalformedPayload(#[from] serde_json::Error),
    #[error("Unknown parameters received")]
    UnknownParameters,
    #[error("Service {0:?} not found")]
    ServiceNotFound(ServiceType),
    #[error("Characteristic {0:?} not found")]
    CharacteristicNotFound(HapType),
    #[error("Invalid value {value} for characteristic {hap_type:?}")]
    InvalidValue {
        hap_type: HapType,
        value: serde_json::Value,
    },
    #[error("Storage failed: {0}")]
    StorageError(#[from] std::io::Error),
}
