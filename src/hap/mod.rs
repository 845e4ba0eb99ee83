//! Minimal HomeKit accessory model the adapters provision and drive.
//!
//! Services and characteristics mirror their HomeKit counterparts closely
//! enough for the adapters: values, constraints and local-edit callbacks.
//! Networking and pairing are handled by the bridge that owns the accessories.

mod accessory;
mod characteristic;
mod service;
mod storage;

pub use accessory::{Accessory, AccessoryPointer, write_characteristic};
pub use characteristic::{Characteristic, HapType, OnUpdate, OnUpdateFuture, Props};
pub use service::{Service, ServiceType};
pub use storage::{AccessoryContext, FileStorage};
