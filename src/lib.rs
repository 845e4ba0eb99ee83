pub mod accessories;
pub mod bridge;
pub mod color;
pub mod debounce;
pub mod error;
pub mod hap;
pub mod history;
pub mod logging;
pub mod platform;
pub mod replay;
pub mod settings;
pub mod telemetry;

#[cfg(test)]
mod testing;

pub use accessories::{AdapterOptions, DeviceAdapter, DeviceType};
pub use bridge::{DeviceRegistry, create_adapter};
pub use error::{AdapterError, PlatformError};
pub use platform::{LoggingPlatform, Platform};
pub use settings::Settings;
