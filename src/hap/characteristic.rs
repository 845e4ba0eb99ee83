use std::sync::Arc;

use anyhow::{Result, anyhow};
use futures::FutureExt;
use futures::future::BoxFuture;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::AdapterError;

/// Characteristic types used by the adapters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum HapType {
    On,
    Active,
    RotationSpeed,
    Brightness,
    Hue,
    Saturation,
    CurrentPosition,
    TargetPosition,
    PositionState,
    CurrentTemperature,
    TargetTemperature,
    CurrentHeatingCoolingState,
    TargetHeatingCoolingState,
    CurrentRelativeHumidity,
}

impl HapType {
    fn default_value(&self) -> Value {
        match self {
            HapType::On => Value::Bool(false),
            HapType::PositionState => Value::from(2),
            HapType::TargetTemperature => Value::from(10.0),
            HapType::CurrentTemperature => Value::from(0.0),
            _ => Value::from(0),
        }
    }

    fn default_props(&self) -> Props {
        match self {
            HapType::On => Props::default(),
            HapType::Active => Props::range(0.0, 1.0, 1.0).with_valid_values(vec![0, 1]),
            HapType::RotationSpeed
            | HapType::Brightness
            | HapType::Saturation
            | HapType::CurrentPosition
            | HapType::TargetPosition
            | HapType::CurrentRelativeHumidity => Props::range(0.0, 100.0, 1.0),
            HapType::Hue => Props::range(0.0, 360.0, 1.0),
            HapType::PositionState => Props::range(0.0, 2.0, 1.0).with_valid_values(vec![0, 1, 2]),
            HapType::CurrentTemperature => Props::range(0.0, 100.0, 0.1),
            HapType::TargetTemperature => Props::range(10.0, 38.0, 0.1),
            HapType::CurrentHeatingCoolingState => Props::range(0.0, 2.0, 1.0),
            HapType::TargetHeatingCoolingState => Props::range(0.0, 3.0, 1.0),
        }
    }
}

/// Value constraints of a characteristic.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Props {
    pub min_value: Option<f64>,
    pub max_value: Option<f64>,
    pub min_step: Option<f64>,
    pub valid_values: Option<Vec<u8>>,
}

impl Props {
    pub fn range(min_value: f64, max_value: f64, min_step: f64) -> Self {
        Self {
            min_value: Some(min_value),
            max_value: Some(max_value),
            min_step: Some(min_step),
            valid_values: None,
        }
    }

    pub fn with_valid_values(mut self, valid_values: Vec<u8>) -> Self {
        self.valid_values = Some(valid_values);
        self
    }

    fn merge(&mut self, other: Props) {
        if other.min_value.is_some() {
            self.min_value = other.min_value;
        }
        if other.max_value.is_some() {
            self.max_value = other.max_value;
        }
        if other.min_step.is_some() {
            self.min_step = other.min_step;
        }
        if other.valid_values.is_some() {
            self.valid_values = other.valid_values;
        }
    }

    fn accepts(&self, value: &Value) -> bool {
        let Some(number) = value.as_f64() else {
            return value.is_boolean() && self.min_value.is_none();
        };
        if self.min_value.is_some_and(|min| number < min)
            || self.max_value.is_some_and(|max| number > max)
        {
            return false;
        }
        match &self.valid_values {
            Some(valid) => valid.iter().any(|v| f64::from(*v) == number),
            None => true,
        }
    }
}

pub type OnUpdateFuture = BoxFuture<'static, Result<()>>;

/// Callback invoked with `(old, new)` when a controller writes the characteristic.
pub type OnUpdate = Arc<dyn Fn(Value, Value) -> OnUpdateFuture + Send + Sync>;

pub struct Characteristic {
    hap_type: HapType,
    value: Value,
    props: Props,
    on_update: Option<OnUpdate>,
}

impl std::fmt::Debug for Characteristic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Characteristic")
            .field("hap_type", &self.hap_type)
            .field("value", &self.value)
            .field("props", &self.props)
            .field("on_update", &self.on_update.is_some())
            .finish()
    }
}

impl Characteristic {
    pub fn new(hap_type: HapType) -> Self {
        Self {
            hap_type,
            value: hap_type.default_value(),
            props: hap_type.default_props(),
            on_update: None,
        }
    }

    pub fn hap_type(&self) -> HapType {
        self.hap_type
    }

    pub fn value(&self) -> &Value {
        &self.value
    }

    pub fn props(&self) -> &Props {
        &self.props
    }

    /// Overrides only the constraints present in `props`.
    pub fn set_props(&mut self, props: Props) -> &mut Self {
        self.props.merge(props);
        self
    }

    /// Stores a value reported by the device. Does not fire the update callback.
    pub fn update_value(&mut self, value: Value) {
        self.value = value;
    }

    /// Stores a value written by a controller, returning the previous value and
    /// the callback that must be notified.
    pub fn set_value(&mut self, value: Value) -> Result<(Value, Option<OnUpdate>), AdapterError> {
        if !self.props.accepts(&value) {
            return Err(AdapterError::InvalidValue {
                hap_type: self.hap_type,
                value,
            });
        }
        let old = std::mem::replace(&mut self.value, value);
        Ok((old, self.on_update.clone()))
    }

    /// Registers a typed local-edit callback.
    pub fn on_update_async<T, F>(&mut self, callback: Option<F>) -> &mut Self
    where
        T: DeserializeOwned + Send + 'static,
        F: Fn(T, T) -> OnUpdateFuture + Send + Sync + 'static,
    {
        let hap_type = self.hap_type;
        self.on_update = callback.map(|f| {
            Arc::new(move |old: Value, new: Value| {
                match (
                    serde_json::from_value::<T>(old),
                    serde_json::from_value::<T>(new),
                ) {
                    (Ok(old), Ok(new)) => f(old, new),
                    _ => async move { Err::<(), _>(anyhow!("Invalid value for {hap_type:?}")) }
                        .boxed(),
                }
            }) as OnUpdate
        });
        self
    }
}
