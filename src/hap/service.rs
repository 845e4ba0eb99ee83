use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::AdapterError;
use crate::hap::characteristic::{Characteristic, HapType};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ServiceType {
    WindowCovering,
    Fan,
    Fanv2,
    Lightbulb,
    Thermostat,
    Switch,
    TemperatureSensor,
    HumiditySensor,
}

impl ServiceType {
    /// Characteristics every instance of the service carries.
    fn required_characteristics(&self) -> &'static [HapType] {
        match self {
            ServiceType::WindowCovering => &[
                HapType::CurrentPosition,
                HapType::TargetPosition,
                HapType::PositionState,
            ],
            ServiceType::Fan | ServiceType::Lightbulb | ServiceType::Switch => &[HapType::On],
            ServiceType::Fanv2 => &[HapType::Active],
            ServiceType::Thermostat => &[
                HapType::CurrentHeatingCoolingState,
                HapType::TargetHeatingCoolingState,
                HapType::CurrentTemperature,
                HapType::TargetTemperature,
            ],
            ServiceType::TemperatureSensor => &[HapType::CurrentTemperature],
            ServiceType::HumiditySensor => &[HapType::CurrentRelativeHumidity],
        }
    }
}

#[derive(Debug)]
pub struct Service {
    service_type: ServiceType,
    name: Option<String>,
    characteristics: Vec<Characteristic>,
}

impl Service {
    pub fn new(service_type: ServiceType, name: Option<&str>) -> Self {
        Self {
            service_type,
            name: name.map(str::to_string),
            characteristics: service_type
                .required_characteristics()
                .iter()
                .map(|hap_type| Characteristic::new(*hap_type))
                .collect(),
        }
    }

    pub fn service_type(&self) -> ServiceType {
        self.service_type
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn has_characteristic(&self, hap_type: HapType) -> bool {
        self.get_characteristic(hap_type).is_some()
    }

    pub fn get_characteristic(&self, hap_type: HapType) -> Option<&Characteristic> {
        self.characteristics
            .iter()
            .find(|c| c.hap_type() == hap_type)
    }

    pub fn get_mut_characteristic(&mut self, hap_type: HapType) -> Option<&mut Characteristic> {
        self.characteristics
            .iter_mut()
            .find(|c| c.hap_type() == hap_type)
    }

    /// Returns the characteristic, adding it first when the service lacks it.
    pub fn characteristic_mut(&mut self, hap_type: HapType) -> &mut Characteristic {
        let index = match self
            .characteristics
            .iter()
            .position(|c| c.hap_type() == hap_type)
        {
            Some(index) => index,
            None => {
                self.characteristics.push(Characteristic::new(hap_type));
                self.characteristics.len() - 1
            }
        };
        &mut self.characteristics[index]
    }

    /// Pushes a device-side value to an existing characteristic.
    pub fn update_characteristic(
        &mut self,
        hap_type: HapType,
        value: impl Into<Value>,
    ) -> Result<(), AdapterError> {
        self.get_mut_characteristic(hap_type)
            .ok_or(AdapterError::CharacteristicNotFound(hap_type))?
            .update_value(value.into());
        Ok(())
    }
}
