use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use super::{OnOff, lenient_number};

/// Context key holding the last commanded target temperature.
pub const TARGET_CONTEXT_KEY: &str = "cacheTarget";
pub const DEFAULT_TARGET: f64 = 20.0;

/// The heater relay runs whenever the thermostat is on and the room is below target.
pub fn heating_state(on: bool, current: f64, target: f64) -> bool {
    on && current < target
}

/// `TargetHeatingCoolingState` is restricted to off (0) and heat (1).
pub fn main_switch_params(on: bool) -> Value {
    if on {
        json!({ "mainSwitch": OnOff::On })
    } else {
        json!({ "mainSwitch": OnOff::Off, "switch": OnOff::Off })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Reaction {
    pub switch: OnOff,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ThresholdRule {
    #[serde(rename = "targetHigh", skip_serializing_if = "Option::is_none")]
    pub target_high: Option<String>,
    #[serde(rename = "targetLow", skip_serializing_if = "Option::is_none")]
    pub target_low: Option<String>,
    pub reaction: Reaction,
}

/// Automation installed on the device: relay off above the target, on below it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ThresholdPayload {
    #[serde(rename = "deviceType")]
    pub device_type: &'static str,
    pub targets: [ThresholdRule; 2],
}

impl ThresholdPayload {
    pub fn new(target: f64) -> Self {
        let threshold = format!("{target:.1}");
        Self {
            device_type: "temperature",
            targets: [
                ThresholdRule {
                    target_high: Some(threshold.clone()),
                    target_low: None,
                    reaction: Reaction { switch: OnOff::Off },
                },
                ThresholdRule {
                    target_high: None,
                    target_low: Some(threshold),
                    reaction: Reaction { switch: OnOff::On },
                },
            ],
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct ThermostatParams {
    #[serde(rename = "mainSwitch", default)]
    pub main_switch: Option<OnOff>,
    #[serde(default)]
    pub switch: Option<OnOff>,
    #[serde(rename = "currentTemperature", default, deserialize_with = "lenient_number")]
    pub current_temperature: Option<f64>,
    #[serde(rename = "currentHumidity", default, deserialize_with = "lenient_number")]
    pub current_humidity: Option<f64>,
    #[serde(rename = "updateSource", default)]
    pub update_source: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_heating_state() {
        assert!(heating_state(true, 20.0, 22.5));
        assert!(!heating_state(true, 23.0, 22.5));
        assert!(!heating_state(true, 22.5, 22.5));
        assert!(!heating_state(false, 18.0, 22.5));
    }

    #[test]
    fn test_threshold_payload() {
        let payload = serde_json::to_value(ThresholdPayload::new(22.5)).unwrap();
        assert_eq!(
            payload,
            json!({
                "deviceType": "temperature",
                "targets": [
                    {"targetHigh": "22.5", "reaction": {"switch": "off"}},
                    {"targetLow": "22.5", "reaction": {"switch": "on"}},
                ]
            })
        );

        let payload = ThresholdPayload::new(20.0);
        assert_eq!(payload.targets[0].target_high.as_deref(), Some("20.0"));
    }

    #[test]
    fn test_main_switch_params() {
        assert_eq!(main_switch_params(true), json!({"mainSwitch": "on"}));
        assert_eq!(
            main_switch_params(false),
            json!({"mainSwitch": "off", "switch": "off"})
        );
    }

    #[test]
    fn test_unavailable_sensor() {
        let params: ThermostatParams = serde_json::from_value(json!({
            "currentTemperature": "unavailable",
            "currentHumidity": "48",
        }))
        .unwrap();
        assert_eq!(params.current_temperature, None);
        assert_eq!(params.current_humidity, Some(48.0));
    }
}
