use serde::Deserialize;

use super::{OnOff, lenient_number};

pub const SPEED_LOW: u8 = 50;
pub const SPEED_HIGH: u8 = 100;

/// The diffuser only runs at 50% or 100%.
pub fn speed_tier(value: f64) -> u8 {
    if value <= 75.0 { SPEED_LOW } else { SPEED_HIGH }
}

/// `state` is 1 or 2 on the device, 50 or 100 in HomeKit.
pub fn speed_to_state(speed: u8) -> u8 {
    speed / SPEED_LOW
}

pub fn state_to_speed(state: u8) -> u8 {
    state.saturating_mul(SPEED_LOW)
}

#[derive(Debug, Default, Deserialize)]
pub struct DiffuserParams {
    #[serde(default)]
    pub switch: Option<OnOff>,
    #[serde(default, deserialize_with = "lenient_number")]
    pub state: Option<f64>,
    #[serde(default, deserialize_with = "lenient_number")]
    pub lightswitch: Option<f64>,
    #[serde(default, deserialize_with = "lenient_number")]
    pub lightbright: Option<f64>,
    #[serde(rename = "lightRcolor", default, deserialize_with = "lenient_number")]
    pub light_r: Option<f64>,
    #[serde(rename = "lightGcolor", default, deserialize_with = "lenient_number")]
    pub light_g: Option<f64>,
    #[serde(rename = "lightBcolor", default, deserialize_with = "lenient_number")]
    pub light_b: Option<f64>,
    #[serde(rename = "updateSource", default)]
    pub update_source: bool,
}

fn channel(value: f64) -> u8 {
    value.round().clamp(0.0, 255.0) as u8
}

impl DiffuserParams {
    pub fn speed(&self) -> Option<u8> {
        self.state.map(|s| state_to_speed(s.round().clamp(0.0, 2.0) as u8))
    }

    pub fn light_on(&self) -> Option<bool> {
        self.lightswitch.map(|l| l == 1.0)
    }

    pub fn brightness(&self) -> Option<u8> {
        self.lightbright.map(|b| b.round().clamp(0.0, 100.0) as u8)
    }

    /// Only complete triplets are treated as a colour report.
    pub fn rgb(&self) -> Option<[u8; 3]> {
        Some([
            channel(self.light_r?),
            channel(self.light_g?),
            channel(self.light_b?),
        ])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_speed_rounds_at_75() {
        assert_eq!(speed_tier(80.0), SPEED_HIGH);
        assert_eq!(speed_tier(60.0), SPEED_LOW);
        assert_eq!(speed_tier(75.0), SPEED_LOW);
        assert_eq!(speed_tier(1.0), SPEED_LOW);
    }

    #[test]
    fn test_state_mapping() {
        assert_eq!(speed_to_state(SPEED_LOW), 1);
        assert_eq!(speed_to_state(SPEED_HIGH), 2);
        assert_eq!(state_to_speed(0), 0);
        assert_eq!(state_to_speed(2), SPEED_HIGH);
    }

    #[test]
    fn test_decode_params() {
        let params: DiffuserParams = serde_json::from_value(json!({
            "switch": "on",
            "state": 2,
            "lightswitch": 1,
            "lightbright": 40,
            "lightRcolor": 255,
            "lightGcolor": 0,
            "lightBcolor": 128,
        }))
        .unwrap();
        assert_eq!(params.switch, Some(OnOff::On));
        assert_eq!(params.speed(), Some(SPEED_HIGH));
        assert_eq!(params.light_on(), Some(true));
        assert_eq!(params.brightness(), Some(40));
        assert_eq!(params.rgb(), Some([255, 0, 128]));
    }

    #[test]
    fn test_partial_colour_is_ignored() {
        let params: DiffuserParams =
            serde_json::from_value(json!({"lightRcolor": 255})).unwrap();
        assert_eq!(params.rgb(), None);
    }
}
