use serde::Deserialize;
use serde_json::{Value, json};

use super::{OnOff, lenient_number};

pub const FULLY_OPENED: u8 = 100;
pub const FULLY_CLOSED: u8 = 0;

/// Command sent to a curtain motor.
///
/// The device uses `setclose` where 0 is open and 100 is closed, the opposite
/// of HomeKit, so intermediate positions are inverted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CurtainCommand {
    Switch(OnOff),
    SetClose(u8),
}

impl CurtainCommand {
    pub fn from_position(position: u8) -> Self {
        match position.min(FULLY_OPENED) {
            FULLY_OPENED => CurtainCommand::Switch(OnOff::On),
            FULLY_CLOSED => CurtainCommand::Switch(OnOff::Off),
            position => CurtainCommand::SetClose(FULLY_OPENED - position),
        }
    }

    pub fn position(&self) -> u8 {
        match self {
            CurtainCommand::Switch(OnOff::On) => FULLY_OPENED,
            CurtainCommand::Switch(OnOff::Off) => FULLY_CLOSED,
            CurtainCommand::SetClose(close) => FULLY_OPENED - (*close).min(FULLY_OPENED),
        }
    }

    pub fn to_params(&self) -> Value {
        match self {
            CurtainCommand::Switch(switch) => json!({ "switch": switch }),
            CurtainCommand::SetClose(close) => json!({ "setclose": close }),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct CurtainParams {
    #[serde(default)]
    pub switch: Option<OnOff>,
    #[serde(default, deserialize_with = "lenient_number")]
    pub setclose: Option<f64>,
    #[serde(rename = "updateSource", default)]
    pub update_source: bool,
}

impl CurtainParams {
    /// HomeKit position reported by the payload. `setclose` wins over `switch`.
    pub fn position(&self) -> Option<u8> {
        match (self.setclose, self.switch) {
            (Some(close), _) => {
                Some(CurtainCommand::SetClose(close.round().clamp(0.0, 100.0) as u8).position())
            }
            (None, Some(switch)) => Some(CurtainCommand::Switch(switch).position()),
            (None, None) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_end_positions_use_switch() {
        assert_eq!(
            CurtainCommand::from_position(100).to_params(),
            json!({"switch": "on"})
        );
        assert_eq!(
            CurtainCommand::from_position(0).to_params(),
            json!({"switch": "off"})
        );
        assert_eq!(
            CurtainCommand::from_position(30).to_params(),
            json!({"setclose": 70})
        );
    }

    #[test]
    fn test_position_round_trip() {
        for position in [0, 1, 30, 50, 99, 100] {
            assert_eq!(CurtainCommand::from_position(position).position(), position);
        }
    }

    #[test]
    fn test_decode_inverts_setclose() {
        let params: CurtainParams = serde_json::from_value(json!({"setclose": 0})).unwrap();
        assert_eq!(params.position(), Some(100));

        let params: CurtainParams =
            serde_json::from_value(json!({"switch": "on", "setclose": "75"})).unwrap();
        assert_eq!(params.position(), Some(25));

        let params: CurtainParams = serde_json::from_value(json!({"switch": "off"})).unwrap();
        assert_eq!(params.position(), Some(0));

        let params: CurtainParams = serde_json::from_value(json!({"online": true})).unwrap();
        assert_eq!(params.position(), None);
    }
}
