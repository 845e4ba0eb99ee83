use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use super::{OnOff, lenient_number};
use crate::error::AdapterError;

pub const SPEED_LOW: u8 = 33;
pub const SPEED_MEDIUM: u8 = 66;
pub const SPEED_HIGH: u8 = 99;

/// Snaps a rotation speed percentage to one of the four fan tiers.
pub fn speed_tier(value: f64) -> u8 {
    match value {
        v if v >= f64::from(SPEED_HIGH) => SPEED_HIGH,
        v if v >= f64::from(SPEED_MEDIUM) => SPEED_MEDIUM,
        v if v >= f64::from(SPEED_LOW) => SPEED_LOW,
        _ => 0,
    }
}

/// Fan emulated on a four channel relay: channel 0 drives the light, channels
/// 1 to 3 encode the speed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FanState {
    pub active: bool,
    pub speed: u8,
    pub light: bool,
}

impl FanState {
    /// Turning on keeps a running speed, or starts on the lowest tier.
    pub fn with_power(self, on: bool) -> Self {
        let speed = match (on, self.speed) {
            (false, _) => 0,
            (true, 0) => SPEED_LOW,
            (true, speed) => speed,
        };
        Self {
            active: on,
            speed,
            ..self
        }
    }

    pub fn with_speed(self, value: f64) -> Self {
        let speed = speed_tier(value);
        Self {
            active: speed >= SPEED_LOW,
            speed,
            ..self
        }
    }

    pub fn with_light(self, on: bool) -> Self {
        Self { light: on, ..self }
    }

    pub fn relays(&self) -> [OnOff; 4] {
        let running = self.active;
        [
            OnOff::from(self.light),
            OnOff::from(running && self.speed >= SPEED_LOW),
            OnOff::from(running && self.speed >= SPEED_MEDIUM && self.speed < SPEED_HIGH),
            OnOff::from(running && self.speed >= SPEED_HIGH),
        ]
    }

    /// Decodes the three speed relays. Unknown combinations mean the fan is off.
    pub fn from_relays(light: OnOff, relays: [OnOff; 3]) -> Self {
        let speed = match relays {
            [OnOff::On, OnOff::Off, OnOff::Off] => SPEED_LOW,
            [OnOff::On, OnOff::On, OnOff::Off] => SPEED_MEDIUM,
            [OnOff::On, OnOff::Off, OnOff::On] => SPEED_HIGH,
            _ => 0,
        };
        Self {
            active: speed > 0,
            speed,
            light: light.is_on(),
        }
    }

    pub fn to_params(&self) -> Value {
        let switches: Vec<RelaySwitch> = self
            .relays()
            .into_iter()
            .enumerate()
            .map(|(outlet, switch)| RelaySwitch {
                switch,
                outlet: Some(outlet as u8),
            })
            .collect();
        json!({ "switches": switches })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelaySwitch {
    pub switch: OnOff,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub outlet: Option<u8>,
}

#[derive(Debug, Default, Deserialize)]
pub struct FanParams {
    #[serde(default)]
    pub switches: Option<Vec<RelaySwitch>>,
    #[serde(default)]
    pub light: Option<OnOff>,
    #[serde(default)]
    pub fan: Option<OnOff>,
    #[serde(default, deserialize_with = "lenient_number")]
    pub speed: Option<f64>,
    #[serde(rename = "updateSource", default)]
    pub update_source: bool,
}

impl FanParams {
    pub fn state(&self) -> Result<FanState, AdapterError> {
        if let Some(switches) = &self.switches {
            let relay = |channel: u8| {
                switches
                    .iter()
                    .enumerate()
                    .find(|(i, s)| s.outlet.unwrap_or(*i as u8) == channel)
                    .map(|(_, s)| s.switch)
                    .ok_or(AdapterError::UnknownParameters)
            };
            return Ok(FanState::from_relays(
                relay(0)?,
                [relay(1)?, relay(2)?, relay(3)?],
            ));
        }

        match (self.light, self.fan, self.speed) {
            (Some(light), Some(fan), Some(speed)) => {
                let active = fan.is_on();
                let speed = if active {
                    speed_tier(speed * f64::from(SPEED_LOW))
                } else {
                    0
                };
                Ok(FanState {
                    active: active && speed > 0,
                    speed,
                    light: light.is_on(),
                })
            }
            _ => Err(AdapterError::UnknownParameters),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Parses the concatenated relay notation the device docs use, e.g. `onoffon`.
    fn triple(s: &str) -> [OnOff; 3] {
        let mut out = [OnOff::Off; 3];
        let mut rest = s;
        for slot in out.iter_mut() {
            if let Some(r) = rest.strip_prefix("on") {
                *slot = OnOff::On;
                rest = r;
            } else if let Some(r) = rest.strip_prefix("off") {
                rest = r;
            }
        }
        out
    }

    #[test]
    fn test_relay_triples_decode_to_tiers() {
        let cases = [
            ("onoffoff", 33),
            ("ononoff", 66),
            ("onoffon", 99),
            ("offoffoff", 0),
            ("ononon", 0),
            ("offonoff", 0),
        ];
        for (pattern, speed) in cases {
            let state = FanState::from_relays(OnOff::Off, triple(pattern));
            assert_eq!(state.speed, speed, "{pattern}");
            assert_eq!(state.active, speed > 0);
        }
    }

    #[test]
    fn test_tiers_encode_to_relays() {
        for speed in [SPEED_LOW, SPEED_MEDIUM, SPEED_HIGH] {
            let state = FanState::default().with_speed(f64::from(speed));
            let [light, r1, r2, r3] = state.relays();
            assert_eq!(light, OnOff::Off);
            assert_eq!(FanState::from_relays(light, [r1, r2, r3]), state);
        }
    }

    #[test]
    fn test_speed_discretised() {
        assert_eq!(speed_tier(0.0), 0);
        assert_eq!(speed_tier(20.0), 0);
        assert_eq!(speed_tier(50.0), SPEED_LOW);
        assert_eq!(speed_tier(70.0), SPEED_MEDIUM);
        assert_eq!(speed_tier(100.0), SPEED_HIGH);
    }

    #[test]
    fn test_power_keeps_running_speed() {
        let state = FanState::default().with_power(true);
        assert_eq!(state.speed, SPEED_LOW);
        let state = state.with_speed(70.0).with_power(true);
        assert_eq!(state.speed, SPEED_MEDIUM);
        let state = state.with_power(false);
        assert_eq!((state.active, state.speed), (false, 0));
    }

    #[test]
    fn test_params_shape() {
        let params = FanState::default().with_light(true).with_speed(99.0).to_params();
        assert_eq!(
            params,
            json!({"switches": [
                {"switch": "on", "outlet": 0},
                {"switch": "on", "outlet": 1},
                {"switch": "off", "outlet": 2},
                {"switch": "on", "outlet": 3},
            ]})
        );
    }

    #[test]
    fn test_decode_alternate_shape() {
        let params: FanParams =
            serde_json::from_value(json!({"light": "on", "fan": "on", "speed": 2})).unwrap();
        assert_eq!(
            params.state().unwrap(),
            FanState {
                active: true,
                speed: SPEED_MEDIUM,
                light: true
            }
        );

        let params: FanParams = serde_json::from_value(json!({"light": "on"})).unwrap();
        assert!(matches!(params.state(), Err(AdapterError::UnknownParameters)));
    }

    #[test]
    fn test_decode_short_switch_list() {
        let params: FanParams =
            serde_json::from_value(json!({"switches": [{"switch": "on", "outlet": 0}]})).unwrap();
        assert!(matches!(params.state(), Err(AdapterError::UnknownParameters)));
    }
}
