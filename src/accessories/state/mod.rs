//! Device parameter encodings and the pure mappings between them and HomeKit
//! characteristic values.

pub mod curtain;
pub mod diffuser;
pub mod fan;
pub mod switch;
pub mod thermostat;

use std::fmt;

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OnOff {
    On,
    #[default]
    Off,
}

impl OnOff {
    pub fn is_on(&self) -> bool {
        *self == OnOff::On
    }
}

impl From<bool> for OnOff {
    fn from(on: bool) -> Self {
        if on { OnOff::On } else { OnOff::Off }
    }
}

impl fmt::Display for OnOff {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            OnOff::On => "on",
            OnOff::Off => "off",
        })
    }
}

/// Devices report numbers either as JSON numbers or as numeric strings, and
/// sensors report `"unavailable"` when they have no reading.
pub(crate) fn lenient_number<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Number(f64),
        Text(String),
    }

    match Option::<Raw>::deserialize(deserializer)? {
        None => Ok(None),
        Some(Raw::Number(n)) => Ok(Some(n)),
        Some(Raw::Text(text)) if text == "unavailable" => Ok(None),
        Some(Raw::Text(text)) => text
            .trim()
            .parse::<f64>()
            .map(Some)
            .map_err(|_| D::Error::custom(format!("expected a number, got {text:?}"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Deserialize)]
    struct Reading {
        #[serde(default, deserialize_with = "lenient_number")]
        value: Option<f64>,
    }

    fn read(json: &str) -> serde_json::Result<Option<f64>> {
        serde_json::from_str::<Reading>(json).map(|r| r.value)
    }

    #[test]
    fn test_lenient_number() {
        assert_eq!(read(r#"{"value": 21.5}"#).unwrap(), Some(21.5));
        assert_eq!(read(r#"{"value": "45"}"#).unwrap(), Some(45.0));
        assert_eq!(read(r#"{"value": "unavailable"}"#).unwrap(), None);
        assert_eq!(read(r#"{}"#).unwrap(), None);
        assert!(read(r#"{"value": "warm"}"#).is_err());
        assert!(read(r#"{"value": [1]}"#).is_err());
    }

    #[test]
    fn test_on_off_encoding() {
        assert_eq!(serde_json::to_string(&OnOff::On).unwrap(), r#""on""#);
        assert_eq!(
            serde_json::from_str::<OnOff>(r#""off""#).unwrap(),
            OnOff::Off
        );
        assert!(serde_json::from_str::<OnOff>(r#""maybe""#).is_err());
        assert_eq!(OnOff::from(true).to_string(), "on");
    }
}
