use serde::Deserialize;

use super::OnOff;

#[derive(Debug, Default, Deserialize)]
pub struct SwitchParams {
    #[serde(default)]
    pub switch: Option<OnOff>,
    #[serde(rename = "updateSource", default)]
    pub update_source: bool,
}
