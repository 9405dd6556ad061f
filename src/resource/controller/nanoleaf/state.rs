//! Capture and restore of the user-visible fixture state around a streaming session.

use serde::Deserialize;
use serde_json::Value;

use super::protocol::{
    on_request, select_effect_request, token_path, value_request, API_EFFECTS,
    API_EFFECT_SELECT, API_STATE, COLOR_MODE_CT, COLOR_MODE_EFFECT, COLOR_MODE_HS,
    EFFECT_DYNAMIC, EFFECT_EXT_CONTROL, EFFECT_SOLID,
};
use crate::error::DeviceError;
use crate::interface::transport::RestTransport;

#[derive(Debug, Deserialize)]
struct ValueField<T> {
    value: T,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StateDto {
    on: ValueField<bool>,
    #[serde(default)]
    brightness: Option<ValueField<i64>>,
    #[serde(default)]
    hue: Option<ValueField<i64>>,
    #[serde(default)]
    sat: Option<ValueField<i64>>,
    #[serde(default)]
    ct: Option<ValueField<i64>>,
    #[serde(default)]
    color_mode: Option<String>,
}

/// Fixture state before streaming started.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OriginalState {
    pub is_on: bool,
    pub color_mode: Option<String>,
    pub hue: Option<i64>,
    pub sat: Option<i64>,
    pub ct: Option<i64>,
    pub brightness: Option<i64>,
    pub effect: Option<String>,
    /// The running effect is a transient one that cannot be selected by name.
    pub is_dynamic_effect: bool,
}

impl OriginalState {
    pub fn capture(rest: &mut dyn RestTransport, token: &str) -> Result<Self, DeviceError> {
        let body = rest
            .get(&token_path(token, API_STATE))?
            .into_result(API_STATE)?;
        let state = StateDto::deserialize(&body)
            .map_err(|e| DeviceError::Protocol(format!("Invalid state response: {e}")))?;

        let mut original = OriginalState {
            is_on: state.on.value,
            color_mode: state.color_mode,
            hue: state.hue.map(|f| f.value),
            sat: state.sat.map(|f| f.value),
            ct: state.ct.map(|f| f.value),
            brightness: state.brightness.map(|f| f.value),
            effect: None,
            is_dynamic_effect: false,
        };

        if original.color_mode.as_deref() == Some(COLOR_MODE_EFFECT) {
            let selected = rest
                .get(&token_path(token, API_EFFECT_SELECT))?
                .into_result(API_EFFECT_SELECT)?;
            let effect = match selected {
                Value::String(name) => name,
                other => {
                    return Err(DeviceError::Protocol(format!(
                        "Invalid effect selection response: {other}"
                    )))
                }
            };
            if effect == EFFECT_EXT_CONTROL {
                log::warn!("Fixture is already in external control mode, its effect cannot be restored");
            }
            original.is_dynamic_effect = effect == EFFECT_DYNAMIC || effect == EFFECT_SOLID;
            original.effect = Some(effect);
        }

        log::info!(
            on = original.is_on,
            color_mode = original.color_mode.as_deref().unwrap_or("-"),
            effect = original.effect.as_deref().unwrap_or("-");
            "Stored original fixture state"
        );

        Ok(original)
    }

    /// Re-applies every captured field.
    ///
    /// Each field is attempted even if an earlier one failed; the first failure
    /// is returned once all have been tried.
    pub fn restore(&self, rest: &mut dyn RestTransport, token: &str) -> Result<(), DeviceError> {
        let state_path = token_path(token, API_STATE);
        let mut steps: Vec<(&'static str, String, Value)> = Vec::new();

        let push_hs = |steps: &mut Vec<(&'static str, String, Value)>| {
            if let Some(hue) = self.hue {
                steps.push(("hue", state_path.clone(), value_request("hue", hue)));
            }
            if let Some(sat) = self.sat {
                steps.push(("sat", state_path.clone(), value_request("sat", sat)));
            }
        };

        match self.color_mode.as_deref() {
            Some(COLOR_MODE_EFFECT) => match self.effect.as_deref() {
                Some(EFFECT_SOLID) => push_hs(&mut steps),
                Some(EFFECT_DYNAMIC) => {
                    log::warn!("Original effect was a dynamic effect and cannot be re-selected");
                }
                Some(EFFECT_EXT_CONTROL) => {
                    log::warn!("Original effect was the external control stream, skipping it");
                }
                Some(name) => steps.push((
                    "effect",
                    token_path(token, API_EFFECTS),
                    select_effect_request(name),
                )),
                None => {}
            },
            Some(COLOR_MODE_HS) => push_hs(&mut steps),
            Some(COLOR_MODE_CT) => {
                if let Some(ct) = self.ct {
                    steps.push(("ct", state_path.clone(), value_request("ct", ct)));
                }
            }
            _ => {}
        }

        if let Some(brightness) = self.brightness {
            steps.push((
                "brightness",
                state_path.clone(),
                value_request("brightness", brightness),
            ));
        }
        steps.push(("on", state_path.clone(), on_request(self.is_on)));

        let mut first_error = None;
        for (field, path, body) in steps {
            let result = rest.put(&path, &body).and_then(|r| r.into_result(field));
            if let Err(e) = result {
                log::warn!(field = field, err:display = e; "Failed to restore fixture state field");
                first_error.get_or_insert(e);
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => {
                log::info!(on = self.is_on; "Restored original fixture state");
                Ok(())
            }
        }
    }
}
