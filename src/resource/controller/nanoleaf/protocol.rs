//! Nanoleaf OpenAPI resource paths and external-control frame encoding.
use serde_json::{json, Value};

use crate::error::DeviceError;
use crate::interface::controller::Color;

/// Pairing endpoint, the only one addressed without a token.
pub const API_ADD_USER: &str = "new";
pub const API_STATE: &str = "state";
pub const API_EFFECTS: &str = "effects";
pub const API_EFFECT_SELECT: &str = "effects/select";
pub const API_PANEL_LAYOUT: &str = "panelLayout/layout";
pub const API_IDENTIFY: &str = "identify";

/// Stream port used by version 2 external control; version 1 negotiates it.
pub const STREAM_CONTROL_DEFAULT_PORT: u16 = 60222;

/// Panel transition time in units of 100 ms.
pub const TRANSITION_TIME: u8 = 1;

pub const COLOR_MODE_EFFECT: &str = "effect";
pub const COLOR_MODE_HS: &str = "hs";
pub const COLOR_MODE_CT: &str = "ct";

pub const EFFECT_DYNAMIC: &str = "*Dynamic*";
pub const EFFECT_SOLID: &str = "*Solid*";
/// Reported while the fixture is in external control mode.
pub const EFFECT_EXT_CONTROL: &str = "*ExtControl*";

/// Builds `<token>/<resource>`; an empty resource addresses the root tree.
pub fn token_path(token: &str, resource: &str) -> String {
    let resource = resource.trim_matches('/');
    if resource.is_empty() {
        format!("{token}/")
    } else {
        format!("{token}/{resource}")
    }
}

/// Wire format of the external-control UDP stream.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ExtControlVersion {
    V1,
    V2,
}

impl ExtControlVersion {
    pub fn number(&self) -> u16 {
        match self {
            ExtControlVersion::V1 => 1,
            ExtControlVersion::V2 => 2,
        }
    }

    /// Picks the stream version a fixture supports.
    ///
    /// First generation Light Panels (`NL22`) only speak v1 before firmware 3.x.
    pub fn for_device(model: &str, firmware_version: &str) -> Self {
        if model == "NL22" {
            let major = firmware_version
                .trim()
                .split('.')
                .next()
                .and_then(|m| m.parse::<u32>().ok());
            if matches!(major, Some(m) if m < 3) {
                return ExtControlVersion::V1;
            }
        }
        ExtControlVersion::V2
    }

    /// Body of the `effects` PUT that switches the fixture into external control.
    pub fn mode_request(&self) -> Value {
        match self {
            ExtControlVersion::V1 => json!({
                "write": { "command": "display", "animType": "extControl" }
            }),
            ExtControlVersion::V2 => json!({
                "write": { "command": "display", "animType": "extControl", "extControlVersion": "v2" }
            }),
        }
    }

    fn header_len(&self) -> usize {
        match self {
            ExtControlVersion::V1 => 1,
            ExtControlVersion::V2 => 2,
        }
    }

    fn record_len(&self) -> usize {
        match self {
            ExtControlVersion::V1 => 7,
            ExtControlVersion::V2 => 8,
        }
    }
}

pub fn on_request(on: bool) -> Value {
    json!({ "on": { "value": on } })
}

pub fn value_request(key: &str, value: i64) -> Value {
    json!({ key: { "value": value } })
}

pub fn select_effect_request(effect: &str) -> Value {
    json!({ "select": effect })
}

pub struct NanoleafProtocol;

impl NanoleafProtocol {
    /// Datagram size for `panel_count` panels.
    pub fn frame_len(version: ExtControlVersion, panel_count: usize) -> usize {
        version.header_len() + panel_count * version.record_len()
    }

    /// Encodes one frame into an existing buffer to avoid per-frame allocation.
    ///
    /// v1: `[n:u8]` then per panel `[id:u8, frames=1, r, g, b, w=0, t:u8]`
    /// v2: `[n:u16be]` then per panel `[id:u16be, r, g, b, w=0, t:u16be]`
    pub fn encode_frame_into(
        version: ExtControlVersion,
        panel_ids: &[u16],
        colors: &[Color],
        buffer: &mut Vec<u8>,
    ) -> Result<(), DeviceError> {
        if panel_ids.len() != colors.len() {
            return Err(DeviceError::Precondition(format!(
                "Color buffer size mismatch: expected {}, got {}",
                panel_ids.len(),
                colors.len()
            )));
        }

        let count = panel_ids.len();
        buffer.clear();
        buffer.reserve(Self::frame_len(version, count));

        match version {
            ExtControlVersion::V1 => {
                let count: u8 = count.try_into().map_err(|_| {
                    DeviceError::Protocol(format!("Panel count {count} exceeds v1 limit 255"))
                })?;
                buffer.push(count);

                for (id, color) in panel_ids.iter().zip(colors) {
                    let id: u8 = (*id).try_into().map_err(|_| {
                        DeviceError::Protocol(format!("Panel id {id} exceeds v1 limit 255"))
                    })?;
                    buffer.extend_from_slice(&[id, 1, color.r, color.g, color.b, 0, TRANSITION_TIME]);
                }
            }
            ExtControlVersion::V2 => {
                let count: u16 = count.try_into().map_err(|_| {
                    DeviceError::Protocol(format!("Panel count {count} exceeds v2 limit {}", u16::MAX))
                })?;
                buffer.extend_from_slice(&count.to_be_bytes());

                for (id, color) in panel_ids.iter().zip(colors) {
                    buffer.extend_from_slice(&id.to_be_bytes());
                    buffer.extend_from_slice(&[color.r, color.g, color.b, 0]);
                    buffer.extend_from_slice(&u16::from(TRANSITION_TIME).to_be_bytes());
                }
            }
        }

        Ok(())
    }
}
