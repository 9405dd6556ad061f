//! In-memory fixture used by the driver tests.

use serde_json::{json, Value};
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use crate::error::DeviceError;
use crate::interface::transport::{Method, RestResponse, RestTransport, UdpTransport};

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Pairing {
    Grant(String),
    Deny,
}

#[derive(Debug)]
pub struct FixtureModel {
    pub on: bool,
    pub brightness: i64,
    pub hue: i64,
    pub sat: i64,
    pub ct: i64,
    pub color_mode: String,
    pub effect: String,
    pub model: String,
    pub firmware: String,
    pub position_data: Value,
    pub pairing: Pairing,
    pub pairing_attempts: usize,
    pub identify_count: usize,
    pub fail_mode_switch: bool,
    /// Every GET is answered with HTTP 503.
    pub fail_reads: bool,
    pub unreachable: bool,
    /// A `state` key whose PUT is answered with HTTP 500.
    pub reject_state_key: Option<String>,
    pub requests: Vec<(Method, String, Option<Value>)>,
}

impl Default for FixtureModel {
    fn default() -> Self {
        Self {
            on: true,
            brightness: 80,
            hue: 0,
            sat: 0,
            ct: 2700,
            color_mode: "effect".to_string(),
            effect: "Forest".to_string(),
            model: "NL29".to_string(),
            firmware: "5.1.0".to_string(),
            position_data: json!([
                { "panelId": 1,  "x": 0,   "y": 0,  "o": 0,   "shapeType": 8 },
                { "panelId": 2,  "x": 50,  "y": 0,  "o": 60,  "shapeType": 8 },
                { "panelId": 3,  "x": 100, "y": 0,  "o": 0,   "shapeType": 8 },
                { "panelId": 4,  "x": 50,  "y": 86, "o": 180, "shapeType": 8 },
                { "panelId": 99, "x": 0,   "y": 0,  "o": 0,   "shapeType": 12 }
            ]),
            pairing: Pairing::Grant("fresh-token".to_string()),
            pairing_attempts: 0,
            identify_count: 0,
            fail_mode_switch: false,
            fail_reads: false,
            unreachable: false,
            reject_state_key: None,
            requests: Vec::new(),
        }
    }
}

impl FixtureModel {
    fn state_json(&self) -> Value {
        json!({
            "on": { "value": self.on },
            "brightness": { "value": self.brightness, "max": 100, "min": 0 },
            "hue": { "value": self.hue, "max": 360, "min": 0 },
            "sat": { "value": self.sat, "max": 100, "min": 0 },
            "ct": { "value": self.ct, "max": 6500, "min": 1200 },
            "colorMode": self.color_mode,
        })
    }

    fn root_json(&self) -> Value {
        json!({
            "name": "Shapes 7A2F",
            "serialNo": "S19124C8036",
            "manufacturer": "Nanoleaf",
            "firmwareVersion": self.firmware,
            "model": self.model,
            "state": self.state_json(),
            "effects": {
                "select": self.effect,
                "effectsList": ["Forest", "Northern Lights", "Nemo"],
            },
            "panelLayout": {
                "globalOrientation": { "value": 0, "max": 360, "min": 0 },
                "layout": {
                    "numPanels": self.position_data.as_array().map(|a| a.len()).unwrap_or(0),
                    "sideLength": 134,
                    "positionData": self.position_data,
                },
            },
        })
    }

    fn apply_state(&mut self, body: &Value) -> RestResponse {
        let Some(obj) = body.as_object() else {
            return RestResponse::new(400, Value::Null);
        };
        for (key, field) in obj {
            if self.reject_state_key.as_deref() == Some(key.as_str()) {
                return RestResponse::new(500, Value::Null);
            }
            let value = &field["value"];
            match key.as_str() {
                "on" => self.on = value.as_bool().unwrap_or(self.on),
                "brightness" => self.brightness = value.as_i64().unwrap_or(self.brightness),
                "hue" | "sat" => {
                    let v = value.as_i64().unwrap_or(0);
                    if key == "hue" {
                        self.hue = v;
                    } else {
                        self.sat = v;
                    }
                    self.color_mode = "hs".to_string();
                    self.effect = "*Solid*".to_string();
                }
                "ct" => {
                    self.ct = value.as_i64().unwrap_or(self.ct);
                    self.color_mode = "ct".to_string();
                    self.effect = "*Solid*".to_string();
                }
                _ => return RestResponse::new(400, Value::Null),
            }
        }
        RestResponse::new(204, Value::Null)
    }

    fn apply_effects(&mut self, body: &Value) -> RestResponse {
        if let Some(name) = body.get("select").and_then(Value::as_str) {
            self.effect = name.to_string();
            self.color_mode = "effect".to_string();
            return RestResponse::new(204, Value::Null);
        }
        if let Some(write) = body.get("write") {
            if write["animType"] != "extControl" {
                return RestResponse::new(400, Value::Null);
            }
            if self.fail_mode_switch {
                return RestResponse::new(500, Value::Null);
            }
            self.effect = "*ExtControl*".to_string();
            self.color_mode = "effect".to_string();
            if write["extControlVersion"] == "v2" {
                return RestResponse::new(204, Value::Null);
            }
            return RestResponse::new(
                200,
                json!({
                    "streamControlIpAddr": "127.0.0.1",
                    "streamControlPort": 60221,
                    "streamControlProtocol": "udp",
                }),
            );
        }
        RestResponse::new(400, Value::Null)
    }

    fn handle(&mut self, method: Method, path: &str, body: Option<&Value>) -> RestResponse {
        if path == "new" {
            if method != Method::Post {
                return RestResponse::new(405, Value::Null);
            }
            self.pairing_attempts += 1;
            return match &self.pairing {
                Pairing::Grant(token) => RestResponse::new(200, json!({ "auth_token": token })),
                Pairing::Deny => RestResponse::new(403, Value::Null),
            };
        }

        let (token, resource) = path.split_once('/').unwrap_or((path, ""));
        if token != FakeFixture::TOKEN {
            return RestResponse::new(401, Value::Null);
        }
        let resource = resource.trim_matches('/');
        let null = Value::Null;
        let body = body.unwrap_or(&null);

        match (method, resource) {
            (Method::Get, _) if self.fail_reads => RestResponse::new(503, Value::Null),
            (Method::Get, _) => {
                let mut node = self.root_json();
                for segment in resource.split('/').filter(|s| !s.is_empty()) {
                    match node.get(segment) {
                        Some(child) => node = child.clone(),
                        None => return RestResponse::new(404, Value::Null),
                    }
                }
                RestResponse::new(200, node)
            }
            (Method::Put, "state") => self.apply_state(body),
            (Method::Put, "effects") => self.apply_effects(body),
            (Method::Put, "identify") => {
                self.identify_count += 1;
                RestResponse::new(204, Value::Null)
            }
            _ => RestResponse::new(404, Value::Null),
        }
    }
}

/// Shared handle to a [`FixtureModel`]; every transport it hands out talks to the same model.
#[derive(Clone, Default)]
pub struct FakeFixture {
    model: Arc<Mutex<FixtureModel>>,
}

impl FakeFixture {
    pub const TOKEN: &'static str = "test-token";

    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_model<R>(&self, f: impl FnOnce(&mut FixtureModel) -> R) -> R {
        let mut model = self.model.lock().unwrap();
        f(&mut model)
    }

    pub fn transport(&self) -> FakeRest {
        FakeRest {
            model: self.model.clone(),
        }
    }
}

pub struct FakeRest {
    model: Arc<Mutex<FixtureModel>>,
}

impl RestTransport for FakeRest {
    fn request(
        &mut self,
        method: Method,
        path: &str,
        body: Option<&Value>,
    ) -> Result<RestResponse, DeviceError> {
        let mut model = self.model.lock().unwrap();
        model
            .requests
            .push((method, path.to_string(), body.cloned()));
        if model.unreachable {
            return Err(DeviceError::Transport(format!("{} {} timed out", method.as_str(), path)));
        }
        Ok(model.handle(method, path, body))
    }
}

#[derive(Clone, Default)]
pub struct RecordingUdp {
    pub sent: Arc<Mutex<Vec<(SocketAddr, Vec<u8>)>>>,
}

impl RecordingUdp {
    pub fn datagrams(&self) -> Vec<(SocketAddr, Vec<u8>)> {
        self.sent.lock().unwrap().clone()
    }
}

impl UdpTransport for RecordingUdp {
    fn send_to(&mut self, data: &[u8], addr: SocketAddr) -> Result<(), DeviceError> {
        self.sent.lock().unwrap().push((addr, data.to_vec()));
        Ok(())
    }
}
