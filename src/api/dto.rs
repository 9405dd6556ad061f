use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::time::Duration;

use crate::error::DeviceError;

pub const DEFAULT_REST_PORT: u16 = 16021;
pub const DEFAULT_REST_TIMEOUT_MS: u64 = 5000;

// ============================================================================
// Device config DTO (supplied at construction, persisted via config_store)
// ============================================================================

fn default_rest_port() -> u16 {
    DEFAULT_REST_PORT
}

fn default_true() -> bool {
    true
}

fn default_brightness() -> u8 {
    100
}

fn default_rest_timeout_ms() -> u64 {
    DEFAULT_REST_TIMEOUT_MS
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceConfig {
    pub host: String,
    #[serde(default = "default_rest_port")]
    pub rest_api_port: u16,
    /// Empty until the fixture has been paired.
    #[serde(default)]
    pub token: String,
    #[serde(default = "default_true")]
    pub panel_order_top_down: bool,
    #[serde(default = "default_true")]
    pub panel_order_left_right: bool,
    /// Apply `brightness` on the fixture while streaming.
    #[serde(default)]
    pub brightness_control: bool,
    #[serde(default = "default_brightness")]
    pub brightness: u8,
    /// Expected number of LED panels. Checked against the fixture's layout when set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hardware_led_count: Option<usize>,
    #[serde(default = "default_rest_timeout_ms")]
    pub rest_timeout_ms: u64,
    /// Per shape-type code: `true` forces LED-bearing, `false` forces non-LED.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub shape_type_overrides: BTreeMap<u16, bool>,
}

impl DeviceConfig {
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            rest_api_port: DEFAULT_REST_PORT,
            token: String::new(),
            panel_order_top_down: true,
            panel_order_left_right: true,
            brightness_control: false,
            brightness: default_brightness(),
            hardware_led_count: None,
            rest_timeout_ms: DEFAULT_REST_TIMEOUT_MS,
            shape_type_overrides: BTreeMap::new(),
        }
    }

    pub fn from_json(value: &Value) -> Result<Self, DeviceError> {
        let config: Self = parse_params(value)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), DeviceError> {
        if self.host.trim().is_empty() {
            return Err(DeviceError::Config("'host' must not be empty".to_string()));
        }
        if self.brightness > 100 {
            return Err(DeviceError::Config(format!(
                "'brightness' must be within 0..=100, got {}",
                self.brightness
            )));
        }
        if self.rest_timeout_ms == 0 {
            return Err(DeviceError::Config("'restTimeoutMs' must be positive".to_string()));
        }
        Ok(())
    }

    pub fn rest_timeout(&self) -> Duration {
        Duration::from_millis(self.rest_timeout_ms)
    }

    pub fn has_token(&self) -> bool {
        !self.token.trim().is_empty()
    }
}

// ============================================================================
// Request parameter DTOs
// ============================================================================

/// Deserializes a parameter object, reporting missing keys as config errors.
pub fn parse_params<T: DeserializeOwned>(params: &Value) -> Result<T, DeviceError> {
    T::deserialize(params).map_err(|e| DeviceError::Config(e.to_string()))
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiscoverParams {
    #[serde(default)]
    pub timeout_ms: Option<u64>,
    #[serde(default)]
    pub service_type: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PropertiesParams {
    pub host: String,
    pub token: String,
    #[serde(default = "default_rest_port")]
    pub port: u16,
    /// Resource path below the token, root when empty.
    #[serde(default)]
    pub filter: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IdentifyParams {
    pub host: String,
    pub token: String,
    #[serde(default = "default_rest_port")]
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthorizationParams {
    pub host: String,
    #[serde(default = "default_rest_port")]
    pub port: u16,
    /// How long to keep retrying while waiting for the pairing button. Zero means one attempt.
    #[serde(default)]
    pub pairing_timeout_ms: u64,
    #[serde(default = "default_pairing_interval_ms")]
    pub pairing_interval_ms: u64,
}

fn default_pairing_interval_ms() -> u64 {
    1000
}

// ============================================================================
// Response DTOs
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthorizationResponse {
    pub auth_token: String,
}

/// One fixture answering a discovery query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FixtureDescriptor {
    pub name: String,
    pub hostname: String,
    pub ip: String,
    pub port: u16,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub firmware: Option<String>,
}
