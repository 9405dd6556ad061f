//! Nanoleaf Light Panels / Canvas / Shapes / Elements / Lines driver.
//!
//! Control-plane traffic (pairing, layout, mode switch, state) goes over the
//! fixture's REST API; colors are streamed as UDP datagrams in the
//! external-control format negotiated during `open`.

use serde::Deserialize;
use serde_json::{json, Value};
use std::net::{SocketAddr, ToSocketAddrs};
use std::path::PathBuf;

pub mod auth;
pub mod discovery;
pub mod layout;
pub mod protocol;
pub mod state;

#[cfg(test)]
pub(crate) mod testing;

use self::discovery::{discover_fixtures, discovery_response, DiscoveryConfig};
use self::layout::{resolve_layout, FixtureLayout, LayoutPolicy};
use self::protocol::{
    on_request, token_path, ExtControlVersion, NanoleafProtocol, API_EFFECTS,
    API_PANEL_LAYOUT, API_STATE, STREAM_CONTROL_DEFAULT_PORT,
};
use self::state::OriginalState;
use crate::api::config_store::save_device_config;
use crate::api::dto::{
    parse_params, AuthorizationParams, DeviceConfig, DiscoverParams, IdentifyParams,
    PropertiesParams,
};
use crate::error::DeviceError;
use crate::interface::controller::{Color, DeviceMetadata, DiscoverableDevice, LedDevice};
use crate::interface::transport::{RestTransport, UdpTransport};
use crate::resource::driver::rest_api::RestApi;
use crate::resource::driver::udp::UdpSender;

pub const DEVICE_TYPE: &str = "nanoleaf";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DeviceInfoDto {
    #[serde(default)]
    name: String,
    model: String,
    firmware_version: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DeviceDetails {
    pub name: String,
    pub model: String,
    pub firmware_version: String,
    pub ext_control_version: ExtControlVersion,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StreamControlDto {
    #[serde(default)]
    stream_control_port: Option<u16>,
    #[serde(default)]
    stream_control_protocol: Option<String>,
}

/// UDP endpoint and frame format negotiated by the mode switch.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ExternalControlSession {
    pub addr: SocketAddr,
    pub version: ExtControlVersion,
}

pub struct NanoleafDevice {
    config: DeviceConfig,
    /// Where an acquired token gets persisted.
    config_path: Option<PathBuf>,
    rest: Option<Box<dyn RestTransport>>,
    udp: Option<Box<dyn UdpTransport>>,
    details: Option<DeviceDetails>,
    layout: FixtureLayout,
    session: Option<ExternalControlSession>,
    original_state: Option<OriginalState>,
    frame_buffer: Vec<u8>,
    ready: bool,
}

impl NanoleafDevice {
    pub fn new(config: DeviceConfig) -> Result<Self, DeviceError> {
        config.validate()?;
        Ok(Self {
            config,
            config_path: None,
            rest: None,
            udp: None,
            details: None,
            layout: FixtureLayout::default(),
            session: None,
            original_state: None,
            frame_buffer: Vec::new(),
            ready: false,
        })
    }

    pub fn from_json(config: &Value) -> Result<Self, DeviceError> {
        Self::new(DeviceConfig::from_json(config)?)
    }

    /// Uses the given transports instead of opening real HTTP/UDP connections.
    pub fn with_transports(
        config: DeviceConfig,
        rest: Box<dyn RestTransport>,
        udp: Box<dyn UdpTransport>,
    ) -> Result<Self, DeviceError> {
        let mut device = Self::new(config)?;
        device.rest = Some(rest);
        device.udp = Some(udp);
        Ok(device)
    }

    /// Persist the configuration to `path` whenever `open` acquires a token.
    pub fn with_config_store(mut self, path: impl Into<PathBuf>) -> Self {
        self.config_path = Some(path.into());
        self
    }

    pub fn config(&self) -> &DeviceConfig {
        &self.config
    }

    pub fn details(&self) -> Option<&DeviceDetails> {
        self.details.as_ref()
    }

    pub fn layout(&self) -> &FixtureLayout {
        &self.layout
    }

    pub fn session(&self) -> Option<ExternalControlSession> {
        self.session
    }

    fn rest(&mut self) -> Result<&mut dyn RestTransport, DeviceError> {
        if self.rest.is_none() {
            let api = RestApi::new(
                &self.config.host,
                self.config.rest_api_port,
                self.config.rest_timeout(),
            )?;
            log::debug!(url = api.url(); "REST API initialised");
            self.rest = Some(Box::new(api));
        }
        match self.rest.as_deref_mut() {
            Some(rest) => Ok(rest),
            None => Err(DeviceError::Transport("REST API not available".to_string())),
        }
    }

    fn token(&self) -> Result<String, DeviceError> {
        if self.config.has_token() {
            Ok(self.config.token.clone())
        } else {
            Err(DeviceError::Authentication("No API token configured".to_string()))
        }
    }

    /// Sets up REST access, pairing with the fixture first when no token is configured.
    pub fn open_rest_api(&mut self) -> Result<(), DeviceError> {
        let params = AuthorizationParams {
            host: self.config.host.clone(),
            port: self.config.rest_api_port,
            pairing_timeout_ms: 0,
            pairing_interval_ms: 1000,
        };
        let needs_token = !self.config.has_token();
        let rest = self.rest()?;

        if needs_token {
            log::info!(host = params.host.as_str(); "No API token configured, requesting one");
            let granted = auth::add_authorization(rest, &params)?;
            self.config.token = granted.auth_token;

            if let Some(path) = &self.config_path {
                match save_device_config(path, &self.config) {
                    Ok(()) => log::info!(path:? = path; "Persisted new API token"),
                    Err(e) => log::warn!(err:display = e; "Failed to persist new API token"),
                }
            }
        }
        Ok(())
    }

    pub fn fetch_device_details(&mut self) -> Result<&DeviceDetails, DeviceError> {
        let token = self.token()?;
        let body = self.rest()?.get(&token_path(&token, ""))?.into_result("/")?;
        let info = DeviceInfoDto::deserialize(&body)
            .map_err(|e| DeviceError::Protocol(format!("Invalid device info: {e}")))?;

        let ext_control_version = ExtControlVersion::for_device(&info.model, &info.firmware_version);
        log::info!(
            name = info.name.as_str(),
            model = info.model.as_str(),
            firmware = info.firmware_version.as_str(),
            ext_control_version = ext_control_version.number();
            "Nanoleaf device details"
        );

        Ok(self.details.insert(DeviceDetails {
            name: info.name,
            model: info.model,
            firmware_version: info.firmware_version,
            ext_control_version,
        }))
    }

    /// Fetches the panel layout and derives the LED order and count.
    pub fn init_leds_configuration(&mut self) -> Result<(), DeviceError> {
        let token = self.token()?;
        let document = self
            .rest()?
            .get(&token_path(&token, API_PANEL_LAYOUT))?
            .into_result(API_PANEL_LAYOUT)?;

        let layout = resolve_layout(&document, &LayoutPolicy::from(&self.config))?;
        log::info!(
            led_count = layout.len(),
            top_down = self.config.panel_order_top_down,
            left_right = self.config.panel_order_left_right;
            "Resolved panel layout"
        );
        self.layout = layout;
        Ok(())
    }

    pub fn change_to_external_control_mode(&mut self) -> Result<(), DeviceError> {
        self.change_to_external_control_mode_with_response().map(|_| ())
    }

    /// Switches the fixture to UDP external control and returns the raw response.
    pub fn change_to_external_control_mode_with_response(&mut self) -> Result<Value, DeviceError> {
        let version = self
            .details
            .as_ref()
            .map(|d| d.ext_control_version)
            .ok_or_else(|| DeviceError::Precondition("Device details not fetched".to_string()))?;
        let token = self.token()?;

        let response = self
            .rest()?
            .put(&token_path(&token, API_EFFECTS), &version.mode_request())?
            .into_result(API_EFFECTS)?;

        let stream = if response.is_null() {
            StreamControlDto {
                stream_control_port: None,
                stream_control_protocol: None,
            }
        } else {
            StreamControlDto::deserialize(&response)
                .map_err(|e| DeviceError::Protocol(format!("Invalid external control response: {e}")))?
        };

        if let Some(proto) = stream.stream_control_protocol.as_deref() {
            if !proto.eq_ignore_ascii_case("udp") {
                return Err(DeviceError::Protocol(format!(
                    "Unsupported stream control protocol '{proto}'"
                )));
            }
        }

        let port = match (version, stream.stream_control_port) {
            (_, Some(port)) => port,
            (ExtControlVersion::V2, None) => STREAM_CONTROL_DEFAULT_PORT,
            (ExtControlVersion::V1, None) => {
                return Err(DeviceError::Protocol(
                    "External control response lacks streamControlPort".to_string(),
                ))
            }
        };

        let addr = (self.config.host.trim_matches(|c: char| c == '[' || c == ']'), port)
            .to_socket_addrs()
            .map_err(|e| DeviceError::Transport(format!("Cannot resolve {}: {e}", self.config.host)))?
            .next()
            .ok_or_else(|| DeviceError::Transport(format!("No address for {}", self.config.host)))?;

        if self.udp.is_none() {
            self.udp = Some(Box::new(UdpSender::bind_for(addr)?));
        }

        log::info!(addr:display = addr, version = version.number(); "External control mode enabled");
        self.session = Some(ExternalControlSession { addr, version });
        Ok(response)
    }

    fn open_sequence(&mut self) -> Result<(), DeviceError> {
        self.open_rest_api()?;
        self.fetch_device_details()?;
        self.init_leds_configuration()?;
        self.change_to_external_control_mode()
    }
}

impl LedDevice for NanoleafDevice {
    fn device_type(&self) -> &'static str {
        DEVICE_TYPE
    }

    fn led_count(&self) -> usize {
        self.layout.len()
    }

    fn is_ready(&self) -> bool {
        self.ready
    }

    fn open(&mut self) -> Result<(), DeviceError> {
        self.ready = false;
        self.session = None;

        if let Err(e) = self.open_sequence() {
            log::error!(host = self.config.host.as_str(), err:display = e; "Failed to open Nanoleaf device");
            self.session = None;
            return Err(e);
        }

        self.ready = true;
        log::info!(host = self.config.host.as_str(), leds = self.layout.len(); "Nanoleaf device ready");
        Ok(())
    }

    fn write(&mut self, colors: &[Color]) -> Result<(), DeviceError> {
        let session = match (self.ready, self.session) {
            (true, Some(session)) => session,
            _ => return Err(DeviceError::Precondition("Device is not open".to_string())),
        };

        if colors.len() != self.layout.len() {
            return Err(DeviceError::Precondition(format!(
                "Color buffer size mismatch: expected {}, got {}",
                self.layout.len(),
                colors.len()
            )));
        }

        NanoleafProtocol::encode_frame_into(
            session.version,
            self.layout.panel_ids(),
            colors,
            &mut self.frame_buffer,
        )?;

        if log::log_enabled!(log::Level::Trace) {
            log::trace!(frame = hex::encode(&self.frame_buffer).as_str(); "UDP frame");
        }

        let udp = self
            .udp
            .as_deref_mut()
            .ok_or_else(|| DeviceError::Precondition("UDP transport not open".to_string()))?;
        udp.send_to(&self.frame_buffer, session.addr)
    }

    fn power_on(&mut self) -> Result<(), DeviceError> {
        self.open_rest_api()?;
        let token = self.token()?;
        let mut body = on_request(true);
        if self.config.brightness_control {
            body["brightness"] = json!({ "value": self.config.brightness });
        }

        self.rest()?
            .put(&token_path(&token, API_STATE), &body)?
            .into_result(API_STATE)?;

        // Powering on drops the fixture out of external control.
        if self.session.is_some() {
            self.change_to_external_control_mode()?;
        }
        Ok(())
    }

    fn power_off(&mut self) -> Result<(), DeviceError> {
        self.open_rest_api()?;
        let token = self.token()?;
        self.rest()?
            .put(&token_path(&token, API_STATE), &on_request(false))?
            .into_result(API_STATE)?;
        Ok(())
    }

    fn store_state(&mut self) -> Result<(), DeviceError> {
        if self.original_state.is_some() {
            return Err(DeviceError::Precondition(
                "Original state already stored and not yet restored".to_string(),
            ));
        }
        // Once open, the fixture already runs the streaming effect.
        if self.ready || self.session.is_some() {
            return Err(DeviceError::Precondition(
                "Cannot store state while in external control mode".to_string(),
            ));
        }
        self.open_rest_api()?;
        let token = self.token()?;
        let state = OriginalState::capture(self.rest()?, &token)?;
        self.original_state = Some(state);
        Ok(())
    }

    fn restore_state(&mut self) -> Result<(), DeviceError> {
        // Keep the snapshot if the restore cannot even be attempted.
        let token = self.token()?;
        let state = self
            .original_state
            .take()
            .ok_or_else(|| DeviceError::Precondition("No original state stored".to_string()))?;
        state.restore(self.rest()?, &token)
    }

    fn has_stored_state(&self) -> bool {
        self.original_state.is_some()
    }

    fn close(&mut self) -> Result<(), DeviceError> {
        self.ready = false;
        self.session = None;
        Ok(())
    }
}

impl NanoleafDevice {
    fn rest_for(&self, host: &str, port: u16) -> Result<RestApi, DeviceError> {
        RestApi::new(host, port, self.config.rest_timeout())
    }
}

impl DiscoverableDevice for NanoleafDevice {
    fn discover(&self, params: &Value) -> Value {
        let params = parse_params::<DiscoverParams>(params).unwrap_or_else(|e| {
            log::warn!(err:display = e; "Ignoring invalid discovery parameters");
            DiscoverParams::default()
        });
        let devices = discover_fixtures(&DiscoveryConfig::from(&params));
        log::info!(count = devices.len(); "Nanoleaf discovery finished");
        discovery_response(&devices)
    }

    fn get_properties(&self, params: &Value) -> Result<Value, DeviceError> {
        let params: PropertiesParams = parse_params(params)?;
        let mut rest = self.rest_for(&params.host, params.port)?;
        discovery::get_properties(&mut rest, &params)
    }

    fn identify(&self, params: &Value) -> Result<(), DeviceError> {
        let params: IdentifyParams = parse_params(params)?;
        let mut rest = self.rest_for(&params.host, params.port)?;
        discovery::identify(&mut rest, &params)
    }

    fn add_authorization(&self, params: &Value) -> Result<Value, DeviceError> {
        let params: AuthorizationParams = parse_params(params)?;
        let mut rest = self.rest_for(&params.host, params.port)?;
        let granted = auth::add_authorization(&mut rest, &params)?;
        serde_json::to_value(granted).map_err(|e| DeviceError::Protocol(e.to_string()))
    }
}

fn construct(config: &Value) -> Result<Box<dyn LedDevice>, DeviceError> {
    Ok(Box::new(NanoleafDevice::from_json(config)?))
}

inventory::submit!(DeviceMetadata {
    name: DEVICE_TYPE,
    description: "Nanoleaf panels via the external control (UDP) protocol",
    construct,
});
