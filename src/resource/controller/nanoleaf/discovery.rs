use mdns_sd::{ServiceDaemon, ServiceEvent};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::time::{Duration, Instant};

use super::protocol::{token_path, API_IDENTIFY};
use crate::api::dto::{DiscoverParams, FixtureDescriptor, IdentifyParams, PropertiesParams};
use crate::error::DeviceError;
use crate::interface::transport::RestTransport;

/// mDNS service type advertised by the fixture's OpenAPI.
pub const SERVICE_TYPE: &str = "_nanoleafapi._tcp.local.";
pub const DEFAULT_DISCOVERY_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DiscoveryConfig {
    pub service_type: String,
    /// Listen window; discovery returns whatever answered by then.
    pub timeout: Duration,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            service_type: SERVICE_TYPE.to_string(),
            timeout: DEFAULT_DISCOVERY_TIMEOUT,
        }
    }
}

impl From<&DiscoverParams> for DiscoveryConfig {
    fn from(params: &DiscoverParams) -> Self {
        let defaults = Self::default();
        Self {
            service_type: params.service_type.clone().unwrap_or(defaults.service_type),
            timeout: params
                .timeout_ms
                .map(Duration::from_millis)
                .unwrap_or(defaults.timeout),
        }
    }
}

/// Browses the local network for fixtures. Never fails; errors yield an empty list.
pub fn discover_fixtures(config: &DiscoveryConfig) -> Vec<FixtureDescriptor> {
    let mdns = match ServiceDaemon::new() {
        Ok(d) => d,
        Err(e) => {
            log::error!(err:display = e; "Failed to create mDNS daemon");
            return Vec::new();
        }
    };

    let receiver = match mdns.browse(&config.service_type) {
        Ok(r) => r,
        Err(e) => {
            log::error!(err:display = e; "Failed to browse mDNS services");
            let _ = mdns.shutdown();
            return Vec::new();
        }
    };

    let mut devices: HashMap<String, FixtureDescriptor> = HashMap::new();
    let start = Instant::now();

    while start.elapsed() < config.timeout {
        match receiver.recv_timeout(Duration::from_millis(100)) {
            Ok(ServiceEvent::ServiceResolved(info)) => {
                let fullname = info.get_fullname().to_string();

                let Some(ip) = info.get_addresses().iter().next().map(|a| a.to_string()) else {
                    log::debug!(name = fullname.as_str(); "Skipping fixture without address");
                    continue;
                };
                let port = info.get_port();
                if port == 0 {
                    log::debug!(name = fullname.as_str(); "Skipping fixture without port");
                    continue;
                }

                let properties = info.get_properties();
                let txt = |key: &str| properties.get_property_val_str(key).map(|v| v.to_string());

                let name = fullname
                    .strip_suffix(&config.service_type)
                    .map(|n| n.trim_end_matches('.').to_string())
                    .filter(|n| !n.is_empty())
                    .unwrap_or_else(|| fullname.clone());

                let device = FixtureDescriptor {
                    hostname: format!("{}.local", name.replace(' ', "-")),
                    name,
                    ip,
                    port,
                    id: txt("id"),
                    model: txt("md"),
                    firmware: txt("srcvers"),
                };

                log::info!(
                    name = device.name.as_str(),
                    ip = device.ip.as_str(),
                    port = port;
                    "Discovered Nanoleaf fixture via mDNS"
                );

                devices.insert(fullname, device);
            }
            Ok(ServiceEvent::ServiceRemoved(_, fullname)) => {
                devices.remove(&fullname);
            }
            Ok(_) => {}
            Err(flume::RecvTimeoutError::Timeout) => continue,
            Err(_) => break,
        }
    }

    let _ = mdns.shutdown();

    let mut result: Vec<FixtureDescriptor> = devices.into_values().collect();
    result.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.ip.cmp(&b.ip)));
    result
}

/// Wraps a discovery result in the response object handed to configuration front ends.
pub fn discovery_response(devices: &[FixtureDescriptor]) -> Value {
    json!({
        "ledDeviceType": "nanoleaf",
        "discoveryMethod": "mDNS",
        "devices": devices,
    })
}

/// Fetches the resource tree, or the subtree named by `filter`.
pub fn get_properties(
    rest: &mut dyn RestTransport,
    params: &PropertiesParams,
) -> Result<Value, DeviceError> {
    if params.token.trim().is_empty() {
        return Err(DeviceError::Authentication("No token given".to_string()));
    }

    let filter = params.filter.trim_matches('/');
    let context = if filter.is_empty() { "/" } else { filter };

    let response = rest.get(&token_path(&params.token, filter))?;
    match response.status {
        401 | 404 => response.into_result(context),
        status if !response.is_success() => Err(DeviceError::Transport(format!(
            "{context}: fixture answered HTTP {status}"
        ))),
        _ => Ok(response.body),
    }
}

/// Flashes the fixture so the operator can tell which one it is.
pub fn identify(rest: &mut dyn RestTransport, params: &IdentifyParams) -> Result<(), DeviceError> {
    let result = rest
        .put(&token_path(&params.token, API_IDENTIFY), &json!({}))
        .and_then(|r| r.into_result(API_IDENTIFY));

    if let Err(ref e) = result {
        log::warn!(host = params.host.as_str(), err:display = e; "Identify request failed");
    }
    result.map(|_| ())
}
