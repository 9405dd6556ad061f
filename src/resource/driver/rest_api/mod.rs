//! Blocking REST client layer.
//!
//! Wraps a `reqwest::blocking::Client` bound to one fixture's API base URL.
//! Every request is bounded by the client timeout; network failures surface as
//! [`DeviceError::Transport`], HTTP error statuses are handed back to the caller
//! so the driver can map them onto its own error taxonomy.

use serde_json::Value;
use std::time::Duration;

use crate::error::DeviceError;
use crate::interface::transport::{Method, RestResponse, RestTransport};

/// Path prefix of the fixture's versioned API.
pub const API_BASE_PATH: &str = "/api/v1/";

pub struct RestApi {
    client: reqwest::blocking::Client,
    base_url: String,
}

impl RestApi {
    /// Creates a client for `http://<host>:<port>/api/v1/`.
    ///
    /// # Arguments
    /// * `host` - Hostname or IP address of the fixture (IPv6 without brackets is accepted)
    /// * `port` - REST port
    /// * `timeout` - Upper bound for connect + response of every request
    pub fn new(host: &str, port: u16, timeout: Duration) -> Result<Self, DeviceError> {
        if host.trim().is_empty() {
            return Err(DeviceError::Config("host must not be empty".to_string()));
        }

        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .connect_timeout(timeout)
            .build()
            .map_err(|e| DeviceError::Transport(format!("Failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: Self::base_url(host, port),
        })
    }

    /// Builds the API base URL, bracketing bare IPv6 literals.
    pub fn base_url(host: &str, port: u16) -> String {
        let host = host.trim();
        if host.contains(':') && !host.starts_with('[') {
            format!("http://[{host}]:{port}{API_BASE_PATH}")
        } else {
            format!("http://{host}:{port}{API_BASE_PATH}")
        }
    }

    pub fn url(&self) -> &str {
        &self.base_url
    }
}

impl RestTransport for RestApi {
    fn request(
        &mut self,
        method: Method,
        path: &str,
        body: Option<&Value>,
    ) -> Result<RestResponse, DeviceError> {
        let url = format!("{}{}", self.base_url, path.trim_start_matches('/'));

        let mut request = match method {
            Method::Get => self.client.get(&url),
            Method::Put => self.client.put(&url),
            Method::Post => self.client.post(&url),
        };
        if let Some(body) = body {
            request = request.json(body);
        }

        log::debug!(method = method.as_str(), path = path; "REST request");

        let response = request.send().map_err(|e| {
            if e.is_timeout() {
                DeviceError::Transport(format!("{} {} timed out", method.as_str(), path))
            } else {
                DeviceError::Transport(format!("{} {} failed: {}", method.as_str(), path, e))
            }
        })?;

        let status = response.status().as_u16();
        let text = response
            .text()
            .map_err(|e| DeviceError::Transport(format!("Failed to read response body: {e}")))?;

        log::debug!(status = status, len = text.len(); "REST response");

        let body = if text.trim().is_empty() {
            Value::Null
        } else {
            match serde_json::from_str::<Value>(&text) {
                Ok(v) => v,
                // Error pages are not JSON; keep the raw text for diagnostics.
                Err(_) if !(200..300).contains(&status) => Value::String(text),
                Err(e) => {
                    return Err(DeviceError::Protocol(format!(
                        "Invalid JSON in response to {path}: {e}"
                    )))
                }
            }
        };

        Ok(RestResponse::new(status, body))
    }
}
