use serde_json::Value;
use std::net::SocketAddr;

use crate::error::DeviceError;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Method {
    Get,
    Put,
    Post,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Put => "PUT",
            Method::Post => "POST",
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct RestResponse {
    pub status: u16,
    /// Parsed JSON body, `Value::Null` when the body was empty.
    pub body: Value,
}

impl RestResponse {
    pub fn new(status: u16, body: Value) -> Self {
        Self { status, body }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Returns the body of a successful response, otherwise the mapped error.
    pub fn into_result(self, context: &str) -> Result<Value, DeviceError> {
        if self.is_success() {
            Ok(self.body)
        } else {
            Err(DeviceError::from_status(self.status, context))
        }
    }
}

/// Request/response access to a fixture's REST API.
///
/// `path` is relative to the API base (`/api/v1/`). Implementations must
/// bound every call by a timeout and report network failures as
/// [`DeviceError::Transport`]; HTTP error statuses are returned as responses.
pub trait RestTransport: Send {
    fn request(
        &mut self,
        method: Method,
        path: &str,
        body: Option<&Value>,
    ) -> Result<RestResponse, DeviceError>;

    fn get(&mut self, path: &str) -> Result<RestResponse, DeviceError> {
        self.request(Method::Get, path, None)
    }

    fn put(&mut self, path: &str, body: &Value) -> Result<RestResponse, DeviceError> {
        self.request(Method::Put, path, Some(body))
    }

    fn post(&mut self, path: &str, body: Option<&Value>) -> Result<RestResponse, DeviceError> {
        self.request(Method::Post, path, body)
    }
}

/// Fire-and-forget datagram sender.
pub trait UdpTransport: Send {
    fn send_to(&mut self, data: &[u8], addr: SocketAddr) -> Result<(), DeviceError>;
}
