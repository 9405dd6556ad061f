use thiserror::Error;

/// Failure categories reported by device drivers and their transports.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DeviceError {
    /// Host unreachable, connection refused or request timed out.
    #[error("transport error: {0}")]
    Transport(String),
    /// Token missing, invalid or expired.
    #[error("authentication failed: {0}")]
    Authentication(String),
    /// The fixture refused the pairing handshake.
    #[error("authorization denied: {0}")]
    AuthorizationDenied(String),
    /// Resolved LED count is zero or differs from the configured one.
    #[error("layout mismatch: {0}")]
    LayoutMismatch(String),
    /// The fixture answered with an unexpected shape or version.
    #[error("protocol error: {0}")]
    Protocol(String),
    /// Operation called in the wrong state or with bad arguments.
    #[error("precondition failed: {0}")]
    Precondition(String),
    #[error("resource not found: {0}")]
    NotFound(String),
    /// Missing or malformed configuration / request parameter.
    #[error("invalid configuration: {0}")]
    Config(String),
}

impl DeviceError {
    /// Maps an HTTP status of a failed REST call onto the error taxonomy.
    pub fn from_status(status: u16, context: &str) -> Self {
        match status {
            401 => DeviceError::Authentication(format!("{context}: token rejected (401)")),
            403 => DeviceError::AuthorizationDenied(format!("{context}: forbidden (403)")),
            404 => DeviceError::NotFound(format!("{context}: not found (404)")),
            other => DeviceError::Protocol(format!("{context}: unexpected HTTP status {other}")),
        }
    }
}
