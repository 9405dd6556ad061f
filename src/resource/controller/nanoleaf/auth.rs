use serde::Deserialize;
use std::time::{Duration, Instant};

use super::protocol::API_ADD_USER;
use crate::api::dto::{AuthorizationParams, AuthorizationResponse};
use crate::error::DeviceError;
use crate::interface::transport::RestTransport;

/// Requests a new API token from the fixture.
///
/// The fixture only grants tokens while it is in pairing mode (power button
/// held for 5-7 seconds). With a pairing window configured the request is
/// repeated until the window closes; otherwise a single attempt is made.
pub fn add_authorization(
    rest: &mut dyn RestTransport,
    params: &AuthorizationParams,
) -> Result<AuthorizationResponse, DeviceError> {
    let window = Duration::from_millis(params.pairing_timeout_ms);
    let interval = Duration::from_millis(params.pairing_interval_ms.max(1));
    let started_at = Instant::now();

    loop {
        let response = rest.post(API_ADD_USER, None)?;

        match response.status {
            200 => {
                let granted = AuthorizationResponse::deserialize(&response.body).map_err(|e| {
                    DeviceError::Protocol(format!("Invalid authorization response: {e}"))
                })?;
                log::info!(host = params.host.as_str(); "New API token granted");
                return Ok(granted);
            }
            // Not in pairing mode (yet).
            401 | 403 => {
                if started_at.elapsed() + interval > window {
                    log::warn!(host = params.host.as_str(); "Pairing was not confirmed on the device");
                    return Err(DeviceError::AuthorizationDenied(
                        "Make sure the device is in pairing mode: hold the on-off button for 5-7 seconds until the LED starts flashing"
                            .to_string(),
                    ));
                }
                std::thread::sleep(interval);
            }
            other => return Err(DeviceError::from_status(other, API_ADD_USER)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resource::controller::nanoleaf::testing::{FakeFixture, Pairing};

    fn params(timeout_ms: u64) -> AuthorizationParams {
        AuthorizationParams {
            host: "192.168.1.30".to_string(),
            port: 16021,
            pairing_timeout_ms: timeout_ms,
            pairing_interval_ms: 10,
        }
    }

    #[test]
    fn test_token_granted() {
        let fixture = FakeFixture::new();
        let granted = add_authorization(&mut fixture.transport(), &params(0)).unwrap();
        assert_eq!(granted.auth_token, "fresh-token");
    }

    #[test]
    fn test_single_attempt_denied() {
        let fixture = FakeFixture::new();
        fixture.with_model(|m| m.pairing = Pairing::Deny);

        let err = add_authorization(&mut fixture.transport(), &params(0)).unwrap_err();
        assert!(matches!(err, DeviceError::AuthorizationDenied(_)));
        assert_eq!(fixture.with_model(|m| m.pairing_attempts), 1);
    }

    #[test]
    fn test_pairing_window_expires() {
        let fixture = FakeFixture::new();
        fixture.with_model(|m| m.pairing = Pairing::Deny);

        let started = Instant::now();
        let err = add_authorization(&mut fixture.transport(), &params(100)).unwrap_err();
        assert!(matches!(err, DeviceError::AuthorizationDenied(_)));
        assert!(started.elapsed() < Duration::from_secs(2));
        assert!(fixture.with_model(|m| m.pairing_attempts) > 1);
    }

    #[test]
    fn test_unreachable_host() {
        let fixture = FakeFixture::new();
        fixture.with_model(|m| m.unreachable = true);

        let err = add_authorization(&mut fixture.transport(), &params(0)).unwrap_err();
        assert!(matches!(err, DeviceError::Transport(_)));
    }
}
