use serde_json::Value;

use crate::error::DeviceError;
use crate::interface::controller::{DeviceMetadata, LedDevice};

pub fn list_device_drivers() -> Vec<&'static DeviceMetadata> {
    inventory::iter::<DeviceMetadata>.into_iter().collect()
}

pub fn get_device_metadata(name: &str) -> Option<&'static DeviceMetadata> {
    inventory::iter::<DeviceMetadata>
        .into_iter()
        .find(|driver| driver.name.eq_ignore_ascii_case(name))
}

/// Builds a device of family `name` from its JSON configuration.
pub fn create_device(name: &str, config: &Value) -> Result<Box<dyn LedDevice>, DeviceError> {
    let driver = get_device_metadata(name)
        .ok_or_else(|| DeviceError::Config(format!("Unknown device type '{name}'")))?;
    log::debug!(driver = driver.name; "Constructing device");
    (driver.construct)(config)
}
