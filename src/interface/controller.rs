use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::DeviceError;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Color {
    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }
}

/// Streaming capability set shared by every fixture family.
///
/// A device is driven through `switch_on` -> `open` -> `write`* -> `switch_off`
/// -> `close`. The snapshot taken by `switch_on` has to happen before `open`
/// moves the fixture into streaming mode. `write` is only accepted between a
/// successful `open` and `close`.
pub trait LedDevice: Send {
    /// Human readable family name, e.g. "nanoleaf".
    fn device_type(&self) -> &'static str;

    /// Number of colors `write` expects. Zero until the device is open.
    fn led_count(&self) -> usize;

    /// Whether `open` completed and the device accepts frames.
    fn is_ready(&self) -> bool;

    fn open(&mut self) -> Result<(), DeviceError>;

    /// Update the fixture with one color per LED in the device's physical order.
    fn write(&mut self, colors: &[Color]) -> Result<(), DeviceError>;

    fn power_on(&mut self) -> Result<(), DeviceError>;
    fn power_off(&mut self) -> Result<(), DeviceError>;

    fn store_state(&mut self) -> Result<(), DeviceError>;
    fn restore_state(&mut self) -> Result<(), DeviceError>;

    /// Whether a snapshot taken by `store_state` is waiting to be restored.
    fn has_stored_state(&self) -> bool {
        false
    }

    /// Snapshot the fixture and power it on for streaming.
    fn switch_on(&mut self) -> Result<(), DeviceError> {
        self.store_state()?;
        self.power_on()
    }

    /// Return the fixture to its pre-streaming condition.
    fn switch_off(&mut self) -> Result<(), DeviceError> {
        if self.has_stored_state() {
            self.restore_state()
        } else {
            self.power_off()
        }
    }

    fn close(&mut self) -> Result<(), DeviceError> {
        Ok(())
    }
}

/// Extra operations for families that can be found and paired over the network.
///
/// All of them take the JSON parameter objects used by configuration front ends.
pub trait DiscoverableDevice {
    fn discover(&self, params: &Value) -> Value;
    fn get_properties(&self, params: &Value) -> Result<Value, DeviceError>;
    fn identify(&self, params: &Value) -> Result<(), DeviceError>;
    fn add_authorization(&self, params: &Value) -> Result<Value, DeviceError>;
}

pub struct DeviceMetadata {
    pub name: &'static str,
    pub description: &'static str,
    pub construct: fn(&Value) -> Result<Box<dyn LedDevice>, DeviceError>,
}

inventory::collect!(DeviceMetadata);
