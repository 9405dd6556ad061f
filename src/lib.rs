//! Client for driving Nanoleaf panel fixtures from an ambient-lighting pipeline.
//!
//! Control-plane operations (pairing, discovery, layout, mode negotiation,
//! state save/restore) use the fixture's REST API; per-frame colors are
//! streamed over UDP. Device families register themselves through
//! [`interface::controller::DeviceMetadata`] and are constructed with
//! [`manager::inventory::create_device`].

pub mod api;
pub mod error;
pub mod interface;
pub mod manager;
pub mod resource;

pub use crate::error::DeviceError;
pub use crate::interface::controller::{Color, DiscoverableDevice, LedDevice};
pub use crate::resource::controller::nanoleaf::NanoleafDevice;
