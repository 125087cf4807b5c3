//! # inertial-protocol
//!
//! Boundary between the driver and the transport/codec layer.
//!
//! This crate defines the device handle the configuration path drives, the
//! messages exchanged with the device, and the JSON codec used for emitted
//! channel messages and recorded telemetry.

pub mod codec;
pub mod device;
pub mod messages;

pub use device::{DeviceError, DeviceHandle};
pub use messages::*;
