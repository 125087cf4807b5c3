//! The device handle driven by the configuration path.
//!
//! Implementations sit on top of the transport and codec. Every call is a
//! blocking round-trip bounded by `timeout`; an implementation returns
//! [`DeviceError::Timeout`] rather than waiting past it.

use std::time::Duration;
use thiserror::Error;

use inertial_core::{DeviceSetting, EventDefinition, FieldId};

use crate::messages::{DeviceInfo, Reply};

/// Transport-level failures.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum DeviceError {
    #[error("device did not answer within {0:?}")]
    Timeout(Duration),

    #[error("device disconnected")]
    Disconnected,

    #[error("transport error: {0}")]
    Io(String),
}

/// Command side of a connected device.
///
/// A `Nack` is a normal reply, not an error: the caller decides what a
/// rejection means for the configuration pass.
pub trait DeviceHandle: Send {
    /// Identity, firmware and streamable fields.
    fn device_info(&mut self, timeout: Duration) -> Result<DeviceInfo, DeviceError>;

    /// Stream `field` at `decimation` of its native rate; `None` stops it.
    fn set_streaming(
        &mut self,
        field: FieldId,
        decimation: Option<u32>,
        timeout: Duration,
    ) -> Result<Reply, DeviceError>;

    fn write_setting(&mut self, setting: &DeviceSetting, timeout: Duration) -> Result<Reply, DeviceError>;

    /// Load an event into the device's slot `instance`.
    fn set_event_config(
        &mut self,
        instance: u8,
        event: &EventDefinition,
        timeout: Duration,
    ) -> Result<Reply, DeviceError>;

    /// Whether event `instance` is armed. `Nack` carries the reason it is not.
    fn event_status(&mut self, instance: u8, timeout: Duration) -> Result<Reply, DeviceError>;
}

impl<D: DeviceHandle + ?Sized> DeviceHandle for Box<D> {
    fn device_info(&mut self, timeout: Duration) -> Result<DeviceInfo, DeviceError> {
        (**self).device_info(timeout)
    }

    fn set_streaming(
        &mut self,
        field: FieldId,
        decimation: Option<u32>,
        timeout: Duration,
    ) -> Result<Reply, DeviceError> {
        (**self).set_streaming(field, decimation, timeout)
    }

    fn write_setting(&mut self, setting: &DeviceSetting, timeout: Duration) -> Result<Reply, DeviceError> {
        (**self).write_setting(setting, timeout)
    }

    fn set_event_config(
        &mut self,
        instance: u8,
        event: &EventDefinition,
        timeout: Duration,
    ) -> Result<Reply, DeviceError> {
        (**self).set_event_config(instance, event, timeout)
    }

    fn event_status(&mut self, instance: u8, timeout: Duration) -> Result<Reply, DeviceError> {
        (**self).event_status(instance, timeout)
    }
}
