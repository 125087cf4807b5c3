//! Driver-level error type.

use thiserror::Error;

use inertial_core::{ConfigError, SettingsError};

use crate::coordinator::ApplyError;
use crate::probe::ProbeError;

/// Any failure surfaced by the driver session.
#[derive(Debug, Error)]
pub enum DriverError {
    #[error(transparent)]
    Probe(#[from] ProbeError),

    #[error(transparent)]
    Settings(#[from] SettingsError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Apply(#[from] ApplyError),

    #[error("driver has not been configured yet")]
    NotConfigured,
}

impl DriverError {
    /// Whether the device may have been partially reconfigured.
    pub fn touched_device(&self) -> bool {
        matches!(self, DriverError::Apply(_))
    }
}
