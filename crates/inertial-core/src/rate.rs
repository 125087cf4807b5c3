//! Output rate resolution.
//!
//! The device streams every field at an integer decimation of the field's
//! native base rate. A requested rate is turned into the nearest integer
//! decimation; the rate actually achieved is reported alongside so callers
//! can tell the user the truth.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Raw settings value meaning "stream at the device default rate".
pub const DEFAULT_DATA_RATE: f64 = -1.0;

/// Largest decimation the protocol can carry.
pub const MAX_DECIMATION: u32 = u16::MAX as u32;

/// A requested output rate.
///
/// Deserializes from a plain number; `-1` selects the device default.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(from = "f64", into = "f64")]
pub enum RateRequest {
    /// Stream at the field's native rate.
    #[default]
    DeviceDefault,
    /// Stream at (approximately) this many Hz.
    Hz(f64),
}

impl From<f64> for RateRequest {
    fn from(value: f64) -> Self {
        if value == DEFAULT_DATA_RATE {
            RateRequest::DeviceDefault
        } else {
            RateRequest::Hz(value)
        }
    }
}

impl From<RateRequest> for f64 {
    fn from(request: RateRequest) -> Self {
        match request {
            RateRequest::DeviceDefault => DEFAULT_DATA_RATE,
            RateRequest::Hz(hz) => hz,
        }
    }
}

impl fmt::Display for RateRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RateRequest::DeviceDefault => f.write_str("default"),
            RateRequest::Hz(hz) => write!(f, "{hz} Hz"),
        }
    }
}

/// Decimation to send to the device and the rate it produces.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ResolvedRate {
    /// Integer divisor of the native rate (>= 1)
    pub decimation: u32,
    /// Rate actually delivered: native / decimation
    pub achieved_hz: f64,
}

impl ResolvedRate {
    /// The native rate itself.
    pub fn native(native: u32) -> Self {
        Self {
            decimation: 1,
            achieved_hz: native as f64,
        }
    }

    /// Client-side decimation needed when the device already delivers the
    /// field at `device_decimation`.
    pub fn relative_to(&self, device_decimation: u32) -> u32 {
        if device_decimation == 0 {
            return self.decimation.max(1);
        }
        let ratio = self.decimation as f64 / device_decimation as f64;
        (ratio.round() as u32).max(1)
    }
}

/// Errors produced while resolving a rate.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RateError {
    #[error("requested rate {requested} Hz exceeds native rate {native} Hz")]
    ExceedsNative { requested: f64, native: u32 },

    #[error("requested rate {requested} Hz must be positive")]
    NonPositive { requested: f64 },

    #[error("requested rate {requested} is not a finite number")]
    NotFinite { requested: f64 },

    #[error("requested rate {requested} Hz needs decimation {decimation} of native rate {native} Hz, above the protocol maximum")]
    DecimationOutOfRange {
        requested: f64,
        native: u32,
        decimation: f64,
    },
}

/// Resolves requested rates against native rates.
pub struct RateResolver;

impl RateResolver {
    /// Resolve `requested` against a field streaming natively at `native` Hz.
    pub fn resolve(requested: RateRequest, native: u32) -> Result<ResolvedRate, RateError> {
        let hz = match requested {
            RateRequest::DeviceDefault => return Ok(ResolvedRate::native(native)),
            RateRequest::Hz(hz) => hz,
        };

        if !hz.is_finite() {
            return Err(RateError::NotFinite { requested: hz });
        }
        if hz <= 0.0 {
            return Err(RateError::NonPositive { requested: hz });
        }
        if hz > native as f64 {
            return Err(RateError::ExceedsNative {
                requested: hz,
                native,
            });
        }

        let decimation = (native as f64 / hz).round();
        if decimation > MAX_DECIMATION as f64 {
            return Err(RateError::DecimationOutOfRange {
                requested: hz,
                native,
                decimation,
            });
        }

        let decimation = (decimation as u32).max(1);
        Ok(ResolvedRate {
            decimation,
            achieved_hz: native as f64 / decimation as f64,
        })
    }
}
