//! # inertial-providers
//!
//! Device-side providers for the inertial driver:
//! - [`SimulatedDevice`]: an in-memory device answering the command path
//! - [`SyntheticTelemetry`]: decoded records for the streams it has enabled

pub mod simulated;
pub mod telemetry;

pub use simulated::{SimulatedDevice, SimulatedState, ODOMETER_PIN};
pub use telemetry::{SyntheticTelemetry, TICK_HZ};
