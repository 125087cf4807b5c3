//! Synthetic telemetry.
//!
//! Produces decoded records for whatever the simulated device is currently
//! streaming, at each field's native rate divided by its decimation.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use serde_json::{json, Value};
use tokio::sync::mpsc;
use tracing::{debug, info};

use inertial_core::{FieldId, Subsystem};
use inertial_protocol::{DeviceInfo, GpsTime, TelemetryRecord};

use crate::simulated::{SimulatedDevice, SimulatedState};

/// Base tick of the generator, in Hz.
pub const TICK_HZ: u32 = 100;

/// GPS week reported by the synthetic clock.
const START_WEEK: u32 = 2300;

/// Generates records for the streams active on a [`SimulatedDevice`].
pub struct SyntheticTelemetry {
    info: DeviceInfo,
    state: Arc<Mutex<SimulatedState>>,
    tick: u64,
}

impl SyntheticTelemetry {
    pub fn new(device: &SimulatedDevice) -> Self {
        Self {
            info: device.info().clone(),
            state: device.state(),
            tick: 0,
        }
    }

    /// Ticks between two records of `field` streamed at `decimation`.
    fn period(&self, field: FieldId, decimation: u32) -> u64 {
        let native = self
            .info
            .descriptor_sets
            .iter()
            .find(|s| s.descriptor_set == field.descriptor_set)
            .and_then(|s| s.fields.get(&field.field_descriptor).copied())
            .unwrap_or(1)
            .max(1);
        let hz = native as f64 / decimation.max(1) as f64;
        ((TICK_HZ as f64 / hz).round() as u64).max(1)
    }

    /// Records due at the current tick, then advance.
    pub fn step(&mut self) -> Vec<TelemetryRecord> {
        let streaming: Vec<(FieldId, u32)> = {
            let state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
            state.streaming.iter().map(|(f, d)| (*f, *d)).collect()
        };

        let tick = self.tick;
        let seconds = tick as f64 / TICK_HZ as f64;
        let time = GpsTime::new(START_WEEK, seconds);

        let records = streaming
            .into_iter()
            .filter(|(field, decimation)| tick % self.period(*field, *decimation) == 0)
            .map(|(field, _)| TelemetryRecord::new(field, sample(field, seconds, time)).with_device_time(time))
            .collect();

        self.tick += 1;
        records
    }

    /// Push records into `tx` in real time until the receiver goes away.
    pub async fn run(mut self, tx: mpsc::Sender<TelemetryRecord>) {
        info!(model = %self.info.model_name, "Synthetic telemetry started");
        let mut interval = tokio::time::interval(Duration::from_secs(1) / TICK_HZ);

        loop {
            interval.tick().await;
            for record in self.step() {
                if tx.send(record).await.is_err() {
                    debug!("Telemetry receiver dropped");
                    return;
                }
            }
        }
    }
}

/// Plausible values for one field at time `t` seconds.
fn sample(field: FieldId, t: f64, time: GpsTime) -> Value {
    let wobble = (t * 0.5).sin();

    match field.subsystem() {
        Some(Subsystem::Imu) => match field.field_descriptor {
            0x04 => json!({ "x": 0.01 * wobble, "y": -0.02, "z": -9.81 }),
            0x05 => json!({ "x": 0.001, "y": 0.002 * wobble, "z": 0.01 }),
            0x06 => json!({ "x": 0.21, "y": 0.02, "z": 0.43 + 0.01 * wobble }),
            _ => json!({ "week_number": time.week, "tow": time.tow }),
        },
        Some(Subsystem::Gnss1) | Some(Subsystem::Gnss2) => match field.field_descriptor {
            0x03 => json!({
                "latitude": 47.4235 + 1e-6 * t,
                "longitude": 9.3767,
                "height": 670.0 + wobble,
                "horizontal_accuracy": 0.8,
                "vertical_accuracy": 1.4,
            }),
            0x05 => json!({ "north": 0.5, "east": 0.1 * wobble, "down": 0.0 }),
            0x09 => json!({ "week_number": time.week, "tow": time.tow }),
            _ => json!({ "fix_type": 3, "num_sv": 14 }),
        },
        Some(Subsystem::Rtk) => json!({ "corrections_received": true, "age": 1.0 }),
        Some(Subsystem::Filter) => match field.field_descriptor {
            0x01 => json!({ "latitude": 47.4235 + 1e-6 * t, "longitude": 9.3767, "height": 670.0 }),
            0x05 => json!({ "roll": 0.01, "pitch": -0.02, "yaw": wobble }),
            0x0E => json!({ "x": 0.0, "y": 0.0, "z": 0.01 * wobble }),
            0x10 => json!({ "filter_state": 4, "dynamics_mode": 1, "status_flags": 0 }),
            0x42 => json!({ "north": 1e-1 * t, "east": 0.0, "down": 0.0 }),
            _ => json!({ "valid": true }),
        },
        None => Value::Null,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use inertial_core::descriptors::*;
    use inertial_protocol::DeviceHandle;

    #[test]
    fn test_records_follow_decimation() {
        let mut device = SimulatedDevice::gq7();
        let timeout = Duration::from_millis(10);
        // IMU native 1000 Hz at decimation 20 -> 50 Hz -> every 2 ticks
        device.set_streaming(IMU_SCALED_ACCEL, Some(20), timeout).unwrap();
        // GNSS native 10 Hz at decimation 1 -> every 10 ticks
        device.set_streaming(GNSS1_LLH_POSITION, Some(1), timeout).unwrap();

        let mut telemetry = SyntheticTelemetry::new(&device);
        let records: Vec<_> = (0..100).flat_map(|_| telemetry.step()).collect();

        let imu = records.iter().filter(|r| r.field == IMU_SCALED_ACCEL).count();
        let gnss = records.iter().filter(|r| r.field == GNSS1_LLH_POSITION).count();
        assert_eq!(imu, 50);
        assert_eq!(gnss, 10);
        assert!(records.iter().all(|r| r.device_time.is_some()));
    }

    #[test]
    fn test_stopped_stream_produces_nothing() {
        let mut device = SimulatedDevice::gq7();
        let timeout = Duration::from_millis(10);
        device.set_streaming(FILTER_STATUS, Some(1), timeout).unwrap();
        device.set_streaming(FILTER_STATUS, None, timeout).unwrap();

        let mut telemetry = SyntheticTelemetry::new(&device);
        assert!((0..10).all(|_| telemetry.step().is_empty()));
    }
}
