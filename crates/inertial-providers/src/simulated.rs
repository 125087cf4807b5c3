//! Simulated device.
//!
//! Answers the command path from an in-memory model and records every
//! command it receives. Failure modes (silence, rejected fields or settings,
//! claimed GPIO pins) are switched on with builder methods so the driver's
//! error paths can be exercised without hardware.

use std::collections::{BTreeMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tracing::debug;

use inertial_core::descriptors::*;
use inertial_core::events::{Action, Trigger};
use inertial_core::{DeviceSetting, EventDefinition, FieldId, FirmwareFeatures};
use inertial_protocol::{
    DescriptorSetInfo, DeviceCommand, DeviceError, DeviceHandle, DeviceInfo, Reply,
};

/// GPIO pin taken over by the hardware odometer input.
pub const ODOMETER_PIN: u8 = 3;

/// Mutable device state, shared with the telemetry source.
#[derive(Debug, Default)]
pub struct SimulatedState {
    /// Field -> decimation for fields currently streaming
    pub streaming: BTreeMap<FieldId, u32>,
    pub settings: Vec<DeviceSetting>,
    pub events: BTreeMap<u8, EventDefinition>,
    pub log: Vec<DeviceCommand>,
    pub odometer_enabled: bool,
}

#[derive(Debug, Default, Clone)]
struct Behavior {
    unresponsive: bool,
    disconnected: bool,
    nack_fields: HashSet<FieldId>,
    nack_settings: HashSet<String>,
    claimed_pins: HashSet<u8>,
    unarmed_events: HashSet<u8>,
}

/// An in-memory device.
#[derive(Debug, Clone)]
pub struct SimulatedDevice {
    info: DeviceInfo,
    state: Arc<Mutex<SimulatedState>>,
    behavior: Behavior,
}

impl SimulatedDevice {
    pub fn new(info: DeviceInfo) -> Self {
        Self {
            info,
            state: Arc::new(Mutex::new(SimulatedState::default())),
            behavior: Behavior::default(),
        }
    }

    /// A GQ7 with every subsystem.
    pub fn gq7() -> Self {
        Self::new(DeviceInfo {
            model_name: "3DM-GQ7".to_string(),
            firmware_version: "1.1.07".to_string(),
            serial_number: "6284.100001".to_string(),
            descriptor_sets: vec![
                imu_set(),
                gnss_set(GNSS1_DATA_SET),
                gnss_set(GNSS2_DATA_SET),
                DescriptorSetInfo::uniform(RTK_DATA_SET, 1, &[RTK_CORRECTIONS_STATUS.field_descriptor]),
                filter_set(),
            ],
            features: FirmwareFeatures {
                threshold_gpio_oneshot: false,
                ..Default::default()
            },
        })
    }

    /// A GQ7 build with one GNSS receiver and no RTK dongle.
    pub fn gq7_single_gnss() -> Self {
        Self::new(DeviceInfo {
            model_name: "3DM-GQ7".to_string(),
            firmware_version: "1.1.07".to_string(),
            serial_number: "6284.100002".to_string(),
            descriptor_sets: vec![imu_set(), gnss_set(GNSS1_DATA_SET), filter_set()],
            features: FirmwareFeatures::default(),
        })
    }

    /// An AHRS without GNSS.
    pub fn gx5_25() -> Self {
        Self::new(DeviceInfo {
            model_name: "3DM-GX5-25".to_string(),
            firmware_version: "1.2.0".to_string(),
            serial_number: "6251.200001".to_string(),
            descriptor_sets: vec![
                DescriptorSetInfo::uniform(
                    IMU_DATA_SET,
                    1000,
                    &[
                        IMU_SCALED_ACCEL.field_descriptor,
                        IMU_SCALED_GYRO.field_descriptor,
                        IMU_SCALED_MAG.field_descriptor,
                    ],
                ),
                filter_set(),
            ],
            features: FirmwareFeatures::default(),
        })
    }

    pub fn with_features(mut self, features: FirmwareFeatures) -> Self {
        self.info.features = features;
        self
    }

    /// Never answer; every call times out.
    pub fn unresponsive(mut self) -> Self {
        self.behavior.unresponsive = true;
        self
    }

    pub fn disconnected(mut self) -> Self {
        self.behavior.disconnected = true;
        self
    }

    /// Nack streaming commands for `field`.
    pub fn with_nack_field(mut self, field: FieldId) -> Self {
        self.behavior.nack_fields.insert(field);
        self
    }

    /// Start or stop nacking streaming commands for `field` on a device
    /// already in use.
    pub fn set_nack_field(&mut self, field: FieldId, nack: bool) {
        if nack {
            self.behavior.nack_fields.insert(field);
        } else {
            self.behavior.nack_fields.remove(&field);
        }
    }

    /// Slots holding an event definition.
    pub fn armed_events(&self) -> Vec<u8> {
        self.lock().events.keys().copied().collect()
    }

    /// Nack writes of the setting named `name`.
    pub fn with_nack_setting(mut self, name: &str) -> Self {
        self.behavior.nack_settings.insert(name.to_string());
        self
    }

    /// Mark a GPIO pin as used by another feature.
    pub fn with_claimed_pin(mut self, pin: u8) -> Self {
        self.behavior.claimed_pins.insert(pin);
        self
    }

    /// Accept event `instance` but never arm it.
    pub fn with_unarmed_event(mut self, instance: u8) -> Self {
        self.behavior.unarmed_events.insert(instance);
        self
    }

    pub fn info(&self) -> &DeviceInfo {
        &self.info
    }

    /// Shared state, also read by the telemetry source.
    pub fn state(&self) -> Arc<Mutex<SimulatedState>> {
        self.state.clone()
    }

    /// Every command received so far.
    pub fn commands(&self) -> Vec<DeviceCommand> {
        self.lock().log.clone()
    }

    /// Streaming commands received so far, in order.
    pub fn streaming_commands(&self) -> Vec<(FieldId, Option<u32>)> {
        self.lock()
            .log
            .iter()
            .filter_map(|cmd| match cmd {
                DeviceCommand::SetStreaming { field, decimation } => Some((*field, *decimation)),
                _ => None,
            })
            .collect()
    }

    /// Current decimation of a streaming field.
    pub fn decimation(&self, field: FieldId) -> Option<u32> {
        self.lock().streaming.get(&field).copied()
    }

    pub fn clear_log(&self) {
        self.lock().log.clear();
    }

    fn lock(&self) -> MutexGuard<'_, SimulatedState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn check_link(&self, timeout: Duration) -> Result<(), DeviceError> {
        if self.behavior.disconnected {
            return Err(DeviceError::Disconnected);
        }
        if self.behavior.unresponsive {
            return Err(DeviceError::Timeout(timeout));
        }
        Ok(())
    }

    fn supports(&self, field: FieldId) -> bool {
        self.info.descriptor_sets.iter().any(|set| {
            set.descriptor_set == field.descriptor_set && set.fields.contains_key(&field.field_descriptor)
        })
    }

    fn event_pins(event: &EventDefinition) -> Vec<u8> {
        let mut pins = Vec::new();
        if let Trigger::Gpio { pin, .. } = &event.trigger {
            pins.push(*pin);
        }
        for action in &event.actions {
            if let Action::Gpio { pin, .. } = action {
                pins.push(*pin);
            }
        }
        pins
    }
}

impl DeviceHandle for SimulatedDevice {
    fn device_info(&mut self, timeout: Duration) -> Result<DeviceInfo, DeviceError> {
        self.check_link(timeout)?;
        Ok(self.info.clone())
    }

    fn set_streaming(
        &mut self,
        field: FieldId,
        decimation: Option<u32>,
        timeout: Duration,
    ) -> Result<Reply, DeviceError> {
        self.check_link(timeout)?;
        let mut state = self.lock();
        state.log.push(DeviceCommand::SetStreaming { field, decimation });

        if self.behavior.nack_fields.contains(&field) || !self.supports(field) {
            return Ok(Reply::Nack(format!("field {field} not accepted")));
        }
        match decimation {
            Some(0) => return Ok(Reply::Nack("decimation must be at least 1".to_string())),
            Some(d) if d > u16::MAX as u32 => {
                return Ok(Reply::Nack(format!("decimation {d} out of range")))
            }
            Some(d) => {
                state.streaming.insert(field, d);
            }
            None => {
                state.streaming.remove(&field);
            }
        }
        debug!(%field, ?decimation, "Simulated device streaming updated");
        Ok(Reply::Ack)
    }

    fn write_setting(&mut self, setting: &DeviceSetting, timeout: Duration) -> Result<Reply, DeviceError> {
        self.check_link(timeout)?;
        let mut state = self.lock();
        state.log.push(DeviceCommand::WriteSetting {
            setting: setting.clone(),
        });

        if self.behavior.nack_settings.contains(setting.name()) {
            return Ok(Reply::Nack(format!("{} not accepted", setting.name())));
        }
        if let DeviceSetting::HardwareOdometer { enabled } = setting {
            state.odometer_enabled = *enabled;
        }
        state.settings.retain(|s| !same_slot(s, setting));
        state.settings.push(setting.clone());
        Ok(Reply::Ack)
    }

    fn set_event_config(
        &mut self,
        instance: u8,
        event: &EventDefinition,
        timeout: Duration,
    ) -> Result<Reply, DeviceError> {
        self.check_link(timeout)?;
        let mut state = self.lock();
        state.log.push(DeviceCommand::SetEventConfig {
            instance,
            event: event.clone(),
        });

        if instance == 0 || instance > self.info.features.max_event_triggers {
            return Ok(Reply::Nack(format!(
                "trigger {instance} exceeds device maximum of {}",
                self.info.features.max_event_triggers
            )));
        }
        if event.is_disabled() {
            state.events.remove(&instance);
            return Ok(Reply::Ack);
        }
        for pin in Self::event_pins(event) {
            if self.behavior.claimed_pins.contains(&pin) {
                return Ok(Reply::Nack(format!("GPIO pin {pin} is already claimed")));
            }
            if state.odometer_enabled && pin == ODOMETER_PIN {
                return Ok(Reply::Nack(format!("GPIO pin {pin} is claimed by the odometer")));
            }
        }
        state.events.insert(instance, event.clone());
        Ok(Reply::Ack)
    }

    fn event_status(&mut self, instance: u8, timeout: Duration) -> Result<Reply, DeviceError> {
        self.check_link(timeout)?;
        let state = self.lock();
        if !state.events.contains_key(&instance) {
            return Ok(Reply::Nack(format!("event {instance} is not configured")));
        }
        if self.behavior.unarmed_events.contains(&instance) {
            return Ok(Reply::Nack(format!("event {instance} did not arm")));
        }
        Ok(Reply::Ack)
    }
}

/// Whether two settings address the same device register.
fn same_slot(a: &DeviceSetting, b: &DeviceSetting) -> bool {
    match (a, b) {
        (
            DeviceSetting::AidingMeasurement { source: x, .. },
            DeviceSetting::AidingMeasurement { source: y, .. },
        ) => x == y,
        (
            DeviceSetting::GnssAntennaOffset { receiver: x, .. },
            DeviceSetting::GnssAntennaOffset { receiver: y, .. },
        ) => x == y,
        _ => std::mem::discriminant(a) == std::mem::discriminant(b),
    }
}

fn imu_set() -> DescriptorSetInfo {
    DescriptorSetInfo::uniform(
        IMU_DATA_SET,
        1000,
        &[
            IMU_SCALED_ACCEL.field_descriptor,
            IMU_SCALED_GYRO.field_descriptor,
            IMU_SCALED_MAG.field_descriptor,
            IMU_GPS_CORRELATION_TIMESTAMP.field_descriptor,
        ],
    )
}

fn gnss_set(descriptor_set: u8) -> DescriptorSetInfo {
    DescriptorSetInfo::uniform(
        descriptor_set,
        10,
        &[
            GNSS1_LLH_POSITION.field_descriptor,
            GNSS1_NED_VELOCITY.field_descriptor,
            GNSS1_GPS_TIME.field_descriptor,
            GNSS1_FIX_INFO.field_descriptor,
        ],
    )
}

fn filter_set() -> DescriptorSetInfo {
    DescriptorSetInfo::uniform(
        FILTER_DATA_SET,
        100,
        &[
            FILTER_POSITION_LLH.field_descriptor,
            FILTER_VELOCITY_NED.field_descriptor,
            FILTER_EULER_ANGLES.field_descriptor,
            FILTER_COMPENSATED_ANGULAR_RATE.field_descriptor,
            FILTER_STATUS.field_descriptor,
            FILTER_REL_POS_NED.field_descriptor,
            FILTER_AIDING_MEASUREMENT_SUMMARY.field_descriptor,
            FILTER_GNSS_DUAL_ANTENNA_STATUS.field_descriptor,
        ],
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    const TIMEOUT: Duration = Duration::from_millis(100);

    #[test]
    fn test_streaming_state_and_log() {
        let mut device = SimulatedDevice::gq7();
        assert_eq!(device.set_streaming(IMU_SCALED_ACCEL, Some(2), TIMEOUT).unwrap(), Reply::Ack);
        assert_eq!(device.decimation(IMU_SCALED_ACCEL), Some(2));

        device.set_streaming(IMU_SCALED_ACCEL, None, TIMEOUT).unwrap();
        assert_eq!(device.decimation(IMU_SCALED_ACCEL), None);
        assert_eq!(device.streaming_commands().len(), 2);
    }

    #[test]
    fn test_disabled_event_frees_slot() {
        use inertial_core::events::{GpioActionMode, GpioTriggerMode};

        let mut device = SimulatedDevice::gq7();
        let event = EventDefinition {
            trigger: Trigger::Gpio {
                pin: 1,
                mode: GpioTriggerMode::Edge,
            },
            actions: vec![Action::Gpio {
                pin: 2,
                mode: GpioActionMode::Toggle,
            }],
        };
        device.set_event_config(2, &event, TIMEOUT).unwrap();
        assert_eq!(device.armed_events(), vec![2]);

        let reply = device.set_event_config(2, &EventDefinition::disabled(), TIMEOUT).unwrap();
        assert!(reply.is_ack());
        assert!(device.armed_events().is_empty());
    }

    #[test]
    fn test_nack_toggled_at_runtime() {
        let mut device = SimulatedDevice::gq7();
        device.set_nack_field(FILTER_STATUS, true);
        assert!(!device.set_streaming(FILTER_STATUS, Some(1), TIMEOUT).unwrap().is_ack());
        device.set_nack_field(FILTER_STATUS, false);
        assert!(device.set_streaming(FILTER_STATUS, Some(1), TIMEOUT).unwrap().is_ack());
    }

    #[test]
    fn test_unresponsive() {
        let mut device = SimulatedDevice::gq7().unresponsive();
        assert_eq!(
            device.device_info(TIMEOUT).unwrap_err(),
            DeviceError::Timeout(TIMEOUT)
        );
    }

    #[test]
    fn test_unsupported_field_is_nacked() {
        let mut device = SimulatedDevice::gx5_25();
        let reply = device.set_streaming(GNSS1_LLH_POSITION, Some(1), TIMEOUT).unwrap();
        assert!(!reply.is_ack());
    }

    #[test]
    fn test_odometer_claims_pin() {
        use inertial_core::events::{GpioActionMode, GpioTriggerMode};

        let mut device = SimulatedDevice::gq7();
        device
            .write_setting(&DeviceSetting::HardwareOdometer { enabled: true }, TIMEOUT)
            .unwrap();

        let event = EventDefinition {
            trigger: Trigger::Gpio {
                pin: 1,
                mode: GpioTriggerMode::Edge,
            },
            actions: vec![Action::Gpio {
                pin: ODOMETER_PIN,
                mode: GpioActionMode::Toggle,
            }],
        };
        let reply = device.set_event_config(1, &event, TIMEOUT).unwrap();
        assert!(matches!(reply, Reply::Nack(reason) if reason.contains("odometer")));
        assert!(!device.event_status(1, TIMEOUT).unwrap().is_ack());
    }
}
