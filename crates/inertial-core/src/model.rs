//! Device data model types.
//!
//! These types describe what a connected device can do and how its
//! telemetry is identified:
//! - Subsystems and their fixed configuration order
//! - Field identifiers (descriptor set + field descriptor)
//! - The capability snapshot taken once per connection session
//! - Device-side settings produced by configuration resolution

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// A logical capability group of the device.
///
/// The declaration order is the configuration order: the filter is
/// resolved last because its aiding sources depend on the other
/// subsystems.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Subsystem {
    #[serde(rename = "IMU")]
    Imu,
    #[serde(rename = "GNSS-1")]
    Gnss1,
    #[serde(rename = "GNSS-2")]
    Gnss2,
    #[serde(rename = "RTK")]
    Rtk,
    #[serde(rename = "Filter")]
    Filter,
}

impl Subsystem {
    /// Configuration order.
    pub const ORDER: [Subsystem; 5] = [
        Subsystem::Imu,
        Subsystem::Gnss1,
        Subsystem::Gnss2,
        Subsystem::Rtk,
        Subsystem::Filter,
    ];

    /// Human readable name used in errors and logs.
    pub fn name(&self) -> &'static str {
        match self {
            Subsystem::Imu => "IMU",
            Subsystem::Gnss1 => "GNSS-1",
            Subsystem::Gnss2 => "GNSS-2",
            Subsystem::Rtk => "RTK",
            Subsystem::Filter => "Filter",
        }
    }

    /// Descriptor set carrying this subsystem's data.
    pub fn descriptor_set(&self) -> u8 {
        match self {
            Subsystem::Imu => descriptors::IMU_DATA_SET,
            Subsystem::Gnss1 => descriptors::GNSS1_DATA_SET,
            Subsystem::Gnss2 => descriptors::GNSS2_DATA_SET,
            Subsystem::Rtk => descriptors::RTK_DATA_SET,
            Subsystem::Filter => descriptors::FILTER_DATA_SET,
        }
    }

    /// Look up the subsystem owning a descriptor set.
    pub fn from_descriptor_set(set: u8) -> Option<Self> {
        Self::ORDER
            .into_iter()
            .find(|subsystem| subsystem.descriptor_set() == set)
    }

    /// True for the two GNSS receivers.
    pub fn is_gnss(&self) -> bool {
        matches!(self, Subsystem::Gnss1 | Subsystem::Gnss2)
    }
}

impl fmt::Display for Subsystem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Identifier of a telemetry field the device can stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FieldId {
    /// Descriptor set (selects the subsystem)
    pub descriptor_set: u8,
    /// Field descriptor within the set
    pub field_descriptor: u8,
}

impl FieldId {
    pub const fn new(descriptor_set: u8, field_descriptor: u8) -> Self {
        Self {
            descriptor_set,
            field_descriptor,
        }
    }

    /// The subsystem streaming this field, if the descriptor set is known.
    pub fn subsystem(&self) -> Option<Subsystem> {
        Subsystem::from_descriptor_set(self.descriptor_set)
    }
}

impl fmt::Display for FieldId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:02X}:0x{:02X}", self.descriptor_set, self.field_descriptor)
    }
}

/// Well-known descriptor sets and fields.
pub mod descriptors {
    use super::FieldId;

    pub const IMU_DATA_SET: u8 = 0x80;
    pub const FILTER_DATA_SET: u8 = 0x82;
    pub const GNSS1_DATA_SET: u8 = 0x91;
    pub const GNSS2_DATA_SET: u8 = 0x92;
    pub const RTK_DATA_SET: u8 = 0x93;

    pub const IMU_SCALED_ACCEL: FieldId = FieldId::new(IMU_DATA_SET, 0x04);
    pub const IMU_SCALED_GYRO: FieldId = FieldId::new(IMU_DATA_SET, 0x05);
    pub const IMU_SCALED_MAG: FieldId = FieldId::new(IMU_DATA_SET, 0x06);
    pub const IMU_ORIENTATION_QUATERNION: FieldId = FieldId::new(IMU_DATA_SET, 0x0A);
    pub const IMU_GPS_CORRELATION_TIMESTAMP: FieldId = FieldId::new(IMU_DATA_SET, 0x12);

    pub const GNSS1_LLH_POSITION: FieldId = FieldId::new(GNSS1_DATA_SET, 0x03);
    pub const GNSS1_NED_VELOCITY: FieldId = FieldId::new(GNSS1_DATA_SET, 0x05);
    pub const GNSS1_GPS_TIME: FieldId = FieldId::new(GNSS1_DATA_SET, 0x09);
    pub const GNSS1_FIX_INFO: FieldId = FieldId::new(GNSS1_DATA_SET, 0x0B);

    pub const GNSS2_LLH_POSITION: FieldId = FieldId::new(GNSS2_DATA_SET, 0x03);
    pub const GNSS2_NED_VELOCITY: FieldId = FieldId::new(GNSS2_DATA_SET, 0x05);
    pub const GNSS2_GPS_TIME: FieldId = FieldId::new(GNSS2_DATA_SET, 0x09);
    pub const GNSS2_FIX_INFO: FieldId = FieldId::new(GNSS2_DATA_SET, 0x0B);

    pub const RTK_CORRECTIONS_STATUS: FieldId = FieldId::new(RTK_DATA_SET, 0x31);

    pub const FILTER_POSITION_LLH: FieldId = FieldId::new(FILTER_DATA_SET, 0x01);
    pub const FILTER_VELOCITY_NED: FieldId = FieldId::new(FILTER_DATA_SET, 0x02);
    pub const FILTER_ATTITUDE_QUATERNION: FieldId = FieldId::new(FILTER_DATA_SET, 0x03);
    pub const FILTER_EULER_ANGLES: FieldId = FieldId::new(FILTER_DATA_SET, 0x05);
    pub const FILTER_COMPENSATED_ANGULAR_RATE: FieldId = FieldId::new(FILTER_DATA_SET, 0x0E);
    pub const FILTER_STATUS: FieldId = FieldId::new(FILTER_DATA_SET, 0x10);
    pub const FILTER_COMPENSATED_ACCEL: FieldId = FieldId::new(FILTER_DATA_SET, 0x1C);
    pub const FILTER_REL_POS_NED: FieldId = FieldId::new(FILTER_DATA_SET, 0x42);
    pub const FILTER_AIDING_MEASUREMENT_SUMMARY: FieldId = FieldId::new(FILTER_DATA_SET, 0x46);
    pub const FILTER_GNSS_DUAL_ANTENNA_STATUS: FieldId = FieldId::new(FILTER_DATA_SET, 0x49);
}

/// Message shape an output channel publishes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageShape {
    Imu,
    MagneticField,
    TimeReference,
    GpsCorrelationTimestamp,
    NavSatFix,
    Odometry,
    GnssFixInfo,
    RtkStatus,
    FilterStatus,
    FilterHeading,
    FilteredImu,
    RelativePosition,
    AidingMeasurementSummary,
    DualAntennaStatus,
}

// ============================================================================
// Capabilities
// ============================================================================

/// Fields one subsystem can stream, with their native base rates.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SubsystemCapability {
    /// Field descriptor -> native base rate in Hz
    pub fields: BTreeMap<u8, u32>,
}

/// Features reported by the device firmware.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FirmwareFeatures {
    /// Number of user GPIO pins (numbered from 1)
    pub gpio_pins: u8,
    /// Maximum number of event triggers
    pub max_event_triggers: u8,
    /// Maximum number of event actions
    pub max_event_actions: u8,
    /// Whether a threshold trigger may drive a GPIO one-shot action
    pub threshold_gpio_oneshot: bool,
}

impl Default for FirmwareFeatures {
    fn default() -> Self {
        Self {
            gpio_pins: 4,
            max_event_triggers: 6,
            max_event_actions: 6,
            threshold_gpio_oneshot: false,
        }
    }
}

/// Immutable snapshot of what the connected device supports.
///
/// Taken once per connection session and replaced wholesale on reconnect.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DeviceCapabilities {
    pub model_name: String,
    pub firmware_version: String,
    subsystems: BTreeMap<Subsystem, SubsystemCapability>,
    pub features: FirmwareFeatures,
}

impl DeviceCapabilities {
    /// Create an empty snapshot for a device model.
    pub fn new(model_name: &str, firmware_version: &str) -> Self {
        Self {
            model_name: model_name.to_string(),
            firmware_version: firmware_version.to_string(),
            ..Default::default()
        }
    }

    /// Add a subsystem whose fields all stream at `base_rate` Hz.
    pub fn with_subsystem(mut self, subsystem: Subsystem, base_rate: u32, fields: &[FieldId]) -> Self {
        let entry = self.subsystems.entry(subsystem).or_default();
        for field in fields {
            if field.descriptor_set == subsystem.descriptor_set() {
                entry.fields.insert(field.field_descriptor, base_rate);
            }
        }
        self
    }

    pub fn with_features(mut self, features: FirmwareFeatures) -> Self {
        self.features = features;
        self
    }

    /// Insert or replace a subsystem capability.
    pub fn insert(&mut self, subsystem: Subsystem, capability: SubsystemCapability) {
        self.subsystems.insert(subsystem, capability);
    }

    pub fn supports(&self, subsystem: Subsystem) -> bool {
        self.subsystems.contains_key(&subsystem)
    }

    /// Both GNSS receivers are present.
    pub fn supports_dual_gnss(&self) -> bool {
        self.supports(Subsystem::Gnss1) && self.supports(Subsystem::Gnss2)
    }

    pub fn supports_field(&self, field: FieldId) -> bool {
        self.native_rate(field).is_some()
    }

    /// Native base rate of a field in Hz.
    pub fn native_rate(&self, field: FieldId) -> Option<u32> {
        let subsystem = field.subsystem()?;
        self.subsystems
            .get(&subsystem)?
            .fields
            .get(&field.field_descriptor)
            .copied()
    }

    /// Supported subsystems in configuration order.
    pub fn subsystems(&self) -> impl Iterator<Item = Subsystem> + '_ {
        self.subsystems.keys().copied()
    }

    /// Supported fields of a subsystem.
    pub fn fields(&self, subsystem: Subsystem) -> Vec<FieldId> {
        self.subsystems
            .get(&subsystem)
            .map(|capability| {
                capability
                    .fields
                    .keys()
                    .map(|&descriptor| FieldId::new(subsystem.descriptor_set(), descriptor))
                    .collect()
            })
            .unwrap_or_default()
    }
}

// ============================================================================
// Device settings
// ============================================================================

/// Filter aiding measurement sources.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AidingSource {
    GnssPosVel,
    GnssHeading,
    Altimeter,
    Odometer,
    Magnetometer,
    ExternalHeading,
}

/// A non-streaming setting written to the device during configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "setting", rename_all = "snake_case")]
pub enum DeviceSetting {
    /// Hardware odometer input on the GPIO pins.
    HardwareOdometer { enabled: bool },
    /// Antenna lever arm of a GNSS receiver, in the sensor frame (m).
    GnssAntennaOffset { receiver: Subsystem, offset: [f64; 3] },
    /// RTK dongle streaming.
    RtkDongle { enabled: bool },
    /// Sensor to vehicle frame rotation as roll/pitch/yaw (rad).
    SensorToVehicleRotation { euler: [f64; 3] },
    /// Filter vehicle dynamics mode.
    DynamicsMode { mode: u8 },
    /// Enable or disable one filter aiding measurement.
    AidingMeasurement { source: AidingSource, enabled: bool },
    /// Online GNSS antenna offset calibration.
    AntennaCalibration { enabled: bool },
    WheeledVehicleConstraint { enabled: bool },
    VerticalGyroConstraint { enabled: bool },
}

impl DeviceSetting {
    /// Short name used in errors and logs.
    pub fn name(&self) -> &'static str {
        match self {
            DeviceSetting::HardwareOdometer { .. } => "hardware_odometer",
            DeviceSetting::GnssAntennaOffset { .. } => "gnss_antenna_offset",
            DeviceSetting::RtkDongle { .. } => "rtk_dongle",
            DeviceSetting::SensorToVehicleRotation { .. } => "sensor_to_vehicle_rotation",
            DeviceSetting::DynamicsMode { .. } => "dynamics_mode",
            DeviceSetting::AidingMeasurement { .. } => "aiding_measurement",
            DeviceSetting::AntennaCalibration { .. } => "antenna_calibration",
            DeviceSetting::WheeledVehicleConstraint { .. } => "wheeled_vehicle_constraint",
            DeviceSetting::VerticalGyroConstraint { .. } => "vertical_gyro_constraint",
        }
    }
}
