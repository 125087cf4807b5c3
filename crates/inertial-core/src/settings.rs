//! User settings for the driver.
//!
//! Settings arrive from the host framework as a JSON document whose keys
//! follow the driver's parameter names. Every key is optional; missing keys
//! take the defaults below.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

use crate::events::EventDefinition;
use crate::model::Subsystem;
use crate::rate::RateRequest;

/// Errors raised while reading raw settings.
#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("invalid settings document: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Named boolean settings that topic rules may depend on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SettingFlag {
    PublishImu,
    PublishGpsCorr,
    PublishGnss1,
    PublishGnss2,
    PublishRtk,
    PublishFilter,
    PublishFilterRelativePos,
    PublishFilterAidingMeasurementSummary,
    PublishGnssDualAntennaStatus,
    UseDeviceTimestamp,
    UseEnuFrame,
}

/// Declarative driver settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DriverSettings {
    // ------------------------------------------------------------------
    // General
    // ------------------------------------------------------------------
    /// Prefix substituted for `{prefix}` in channel name templates.
    pub topic_prefix: String,
    /// Stamp messages with the device time instead of host receive time.
    pub use_device_timestamp: bool,
    /// Publish vectors in ENU instead of the device's native NED.
    pub use_enu_frame: bool,
    /// Bound on every device command round-trip.
    pub command_timeout_ms: u64,
    /// Capacity of each channel's hand-off queue.
    pub channel_queue_depth: usize,
    /// Per-channel rate overrides keyed by rendered channel name.
    pub channel_rates: BTreeMap<String, RateRequest>,
    /// GPS leap seconds used when converting device GPS time.
    pub gps_leap_seconds: f64,

    // ------------------------------------------------------------------
    // IMU
    // ------------------------------------------------------------------
    #[serde(alias = "enable_imu")]
    pub publish_imu: bool,
    pub publish_gps_corr: bool,
    pub imu_data_rate: RateRequest,
    pub imu_frame_id: String,
    /// 3 (diagonal) or 9 (row-major) entries.
    pub imu_linear_cov: Vec<f64>,
    pub imu_angular_cov: Vec<f64>,
    pub imu_orientation_cov: Vec<f64>,
    pub enable_hardware_odometer: bool,

    // ------------------------------------------------------------------
    // GNSS
    // ------------------------------------------------------------------
    #[serde(alias = "enable_gnss1")]
    pub publish_gnss1: bool,
    pub gnss1_data_rate: RateRequest,
    pub gnss1_frame_id: String,
    pub gnss1_antenna_offset: Vec<f64>,

    #[serde(alias = "enable_gnss2")]
    pub publish_gnss2: bool,
    pub gnss2_data_rate: RateRequest,
    pub gnss2_frame_id: String,
    pub gnss2_antenna_offset: Vec<f64>,

    // ------------------------------------------------------------------
    // RTK
    // ------------------------------------------------------------------
    #[serde(alias = "enable_rtk")]
    pub publish_rtk: bool,
    pub rtk_data_rate: RateRequest,

    // ------------------------------------------------------------------
    // Filter
    // ------------------------------------------------------------------
    #[serde(alias = "enable_filter")]
    pub publish_filter: bool,
    pub publish_filter_relative_pos: bool,
    pub publish_filter_aiding_measurement_summary: bool,
    pub publish_gnss_dual_antenna_status: bool,
    pub filter_data_rate: RateRequest,
    pub filter_frame_id: String,
    pub filter_child_frame_id: String,
    pub filter_dynamics_mode: u8,
    /// Roll, pitch, yaw (rad).
    pub filter_sensor2vehicle_frame_transformation_euler: Vec<f64>,
    pub filter_enable_gnss_pos_vel_aiding: bool,
    pub filter_enable_gnss_heading_aiding: bool,
    pub filter_enable_altimeter_aiding: bool,
    pub filter_enable_odometer_aiding: bool,
    pub filter_enable_magnetometer_aiding: bool,
    pub filter_enable_external_heading_aiding: bool,
    pub filter_enable_wheeled_vehicle_constraint: bool,
    pub filter_enable_vertical_gyro_constraint: bool,
    pub filter_enable_gnss_antenna_cal: bool,

    // ------------------------------------------------------------------
    // Events
    // ------------------------------------------------------------------
    pub events: Vec<EventDefinition>,
}

impl Default for DriverSettings {
    fn default() -> Self {
        Self {
            topic_prefix: String::new(),
            use_device_timestamp: false,
            use_enu_frame: false,
            command_timeout_ms: 1000,
            channel_queue_depth: 64,
            channel_rates: BTreeMap::new(),
            gps_leap_seconds: 18.0,

            publish_imu: true,
            publish_gps_corr: false,
            imu_data_rate: RateRequest::DeviceDefault,
            imu_frame_id: "imu_link".to_string(),
            imu_linear_cov: vec![0.01; 3],
            imu_angular_cov: vec![0.01; 3],
            imu_orientation_cov: vec![0.01; 3],
            enable_hardware_odometer: false,

            publish_gnss1: false,
            gnss1_data_rate: RateRequest::DeviceDefault,
            gnss1_frame_id: "gnss1_antenna_link".to_string(),
            gnss1_antenna_offset: vec![0.0; 3],

            publish_gnss2: false,
            gnss2_data_rate: RateRequest::DeviceDefault,
            gnss2_frame_id: "gnss2_antenna_link".to_string(),
            gnss2_antenna_offset: vec![0.0; 3],

            publish_rtk: false,
            rtk_data_rate: RateRequest::DeviceDefault,

            publish_filter: false,
            publish_filter_relative_pos: false,
            publish_filter_aiding_measurement_summary: false,
            publish_gnss_dual_antenna_status: false,
            filter_data_rate: RateRequest::DeviceDefault,
            filter_frame_id: "odom".to_string(),
            filter_child_frame_id: "base_link".to_string(),
            filter_dynamics_mode: 1,
            filter_sensor2vehicle_frame_transformation_euler: vec![0.0; 3],
            filter_enable_gnss_pos_vel_aiding: false,
            filter_enable_gnss_heading_aiding: false,
            filter_enable_altimeter_aiding: false,
            filter_enable_odometer_aiding: false,
            filter_enable_magnetometer_aiding: false,
            filter_enable_external_heading_aiding: false,
            filter_enable_wheeled_vehicle_constraint: false,
            filter_enable_vertical_gyro_constraint: false,
            filter_enable_gnss_antenna_cal: false,

            events: Vec::new(),
        }
    }
}

impl DriverSettings {
    /// Parse the raw settings document handed over by the host.
    pub fn from_value(raw: &serde_json::Value) -> Result<Self, SettingsError> {
        Ok(Self::deserialize(raw)?)
    }

    /// Whether the user asked for this subsystem's data.
    pub fn subsystem_enabled(&self, subsystem: Subsystem) -> bool {
        match subsystem {
            Subsystem::Imu => self.publish_imu,
            Subsystem::Gnss1 => self.publish_gnss1,
            Subsystem::Gnss2 => self.publish_gnss2,
            Subsystem::Rtk => self.publish_rtk,
            Subsystem::Filter => self.publish_filter,
        }
    }

    /// Requested rate shared by all channels of a subsystem.
    pub fn data_rate(&self, subsystem: Subsystem) -> RateRequest {
        match subsystem {
            Subsystem::Imu => self.imu_data_rate,
            Subsystem::Gnss1 => self.gnss1_data_rate,
            Subsystem::Gnss2 => self.gnss2_data_rate,
            Subsystem::Rtk => self.rtk_data_rate,
            Subsystem::Filter => self.filter_data_rate,
        }
    }

    /// Frame id stamped on messages of a subsystem.
    pub fn frame_id(&self, subsystem: Subsystem) -> &str {
        match subsystem {
            Subsystem::Imu => &self.imu_frame_id,
            Subsystem::Gnss1 | Subsystem::Rtk => &self.gnss1_frame_id,
            Subsystem::Gnss2 => &self.gnss2_frame_id,
            Subsystem::Filter => &self.filter_frame_id,
        }
    }

    pub fn flag(&self, flag: SettingFlag) -> bool {
        match flag {
            SettingFlag::PublishImu => self.publish_imu,
            SettingFlag::PublishGpsCorr => self.publish_gps_corr,
            SettingFlag::PublishGnss1 => self.publish_gnss1,
            SettingFlag::PublishGnss2 => self.publish_gnss2,
            SettingFlag::PublishRtk => self.publish_rtk,
            SettingFlag::PublishFilter => self.publish_filter,
            SettingFlag::PublishFilterRelativePos => self.publish_filter_relative_pos,
            SettingFlag::PublishFilterAidingMeasurementSummary => {
                self.publish_filter_aiding_measurement_summary
            }
            SettingFlag::PublishGnssDualAntennaStatus => self.publish_gnss_dual_antenna_status,
            SettingFlag::UseDeviceTimestamp => self.use_device_timestamp,
            SettingFlag::UseEnuFrame => self.use_enu_frame,
        }
    }

    /// Any filter aiding or constraint option is switched on.
    pub fn any_filter_aiding(&self) -> bool {
        self.filter_enable_gnss_pos_vel_aiding
            || self.filter_enable_gnss_heading_aiding
            || self.filter_enable_altimeter_aiding
            || self.filter_enable_odometer_aiding
            || self.filter_enable_magnetometer_aiding
            || self.filter_enable_external_heading_aiding
            || self.filter_enable_wheeled_vehicle_constraint
            || self.filter_enable_vertical_gyro_constraint
            || self.filter_enable_gnss_antenna_cal
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_document_uses_defaults() {
        let settings = DriverSettings::from_value(&serde_json::json!({})).unwrap();
        assert_eq!(settings, DriverSettings::default());
        assert!(settings.publish_imu);
        assert!(!settings.publish_gnss1);
        assert_eq!(settings.imu_data_rate, RateRequest::DeviceDefault);
    }

    #[test]
    fn test_parse_rates_and_aliases() {
        let raw = serde_json::json!({
            "imu_data_rate": -1,
            "gnss1_data_rate": 5,
            "enable_rtk": true,
            "channel_rates": { "imu/data": 50 }
        });
        let settings = DriverSettings::from_value(&raw).unwrap();

        assert_eq!(settings.imu_data_rate, RateRequest::DeviceDefault);
        assert_eq!(settings.gnss1_data_rate, RateRequest::Hz(5.0));
        assert!(settings.publish_rtk);
        assert_eq!(settings.channel_rates["imu/data"], RateRequest::Hz(50.0));
    }

    #[test]
    fn test_invalid_document() {
        let raw = serde_json::json!({ "publish_imu": "yes" });
        assert!(matches!(
            DriverSettings::from_value(&raw),
            Err(SettingsError::Parse(_))
        ));
    }

    #[test]
    fn test_subsystem_accessors() {
        let settings = DriverSettings {
            publish_gnss2: true,
            gnss2_data_rate: RateRequest::Hz(2.0),
            ..Default::default()
        };

        assert!(settings.subsystem_enabled(Subsystem::Gnss2));
        assert!(!settings.subsystem_enabled(Subsystem::Filter));
        assert_eq!(settings.data_rate(Subsystem::Gnss2), RateRequest::Hz(2.0));
        assert_eq!(settings.frame_id(Subsystem::Gnss2), "gnss2_antenna_link");
        assert!(settings.flag(SettingFlag::PublishGnss2));
    }
}
