//! Configuration resolution.
//!
//! Turns user settings plus the device capability snapshot into a
//! [`ResolvedConfig`]: one [`SubsystemConfig`] per supported subsystem in
//! configuration order, and the channel set built from the topic mapping.
//! Resolution is pure. Every validation error is raised here, before any
//! device command is issued.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use thiserror::Error;

use crate::events::EventDefinition;
use crate::model::{AidingSource, DeviceCapabilities, DeviceSetting, FieldId, Subsystem};
use crate::rate::{RateError, RateRequest, RateResolver, ResolvedRate};
use crate::settings::DriverSettings;
use crate::topics::{ChannelDescriptor, TopicError, TopicMapping};

/// Errors produced while resolving a configuration.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("subsystem {0} is enabled but not supported by the device")]
    UnsupportedSubsystem(String),

    #[error("invalid dependency: {0}")]
    InvalidDependency(String),

    #[error("channel '{channel}' cannot stream at {requested}: {source}")]
    RateResolution {
        channel: String,
        requested: RateRequest,
        #[source]
        source: RateError,
    },

    #[error("channel name '{0}' is produced by more than one mapping row")]
    DuplicateChannel(String),

    #[error("invalid setting '{name}': {reason}")]
    InvalidSetting { name: String, reason: String },

    #[error(transparent)]
    InvalidChannelName(#[from] TopicError),
}

impl ConfigError {
    fn invalid_setting(name: &str, reason: impl Into<String>) -> Self {
        ConfigError::InvalidSetting {
            name: name.to_string(),
            reason: reason.into(),
        }
    }
}

// ============================================================================
// Resolved configuration
// ============================================================================

/// Fixed IMU covariances, expanded to row-major 3x3 matrices.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StaticCovariance {
    pub linear_acceleration: [f64; 9],
    pub angular_velocity: [f64; 9],
    pub orientation: [f64; 9],
}

/// Streaming target of one device field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldStream {
    pub field: FieldId,
    pub native_rate_hz: u32,
    /// Resolved rates of the enabled channels fed by this field. Empty
    /// means the field is disabled on the device.
    pub requests: Vec<ResolvedRate>,
}

/// Target configuration of one supported subsystem.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubsystemConfig {
    pub subsystem: Subsystem,
    /// The user asked for this subsystem's data
    pub enabled: bool,
    pub frame_id: String,
    pub streams: Vec<FieldStream>,
    /// Device settings written before the streaming commands
    pub settings: Vec<DeviceSetting>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub static_covariance: Option<StaticCovariance>,
}

/// A channel with its rate resolved against the field's native rate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolvedChannel {
    #[serde(flatten)]
    pub descriptor: ChannelDescriptor,
    pub resolved: ResolvedRate,
    pub native_rate_hz: u32,
}

/// Options applied when rendering telemetry into channel messages.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputOptions {
    pub use_device_timestamp: bool,
    pub use_enu_frame: bool,
    pub gps_leap_seconds: f64,
    pub queue_depth: usize,
}

impl OutputOptions {
    pub fn from_settings(settings: &DriverSettings) -> Self {
        Self {
            use_device_timestamp: settings.use_device_timestamp,
            use_enu_frame: settings.use_enu_frame,
            gps_leap_seconds: settings.gps_leap_seconds,
            queue_depth: settings.channel_queue_depth,
        }
    }
}

/// Output of [`ConfigurationResolver::resolve`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolvedConfig {
    /// Supported subsystems in configuration order
    pub subsystems: Vec<SubsystemConfig>,
    /// Channel set, grouped by field in mapping order
    pub channels: Vec<ResolvedChannel>,
    /// Events in declaration order
    pub events: Vec<EventDefinition>,
    pub output: OutputOptions,
    /// Non-fatal findings for the caller to log
    pub warnings: Vec<String>,
}

impl ResolvedConfig {
    pub fn subsystem(&self, subsystem: Subsystem) -> Option<&SubsystemConfig> {
        self.subsystems.iter().find(|c| c.subsystem == subsystem)
    }

    pub fn channel(&self, name: &str) -> Option<&ResolvedChannel> {
        self.channels.iter().find(|c| c.descriptor.name == name)
    }

    pub fn channels_for(&self, field: FieldId) -> impl Iterator<Item = &ResolvedChannel> {
        self.channels.iter().filter(move |c| c.descriptor.field == field)
    }

    pub fn channel_names(&self) -> Vec<String> {
        self.channels.iter().map(|c| c.descriptor.name.clone()).collect()
    }
}

// ============================================================================
// Resolver
// ============================================================================

/// Resolves settings against device capabilities.
pub struct ConfigurationResolver;

impl ConfigurationResolver {
    pub fn resolve(
        settings: &DriverSettings,
        caps: &DeviceCapabilities,
        mapping: &TopicMapping,
    ) -> Result<ResolvedConfig, ConfigError> {
        Self::check_general(settings)?;

        let mut subsystems = Vec::new();
        let mut channels = Vec::new();
        let mut warnings = Vec::new();
        let mut names = HashSet::new();

        for subsystem in Subsystem::ORDER {
            let enabled = settings.subsystem_enabled(subsystem);

            if subsystem == Subsystem::Filter {
                Self::check_filter_dependencies(settings, caps)?;
            }

            if !caps.supports(subsystem) {
                if enabled {
                    return Err(ConfigError::UnsupportedSubsystem(subsystem.name().to_string()));
                }
                continue;
            }

            let mut streams = Vec::new();
            for field in mapping.fields(subsystem) {
                let Some(native) = caps.native_rate(field) else {
                    if enabled {
                        warnings.push(format!(
                            "{subsystem} field {field} is not supported by {}, its channels are dropped",
                            caps.model_name
                        ));
                    }
                    continue;
                };

                let mut requests = Vec::new();
                for descriptor in mapping.build_channels(field, settings)? {
                    if !names.insert(descriptor.name.clone()) {
                        return Err(ConfigError::DuplicateChannel(descriptor.name));
                    }
                    let resolved = Self::resolve_channel(&descriptor, native, &mut warnings)?;
                    if descriptor.enabled {
                        requests.push(resolved);
                    }
                    channels.push(ResolvedChannel {
                        descriptor,
                        resolved,
                        native_rate_hz: native,
                    });
                }

                streams.push(FieldStream {
                    field,
                    native_rate_hz: native,
                    requests,
                });
            }

            subsystems.push(SubsystemConfig {
                subsystem,
                enabled,
                frame_id: settings.frame_id(subsystem).to_string(),
                streams,
                settings: Self::device_settings(subsystem, settings)?,
                static_covariance: if subsystem == Subsystem::Imu {
                    Some(Self::static_covariance(settings)?)
                } else {
                    None
                },
            });
        }

        for field in mapping.unknown_fields() {
            warnings.push(format!("mapped field {field} belongs to no known subsystem"));
        }

        Ok(ResolvedConfig {
            subsystems,
            channels,
            events: settings.events.clone(),
            output: OutputOptions::from_settings(settings),
            warnings,
        })
    }

    fn check_general(settings: &DriverSettings) -> Result<(), ConfigError> {
        if settings.command_timeout_ms == 0 {
            return Err(ConfigError::invalid_setting(
                "command_timeout_ms",
                "must be greater than zero",
            ));
        }
        if settings.channel_queue_depth == 0 {
            return Err(ConfigError::invalid_setting(
                "channel_queue_depth",
                "must be greater than zero",
            ));
        }
        Ok(())
    }

    /// Resolve a channel's rate. Disabled channels fall back to the native
    /// rate so a bad rate on a channel nobody reads does not fail the pass.
    fn resolve_channel(
        descriptor: &ChannelDescriptor,
        native: u32,
        warnings: &mut Vec<String>,
    ) -> Result<ResolvedRate, ConfigError> {
        match RateResolver::resolve(descriptor.rate, native) {
            Ok(resolved) => Ok(resolved),
            Err(source) if descriptor.enabled => Err(ConfigError::RateResolution {
                channel: descriptor.name.clone(),
                requested: descriptor.rate,
                source,
            }),
            Err(source) => {
                warnings.push(format!(
                    "disabled channel '{}' uses the native rate: {source}",
                    descriptor.name
                ));
                Ok(ResolvedRate::native(native))
            }
        }
    }

    fn check_filter_dependencies(
        settings: &DriverSettings,
        caps: &DeviceCapabilities,
    ) -> Result<(), ConfigError> {
        if !caps.supports(Subsystem::Filter) {
            if settings.any_filter_aiding() {
                return Err(ConfigError::InvalidDependency(format!(
                    "filter aiding options are set but {} has no navigation filter",
                    caps.model_name
                )));
            }
            return Ok(());
        }

        if settings.filter_enable_gnss_heading_aiding && !caps.supports_dual_gnss() {
            return Err(ConfigError::InvalidDependency(
                "filter_enable_gnss_heading_aiding requires dual GNSS".to_string(),
            ));
        }
        if settings.filter_enable_gnss_antenna_cal && !caps.supports(Subsystem::Rtk) {
            return Err(ConfigError::InvalidDependency(
                "filter_enable_gnss_antenna_cal requires RTK".to_string(),
            ));
        }
        if settings.filter_enable_gnss_pos_vel_aiding
            && !(caps.supports(Subsystem::Gnss1) || caps.supports(Subsystem::Gnss2))
        {
            return Err(ConfigError::InvalidDependency(
                "filter_enable_gnss_pos_vel_aiding requires a GNSS receiver".to_string(),
            ));
        }
        if settings.filter_enable_odometer_aiding && !settings.enable_hardware_odometer {
            return Err(ConfigError::InvalidDependency(
                "filter_enable_odometer_aiding requires enable_hardware_odometer".to_string(),
            ));
        }
        Ok(())
    }

    fn device_settings(
        subsystem: Subsystem,
        settings: &DriverSettings,
    ) -> Result<Vec<DeviceSetting>, ConfigError> {
        let out = match subsystem {
            Subsystem::Imu => vec![DeviceSetting::HardwareOdometer {
                enabled: settings.enable_hardware_odometer,
            }],
            Subsystem::Gnss1 => vec![DeviceSetting::GnssAntennaOffset {
                receiver: Subsystem::Gnss1,
                offset: vector3("gnss1_antenna_offset", &settings.gnss1_antenna_offset)?,
            }],
            Subsystem::Gnss2 => vec![DeviceSetting::GnssAntennaOffset {
                receiver: Subsystem::Gnss2,
                offset: vector3("gnss2_antenna_offset", &settings.gnss2_antenna_offset)?,
            }],
            Subsystem::Rtk => vec![DeviceSetting::RtkDongle {
                enabled: settings.publish_rtk,
            }],
            Subsystem::Filter => {
                let aiding = [
                    (AidingSource::GnssPosVel, settings.filter_enable_gnss_pos_vel_aiding),
                    (AidingSource::GnssHeading, settings.filter_enable_gnss_heading_aiding),
                    (AidingSource::Altimeter, settings.filter_enable_altimeter_aiding),
                    (AidingSource::Odometer, settings.filter_enable_odometer_aiding),
                    (AidingSource::Magnetometer, settings.filter_enable_magnetometer_aiding),
                    (
                        AidingSource::ExternalHeading,
                        settings.filter_enable_external_heading_aiding,
                    ),
                ];

                let mut out = vec![
                    DeviceSetting::SensorToVehicleRotation {
                        euler: vector3(
                            "filter_sensor2vehicle_frame_transformation_euler",
                            &settings.filter_sensor2vehicle_frame_transformation_euler,
                        )?,
                    },
                    DeviceSetting::DynamicsMode {
                        mode: settings.filter_dynamics_mode,
                    },
                ];
                out.extend(
                    aiding
                        .into_iter()
                        .map(|(source, enabled)| DeviceSetting::AidingMeasurement { source, enabled }),
                );
                out.push(DeviceSetting::AntennaCalibration {
                    enabled: settings.filter_enable_gnss_antenna_cal,
                });
                out.push(DeviceSetting::WheeledVehicleConstraint {
                    enabled: settings.filter_enable_wheeled_vehicle_constraint,
                });
                out.push(DeviceSetting::VerticalGyroConstraint {
                    enabled: settings.filter_enable_vertical_gyro_constraint,
                });
                out
            }
        };
        Ok(out)
    }

    fn static_covariance(settings: &DriverSettings) -> Result<StaticCovariance, ConfigError> {
        Ok(StaticCovariance {
            linear_acceleration: matrix3("imu_linear_cov", &settings.imu_linear_cov)?,
            angular_velocity: matrix3("imu_angular_cov", &settings.imu_angular_cov)?,
            orientation: matrix3("imu_orientation_cov", &settings.imu_orientation_cov)?,
        })
    }
}

fn vector3(name: &str, values: &[f64]) -> Result<[f64; 3], ConfigError> {
    <[f64; 3]>::try_from(values).map_err(|_| {
        ConfigError::invalid_setting(name, format!("expected 3 values, got {}", values.len()))
    })
}

/// Accepts a diagonal (3 values) or a full row-major matrix (9 values).
fn matrix3(name: &str, values: &[f64]) -> Result<[f64; 9], ConfigError> {
    match values.len() {
        3 => {
            let mut m = [0.0; 9];
            m[0] = values[0];
            m[4] = values[1];
            m[8] = values[2];
            Ok(m)
        }
        9 => {
            let mut m = [0.0; 9];
            m.copy_from_slice(values);
            Ok(m)
        }
        n => Err(ConfigError::invalid_setting(
            name,
            format!("expected 3 or 9 values, got {n}"),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{Action, GpioActionMode, Trigger, Comparator};
    use crate::model::descriptors::*;
    use pretty_assertions::assert_eq;

    fn gq7_without_dual_gnss() -> DeviceCapabilities {
        DeviceCapabilities::new("3DM-GQ7", "1.1.0")
            .with_subsystem(
                Subsystem::Imu,
                100,
                &[IMU_SCALED_ACCEL, IMU_SCALED_MAG, IMU_GPS_CORRELATION_TIMESTAMP],
            )
            .with_subsystem(
                Subsystem::Gnss1,
                10,
                &[GNSS1_LLH_POSITION, GNSS1_GPS_TIME, GNSS1_FIX_INFO],
            )
            .with_subsystem(
                Subsystem::Filter,
                100,
                &[FILTER_STATUS, FILTER_POSITION_LLH, FILTER_EULER_ANGLES],
            )
    }

    fn settings() -> DriverSettings {
        DriverSettings {
            publish_imu: true,
            publish_gnss1: true,
            gnss1_data_rate: RateRequest::Hz(5.0),
            ..Default::default()
        }
    }

    fn stream<'a>(config: &'a ResolvedConfig, field: FieldId) -> &'a FieldStream {
        config
            .subsystems
            .iter()
            .flat_map(|s| s.streams.iter())
            .find(|s| s.field == field)
            .unwrap()
    }

    #[test]
    fn test_resolves_supported_subsystems_in_order() {
        let config = ConfigurationResolver::resolve(
            &settings(),
            &gq7_without_dual_gnss(),
            &TopicMapping::standard(),
        )
        .unwrap();

        let order: Vec<Subsystem> = config.subsystems.iter().map(|s| s.subsystem).collect();
        assert_eq!(order, vec![Subsystem::Imu, Subsystem::Gnss1, Subsystem::Filter]);

        let fix = stream(&config, GNSS1_LLH_POSITION);
        assert_eq!(fix.native_rate_hz, 10);
        assert_eq!(fix.requests.len(), 2);
        assert!(fix.requests.iter().all(|r| r.decimation == 2));

        let accel = stream(&config, IMU_SCALED_ACCEL);
        assert!(accel.requests.iter().all(|r| r.decimation == 1));

        // filter is supported but not published
        let filter = config.subsystem(Subsystem::Filter).unwrap();
        assert!(!filter.enabled);
        assert!(filter.streams.iter().all(|s| s.requests.is_empty()));
    }

    #[test]
    fn test_rtk_enabled_but_unsupported() {
        let settings = DriverSettings {
            publish_rtk: true,
            ..settings()
        };
        let err = ConfigurationResolver::resolve(
            &settings,
            &gq7_without_dual_gnss(),
            &TopicMapping::standard(),
        )
        .unwrap_err();
        assert_eq!(err, ConfigError::UnsupportedSubsystem("RTK".to_string()));
    }

    #[test]
    fn test_gnss2_enabled_but_unsupported() {
        let settings = DriverSettings {
            publish_gnss2: true,
            ..settings()
        };
        let err = ConfigurationResolver::resolve(
            &settings,
            &gq7_without_dual_gnss(),
            &TopicMapping::standard(),
        )
        .unwrap_err();
        assert_eq!(err, ConfigError::UnsupportedSubsystem("GNSS-2".to_string()));
    }

    #[test]
    fn test_aiding_dependencies() {
        let caps = gq7_without_dual_gnss();
        let mapping = TopicMapping::standard();

        let heading = DriverSettings {
            filter_enable_gnss_heading_aiding: true,
            ..settings()
        };
        assert!(matches!(
            ConfigurationResolver::resolve(&heading, &caps, &mapping),
            Err(ConfigError::InvalidDependency(_))
        ));

        let antenna_cal = DriverSettings {
            filter_enable_gnss_antenna_cal: true,
            ..settings()
        };
        assert!(matches!(
            ConfigurationResolver::resolve(&antenna_cal, &caps, &mapping),
            Err(ConfigError::InvalidDependency(_))
        ));

        let odometer = DriverSettings {
            filter_enable_odometer_aiding: true,
            ..settings()
        };
        assert!(matches!(
            ConfigurationResolver::resolve(&odometer, &caps, &mapping),
            Err(ConfigError::InvalidDependency(_))
        ));

        let pos_vel = DriverSettings {
            filter_enable_gnss_pos_vel_aiding: true,
            ..settings()
        };
        assert!(ConfigurationResolver::resolve(&pos_vel, &caps, &mapping).is_ok());
    }

    #[test]
    fn test_aiding_without_filter() {
        let caps = DeviceCapabilities::new("3DM-GX5-25", "1.0")
            .with_subsystem(Subsystem::Imu, 500, &[IMU_SCALED_ACCEL]);
        let settings = DriverSettings {
            filter_enable_magnetometer_aiding: true,
            ..Default::default()
        };
        assert!(matches!(
            ConfigurationResolver::resolve(&settings, &caps, &TopicMapping::standard()),
            Err(ConfigError::InvalidDependency(_))
        ));
    }

    #[test]
    fn test_rate_error_is_wrapped() {
        let settings = DriverSettings {
            gnss1_data_rate: RateRequest::Hz(20.0),
            ..settings()
        };
        let err = ConfigurationResolver::resolve(
            &settings,
            &gq7_without_dual_gnss(),
            &TopicMapping::standard(),
        )
        .unwrap_err();

        match err {
            ConfigError::RateResolution {
                channel,
                requested,
                source,
            } => {
                assert_eq!(channel, "gnss1/fix");
                assert_eq!(requested, RateRequest::Hz(20.0));
                assert_eq!(
                    source,
                    RateError::ExceedsNative {
                        requested: 20.0,
                        native: 10
                    }
                );
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_bad_rate_on_disabled_channel_falls_back() {
        let settings = DriverSettings {
            publish_filter: false,
            filter_data_rate: RateRequest::Hz(1000.0),
            ..settings()
        };
        let config = ConfigurationResolver::resolve(
            &settings,
            &gq7_without_dual_gnss(),
            &TopicMapping::standard(),
        )
        .unwrap();
        let status = config.channel("nav/status").unwrap();
        assert!(!status.descriptor.enabled);
        assert_eq!(status.resolved.decimation, 1);
        assert!(!config.warnings.is_empty());
    }

    #[test]
    fn test_unsupported_field_is_dropped_with_warning() {
        let caps = gq7_without_dual_gnss();
        let config = ConfigurationResolver::resolve(&settings(), &caps, &TopicMapping::standard())
            .unwrap();
        assert!(config.channel("nav/odom").is_some());
        assert!(config.channel("nav/filtered_imu/data").is_none());
        assert!(config.channel("imu/data").is_some());

        // only the enabled subsystems warn
        assert!(config.warnings.iter().all(|w| !w.contains("Filter")));
    }

    #[test]
    fn test_duplicate_channel() {
        use crate::model::MessageShape;
        use crate::topics::{Predicate, TopicRule};

        let mapping = TopicMapping::new(vec![
            TopicRule::new(IMU_SCALED_ACCEL, "imu/data", MessageShape::Imu, Predicate::Always),
            TopicRule::new(IMU_SCALED_MAG, "imu/data", MessageShape::MagneticField, Predicate::Always),
        ]);
        let err = ConfigurationResolver::resolve(&settings(), &gq7_without_dual_gnss(), &mapping)
            .unwrap_err();
        assert_eq!(err, ConfigError::DuplicateChannel("imu/data".to_string()));
    }

    #[test]
    fn test_invalid_vectors() {
        let settings = DriverSettings {
            gnss1_antenna_offset: vec![0.1, 0.2],
            ..settings()
        };
        assert!(matches!(
            ConfigurationResolver::resolve(&settings, &gq7_without_dual_gnss(), &TopicMapping::standard()),
            Err(ConfigError::InvalidSetting { ref name, .. }) if name == "gnss1_antenna_offset"
        ));

        let settings = DriverSettings {
            imu_linear_cov: vec![0.0; 4],
            ..self::settings()
        };
        assert!(matches!(
            ConfigurationResolver::resolve(&settings, &gq7_without_dual_gnss(), &TopicMapping::standard()),
            Err(ConfigError::InvalidSetting { .. })
        ));
    }

    #[test]
    fn test_static_covariance_diagonal() {
        let settings = DriverSettings {
            imu_linear_cov: vec![1.0, 2.0, 3.0],
            ..settings()
        };
        let config = ConfigurationResolver::resolve(
            &settings,
            &gq7_without_dual_gnss(),
            &TopicMapping::standard(),
        )
        .unwrap();
        let cov = config
            .subsystem(Subsystem::Imu)
            .and_then(|s| s.static_covariance.as_ref())
            .unwrap();
        assert_eq!(
            cov.linear_acceleration,
            [1.0, 0.0, 0.0, 0.0, 2.0, 0.0, 0.0, 0.0, 3.0]
        );
    }

    #[test]
    fn test_filter_device_settings() {
        let settings = DriverSettings {
            publish_filter: true,
            filter_enable_gnss_pos_vel_aiding: true,
            filter_dynamics_mode: 2,
            ..settings()
        };
        let config = ConfigurationResolver::resolve(
            &settings,
            &gq7_without_dual_gnss(),
            &TopicMapping::standard(),
        )
        .unwrap();
        let filter = config.subsystem(Subsystem::Filter).unwrap();

        assert_eq!(filter.settings.len(), 11);
        assert_eq!(filter.settings[1], DeviceSetting::DynamicsMode { mode: 2 });
        assert_eq!(
            filter.settings[2],
            DeviceSetting::AidingMeasurement {
                source: AidingSource::GnssPosVel,
                enabled: true
            }
        );
    }

    #[test]
    fn test_resolution_is_pure() {
        let mut settings = settings();
        settings.events.push(EventDefinition {
            trigger: Trigger::Threshold {
                field: FILTER_EULER_ANGLES,
                parameter: 3,
                comparator: Comparator::Above,
                value: 1.5,
            },
            actions: vec![Action::Gpio {
                pin: 2,
                mode: GpioActionMode::Toggle,
            }],
        });
        let caps = gq7_without_dual_gnss();
        let mapping = TopicMapping::standard();

        let first = ConfigurationResolver::resolve(&settings, &caps, &mapping).unwrap();
        let second = ConfigurationResolver::resolve(&settings, &caps, &mapping).unwrap();
        assert_eq!(first, second);
        assert_eq!(first.events.len(), 1);
    }

    #[test]
    fn test_zero_queue_depth_rejected() {
        let settings = DriverSettings {
            channel_queue_depth: 0,
            ..settings()
        };
        assert!(matches!(
            ConfigurationResolver::resolve(&settings, &gq7_without_dual_gnss(), &TopicMapping::standard()),
            Err(ConfigError::InvalidSetting { .. })
        ));
    }
}
