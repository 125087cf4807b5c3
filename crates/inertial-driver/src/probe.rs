//! Capability probe.
//!
//! Asks the device who it is and what it streams, once per connection. The
//! snapshot keeps only what both the model table and the firmware report.

use std::time::Duration;

use thiserror::Error;
use tracing::{debug, info};

use inertial_core::{DeviceCapabilities, Subsystem, SubsystemCapability};
use inertial_protocol::{DeviceError, DeviceHandle, DeviceInfo};

/// Errors raised while probing.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ProbeError {
    #[error("device did not answer the capability query within {0:?}")]
    Unresponsive(Duration),

    #[error("unsupported device model '{0}'")]
    UnsupportedModel(String),

    #[error("capability query failed: {0}")]
    Device(#[source] DeviceError),
}

/// A model the driver knows, matched by name prefix.
#[derive(Debug, Clone, Copy)]
pub struct KnownModel {
    pub prefix: &'static str,
    pub subsystems: &'static [Subsystem],
}

const ALL: &[Subsystem] = &[
    Subsystem::Imu,
    Subsystem::Gnss1,
    Subsystem::Gnss2,
    Subsystem::Rtk,
    Subsystem::Filter,
];
const GNSS_INS: &[Subsystem] = &[Subsystem::Imu, Subsystem::Gnss1, Subsystem::Filter];
const AHRS: &[Subsystem] = &[Subsystem::Imu, Subsystem::Filter];

/// Models this driver can configure.
pub const KNOWN_MODELS: &[KnownModel] = &[
    KnownModel { prefix: "3DM-GQ7", subsystems: ALL },
    KnownModel { prefix: "3DM-GX5-45", subsystems: GNSS_INS },
    KnownModel { prefix: "3DM-GX5-25", subsystems: AHRS },
    KnownModel { prefix: "3DM-GX5-15", subsystems: AHRS },
    KnownModel { prefix: "3DM-CV5-45", subsystems: AHRS },
    KnownModel { prefix: "3DM-CV5-25", subsystems: AHRS },
    KnownModel { prefix: "3DM-CV5-15", subsystems: AHRS },
    KnownModel { prefix: "3DM-CX5-45", subsystems: GNSS_INS },
    KnownModel { prefix: "3DM-CX5-25", subsystems: AHRS },
    KnownModel { prefix: "3DM-CX5-15", subsystems: AHRS },
];

/// Look up a model name in [`KNOWN_MODELS`].
pub fn known_model(model_name: &str) -> Option<&'static KnownModel> {
    KNOWN_MODELS
        .iter()
        .find(|model| model_name.trim().starts_with(model.prefix))
}

pub struct CapabilityProbe;

impl CapabilityProbe {
    /// Query the device once. No retries.
    pub fn probe<D>(device: &mut D, timeout: Duration) -> Result<DeviceCapabilities, ProbeError>
    where
        D: DeviceHandle + ?Sized,
    {
        let info = device.device_info(timeout).map_err(|e| match e {
            DeviceError::Timeout(_) => ProbeError::Unresponsive(timeout),
            other => ProbeError::Device(other),
        })?;

        let caps = Self::capabilities(&info)?;
        info!(
            model = %caps.model_name,
            firmware = %caps.firmware_version,
            serial = %info.serial_number,
            subsystems = ?caps.subsystems().collect::<Vec<_>>(),
            "Device capabilities probed"
        );
        Ok(caps)
    }

    /// Build the capability snapshot from a device answer.
    pub fn capabilities(info: &DeviceInfo) -> Result<DeviceCapabilities, ProbeError> {
        let model = known_model(&info.model_name)
            .ok_or_else(|| ProbeError::UnsupportedModel(info.model_name.clone()))?;

        let mut caps = DeviceCapabilities::new(&info.model_name, &info.firmware_version)
            .with_features(info.features);

        for set in &info.descriptor_sets {
            let Some(subsystem) = Subsystem::from_descriptor_set(set.descriptor_set) else {
                debug!(descriptor_set = set.descriptor_set, "Ignoring unknown descriptor set");
                continue;
            };
            if !model.subsystems.contains(&subsystem) {
                debug!(%subsystem, model = model.prefix, "Ignoring subsystem not offered by model");
                continue;
            }
            if set.fields.is_empty() {
                continue;
            }
            caps.insert(
                subsystem,
                SubsystemCapability {
                    fields: set.fields.clone(),
                },
            );
        }

        Ok(caps)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use inertial_core::descriptors::*;
    use inertial_protocol::DescriptorSetInfo;

    fn info(model: &str) -> DeviceInfo {
        DeviceInfo {
            model_name: model.to_string(),
            firmware_version: "1.0.0".to_string(),
            serial_number: "6251.1234".to_string(),
            descriptor_sets: vec![
                DescriptorSetInfo::uniform(IMU_DATA_SET, 1000, &[0x04, 0x05]),
                DescriptorSetInfo::uniform(GNSS1_DATA_SET, 10, &[0x03]),
                DescriptorSetInfo::uniform(RTK_DATA_SET, 1, &[0x31]),
                DescriptorSetInfo::uniform(0x0C, 1, &[0x01]),
            ],
            features: Default::default(),
        }
    }

    #[test]
    fn test_known_model_prefix() {
        assert_eq!(known_model("3DM-GQ7-GNSS/INS").map(|m| m.prefix), Some("3DM-GQ7"));
        assert!(known_model("3DM-XYZ").is_none());
    }

    #[test]
    fn test_capabilities_intersect_model() {
        let caps = CapabilityProbe::capabilities(&info("3DM-GX5-45")).unwrap();
        assert!(caps.supports(Subsystem::Imu));
        assert!(caps.supports(Subsystem::Gnss1));
        // reported by firmware but not offered by the model
        assert!(!caps.supports(Subsystem::Rtk));
        assert_eq!(caps.native_rate(IMU_SCALED_GYRO), Some(1000));
    }

    #[test]
    fn test_unsupported_model() {
        let err = CapabilityProbe::capabilities(&info("ACME-1")).unwrap_err();
        assert_eq!(err, ProbeError::UnsupportedModel("ACME-1".to_string()));
    }
}
