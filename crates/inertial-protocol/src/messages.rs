//! Messages exchanged with the device and emitted on output channels.
//!
//! - Device → driver: DeviceInfo, Reply, TelemetryRecord
//! - Driver → device: DeviceCommand
//! - Driver → host: ChannelMessage
//!
//! Byte-level framing belongs to the transport layer; these are the decoded
//! forms it hands over.

use chrono::{DateTime, SecondsFormat, Utc};
use inertial_core::{DeviceSetting, EventDefinition, FieldId, FirmwareFeatures, MessageShape};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

// ============================================================================
// Device identity
// ============================================================================

/// Fields of one descriptor set as reported by the device.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DescriptorSetInfo {
    pub descriptor_set: u8,
    /// Field descriptor -> native base rate in Hz
    pub fields: BTreeMap<u8, u32>,
}

impl DescriptorSetInfo {
    /// All `fields` stream at `base_rate` Hz.
    pub fn uniform(descriptor_set: u8, base_rate: u32, fields: &[u8]) -> Self {
        Self {
            descriptor_set,
            fields: fields.iter().map(|&f| (f, base_rate)).collect(),
        }
    }
}

/// Answer to the device identity/capability query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceInfo {
    pub model_name: String,
    pub firmware_version: String,
    #[serde(default)]
    pub serial_number: String,
    pub descriptor_sets: Vec<DescriptorSetInfo>,
    #[serde(default)]
    pub features: FirmwareFeatures,
}

// ============================================================================
// Commands
// ============================================================================

/// Outcome of a device command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Reply {
    Ack,
    Nack(String),
}

impl Reply {
    pub fn is_ack(&self) -> bool {
        matches!(self, Reply::Ack)
    }
}

/// A configuration command, in the form a device records or logs it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum DeviceCommand {
    /// Stream `field` at `decimation` of its native rate, or stop it.
    SetStreaming {
        field: FieldId,
        decimation: Option<u32>,
    },
    WriteSetting { setting: DeviceSetting },
    SetEventConfig { instance: u8, event: EventDefinition },
}

impl DeviceCommand {
    /// The field a streaming command targets.
    pub fn streaming_field(&self) -> Option<FieldId> {
        match self {
            DeviceCommand::SetStreaming { field, .. } => Some(*field),
            _ => None,
        }
    }
}

// ============================================================================
// Telemetry
// ============================================================================

/// Seconds between the Unix epoch and the GPS epoch (1980-01-06).
pub const GPS_EPOCH_UNIX: i64 = 315_964_800;

const SECONDS_PER_WEEK: f64 = 604_800.0;

/// Device time as GPS week and time of week.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GpsTime {
    pub week: u32,
    /// Seconds into the week
    pub tow: f64,
}

impl GpsTime {
    pub fn new(week: u32, tow: f64) -> Self {
        Self { week, tow }
    }

    /// Convert to UTC given the current GPS-UTC leap second offset.
    pub fn to_utc(&self, leap_seconds: f64) -> Option<DateTime<Utc>> {
        if !self.tow.is_finite() {
            return None;
        }
        let gps = self.week as f64 * SECONDS_PER_WEEK + self.tow - leap_seconds;
        let secs = gps.floor();
        let nanos = ((gps - secs) * 1e9).round().min(999_999_999.0) as u32;
        DateTime::from_timestamp(GPS_EPOCH_UNIX + secs as i64, nanos)
    }
}

/// One decoded telemetry record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TelemetryRecord {
    pub field: FieldId,
    /// Decoded field values keyed by name
    pub values: serde_json::Value,
    /// Device time, when the device stamped the record
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_time: Option<GpsTime>,
}

impl TelemetryRecord {
    pub fn new(field: FieldId, values: serde_json::Value) -> Self {
        Self {
            field,
            values,
            device_time: None,
        }
    }

    pub fn with_device_time(mut self, device_time: GpsTime) -> Self {
        self.device_time = Some(device_time);
        self
    }
}

/// A message emitted on an output channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelMessage {
    pub channel: String,
    pub shape: MessageShape,
    pub frame_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub child_frame_id: Option<String>,
    /// RFC 3339 UTC stamp
    pub stamp: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub device_time: Option<GpsTime>,
    pub payload: serde_json::Value,
}

/// Format a UTC time the way channel messages carry it.
pub fn format_stamp(time: DateTime<Utc>) -> String {
    time.to_rfc3339_opts(SecondsFormat::Micros, true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use inertial_core::descriptors::GNSS1_LLH_POSITION;

    #[test]
    fn test_device_info_defaults() {
        let json = r#"{
            "model_name": "3DM-GQ7",
            "firmware_version": "1.1.0",
            "descriptor_sets": [{"descriptor_set": 145, "fields": {"3": 10}}]
        }"#;
        let info: DeviceInfo = serde_json::from_str(json).unwrap();

        assert_eq!(info.serial_number, "");
        assert_eq!(info.features, FirmwareFeatures::default());
        assert_eq!(info.descriptor_sets[0].fields[&3], 10);
    }

    #[test]
    fn test_command_serialization() {
        let cmd = DeviceCommand::SetStreaming {
            field: GNSS1_LLH_POSITION,
            decimation: Some(2),
        };
        let json = serde_json::to_value(&cmd).unwrap();

        assert_eq!(json["command"], "set_streaming");
        assert_eq!(json["decimation"], 2);
        assert_eq!(cmd.streaming_field(), Some(GNSS1_LLH_POSITION));
    }

    #[test]
    fn test_reply() {
        assert!(Reply::Ack.is_ack());
        assert!(!Reply::Nack("busy".to_string()).is_ack());
        assert_eq!(serde_json::to_string(&Reply::Ack).unwrap(), "\"ack\"");
    }

    #[test]
    fn test_record_device_time_optional() {
        let record: TelemetryRecord = serde_json::from_str(
            r#"{"field": {"descriptor_set": 145, "field_descriptor": 3}, "values": {"latitude": 1.0}}"#,
        )
        .unwrap();
        assert_eq!(record.field, GNSS1_LLH_POSITION);
        assert_eq!(record.device_time, None);
    }

    #[test]
    fn test_gps_time_to_utc() {
        // week 2297, tow 295218 s is 2024-01-17T10:00:00Z with 18 leap seconds
        let time = GpsTime::new(2297, 295_218.0).to_utc(18.0).unwrap();
        assert_eq!(format_stamp(time), "2024-01-17T10:00:00.000000Z");

        assert!(GpsTime::new(2297, f64::NAN).to_utc(18.0).is_none());
    }

    #[test]
    fn test_stamp_format() {
        let time = DateTime::parse_from_rfc3339("2024-01-17T10:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        assert_eq!(format_stamp(time), "2024-01-17T10:00:00.000000Z");
    }
}
