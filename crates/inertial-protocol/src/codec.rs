//! JSON codec for channel messages and recorded telemetry.
//!
//! Channel messages leave the driver as JSON text. Recorded telemetry is
//! stored one JSON record per line, which lets a capture be replayed
//! through the dispatch path without a device attached.

use crate::messages::{ChannelMessage, TelemetryRecord};
use thiserror::Error;

/// Errors that can occur during encoding/decoding.
#[derive(Debug, Error)]
pub enum CodecError {
    #[error("Failed to serialize message: {0}")]
    SerializeError(#[from] serde_json::Error),

    #[error("line {line}: {source}")]
    Record {
        line: usize,
        #[source]
        source: serde_json::Error,
    },
}

/// Encode a channel message as a JSON string.
pub fn encode_channel_message(msg: &ChannelMessage) -> Result<String, CodecError> {
    serde_json::to_string(msg).map_err(CodecError::from)
}

pub fn decode_channel_message(text: &str) -> Result<ChannelMessage, CodecError> {
    serde_json::from_str(text).map_err(CodecError::from)
}

/// Encode a record as one line (without the trailing newline).
pub fn encode_record(record: &TelemetryRecord) -> Result<String, CodecError> {
    serde_json::to_string(record).map_err(CodecError::from)
}

/// Decode a JSON-lines capture. Blank lines are skipped.
pub fn decode_records(text: &str) -> Result<Vec<TelemetryRecord>, CodecError> {
    text.lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(i, line)| {
            serde_json::from_str(line).map_err(|source| CodecError::Record { line: i + 1, source })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messages::GpsTime;
    use inertial_core::descriptors::{IMU_SCALED_ACCEL, IMU_SCALED_GYRO};
    use inertial_core::MessageShape;

    #[test]
    fn test_encode_channel_message() {
        let msg = ChannelMessage {
            channel: "imu/data".to_string(),
            shape: MessageShape::Imu,
            frame_id: "imu_link".to_string(),
            child_frame_id: None,
            stamp: "2024-01-17T10:00:00.000000Z".to_string(),
            device_time: Some(GpsTime::new(2297, 12.5)),
            payload: serde_json::json!({ "linear_acceleration": { "x": 0.0 } }),
        };
        let json = encode_channel_message(&msg).unwrap();

        assert!(json.contains("\"channel\":\"imu/data\""));
        assert!(json.contains("\"shape\":\"imu\""));
        assert!(!json.contains("child_frame_id"));
        assert_eq!(decode_channel_message(&json).unwrap(), msg);
    }

    #[test]
    fn test_decode_records() {
        let capture = r#"
{"field":{"descriptor_set":128,"field_descriptor":4},"values":{"x":0.1,"y":0.0,"z":-9.8},"device_time":{"week":2297,"tow":1.0}}

{"field":{"descriptor_set":128,"field_descriptor":5},"values":{"x":0.0,"y":0.0,"z":0.0}}
"#;
        let records = decode_records(capture).unwrap();

        assert_eq!(records.len(), 2);
        assert_eq!(records[0].field, IMU_SCALED_ACCEL);
        assert_eq!(records[0].device_time, Some(GpsTime::new(2297, 1.0)));
        assert_eq!(records[1].field, IMU_SCALED_GYRO);
    }

    #[test]
    fn test_decode_records_reports_line() {
        let capture = "{\"field\":{\"descriptor_set\":128,\"field_descriptor\":4},\"values\":{}}\nnot json\n";
        match decode_records(capture) {
            Err(CodecError::Record { line, .. }) => assert_eq!(line, 2),
            other => panic!("Expected record error, got {other:?}"),
        }
    }
}
