//! Rendering telemetry records into channel messages.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde_json::{json, Map, Value};

use inertial_core::{MessageShape, OutputOptions, StaticCovariance};
use inertial_protocol::{format_stamp, ChannelMessage, GpsTime, TelemetryRecord};

/// What a route needs to know to render a record.
#[derive(Debug, Clone, PartialEq)]
pub struct ChannelSpec {
    pub name: String,
    pub shape: MessageShape,
    pub frame_id: String,
    pub child_frame_id: Option<String>,
    /// Rate the channel publishes at
    pub achieved_hz: f64,
    /// Fixed IMU covariances, for IMU-shaped channels
    pub covariance: Option<Arc<StaticCovariance>>,
    pub output: Arc<OutputOptions>,
}

/// Render `record` for the channel described by `spec`.
///
/// `now` is the host receive time, used unless device stamping is on and
/// the record carries a device time.
pub fn render(spec: &ChannelSpec, record: &TelemetryRecord, now: DateTime<Utc>) -> ChannelMessage {
    let output = &spec.output;
    let device_utc = record
        .device_time
        .and_then(|t| t.to_utc(output.gps_leap_seconds));
    let stamp = match device_utc {
        Some(time) if output.use_device_timestamp => time,
        _ => now,
    };

    let mut values = record.values.clone();
    if output.use_enu_frame {
        ned_to_enu(&mut values);
    }

    let payload = match spec.shape {
        MessageShape::Imu => with_covariance(values, spec.covariance.as_deref()),
        MessageShape::Odometry | MessageShape::RelativePosition => json!({ "pose": values }),
        MessageShape::TimeReference => time_reference(&values, record.device_time, output, &spec.name),
        _ => values,
    };

    ChannelMessage {
        channel: spec.name.clone(),
        shape: spec.shape,
        frame_id: spec.frame_id.clone(),
        child_frame_id: spec.child_frame_id.clone(),
        stamp: format_stamp(stamp),
        device_time: record.device_time,
        payload,
    }
}

fn with_covariance(values: Value, covariance: Option<&StaticCovariance>) -> Value {
    let (Value::Object(mut map), Some(cov)) = (values.clone(), covariance) else {
        return values;
    };
    map.insert("linear_acceleration_covariance".into(), json!(cov.linear_acceleration));
    map.insert("angular_velocity_covariance".into(), json!(cov.angular_velocity));
    map.insert("orientation_covariance".into(), json!(cov.orientation));
    Value::Object(map)
}

/// Time reference: the record's own GPS time when it carries one (the GNSS
/// time field), otherwise the device stamp.
fn time_reference(
    values: &Value,
    device_time: Option<GpsTime>,
    output: &OutputOptions,
    source: &str,
) -> Value {
    let own = match (values.get("week_number"), values.get("tow")) {
        (Some(week), Some(tow)) => week
            .as_u64()
            .zip(tow.as_f64())
            .map(|(week, tow)| GpsTime::new(week as u32, tow)),
        _ => None,
    };
    let time_ref = own
        .or(device_time)
        .and_then(|t| t.to_utc(output.gps_leap_seconds))
        .map(format_stamp);

    json!({ "time_ref": time_ref, "source": source })
}

/// Re-express every `{north, east, down}` object in ENU, in place.
pub fn ned_to_enu(value: &mut Value) {
    match value {
        Value::Object(map) => {
            if let Some(enu) = enu_from(map) {
                *map = enu;
                return;
            }
            for child in map.values_mut() {
                ned_to_enu(child);
            }
        }
        Value::Array(items) => items.iter_mut().for_each(ned_to_enu),
        _ => {}
    }
}

fn enu_from(map: &Map<String, Value>) -> Option<Map<String, Value>> {
    let north = map.get("north")?.as_f64()?;
    let east = map.get("east")?.as_f64()?;
    let down = map.get("down")?.as_f64()?;

    let mut enu = map.clone();
    enu.remove("down");
    enu.insert("east".into(), json!(east));
    enu.insert("north".into(), json!(north));
    enu.insert("up".into(), json!(-down));
    Some(enu)
}
