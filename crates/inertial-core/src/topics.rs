//! Field to channel mapping.
//!
//! Each [`TopicRule`] ties one device field to one output channel. Several
//! rules may share a field, in which case one streamed field feeds several
//! channels (fan-out). Rules are plain data so a host can submit a new set
//! at runtime.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::OnceLock;
use thiserror::Error;

use crate::model::descriptors::*;
use crate::model::{FieldId, MessageShape, Subsystem};
use crate::rate::RateRequest;
use crate::settings::{DriverSettings, SettingFlag};

/// Placeholder replaced by the configured topic prefix.
pub const PREFIX_PLACEHOLDER: &str = "{prefix}";

fn channel_name_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^/?[A-Za-z_][A-Za-z0-9_]*(/[A-Za-z_][A-Za-z0-9_]*)*$")
            .expect("channel name pattern is valid")
    })
}

/// Errors raised while rendering channel names.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum TopicError {
    #[error("channel template '{template}' renders to invalid name '{rendered}'")]
    InvalidName { template: String, rendered: String },
}

/// Condition over the settings deciding whether a channel is enabled.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Predicate {
    #[default]
    Always,
    Never,
    /// Flag is set.
    Flag(SettingFlag),
    /// Flag is not set.
    Unset(SettingFlag),
    All(Vec<Predicate>),
    Any(Vec<Predicate>),
}

impl Predicate {
    pub fn eval(&self, settings: &DriverSettings) -> bool {
        match self {
            Predicate::Always => true,
            Predicate::Never => false,
            Predicate::Flag(flag) => settings.flag(*flag),
            Predicate::Unset(flag) => !settings.flag(*flag),
            Predicate::All(all) => all.iter().all(|p| p.eval(settings)),
            Predicate::Any(any) => any.iter().any(|p| p.eval(settings)),
        }
    }
}

/// One row of the mapping table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TopicRule {
    /// Field feeding the channel
    pub field: FieldId,
    /// Channel name template, may contain `{prefix}`
    pub channel: String,
    /// Message shape published on the channel
    pub shape: MessageShape,
    /// Rate when the settings carry no override; `None` uses the
    /// subsystem's data rate
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_rate: Option<RateRequest>,
    /// Settings condition enabling the channel
    #[serde(default)]
    pub enabled_when: Predicate,
}

impl TopicRule {
    pub fn new(field: FieldId, channel: &str, shape: MessageShape, enabled_when: Predicate) -> Self {
        Self {
            field,
            channel: channel.to_string(),
            shape,
            default_rate: None,
            enabled_when,
        }
    }

    pub fn with_rate(mut self, rate: RateRequest) -> Self {
        self.default_rate = Some(rate);
        self
    }

    /// Render the channel name for `settings`.
    pub fn render_name(&self, settings: &DriverSettings) -> Result<String, TopicError> {
        let prefix = settings.topic_prefix.trim_end_matches('/');
        let rendered = if prefix.is_empty() {
            self.channel
                .replace(PREFIX_PLACEHOLDER, "")
                .trim_start_matches('/')
                .to_string()
        } else {
            self.channel
                .replace(PREFIX_PLACEHOLDER, &format!("{prefix}/"))
        };

        if channel_name_pattern().is_match(&rendered) {
            Ok(rendered)
        } else {
            Err(TopicError::InvalidName {
                template: self.channel.clone(),
                rendered,
            })
        }
    }
}

/// Channel as declared by the mapping for one settings document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelDescriptor {
    /// Rendered channel name, unique within a channel set
    pub name: String,
    /// Field feeding this channel
    pub field: FieldId,
    pub shape: MessageShape,
    /// Requested publish rate
    pub rate: RateRequest,
    pub frame_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub child_frame_id: Option<String>,
    pub enabled: bool,
}

/// The mapping table with a hashed field index.
#[derive(Debug, Clone, PartialEq)]
pub struct TopicMapping {
    rules: Vec<TopicRule>,
    index: HashMap<FieldId, Vec<usize>>,
}

impl TopicMapping {
    pub fn new(rules: Vec<TopicRule>) -> Self {
        let mut index: HashMap<FieldId, Vec<usize>> = HashMap::new();
        for (i, rule) in rules.iter().enumerate() {
            index.entry(rule.field).or_default().push(i);
        }
        Self { rules, index }
    }

    /// The table shipped with the driver.
    pub fn standard() -> Self {
        use MessageShape as M;
        use Predicate::{All, Flag, Unset};
        use SettingFlag as S;

        Self::new(vec![
            // IMU
            TopicRule::new(IMU_SCALED_ACCEL, "{prefix}imu/data", M::Imu, Flag(S::PublishImu)),
            TopicRule::new(
                IMU_SCALED_ACCEL,
                "{prefix}imu/time_ref",
                M::TimeReference,
                All(vec![Flag(S::PublishImu), Unset(S::UseDeviceTimestamp)]),
            ),
            TopicRule::new(IMU_SCALED_MAG, "{prefix}imu/mag", M::MagneticField, Flag(S::PublishImu)),
            TopicRule::new(
                IMU_GPS_CORRELATION_TIMESTAMP,
                "{prefix}gps_corr",
                M::GpsCorrelationTimestamp,
                Flag(S::PublishGpsCorr),
            ),
            // GNSS-1
            TopicRule::new(GNSS1_LLH_POSITION, "{prefix}gnss1/fix", M::NavSatFix, Flag(S::PublishGnss1)),
            TopicRule::new(GNSS1_LLH_POSITION, "{prefix}gnss1/odom", M::Odometry, Flag(S::PublishGnss1)),
            TopicRule::new(GNSS1_GPS_TIME, "{prefix}gnss1/time_ref", M::TimeReference, Flag(S::PublishGnss1)),
            TopicRule::new(GNSS1_FIX_INFO, "{prefix}gnss1/fix_info", M::GnssFixInfo, Flag(S::PublishGnss1)),
            // GNSS-2
            TopicRule::new(GNSS2_LLH_POSITION, "{prefix}gnss2/fix", M::NavSatFix, Flag(S::PublishGnss2)),
            TopicRule::new(GNSS2_LLH_POSITION, "{prefix}gnss2/odom", M::Odometry, Flag(S::PublishGnss2)),
            TopicRule::new(GNSS2_GPS_TIME, "{prefix}gnss2/time_ref", M::TimeReference, Flag(S::PublishGnss2)),
            TopicRule::new(GNSS2_FIX_INFO, "{prefix}gnss2/fix_info", M::GnssFixInfo, Flag(S::PublishGnss2)),
            // RTK
            TopicRule::new(RTK_CORRECTIONS_STATUS, "{prefix}rtk/status", M::RtkStatus, Flag(S::PublishRtk)),
            // Filter
            TopicRule::new(FILTER_STATUS, "{prefix}nav/status", M::FilterStatus, Flag(S::PublishFilter)),
            TopicRule::new(FILTER_POSITION_LLH, "{prefix}nav/odom", M::Odometry, Flag(S::PublishFilter)),
            TopicRule::new(FILTER_EULER_ANGLES, "{prefix}nav/heading", M::FilterHeading, Flag(S::PublishFilter)),
            TopicRule::new(
                FILTER_COMPENSATED_ANGULAR_RATE,
                "{prefix}nav/filtered_imu/data",
                M::FilteredImu,
                Flag(S::PublishFilter),
            ),
            TopicRule::new(
                FILTER_REL_POS_NED,
                "{prefix}nav/relative_pos/odom",
                M::RelativePosition,
                All(vec![Flag(S::PublishFilter), Flag(S::PublishFilterRelativePos)]),
            ),
            TopicRule::new(
                FILTER_AIDING_MEASUREMENT_SUMMARY,
                "{prefix}nav/aiding_summary",
                M::AidingMeasurementSummary,
                All(vec![
                    Flag(S::PublishFilter),
                    Flag(S::PublishFilterAidingMeasurementSummary),
                ]),
            ),
            TopicRule::new(
                FILTER_GNSS_DUAL_ANTENNA_STATUS,
                "{prefix}nav/dual_antenna_status",
                M::DualAntennaStatus,
                All(vec![Flag(S::PublishFilter), Flag(S::PublishGnssDualAntennaStatus)]),
            ),
        ])
    }

    pub fn rules(&self) -> &[TopicRule] {
        &self.rules
    }

    /// Mapped fields of a subsystem, in first-declaration order.
    pub fn fields(&self, subsystem: Subsystem) -> Vec<FieldId> {
        let mut fields = Vec::new();
        for rule in &self.rules {
            if rule.field.subsystem() == Some(subsystem) && !fields.contains(&rule.field) {
                fields.push(rule.field);
            }
        }
        fields
    }

    /// Fields whose descriptor set belongs to no known subsystem.
    pub fn unknown_fields(&self) -> Vec<FieldId> {
        let mut fields = Vec::new();
        for rule in &self.rules {
            if rule.field.subsystem().is_none() && !fields.contains(&rule.field) {
                fields.push(rule.field);
            }
        }
        fields
    }

    /// Channels fed by `field`, in declaration order.
    pub fn build_channels(
        &self,
        field: FieldId,
        settings: &DriverSettings,
    ) -> Result<Vec<ChannelDescriptor>, TopicError> {
        let Some(rows) = self.index.get(&field) else {
            return Ok(Vec::new());
        };

        let subsystem = field.subsystem();
        rows.iter()
            .map(|&i| {
                let rule = &self.rules[i];
                let name = rule.render_name(settings)?;
                let rate = settings
                    .channel_rates
                    .get(&name)
                    .copied()
                    .or(rule.default_rate)
                    .or_else(|| subsystem.map(|s| settings.data_rate(s)))
                    .unwrap_or_default();
                let frame_id = subsystem
                    .map(|s| settings.frame_id(s).to_string())
                    .unwrap_or_default();
                let child_frame_id = (subsystem == Some(Subsystem::Filter)
                    && rule.shape == MessageShape::Odometry)
                    .then(|| settings.filter_child_frame_id.clone());

                Ok(ChannelDescriptor {
                    name,
                    field,
                    shape: rule.shape,
                    rate,
                    frame_id,
                    child_frame_id,
                    enabled: rule.enabled_when.eval(settings),
                })
            })
            .collect()
    }
}

impl Default for TopicMapping {
    fn default() -> Self {
        Self::standard()
    }
}
