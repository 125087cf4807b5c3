//! Event trigger/action definitions.
//!
//! An event pairs one trigger (a GPIO pin state or a threshold crossing on a
//! streamed field) with one or more actions (driving a GPIO pin or emitting
//! a message). Only some trigger/action pairings make sense on the device;
//! [`compatible`] holds that table.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use crate::model::{DeviceCapabilities, FieldId, FirmwareFeatures};

/// GPIO trigger modes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum GpioTriggerMode {
    Disabled,
    High,
    Low,
    Edge,
}

/// Threshold comparison direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Comparator {
    Above,
    Below,
}

/// GPIO action modes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum GpioActionMode {
    Disabled,
    ActiveHigh,
    ActiveLow,
    OneshotHigh,
    OneshotLow,
    Toggle,
}

impl GpioActionMode {
    fn is_oneshot(&self) -> bool {
        matches!(self, GpioActionMode::OneshotHigh | GpioActionMode::OneshotLow)
    }

    fn is_active(&self) -> bool {
        matches!(self, GpioActionMode::ActiveHigh | GpioActionMode::ActiveLow)
    }
}

/// Condition that fires an event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Trigger {
    Gpio {
        pin: u8,
        mode: GpioTriggerMode,
    },
    Threshold {
        /// Streamed field to watch
        field: FieldId,
        /// Parameter index within the field
        #[serde(default)]
        parameter: u8,
        comparator: Comparator,
        value: f64,
    },
}

impl Trigger {
    /// Label like `GPIO EDGE` or `THRESHOLD`.
    pub fn label(&self) -> String {
        match self {
            Trigger::Gpio { mode, .. } => format!("GPIO {}", screaming(mode)),
            Trigger::Threshold { .. } => "THRESHOLD".to_string(),
        }
    }
}

/// Response to a fired trigger.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Action {
    Gpio { pin: u8, mode: GpioActionMode },
    Message { fields: Vec<FieldId> },
}

impl Action {
    /// Label like `GPIO TOGGLE` or `MESSAGE`.
    pub fn label(&self) -> String {
        match self {
            Action::Gpio { mode, .. } => format!("GPIO {}", screaming(mode)),
            Action::Message { .. } => "MESSAGE".to_string(),
        }
    }
}

fn screaming<T: Serialize>(value: &T) -> String {
    serde_json::to_value(value)
        .ok()
        .and_then(|v| v.as_str().map(String::from))
        .unwrap_or_default()
}

/// One event: a trigger and the actions it drives.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventDefinition {
    pub trigger: Trigger,
    pub actions: Vec<Action>,
}

impl EventDefinition {
    /// Definition that frees a device event slot: a disabled trigger with
    /// no actions. Pin 0 means no pin.
    pub fn disabled() -> Self {
        Self {
            trigger: Trigger::Gpio {
                pin: 0,
                mode: GpioTriggerMode::Disabled,
            },
            actions: Vec::new(),
        }
    }

    pub fn is_disabled(&self) -> bool {
        matches!(
            self.trigger,
            Trigger::Gpio {
                mode: GpioTriggerMode::Disabled,
                ..
            }
        ) && self.actions.is_empty()
    }
}

/// Event configuration errors.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EventError {
    #[error("{trigger} trigger cannot drive a {action} action")]
    IncompatibleTriggerAction { trigger: String, action: String },

    #[error("invalid event definition: {0}")]
    InvalidDefinition(String),

    #[error("device rejected event {instance}: {reason}")]
    DeviceRejected { instance: u8, reason: String },
}

/// Lifecycle of one event definition.
#[derive(Debug, Clone, PartialEq)]
pub enum EventState {
    Unconfigured,
    Validated,
    Applied,
    Active,
    Rejected(EventError),
}

/// Whether `trigger` may drive `action` on a device with `features`.
pub fn compatible(trigger: &Trigger, action: &Action, features: &FirmwareFeatures) -> bool {
    use GpioTriggerMode as T;

    match (trigger, action) {
        // A disabled output never conflicts.
        (_, Action::Gpio { mode: GpioActionMode::Disabled, .. }) => true,
        (Trigger::Gpio { mode: T::Disabled, .. }, _) => false,
        (_, Action::Message { .. }) => true,

        (Trigger::Gpio { mode: T::Edge, .. }, Action::Gpio { mode, .. }) => {
            mode.is_oneshot() || *mode == GpioActionMode::Toggle
        }
        (Trigger::Gpio { mode: T::High | T::Low, .. }, Action::Gpio { mode, .. }) => {
            mode.is_active() || mode.is_oneshot()
        }
        (Trigger::Threshold { .. }, Action::Gpio { mode, .. }) => {
            if mode.is_oneshot() {
                features.threshold_gpio_oneshot
            } else {
                mode.is_active() || *mode == GpioActionMode::Toggle
            }
        }
    }
}

/// Check an event definition against the compatibility table and the
/// device's capabilities.
pub fn validate(event: &EventDefinition, capabilities: &DeviceCapabilities) -> Result<(), EventError> {
    let features = &capabilities.features;

    if event.actions.is_empty() {
        return Err(EventError::InvalidDefinition(
            "event has no actions".to_string(),
        ));
    }
    if event.actions.len() > features.max_event_actions as usize {
        return Err(EventError::InvalidDefinition(format!(
            "event has {} actions, device allows {}",
            event.actions.len(),
            features.max_event_actions
        )));
    }

    let trigger_pin = match &event.trigger {
        Trigger::Gpio { pin, .. } => {
            check_pin(*pin, features)?;
            Some(*pin)
        }
        Trigger::Threshold { field, value, .. } => {
            if !capabilities.supports_field(*field) {
                return Err(EventError::InvalidDefinition(format!(
                    "threshold field {field} is not streamed by this device"
                )));
            }
            if !value.is_finite() {
                return Err(EventError::InvalidDefinition(
                    "threshold value must be finite".to_string(),
                ));
            }
            None
        }
    };

    for action in &event.actions {
        if !compatible(&event.trigger, action, features) {
            return Err(EventError::IncompatibleTriggerAction {
                trigger: event.trigger.label(),
                action: action.label(),
            });
        }

        match action {
            Action::Gpio { pin, .. } => {
                check_pin(*pin, features)?;
                if trigger_pin == Some(*pin) {
                    return Err(EventError::InvalidDefinition(format!(
                        "GPIO pin {pin} used as both trigger and action"
                    )));
                }
            }
            Action::Message { fields } => {
                if fields.is_empty() {
                    return Err(EventError::InvalidDefinition(
                        "message action lists no fields".to_string(),
                    ));
                }
                if let Some(field) = fields.iter().find(|f| !capabilities.supports_field(**f)) {
                    return Err(EventError::InvalidDefinition(format!(
                        "message field {field} is not streamed by this device"
                    )));
                }
            }
        }
    }

    Ok(())
}

fn check_pin(pin: u8, features: &FirmwareFeatures) -> Result<(), EventError> {
    if pin == 0 || pin > features.gpio_pins {
        return Err(EventError::InvalidDefinition(format!(
            "GPIO pin {pin} outside 1..={}",
            features.gpio_pins
        )));
    }
    Ok(())
}

impl fmt::Display for EventState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EventState::Unconfigured => f.write_str("unconfigured"),
            EventState::Validated => f.write_str("validated"),
            EventState::Applied => f.write_str("applied"),
            EventState::Active => f.write_str("active"),
            EventState::Rejected(err) => write!(f, "rejected ({err})"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::descriptors::*;
    use crate::model::Subsystem;

    fn caps(oneshot: bool) -> DeviceCapabilities {
        DeviceCapabilities::new("3DM-GQ7", "1.1.0")
            .with_subsystem(Subsystem::Imu, 1000, &[IMU_SCALED_ACCEL])
            .with_subsystem(Subsystem::Filter, 500, &[FILTER_VELOCITY_NED])
            .with_features(FirmwareFeatures {
                threshold_gpio_oneshot: oneshot,
                ..Default::default()
            })
    }

    fn gpio(pin: u8, mode: GpioTriggerMode) -> Trigger {
        Trigger::Gpio { pin, mode }
    }

    fn threshold() -> Trigger {
        Trigger::Threshold {
            field: FILTER_VELOCITY_NED,
            parameter: 0,
            comparator: Comparator::Above,
            value: 2.5,
        }
    }

    fn out(pin: u8, mode: GpioActionMode) -> Action {
        Action::Gpio { pin, mode }
    }

    #[test]
    fn test_edge_trigger_pairs_with_toggle() {
        let features = FirmwareFeatures::default();
        assert!(compatible(&gpio(1, GpioTriggerMode::Edge), &out(2, GpioActionMode::Toggle), &features));
        assert!(compatible(&gpio(1, GpioTriggerMode::Edge), &out(2, GpioActionMode::OneshotLow), &features));
        assert!(!compatible(&gpio(1, GpioTriggerMode::Edge), &out(2, GpioActionMode::ActiveHigh), &features));
    }

    #[test]
    fn test_level_trigger_rejects_toggle() {
        let features = FirmwareFeatures::default();
        assert!(compatible(&gpio(1, GpioTriggerMode::High), &out(2, GpioActionMode::ActiveLow), &features));
        assert!(!compatible(&gpio(1, GpioTriggerMode::Low), &out(2, GpioActionMode::Toggle), &features));
    }

    #[test]
    fn test_threshold_oneshot_depends_on_firmware() {
        let action = out(2, GpioActionMode::OneshotHigh);
        assert!(!compatible(&threshold(), &action, &FirmwareFeatures::default()));
        assert!(compatible(
            &threshold(),
            &action,
            &FirmwareFeatures {
                threshold_gpio_oneshot: true,
                ..Default::default()
            }
        ));
    }

    #[test]
    fn test_disabled_trigger() {
        let features = FirmwareFeatures::default();
        let trigger = gpio(1, GpioTriggerMode::Disabled);
        assert!(compatible(&trigger, &out(2, GpioActionMode::Disabled), &features));
        assert!(!compatible(&trigger, &Action::Message { fields: vec![IMU_SCALED_ACCEL] }, &features));
    }

    #[test]
    fn test_validate_reports_incompatible_pair() {
        let event = EventDefinition {
            trigger: threshold(),
            actions: vec![out(2, GpioActionMode::OneshotHigh)],
        };
        assert_eq!(
            validate(&event, &caps(false)),
            Err(EventError::IncompatibleTriggerAction {
                trigger: "THRESHOLD".to_string(),
                action: "GPIO ONESHOT_HIGH".to_string(),
            })
        );
        assert_eq!(validate(&event, &caps(true)), Ok(()));
    }

    #[test]
    fn test_validate_structure() {
        let caps = caps(false);

        let no_actions = EventDefinition {
            trigger: gpio(1, GpioTriggerMode::Edge),
            actions: vec![],
        };
        assert!(matches!(validate(&no_actions, &caps), Err(EventError::InvalidDefinition(_))));

        let bad_pin = EventDefinition {
            trigger: gpio(9, GpioTriggerMode::Edge),
            actions: vec![out(2, GpioActionMode::Toggle)],
        };
        assert!(matches!(validate(&bad_pin, &caps), Err(EventError::InvalidDefinition(_))));

        let same_pin = EventDefinition {
            trigger: gpio(2, GpioTriggerMode::Edge),
            actions: vec![out(2, GpioActionMode::Toggle)],
        };
        assert!(matches!(validate(&same_pin, &caps), Err(EventError::InvalidDefinition(_))));

        let unknown_field = EventDefinition {
            trigger: gpio(1, GpioTriggerMode::Edge),
            actions: vec![Action::Message { fields: vec![GNSS1_FIX_INFO] }],
        };
        assert!(matches!(validate(&unknown_field, &caps), Err(EventError::InvalidDefinition(_))));
    }

    #[test]
    fn test_disabled_definition() {
        let disabled = EventDefinition::disabled();
        assert!(disabled.is_disabled());
        assert!(!EventDefinition {
            trigger: gpio(1, GpioTriggerMode::Edge),
            actions: vec![],
        }
        .is_disabled());
        // never passes validation, so it cannot come from user settings
        assert!(validate(&disabled, &caps(false)).is_err());
    }

    #[test]
    fn test_event_definition_serde() {
        let json = serde_json::json!({
            "trigger": { "type": "GPIO", "pin": 1, "mode": "EDGE" },
            "actions": [
                { "type": "GPIO", "pin": 3, "mode": "TOGGLE" },
                { "type": "MESSAGE", "fields": [{ "descriptor_set": 128, "field_descriptor": 4 }] }
            ]
        });
        let event: EventDefinition = serde_json::from_value(json).unwrap();

        assert_eq!(event.trigger, gpio(1, GpioTriggerMode::Edge));
        assert_eq!(event.actions[0], out(3, GpioActionMode::Toggle));
        assert_eq!(event.actions[1], Action::Message { fields: vec![IMU_SCALED_ACCEL] });
        assert_eq!(validate(&event, &caps(false)), Ok(()));
    }
}
