//! Event configurator.
//!
//! Walks each event definition through
//! `Unconfigured -> Validated -> Applied -> Active`, or into `Rejected`
//! at the step that failed. Instance ids are assigned from 1 in declaration
//! order. Device slots armed by an earlier pass and not reused are cleared
//! on the next apply.

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tracing::{debug, info, warn};

use inertial_core::events::validate;
use inertial_core::{DeviceCapabilities, EventDefinition, EventError, EventState};
use inertial_protocol::{DeviceHandle, Reply};

use crate::coordinator::ApplyError;

/// One event and where it is in its lifecycle.
#[derive(Debug, Clone, PartialEq)]
pub struct TrackedEvent {
    pub instance: u8,
    pub definition: EventDefinition,
    pub state: EventState,
}

#[derive(Debug, Default)]
pub struct EventConfigurator {
    events: Vec<TrackedEvent>,
    /// Slots the device accepted a definition for and has not cleared
    armed: BTreeSet<u8>,
}

impl EventConfigurator {
    pub fn new() -> Self {
        Self::default()
    }

    /// A configurator tracking `definitions` that inherits the armed device
    /// slots of this one. Leaves `self` untouched.
    pub fn successor(&self, definitions: &[EventDefinition]) -> Self {
        let mut next = Self {
            events: Vec::new(),
            armed: self.armed.clone(),
        };
        next.load(definitions);
        next
    }

    /// Replace the tracked events. Every event starts `Unconfigured`.
    pub fn load(&mut self, definitions: &[EventDefinition]) {
        self.events = definitions
            .iter()
            .enumerate()
            .map(|(i, definition)| TrackedEvent {
                instance: u8::try_from(i + 1).unwrap_or(u8::MAX),
                definition: definition.clone(),
                state: EventState::Unconfigured,
            })
            .collect();
    }

    /// Force every event back to `Unconfigured`.
    pub fn reset(&mut self) {
        for event in &mut self.events {
            event.state = EventState::Unconfigured;
        }
    }

    /// `Unconfigured -> Validated`, or `Rejected`.
    pub fn validate(&mut self, caps: &DeviceCapabilities) {
        for event in &mut self.events {
            if event.state != EventState::Unconfigured {
                continue;
            }
            event.state = match validate(&event.definition, caps) {
                Ok(()) => EventState::Validated,
                Err(err) => {
                    warn!(instance = event.instance, error = %err, "Event rejected");
                    EventState::Rejected(err)
                }
            };
        }
    }

    /// Clear freed slots, send validated events to the device, then confirm
    /// them.
    ///
    /// Device rejections land in the event's state. Transport failures and
    /// cancellation abort the pass.
    pub fn apply<D>(&mut self, device: &mut D, timeout: Duration, cancel: &AtomicBool) -> Result<(), ApplyError>
    where
        D: DeviceHandle + ?Sized,
    {
        let mut completed = 0;

        // Armed slots no validated event overwrites
        let in_use: BTreeSet<u8> = self
            .events
            .iter()
            .filter(|e| e.state == EventState::Validated)
            .map(|e| e.instance)
            .collect();
        let freed: Vec<u8> = self.armed.difference(&in_use).copied().collect();
        let disabled = EventDefinition::disabled();
        for instance in freed {
            if cancel.load(Ordering::Acquire) {
                return Err(ApplyError::Cancelled { completed });
            }
            let reply = device
                .set_event_config(instance, &disabled, timeout)
                .map_err(|source| ApplyError::Event { instance, source })?;
            completed += 1;
            match reply {
                Reply::Ack => {
                    self.armed.remove(&instance);
                    debug!(instance, "Event slot cleared");
                }
                Reply::Nack(reason) => {
                    warn!(instance, %reason, "Device refused to clear event slot");
                }
            }
        }

        // Validated -> Applied
        for event in &mut self.events {
            if event.state != EventState::Validated {
                continue;
            }
            if cancel.load(Ordering::Acquire) {
                return Err(ApplyError::Cancelled { completed });
            }
            let reply = device
                .set_event_config(event.instance, &event.definition, timeout)
                .map_err(|source| ApplyError::Event {
                    instance: event.instance,
                    source,
                })?;
            completed += 1;
            event.state = match reply {
                Reply::Ack => {
                    self.armed.insert(event.instance);
                    debug!(instance = event.instance, trigger = %event.definition.trigger.label(), "Event applied");
                    EventState::Applied
                }
                Reply::Nack(reason) => {
                    warn!(instance = event.instance, %reason, "Device rejected event");
                    EventState::Rejected(EventError::DeviceRejected {
                        instance: event.instance,
                        reason,
                    })
                }
            };
        }

        // Applied -> Active
        for event in &mut self.events {
            if event.state != EventState::Applied {
                continue;
            }
            if cancel.load(Ordering::Acquire) {
                return Err(ApplyError::Cancelled { completed });
            }
            let reply = device
                .event_status(event.instance, timeout)
                .map_err(|source| ApplyError::Event {
                    instance: event.instance,
                    source,
                })?;
            completed += 1;
            event.state = match reply {
                Reply::Ack => EventState::Active,
                Reply::Nack(reason) => {
                    warn!(instance = event.instance, %reason, "Event not armed by device");
                    EventState::Rejected(EventError::DeviceRejected {
                        instance: event.instance,
                        reason,
                    })
                }
            };
        }

        if !self.events.is_empty() {
            info!(
                active = self.active_count(),
                rejected = self.rejections().len(),
                "Events configured"
            );
        }
        Ok(())
    }

    /// Device slots currently holding a definition sent by this driver.
    pub fn armed(&self) -> Vec<u8> {
        self.armed.iter().copied().collect()
    }

    pub fn events(&self) -> &[TrackedEvent] {
        &self.events
    }

    pub fn state(&self, instance: u8) -> Option<&EventState> {
        self.events
            .iter()
            .find(|e| e.instance == instance)
            .map(|e| &e.state)
    }

    pub fn active_count(&self) -> usize {
        self.events
            .iter()
            .filter(|e| e.state == EventState::Active)
            .count()
    }

    /// Rejected events with their errors.
    pub fn rejections(&self) -> Vec<(u8, EventError)> {
        self.events
            .iter()
            .filter_map(|e| match &e.state {
                EventState::Rejected(err) => Some((e.instance, err.clone())),
                _ => None,
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use inertial_core::descriptors::*;
    use inertial_core::events::{Action, Comparator, GpioActionMode, GpioTriggerMode, Trigger};
    use inertial_core::FirmwareFeatures;
    use inertial_protocol::{DeviceCommand, DeviceError};
    use inertial_providers::SimulatedDevice;

    use crate::probe::CapabilityProbe;

    const TIMEOUT: Duration = Duration::from_millis(50);

    fn edge_toggle(input: u8, output: u8) -> EventDefinition {
        EventDefinition {
            trigger: Trigger::Gpio {
                pin: input,
                mode: GpioTriggerMode::Edge,
            },
            actions: vec![Action::Gpio {
                pin: output,
                mode: GpioActionMode::Toggle,
            }],
        }
    }

    fn threshold_oneshot() -> EventDefinition {
        EventDefinition {
            trigger: Trigger::Threshold {
                field: FILTER_VELOCITY_NED,
                parameter: 0,
                comparator: Comparator::Above,
                value: 2.5,
            },
            actions: vec![Action::Gpio {
                pin: 2,
                mode: GpioActionMode::OneshotHigh,
            }],
        }
    }

    fn caps(device: &SimulatedDevice) -> DeviceCapabilities {
        CapabilityProbe::capabilities(device.info()).unwrap()
    }

    fn event_commands(device: &SimulatedDevice) -> usize {
        device
            .commands()
            .iter()
            .filter(|c| matches!(c, DeviceCommand::SetEventConfig { .. }))
            .count()
    }

    #[test]
    fn test_valid_event_becomes_active() {
        let mut device = SimulatedDevice::gq7();
        let mut events = EventConfigurator::new();
        events.load(&[edge_toggle(1, 2)]);
        events.validate(&caps(&device));
        assert_eq!(events.state(1), Some(&EventState::Validated));

        events.apply(&mut device, TIMEOUT, &AtomicBool::new(false)).unwrap();
        assert_eq!(events.state(1), Some(&EventState::Active));
        assert_eq!(events.active_count(), 1);
        assert!(events.rejections().is_empty());
    }

    #[test]
    fn test_incompatible_event_never_reaches_device() {
        let mut device = SimulatedDevice::gq7();
        let mut events = EventConfigurator::new();
        events.load(&[threshold_oneshot(), edge_toggle(1, 3)]);
        events.validate(&caps(&device));
        events.apply(&mut device, TIMEOUT, &AtomicBool::new(false)).unwrap();

        assert!(matches!(
            events.state(1),
            Some(EventState::Rejected(EventError::IncompatibleTriggerAction { .. }))
        ));
        assert_eq!(events.state(2), Some(&EventState::Active));
        assert_eq!(event_commands(&device), 1);
    }

    #[test]
    fn test_device_limit_rejects_extra_instance() {
        let mut device = SimulatedDevice::gq7().with_features(FirmwareFeatures {
            max_event_triggers: 1,
            ..Default::default()
        });
        let mut events = EventConfigurator::new();
        events.load(&[edge_toggle(1, 2), edge_toggle(3, 4)]);
        events.validate(&caps(&device));
        events.apply(&mut device, TIMEOUT, &AtomicBool::new(false)).unwrap();

        assert_eq!(events.state(1), Some(&EventState::Active));
        let rejections = events.rejections();
        assert_eq!(rejections.len(), 1);
        assert!(matches!(rejections[0], (2, EventError::DeviceRejected { instance: 2, .. })));
    }

    #[test]
    fn test_unarmed_event_is_rejected_after_apply() {
        let mut device = SimulatedDevice::gq7().with_unarmed_event(1);
        let mut events = EventConfigurator::new();
        events.load(&[edge_toggle(1, 2)]);
        events.validate(&caps(&device));
        events.apply(&mut device, TIMEOUT, &AtomicBool::new(false)).unwrap();

        assert!(matches!(
            events.state(1),
            Some(EventState::Rejected(EventError::DeviceRejected { .. }))
        ));
    }

    #[test]
    fn test_cancelled_before_first_event() {
        let mut device = SimulatedDevice::gq7();
        let mut events = EventConfigurator::new();
        events.load(&[edge_toggle(1, 2)]);
        events.validate(&caps(&device));

        let err = events.apply(&mut device, TIMEOUT, &AtomicBool::new(true)).unwrap_err();
        assert_eq!(err, ApplyError::Cancelled { completed: 0 });
        assert_eq!(events.state(1), Some(&EventState::Validated));
        assert_eq!(event_commands(&device), 0);
    }

    #[test]
    fn test_transport_failure_aborts() {
        let healthy = SimulatedDevice::gq7();
        let mut events = EventConfigurator::new();
        events.load(&[edge_toggle(1, 2)]);
        events.validate(&caps(&healthy));

        let mut silent = healthy.unresponsive();
        let err = events.apply(&mut silent, TIMEOUT, &AtomicBool::new(false)).unwrap_err();
        assert_eq!(
            err,
            ApplyError::Event {
                instance: 1,
                source: DeviceError::Timeout(TIMEOUT),
            }
        );
    }

    #[test]
    fn test_freed_slot_is_cleared() {
        let mut device = SimulatedDevice::gq7();
        let cancel = AtomicBool::new(false);
        let mut first = EventConfigurator::new();
        first.load(&[edge_toggle(1, 2), edge_toggle(3, 4)]);
        first.validate(&caps(&device));
        first.apply(&mut device, TIMEOUT, &cancel).unwrap();
        assert_eq!(first.armed(), vec![1, 2]);
        assert_eq!(device.armed_events(), vec![1, 2]);

        let mut second = first.successor(&[edge_toggle(3, 4)]);
        assert_eq!(first.events().len(), 2);
        second.validate(&caps(&device));
        device.clear_log();
        second.apply(&mut device, TIMEOUT, &cancel).unwrap();

        assert_eq!(second.armed(), vec![1]);
        assert_eq!(device.armed_events(), vec![1]);
        assert_eq!(second.state(1), Some(&EventState::Active));
        assert_eq!(event_commands(&device), 2);
    }

    #[test]
    fn test_reset_and_reload() {
        let device = SimulatedDevice::gq7();
        let mut events = EventConfigurator::new();
        events.load(&[edge_toggle(1, 2)]);
        events.validate(&caps(&device));
        events.reset();
        assert_eq!(events.state(1), Some(&EventState::Unconfigured));

        events.load(&[]);
        assert!(events.events().is_empty());
    }
}
