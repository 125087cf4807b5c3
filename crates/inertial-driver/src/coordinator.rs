//! Streaming command planning and application.
//!
//! The device holds one decimation per field, whatever the number of
//! channels fed by it. The fastest enabled channel sets the device
//! decimation; slower channels decimate further in the publisher pool.
//! A field with no enabled channel is switched off.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info, warn};

use inertial_core::{DeviceSetting, FieldId, ResolvedConfig, ResolvedRate, Subsystem};
use inertial_protocol::{DeviceError, DeviceHandle, Reply};

/// Errors raised while applying a plan to the device.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ApplyError {
    #[error("device rejected streaming {field} at decimation {decimation:?} for {subsystem}: {reason}")]
    DeviceRejected {
        subsystem: Subsystem,
        field: FieldId,
        decimation: Option<u32>,
        reason: String,
    },

    #[error("device rejected setting {setting} for {subsystem}: {reason}")]
    SettingRejected {
        subsystem: Subsystem,
        setting: String,
        reason: String,
    },

    #[error("{subsystem}: {source}")]
    Device {
        subsystem: Subsystem,
        #[source]
        source: DeviceError,
    },

    #[error("event {instance}: {source}")]
    Event {
        instance: u8,
        #[source]
        source: DeviceError,
    },

    #[error("configuration cancelled after {completed} commands")]
    Cancelled { completed: usize },
}

/// One streaming command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StreamCommand {
    pub field: FieldId,
    /// `None` switches the field off
    pub decimation: Option<u32>,
}

/// Commands for one subsystem, in issue order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SubsystemPlan {
    pub subsystem: Subsystem,
    pub settings: Vec<DeviceSetting>,
    pub streams: Vec<StreamCommand>,
}

/// Every command a configuration pass issues.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct StreamingPlan {
    pub subsystems: Vec<SubsystemPlan>,
}

impl StreamingPlan {
    /// Decimation the device streams `field` at, `None` when off or absent.
    pub fn device_decimation(&self, field: FieldId) -> Option<u32> {
        self.subsystems
            .iter()
            .flat_map(|s| s.streams.iter())
            .find(|c| c.field == field)
            .and_then(|c| c.decimation)
    }

    pub fn subsystem(&self, subsystem: Subsystem) -> Option<&SubsystemPlan> {
        self.subsystems.iter().find(|s| s.subsystem == subsystem)
    }

    pub fn command_count(&self) -> usize {
        self.subsystems
            .iter()
            .map(|s| s.settings.len() + s.streams.len())
            .sum()
    }

    /// Every streaming command of this plan, without device settings. Used
    /// when the device's streaming state is not known.
    pub fn streams_only(&self) -> Self {
        Self {
            subsystems: self
                .subsystems
                .iter()
                .filter(|s| !s.streams.is_empty())
                .map(|s| SubsystemPlan {
                    subsystem: s.subsystem,
                    settings: Vec::new(),
                    streams: s.streams.clone(),
                })
                .collect(),
        }
    }

    fn streams(&self, field: FieldId) -> bool {
        self.subsystems
            .iter()
            .flat_map(|s| s.streams.iter())
            .any(|c| c.field == field)
    }

    /// Streaming commands whose decimation differs from `previous`, without
    /// device settings. Fields `previous` streamed that this plan no longer
    /// maps are switched off. Used when only the channel set changes.
    pub fn changes_from(&self, previous: &StreamingPlan) -> Self {
        let mut subsystems: Vec<SubsystemPlan> = self
            .subsystems
            .iter()
            .map(|s| SubsystemPlan {
                subsystem: s.subsystem,
                settings: Vec::new(),
                streams: s
                    .streams
                    .iter()
                    .filter(|c| previous.device_decimation(c.field) != c.decimation)
                    .copied()
                    .collect(),
            })
            .collect();

        for prev in &previous.subsystems {
            let orphaned: Vec<StreamCommand> = prev
                .streams
                .iter()
                .filter(|c| c.decimation.is_some() && !self.streams(c.field))
                .map(|c| StreamCommand {
                    field: c.field,
                    decimation: None,
                })
                .collect();
            if orphaned.is_empty() {
                continue;
            }
            match subsystems.iter_mut().find(|s| s.subsystem == prev.subsystem) {
                Some(sub) => sub.streams.extend(orphaned),
                None => subsystems.push(SubsystemPlan {
                    subsystem: prev.subsystem,
                    settings: Vec::new(),
                    streams: orphaned,
                }),
            }
        }

        subsystems.retain(|s| !s.streams.is_empty());
        subsystems.sort_by_key(|s| s.subsystem);
        Self { subsystems }
    }
}

/// Plans and issues device streaming commands.
pub struct DataRateCoordinator;

impl DataRateCoordinator {
    /// Commands implied by `resolved`. Pure.
    pub fn plan(resolved: &ResolvedConfig) -> StreamingPlan {
        let subsystems = resolved
            .subsystems
            .iter()
            .map(|config| SubsystemPlan {
                subsystem: config.subsystem,
                settings: config.settings.clone(),
                streams: config
                    .streams
                    .iter()
                    .map(|stream| StreamCommand {
                        field: stream.field,
                        decimation: stream.requests.iter().map(|r| r.decimation).min(),
                    })
                    .collect(),
            })
            .collect();

        StreamingPlan { subsystems }
    }

    /// Rewrite each channel's rate to what it publishes at once the device
    /// decimation of its field is fixed: `native / (device * client)`.
    ///
    /// Channels whose rate moved get a warning, also appended to
    /// `resolved.warnings`. Channels on a field the device does not stream
    /// keep their own resolution.
    pub fn reconcile(resolved: &mut ResolvedConfig, plan: &StreamingPlan) -> Vec<String> {
        let mut warnings = Vec::new();

        for channel in &mut resolved.channels {
            let Some(device) = plan.device_decimation(channel.descriptor.field) else {
                continue;
            };
            let client = channel.resolved.relative_to(device);
            let decimation = device.saturating_mul(client);
            if decimation == channel.resolved.decimation {
                continue;
            }

            let effective = ResolvedRate {
                decimation,
                achieved_hz: channel.native_rate_hz as f64 / decimation as f64,
            };
            warnings.push(format!(
                "channel {} publishes at {:.3} Hz instead of {:.3} Hz (device decimation {device})",
                channel.descriptor.name, effective.achieved_hz, channel.resolved.achieved_hz
            ));
            channel.resolved = effective;
        }

        resolved.warnings.extend(warnings.iter().cloned());
        warnings
    }

    /// Plan `resolved` and issue the commands.
    pub fn apply<D>(
        device: &mut D,
        resolved: &ResolvedConfig,
        timeout: Duration,
        cancel: &AtomicBool,
    ) -> Result<StreamingPlan, ApplyError>
    where
        D: DeviceHandle + ?Sized,
    {
        let plan = Self::plan(resolved);
        Self::issue(device, &plan, timeout, cancel)?;
        Ok(plan)
    }

    /// Issue `plan` in order: per subsystem, settings first, then streams.
    ///
    /// Stops at the first failure. Commands already acknowledged stay in
    /// effect on the device. `cancel` is checked between commands.
    pub fn issue<D>(
        device: &mut D,
        plan: &StreamingPlan,
        timeout: Duration,
        cancel: &AtomicBool,
    ) -> Result<(), ApplyError>
    where
        D: DeviceHandle + ?Sized,
    {
        let mut completed = 0;

        for sub in &plan.subsystems {
            let subsystem = sub.subsystem;
            debug!(%subsystem, settings = sub.settings.len(), streams = sub.streams.len(), "Configuring subsystem");

            for setting in &sub.settings {
                check_cancel(cancel, completed)?;
                let reply = device
                    .write_setting(setting, timeout)
                    .map_err(|source| ApplyError::Device { subsystem, source })?;
                if let Reply::Nack(reason) = reply {
                    warn!(%subsystem, setting = setting.name(), %reason, "Setting rejected");
                    return Err(ApplyError::SettingRejected {
                        subsystem,
                        setting: setting.name().to_string(),
                        reason,
                    });
                }
                completed += 1;
            }

            for command in &sub.streams {
                check_cancel(cancel, completed)?;
                let reply = device
                    .set_streaming(command.field, command.decimation, timeout)
                    .map_err(|source| ApplyError::Device { subsystem, source })?;
                if let Reply::Nack(reason) = reply {
                    warn!(%subsystem, field = %command.field, decimation = ?command.decimation, %reason, "Streaming command rejected");
                    return Err(ApplyError::DeviceRejected {
                        subsystem,
                        field: command.field,
                        decimation: command.decimation,
                        reason,
                    });
                }
                debug!(%subsystem, field = %command.field, decimation = ?command.decimation, "Streaming configured");
                completed += 1;
            }
        }

        info!(commands = completed, "Device streaming configured");
        Ok(())
    }
}

fn check_cancel(cancel: &AtomicBool, completed: usize) -> Result<(), ApplyError> {
    if cancel.load(Ordering::Acquire) {
        Err(ApplyError::Cancelled { completed })
    } else {
        Ok(())
    }
}
