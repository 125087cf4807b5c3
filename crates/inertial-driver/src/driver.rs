//! The driver session.
//!
//! [`InertialDriver`] owns the device handle for the lifetime of a
//! connection and runs the configuration path:
//! settings -> resolution -> streaming commands -> events -> channel set.
//! Telemetry dispatch runs elsewhere through a [`Dispatcher`].

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tracing::{error, info, warn};
use uuid::Uuid;

use inertial_core::{
    ConfigurationResolver, DeviceCapabilities, DriverSettings, EventError, ResolvedConfig,
    TopicMapping, TopicRule,
};
use inertial_protocol::DeviceHandle;

use crate::coordinator::{DataRateCoordinator, StreamingPlan};
use crate::error::DriverError;
use crate::events::EventConfigurator;
use crate::pool::DEFAULT_QUEUE_DEPTH;
use crate::probe::CapabilityProbe;
use crate::router::{Dispatcher, Router};

/// Options for opening a session.
#[derive(Debug, Clone)]
pub struct DriverOptions {
    /// Bound on the capability query
    pub probe_timeout: Duration,
    /// Mapping used until the host submits its own rules
    pub mapping: TopicMapping,
    /// Initial channel queue depth, replaced by the settings on configure
    pub queue_depth: usize,
}

impl Default for DriverOptions {
    fn default() -> Self {
        Self {
            probe_timeout: Duration::from_secs(1),
            mapping: TopicMapping::standard(),
            queue_depth: DEFAULT_QUEUE_DEPTH,
        }
    }
}

/// Requests cancellation of an in-flight configuration pass.
#[derive(Debug, Clone, Default)]
pub struct ShutdownHandle(Arc<AtomicBool>);

impl ShutdownHandle {
    pub fn request(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn is_requested(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// Summary of a successful configuration pass.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConfigureReport {
    pub session_id: Uuid,
    pub commands: usize,
    pub channels: usize,
    pub warnings: Vec<String>,
    #[serde(skip)]
    pub rejected_events: Vec<(u8, EventError)>,
}

/// A connected driver session.
pub struct InertialDriver<D: DeviceHandle> {
    session_id: Uuid,
    device: D,
    capabilities: DeviceCapabilities,
    mapping: TopicMapping,
    settings: Option<DriverSettings>,
    resolved: Option<ResolvedConfig>,
    plan: Option<StreamingPlan>,
    events: EventConfigurator,
    router: Arc<Router>,
    shutdown: ShutdownHandle,
}

impl<D: DeviceHandle> InertialDriver<D> {
    /// Probe the device and open a session.
    pub fn connect(mut device: D, options: DriverOptions) -> Result<Self, DriverError> {
        let session_id = Uuid::new_v4();
        let capabilities = CapabilityProbe::probe(&mut device, options.probe_timeout)?;
        info!(session = %session_id, model = %capabilities.model_name, "Driver session opened");

        Ok(Self {
            session_id,
            device,
            capabilities,
            mapping: options.mapping,
            settings: None,
            resolved: None,
            plan: None,
            events: EventConfigurator::new(),
            router: Arc::new(Router::new(options.queue_depth)),
            shutdown: ShutdownHandle::default(),
        })
    }

    /// Apply a raw settings document. Every failure is logged; returns
    /// whether the pass fully succeeded.
    pub fn configure(&mut self, raw: &serde_json::Value) -> bool {
        match self.try_configure(raw) {
            Ok(report) => {
                for (instance, err) in &report.rejected_events {
                    error!(session = %self.session_id, instance, error = %err, "Event not configured");
                }
                report.rejected_events.is_empty()
            }
            Err(err) => {
                error!(
                    session = %self.session_id,
                    error = %err,
                    device_touched = err.touched_device(),
                    "Configuration failed"
                );
                false
            }
        }
    }

    /// Apply a raw settings document, returning the typed error.
    ///
    /// Validation failures leave the device untouched. A device rejection
    /// stops the pass; commands already acknowledged are not rolled back and
    /// the previous channel set stays installed.
    pub fn try_configure(&mut self, raw: &serde_json::Value) -> Result<ConfigureReport, DriverError> {
        let result = self.run_configuration(raw);
        let ok = matches!(&result, Ok(report) if report.rejected_events.is_empty());
        self.router.stats().configuration_finished(ok);
        result
    }

    fn run_configuration(&mut self, raw: &serde_json::Value) -> Result<ConfigureReport, DriverError> {
        let settings = DriverSettings::from_value(raw)?;
        let mut resolved = ConfigurationResolver::resolve(&settings, &self.capabilities, &self.mapping)?;
        for warning in &resolved.warnings {
            warn!(session = %self.session_id, "{warning}");
        }

        let mut events = self.events.successor(&resolved.events);
        events.validate(&self.capabilities);

        let timeout = Duration::from_millis(settings.command_timeout_ms);
        let plan = match DataRateCoordinator::apply(&mut self.device, &resolved, timeout, &self.shutdown.0) {
            Ok(plan) => plan,
            Err(err) => {
                self.plan = None;
                return Err(err.into());
            }
        };
        for warning in DataRateCoordinator::reconcile(&mut resolved, &plan) {
            warn!(session = %self.session_id, "{warning}");
        }

        // Kept even when the pass aborts so the slots it armed stay tracked
        let applied = events.apply(&mut self.device, timeout, &self.shutdown.0);
        self.events = events;
        if let Err(err) = applied {
            self.plan = None;
            return Err(err.into());
        }
        self.router.install(&resolved, &plan);

        let report = ConfigureReport {
            session_id: self.session_id,
            commands: plan.command_count(),
            channels: resolved.channels.len(),
            warnings: resolved.warnings.clone(),
            rejected_events: self.events.rejections(),
        };
        info!(
            session = %self.session_id,
            commands = report.commands,
            channels = report.channels,
            "Configuration applied"
        );

        self.settings = Some(settings);
        self.resolved = Some(resolved);
        self.plan = Some(plan);
        Ok(report)
    }

    /// Swap in a new rule set without reconnecting.
    ///
    /// Re-resolves against the stored settings, re-issues only the streaming
    /// commands whose decimation changed, then swaps the channel set.
    /// Channels that persist keep their resource. Returns dropped channels.
    ///
    /// After a failed pass the device state is unknown, so the next one
    /// re-issues every streaming command.
    pub fn reconfigure_publishers(&mut self, rules: Vec<TopicRule>) -> Result<Vec<String>, DriverError> {
        let settings = self.settings.as_ref().ok_or(DriverError::NotConfigured)?;
        let mapping = TopicMapping::new(rules);
        let mut resolved = ConfigurationResolver::resolve(settings, &self.capabilities, &mapping)?;
        for warning in &resolved.warnings {
            warn!(session = %self.session_id, "{warning}");
        }

        let plan = DataRateCoordinator::plan(&resolved);
        let changes = match &self.plan {
            Some(previous) => plan.changes_from(previous),
            None => plan.streams_only(),
        };
        let timeout = Duration::from_millis(settings.command_timeout_ms);
        if let Err(err) = DataRateCoordinator::issue(&mut self.device, &changes, timeout, &self.shutdown.0) {
            self.plan = None;
            return Err(err.into());
        }
        for warning in DataRateCoordinator::reconcile(&mut resolved, &plan) {
            warn!(session = %self.session_id, "{warning}");
        }

        let dropped = self.router.install(&resolved, &plan);
        info!(
            session = %self.session_id,
            commands = changes.command_count(),
            channels = resolved.channels.len(),
            "Publishers reconfigured"
        );

        self.mapping = mapping;
        self.resolved = Some(resolved);
        self.plan = Some(plan);
        Ok(dropped)
    }

    /// Toggle one channel. Returns false for an unknown channel.
    pub fn set_channel_enabled(&self, channel: &str, enabled: bool) -> bool {
        if enabled {
            let streamed = self
                .resolved
                .as_ref()
                .and_then(|r| r.channel(channel))
                .zip(self.plan.as_ref())
                .map(|(c, plan)| plan.device_decimation(c.descriptor.field).is_some());
            if streamed == Some(false) {
                warn!(channel, "Channel enabled but its field is not streamed by the device");
            }
        }
        self.router.set_enabled(channel, enabled)
    }

    /// Request cancellation of a configuration pass. Takes effect between
    /// device commands.
    pub fn shutdown(&self) {
        info!(session = %self.session_id, "Shutdown requested");
        self.shutdown.request();
    }

    pub fn shutdown_handle(&self) -> ShutdownHandle {
        self.shutdown.clone()
    }

    pub fn dispatcher(&self) -> Dispatcher {
        Dispatcher::new(self.router.clone())
    }

    pub fn router(&self) -> &Arc<Router> {
        &self.router
    }

    pub fn session_id(&self) -> Uuid {
        self.session_id
    }

    pub fn capabilities(&self) -> &DeviceCapabilities {
        &self.capabilities
    }

    pub fn mapping(&self) -> &TopicMapping {
        &self.mapping
    }

    pub fn settings(&self) -> Option<&DriverSettings> {
        self.settings.as_ref()
    }

    pub fn resolved(&self) -> Option<&ResolvedConfig> {
        self.resolved.as_ref()
    }

    /// Streaming plan the device is known to run. `None` before the first
    /// pass and after a pass that failed on the device.
    pub fn plan(&self) -> Option<&StreamingPlan> {
        self.plan.as_ref()
    }

    pub fn events(&self) -> &EventConfigurator {
        &self.events
    }

    pub fn device(&self) -> &D {
        &self.device
    }

    pub fn device_mut(&mut self) -> &mut D {
        &mut self.device
    }
}
