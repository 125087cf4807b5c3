//! Telemetry routing.
//!
//! The router owns the publisher pool for channel messages and turns a
//! resolved configuration plus its streaming plan into the route table.
//! The [`Dispatcher`] is the dispatch-side handle: it never touches the
//! device.

use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, info, trace};

use inertial_core::{FieldId, MessageShape, ResolvedConfig, Subsystem};
use inertial_protocol::{ChannelMessage, TelemetryRecord};

use crate::coordinator::StreamingPlan;
use crate::pool::{DispatchReport, PublisherPool, RouteSpec, DEFAULT_QUEUE_DEPTH};
use crate::shaping::{render, ChannelSpec};
use crate::statistics::{ChannelStatistics, StatisticsCollector, StatisticsSnapshot};

/// Pool of channel messages keyed by channel name.
pub type ChannelPool = PublisherPool<String, ChannelMessage, ChannelSpec>;

/// A live route as reported to the host.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RouteInfo {
    pub name: String,
    pub field: FieldId,
    pub shape: MessageShape,
    pub frame_id: String,
    /// Client-side decimation on top of the device stream
    pub decimation: u32,
    /// Rate the channel publishes at, device and client decimation combined
    pub achieved_hz: f64,
    pub enabled: bool,
    pub subscribers: usize,
}

pub struct Router {
    pool: ChannelPool,
    stats: StatisticsCollector,
}

impl Router {
    pub fn new(queue_depth: usize) -> Self {
        Self {
            pool: PublisherPool::new(queue_depth),
            stats: StatisticsCollector::new(),
        }
    }

    pub fn pool(&self) -> &ChannelPool {
        &self.pool
    }

    pub fn stats(&self) -> &StatisticsCollector {
        &self.stats
    }

    /// Build the route table for `resolved` as streamed by `plan` and swap
    /// it in. Returns the names of dropped channels.
    ///
    /// Channel rates are expected to be reconciled against `plan` already
    /// (see [`DataRateCoordinator::reconcile`]).
    ///
    /// [`DataRateCoordinator::reconcile`]: crate::coordinator::DataRateCoordinator::reconcile
    pub fn install(&self, resolved: &ResolvedConfig, plan: &StreamingPlan) -> Vec<String> {
        self.pool.set_capacity(resolved.output.queue_depth);

        let output = Arc::new(resolved.output.clone());
        let covariance = resolved
            .subsystem(Subsystem::Imu)
            .and_then(|s| s.static_covariance.clone())
            .map(Arc::new);

        let routes: Vec<RouteSpec<String, ChannelSpec>> = resolved
            .channels
            .iter()
            .map(|channel| {
                let descriptor = &channel.descriptor;
                let decimation = match plan.device_decimation(descriptor.field) {
                    Some(device) => channel.resolved.relative_to(device),
                    None => channel.resolved.decimation,
                };
                RouteSpec {
                    field: descriptor.field,
                    key: descriptor.name.clone(),
                    decimation,
                    enabled: descriptor.enabled,
                    spec: ChannelSpec {
                        name: descriptor.name.clone(),
                        shape: descriptor.shape,
                        frame_id: descriptor.frame_id.clone(),
                        child_frame_id: descriptor.child_frame_id.clone(),
                        achieved_hz: channel.resolved.achieved_hz,
                        covariance: (descriptor.shape == MessageShape::Imu)
                            .then(|| covariance.clone())
                            .flatten(),
                        output: output.clone(),
                    },
                }
            })
            .collect();

        let count = routes.len();
        let dropped = self.pool.install(routes);
        info!(routes = count, dropped = dropped.len(), "Channel set installed");
        for name in &dropped {
            debug!(channel = %name, "Channel dropped");
        }
        dropped
    }

    /// Route one record to its enabled channels.
    pub fn dispatch(&self, record: &TelemetryRecord) -> DispatchReport {
        let now = Utc::now();
        let report = self
            .pool
            .dispatch(record.field, |route| render(&route.spec, record, now));
        self.stats.record_received(report.routed);
        if !report.routed {
            trace!(field = %record.field, "No route for field");
        }
        report
    }

    pub fn set_enabled(&self, channel: &str, enabled: bool) -> bool {
        self.pool.set_enabled(&channel.to_string(), enabled)
    }

    pub fn subscribe(&self, channel: &str) -> Option<broadcast::Receiver<ChannelMessage>> {
        self.pool.subscribe(&channel.to_string())
    }

    /// Routes of the current table, sorted by channel name.
    pub fn routes(&self) -> Vec<RouteInfo> {
        let table = self.pool.snapshot();
        let mut routes: Vec<RouteInfo> = table
            .fields()
            .flat_map(|field| table.routes(field).iter().map(move |route| (field, route)))
            .map(|(field, route)| RouteInfo {
                name: route.key.clone(),
                field,
                shape: route.spec.shape,
                frame_id: route.spec.frame_id.clone(),
                decimation: route.decimation,
                achieved_hz: route.spec.achieved_hz,
                enabled: route.channel().is_enabled(),
                subscribers: route.channel().subscribers(),
            })
            .collect();
        routes.sort_by(|a, b| a.name.cmp(&b.name));
        routes
    }

    pub fn statistics(&self) -> StatisticsSnapshot {
        let channels = self
            .routes()
            .into_iter()
            .filter_map(|route| {
                let channel = self.pool.get(&route.name)?;
                Some(ChannelStatistics {
                    name: route.name,
                    enabled: route.enabled,
                    subscribers: route.subscribers,
                    counters: channel.counters(),
                })
            })
            .collect();
        self.stats.snapshot(channels)
    }
}

impl Default for Router {
    fn default() -> Self {
        Self::new(DEFAULT_QUEUE_DEPTH)
    }
}

/// Cloneable dispatch-side handle.
#[derive(Clone)]
pub struct Dispatcher {
    router: Arc<Router>,
}

impl Dispatcher {
    pub fn new(router: Arc<Router>) -> Self {
        Self { router }
    }

    pub fn router(&self) -> &Arc<Router> {
        &self.router
    }

    pub fn dispatch(&self, record: &TelemetryRecord) -> DispatchReport {
        self.router.dispatch(record)
    }

    /// Drain `rx` until every sender is gone.
    pub async fn run(self, mut rx: mpsc::Receiver<TelemetryRecord>) {
        info!("Dispatcher started");
        while let Some(record) = rx.recv().await {
            self.router.dispatch(&record);
        }
        info!("Telemetry channel closed, dispatcher stopped");
    }
}
