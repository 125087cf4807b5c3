//! Driver statistics collection.
//!
//! Counts records through the dispatch path:
//! - records received and records with no route
//! - record rate over the last measurement window
//! - configuration passes and their failures
//!
//! Per-channel counters live on the channels themselves and are merged in
//! by the router when a snapshot is taken.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use serde::Serialize;

use crate::pool::ChannelCounters;

/// Per-channel statistics.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChannelStatistics {
    pub name: String,
    pub enabled: bool,
    pub subscribers: usize,
    #[serde(flatten)]
    pub counters: ChannelCounters,
}

/// Point-in-time view of the driver's counters.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatisticsSnapshot {
    /// Seconds since the collector was created
    pub uptime: u64,
    pub records_received: u64,
    pub records_unrouted: u64,
    pub record_rate: f64,
    pub configurations: u64,
    pub configuration_failures: u64,
    pub channels: Vec<ChannelStatistics>,
}

/// Collects dispatch statistics.
pub struct StatisticsCollector {
    /// Creation time, for uptime
    start_time: Instant,
    /// Records handed to dispatch
    records_received: AtomicU64,
    /// Records whose field has no route
    records_unrouted: AtomicU64,
    /// Records in the current rate window
    window_records: AtomicU64,
    /// Records per second over the last window, stored as f64 bits
    record_rate: AtomicU64,
    /// Configuration passes run
    configurations: AtomicU64,
    /// Passes that failed or rejected an event
    configuration_failures: AtomicU64,
}

impl StatisticsCollector {
    pub fn new() -> Self {
        Self {
            start_time: Instant::now(),
            records_received: AtomicU64::new(0),
            records_unrouted: AtomicU64::new(0),
            window_records: AtomicU64::new(0),
            record_rate: AtomicU64::new(0),
            configurations: AtomicU64::new(0),
            configuration_failures: AtomicU64::new(0),
        }
    }

    pub fn record_received(&self, routed: bool) {
        self.records_received.fetch_add(1, Ordering::Relaxed);
        self.window_records.fetch_add(1, Ordering::Relaxed);
        if !routed {
            self.records_unrouted.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Close the measurement window (call once per second).
    pub fn update_rate(&self) {
        let window = self.window_records.swap(0, Ordering::Relaxed);
        self.record_rate
            .store((window as f64).to_bits(), Ordering::Relaxed);
    }

    pub fn configuration_finished(&self, ok: bool) {
        self.configurations.fetch_add(1, Ordering::Relaxed);
        if !ok {
            self.configuration_failures.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn snapshot(&self, channels: Vec<ChannelStatistics>) -> StatisticsSnapshot {
        StatisticsSnapshot {
            uptime: self.start_time.elapsed().as_secs(),
            records_received: self.records_received.load(Ordering::Relaxed),
            records_unrouted: self.records_unrouted.load(Ordering::Relaxed),
            record_rate: f64::from_bits(self.record_rate.load(Ordering::Relaxed)),
            configurations: self.configurations.load(Ordering::Relaxed),
            configuration_failures: self.configuration_failures.load(Ordering::Relaxed),
            channels,
        }
    }
}

impl Default for StatisticsCollector {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_counting() {
        let stats = StatisticsCollector::new();

        stats.record_received(true);
        stats.record_received(true);
        stats.record_received(false);
        stats.update_rate();

        let snapshot = stats.snapshot(Vec::new());
        assert_eq!(snapshot.records_received, 3);
        assert_eq!(snapshot.records_unrouted, 1);
        assert_eq!(snapshot.record_rate, 3.0);
    }

    #[test]
    fn test_configuration_tracking() {
        let stats = StatisticsCollector::new();

        stats.configuration_finished(true);
        stats.configuration_finished(false);

        let snapshot = stats.snapshot(Vec::new());
        assert_eq!(snapshot.configurations, 2);
        assert_eq!(snapshot.configuration_failures, 1);
    }

    #[test]
    fn test_snapshot_serializes_channel_counters_flat() {
        let stats = StatisticsCollector::new();
        let snapshot = stats.snapshot(vec![ChannelStatistics {
            name: "imu/data".to_string(),
            enabled: true,
            subscribers: 1,
            counters: ChannelCounters {
                published: 5,
                skipped: 2,
                undelivered: 0,
            },
        }]);
        let json = serde_json::to_value(&snapshot).unwrap();
        assert_eq!(json["channels"][0]["published"], 5);
    }
}
