//! Generic publisher pool.
//!
//! The pool owns one [`Channel`] per key. A channel is created on first
//! [`PublisherPool::ensure`] and lives until a reconfiguration drops its
//! key. Enabling and disabling only flips a flag, so the resource handed to
//! consumers survives.
//!
//! Dispatch reads an immutable [`RouteTable`] snapshot. Reconfiguration
//! builds a new table and swaps it in under the write lock; the read lock
//! is held only long enough to clone the `Arc`.

use std::collections::{HashMap, HashSet};
use std::hash::Hash;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use serde::Serialize;
use tokio::sync::broadcast;

use inertial_core::FieldId;

/// Default capacity of a channel's hand-off queue.
pub const DEFAULT_QUEUE_DEPTH: usize = 64;

// ============================================================================
// Channel
// ============================================================================

/// Result of forwarding one record to a channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Forward {
    /// Sent to this many live consumers
    Published(usize),
    /// Held back by client-side decimation
    Skipped,
    /// Due for publication but nobody is subscribed
    Undelivered,
}

/// Counters of one channel.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ChannelCounters {
    /// Records handed to the queue
    pub published: u64,
    /// Records dropped by the channel's decimation
    pub skipped: u64,
    /// Published records with no live consumer
    pub undelivered: u64,
}

/// A live output channel.
///
/// Messages are handed off through a bounded broadcast queue. A consumer
/// that falls behind loses the oldest messages and sees
/// `RecvError::Lagged`; it never slows the sender or sibling channels.
pub struct Channel<M> {
    /// Whether dispatch forwards to this channel
    enabled: AtomicBool,
    /// Skip counter. Also serializes forwards on this channel.
    skip: Mutex<u32>,
    /// Bounded hand-off queue
    tx: broadcast::Sender<M>,
    /// Records handed to the queue
    published: AtomicU64,
    /// Records dropped by decimation
    skipped: AtomicU64,
    /// Published records nobody received
    undelivered: AtomicU64,
}

impl<M: Clone> Channel<M> {
    fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self {
            enabled: AtomicBool::new(false),
            skip: Mutex::new(0),
            tx,
            published: AtomicU64::new(0),
            skipped: AtomicU64::new(0),
            undelivered: AtomicU64::new(0),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Acquire)
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::Release);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<M> {
        self.tx.subscribe()
    }

    pub fn subscribers(&self) -> usize {
        self.tx.receiver_count()
    }

    pub fn counters(&self) -> ChannelCounters {
        ChannelCounters {
            published: self.published.load(Ordering::Relaxed),
            skipped: self.skipped.load(Ordering::Relaxed),
            undelivered: self.undelivered.load(Ordering::Relaxed),
        }
    }

    /// Count one delivered record and publish it when the skip counter
    /// reaches `decimation`. `render` runs only for published records.
    pub fn forward<F>(&self, decimation: u32, render: F) -> Forward
    where
        F: FnOnce() -> M,
    {
        let mut count = self.skip.lock().unwrap_or_else(PoisonError::into_inner);
        *count += 1;
        if *count < decimation.max(1) {
            self.skipped.fetch_add(1, Ordering::Relaxed);
            return Forward::Skipped;
        }
        *count = 0;

        self.published.fetch_add(1, Ordering::Relaxed);
        match self.tx.send(render()) {
            Ok(receivers) => Forward::Published(receivers),
            Err(_) => {
                self.undelivered.fetch_add(1, Ordering::Relaxed);
                Forward::Undelivered
            }
        }
    }
}

// ============================================================================
// Routes
// ============================================================================

/// Route from a field to one channel.
pub struct Route<K, M, S> {
    pub key: K,
    /// Client-side decimation on top of the device stream
    pub decimation: u32,
    /// Per-route data handed to the renderer
    pub spec: S,
    channel: Arc<Channel<M>>,
}

impl<K, M, S> Route<K, M, S> {
    pub fn channel(&self) -> &Arc<Channel<M>> {
        &self.channel
    }
}

/// Input for [`PublisherPool::install`].
#[derive(Debug, Clone)]
pub struct RouteSpec<K, S> {
    pub field: FieldId,
    pub key: K,
    pub decimation: u32,
    pub enabled: bool,
    pub spec: S,
}

/// Immutable field -> routes table read by dispatch.
pub struct RouteTable<K, M, S> {
    routes: HashMap<FieldId, Vec<Route<K, M, S>>>,
}

impl<K, M, S> RouteTable<K, M, S> {
    fn empty() -> Self {
        Self {
            routes: HashMap::new(),
        }
    }

    /// Routes of a field in installation order.
    pub fn routes(&self, field: FieldId) -> &[Route<K, M, S>] {
        self.routes.get(&field).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn fields(&self) -> impl Iterator<Item = FieldId> + '_ {
        self.routes.keys().copied()
    }

    pub fn len(&self) -> usize {
        self.routes.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}

/// Outcome of dispatching one record.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchReport {
    /// The field has at least one route
    pub routed: bool,
    pub published: usize,
    pub skipped: usize,
    pub undelivered: usize,
}

// ============================================================================
// Pool
// ============================================================================

/// Lifecycle manager for output channels keyed by `K`, carrying `M`.
pub struct PublisherPool<K, M, S = ()> {
    capacity: AtomicU64,
    channels: RwLock<HashMap<K, Arc<Channel<M>>>>,
    table: RwLock<Arc<RouteTable<K, M, S>>>,
}

impl<K, M, S> PublisherPool<K, M, S>
where
    K: Eq + Hash + Clone,
    M: Clone,
{
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: AtomicU64::new(capacity as u64),
            channels: RwLock::new(HashMap::new()),
            table: RwLock::new(Arc::new(RouteTable::empty())),
        }
    }

    /// Queue depth used for channels created from now on.
    pub fn set_capacity(&self, capacity: usize) {
        self.capacity.store(capacity as u64, Ordering::Relaxed);
    }

    /// Get the channel for `key`, creating it if needed.
    pub fn ensure(&self, key: &K) -> Arc<Channel<M>> {
        if let Some(channel) = self.get(key) {
            return channel;
        }
        let capacity = self.capacity.load(Ordering::Relaxed) as usize;
        let mut channels = self.channels.write().unwrap_or_else(PoisonError::into_inner);
        channels
            .entry(key.clone())
            .or_insert_with(|| Arc::new(Channel::new(capacity)))
            .clone()
    }

    pub fn get(&self, key: &K) -> Option<Arc<Channel<M>>> {
        self.channels
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
    }

    /// Toggle dispatch to a channel. Returns false for an unknown key.
    pub fn set_enabled(&self, key: &K, enabled: bool) -> bool {
        match self.get(key) {
            Some(channel) => {
                channel.set_enabled(enabled);
                true
            }
            None => false,
        }
    }

    pub fn subscribe(&self, key: &K) -> Option<broadcast::Receiver<M>> {
        self.get(key).map(|channel| channel.subscribe())
    }

    /// Drop every channel whose key is not in `keep`.
    pub fn retain(&self, keep: &HashSet<K>) -> Vec<K> {
        let mut channels = self.channels.write().unwrap_or_else(PoisonError::into_inner);
        let dropped: Vec<K> = channels
            .keys()
            .filter(|key| !keep.contains(*key))
            .cloned()
            .collect();
        for key in &dropped {
            channels.remove(key);
        }
        dropped
    }

    pub fn keys(&self) -> Vec<K> {
        self.channels
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.channels.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Current route table.
    pub fn snapshot(&self) -> Arc<RouteTable<K, M, S>> {
        self.table.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Build a route table from `routes`, swap it in and drop channels no
    /// longer routed. Channels whose key persists keep their resource.
    /// Returns the dropped keys.
    pub fn install<I>(&self, routes: I) -> Vec<K>
    where
        I: IntoIterator<Item = RouteSpec<K, S>>,
    {
        let mut table = RouteTable::empty();
        let mut keep = HashSet::new();
        let mut flags = Vec::new();

        for route in routes {
            let channel = self.ensure(&route.key);
            flags.push((channel.clone(), route.enabled));
            keep.insert(route.key.clone());
            table.routes.entry(route.field).or_insert_with(Vec::new).push(Route {
                key: route.key,
                decimation: route.decimation.max(1),
                spec: route.spec,
                channel,
            });
        }

        *self.table.write().unwrap_or_else(PoisonError::into_inner) = Arc::new(table);
        // Flip flags only once the new decimations are visible.
        for (channel, enabled) in flags {
            channel.set_enabled(enabled);
        }
        self.retain(&keep)
    }

    /// Hand a record of `field` to every enabled route.
    ///
    /// `render` turns the record into the route's message shape; it runs
    /// only for routes that publish this time.
    pub fn dispatch<F>(&self, field: FieldId, mut render: F) -> DispatchReport
    where
        F: FnMut(&Route<K, M, S>) -> M,
    {
        let table = self.snapshot();
        let routes = table.routes(field);
        let mut report = DispatchReport {
            routed: !routes.is_empty(),
            ..Default::default()
        };

        for route in routes {
            if !route.channel.is_enabled() {
                continue;
            }
            match route.channel.forward(route.decimation, || render(route)) {
                Forward::Published(_) => report.published += 1,
                Forward::Skipped => report.skipped += 1,
                Forward::Undelivered => report.undelivered += 1,
            }
        }
        report
    }
}
