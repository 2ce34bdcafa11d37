//! # Channel registry: routing, throttling and buffering per channel.
//!
//! All channels share the supervisor's single link. The registry maps each
//! [`ChannelKey`] to a [`Channel`] that owns its subscriptions, its
//! [`ThrottleBucket`] and its [`MessageQueue`], each behind its own lock.
//!
//! ## Inbound
//! ```text
//! Inbound::Change{topic, op, payload}
//!     └─► route(): parse topic ─► decode ChannelEvent ─┬─► Err ─► ProtocolDropped (logged, dropped)
//!                                                      ▼
//!                                    throttle.admit(bucket) ─► false ─► EventThrottled (dropped)
//!                                                      ▼
//!                                 for sub in subscriptions (registration order):
//!                                     predicate? ─► guarded(callback) ─► panic ─► CallbackPanicked
//! ```
//!
//! ## Outbound
//! ```text
//! send(key, payload, link?)
//!     ├─ link present AND queue empty ─► try_send(Frame::Message) ─► Dispatched
//!     └─ otherwise (or try_send failed) ─► queue.enqueue() (drop-oldest) ─► Queued
//! flush(link) ─► per channel: queue.drain_with(try_send) (stop on first failure)
//! ```
//!
//! ## Locking
//! - Map lock → channel lock, never the reverse.
//! - Callbacks run with **no** registry lock held.
//! - Channel removal and buffering both happen under the map lock, so a
//!   message is never buffered into a channel that was just removed.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::{Mutex, RwLock};
use serde_json::Value;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::time::Instant;

use crate::channels::event::ChannelEvent;
use crate::channels::key::ChannelKey;
use crate::channels::queue::{MessageQueue, QueuedMessage};
use crate::error::ConnectionError;
use crate::events::{Bus, Event, EventKind};
use crate::guard::guarded;
use crate::policies::{ThrottleBucket, ThrottleGate};
use crate::transport::Frame;

/// Subscription callback.
pub type Callback = Arc<dyn Fn(&ChannelEvent) + Send + Sync>;

/// Optional per-subscription filter.
pub type Predicate = Arc<dyn Fn(&ChannelEvent) -> bool + Send + Sync>;

/// Revocation handle returned by `subscribe()`.
#[derive(Debug, PartialEq, Eq, Hash)]
pub struct SubscriptionHandle {
    id: u64,
    key: ChannelKey,
}

impl SubscriptionHandle {
    /// Channel the subscription belongs to.
    pub fn key(&self) -> &ChannelKey {
        &self.key
    }

    /// Registry-unique subscription id.
    pub fn id(&self) -> u64 {
        self.id
    }
}

struct Subscription {
    id: u64,
    callback: Callback,
    predicate: Option<Predicate>,
    created_at: Instant,
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("filtered", &self.predicate.is_some())
            .field("created_at", &self.created_at)
            .finish()
    }
}

/// Point-in-time counters for one channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelStats {
    /// Channel key.
    pub key: ChannelKey,
    /// Active subscriptions.
    pub subscribers: usize,
    /// Buffered outbound messages.
    pub queued: usize,
    /// Inbound events dropped by the throttle.
    pub throttled: u64,
    /// Outbound messages evicted by queue overflow.
    pub evicted: u64,
}

/// Per-channel state.
pub(crate) struct Channel {
    key: ChannelKey,
    topic: String,
    subs: RwLock<Vec<Arc<Subscription>>>,
    throttle: Mutex<ThrottleBucket>,
    queue: Mutex<MessageQueue>,
    joined_epoch: AtomicU64,
}

impl Channel {
    fn new(key: ChannelKey, gate: &ThrottleGate, capacity: usize) -> Self {
        Self {
            topic: key.topic(),
            key,
            subs: RwLock::new(Vec::new()),
            throttle: Mutex::new(ThrottleBucket::new(gate, Instant::now())),
            queue: Mutex::new(MessageQueue::new(capacity)),
            joined_epoch: AtomicU64::new(0),
        }
    }

    fn is_idle(&self) -> bool {
        let no_subs = self.subs.read().is_empty();
        no_subs && self.queue.lock().is_empty()
    }
}

/// What `send()` did with a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SendOutcome {
    /// Written to the link.
    Dispatched,
    /// Buffered; `link_closed` is set if the link refused it because it closed.
    Queued { link_closed: bool },
}

/// Result of a flush over all channels.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub(crate) struct FlushSummary {
    pub sent: usize,
    pub remaining: usize,
    pub link_full: bool,
    pub link_closed: bool,
}

#[derive(Debug)]
enum FlushStop {
    Interrupted,
    Full,
    Closed,
}

/// Maps channel keys to subscriptions, throttle buckets and queues.
pub(crate) struct ChannelRegistry {
    channels: RwLock<HashMap<ChannelKey, Arc<Channel>>>,
    next_id: AtomicU64,
    gate: ThrottleGate,
    queue_capacity: usize,
    bus: Bus,
}

impl ChannelRegistry {
    /// Creates an empty registry.
    pub fn new(gate: ThrottleGate, queue_capacity: usize, bus: Bus) -> Self {
        Self {
            channels: RwLock::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            gate,
            queue_capacity: queue_capacity.max(1),
            bus,
        }
    }

    /// Runs `f` on the channel for `key`, creating it if needed, with the map lock held.
    ///
    /// The flag passed to `f` is `true` if the channel was created by this call.
    fn with_channel<R>(&self, key: &ChannelKey, f: impl FnOnce(&Arc<Channel>, bool) -> R) -> R {
        {
            let map = self.channels.read();
            if let Some(ch) = map.get(key) {
                return f(ch, false);
            }
        }
        let mut map = self.channels.write();
        let mut created = false;
        let ch = map.entry(key.clone()).or_insert_with(|| {
            created = true;
            Arc::new(Channel::new(key.clone(), &self.gate, self.queue_capacity))
        });
        f(ch, created)
    }

    fn get(&self, key: &ChannelKey) -> Option<Arc<Channel>> {
        self.channels.read().get(key).cloned()
    }

    /// Adds a subscription. Returns the handle and the channel it joined.
    pub(crate) fn subscribe(
        &self,
        key: ChannelKey,
        predicate: Option<Predicate>,
        callback: Callback,
    ) -> (SubscriptionHandle, Arc<Channel>) {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let sub = Arc::new(Subscription {
            id,
            callback,
            predicate,
            created_at: Instant::now(),
        });
        let ch = self.with_channel(&key, |ch, _| {
            ch.subs.write().push(sub);
            Arc::clone(ch)
        });
        (SubscriptionHandle { id, key }, ch)
    }

    /// Removes a subscription.
    ///
    /// Returns the channel topic if the channel became idle and was removed.
    /// Unknown handles are ignored.
    pub(crate) fn unsubscribe(&self, handle: &SubscriptionHandle) -> Option<String> {
        let mut map = self.channels.write();
        let ch = map.get(&handle.key)?;
        ch.subs.write().retain(|s| s.id != handle.id);
        if ch.is_idle() {
            return map.remove(&handle.key).map(|ch| ch.topic.clone());
        }
        None
    }

    /// Buffers or dispatches one outbound message.
    pub(crate) fn send(
        &self,
        key: &ChannelKey,
        payload: Value,
        link: Option<&mpsc::Sender<Frame>>,
    ) -> SendOutcome {
        self.with_channel(key, |ch, _| {
            let mut queue = ch.queue.lock();
            let mut link_closed = false;
            if let Some(tx) = link {
                if queue.is_empty() {
                    let frame = Frame::Message {
                        topic: ch.topic.clone(),
                        payload: payload.clone(),
                    };
                    match tx.try_send(frame) {
                        Ok(()) => return SendOutcome::Dispatched,
                        Err(TrySendError::Full(_)) => {}
                        Err(TrySendError::Closed(_)) => link_closed = true,
                    }
                }
            }
            let msg = QueuedMessage {
                key: ch.key.clone(),
                payload,
                enqueued_at: Instant::now(),
            };
            if queue.enqueue(msg).is_some() {
                let err = ConnectionError::QueueOverflow {
                    channel: ch.topic.clone(),
                    capacity: queue.capacity(),
                };
                tracing::debug!(channel = %ch.topic, evicted = queue.evicted(), "queue overflow");
                self.bus.publish(
                    Event::new(EventKind::QueueOverflow)
                        .with_channel(ch.topic.as_str())
                        .with_reason(err.as_message()),
                );
            }
            SendOutcome::Queued { link_closed }
        })
    }

    /// Sends a `Join` for `ch` unless it already joined in `epoch`.
    pub(crate) fn join(&self, ch: &Channel, epoch: u64, tx: &mpsc::Sender<Frame>) -> bool {
        if ch.joined_epoch.swap(epoch, Ordering::AcqRel) == epoch {
            return true;
        }
        let frame = Frame::Join {
            topic: ch.topic.clone(),
        };
        if tx.try_send(frame).is_err() {
            ch.joined_epoch.store(0, Ordering::Release);
            return false;
        }
        true
    }

    /// Joins the channel for `key`, registering it if needed.
    pub(crate) fn join_key(&self, key: &ChannelKey, epoch: u64, tx: &mpsc::Sender<Frame>) -> bool {
        self.with_channel(key, |ch, _| self.join(ch, epoch, tx))
    }

    /// Joins every registered channel for a fresh link.
    pub(crate) fn join_all(&self, epoch: u64, tx: &mpsc::Sender<Frame>) {
        for ch in self.snapshot() {
            if !self.join(&ch, epoch, tx) {
                tracing::debug!(channel = %ch.topic, "join frame not written");
            }
        }
    }

    /// Drains every channel queue into the link in arrival order.
    ///
    /// The pass ends at the first failed write (link full or closed) or as soon
    /// as `is_current` turns false. Nothing that was not written is removed, so
    /// an interrupted flush resumes on the next link.
    pub(crate) fn flush(
        &self,
        tx: &mpsc::Sender<Frame>,
        is_current: impl Fn() -> bool,
    ) -> FlushSummary {
        let mut summary = FlushSummary::default();
        for ch in self.snapshot() {
            let report = ch.queue.lock().drain_with(|m| {
                if !is_current() {
                    return Err(FlushStop::Interrupted);
                }
                let frame = Frame::Message {
                    topic: ch.topic.clone(),
                    payload: m.payload.clone(),
                };
                tx.try_send(frame).map_err(|e| match e {
                    TrySendError::Full(_) => FlushStop::Full,
                    TrySendError::Closed(_) => FlushStop::Closed,
                })
            });
            summary.sent += report.sent;
            match report.stopped {
                None => {
                    if report.sent > 0 {
                        self.bus.publish(
                            Event::new(EventKind::FlushCompleted)
                                .with_channel(ch.topic.as_str())
                                .with_count(report.sent),
                        );
                    }
                }
                Some(stop) => {
                    self.bus.publish(
                        Event::new(EventKind::FlushStopped)
                            .with_channel(ch.topic.as_str())
                            .with_reason(format!("{stop:?}").to_lowercase()),
                    );
                    summary.link_full = matches!(stop, FlushStop::Full);
                    summary.link_closed = matches!(stop, FlushStop::Closed);
                    break;
                }
            }
        }
        summary.remaining = self.queue_depth();
        summary
    }

    /// Routes one inbound change to its channel's subscribers.
    ///
    /// Malformed frames are logged and dropped. Returns the number of
    /// callbacks invoked.
    pub(crate) fn route(&self, topic: &str, operation: &str, payload: Value) -> usize {
        let key = match topic.parse::<ChannelKey>() {
            Ok(key) => key,
            Err(e) => {
                self.protocol_drop(topic, &e);
                return 0;
            }
        };
        let Some(ch) = self.get(&key) else {
            tracing::debug!(channel = %topic, "event for unregistered channel dropped");
            return 0;
        };
        let event = match ChannelEvent::decode(key, operation, payload, Instant::now()) {
            Ok(ev) => ev,
            Err(e) => {
                self.protocol_drop(topic, &e);
                return 0;
            }
        };
        self.dispatch(&ch, &event)
    }

    /// Throttles and delivers a decoded event.
    fn dispatch(&self, ch: &Channel, event: &ChannelEvent) -> usize {
        let admitted = {
            let mut bucket = ch.throttle.lock();
            self.gate.admit(&mut bucket, Instant::now())
        };
        if !admitted {
            self.bus
                .publish(Event::new(EventKind::EventThrottled).with_channel(ch.topic.as_str()));
            return 0;
        }

        let subs: Vec<Arc<Subscription>> = ch.subs.read().clone();
        let mut invoked = 0;
        for sub in subs {
            let wanted = match &sub.predicate {
                None => true,
                Some(p) => guarded(|| p(event)).unwrap_or_else(|info| {
                    self.callback_panicked(&ch.topic, &info);
                    false
                }),
            };
            if !wanted {
                continue;
            }
            invoked += 1;
            if let Err(info) = guarded(|| (sub.callback)(event)) {
                self.callback_panicked(&ch.topic, &info);
            }
        }
        invoked
    }

    fn protocol_drop(&self, topic: &str, err: &ConnectionError) {
        tracing::warn!(channel = %topic, error = %err, "malformed inbound frame dropped");
        self.bus.publish(
            Event::new(EventKind::ProtocolDropped)
                .with_channel(topic)
                .with_reason(err.to_string()),
        );
    }

    fn callback_panicked(&self, topic: &str, info: &str) {
        tracing::warn!(channel = %topic, panic = %info, "subscription callback panicked");
        self.bus.publish(
            Event::new(EventKind::CallbackPanicked)
                .with_channel(topic)
                .with_reason(info),
        );
    }

    /// Removes every channel, subscription and buffered message.
    pub(crate) fn clear(&self) {
        let drained: Vec<Arc<Channel>> = self.channels.write().drain().map(|(_, ch)| ch).collect();
        for ch in drained {
            ch.subs.write().clear();
            ch.queue.lock().clear();
        }
    }

    fn snapshot(&self) -> Vec<Arc<Channel>> {
        let mut chans: Vec<Arc<Channel>> = self.channels.read().values().cloned().collect();
        chans.sort_unstable_by(|a, b| a.key.cmp(&b.key));
        chans
    }

    /// Total buffered messages across channels.
    pub fn queue_depth(&self) -> usize {
        self.channels
            .read()
            .values()
            .map(|ch| ch.queue.lock().len())
            .sum()
    }

    /// Registered channel keys, sorted.
    pub fn keys(&self) -> Vec<ChannelKey> {
        self.snapshot().into_iter().map(|ch| ch.key.clone()).collect()
    }

    /// Counters for one channel.
    pub fn stats(&self, key: &ChannelKey) -> Option<ChannelStats> {
        let ch = self.get(key)?;
        let subscribers = ch.subs.read().len();
        let throttled = ch.throttle.lock().dropped();
        let queue = ch.queue.lock();
        Some(ChannelStats {
            key: ch.key.clone(),
            subscribers,
            queued: queue.len(),
            throttled,
            evicted: queue.evicted(),
        })
    }

    /// Copy of the messages buffered for `key`, oldest first.
    pub fn queued(&self, key: &ChannelKey) -> Vec<QueuedMessage> {
        self.get(key)
            .map(|ch| ch.queue.lock().iter().cloned().collect())
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    fn registry(max_burst: u32, capacity: usize) -> ChannelRegistry {
        let gate = ThrottleGate {
            window: Duration::from_secs(1),
            max_burst,
        };
        ChannelRegistry::new(gate, capacity, Bus::new(64))
    }

    fn counter() -> (Arc<AtomicUsize>, Callback) {
        let hits = Arc::new(AtomicUsize::new(0));
        let h = Arc::clone(&hits);
        (hits, Arc::new(move |_ev: &ChannelEvent| {
            h.fetch_add(1, Ordering::SeqCst);
        }))
    }

    fn explode(_ev: &ChannelEvent) {
        panic!("bad subscriber");
    }

    #[tokio::test(start_paused = true)]
    async fn throttles_burst_within_window() {
        let reg = registry(10, 100);
        let key = ChannelKey::orders("s1");
        let (hits, cb) = counter();
        let _h = reg.subscribe(key.clone(), None, cb);

        for n in 0..15 {
            reg.route("orders:s1", "INSERT", json!({ "n": n }));
        }
        assert_eq!(hits.load(Ordering::SeqCst), 10);
        assert_eq!(reg.stats(&key).map(|s| s.throttled), Some(5));

        tokio::time::advance(Duration::from_secs(1)).await;
        reg.route("orders:s1", "INSERT", json!({}));
        assert_eq!(hits.load(Ordering::SeqCst), 11);
    }

    #[tokio::test(start_paused = true)]
    async fn panicking_callback_does_not_stop_others() {
        let reg = registry(10, 10);
        let key = ChannelKey::chat("room");
        let _bad = reg.subscribe(key.clone(), None, Arc::new(explode));
        let (hits, cb) = counter();
        let _good = reg.subscribe(key, None, cb);

        let invoked = reg.route("chat:room", "INSERT", json!({ "text": "hi" }));
        assert_eq!(invoked, 2);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn predicate_filters_and_duplicates_are_additive() {
        let reg = registry(10, 10);
        let key = ChannelKey::orders("s2");
        let (hits, cb) = counter();
        let only_shipped: Predicate =
            Arc::new(|ev: &ChannelEvent| ev.record().field("status") == Some(&json!("shipped")));
        let (h1, _) = reg.subscribe(key.clone(), Some(only_shipped), Arc::clone(&cb));
        let (h2, _) = reg.subscribe(key.clone(), None, cb);
        assert_ne!(h1, h2);

        reg.route("orders:s2", "UPDATE", json!({ "status": "packed" }));
        assert_eq!(hits.load(Ordering::SeqCst), 1);
        reg.route("orders:s2", "UPDATE", json!({ "status": "shipped" }));
        assert_eq!(hits.load(Ordering::SeqCst), 3);

        assert_eq!(reg.unsubscribe(&h2), None);
        reg.route("orders:s2", "UPDATE", json!({ "status": "packed" }));
        assert_eq!(hits.load(Ordering::SeqCst), 3);
        assert_eq!(reg.unsubscribe(&h1), Some("orders:s2".to_string()));
        assert!(reg.keys().is_empty());
        assert_eq!(reg.unsubscribe(&h1), None);
    }

    #[tokio::test(start_paused = true)]
    async fn malformed_frames_are_dropped() {
        let reg = registry(10, 10);
        let (hits, cb) = counter();
        let _h = reg.subscribe(ChannelKey::orders("s3"), None, cb);
        let mut rx = reg.bus.subscribe();

        assert_eq!(reg.route("orders:s3", "TRUNCATE", json!({})), 0);
        assert_eq!(reg.route("bogus", "INSERT", json!({})), 0);
        assert_eq!(reg.route("orders:s3", "INSERT", json!({})), 1);
        assert_eq!(hits.load(Ordering::SeqCst), 1);

        let first = rx.try_recv().expect("protocol event");
        assert_eq!(first.kind, EventKind::ProtocolDropped);
    }

    #[tokio::test(start_paused = true)]
    async fn send_queues_without_link_and_flushes_in_order() {
        let reg = registry(10, 3);
        let key = ChannelKey::orders("s4");
        for n in 1..=5 {
            let out = reg.send(&key, json!(n), None);
            assert_eq!(out, SendOutcome::Queued { link_closed: false });
        }
        assert_eq!(reg.queue_depth(), 3);
        assert_eq!(reg.stats(&key).map(|s| s.evicted), Some(2));

        let mut events = reg.bus.subscribe();
        let (tx, mut rx) = mpsc::channel(16);
        let summary = reg.flush(&tx, || true);
        assert_eq!(summary.sent, 3);
        assert_eq!(summary.remaining, 0);
        let done = events.try_recv().expect("flush event");
        assert_eq!(done.kind, EventKind::FlushCompleted);
        assert_eq!(done.count, Some(3));
        assert_eq!(done.attempt, None);
        let mut got = Vec::new();
        while let Ok(Frame::Message { payload, .. }) = rx.try_recv() {
            got.push(payload);
        }
        assert_eq!(got, vec![json!(3), json!(4), json!(5)]);

        assert_eq!(reg.send(&key, json!(6), Some(&tx)), SendOutcome::Dispatched);
    }

    #[tokio::test(start_paused = true)]
    async fn flush_stops_when_link_is_full() {
        let reg = registry(10, 10);
        let key = ChannelKey::orders("s5");
        for n in 1..=4 {
            reg.send(&key, json!(n), None);
        }
        let (tx, mut rx) = mpsc::channel(2);
        let summary = reg.flush(&tx, || true);
        assert_eq!(summary.sent, 2);
        assert_eq!(summary.remaining, 2);
        assert!(summary.link_full);
        let remaining: Vec<Value> = reg.queued(&key).into_iter().map(|m| m.payload).collect();
        assert_eq!(remaining, vec![json!(3), json!(4)]);

        // Direct sends must not overtake the buffered tail.
        let _ = rx.try_recv();
        assert_eq!(
            reg.send(&key, json!(5), Some(&tx)),
            SendOutcome::Queued { link_closed: false }
        );
    }

    #[tokio::test(start_paused = true)]
    async fn interrupted_flush_keeps_messages() {
        let reg = registry(10, 10);
        let key = ChannelKey::chat("s6");
        reg.send(&key, json!("a"), None);
        let (tx, _rx) = mpsc::channel(8);
        let summary = reg.flush(&tx, || false);
        assert_eq!(summary.sent, 0);
        assert_eq!(reg.queue_depth(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn join_once_per_epoch() {
        let reg = registry(10, 10);
        let noop: Callback = Arc::new(|_ev: &ChannelEvent| {});
        let (_h, ch) = reg.subscribe(ChannelKey::orders("s7"), None, noop);
        let (tx, mut rx) = mpsc::channel(8);
        assert!(reg.join(&ch, 1, &tx));
        assert!(reg.join(&ch, 1, &tx));
        reg.join_all(2, &tx);
        let mut joins = 0;
        while let Ok(Frame::Join { .. }) = rx.try_recv() {
            joins += 1;
        }
        assert_eq!(joins, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn clear_removes_everything() {
        let reg = registry(10, 10);
        let key = ChannelKey::orders("s8");
        let (hits, cb) = counter();
        let _h = reg.subscribe(key.clone(), None, cb);
        reg.send(&key, json!(1), None);
        reg.clear();
        assert_eq!(reg.queue_depth(), 0);
        assert!(reg.stats(&key).is_none());
        reg.route("orders:s8", "INSERT", json!({}));
        assert_eq!(hits.load(Ordering::SeqCst), 0);
    }
}
