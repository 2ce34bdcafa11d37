//! # Supervisor: owns the shared link, its lifecycle and every channel on it.
//!
//! The [`Supervisor`] is the only component consumers talk to. It composes the
//! [`ChannelRegistry`], the [`HeartbeatMonitor`], the [`ReconnectScheduler`]
//! and the observer set around a single state machine.
//!
//! ## High-level architecture
//! ```text
//! connect() ──► Connecting ──► attempt(): Transport::open(token)
//!                                  ├─ Ok(link) ──► Connected
//!                                  │     ├─ join_all(channels)
//!                                  │     ├─ reader task:    Inbound ─► registry.route / heartbeat.on_ack
//!                                  │     ├─ heartbeat task: probes, timeout ─► link lost
//!                                  │     └─ flush task:     queued messages ─► link (FIFO, stop on failure)
//!                                  ├─ Err(auth)      ──► Failed (returned to the caller)
//!                                  └─ Err(transient) ──► Reconnecting ─► schedule(delay(n)) ─► attempt()
//!
//! link lost (reader EOF, transport error, heartbeat timeout)
//!     └─► Reconnecting ─► counts as failure 1 ─► waits delay(1) ─► failure n waits delay(n)
//!
//! attempts > max ─► Failed (MaxReconnectAttemptsExceeded)
//! disconnect()   ─► cancel session token (every timer and task), clear channels ─► Disconnected
//! ```
//!
//! ## Rules
//! - State changes only inside `with_transition`, under the core lock.
//! - Observers run after the core lock is released, serialized by a
//!   re-entrant lock, so they may call back into the supervisor.
//! - Every spawned task carries the epoch it was created for and re-checks it
//!   before mutating anything. Epochs advance on every connect, link change,
//!   failure and teardown.
//! - No lock is held across an `.await`.
//!
//! ## Example
//! ```rust,no_run
//! use std::sync::Arc;
//! use async_trait::async_trait;
//! use channelvisor::{ChannelKey, Config, ConnectionError, Link, Supervisor, Transport};
//!
//! struct Socket;
//!
//! #[async_trait]
//! impl Transport for Socket {
//!     async fn open(&self, _token: &str) -> Result<Link, ConnectionError> {
//!         Err(ConnectionError::transient("offline"))
//!     }
//! }
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> Result<(), ConnectionError> {
//!     let sup = Supervisor::builder(Config::default(), Arc::new(Socket))
//!         .with_token("bearer-token")
//!         .build();
//!
//!     let store = ChannelKey::orders("store-42");
//!     let _sub = sup.subscribe(store.clone(), |ev| println!("{ev:?}"));
//!
//!     sup.connect().await?;
//!     sup.send(&store, serde_json::json!({ "status": "packed" }));
//!     sup.disconnect();
//!     Ok(())
//! }
//! ```

use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Mutex, ReentrantMutex, RwLock};
use serde_json::Value;
use tokio::sync::{Notify, mpsc};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::channels::{
    Callback, ChannelEvent, ChannelKey, ChannelRegistry, ChannelStats, Predicate, QueuedMessage,
    SendOutcome, SubscriptionHandle,
};
use crate::error::{ConnectionError, ErrorClass};
use crate::events::{Bus, Event, EventKind};
use crate::transport::{Frame, Inbound, Link, Transport};

use super::builder::SupervisorBuilder;
use super::config::Config;
use super::heartbeat::{HeartbeatExit, HeartbeatMonitor};
use super::observers::{ObserverId, ObserverSet, Observe};
use super::reconnect::ReconnectScheduler;
use super::state::{ConnectionSnapshot, ConnectionState, LatencyTier, Transition};
use super::timer::TaskHandle;

/// What [`Supervisor::send`] did with a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// Written to the link.
    Sent,
    /// Buffered in the channel queue until the next flush.
    Queued,
}

/// The current link and the tasks serving it.
struct LinkSlot {
    tx: mpsc::Sender<Frame>,
    token: CancellationToken,
    tasks: Vec<TaskHandle>,
}

/// State guarded by the core lock.
struct Core {
    state: ConnectionState,
    epoch: u64,
    attempts: u32,
    last_delay: Duration,
    transitions: u64,
    session: CancellationToken,
    link: Option<LinkSlot>,
}

impl Core {
    fn new() -> Self {
        let session = CancellationToken::new();
        session.cancel();
        Self {
            state: ConnectionState::Disconnected,
            epoch: 0,
            attempts: 0,
            last_delay: Duration::ZERO,
            transitions: 0,
            session,
            link: None,
        }
    }

    fn set_state(
        &mut self,
        to: ConnectionState,
        error: Option<ConnectionError>,
    ) -> Option<Transition> {
        if self.state == to {
            return None;
        }
        let from = std::mem::replace(&mut self.state, to);
        self.transitions += 1;
        Some(Transition {
            seq: self.transitions,
            from,
            to,
            error,
            at: Instant::now(),
        })
    }

    fn drop_link(&mut self) {
        if let Some(slot) = self.link.take() {
            slot.token.cancel();
            for task in &slot.tasks {
                task.cancel();
            }
        }
    }

    fn is_live(&self, epoch: u64) -> bool {
        self.epoch == epoch && !self.session.is_cancelled()
    }
}

/// Outcome of a failed attempt, decided under the core lock.
enum Retry {
    Stale,
    GaveUp(ConnectionError),
    After {
        epoch: u64,
        session: CancellationToken,
        attempts: u32,
        delay: Duration,
    },
}

struct Inner {
    cfg: Config,
    transport: Arc<dyn Transport>,
    token: RwLock<String>,
    bus: Bus,
    registry: ChannelRegistry,
    observers: ObserverSet,
    heartbeat: HeartbeatMonitor,
    scheduler: ReconnectScheduler,
    flush_wake: Notify,
    core: Mutex<Core>,
    serial: ReentrantMutex<()>,
}

/// Supervises one shared realtime link and the channels multiplexed over it.
///
/// Cheap to clone; all clones drive the same connection. Call
/// [`disconnect`](Self::disconnect) to stop background work before dropping
/// the last clone.
#[derive(Clone)]
pub struct Supervisor {
    inner: Arc<Inner>,
}

impl Supervisor {
    /// Starts building a supervisor for `transport`.
    pub fn builder(cfg: Config, transport: Arc<dyn Transport>) -> SupervisorBuilder {
        SupervisorBuilder::new(cfg, transport)
    }

    pub(super) fn new_internal(
        cfg: Config,
        transport: Arc<dyn Transport>,
        token: String,
        bus: Bus,
    ) -> Self {
        let registry =
            ChannelRegistry::new(cfg.throttle, cfg.queue_capacity_clamped(), bus.clone());
        let heartbeat = HeartbeatMonitor::new(cfg.latency_window_clamped());
        Self {
            inner: Arc::new(Inner {
                observers: ObserverSet::new(bus.clone()),
                cfg,
                transport,
                token: RwLock::new(token),
                bus,
                registry,
                heartbeat,
                scheduler: ReconnectScheduler::new(),
                flush_wake: Notify::new(),
                core: Mutex::new(Core::new()),
                serial: ReentrantMutex::new(()),
            }),
        }
    }

    /// Opens the link.
    ///
    /// From `Disconnected` or `Failed` this starts a new session and waits for
    /// the first attempt. A transient failure is absorbed: the call returns
    /// `Ok` and the supervisor keeps retrying in `Reconnecting`. An
    /// authentication failure is returned and leaves the supervisor `Failed`.
    ///
    /// Does nothing while `Connecting`, `Connected` or `Reconnecting`.
    pub async fn connect(&self) -> Result<(), ConnectionError> {
        let start = self.inner.with_transition(|core| match core.state {
            ConnectionState::Disconnected | ConnectionState::Failed => {
                core.session.cancel();
                core.session = CancellationToken::new();
                core.epoch += 1;
                core.attempts = 0;
                core.last_delay = Duration::ZERO;
                let t = core.set_state(ConnectionState::Connecting, None);
                (Some((core.epoch, core.session.clone())), t)
            }
            _ => (None, None),
        });
        let Some((epoch, session)) = start else {
            return Ok(());
        };

        // Runs detached so that dropping this future cannot strand the
        // session in Connecting.
        let inner = Arc::clone(&self.inner);
        match tokio::spawn(inner.attempt(epoch, session)).await {
            Ok(res) => res,
            Err(e) => Err(ConnectionError::transient(format!("connect task failed: {e}"))),
        }
    }

    /// Full teardown.
    ///
    /// Cancels the heartbeat, reader, flush and reconnection work, removes all
    /// subscriptions, clears every queue and moves to `Disconnected`.
    /// Idempotent.
    pub fn disconnect(&self) {
        let inner = &self.inner;
        inner.with_transition(|core| {
            core.epoch += 1;
            core.session.cancel();
            core.drop_link();
            core.attempts = 0;
            core.last_delay = Duration::ZERO;
            inner.registry.clear();
            inner.heartbeat.clear();
            ((), core.set_state(ConnectionState::Disconnected, None))
        });
        inner.scheduler.cancel();
    }

    /// Subscribes `callback` to every admitted event on `key`.
    ///
    /// Subscribing twice with the same callback registers two independent
    /// subscriptions.
    pub fn subscribe<F>(&self, key: ChannelKey, callback: F) -> SubscriptionHandle
    where
        F: Fn(&ChannelEvent) + Send + Sync + 'static,
    {
        self.register(key, None, Arc::new(callback))
    }

    /// Like [`subscribe`](Self::subscribe), but only events for which
    /// `predicate` returns `true` reach `callback`.
    pub fn subscribe_filtered<P, F>(
        &self,
        key: ChannelKey,
        predicate: P,
        callback: F,
    ) -> SubscriptionHandle
    where
        P: Fn(&ChannelEvent) -> bool + Send + Sync + 'static,
        F: Fn(&ChannelEvent) + Send + Sync + 'static,
    {
        self.register(key, Some(Arc::new(predicate)), Arc::new(callback))
    }

    fn register(
        &self,
        key: ChannelKey,
        predicate: Option<Predicate>,
        callback: Callback,
    ) -> SubscriptionHandle {
        let (handle, ch) = self.inner.registry.subscribe(key, predicate, callback);
        if let Some((epoch, tx)) = self.inner.current_link() {
            self.inner.registry.join(&ch, epoch, &tx);
        }
        handle
    }

    /// Revokes one subscription.
    ///
    /// When the channel is left without subscriptions or buffered messages it
    /// is removed and, if connected, a `Leave` frame is sent.
    pub fn unsubscribe(&self, handle: SubscriptionHandle) {
        let Some(topic) = self.inner.registry.unsubscribe(&handle) else {
            return;
        };
        if let Some((_, tx)) = self.inner.current_link() {
            if tx.try_send(Frame::Leave { topic }).is_err() {
                tracing::debug!(channel = %handle.key(), "leave frame not written");
            }
        }
    }

    /// Sends `payload` on `key` without waiting.
    ///
    /// Written to the link when connected and the channel has nothing
    /// buffered; otherwise appended to the channel queue (drop-oldest).
    pub fn send(&self, key: &ChannelKey, payload: Value) -> Delivery {
        let inner = &self.inner;
        let link = inner.current_link();
        if let Some((epoch, tx)) = &link {
            inner.registry.join_key(key, *epoch, tx);
        }
        match inner.registry.send(key, payload, link.as_ref().map(|(_, tx)| tx)) {
            SendOutcome::Dispatched => Delivery::Sent,
            SendOutcome::Queued { link_closed } => {
                if let Some((epoch, _)) = link {
                    if link_closed {
                        inner.on_link_lost(epoch, ConnectionError::transient("link closed"));
                    } else {
                        inner.flush_wake.notify_one();
                    }
                }
                Delivery::Queued
            }
        }
    }

    /// Current state.
    pub fn state(&self) -> ConnectionState {
        self.inner.core.lock().state
    }

    /// Snapshot of state and link quality.
    pub fn connection_state(&self) -> ConnectionSnapshot {
        let (state, attempts) = {
            let core = self.inner.core.lock();
            (core.state, core.attempts)
        };
        let latency = self.inner.heartbeat.average();
        ConnectionSnapshot {
            state,
            latency,
            quality: LatencyTier::classify(latency),
            queue_depth: self.inner.registry.queue_depth(),
            reconnect_attempts: attempts,
            last_heartbeat_at: self.inner.heartbeat.last_ack(),
        }
    }

    /// Registers a state observer. Observers are called in registration order.
    pub fn add_observer<O: Observe>(&self, observer: O) -> ObserverId {
        self.inner.observers.add(Arc::new(observer))
    }

    /// Removes an observer. Returns `false` if it was not registered.
    pub fn remove_observer(&self, id: ObserverId) -> bool {
        self.inner.observers.remove(id)
    }

    /// Counters for one channel, if it is registered.
    pub fn channel_stats(&self, key: &ChannelKey) -> Option<ChannelStats> {
        self.inner.registry.stats(key)
    }

    /// Registered channels, sorted.
    pub fn channels(&self) -> Vec<ChannelKey> {
        self.inner.registry.keys()
    }

    /// Messages buffered for `key`, oldest first.
    pub fn queued(&self, key: &ChannelKey) -> Vec<QueuedMessage> {
        self.inner.registry.queued(key)
    }

    /// Replaces the bearer token used by the next attempt.
    pub fn set_token(&self, token: impl Into<String>) {
        *self.inner.token.write() = token.into();
    }

    /// True while a reconnection attempt is armed or running.
    pub fn reconnect_pending(&self) -> bool {
        self.inner.scheduler.is_pending()
    }

    /// Diagnostic event bus.
    pub fn bus(&self) -> &Bus {
        &self.inner.bus
    }

    /// Configuration this supervisor was built with.
    pub fn config(&self) -> &Config {
        &self.inner.cfg
    }

    pub(super) fn attach_observer(&self, observer: Arc<dyn Observe>) {
        self.inner.observers.add(observer);
    }
}

impl Inner {
    /// Mutates core state and announces the resulting transition, if any.
    fn with_transition<R>(&self, f: impl FnOnce(&mut Core) -> (R, Option<Transition>)) -> R {
        let _serial = self.serial.lock();
        let (out, transition) = {
            let mut core = self.core.lock();
            f(&mut core)
        };
        if let Some(t) = transition {
            self.announce(&t);
        }
        out
    }

    fn announce(&self, t: &Transition) {
        let reason = match &t.error {
            Some(err) => format!("{} -> {}: {}", t.from, t.to, err.as_message()),
            None => format!("{} -> {}", t.from, t.to),
        };
        tracing::debug!(seq = t.seq, from = %t.from, to = %t.to, "connection state changed");
        self.bus.publish(
            Event::new(EventKind::StateChanged)
                .with_state(t.to)
                .with_reason(reason),
        );
        self.observers.notify(t);
    }

    fn is_current(&self, epoch: u64) -> bool {
        self.core.lock().is_live(epoch)
    }

    fn current_link(&self) -> Option<(u64, mpsc::Sender<Frame>)> {
        let core = self.core.lock();
        match (&core.link, core.state) {
            (Some(slot), ConnectionState::Connected) => Some((core.epoch, slot.tx.clone())),
            _ => None,
        }
    }

    async fn attempt(
        self: Arc<Self>,
        epoch: u64,
        session: CancellationToken,
    ) -> Result<(), ConnectionError> {
        let attempt = self.core.lock().attempts.saturating_add(1);
        self.bus
            .publish(Event::new(EventKind::ConnectAttempt).with_attempt(attempt));
        let token = self.token.read().clone();

        let opened = tokio::select! {
            biased;
            _ = session.cancelled() => return Ok(()),
            res = self.transport.open(&token) => res,
        };
        match opened {
            Ok(link) => {
                self.on_link(epoch, link);
                Ok(())
            }
            Err(err) => self.on_failure(epoch, err),
        }
    }

    fn on_link(self: &Arc<Self>, epoch: u64, link: Link) {
        let Link { outbound, inbound } = link;
        let live = self.with_transition(|core| {
            if !core.is_live(epoch) || !core.state.is_pending() {
                return (None, None);
            }
            core.epoch += 1;
            core.attempts = 0;
            core.last_delay = Duration::ZERO;
            let token = core.session.child_token();
            core.link = Some(LinkSlot {
                tx: outbound.clone(),
                token: token.clone(),
                tasks: Vec::new(),
            });
            self.heartbeat.reset_link(Instant::now());
            let t = core.set_state(ConnectionState::Connected, None);
            (Some((core.epoch, token)), t)
        });
        let Some((epoch, token)) = live else {
            tracing::debug!("stale link discarded");
            return;
        };
        tracing::info!(transport = self.transport.name(), "link established");

        self.registry.join_all(epoch, &outbound);
        let tasks = vec![
            TaskHandle::spawn(token.clone(), Arc::clone(self).read_loop(epoch, inbound)),
            TaskHandle::spawn(
                token.clone(),
                Arc::clone(self).heartbeat_loop(epoch, token.clone(), outbound.clone()),
            ),
            TaskHandle::spawn(
                token.clone(),
                Arc::clone(self).flush_loop(epoch, token, outbound),
            ),
        ];
        let mut core = self.core.lock();
        if core.epoch == epoch {
            if let Some(slot) = core.link.as_mut() {
                slot.tasks = tasks;
            }
        }
    }

    fn on_failure(self: &Arc<Self>, epoch: u64, err: ConnectionError) -> Result<(), ConnectionError> {
        let retry = self.with_transition(|core| {
            if !core.is_live(epoch) || !core.state.is_pending() {
                return (Retry::Stale, None);
            }
            if err.class() == ErrorClass::Fatal {
                core.epoch += 1;
                core.drop_link();
                let t = core.set_state(ConnectionState::Failed, Some(err.clone()));
                return (Retry::GaveUp(err.clone()), t);
            }
            core.attempts = core.attempts.saturating_add(1);
            if let Some(limit) = self.cfg.attempt_limit() {
                if core.attempts > limit {
                    let exhausted = ConnectionError::MaxReconnectAttemptsExceeded {
                        attempts: core.attempts,
                        last_delay: core.last_delay,
                    };
                    core.epoch += 1;
                    let t = core.set_state(ConnectionState::Failed, Some(exhausted.clone()));
                    return (Retry::GaveUp(exhausted), t);
                }
            }
            let delay = self.cfg.backoff.delay(core.attempts);
            core.last_delay = delay;
            core.epoch += 1;
            let t = core.set_state(ConnectionState::Reconnecting, Some(err.clone()));
            let retry = Retry::After {
                epoch: core.epoch,
                session: core.session.clone(),
                attempts: core.attempts,
                delay,
            };
            (retry, t)
        });

        match retry {
            Retry::Stale => Ok(()),
            Retry::GaveUp(fatal) => {
                self.report_fatal(&fatal);
                Err(fatal)
            }
            Retry::After {
                epoch,
                session,
                attempts,
                delay,
            } => {
                tracing::debug!(attempts, delay_ms = delay.as_millis() as u64, error = %err, "reconnect scheduled");
                self.bus.publish(
                    Event::new(EventKind::ReconnectScheduled)
                        .with_attempt(attempts)
                        .with_delay(delay)
                        .with_reason(err.as_message()),
                );
                self.schedule_attempt(epoch, &session, delay);
                Ok(())
            }
        }
    }

    fn report_fatal(&self, err: &ConnectionError) {
        tracing::warn!(error = %err, label = err.as_label(), "connection failed");
        match err {
            ConnectionError::Authentication { reason } => {
                self.bus
                    .publish(Event::new(EventKind::AuthRejected).with_reason(reason.as_str()));
            }
            ConnectionError::MaxReconnectAttemptsExceeded { attempts, .. } => {
                self.bus
                    .publish(Event::new(EventKind::ReconnectExhausted).with_attempt(*attempts));
            }
            _ => {}
        }
    }

    fn schedule_attempt(self: &Arc<Self>, epoch: u64, session: &CancellationToken, delay: Duration) {
        let this = Arc::clone(self);
        let s = session.clone();
        self.scheduler.schedule(session, delay, async move {
            if let Err(err) = this.attempt(epoch, s).await {
                tracing::debug!(error = %err, "reconnection stopped");
            }
        });
    }

    /// Connected → Reconnecting. A lost link counts as a failure, so the
    /// first attempt waits `delay(1)` and a link that drops right after
    /// opening cannot spin.
    fn on_link_lost(self: &Arc<Self>, epoch: u64, err: ConnectionError) {
        let next = self.with_transition(|core| {
            if !core.is_live(epoch) || core.state != ConnectionState::Connected {
                return (None, None);
            }
            tracing::warn!(error = %err, "link lost");
            self.bus
                .publish(Event::new(EventKind::LinkLost).with_reason(err.as_message()));
            core.epoch += 1;
            core.drop_link();
            core.attempts = core.attempts.saturating_add(1);
            let delay = self.cfg.backoff.delay(core.attempts);
            core.last_delay = delay;
            let t = core.set_state(ConnectionState::Reconnecting, Some(err.clone()));
            (
                Some((core.epoch, core.session.clone(), core.attempts, delay)),
                t,
            )
        });
        if let Some((epoch, session, attempts, delay)) = next {
            self.bus.publish(
                Event::new(EventKind::ReconnectScheduled)
                    .with_attempt(attempts)
                    .with_delay(delay)
                    .with_reason(err.as_message()),
            );
            self.schedule_attempt(epoch, &session, delay);
        }
    }

    /// Connected → Failed on a fatal error reported by the link.
    fn fail(&self, epoch: u64, err: ConnectionError) {
        let failed = self.with_transition(|core| {
            if !core.is_live(epoch) {
                return (false, None);
            }
            core.epoch += 1;
            core.drop_link();
            (true, core.set_state(ConnectionState::Failed, Some(err.clone())))
        });
        if failed {
            self.report_fatal(&err);
        }
    }

    async fn read_loop(self: Arc<Self>, epoch: u64, mut inbound: mpsc::Receiver<Inbound>) {
        while let Some(frame) = inbound.recv().await {
            if !self.is_current(epoch) {
                return;
            }
            match frame {
                Inbound::Change {
                    topic,
                    operation,
                    payload,
                } => {
                    self.registry.route(&topic, &operation, payload);
                }
                Inbound::HeartbeatAck { seq } => {
                    if let Some(rtt) = self.heartbeat.on_ack(seq) {
                        self.bus
                            .publish(Event::new(EventKind::HeartbeatAck).with_latency(rtt));
                    }
                }
                Inbound::Error(err) => match err.class() {
                    ErrorClass::Protocol | ErrorClass::Local => {
                        tracing::warn!(error = %err, "link reported a bad message");
                        self.bus.publish(
                            Event::new(EventKind::ProtocolDropped).with_reason(err.as_message()),
                        );
                    }
                    ErrorClass::Fatal => {
                        self.fail(epoch, err);
                        return;
                    }
                    ErrorClass::Transient => {
                        self.on_link_lost(epoch, err);
                        return;
                    }
                },
            }
        }
        self.on_link_lost(epoch, ConnectionError::transient("link closed by peer"));
    }

    async fn heartbeat_loop(
        self: Arc<Self>,
        epoch: u64,
        token: CancellationToken,
        tx: mpsc::Sender<Frame>,
    ) {
        let Some(interval) = self.cfg.heartbeat() else {
            return;
        };
        let timeout = self.cfg.heartbeat_timeout_clamped();
        match self.heartbeat.run(interval, timeout, &tx, &token).await {
            HeartbeatExit::Cancelled => {}
            HeartbeatExit::TimedOut => {
                if self.is_current(epoch) {
                    self.bus
                        .publish(Event::new(EventKind::HeartbeatTimeout).with_timeout(timeout));
                }
                self.on_link_lost(epoch, ConnectionError::transient("heartbeat timeout"));
            }
            HeartbeatExit::LinkClosed => {
                self.on_link_lost(epoch, ConnectionError::transient("link closed"));
            }
        }
    }

    /// Drains queued messages after connecting and whenever `send()` buffers
    /// while connected. Waits for link capacity instead of giving up on a
    /// full link.
    async fn flush_loop(
        self: Arc<Self>,
        epoch: u64,
        token: CancellationToken,
        tx: mpsc::Sender<Frame>,
    ) {
        loop {
            // The link token is checked instead of the epoch: the core lock
            // must not be taken while a queue lock is held.
            let summary = self.registry.flush(&tx, || !token.is_cancelled());
            if summary.sent > 0 || summary.remaining > 0 {
                tracing::debug!(sent = summary.sent, remaining = summary.remaining, "flush pass");
            }
            if summary.link_closed {
                self.on_link_lost(epoch, ConnectionError::transient("link closed"));
                return;
            }
            if !self.is_current(epoch) {
                return;
            }
            if summary.link_full {
                tokio::select! {
                    biased;
                    _ = token.cancelled() => return,
                    permit = tx.reserve() => {
                        if permit.is_err() {
                            self.on_link_lost(epoch, ConnectionError::transient("link closed"));
                            return;
                        }
                    }
                }
                continue;
            }
            tokio::select! {
                biased;
                _ = token.cancelled() => return,
                _ = self.flush_wake.notified() => {}
            }
        }
    }
}
