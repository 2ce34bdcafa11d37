//! # Heartbeat monitor: liveness probes and latency quality.
//!
//! While Connected, the supervisor runs [`HeartbeatMonitor::run`] on its own
//! task. The loop writes a [`Frame::Heartbeat`] every `interval` and keeps a
//! deadline of `last_alive + timeout`, where `last_alive` is the link start or
//! the last matching acknowledgement, whichever is later.
//!
//! ```text
//! loop {
//!   select! {
//!     cancelled          ─► Cancelled
//!     sleep_until(deadline) ─► still no ack? ─► TimedOut (loop ends)
//!     interval.tick()    ─► try_send(Heartbeat{seq}) ─► closed? ─► LinkClosed
//!   }
//! }
//! on_ack(seq) ─► rtt = now - sent_at(seq) ─► rolling window (last K) ─► last_alive = now
//! ```
//!
//! A timeout ends the loop, so each link produces at most one timeout.

use std::collections::VecDeque;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::time::{self, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::transport::Frame;

/// Unacknowledged probes remembered per link.
const MAX_PENDING: usize = 8;

/// Why the heartbeat loop returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum HeartbeatExit {
    Cancelled,
    TimedOut,
    LinkClosed,
}

#[derive(Debug)]
struct Quality {
    samples: VecDeque<Duration>,
    pending: VecDeque<(u64, Instant)>,
    next_seq: u64,
    last_alive: Instant,
    last_ack: Option<Instant>,
}

/// Probe bookkeeping shared between the heartbeat task and the reader task.
#[derive(Debug)]
pub(crate) struct HeartbeatMonitor {
    window: usize,
    quality: Mutex<Quality>,
}

impl HeartbeatMonitor {
    pub(crate) fn new(window: usize) -> Self {
        Self {
            window: window.max(1),
            quality: Mutex::new(Quality {
                samples: VecDeque::new(),
                pending: VecDeque::new(),
                next_seq: 1,
                last_alive: Instant::now(),
                last_ack: None,
            }),
        }
    }

    /// Starts liveness tracking for a fresh link. Latency samples are kept.
    pub(crate) fn reset_link(&self, now: Instant) {
        let mut q = self.quality.lock();
        q.pending.clear();
        q.last_alive = now;
    }

    /// Forgets everything, including latency history.
    pub(crate) fn clear(&self) {
        let mut q = self.quality.lock();
        q.samples.clear();
        q.pending.clear();
        q.last_ack = None;
        q.last_alive = Instant::now();
    }

    fn begin_probe(&self, now: Instant) -> u64 {
        let mut q = self.quality.lock();
        let seq = q.next_seq;
        q.next_seq += 1;
        if q.pending.len() == MAX_PENDING {
            q.pending.pop_front();
        }
        q.pending.push_back((seq, now));
        seq
    }

    fn deadline(&self, timeout: Duration) -> Instant {
        self.quality.lock().last_alive + timeout
    }

    /// Records an acknowledgement. Returns the round trip if `seq` was pending.
    pub(crate) fn on_ack(&self, seq: u64) -> Option<Duration> {
        let now = Instant::now();
        let mut q = self.quality.lock();
        let idx = q.pending.iter().position(|(s, _)| *s == seq)?;
        let (_, sent_at) = q.pending.remove(idx)?;
        // older probes can no longer be answered in order
        q.pending.drain(..idx);
        let rtt = now.saturating_duration_since(sent_at);
        if q.samples.len() == self.window {
            q.samples.pop_front();
        }
        q.samples.push_back(rtt);
        q.last_alive = now;
        q.last_ack = Some(now);
        Some(rtt)
    }

    /// Rolling average over the last K round trips.
    pub(crate) fn average(&self) -> Option<Duration> {
        let q = self.quality.lock();
        if q.samples.is_empty() {
            return None;
        }
        let total: Duration = q.samples.iter().sum();
        Some(total / q.samples.len() as u32)
    }

    pub(crate) fn last_ack(&self) -> Option<Instant> {
        self.quality.lock().last_ack
    }

    /// Probe loop for one link.
    pub(crate) async fn run(
        &self,
        interval: Duration,
        timeout: Duration,
        tx: &mpsc::Sender<Frame>,
        token: &CancellationToken,
    ) -> HeartbeatExit {
        let mut ticker = time::interval_at(Instant::now() + interval, interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            let deadline = self.deadline(timeout);
            tokio::select! {
                biased;
                _ = token.cancelled() => return HeartbeatExit::Cancelled,
                _ = time::sleep_until(deadline) => {
                    if self.deadline(timeout) <= Instant::now() {
                        return HeartbeatExit::TimedOut;
                    }
                }
                _ = ticker.tick() => {
                    let seq = self.begin_probe(Instant::now());
                    match tx.try_send(Frame::Heartbeat { seq }) {
                        Ok(()) => {}
                        Err(TrySendError::Full(_)) => {
                            tracing::debug!(seq, "heartbeat skipped: link buffer full");
                        }
                        Err(TrySendError::Closed(_)) => return HeartbeatExit::LinkClosed,
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn probe_seq(frame: Frame) -> u64 {
        match frame {
            Frame::Heartbeat { seq } => seq,
            other => panic!("unexpected frame {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn times_out_once_without_acks() {
        let mon = HeartbeatMonitor::new(5);
        let (tx, mut rx) = mpsc::channel(8);
        let token = CancellationToken::new();
        let start = Instant::now();
        mon.reset_link(start);

        let exit = mon
            .run(Duration::from_secs(30), Duration::from_secs(45), &tx, &token)
            .await;

        assert_eq!(exit, HeartbeatExit::TimedOut);
        assert_eq!(start.elapsed(), Duration::from_secs(45));
        assert_eq!(probe_seq(rx.try_recv().unwrap()), 1);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn acks_push_the_deadline_and_feed_latency() {
        let mon = std::sync::Arc::new(HeartbeatMonitor::new(2));
        let (tx, mut rx) = mpsc::channel(8);
        let token = CancellationToken::new();
        mon.reset_link(Instant::now());

        let responder = {
            let mon = mon.clone();
            let token = token.clone();
            tokio::spawn(async move {
                let mut answered = 0;
                while let Some(frame) = rx.recv().await {
                    let seq = probe_seq(frame);
                    time::sleep(Duration::from_millis(40 * seq)).await;
                    mon.on_ack(seq);
                    answered += 1;
                    if answered == 3 {
                        token.cancel();
                    }
                }
            })
        };

        let exit = mon
            .run(Duration::from_secs(30), Duration::from_secs(45), &tx, &token)
            .await;
        assert_eq!(exit, HeartbeatExit::Cancelled);
        drop(tx);
        responder.await.unwrap();

        // window of 2 keeps the 80ms and 120ms samples
        assert_eq!(mon.average(), Some(Duration::from_millis(100)));
        assert!(mon.last_ack().is_some());
    }

    #[test]
    fn unknown_ack_is_ignored() {
        let mon = HeartbeatMonitor::new(5);
        assert_eq!(mon.on_ack(42), None);
        assert_eq!(mon.average(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn closed_link_ends_the_loop() {
        let mon = HeartbeatMonitor::new(5);
        let (tx, rx) = mpsc::channel(1);
        drop(rx);
        let token = CancellationToken::new();
        mon.reset_link(Instant::now());
        let exit = mon
            .run(Duration::from_secs(1), Duration::from_secs(5), &tx, &token)
            .await;
        assert_eq!(exit, HeartbeatExit::LinkClosed);
    }
}
