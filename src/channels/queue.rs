//! # Bounded outbound buffer for one channel.
//!
//! [`MessageQueue`] holds messages sent while the link is down.
//!
//! ## Rules
//! - **Bounded**: `len() <= capacity()` at all times (capacity clamped to >= 1).
//! - **Drop-oldest**: enqueueing into a full queue evicts the head and counts it.
//! - **Strict FIFO flush**: [`MessageQueue::drain_with`] hands messages out in
//!   arrival order and removes one only after it was sent; the first failure
//!   stops the drain and leaves that message at the head.
//!
//! ```text
//! enqueue(m151) on a full queue [m51 .. m150]:
//!   evict m51 ──► [m52 .. m151]
//!
//! drain_with(send):
//!   send(&m52) ok  ─► pop
//!   send(&m53) err ─► stop, queue = [m53 .. m151]
//! ```

use std::collections::VecDeque;

use serde_json::Value;
use tokio::time::Instant;

use crate::channels::key::ChannelKey;

/// Message buffered while not connected.
#[derive(Debug, Clone, PartialEq)]
pub struct QueuedMessage {
    /// Destination channel.
    pub key: ChannelKey,
    /// Opaque payload.
    pub payload: Value,
    /// When `send()` buffered it.
    pub enqueued_at: Instant,
}

/// Result of one [`MessageQueue::drain_with`] pass.
#[derive(Debug)]
pub struct DrainReport<E> {
    /// Messages sent and removed.
    pub sent: usize,
    /// Messages still buffered.
    pub remaining: usize,
    /// Error that stopped the pass, if any.
    pub stopped: Option<E>,
}

/// Bounded drop-oldest FIFO.
#[derive(Debug)]
pub struct MessageQueue {
    items: VecDeque<QueuedMessage>,
    capacity: usize,
    evicted: u64,
}

impl MessageQueue {
    /// Creates an empty queue; `capacity` is clamped to a minimum of 1.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            items: VecDeque::with_capacity(capacity.min(1024)),
            capacity,
            evicted: 0,
        }
    }

    /// Appends a message, evicting and returning the oldest one if full.
    pub fn enqueue(&mut self, msg: QueuedMessage) -> Option<QueuedMessage> {
        let evicted = if self.items.len() >= self.capacity {
            self.evicted += 1;
            self.items.pop_front()
        } else {
            None
        };
        self.items.push_back(msg);
        evicted
    }

    /// Sends buffered messages in order until `send` fails or the queue is empty.
    ///
    /// A message is removed only after `send` returned `Ok`.
    pub fn drain_with<E, F>(&mut self, mut send: F) -> DrainReport<E>
    where
        F: FnMut(&QueuedMessage) -> Result<(), E>,
    {
        let mut sent = 0;
        let mut stopped = None;
        while let Some(head) = self.items.front() {
            match send(head) {
                Ok(()) => {
                    self.items.pop_front();
                    sent += 1;
                }
                Err(e) => {
                    stopped = Some(e);
                    break;
                }
            }
        }
        DrainReport {
            sent,
            remaining: self.items.len(),
            stopped,
        }
    }

    /// Buffered messages, oldest first.
    pub fn iter(&self) -> impl Iterator<Item = &QueuedMessage> {
        self.items.iter()
    }

    /// Number of buffered messages.
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Returns `true` if nothing is buffered.
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Configured capacity.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Total messages evicted by overflow.
    pub fn evicted(&self) -> u64 {
        self.evicted
    }

    /// Drops every buffered message (eviction counter is kept).
    pub fn clear(&mut self) {
        self.items.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn msg(n: u64) -> QueuedMessage {
        QueuedMessage {
            key: ChannelKey::orders("q"),
            payload: json!(n),
            enqueued_at: Instant::now(),
        }
    }

    fn payloads(q: &MessageQueue) -> Vec<u64> {
        q.iter().filter_map(|m| m.payload.as_u64()).collect()
    }

    #[tokio::test(start_paused = true)]
    async fn keeps_most_recent_on_overflow() {
        let mut q = MessageQueue::new(100);
        for n in 1..=150 {
            q.enqueue(msg(n));
        }
        assert_eq!(q.len(), 100);
        assert_eq!(q.evicted(), 50);
        assert_eq!(payloads(&q), (51..=150).collect::<Vec<_>>());
    }

    #[tokio::test(start_paused = true)]
    async fn drain_stops_on_failure_without_reordering() {
        let mut q = MessageQueue::new(10);
        for n in 1..=5 {
            q.enqueue(msg(n));
        }
        let mut out = Vec::new();
        let report = q.drain_with(|m| {
            let n = m.payload.as_u64().unwrap_or_default();
            if n == 3 {
                return Err("link full");
            }
            out.push(n);
            Ok(())
        });
        assert_eq!(report.sent, 2);
        assert_eq!(report.remaining, 3);
        assert_eq!(report.stopped, Some("link full"));
        assert_eq!(out, vec![1, 2]);
        assert_eq!(payloads(&q), vec![3, 4, 5]);

        let report = q.drain_with(|m| {
            out.push(m.payload.as_u64().unwrap_or_default());
            Ok::<_, ()>(())
        });
        assert_eq!(report.sent, 3);
        assert!(q.is_empty());
        assert_eq!(out, vec![1, 2, 3, 4, 5]);
    }

    #[tokio::test(start_paused = true)]
    async fn zero_capacity_is_clamped() {
        let mut q = MessageQueue::new(0);
        assert!(q.enqueue(msg(1)).is_none());
        assert_eq!(q.enqueue(msg(2)).map(|m| m.payload), Some(json!(1)));
        assert_eq!(q.capacity(), 1);
    }
}
