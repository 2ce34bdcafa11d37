//! Scripted in-memory transport shared by the integration tests.
#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use channelvisor::{
    BackoffPolicy, Config, ConnectionError, Event, EventKind, Frame, Inbound, JitterPolicy, Link,
    Supervisor, Transition, Transport,
};
use parking_lot::Mutex;
use tokio::sync::{broadcast, mpsc};
use tokio::time::Instant;

/// Installs a fmt subscriber once; honors `RUST_LOG`.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Scripted result of one `open()` call.
#[derive(Debug, Clone)]
pub enum Outcome {
    Accept,
    /// Accepts, then drops the link before any frame is read.
    Flap,
    Fail(ConnectionError),
}

impl Outcome {
    pub fn refused() -> Self {
        Outcome::Fail(ConnectionError::transient("connection refused"))
    }
}

/// Backend side of one accepted link.
pub struct Remote {
    pub frames: mpsc::Receiver<Frame>,
    pub inject: Option<mpsc::Sender<Inbound>>,
}

#[derive(Default)]
pub struct MockTransport {
    script: Mutex<VecDeque<Outcome>>,
    opens: Mutex<Vec<(Instant, String)>>,
    remotes: Mutex<Vec<Remote>>,
    link_capacity: usize,
}

impl MockTransport {
    /// Outcomes are consumed in order; once exhausted every open succeeds.
    pub fn new(script: impl IntoIterator<Item = Outcome>) -> Arc<Self> {
        Self::with_capacity(script, 256)
    }

    pub fn with_capacity(script: impl IntoIterator<Item = Outcome>, link_capacity: usize) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(script.into_iter().collect()),
            opens: Mutex::new(Vec::new()),
            remotes: Mutex::new(Vec::new()),
            link_capacity,
        })
    }

    pub fn open_count(&self) -> usize {
        self.opens.lock().len()
    }

    pub fn open_times(&self) -> Vec<Instant> {
        self.opens.lock().iter().map(|(at, _)| *at).collect()
    }

    pub fn tokens(&self) -> Vec<String> {
        self.opens.lock().iter().map(|(_, t)| t.clone()).collect()
    }

    pub fn link_count(&self) -> usize {
        self.remotes.lock().len()
    }

    /// Delivers an inbound frame on link `idx`.
    pub fn inject(&self, idx: usize, frame: Inbound) {
        let tx = self.remotes.lock()[idx].inject.clone();
        if let Some(tx) = tx {
            tx.try_send(frame).expect("inject inbound frame");
        }
    }

    /// Simulates the backend dropping link `idx`.
    pub fn drop_link(&self, idx: usize) {
        self.remotes.lock()[idx].inject = None;
    }

    /// Frames written by the supervisor on link `idx` so far.
    pub fn drain(&self, idx: usize) -> Vec<Frame> {
        let mut remotes = self.remotes.lock();
        let mut out = Vec::new();
        while let Ok(frame) = remotes[idx].frames.try_recv() {
            out.push(frame);
        }
        out
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn open(&self, token: &str) -> Result<Link, ConnectionError> {
        self.opens.lock().push((Instant::now(), token.to_string()));
        let outcome = self.script.lock().pop_front().unwrap_or(Outcome::Accept);
        match outcome {
            Outcome::Fail(err) => Err(err),
            Outcome::Accept | Outcome::Flap => {
                let (out_tx, out_rx) = mpsc::channel(self.link_capacity.max(1));
                let (in_tx, in_rx) = mpsc::channel(256);
                let inject = matches!(outcome, Outcome::Accept).then_some(in_tx);
                self.remotes.lock().push(Remote {
                    frames: out_rx,
                    inject,
                });
                Ok(Link::new(out_tx, in_rx))
            }
        }
    }

    fn name(&self) -> &'static str {
        "mock"
    }
}

/// Reference configuration without jitter so delays are exact.
pub fn config() -> Config {
    Config {
        backoff: BackoffPolicy {
            jitter: JitterPolicy::None,
            ..BackoffPolicy::default()
        },
        ..Config::default()
    }
}

/// Config with heartbeats disabled.
pub fn quiet_config() -> Config {
    Config {
        heartbeat_interval: Duration::ZERO,
        ..config()
    }
}

pub fn supervisor(cfg: Config, transport: &Arc<MockTransport>) -> Supervisor {
    init_tracing();
    Supervisor::builder(cfg, transport.clone())
        .with_token("token-1")
        .build()
}

/// Records every transition seen by an observer.
pub fn record_transitions(sup: &Supervisor) -> Arc<Mutex<Vec<Transition>>> {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    sup.add_observer(move |t: &Transition| sink.lock().push(t.clone()));
    seen
}

pub fn millis(d: Duration) -> u64 {
    d.as_millis() as u64
}

/// Asserts `actual` is within 5ms of `expected_ms`.
pub fn assert_close(actual: Duration, expected_ms: u64) {
    let got = millis(actual);
    assert!(
        got.abs_diff(expected_ms) <= 5,
        "expected ~{expected_ms}ms, got {got}ms"
    );
}

/// Kinds of every event received so far.
pub fn event_kinds(rx: &mut broadcast::Receiver<Event>) -> Vec<EventKind> {
    let mut out = Vec::new();
    loop {
        match rx.try_recv() {
            Ok(ev) => out.push(ev.kind),
            Err(broadcast::error::TryRecvError::Lagged(_)) => continue,
            Err(_) => return out,
        }
    }
}

/// Lets spawned tasks run without moving the clock meaningfully.
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(1)).await;
}
