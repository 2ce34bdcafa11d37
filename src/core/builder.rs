use std::sync::Arc;

use tokio::sync::broadcast::{Receiver, error::RecvError};

use crate::{
    core::Config,
    events::{Bus, Event},
    subscribers::{Subscribe, SubscriberSet},
    transport::Transport,
};

use super::observers::Observe;
use super::supervisor::Supervisor;

/// Builder for constructing a [`Supervisor`] with optional features.
pub struct SupervisorBuilder {
    cfg: Config,
    transport: Arc<dyn Transport>,
    token: String,
    subscribers: Vec<Arc<dyn Subscribe>>,
    observers: Vec<Arc<dyn Observe>>,
}

impl SupervisorBuilder {
    /// Creates a new builder with the given configuration and transport.
    pub fn new(cfg: Config, transport: Arc<dyn Transport>) -> Self {
        Self {
            cfg,
            transport,
            token: String::new(),
            subscribers: Vec::new(),
            observers: Vec::new(),
        }
    }

    /// Sets the bearer token used when opening links.
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = token.into();
        self
    }

    /// Sets diagnostic event subscribers.
    ///
    /// Subscribers receive bus events (state changes, backoff, throttling,
    /// panics) through dedicated workers with bounded queues.
    pub fn with_subscribers(mut self, subscribers: Vec<Arc<dyn Subscribe>>) -> Self {
        self.subscribers = subscribers;
        self
    }

    /// Registers a state observer before the first transition can happen.
    pub fn with_observer<O: Observe>(mut self, observer: O) -> Self {
        self.observers.push(Arc::new(observer));
        self
    }

    /// Builds the supervisor.
    ///
    /// With subscribers configured this spawns the fan-out workers, so it must
    /// be called inside a tokio runtime.
    pub fn build(self) -> Supervisor {
        let bus = Bus::new(self.cfg.bus_capacity_clamped());
        if !self.subscribers.is_empty() {
            let set = Arc::new(SubscriberSet::new(self.subscribers, bus.clone()));
            subscriber_listener(bus.subscribe(), set);
        }

        let sup = Supervisor::new_internal(self.cfg, self.transport, self.token, bus);
        for obs in self.observers {
            sup.attach_observer(obs);
        }
        sup
    }
}

/// Forwards bus events to the subscriber set (fire-and-forget).
fn subscriber_listener(mut rx: Receiver<Event>, set: Arc<SubscriberSet>) {
    tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(ev) => set.emit(&ev),
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "event listener lagged; events skipped");
                }
                Err(RecvError::Closed) => break,
            }
        }
    });
}
