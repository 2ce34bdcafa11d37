//! Error types used by the channelvisor runtime.
//!
//! [`ConnectionError`] is the single taxonomy shared by the supervisor, the
//! upstream [`Transport`](crate::Transport) and the channel layer. Every
//! variant belongs to one [`ErrorClass`], which decides how the runtime reacts:
//!
//! - [`ErrorClass::Transient`] retried through the reconnection scheduler;
//! - [`ErrorClass::Fatal`] surfaced to the caller, never retried;
//! - [`ErrorClass::Protocol`] the offending message is logged and dropped.
//!
//! Helper methods (`as_label`, `as_message`) exist for logging/metrics.

use std::time::Duration;
use thiserror::Error;

/// How the runtime reacts to a [`ConnectionError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Absorbed internally and retried with backoff.
    Transient,
    /// Terminal for the current session; requires an explicit `connect()`.
    Fatal,
    /// Affects a single message only; the connection is left alone.
    Protocol,
    /// Local, non-fatal condition reported for observability.
    Local,
}

/// # Errors produced by the connection layer.
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConnectionError {
    /// Network-level failure (refused, reset, dropped link, missed heartbeat).
    #[error("transient network error: {reason}")]
    TransientNetwork {
        /// The underlying reason.
        reason: String,
    },

    /// Credentials were rejected by the backend (no retry).
    #[error("authentication failed: {reason}")]
    Authentication {
        /// Message from the backend.
        reason: String,
    },

    /// A single inbound or outbound message violated the wire protocol.
    #[error("protocol error: {reason}")]
    Protocol {
        /// What was wrong with the message.
        reason: String,
    },

    /// A buffered message was evicted because its channel queue was full.
    #[error("queue for {channel} full at capacity {capacity}; oldest message discarded")]
    QueueOverflow {
        /// Channel whose queue overflowed.
        channel: String,
        /// Configured queue capacity.
        capacity: usize,
    },

    /// The reconnection scheduler gave up.
    #[error("gave up after {attempts} reconnect attempts (last delay {last_delay:?})")]
    MaxReconnectAttemptsExceeded {
        /// Number of failed attempts.
        attempts: u32,
        /// Last backoff delay that was waited.
        last_delay: Duration,
    },
}

impl ConnectionError {
    /// Shorthand for [`ConnectionError::TransientNetwork`].
    pub fn transient(reason: impl Into<String>) -> Self {
        ConnectionError::TransientNetwork {
            reason: reason.into(),
        }
    }

    /// Shorthand for [`ConnectionError::Authentication`].
    pub fn auth(reason: impl Into<String>) -> Self {
        ConnectionError::Authentication {
            reason: reason.into(),
        }
    }

    /// Shorthand for [`ConnectionError::Protocol`].
    pub fn protocol(reason: impl Into<String>) -> Self {
        ConnectionError::Protocol {
            reason: reason.into(),
        }
    }

    /// Returns a short stable label (snake_case) for use in logs/metrics.
    ///
    /// # Example
    /// ```
    /// use channelvisor::ConnectionError;
    ///
    /// let err = ConnectionError::auth("token expired");
    /// assert_eq!(err.as_label(), "authentication_failed");
    /// ```
    pub fn as_label(&self) -> &'static str {
        match self {
            ConnectionError::TransientNetwork { .. } => "transient_network",
            ConnectionError::Authentication { .. } => "authentication_failed",
            ConnectionError::Protocol { .. } => "protocol_error",
            ConnectionError::QueueOverflow { .. } => "queue_overflow",
            ConnectionError::MaxReconnectAttemptsExceeded { .. } => "max_reconnect_attempts",
        }
    }

    /// Returns a human-readable message with details about the error.
    pub fn as_message(&self) -> String {
        match self {
            ConnectionError::TransientNetwork { reason } => format!("network: {reason}"),
            ConnectionError::Authentication { reason } => format!("auth: {reason}"),
            ConnectionError::Protocol { reason } => format!("protocol: {reason}"),
            ConnectionError::QueueOverflow { channel, capacity } => {
                format!("overflow: channel={channel} capacity={capacity}")
            }
            ConnectionError::MaxReconnectAttemptsExceeded { attempts, .. } => {
                format!("exhausted: attempts={attempts}")
            }
        }
    }

    /// Classifies the error.
    pub fn class(&self) -> ErrorClass {
        match self {
            ConnectionError::TransientNetwork { .. } => ErrorClass::Transient,
            ConnectionError::Authentication { .. }
            | ConnectionError::MaxReconnectAttemptsExceeded { .. } => ErrorClass::Fatal,
            ConnectionError::Protocol { .. } => ErrorClass::Protocol,
            ConnectionError::QueueOverflow { .. } => ErrorClass::Local,
        }
    }

    /// Indicates whether the scheduler may retry after this error.
    ///
    /// # Example
    /// ```
    /// use channelvisor::ConnectionError;
    ///
    /// assert!(ConnectionError::transient("reset by peer").is_retryable());
    /// assert!(!ConnectionError::auth("bad token").is_retryable());
    /// ```
    pub fn is_retryable(&self) -> bool {
        matches!(self.class(), ErrorClass::Transient)
    }

    /// Indicates whether the error ends the session (state `Failed`).
    pub fn is_fatal(&self) -> bool {
        matches!(self.class(), ErrorClass::Fatal)
    }
}
