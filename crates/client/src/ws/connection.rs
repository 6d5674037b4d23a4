//! Connection state, reconnect policy and the publish handle.

use futures_channel::mpsc::UnboundedSender;
use serde::Serialize;
use thiserror::Error;
use tokio::sync::watch;

/// Connection state of a [`ConnectionManager`](super::ConnectionManager).
#[derive(Debug, Clone, PartialEq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    /// Waiting out the reconnect delay. `attempt` counts consecutive attempts
    /// since the last successful open, starting at 1.
    ReconnectPending { attempt: u32 },
    /// Gave up after `max_attempts` consecutive failures.
    Failed { reason: String },
}

impl ConnectionState {
    pub fn is_connected(&self) -> bool {
        matches!(self, ConnectionState::Connected)
    }

    pub fn is_connecting(&self) -> bool {
        matches!(
            self,
            ConnectionState::Connecting | ConnectionState::ReconnectPending { .. }
        )
    }
}

/// Configuration for auto-reconnect behavior
#[derive(Debug, Clone, PartialEq)]
pub struct ReconnectConfig {
    /// Maximum number of consecutive failed attempts (0 = infinite)
    pub max_attempts: u32,
    /// Delay before the first reconnect, in milliseconds
    pub initial_delay_ms: u32,
    /// Maximum delay in milliseconds
    pub max_delay_ms: u32,
    /// Multiplier for exponential backoff
    pub backoff_multiplier: f32,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            max_attempts: 0,
            initial_delay_ms: 1000,
            max_delay_ms: 30000,
            backoff_multiplier: 2.0,
        }
    }
}

impl ReconnectConfig {
    /// Delay before reconnecting, given how many consecutive attempts have
    /// already failed since the last successful open.
    pub fn delay_for_attempt(&self, failed_attempts: u32) -> u32 {
        let exponent = failed_attempts.min(i32::MAX as u32) as i32;
        let delay = self.initial_delay_ms as f64 * (self.backoff_multiplier as f64).powi(exponent);
        if delay.is_finite() {
            (delay as u32).min(self.max_delay_ms)
        } else {
            self.max_delay_ms
        }
    }

    /// True once `failed_attempts` consecutive failures exhaust the cap.
    pub fn is_exhausted(&self, failed_attempts: u32) -> bool {
        self.max_attempts > 0 && failed_attempts >= self.max_attempts
    }
}

/// Errors returned when publishing.
#[derive(Debug, Error)]
pub enum ConnectionError {
    #[error("not connected (state: {0:?})")]
    NotConnected(ConnectionState),
    #[error("connection loop has stopped")]
    Closed,
    #[error("failed to serialize message: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Cloneable handle for publishing over a managed connection.
#[derive(Clone)]
pub struct FlowHandle {
    sender: UnboundedSender<String>,
    state: watch::Receiver<ConnectionState>,
}

impl FlowHandle {
    pub(crate) fn new(
        sender: UnboundedSender<String>,
        state: watch::Receiver<ConnectionState>,
    ) -> Self {
        Self { sender, state }
    }

    pub fn state(&self) -> ConnectionState {
        self.state.borrow().clone()
    }

    /// Serialize `message` to JSON and queue it on the live connection.
    ///
    /// Rejected unless the connection is currently open. A message accepted
    /// right as the transport drops is sent on the next session.
    pub fn publish<T: Serialize + ?Sized>(&self, message: &T) -> Result<(), ConnectionError> {
        let state = self.state();
        if !state.is_connected() {
            return Err(ConnectionError::NotConnected(state));
        }

        let json = serde_json::to_string(message)?;
        tracing::debug!("Queueing outbound frame: {}", json);
        self.sender
            .unbounded_send(json)
            .map_err(|_| ConnectionError::Closed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_channel::mpsc::unbounded;
    use futures_util::StreamExt;
    use serde_json::json;

    #[test]
    fn default_policy_starts_at_one_second() {
        let config = ReconnectConfig::default();
        assert_eq!(config.delay_for_attempt(0), 1000);
        assert_eq!(config.delay_for_attempt(1), 2000);
        assert_eq!(config.delay_for_attempt(3), 8000);
        assert_eq!(config.delay_for_attempt(10), 30000);
        assert_eq!(config.delay_for_attempt(u32::MAX), 30000);
        assert!(!config.is_exhausted(1_000_000));
    }

    #[test]
    fn fixed_delay_with_unit_multiplier() {
        let config = ReconnectConfig {
            backoff_multiplier: 1.0,
            ..ReconnectConfig::default()
        };
        assert!((0..20).all(|n| config.delay_for_attempt(n) == 1000));
    }

    #[test]
    fn capped_policy_exhausts() {
        let config = ReconnectConfig {
            max_attempts: 3,
            ..ReconnectConfig::default()
        };
        assert!(!config.is_exhausted(2));
        assert!(config.is_exhausted(3));
    }

    #[test]
    fn publish_is_rejected_while_disconnected() {
        let (tx, _rx) = unbounded();
        let (_state_tx, state_rx) = watch::channel(ConnectionState::Disconnected);
        let handle = FlowHandle::new(tx, state_rx);

        let err = handle.publish(&json!({"type": "cmd.ping"})).unwrap_err();
        assert!(matches!(err, ConnectionError::NotConnected(ConnectionState::Disconnected)));
    }

    #[tokio::test]
    async fn publish_serializes_when_connected() {
        let (tx, mut rx) = unbounded();
        let (_state_tx, state_rx) = watch::channel(ConnectionState::Connected);
        let handle = FlowHandle::new(tx, state_rx);

        handle.publish(&json!({"type": "cmd.ping"})).unwrap();
        assert_eq!(rx.next().await.unwrap(), r#"{"type":"cmd.ping"}"#);
    }
}
