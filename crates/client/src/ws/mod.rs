//! WebSocket connection to the flow service.
//!
//! # Architecture
//!
//! ```text
//!        ConnectionManager::configure(handler)
//!                      │
//!                      ▼
//!   ┌──────────────────────────────────────┐
//!   │            dispatch loop             │◄── outbound queue (FlowHandle::publish)
//!   │  Connecting → Connected → Reconnect  │
//!   └──────────────────────────────────────┘
//!          ▲                     │
//!   TransportEvent               ▼
//!   (Opened/Frame/Closed)    handler(Envelope)
//!          │
//!   per-session reader task
//! ```
//!
//! Frames that are not valid envelopes are logged and dropped; they never
//! reach the handler. Every close schedules a reconnect bound to the same
//! manager until [`ConnectionManager::close`] is called or the manager is
//! dropped.

mod connection;
mod manager;

pub use connection::{ConnectionError, ConnectionState, FlowHandle, ReconnectConfig};
pub use manager::{ConnectionManager, MessageHandler, TransportEvent};
