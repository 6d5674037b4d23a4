//! Shared types and pure helpers for the flowlink client.

pub mod address;
pub mod error;
pub mod models;
pub mod protocol;

pub use address::*;
pub use error::*;
pub use models::*;
pub use protocol::*;
