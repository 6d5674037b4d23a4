//! Flowlink client
//!
//! Follows a flow service's event socket, keeps an in-memory mirror of the
//! device structure and states, and fetches time-series for charting.

pub mod api_client;
pub mod config;
pub mod flow_client;
pub mod stores;
pub mod timeseries;
pub mod ws;

pub use api_client::ApiClient;
pub use config::FlowConfig;
pub use flow_client::{FlowClient, FlowEvent};
pub use stores::{SharedStore, StructureStateStore};
