//! Wires address resolution, the HTTP API, the event socket and the state
//! store together for one flow.

use std::sync::atomic::{AtomicBool, Ordering};

use flowlink_shared::{AddressContext, ApiError, EnvelopeError, StateKey};
use serde::Serialize;
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver};

use crate::api_client::ApiClient;
use crate::config::FlowConfig;
use crate::stores::{SharedStore, StructureStateStore, UpdateOutcome};
use crate::timeseries::{render_series, ChartSink};
use crate::ws::{ConnectionError, ConnectionManager, FlowHandle};

/// What happened to an inbound envelope.
#[derive(Debug, Clone, PartialEq)]
pub enum FlowEvent {
    StateUpdated {
        key: StateKey,
        outcome: UpdateOutcome,
    },
    /// The envelope could not be keyed; the store was not touched.
    EnvelopeRejected { error: EnvelopeError },
}

pub struct FlowClient {
    context: AddressContext,
    api: ApiClient,
    store: SharedStore,
    connection: ConnectionManager,
    started: AtomicBool,
}

impl FlowClient {
    pub fn new(config: &FlowConfig) -> Self {
        let context = config.address_context();
        let api = ApiClient::new(context.clone()).with_timeout(config.http_timeout);
        let connection = ConnectionManager::new(context.ws_url(), config.reconnect.clone());

        Self {
            context,
            api,
            store: SharedStore::default(),
            connection,
            started: AtomicBool::new(false),
        }
    }

    /// Build a client from already-constructed parts.
    pub fn from_parts(
        context: AddressContext,
        api: ApiClient,
        connection: ConnectionManager,
    ) -> Self {
        Self {
            context,
            api,
            store: SharedStore::default(),
            connection,
            started: AtomicBool::new(false),
        }
    }

    pub fn context(&self) -> &AddressContext {
        &self.context
    }

    pub fn api(&self) -> &ApiClient {
        &self.api
    }

    pub fn store(&self) -> &SharedStore {
        &self.store
    }

    pub fn connection(&self) -> &ConnectionManager {
        &self.connection
    }

    /// Seed the store from the snapshot endpoint.
    pub async fn load_snapshot(&self) -> Result<usize, ApiError> {
        let snapshot = self.api.load_full_struct_and_states().await?;
        let mut store = self.store.write();
        *store = StructureStateStore::from_snapshot(snapshot);
        tracing::info!(
            "Loaded {} things and {} states",
            store.things().len(),
            store.len()
        );
        Ok(store.len())
    }

    /// Load the snapshot, then start following the event socket.
    ///
    /// A failed snapshot is logged and the client starts with an empty store.
    /// Returns `None` if the connection was already started.
    pub async fn start(&self) -> Option<UnboundedReceiver<FlowEvent>> {
        if self.started.swap(true, Ordering::SeqCst) {
            tracing::warn!("Flow {} already started", self.context.flow_id);
            return None;
        }

        if let Err(e) = self.load_snapshot().await {
            tracing::error!("Struct and states API failed, starting empty: {}", e);
        }

        let (events_tx, events_rx) = unbounded_channel();
        let store = self.store.clone();
        let configured = self.connection.configure(move |envelope| {
            let result = store.write().apply_envelope(&envelope);
            let event = match result {
                Ok((key, outcome)) => {
                    tracing::debug!("State {} {:?}", key, outcome);
                    FlowEvent::StateUpdated { key, outcome }
                }
                Err(error) => {
                    tracing::warn!("Rejected envelope: {}", error);
                    FlowEvent::EnvelopeRejected { error }
                }
            };
            // Nobody listening is fine; the store is already updated.
            let _ = events_tx.send(event);
        });

        configured.then_some(events_rx)
    }

    /// Fetch a time-series and hand it to `sink` as `series_id`.
    pub async fn load_timeseries_into<Q: Serialize + ?Sized>(
        &self,
        sink: &dyn ChartSink,
        series_id: &str,
        query: &Q,
    ) -> Result<usize, ApiError> {
        let points = self.api.load_timeseries(query).await?;
        render_series(sink, series_id, &points);
        Ok(points.len())
    }

    pub fn publish<T: Serialize + ?Sized>(&self, message: &T) -> Result<(), ConnectionError> {
        self.connection.publish(message)
    }

    pub fn handle(&self) -> FlowHandle {
        self.connection.handle()
    }

    pub async fn close(&self) {
        self.connection.close().await;
    }
}
