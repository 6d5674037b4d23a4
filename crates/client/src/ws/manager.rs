//! Connection manager for the flow event socket.
//!
//! One manager owns at most one live connection. Socket activity is turned
//! into [`TransportEvent`]s by a per-session reader task; a single dispatch
//! loop consumes them together with the outbound queue, so the message
//! handler is only ever called from one place, in delivery order.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use flowlink_shared::Envelope;
use futures_channel::mpsc::{unbounded, UnboundedReceiver, UnboundedSender};
use futures_util::{SinkExt, StreamExt};
use serde::Serialize;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{sleep, Duration};
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};

use super::connection::{ConnectionError, ConnectionState, FlowHandle, ReconnectConfig};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Callback invoked with every decoded envelope.
pub type MessageHandler = Arc<dyn Fn(Envelope) + Send + Sync>;

/// What the socket reported, in the order it happened.
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    Opened,
    Frame(String),
    Closed,
}

enum SessionEnd {
    Closed,
    Shutdown,
}

/// Owns the socket lifecycle: connect, dispatch, publish, reconnect.
pub struct ConnectionManager {
    url: String,
    config: ReconnectConfig,
    state: Arc<watch::Sender<ConnectionState>>,
    reconnects: Arc<AtomicU64>,
    sender: UnboundedSender<String>,
    receiver: Mutex<Option<UnboundedReceiver<String>>>,
    shutdown: watch::Sender<bool>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl ConnectionManager {
    pub fn new(url: impl Into<String>, config: ReconnectConfig) -> Self {
        let (sender, receiver) = unbounded();
        let (state, _) = watch::channel(ConnectionState::Disconnected);
        let (shutdown, _) = watch::channel(false);

        Self {
            url: url.into(),
            config,
            state: Arc::new(state),
            reconnects: Arc::new(AtomicU64::new(0)),
            sender,
            receiver: Mutex::new(Some(receiver)),
            shutdown,
            task: Mutex::new(None),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Open the connection and start dispatching frames to `handler`.
    ///
    /// Only the first call does anything; it returns `false` afterwards.
    /// Must be called from within a tokio runtime.
    pub fn configure(&self, handler: impl Fn(Envelope) + Send + Sync + 'static) -> bool {
        let receiver = self
            .receiver
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        let Some(receiver) = receiver else {
            tracing::warn!(
                "Connection to {} already configured, ignoring handler",
                self.url
            );
            return false;
        };

        let session = Session {
            url: self.url.clone(),
            config: self.config.clone(),
            state: self.state.clone(),
            reconnects: self.reconnects.clone(),
            handler: Arc::new(handler),
        };
        let task = tokio::spawn(session.run(receiver, self.shutdown.subscribe()));
        *self.task.lock().unwrap_or_else(PoisonError::into_inner) = Some(task);
        true
    }

    /// Stop the connection loop, cancelling any pending reconnect.
    ///
    /// Sends a close frame if a connection is open. The manager cannot be
    /// configured again afterwards.
    pub async fn close(&self) {
        self.shutdown.send_replace(true);
        let task = self.task.lock().unwrap_or_else(PoisonError::into_inner).take();
        if let Some(task) = task {
            if let Err(e) = task.await {
                tracing::error!("Connection task for {} ended abnormally: {}", self.url, e);
            }
        }
        self.state.send_replace(ConnectionState::Disconnected);
    }

    pub fn state(&self) -> ConnectionState {
        self.state.borrow().clone()
    }

    pub fn subscribe_state(&self) -> watch::Receiver<ConnectionState> {
        self.state.subscribe()
    }

    /// Number of times the connection entered the reconnect-pending state.
    /// Never reset.
    pub fn reconnect_count(&self) -> u64 {
        self.reconnects.load(Ordering::SeqCst)
    }

    pub fn handle(&self) -> FlowHandle {
        FlowHandle::new(self.sender.clone(), self.state.subscribe())
    }

    /// Serialize `message` and send it over the open connection.
    pub fn publish<T: Serialize + ?Sized>(&self, message: &T) -> Result<(), ConnectionError> {
        self.handle().publish(message)
    }
}

/// Everything the dispatch loop needs, moved into its task.
struct Session {
    url: String,
    config: ReconnectConfig,
    state: Arc<watch::Sender<ConnectionState>>,
    reconnects: Arc<AtomicU64>,
    handler: MessageHandler,
}

impl Session {
    async fn run(
        self,
        mut outbound: UnboundedReceiver<String>,
        mut shutdown: watch::Receiver<bool>,
    ) {
        // Reconnect attempts since the last successful open.
        let mut attempt = 0u32;

        loop {
            if *shutdown.borrow() {
                break;
            }

            self.state.send_replace(ConnectionState::Connecting);
            tracing::info!("Connecting to {}", self.url);

            let connected = tokio::select! {
                result = connect_async(self.url.as_str()) => result,
                _ = shutdown.changed() => break,
            };

            match connected {
                Ok((stream, _response)) => {
                    attempt = 0;
                    if let SessionEnd::Shutdown =
                        self.drive(stream, &mut outbound, &mut shutdown).await
                    {
                        break;
                    }
                    tracing::info!("WebSocket to {} closed", self.url);
                }
                Err(e) => {
                    tracing::error!("WebSocket error for {}: {}", self.url, e);
                }
            }

            if self.config.is_exhausted(attempt) {
                let reason = format!(
                    "Max reconnect attempts ({}) exceeded",
                    self.config.max_attempts
                );
                tracing::error!("Giving up on {}: {}", self.url, reason);
                self.state.send_replace(ConnectionState::Failed { reason });
                return;
            }

            let delay = self.config.delay_for_attempt(attempt);
            attempt += 1;
            let total = self.reconnects.fetch_add(1, Ordering::SeqCst) + 1;
            self.state.send_replace(ConnectionState::ReconnectPending { attempt });
            tracing::info!(
                "Reconnecting to {} in {}ms (attempt {}, {} reconnects so far)",
                self.url,
                delay,
                attempt,
                total
            );

            tokio::select! {
                _ = sleep(Duration::from_millis(delay as u64)) => {}
                _ = shutdown.changed() => break,
            }
        }

        self.state.send_replace(ConnectionState::Disconnected);
        tracing::info!("Connection loop for {} stopped", self.url);
    }

    /// Run one open session until the transport closes or shutdown is requested.
    async fn drive(
        &self,
        stream: WsStream,
        outbound: &mut UnboundedReceiver<String>,
        shutdown: &mut watch::Receiver<bool>,
    ) -> SessionEnd {
        let (mut write, mut read) = stream.split();
        let (events_tx, mut events) = mpsc::unbounded_channel();
        let _ = events_tx.send(TransportEvent::Opened);

        let url = self.url.clone();
        let reader = tokio::spawn(async move {
            while let Some(msg) = read.next().await {
                match msg {
                    Ok(Message::Text(text)) => {
                        let frame = TransportEvent::Frame(text.as_str().to_owned());
                        if events_tx.send(frame).is_err() {
                            return;
                        }
                    }
                    Ok(Message::Close(frame)) => {
                        tracing::info!("WebSocket to {} received close frame {:?}", url, frame);
                        break;
                    }
                    Ok(Message::Binary(data)) => {
                        tracing::debug!("Ignoring {}-byte binary frame from {}", data.len(), url);
                    }
                    // Pong is handled automatically by tungstenite
                    Ok(_) => {}
                    Err(e) => {
                        tracing::error!("WebSocket read error on {}: {}", url, e);
                        break;
                    }
                }
            }
            let _ = events_tx.send(TransportEvent::Closed);
        });

        let end = loop {
            tokio::select! {
                event = events.recv() => match event {
                    Some(TransportEvent::Opened) => {
                        self.state.send_replace(ConnectionState::Connected);
                        tracing::info!("WebSocket connected to {}", self.url);
                    }
                    Some(TransportEvent::Frame(text)) => self.dispatch_frame(&text),
                    Some(TransportEvent::Closed) | None => break SessionEnd::Closed,
                },
                outgoing = outbound.next() => match outgoing {
                    Some(json) => {
                        tracing::debug!("Sending to {}: {}", self.url, json);
                        if let Err(e) = write.send(Message::Text(json.into())).await {
                            tracing::error!("Send to {} failed: {}", self.url, e);
                            break SessionEnd::Closed;
                        }
                    }
                    // The manager holds a sender, so this only happens once it is gone.
                    None => break SessionEnd::Shutdown,
                },
                _ = shutdown.changed() => {
                    let _ = write.send(Message::Close(None)).await;
                    break SessionEnd::Shutdown;
                }
            }
        };

        reader.abort();
        end
    }

    fn dispatch_frame(&self, text: &str) {
        match Envelope::decode(text) {
            Ok(envelope) => (self.handler)(envelope),
            Err(e) => tracing::warn!("Dropping malformed frame from {}: {}", self.url, e),
        }
    }
}
