use crate::error::{Result, WebOsError};
use crate::protocol::{HandshakeEvent, Request, Response};
use crate::transport::Session;
use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, Mutex};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_tungstenite::{connect_async, tungstenite::Message};

/// Shared routing state of a socket
struct ConnectionState {
    /// Pending requests waiting for responses
    pending_requests: HashMap<String, oneshot::Sender<Response>>,
    /// Id of the registration message currently in progress
    registration_id: Option<String>,
    /// Channel for sending outgoing messages
    ws_tx: mpsc::UnboundedSender<Message>,
}

/// WebSocket session to a television's control service
///
/// Dropping the connection aborts its reader and writer tasks, which closes
/// the socket.
pub struct Connection {
    state: Arc<Mutex<ConnectionState>>,
    /// Replies to the registration message; it may be answered twice
    /// (prompt, then registered), so it cannot use a oneshot
    handshake_rx: Mutex<mpsc::UnboundedReceiver<Response>>,
    alive: Arc<AtomicBool>,
    request_timeout: Duration,
    reader: JoinHandle<()>,
    writer: JoinHandle<()>,
}

impl Connection {
    /// Connect to a WebSocket URL
    pub async fn connect(
        url: impl Into<String>,
        connect_timeout: Duration,
        request_timeout: Duration,
    ) -> Result<Self> {
        let url = url.into();
        tracing::info!("Connecting to {}", url);

        let (ws_stream, _) = timeout(connect_timeout, connect_async(&url))
            .await
            .map_err(|_| WebOsError::Timeout)??;
        let (mut write, mut read) = ws_stream.split();

        let (ws_tx, mut ws_rx) = mpsc::unbounded_channel::<Message>();
        let (handshake_tx, handshake_rx) = mpsc::unbounded_channel::<Response>();
        let alive = Arc::new(AtomicBool::new(true));

        let state = Arc::new(Mutex::new(ConnectionState {
            pending_requests: HashMap::new(),
            registration_id: None,
            ws_tx,
        }));

        // Forward outgoing messages to the socket
        let writer_alive = alive.clone();
        let writer = tokio::spawn(async move {
            while let Some(msg) = ws_rx.recv().await {
                if let Err(e) = write.send(msg).await {
                    tracing::error!("Failed to send message: {}", e);
                    writer_alive.store(false, Ordering::SeqCst);
                    break;
                }
            }
        });

        // Route incoming replies
        let reader_state = state.clone();
        let reader_alive = alive.clone();
        let reader = tokio::spawn(async move {
            while let Some(msg_result) = read.next().await {
                match msg_result {
                    Ok(Message::Text(text)) => {
                        if let Err(e) = Self::handle_message(&reader_state, &handshake_tx, text).await {
                            tracing::warn!("Error handling message: {}", e);
                        }
                    }
                    Ok(Message::Close(_)) => {
                        tracing::info!("WebSocket connection closed");
                        break;
                    }
                    Err(e) => {
                        tracing::warn!("WebSocket error: {}", e);
                        break;
                    }
                    _ => {}
                }
            }

            reader_alive.store(false, Ordering::SeqCst);
            // Dropping the senders fails every waiter with ConnectionClosed
            let mut state = reader_state.lock().await;
            state.pending_requests.clear();
        });

        Ok(Self {
            state,
            handshake_rx: Mutex::new(handshake_rx),
            alive,
            request_timeout,
            reader,
            writer,
        })
    }

    /// Handle an incoming message
    async fn handle_message(
        state: &Arc<Mutex<ConnectionState>>,
        handshake_tx: &mpsc::UnboundedSender<Response>,
        text: String,
    ) -> Result<()> {
        tracing::debug!("Received: {}", text);

        let response: Response = serde_json::from_str(&text)?;
        let Some(id) = response.id.clone() else {
            tracing::debug!("Ignoring message without id");
            return Ok(());
        };

        let mut state = state.lock().await;
        if let Some(tx) = state.pending_requests.remove(&id) {
            let _ = tx.send(response);
        } else if state.registration_id.as_deref() == Some(id.as_str()) {
            let _ = handshake_tx.send(response);
        } else {
            tracing::debug!("Ignoring unsolicited message {}", id);
        }

        Ok(())
    }

    fn enqueue(state: &ConnectionState, request: &Request) -> Result<()> {
        let json = serde_json::to_string(request)?;
        tracing::debug!("Sending: {}", json);

        state
            .ws_tx
            .send(Message::Text(json))
            .map_err(|_| WebOsError::ConnectionClosed)
    }
}

#[async_trait]
impl Session for Connection {
    async fn begin_registration(&self, client_key: Option<&str>) -> Result<()> {
        let request = Request::register(client_key);
        let mut state = self.state.lock().await;
        state.registration_id = Some(request.id.clone());
        Self::enqueue(&state, &request)
    }

    async fn next_handshake_event(&self) -> Result<HandshakeEvent> {
        let mut rx = self.handshake_rx.lock().await;
        let response = rx.recv().await.ok_or(WebOsError::ConnectionClosed)?;
        response.handshake_event()
    }

    async fn request(&self, uri: &str, payload: Option<Value>) -> Result<Value> {
        let request = Request::new(uri).with_payload(payload);
        let request_id = request.id.clone();
        let (tx, rx) = oneshot::channel();

        {
            let mut state = self.state.lock().await;
            state.pending_requests.insert(request_id.clone(), tx);
            if let Err(e) = Self::enqueue(&state, &request) {
                state.pending_requests.remove(&request_id);
                return Err(e);
            }
        }

        let response = match timeout(self.request_timeout, rx).await {
            Ok(Ok(response)) => response,
            Ok(Err(_)) => return Err(WebOsError::ConnectionClosed),
            Err(_) => {
                let mut state = self.state.lock().await;
                state.pending_requests.remove(&request_id);
                return Err(WebOsError::Timeout);
            }
        };

        response.into_payload()
    }

    async fn send(&self, uri: &str, payload: Option<Value>) -> Result<()> {
        let request = Request::new(uri).with_payload(payload);

        let state = self.state.lock().await;
        Self::enqueue(&state, &request)
    }

    fn is_alive(&self) -> bool {
        self.alive.load(Ordering::SeqCst) && !self.reader.is_finished()
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        self.reader.abort();
        self.writer.abort();
    }
}
