use crate::config::TvConfig;
use crate::connection::Connection;
use crate::error::Result;
use crate::protocol::HandshakeEvent;
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;

/// A live control channel to one television
#[async_trait]
pub trait Session: Send + Sync {
    /// Send a registration message, presenting `client_key` to resume
    async fn begin_registration(&self, client_key: Option<&str>) -> Result<()>;

    /// Wait for the next reply to the registration message
    async fn next_handshake_event(&self) -> Result<HandshakeEvent>;

    /// Call `uri` and wait for its payload
    async fn request(&self, uri: &str, payload: Option<Value>) -> Result<Value>;

    /// Send to `uri` without waiting for a reply
    async fn send(&self, uri: &str, payload: Option<Value>) -> Result<()>;

    /// False once the underlying channel is known to be closed
    fn is_alive(&self) -> bool;
}

/// Opens sessions to a television by address
#[async_trait]
pub trait Transport: Send + Sync {
    async fn open(&self, ip: &str) -> Result<Arc<dyn Session>>;
}

/// Transport speaking the webOS control protocol over a WebSocket
#[derive(Debug, Clone)]
pub struct WebSocketTransport {
    config: TvConfig,
}

impl WebSocketTransport {
    pub fn new(config: TvConfig) -> Self {
        Self { config }
    }

    /// URL of the control service at `ip`
    pub fn url(&self, ip: &str) -> String {
        format!("ws://{}:{}", ip, self.config.port)
    }
}

#[async_trait]
impl Transport for WebSocketTransport {
    async fn open(&self, ip: &str) -> Result<Arc<dyn Session>> {
        let connection = Connection::connect(
            self.url(ip),
            self.config.connect_timeout(),
            self.config.request_timeout(),
        )
        .await?;

        Ok(Arc::new(connection))
    }
}
