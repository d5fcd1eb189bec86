use thiserror::Error;

/// Result type for low-level webOS operations
pub type Result<T> = std::result::Result<T, WebOsError>;

/// Errors raised by the transport and wire protocol
#[derive(Error, Debug)]
pub enum WebOsError {
    /// WebSocket connection error
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    /// Connection was closed unexpectedly
    #[error("Connection closed")]
    ConnectionClosed,

    /// Request timed out waiting for response
    #[error("Request timeout")]
    Timeout,

    /// Device answered with an error reply
    #[error("API error: {detail}")]
    ApiError {
        /// Error text reported by the device
        detail: String,
    },

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid or unexpected response from the device
    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    /// Event channel receive error
    #[error("Channel error: {0}")]
    ChannelError(String),
}

impl WebOsError {
    /// Whether the error means the device could not be reached or the
    /// session died, as opposed to the device answering badly.
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            WebOsError::WebSocket(_)
                | WebOsError::ConnectionClosed
                | WebOsError::Timeout
                | WebOsError::Io(_)
        )
    }
}

/// Outcome taxonomy reported to callers of the control API
///
/// Raw transport errors never cross this boundary; they are translated
/// through `From<WebOsError>`.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ControlError {
    /// The device could not be reached or the session dropped
    #[error("device unreachable: {0}")]
    DeviceUnreachable(String),

    /// No valid pairing exists and no handshake has completed yet
    #[error("pairing required")]
    PairingRequired,

    /// The device is waiting for the user to accept the pairing on screen
    #[error("waiting for confirmation on the device")]
    UserActionRequired,

    /// The device or its configuration cannot perform this operation
    #[error("unsupported capability: {0}")]
    UnsupportedCapability(String),

    /// Malformed, unexpected or rejected reply from the device
    #[error("protocol error: {0}")]
    ProtocolError(String),

    /// The handle was shut down explicitly
    #[error("device handle terminated")]
    Terminated,
}

impl From<WebOsError> for ControlError {
    fn from(err: WebOsError) -> Self {
        if err.is_transport() {
            ControlError::DeviceUnreachable(err.to_string())
        } else {
            ControlError::ProtocolError(err.to_string())
        }
    }
}
