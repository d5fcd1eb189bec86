use crate::error::{Result, WebOsError};
use crate::types::{ConnectionState, DeviceRecord};
use tokio::sync::broadcast;

/// Lifecycle event of a device handle
#[derive(Debug, Clone, PartialEq)]
pub enum DeviceEvent {
    /// A new or changed credential was obtained; persist the record
    Paired(DeviceRecord),

    /// The connection state machine moved
    StateChanged(ConnectionState),
}

/// Receiver for device events
pub struct EventReceiver {
    rx: broadcast::Receiver<DeviceEvent>,
}

impl EventReceiver {
    pub(crate) fn new(rx: broadcast::Receiver<DeviceEvent>) -> Self {
        Self { rx }
    }

    /// Receive the next event
    ///
    /// Fails with `ConnectionClosed` once the device handle is dropped.
    pub async fn recv(&mut self) -> Result<DeviceEvent> {
        self.rx.recv().await.map_err(|e| match e {
            broadcast::error::RecvError::Closed => WebOsError::ConnectionClosed,
            broadcast::error::RecvError::Lagged(n) => {
                WebOsError::ChannelError(format!("Lagged by {} messages", n))
            }
        })
    }

    /// Try to receive an event without blocking
    ///
    /// Returns `None` if no event is queued.
    pub fn try_recv(&mut self) -> Result<Option<DeviceEvent>> {
        match self.rx.try_recv() {
            Ok(event) => Ok(Some(event)),
            Err(broadcast::error::TryRecvError::Empty) => Ok(None),
            Err(broadcast::error::TryRecvError::Closed) => Err(WebOsError::ConnectionClosed),
            Err(broadcast::error::TryRecvError::Lagged(n)) => {
                Err(WebOsError::ChannelError(format!("Lagged by {} messages", n)))
            }
        }
    }
}
