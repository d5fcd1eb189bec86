use crate::commands::{CommandDispatcher, CommandResult};
use crate::config::TvConfig;
use crate::manager::ConnectionManager;
use crate::pairing::PairingOutcome;
use crate::status::StatusPoller;
use crate::subscription::EventReceiver;
use crate::transport::{Transport, WebSocketTransport};
use crate::types::{ConnectionState, DeviceIdentity, DeviceRecord, DeviceStatus, PairingStore};
use crate::wake::{UdpWakeSender, WakeSender};
use std::sync::Arc;

/// Handle for controlling one television
///
/// Cheap to clone; clones share the same connection. Safe to use from
/// several tasks at once.
///
/// # Example
///
/// ```no_run
/// use webos_control::{DeviceIdentity, PairingOutcome, TvClient, TvConfig};
///
/// #[tokio::main]
/// async fn main() {
///     let tv = TvClient::new(DeviceIdentity::new("192.168.1.20"), None, TvConfig::default());
///     loop {
///         match tv.pair().await {
///             PairingOutcome::Paired(store) => {
///                 println!("store this: {}", store.to_blob());
///                 break;
///             }
///             PairingOutcome::UserActionRequired => println!("accept the prompt on the TV"),
///             PairingOutcome::Failed(e) => {
///                 eprintln!("pairing failed: {}", e);
///                 return;
///             }
///         }
///     }
///
///     println!("{:?}", tv.get_status().await);
///     let _ = tv.mute().await;
/// }
/// ```
#[derive(Clone)]
pub struct TvClient {
    manager: ConnectionManager,
    status: StatusPoller,
    commands: CommandDispatcher,
}

impl TvClient {
    /// Create a handle using the WebSocket transport and UDP wake packets
    pub fn new(identity: DeviceIdentity, store: Option<PairingStore>, config: TvConfig) -> Self {
        let transport = Arc::new(WebSocketTransport::new(config.clone()));
        let wake = Arc::new(UdpWakeSender::new(config.wake_broadcast.clone()));
        Self::with_parts(identity, store, config, transport, wake)
    }

    /// Restore a handle from a record the caller persisted earlier
    pub fn from_record(record: DeviceRecord, config: TvConfig) -> Self {
        Self::new(record.identity, record.store, config)
    }

    /// Create a handle over custom transport and wake implementations
    pub fn with_parts(
        identity: DeviceIdentity,
        store: Option<PairingStore>,
        config: TvConfig,
        transport: Arc<dyn Transport>,
        wake: Arc<dyn WakeSender>,
    ) -> Self {
        let manager = ConnectionManager::new(identity, store, transport, config);
        Self {
            status: StatusPoller::new(manager.clone()),
            commands: CommandDispatcher::new(manager.clone(), wake),
            manager,
        }
    }

    pub fn connection(&self) -> &ConnectionManager {
        &self.manager
    }

    pub fn state(&self) -> ConnectionState {
        self.manager.state()
    }

    pub fn record(&self) -> DeviceRecord {
        self.manager.record()
    }

    /// Subscribe to pairing and connection state events
    pub fn subscribe_events(&self) -> EventReceiver {
        self.manager.subscribe()
    }

    /// Pair with the device; call again after `UserActionRequired`
    pub async fn pair(&self) -> PairingOutcome {
        self.manager.pair().await
    }

    /// Stop waiting for the on-screen prompt of an unfinished pairing
    pub fn cancel_pairing(&self) {
        self.manager.cancel_pairing()
    }

    pub async fn get_status(&self) -> DeviceStatus {
        self.status.get_status().await
    }

    pub async fn turn_on(&self) -> CommandResult {
        self.commands.turn_on().await
    }

    pub async fn turn_off(&self) -> CommandResult {
        self.commands.turn_off().await
    }

    pub async fn mute(&self) -> CommandResult {
        self.commands.mute().await
    }

    pub async fn unmute(&self) -> CommandResult {
        self.commands.unmute().await
    }

    pub async fn set_channel(&self, number: u32) -> CommandResult {
        self.commands.set_channel(number).await
    }

    /// Follow the device to a new address; it must be paired again
    pub fn set_ip(&self, ip: impl Into<String>) {
        self.manager.set_ip(ip)
    }

    pub fn shutdown(&self) {
        self.manager.shutdown()
    }
}
