use crate::error::ControlError;
use crate::manager::ConnectionManager;
use crate::protocol::{URI_OPEN_CHANNEL, URI_SET_MUTE, URI_TURN_OFF};
use crate::wake::{MacAddress, WakeSender};
use serde_json::{json, Value};
use std::sync::Arc;

/// Result of a dispatched command
pub type CommandResult = std::result::Result<(), ControlError>;

/// Turns discrete commands into protocol calls or wake packets
///
/// Commands are fire-and-forget: success means the device accepted the
/// frame, not that it acted on it.
#[derive(Clone)]
pub struct CommandDispatcher {
    manager: ConnectionManager,
    wake: Arc<dyn WakeSender>,
}

impl CommandDispatcher {
    pub fn new(manager: ConnectionManager, wake: Arc<dyn WakeSender>) -> Self {
        Self { manager, wake }
    }

    // ========== Power ==========

    /// Wake the device by hardware address, then try to connect
    ///
    /// The wake packet is the command's effect; whether the follow-up
    /// connection succeeds is not reported. Without a known hardware
    /// address this fails with `UnsupportedCapability` and does not touch
    /// the network.
    pub async fn turn_on(&self) -> CommandResult {
        let identity = self.manager.identity();
        let Some(mac_text) = identity.mac.as_deref() else {
            return Err(ControlError::UnsupportedCapability(
                "no hardware address known for wake".to_string(),
            ));
        };
        let mac = MacAddress::parse(mac_text).ok_or_else(|| {
            ControlError::UnsupportedCapability(format!("invalid hardware address {}", mac_text))
        })?;

        self.wake.send_wake(&mac)?;
        tracing::info!("Sent wake packet to {}", identity.ip);

        if let Err(e) = self.manager.ensure_connected().await {
            tracing::debug!("Not connected after wake (yet): {}", e);
        }
        Ok(())
    }

    pub async fn turn_off(&self) -> CommandResult {
        self.send(URI_TURN_OFF, None).await
    }

    // ========== Audio ==========

    pub async fn mute(&self) -> CommandResult {
        self.send(URI_SET_MUTE, Some(json!({ "mute": true }))).await
    }

    pub async fn unmute(&self) -> CommandResult {
        self.send(URI_SET_MUTE, Some(json!({ "mute": false }))).await
    }

    // ========== Channels ==========

    /// Tune to channel `number` by absolute number
    pub async fn set_channel(&self, number: u32) -> CommandResult {
        self.send(
            URI_OPEN_CHANNEL,
            Some(json!({ "channelNumber": number.to_string() })),
        )
        .await
    }

    async fn send(&self, uri: &str, payload: Option<Value>) -> CommandResult {
        let session = self.manager.ensure_connected().await?;

        if let Err(e) = session.send(uri, payload).await {
            tracing::warn!("Command {} failed: {}", uri, e);
            if e.is_transport() {
                self.manager.invalidate(&session);
            }
            return Err(e.into());
        }

        tracing::debug!("Sent {}", uri);
        Ok(())
    }
}
