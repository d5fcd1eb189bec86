use crate::error::ControlError;
use crate::protocol::HandshakeEvent;
use crate::transport::{Session, Transport};
use crate::types::PairingStore;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::time::{timeout, Instant};

/// Number of handshake steps a parked prompt survives without a new `pair`
const PROMPT_LIFETIME_STEPS: u32 = 4;

/// Result of one pairing attempt
#[derive(Debug, Clone, PartialEq)]
pub enum PairingOutcome {
    /// Registration succeeded; the store is immediately usable
    Paired(PairingStore),
    /// The device shows a prompt; call `pair` again once the user accepted
    UserActionRequired,
    /// Connection refused, timed out, or the device misbehaved
    Failed(ControlError),
}

/// Pairing attempt that also hands over the registered session
pub(crate) enum Handshake {
    Established {
        session: Arc<dyn Session>,
        store: PairingStore,
    },
    AwaitingUser,
    Failed(ControlError),
}

impl Handshake {
    fn into_outcome(self) -> PairingOutcome {
        match self {
            Handshake::Established { store, .. } => PairingOutcome::Paired(store),
            Handshake::AwaitingUser => PairingOutcome::UserActionRequired,
            Handshake::Failed(err) => PairingOutcome::Failed(err),
        }
    }
}

/// A prompted session kept until the user answers on the device
struct PendingPairing {
    ip: String,
    session: Arc<dyn Session>,
    expires: Instant,
}

/// Runs the registration exchange against a television
///
/// Every transport error ends the attempt with `Failed`; retrying is up to
/// the caller. A session whose prompt is still on screen is kept between
/// calls for the same ip so the user answers a single prompt. It is closed
/// once it expires, when another ip is paired, or on
/// [`PairingManager::discard_pending`].
pub struct PairingManager {
    transport: Arc<dyn Transport>,
    step_timeout: Duration,
    pending: Mutex<Option<PendingPairing>>,
}

impl PairingManager {
    pub fn new(transport: Arc<dyn Transport>, step_timeout: Duration) -> Self {
        Self {
            transport,
            step_timeout,
            pending: Mutex::new(None),
        }
    }

    /// Pair with the television at `ip`, resuming with `existing` if given
    pub async fn pair(&self, ip: &str, existing: Option<&PairingStore>) -> PairingOutcome {
        self.handshake(ip, existing).await.into_outcome()
    }

    /// Close a session still waiting for the user to answer a prompt
    pub fn discard_pending(&self) {
        if let Some(prompted) = self.lock_pending().take() {
            tracing::debug!("Closing prompted registration with {}", prompted.ip);
        }
    }

    fn lock_pending(&self) -> MutexGuard<'_, Option<PendingPairing>> {
        self.pending.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Take the parked session for `ip` if it can still be resumed
    fn resume_pending(&self, ip: &str) -> Option<Arc<dyn Session>> {
        let prompted = self.lock_pending().take()?;
        if prompted.ip == ip && prompted.session.is_alive() && Instant::now() < prompted.expires {
            return Some(prompted.session);
        }
        tracing::debug!("Discarding prompted registration with {}", prompted.ip);
        None
    }

    pub(crate) async fn handshake(&self, ip: &str, existing: Option<&PairingStore>) -> Handshake {
        if let Some(session) = self.resume_pending(ip) {
            tracing::debug!("Resuming prompted registration with {}", ip);
            return self.await_confirmation(ip, session).await;
        }

        let session = match self.transport.open(ip).await {
            Ok(session) => session,
            Err(e) => {
                tracing::warn!("Failed to open session to {}: {}", ip, e);
                return Handshake::Failed(e.into());
            }
        };

        if let Some(store) = existing {
            if let Err(e) = session.begin_registration(Some(store.client_key())).await {
                return Handshake::Failed(e.into());
            }

            match self.next_event(&session).await {
                Ok(Some(HandshakeEvent::Registered { client_key })) => {
                    tracing::info!("Resumed registration with {}", ip);
                    let store = if client_key == store.client_key() {
                        store.clone()
                    } else {
                        PairingStore::new(client_key)
                    };
                    return Handshake::Established { session, store };
                }
                Ok(Some(HandshakeEvent::Prompted)) => {
                    tracing::info!("Stored key not accepted by {}, device is prompting", ip);
                    return self.await_confirmation(ip, session).await;
                }
                Ok(Some(HandshakeEvent::Rejected(reason))) => {
                    tracing::info!("Stored key rejected by {}: {}", ip, reason);
                }
                Ok(None) => {
                    return Handshake::Failed(ControlError::DeviceUnreachable(
                        "registration timed out".to_string(),
                    ))
                }
                Err(e) => return Handshake::Failed(e),
            }
        }

        if let Err(e) = session.begin_registration(None).await {
            return Handshake::Failed(e.into());
        }

        match self.next_event(&session).await {
            Ok(Some(HandshakeEvent::Registered { client_key })) => {
                tracing::info!("Registration with {} successful", ip);
                Handshake::Established {
                    session,
                    store: PairingStore::new(client_key),
                }
            }
            Ok(Some(HandshakeEvent::Prompted)) => {
                self.await_confirmation(ip, session).await
            }
            Ok(Some(HandshakeEvent::Rejected(reason))) => {
                Handshake::Failed(ControlError::ProtocolError(reason))
            }
            Ok(None) => Handshake::Failed(ControlError::DeviceUnreachable(
                "registration timed out".to_string(),
            )),
            Err(e) => Handshake::Failed(e),
        }
    }

    /// Wait for the user to answer an on-screen prompt. If the step times
    /// out, the session is parked in `pending`.
    async fn await_confirmation(&self, ip: &str, session: Arc<dyn Session>) -> Handshake {
        tracing::info!("Please accept the connection on the TV at {}", ip);

        match self.next_event(&session).await {
            Ok(Some(HandshakeEvent::Registered { client_key })) => {
                tracing::info!("Registration with {} confirmed", ip);
                Handshake::Established {
                    session,
                    store: PairingStore::new(client_key),
                }
            }
            Ok(Some(HandshakeEvent::Prompted)) | Ok(None) => {
                *self.lock_pending() = Some(PendingPairing {
                    ip: ip.to_string(),
                    session,
                    expires: Instant::now() + self.step_timeout * PROMPT_LIFETIME_STEPS,
                });
                Handshake::AwaitingUser
            }
            Ok(Some(HandshakeEvent::Rejected(reason))) => {
                tracing::info!("Registration with {} declined: {}", ip, reason);
                Handshake::Failed(ControlError::ProtocolError(reason))
            }
            Err(e) => Handshake::Failed(e),
        }
    }

    /// Next handshake event, or `None` if the step timed out
    async fn next_event(
        &self,
        session: &Arc<dyn Session>,
    ) -> std::result::Result<Option<HandshakeEvent>, ControlError> {
        match timeout(self.step_timeout, session.next_handshake_event()).await {
            Ok(Ok(event)) => Ok(Some(event)),
            Ok(Err(e)) => Err(e.into()),
            Err(_) => Ok(None),
        }
    }
}
