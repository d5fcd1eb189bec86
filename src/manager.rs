use crate::config::TvConfig;
use crate::error::ControlError;
use crate::pairing::{Handshake, PairingManager, PairingOutcome};
use crate::protocol::URI_SW_INFO;
use crate::subscription::{DeviceEvent, EventReceiver};
use crate::transport::{Session, Transport};
use crate::types::{ConnectionState, DeviceIdentity, DeviceRecord, PairingStore};
use futures_util::future::{BoxFuture, FutureExt, Shared};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::broadcast;
use tokio::time::timeout;

type SessionResult = std::result::Result<Arc<dyn Session>, ControlError>;

/// A connection attempt shared by every caller that asks while it runs
type Attempt = Shared<BoxFuture<'static, SessionResult>>;

/// Everything guarded by the slot lock. The lock is never held across an
/// await.
struct Slot {
    identity: DeviceIdentity,
    store: Option<PairingStore>,
    state: ConnectionState,
    session: Option<Arc<dyn Session>>,
    in_flight: Option<Attempt>,
}

struct Inner {
    slot: Mutex<Slot>,
    pairing: PairingManager,
    config: TvConfig,
    events: broadcast::Sender<DeviceEvent>,
}

impl Inner {
    fn lock(&self) -> MutexGuard<'_, Slot> {
        self.slot.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn set_state(&self, slot: &mut Slot, state: ConnectionState) {
        if slot.state != state {
            tracing::debug!("{}: {:?} -> {:?}", slot.identity.ip, slot.state, state);
            slot.state = state;
            let _ = self.events.send(DeviceEvent::StateChanged(state));
        }
    }

    /// State to fall back to after a failed attempt
    fn idle_state(slot: &Slot) -> ConnectionState {
        if slot.store.is_some() {
            ConnectionState::Disconnected
        } else {
            ConnectionState::Unpaired
        }
    }
}

/// Owns the single control session of one television
///
/// Only one connection or pairing attempt runs at a time; callers arriving
/// while it is in flight await the same attempt and observe its result.
/// Failures return the device to `Disconnected` (or `Unpaired` without a
/// credential) and are never retried here.
#[derive(Clone)]
pub struct ConnectionManager {
    inner: Arc<Inner>,
}

impl ConnectionManager {
    pub fn new(
        identity: DeviceIdentity,
        store: Option<PairingStore>,
        transport: Arc<dyn Transport>,
        config: TvConfig,
    ) -> Self {
        let state = if store.is_some() {
            ConnectionState::Disconnected
        } else {
            ConnectionState::Unpaired
        };
        let (events, _) = broadcast::channel(100);

        Self {
            inner: Arc::new(Inner {
                slot: Mutex::new(Slot {
                    identity,
                    store,
                    state,
                    session: None,
                    in_flight: None,
                }),
                pairing: PairingManager::new(transport, config.pairing_timeout()),
                config,
                events,
            }),
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.inner.lock().state
    }

    pub fn identity(&self) -> DeviceIdentity {
        self.inner.lock().identity.clone()
    }

    pub fn store(&self) -> Option<PairingStore> {
        self.inner.lock().store.clone()
    }

    /// Snapshot for the caller's persistence layer
    pub fn record(&self) -> DeviceRecord {
        let slot = self.inner.lock();
        DeviceRecord {
            identity: slot.identity.clone(),
            store: slot.store.clone(),
        }
    }

    pub fn subscribe(&self) -> EventReceiver {
        EventReceiver::new(self.inner.events.subscribe())
    }

    /// Return the live session, resuming the stored pairing if needed
    ///
    /// Without a credential this fails with `PairingRequired` and does not
    /// touch the network; use [`ConnectionManager::pair`] first.
    pub async fn ensure_connected(&self) -> SessionResult {
        let attempt = {
            let mut slot = self.inner.lock();
            if let Some(ready) = self.ready_session(&mut slot)? {
                return Ok(ready);
            }
            match slot.in_flight.clone() {
                Some(attempt) => attempt,
                None => {
                    if slot.store.is_none() {
                        return Err(ControlError::PairingRequired);
                    }
                    self.start_attempt(&mut slot)
                }
            }
        };

        attempt.await
    }

    /// Run the registration exchange, prompting on the device if needed
    ///
    /// Shares the in-flight slot with [`ConnectionManager::ensure_connected`],
    /// so pairing never races a reconnect.
    pub async fn pair(&self) -> PairingOutcome {
        let attempt = {
            let mut slot = self.inner.lock();
            match self.ready_session(&mut slot) {
                Ok(Some(_)) => {
                    if let Some(store) = slot.store.clone() {
                        return PairingOutcome::Paired(store);
                    }
                }
                Ok(None) => {}
                Err(e) => return PairingOutcome::Failed(e),
            }
            match slot.in_flight.clone() {
                Some(attempt) => attempt,
                None => self.start_attempt(&mut slot),
            }
        };

        match attempt.await {
            Ok(_) => match self.store() {
                Some(store) => PairingOutcome::Paired(store),
                None => PairingOutcome::Failed(ControlError::PairingRequired),
            },
            Err(ControlError::UserActionRequired) => PairingOutcome::UserActionRequired,
            Err(e) => PairingOutcome::Failed(e),
        }
    }

    /// Drop `session` if it is still the current one, after a call on it
    /// failed. A newer session installed meanwhile is left alone.
    pub fn invalidate(&self, session: &Arc<dyn Session>) {
        let mut slot = self.inner.lock();
        let current = slot
            .session
            .as_ref()
            .is_some_and(|s| Arc::ptr_eq(s, session));
        if current {
            tracing::info!("Dropping stale session to {}", slot.identity.ip);
            slot.session = None;
            let idle = Inner::idle_state(&slot);
            self.inner.set_state(&mut slot, idle);
        }
    }

    /// Point the handle at a new address found by discovery. The stored
    /// credential belongs to the old address and is discarded.
    pub fn set_ip(&self, ip: impl Into<String>) {
        let ip = ip.into();
        let mut slot = self.inner.lock();
        if slot.state == ConnectionState::Terminated || slot.identity.ip == ip {
            return;
        }

        tracing::info!("Device moved from {} to {}", slot.identity.ip, ip);
        slot.identity.ip = ip;
        slot.store = None;
        slot.session = None;
        slot.in_flight = None;
        self.inner.pairing.discard_pending();
        self.inner.set_state(&mut slot, ConnectionState::Unpaired);
    }

    /// Give up on a pairing that is waiting for the user. The prompted
    /// session is closed; the next `pair` starts over.
    pub fn cancel_pairing(&self) {
        self.inner.pairing.discard_pending();
    }

    /// Close the session for good; every later call fails with `Terminated`
    pub fn shutdown(&self) {
        let mut slot = self.inner.lock();
        slot.session = None;
        slot.in_flight = None;
        self.inner.pairing.discard_pending();
        self.inner.set_state(&mut slot, ConnectionState::Terminated);
    }

    /// The cached session if it is usable. A session found dead is dropped.
    fn ready_session(&self, slot: &mut Slot) -> std::result::Result<Option<Arc<dyn Session>>, ControlError> {
        if slot.state == ConnectionState::Terminated {
            return Err(ControlError::Terminated);
        }
        if slot.state != ConnectionState::Connected {
            return Ok(None);
        }

        match slot.session.as_ref().filter(|s| s.is_alive()) {
            Some(session) => Ok(Some(session.clone())),
            None => {
                tracing::info!("Session to {} was closed", slot.identity.ip);
                slot.session = None;
                let idle = Inner::idle_state(slot);
                self.inner.set_state(slot, idle);
                Ok(None)
            }
        }
    }

    fn start_attempt(&self, slot: &mut Slot) -> Attempt {
        let attempt = Self::connect(
            self.inner.clone(),
            slot.identity.clone(),
            slot.store.clone(),
        )
        .boxed()
        .shared();

        slot.in_flight = Some(attempt.clone());
        self.inner.set_state(slot, ConnectionState::Connecting);
        attempt
    }

    async fn connect(
        inner: Arc<Inner>,
        identity: DeviceIdentity,
        store: Option<PairingStore>,
    ) -> SessionResult {
        let ip = identity.ip.clone();
        let handshake = timeout(
            inner.config.attempt_timeout(),
            inner.pairing.handshake(&ip, store.as_ref()),
        )
        .await;

        // Read the hardware address once per fresh pairing, for waking later
        let mac = match &handshake {
            Ok(Handshake::Established { session, store: new_store })
                if identity.mac.is_none() && store.as_ref() != Some(new_store) =>
            {
                fetch_mac(session.as_ref()).await
            }
            _ => None,
        };

        let mut slot = inner.lock();
        slot.in_flight = None;
        if slot.state == ConnectionState::Terminated {
            inner.pairing.discard_pending();
            return Err(ControlError::Terminated);
        }
        if slot.identity.ip != ip {
            inner.pairing.discard_pending();
            return Err(ControlError::DeviceUnreachable(format!(
                "address changed while connecting to {}",
                ip
            )));
        }

        let handshake = match handshake {
            Ok(handshake) => handshake,
            Err(_) => {
                tracing::warn!("Connection attempt to {} timed out", ip);
                let idle = Inner::idle_state(&slot);
                inner.set_state(&mut slot, idle);
                return Err(ControlError::DeviceUnreachable(
                    "connection attempt timed out".to_string(),
                ));
            }
        };

        match handshake {
            Handshake::Established { session, store: new_store } => {
                let changed = slot.store.as_ref() != Some(&new_store);
                slot.store = Some(new_store);
                if slot.identity.mac.is_none() {
                    slot.identity.mac = mac;
                }
                slot.session = Some(session.clone());
                inner.set_state(&mut slot, ConnectionState::Connected);
                tracing::info!("Connected to {}", ip);

                if changed {
                    let _ = inner.events.send(DeviceEvent::Paired(DeviceRecord {
                        identity: slot.identity.clone(),
                        store: slot.store.clone(),
                    }));
                }
                Ok(session)
            }
            Handshake::AwaitingUser => {
                let idle = Inner::idle_state(&slot);
                inner.set_state(&mut slot, idle);
                Err(ControlError::UserActionRequired)
            }
            Handshake::Failed(e) => {
                tracing::warn!("Could not connect to {}: {}", ip, e);
                let idle = Inner::idle_state(&slot);
                inner.set_state(&mut slot, idle);
                Err(e)
            }
        }
    }
}

async fn fetch_mac(session: &dyn Session) -> Option<String> {
    match session.request(URI_SW_INFO, None).await {
        Ok(payload) => payload
            .get("device_id")
            .and_then(|v| v.as_str())
            .filter(|mac| !mac.is_empty())
            .map(|mac| mac.to_string()),
        Err(e) => {
            tracing::debug!("Could not read hardware address: {}", e);
            None
        }
    }
}
