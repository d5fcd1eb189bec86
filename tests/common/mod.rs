//! Scriptable in-memory television used by the integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use webos_control::{
    DeviceIdentity, HandshakeEvent, MacAddress, PairingStore, Result, Session, Transport, TvClient,
    TvConfig, WakeSender, WebOsError,
};

pub const TV_IP: &str = "192.168.1.20";
pub const TV_MAC: &str = "a8:23:fe:01:02:0c";

/// Config with short timeouts so prompt waits end quickly
pub fn test_config() -> TvConfig {
    TvConfig {
        connect_timeout_ms: 500,
        request_timeout_ms: 500,
        pairing_timeout_ms: 150,
        ..TvConfig::default()
    }
}

/// Device-side state shared by every session the fake opens
pub struct FakeTv {
    /// Key the device accepts without prompting
    pub accepted_key: Mutex<Option<String>>,
    /// Whether the user accepts the on-screen prompt
    pub user_confirms: AtomicBool,
    pub reachable: AtomicBool,
    /// Registration works but every request fails
    pub queries_fail: AtomicBool,
    pub foreground: Mutex<String>,
    pub program_info: Mutex<Value>,
    pub opens: AtomicUsize,
    pub prompts: AtomicUsize,
    pub registrations: Mutex<Vec<Option<String>>>,
    pub sent: Mutex<Vec<(String, Option<Value>)>>,
    pub open_delay: Mutex<Duration>,
    pub sessions: Mutex<Vec<Arc<FakeSession>>>,
    issued: AtomicUsize,
}

impl FakeTv {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            accepted_key: Mutex::new(None),
            user_confirms: AtomicBool::new(true),
            reachable: AtomicBool::new(true),
            queries_fail: AtomicBool::new(false),
            foreground: Mutex::new("netflix".to_string()),
            program_info: Mutex::new(json!({})),
            opens: AtomicUsize::new(0),
            prompts: AtomicUsize::new(0),
            registrations: Mutex::new(Vec::new()),
            sent: Mutex::new(Vec::new()),
            open_delay: Mutex::new(Duration::ZERO),
            sessions: Mutex::new(Vec::new()),
            issued: AtomicUsize::new(0),
        })
    }

    /// A device that already knows `key`
    pub fn paired(key: &str) -> Arc<Self> {
        let tv = Self::new();
        *tv.accepted_key.lock().unwrap() = Some(key.to_string());
        tv
    }

    pub fn opens(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }

    pub fn prompts(&self) -> usize {
        self.prompts.load(Ordering::SeqCst)
    }

    pub fn sent_uris(&self) -> Vec<String> {
        self.sent.lock().unwrap().iter().map(|(uri, _)| uri.clone()).collect()
    }

    /// Take the device off the network: new opens fail, open sessions die
    pub fn unplug(&self) {
        self.reachable.store(false, Ordering::SeqCst);
        for session in self.sessions.lock().unwrap().iter() {
            session.alive.store(false, Ordering::SeqCst);
        }
    }

    pub fn session(&self, index: usize) -> Arc<FakeSession> {
        self.sessions.lock().unwrap()[index].clone()
    }

    fn issue_key(&self) -> String {
        let key = format!("key-{}", self.issued.fetch_add(1, Ordering::SeqCst) + 1);
        *self.accepted_key.lock().unwrap() = Some(key.clone());
        key
    }
}

pub struct FakeSession {
    tv: Arc<FakeTv>,
    events: Mutex<VecDeque<HandshakeEvent>>,
    prompted: AtomicBool,
    pub alive: AtomicBool,
    /// Looks alive but every call fails
    pub stale: AtomicBool,
}

impl FakeSession {
    fn check(&self) -> Result<()> {
        if !self.alive.load(Ordering::SeqCst) || self.stale.load(Ordering::SeqCst) {
            return Err(WebOsError::ConnectionClosed);
        }
        Ok(())
    }
}

#[async_trait]
impl Session for FakeSession {
    async fn begin_registration(&self, client_key: Option<&str>) -> Result<()> {
        self.check()?;
        self.tv
            .registrations
            .lock()
            .unwrap()
            .push(client_key.map(|k| k.to_string()));

        let accepted = self.tv.accepted_key.lock().unwrap().clone();
        let mut events = self.events.lock().unwrap();
        match (client_key, accepted) {
            (Some(key), Some(accepted)) if key == accepted => {
                events.push_back(HandshakeEvent::Registered {
                    client_key: accepted,
                });
            }
            _ => {
                self.tv.prompts.fetch_add(1, Ordering::SeqCst);
                self.prompted.store(true, Ordering::SeqCst);
                events.push_back(HandshakeEvent::Prompted);
            }
        }
        Ok(())
    }

    async fn next_handshake_event(&self) -> Result<HandshakeEvent> {
        loop {
            self.check()?;
            if let Some(event) = self.events.lock().unwrap().pop_front() {
                return Ok(event);
            }
            if self.prompted.load(Ordering::SeqCst) && self.tv.user_confirms.load(Ordering::SeqCst)
            {
                self.prompted.store(false, Ordering::SeqCst);
                return Ok(HandshakeEvent::Registered {
                    client_key: self.tv.issue_key(),
                });
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }

    async fn request(&self, uri: &str, _payload: Option<Value>) -> Result<Value> {
        self.check()?;
        if self.tv.queries_fail.load(Ordering::SeqCst) {
            return Err(WebOsError::Timeout);
        }
        match uri {
            "ssap://com.webos.applicationManager/getForegroundAppInfo" => {
                Ok(json!({ "appId": self.tv.foreground.lock().unwrap().clone(), "returnValue": true }))
            }
            "ssap://com.webos.applicationManager/listApps" => Ok(json!({
                "apps": [
                    { "id": "netflix", "title": "Netflix", "icon": "http://tv/netflix.png" },
                    { "id": "com.webos.app.livetv", "title": "Live TV" }
                ]
            })),
            "ssap://tv/getChannelProgramInfo" => Ok(self.tv.program_info.lock().unwrap().clone()),
            "ssap://com.webos.service.update/getCurrentSWInformation" => {
                Ok(json!({ "device_id": TV_MAC, "product_name": "webOSTV 4.0" }))
            }
            other => Err(WebOsError::ApiError {
                detail: format!("404 no such service or method: {}", other),
            }),
        }
    }

    async fn send(&self, uri: &str, payload: Option<Value>) -> Result<()> {
        self.check()?;
        self.tv.sent.lock().unwrap().push((uri.to_string(), payload));
        Ok(())
    }

    fn is_alive(&self) -> bool {
        self.alive.load(Ordering::SeqCst)
    }
}

pub struct FakeTransport {
    pub tv: Arc<FakeTv>,
}

#[async_trait]
impl Transport for FakeTransport {
    async fn open(&self, ip: &str) -> Result<Arc<dyn Session>> {
        assert_eq!(ip, TV_IP);
        self.tv.opens.fetch_add(1, Ordering::SeqCst);

        let delay = *self.tv.open_delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        if !self.tv.reachable.load(Ordering::SeqCst) {
            return Err(WebOsError::Io(std::io::Error::new(
                std::io::ErrorKind::ConnectionRefused,
                "connection refused",
            )));
        }

        let session = Arc::new(FakeSession {
            tv: self.tv.clone(),
            events: Mutex::new(VecDeque::new()),
            prompted: AtomicBool::new(false),
            alive: AtomicBool::new(true),
            stale: AtomicBool::new(false),
        });
        self.tv.sessions.lock().unwrap().push(session.clone());
        Ok(session)
    }
}

#[derive(Default)]
pub struct FakeWake {
    pub sent: Mutex<Vec<MacAddress>>,
}

impl FakeWake {
    pub fn count(&self) -> usize {
        self.sent.lock().unwrap().len()
    }
}

impl WakeSender for FakeWake {
    fn send_wake(&self, mac: &MacAddress) -> Result<()> {
        self.sent.lock().unwrap().push(*mac);
        Ok(())
    }
}

pub fn transport(tv: &Arc<FakeTv>) -> Arc<FakeTransport> {
    Arc::new(FakeTransport { tv: tv.clone() })
}

/// Client for `tv`, optionally already holding a credential
pub fn client(
    tv: &Arc<FakeTv>,
    identity: DeviceIdentity,
    store: Option<PairingStore>,
) -> (TvClient, Arc<FakeWake>) {
    let wake = Arc::new(FakeWake::default());
    let client = TvClient::with_parts(identity, store, test_config(), transport(tv), wake.clone());
    (client, wake)
}
