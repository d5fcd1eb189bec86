use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Network identity of a television
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceIdentity {
    /// Reachable network address
    pub ip: String,

    /// Hardware address, only needed to wake the device
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mac: Option<String>,
}

impl DeviceIdentity {
    pub fn new(ip: impl Into<String>) -> Self {
        Self {
            ip: ip.into(),
            mac: None,
        }
    }

    /// Set the hardware address; an empty string means unknown
    pub fn with_mac(mut self, mac: impl Into<String>) -> Self {
        let mac = mac.into();
        self.mac = if mac.trim().is_empty() { None } else { Some(mac) };
        self
    }
}

/// Credential obtained from a successful registration
///
/// Only meaningful together with the ip it was obtained against. Unknown
/// token fields are carried through untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PairingStore {
    client_key: String,
    #[serde(flatten)]
    extra: BTreeMap<String, serde_json::Value>,
}

impl PairingStore {
    pub fn new(client_key: impl Into<String>) -> Self {
        Self {
            client_key: client_key.into(),
            extra: BTreeMap::new(),
        }
    }

    /// The key presented to the device when resuming a registration
    pub fn client_key(&self) -> &str {
        &self.client_key
    }

    /// Parse a stored blob. An empty blob, `{}` or one without a client key
    /// means the device was never paired.
    pub fn from_blob(blob: &str) -> crate::error::Result<Option<Self>> {
        if blob.trim().is_empty() {
            return Ok(None);
        }

        let map: serde_json::Map<String, serde_json::Value> = serde_json::from_str(blob)?;
        match map.get("client_key").and_then(|v| v.as_str()) {
            Some(key) if !key.is_empty() => {
                Ok(Some(serde_json::from_value(serde_json::Value::Object(map))?))
            }
            _ => Ok(None),
        }
    }

    /// Serialize into the opaque blob handed to the caller for storage
    pub fn to_blob(&self) -> String {
        // A string key plus a map of JSON values always serializes.
        serde_json::to_string(self).unwrap_or_default()
    }
}

/// A television that answered a discovery scan
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveredCandidate {
    pub ip: String,

    /// Raw reply headers, names upper-cased
    pub raw_handshake_info: BTreeMap<String, String>,
}

/// Lifecycle of the control connection to one device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConnectionState {
    /// No credential yet
    Unpaired,
    /// Credential known, no live session
    Disconnected,
    /// An attempt is in flight
    Connecting,
    /// A live, registered session exists
    Connected,
    /// Shut down by the caller; final
    Terminated,
}

/// Application currently in the foreground
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForegroundApp {
    pub id: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub icon: Option<String>,
}

/// Broadcast programme running on the current live channel
///
/// Times use the device's sortable `YYYY,MM,DD,hh,mm,ss` local format.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NowPlaying {
    pub channel_name: String,
    pub program_name: String,
    pub start_time: String,
    pub end_time: String,
}

impl NowPlaying {
    pub fn start(&self) -> Option<chrono::NaiveDateTime> {
        parse_device_time(&self.start_time)
    }

    pub fn end(&self) -> Option<chrono::NaiveDateTime> {
        parse_device_time(&self.end_time)
    }
}

pub(crate) const DEVICE_TIME_FORMAT: &str = "%Y,%m,%d,%H,%M,%S";

fn parse_device_time(value: &str) -> Option<chrono::NaiveDateTime> {
    chrono::NaiveDateTime::parse_from_str(value, DEVICE_TIME_FORMAT).ok()
}

/// Power status derived fresh on every query
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceStatus {
    Off,
    On {
        app: ForegroundApp,
        now_playing: Option<NowPlaying>,
    },
}

impl DeviceStatus {
    pub fn is_on(&self) -> bool {
        matches!(self, DeviceStatus::On { .. })
    }
}

/// What the caller persists for a device
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceRecord {
    pub identity: DeviceIdentity,
    #[serde(default)]
    pub store: Option<PairingStore>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_blobs_mean_never_paired() {
        assert_eq!(PairingStore::from_blob("").unwrap(), None);
        assert_eq!(PairingStore::from_blob("{}").unwrap(), None);
        assert_eq!(PairingStore::from_blob(r#"{"client_key": ""}"#).unwrap(), None);
    }

    #[test]
    fn blob_keeps_unknown_tokens() {
        let blob = r#"{"client_key":"abc123","issued":"2022"}"#;
        let store = PairingStore::from_blob(blob).unwrap().unwrap();
        assert_eq!(store.client_key(), "abc123");

        let again = PairingStore::from_blob(&store.to_blob()).unwrap().unwrap();
        assert_eq!(again, store);
        assert!(store.to_blob().contains("issued"));
    }

    #[test]
    fn empty_mac_is_unknown() {
        let identity = DeviceIdentity::new("10.0.0.5").with_mac("");
        assert_eq!(identity.mac, None);
    }

    #[test]
    fn now_playing_parses_device_times() {
        let show = NowPlaying {
            channel_name: "Das Erste HD".to_string(),
            program_name: "Tagesschau".to_string(),
            start_time: "2022,06,14,20,00,00".to_string(),
            end_time: "2022,06,14,20,15,00".to_string(),
        };
        let start = show.start().unwrap();
        assert_eq!(start.format("%H:%M").to_string(), "20:00");
        assert!(show.end().unwrap() > start);
    }
}
