use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Tunables for talking to a television
///
/// Every field has a default, so a partial document (or `{}`) from the
/// caller's own configuration store deserializes into a usable config.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct TvConfig {
    /// WebSocket port of the control service
    pub port: u16,

    /// Upper bound for opening the control socket
    pub connect_timeout_ms: u64,

    /// Upper bound for a single request/response call
    pub request_timeout_ms: u64,

    /// Upper bound for each step of the registration handshake
    pub pairing_timeout_ms: u64,

    /// How long a discovery scan listens for replies
    pub discovery_timeout_ms: u64,

    /// Broadcast address the wake packet is sent to
    pub wake_broadcast: String,
}

impl Default for TvConfig {
    fn default() -> Self {
        Self {
            port: 3000,
            connect_timeout_ms: 5_000,
            request_timeout_ms: 5_000,
            pairing_timeout_ms: 5_000,
            discovery_timeout_ms: 3_000,
            wake_broadcast: "255.255.255.255:9".to_string(),
        }
    }
}

impl TvConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn pairing_timeout(&self) -> Duration {
        Duration::from_millis(self.pairing_timeout_ms)
    }

    pub fn discovery_timeout(&self) -> Duration {
        Duration::from_millis(self.discovery_timeout_ms)
    }

    /// Bound for a whole connection attempt: open, a rejected resume, a
    /// fresh registration and the wait for its confirmation.
    pub(crate) fn attempt_timeout(&self) -> Duration {
        self.connect_timeout() + self.pairing_timeout() * 3 + self.request_timeout()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_document_keeps_defaults() {
        let config: TvConfig = serde_json::from_str(r#"{"port": 3001}"#).unwrap();
        assert_eq!(config.port, 3001);
        assert_eq!(config.connect_timeout(), Duration::from_secs(5));
        assert_eq!(config.wake_broadcast, "255.255.255.255:9");
    }

    #[test]
    fn attempt_covers_three_handshake_steps() {
        let config = TvConfig {
            connect_timeout_ms: 100,
            request_timeout_ms: 10,
            pairing_timeout_ms: 1_000,
            ..TvConfig::default()
        };
        assert_eq!(config.attempt_timeout(), Duration::from_millis(3_110));
    }
}
