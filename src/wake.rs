use crate::error::{Result, WebOsError};
use std::net::UdpSocket;

/// Hardware address in canonical byte form
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MacAddress([u8; 6]);

impl MacAddress {
    /// Parse `aa:bb:cc:dd:ee:ff`, `aa-bb-cc-dd-ee-ff` or `aabbccddeeff`
    pub fn parse(text: &str) -> Option<Self> {
        let hex: String = text
            .trim()
            .chars()
            .filter(|c| *c != ':' && *c != '-' && *c != '.')
            .collect();
        if hex.len() != 12 {
            return None;
        }

        let mut bytes = [0u8; 6];
        for (i, byte) in bytes.iter_mut().enumerate() {
            *byte = u8::from_str_radix(hex.get(i * 2..i * 2 + 2)?, 16).ok()?;
        }
        Some(Self(bytes))
    }

    pub fn octets(&self) -> [u8; 6] {
        self.0
    }

    /// Wake-on-LAN frame: six `0xFF` bytes, then the address sixteen times
    pub fn magic_packet(&self) -> [u8; 102] {
        let mut packet = [0xFFu8; 102];
        for chunk in packet[6..].chunks_exact_mut(6) {
            chunk.copy_from_slice(&self.0);
        }
        packet
    }
}

/// Sends wake packets; must not block on the network
pub trait WakeSender: Send + Sync {
    fn send_wake(&self, mac: &MacAddress) -> Result<()>;
}

/// Broadcasts the magic packet over UDP
#[derive(Debug, Clone)]
pub struct UdpWakeSender {
    broadcast: String,
}

impl UdpWakeSender {
    pub fn new(broadcast: impl Into<String>) -> Self {
        Self {
            broadcast: broadcast.into(),
        }
    }
}

impl WakeSender for UdpWakeSender {
    fn send_wake(&self, mac: &MacAddress) -> Result<()> {
        let socket = UdpSocket::bind("0.0.0.0:0")?;
        socket.set_broadcast(true)?;
        socket.set_nonblocking(true)?;

        let sent = socket.send_to(&mac.magic_packet(), self.broadcast.as_str())?;
        if sent != 102 {
            return Err(WebOsError::Io(std::io::Error::new(
                std::io::ErrorKind::WriteZero,
                "short wake packet write",
            )));
        }

        tracing::debug!("Sent wake packet for {:02x?} to {}", mac.octets(), self.broadcast);
        Ok(())
    }
}
