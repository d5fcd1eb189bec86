//! Rust library for discovering, pairing with and controlling LG webOS televisions
//!
//! This library provides an async API over the webOS second-screen protocol.
//! It supports:
//!
//! - Discovery via SSDP on the local network
//! - Pairing, including the on-screen confirmation prompt
//! - A managed control connection that reconnects on demand
//! - Power, mute and channel commands
//! - Wake-on-LAN for devices without a live connection
//! - Status queries with the currently running broadcast programme
//!
//! # Quick Start
//!
//! ```no_run
//! use futures_util::StreamExt;
//! use webos_control::{Discovery, DeviceIdentity, PairingOutcome, TvClient, TvConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = TvConfig::default();
//!     let mut candidates = Discovery::new(config.discovery_timeout()).discover();
//!
//!     if let Some(found) = candidates.next().await {
//!         let tv = TvClient::new(DeviceIdentity::new(found.ip), None, config);
//!         if let PairingOutcome::Paired(store) = tv.pair().await {
//!             println!("Paired, keep this: {}", store.to_blob());
//!             tv.mute().await?;
//!         }
//!     }
//!     Ok(())
//! }
//! ```
//!
//! # Architecture
//!
//! - **Discovery**: SSDP search for `webos-second-screen` services
//! - **Pairing**: the registration exchange, one outcome per attempt
//! - **Manager**: the per-device connection state machine
//! - **Status / Commands**: queries and commands on top of the manager
//! - **Connection**: low-level WebSocket protocol handling
//! - **Protocol**: JSON message structures
//! - **Types**: domain types and data structures

mod client;
mod commands;
mod config;
mod connection;
mod discovery;
mod error;
mod manager;
mod pairing;
mod protocol;
mod status;
mod subscription;
mod transport;
mod types;
mod wake;

// Public exports
pub use client::TvClient;
pub use commands::{CommandDispatcher, CommandResult};
pub use config::TvConfig;
pub use discovery::{exclude_known, Discovery, SEARCH_TARGET};
pub use error::{ControlError, Result, WebOsError};
pub use manager::ConnectionManager;
pub use pairing::{PairingManager, PairingOutcome};
pub use protocol::{HandshakeEvent, LIVE_TV_APP_ID};
pub use status::StatusPoller;
pub use subscription::{DeviceEvent, EventReceiver};
pub use transport::{Session, Transport, WebSocketTransport};
pub use types::{
    ConnectionState, DeviceIdentity, DeviceRecord, DeviceStatus, DiscoveredCandidate,
    ForegroundApp, NowPlaying, PairingStore,
};
pub use wake::{MacAddress, UdpWakeSender, WakeSender};
