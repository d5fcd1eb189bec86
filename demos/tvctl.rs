//! Small command line front end for trying the library against a real TV.
//!
//! ```text
//! cargo run --example tvctl -- discover
//! cargo run --example tvctl -- --ip 192.168.1.20 pair
//! cargo run --example tvctl -- --ip 192.168.1.20 --store '{"client_key":"..."}' status
//! ```

use clap::{Parser, Subcommand};
use futures_util::StreamExt;
use std::time::Duration;
use tracing_subscriber::EnvFilter;
use webos_control::{
    DeviceIdentity, DeviceStatus, Discovery, PairingOutcome, PairingStore, TvClient, TvConfig,
};

#[derive(Parser)]
#[command(name = "tvctl", about = "Control a webOS television")]
struct Cli {
    /// Address of the television
    #[arg(long, global = true)]
    ip: Option<String>,

    /// Hardware address, needed for `on`
    #[arg(long, global = true)]
    mac: Option<String>,

    /// Pairing blob printed by `pair`
    #[arg(long, global = true)]
    store: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Search the local network for televisions
    Discover,
    /// Pair, waiting for the on-screen confirmation
    Pair,
    Status,
    On,
    Off,
    Mute,
    Unmute,
    Channel { number: u32 },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let config = TvConfig::default();

    if let Command::Discover = cli.command {
        let mut candidates = Discovery::new(config.discovery_timeout()).discover();
        while let Some(candidate) = candidates.next().await {
            let server = candidate
                .raw_handshake_info
                .get("SERVER")
                .cloned()
                .unwrap_or_default();
            println!("{}\t{}", candidate.ip, server);
        }
        return Ok(());
    }

    let ip = cli.ip.ok_or("--ip is required")?;
    let mut identity = DeviceIdentity::new(ip);
    if let Some(mac) = cli.mac {
        identity = identity.with_mac(mac);
    }
    let store = match cli.store.as_deref() {
        Some(blob) => PairingStore::from_blob(blob)?,
        None => None,
    };
    let tv = TvClient::new(identity, store, config);

    match cli.command {
        Command::Discover => {}
        Command::Pair => loop {
            match tv.pair().await {
                PairingOutcome::Paired(store) => {
                    let record = tv.record();
                    println!("store: {}", store.to_blob());
                    if let Some(mac) = record.identity.mac {
                        println!("mac:   {}", mac);
                    }
                    break;
                }
                PairingOutcome::UserActionRequired => {
                    println!("Please accept the connection on the TV");
                    tokio::time::sleep(Duration::from_secs(1)).await;
                }
                PairingOutcome::Failed(e) => return Err(e.into()),
            }
        },
        Command::Status => match tv.get_status().await {
            DeviceStatus::Off => println!("off"),
            DeviceStatus::On { app, now_playing } => {
                println!("on: {}", app.title.unwrap_or(app.id));
                if let Some(show) = now_playing {
                    let window = match (show.start(), show.end()) {
                        (Some(start), Some(end)) => {
                            format!("{} - {}", start.format("%H:%M"), end.format("%H:%M"))
                        }
                        _ => String::new(),
                    };
                    println!("{}: {} {}", show.channel_name, window, show.program_name);
                }
            }
        },
        Command::On => tv.turn_on().await?,
        Command::Off => tv.turn_off().await?,
        Command::Mute => tv.mute().await?,
        Command::Unmute => tv.unmute().await?,
        Command::Channel { number } => tv.set_channel(number).await?,
    }

    tv.shutdown();
    Ok(())
}
