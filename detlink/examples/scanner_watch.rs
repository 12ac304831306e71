//! Scanner event example
//!
//! Loads rooms from a TOML file and prints every scan until Ctrl-C.
//!
//! Run with: `cargo run --example scanner_watch -- detlink.toml`

use detlink::{DetlinkConfig, DeviceEvent, ScannerManager};
use tokio::sync::broadcast::error::RecvError;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let path = std::env::args().nth(1).unwrap_or_else(|| "detlink.toml".to_string());
    let config = DetlinkConfig::load(&path)?;

    let scanners = ScannerManager::new()
        .with_auto_connect_delay(config.link.auto_connect_delay())
        .with_poll_interval(config.link.serial_poll());
    let mut events = scanners.subscribe();

    for room in &config.rooms {
        println!("Room {}: {}", room.room_id, scanners.test_connection(room));
    }

    let summary = scanners.auto_connect_all(&config.rooms).await;
    println!("Connected rooms: {:?}, failed: {:?}", summary.connected, summary.failed);

    loop {
        tokio::select! {
            event = events.recv() => match event {
                Ok(DeviceEvent::Scan(scan)) => println!("{}", scan),
                Ok(DeviceEvent::Status(status)) => println!("{}", status),
                Err(RecvError::Lagged(missed)) => println!("missed {} events", missed),
                Err(RecvError::Closed) => break,
            },
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    scanners.shutdown().await;
    Ok(())
}
