//! PLC read/write example
//!
//! Run with: `PLC_HOST=192.168.0.10 RUST_LOG=detlink=debug cargo run --example plc_monitor`

use std::time::Duration;

use detlink::{CpuModel, PlcLink};
use tokio::time::sleep;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> detlink::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let host = std::env::var("PLC_HOST").unwrap_or_else(|_| "192.168.0.10".to_string());
    let model: CpuModel = std::env::var("PLC_MODEL")
        .unwrap_or_else(|_| "S7-1200".to_string())
        .parse()?;

    let plc = PlcLink::new();
    if !plc.connect(&host, model, 0, 1).await {
        println!("Connect failed: {}", plc.status_text());
        return Ok(());
    }
    println!("Connected ({} byte PDU)", plc.pdu_size());

    for _ in 0..5 {
        let running = plc.read_bool("DB1.DBX0.0").await?;
        let count = plc.read_int("DB1.DBD2").await?;
        let speed = plc.read_float("DB1.DBD6").await?;
        println!("running={} count={} speed={:.2}", running, count, speed);
        sleep(Duration::from_secs(1)).await;
    }

    // Acknowledge bit
    plc.write_bool("DB1.DBX0.3", true).await?;

    plc.disconnect().await;
    Ok(())
}
