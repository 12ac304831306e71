//! # detlink
//!
//! Device communication layer of a detection line: an S7 PLC link and the
//! serial barcode scanners of the inspection rooms.
//!
//! ## Features
//!
//! - Symbolic PLC addresses (`DB1.DBX0.3`, `DB2.DBW4`, `I0.7`, ...)
//! - Typed, big-endian reads and writes over ISO-on-TCP
//! - Scan reassembly for scanners sending plain text lines or hex streams
//! - One event stream for scans and connection changes
//!
//! ## Quick Start
//!
//! ```no_run
//! use detlink::{CpuModel, DeviceEvent, PlcLink, RoomConfig, ScannerManager, SerialPortConfig};
//!
//! #[tokio::main]
//! async fn main() -> detlink::Result<()> {
//!     let plc = PlcLink::new();
//!     let scanners = ScannerManager::new().with_event_sender(plc.event_sender());
//!     let mut events = plc.subscribe();
//!
//!     plc.connect("192.168.0.10", CpuModel::S71200, 0, 1).await;
//!     scanners
//!         .auto_connect_all(&[RoomConfig::new(1, "Inspection 1", SerialPortConfig::new("COM3"))])
//!         .await;
//!
//!     while let Ok(event) = events.recv().await {
//!         if let DeviceEvent::Scan(scan) = event {
//!             plc.write_bool("DB1.DBX0.0", true).await?;
//!             println!("{}", scan);
//!         }
//!     }
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod plc;
pub mod scanner;

/// Events buffered per subscriber before the slowest one starts lagging
pub const EVENT_CAPACITY: usize = 256;

// Re-exports
pub use config::{DetlinkConfig, LinkOptions};
pub use error::{Error, Result, TransportFault};
pub use plc::{tsap_for, PlcLink};
pub use scanner::{AutoConnectSummary, ScannerManager};

// Re-export types
pub use detlink_core::{address::parse as parse_address, ConnectionState, Coordinate, FrameAssembler};
pub use detlink_transport::{ProbeResult, SerialDriver, SerialLine};
pub use detlink_types::{
    ConnectionStatusChanged, CpuModel, DeviceEvent, Parity, PlcConfig, RoomConfig, RoomId,
    ScanEvent, SerialPortConfig, StopBits,
};
