//! Type definitions for detlink
//!
//! Configuration supplied by the surrounding application and the events the
//! communication layer hands back to it.

pub mod config;
pub mod error;
pub mod event;

pub use config::{CpuModel, Parity, PlcConfig, RoomConfig, RoomId, SerialPortConfig, StopBits};
pub use error::{Error, Result};
pub use event::{ConnectionStatusChanged, DeviceEvent, ScanEvent};
