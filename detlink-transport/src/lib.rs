//! Transport layer for the detection line
//!
//! Provides ISO-on-TCP links to PLCs and serial lines to barcode scanners.

pub mod tcp;
pub mod serial;
pub mod error;

pub use error::{Error, PortFault, PortFaultKind, Result};
pub use tcp::TcpTransport;
pub use serial::{
    LineEvent, ProbeResult, ReceiveHandler, SerialChannel, SerialDriver, SerialLine,
    SystemSerialDriver,
};

use std::time::Duration;

use async_trait::async_trait;
use bytes::BytesMut;

/// Frame-oriented transport to a PLC
#[async_trait]
pub trait Transport: Send + Sync {
    /// Connect to device
    async fn connect(&mut self) -> Result<()>;
    
    /// Disconnect from device
    async fn disconnect(&mut self) -> Result<()>;
    
    /// Check if connected
    fn is_connected(&self) -> bool;
    
    /// Send one complete frame
    async fn send(&mut self, data: &[u8]) -> Result<()>;
    
    /// Receive exactly one complete frame, bounded by `timeout`
    async fn receive(&mut self, timeout: Duration) -> Result<BytesMut>;
    
    /// Get remote address
    fn remote_addr(&self) -> String;
}
