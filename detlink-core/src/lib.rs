//! # detlink-core
//!
//! Protocol logic for detection-line devices, free of any I/O.
//!
//! This crate provides:
//! - Symbolic address resolution (`DB1.DBX0.3`, `I0.7`, ...)
//! - S7 over ISO-on-TCP framing and encoding/decoding
//! - S7 function and return codes
//! - Link session state
//! - Big-endian value conversion
//! - Scan line reassembly for serial scanners

pub mod address;
pub mod command;
pub mod constants;
pub mod error;
pub mod frame;
pub mod packet;
pub mod session;
pub mod value;

pub use address::{Area, Coordinate, Width};
pub use command::{Function, MessageType, ReturnCode};
pub use error::{Error, Result};
pub use frame::{FrameAssembler, Terminator, TerminatorRule};
pub use packet::{Cotp, ItemAddress, Packet};
pub use session::{ConnectionState, Session};
