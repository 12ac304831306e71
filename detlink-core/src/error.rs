//! Error types for detlink-core

use crate::command::ReturnCode;

/// Result type alias for detlink-core operations
pub type Result<T> = std::result::Result<T, Error>;

/// Core protocol errors
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Symbolic address does not match the address grammar
    #[error("Invalid address {address:?}: {reason} (at {token:?})")]
    Parse {
        address: String,
        token: String,
        reason: &'static str,
    },
    
    /// Frame is too short to be valid
    #[error("Packet too short: expected at least {expected} bytes, got {actual} bytes")]
    PacketTooShort {
        expected: usize,
        actual: usize,
    },
    
    /// Frame violates TPKT/COTP/S7 framing
    #[error("Malformed response: {0}")]
    MalformedResponse(String),
    
    /// Unknown S7 function code
    #[error("Unknown function code: 0x{0:02X}")]
    UnknownFunction(u8),
    
    /// PLC rejected the job in the S7 header
    #[error("PLC returned header error class 0x{class:02X} code 0x{code:02X}")]
    HeaderError {
        class: u8,
        code: u8,
    },
    
    /// PLC rejected a read/write item
    #[error("PLC rejected item: {0}")]
    ItemFailed(ReturnCode),
    
    /// Reply does not belong to the job that was sent
    #[error("Invalid PDU reference: expected {expected}, got {actual}")]
    InvalidPduReference {
        expected: u16,
        actual: u16,
    },
    
    /// Invalid link state transition
    #[error("Invalid link state: {0}")]
    InvalidState(String),
    
    /// Payload too large
    #[error("Payload too large: {size} bytes (max: {max} bytes)")]
    PayloadTooLarge {
        size: usize,
        max: usize,
    },
    
    /// Scanned hex payload could not be turned into text
    #[error("Undecodable payload: {0}")]
    Decode(String),
}

impl Error {
    pub(crate) fn parse(address: &str, token: &str, reason: &'static str) -> Self {
        Self::Parse {
            address: address.to_string(),
            token: token.to_string(),
            reason,
        }
    }
    
    /// Check if error requires reconnection
    pub fn requires_reconnect(&self) -> bool {
        matches!(
            self,
            Self::MalformedResponse(_)
                | Self::PacketTooShort { .. }
                | Self::InvalidPduReference { .. }
                | Self::InvalidState(_)
        )
    }
    
    /// PLC refused access to the addressed object
    pub fn is_access_denied(&self) -> bool {
        matches!(self, Self::ItemFailed(ReturnCode::AccessDenied))
            || matches!(self, Self::HeaderError { class: 0x87, .. })
    }
}
