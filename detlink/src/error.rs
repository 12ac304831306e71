//! High-level error types

use std::fmt;
use std::io;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Core protocol error: {0}")]
    Core(#[from] detlink_core::Error),
    
    #[error("Transport error: {0}")]
    Transport(#[from] detlink_transport::Error),
    
    #[error("Type error: {0}")]
    Types(#[from] detlink_types::Error),
    
    #[error("PLC not connected")]
    NotConnected,
    
    /// CPU model, rack or slot do not match the PLC
    #[error("Model/rack/slot mismatch: {0}")]
    ModelMismatch(String),
    
    #[error("Configuration error: {0}")]
    Config(String),
}

impl Error {
    /// The link can no longer be trusted after this error
    pub fn requires_reconnect(&self) -> bool {
        match self {
            Self::Transport(detlink_transport::Error::NotConnected) => false,
            Self::Transport(_) => true,
            Self::Core(e) => e.requires_reconnect(),
            _ => false,
        }
    }
}

/// Classification of a failed PLC exchange, shown as status text
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportFault {
    Timeout,
    Unreachable,
    MalformedResponse,
    PermissionDenied,
    ModelMismatch,
    Other(String),
}

impl TransportFault {
    pub fn classify(error: &Error) -> Self {
        use detlink_transport::Error as T;
        
        match error {
            Error::Transport(T::ConnectionTimeout | T::ReadTimeout | T::WriteTimeout) => Self::Timeout,
            Error::Transport(T::InvalidAddress(_) | T::ConnectionClosed) => Self::Unreachable,
            Error::Transport(T::Io(e)) => Self::from_io(e),
            Error::Transport(T::Framing(_)) => Self::MalformedResponse,
            Error::Core(e) if e.is_access_denied() => Self::PermissionDenied,
            Error::Core(
                detlink_core::Error::MalformedResponse(_)
                | detlink_core::Error::PacketTooShort { .. }
                | detlink_core::Error::InvalidPduReference { .. }
                | detlink_core::Error::UnknownFunction(_),
            ) => Self::MalformedResponse,
            Error::ModelMismatch(_) => Self::ModelMismatch,
            other => Self::Other(other.to_string()),
        }
    }
    
    fn from_io(error: &io::Error) -> Self {
        match error.kind() {
            io::ErrorKind::TimedOut => Self::Timeout,
            io::ErrorKind::PermissionDenied => Self::PermissionDenied,
            io::ErrorKind::ConnectionRefused
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::NotConnected
            | io::ErrorKind::AddrNotAvailable
            | io::ErrorKind::HostUnreachable
            | io::ErrorKind::NetworkUnreachable
            | io::ErrorKind::UnexpectedEof => Self::Unreachable,
            io::ErrorKind::InvalidData => Self::MalformedResponse,
            _ => Self::Other(error.to_string()),
        }
    }
}

impl fmt::Display for TransportFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Timeout => f.write_str("timeout"),
            Self::Unreachable => f.write_str("connection refused or host unreachable"),
            Self::MalformedResponse => f.write_str("malformed response"),
            Self::PermissionDenied => f.write_str("insufficient permission"),
            Self::ModelMismatch => f.write_str("CPU model/rack/slot mismatch"),
            Self::Other(detail) => f.write_str(detail),
        }
    }
}
