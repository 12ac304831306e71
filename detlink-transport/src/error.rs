//! Transport errors

use std::fmt;
use std::io;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Not connected")]
    NotConnected,
    
    #[error("Already connected")]
    AlreadyConnected,
    
    #[error("Connection timeout")]
    ConnectionTimeout,
    
    #[error("Read timeout")]
    ReadTimeout,
    
    #[error("Write timeout")]
    WriteTimeout,
    
    #[error("Connection closed by remote")]
    ConnectionClosed,
    
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    
    #[error("Invalid address: {0}")]
    InvalidAddress(String),
    
    #[error("Framing error: {0}")]
    Framing(#[from] detlink_core::Error),
    
    #[error("Serial port unavailable: {0}")]
    PortUnavailable(PortFault),
}

/// Why a serial port could not be used
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PortFaultKind {
    /// Port is not known to the OS
    NotFound,
    
    /// Port exists but is held by another process or lacks permissions
    AccessDenied,
    
    /// Driver refused the line parameters
    ParameterRejected,
    
    Other,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortFault {
    pub port: String,
    pub kind: PortFaultKind,
    pub detail: String,
}

impl PortFault {
    pub fn new(port: impl Into<String>, kind: PortFaultKind, detail: impl Into<String>) -> Self {
        Self {
            port: port.into(),
            kind,
            detail: detail.into(),
        }
    }
    
    pub fn not_found(port: impl Into<String>) -> Self {
        Self::new(port, PortFaultKind::NotFound, "port does not exist")
    }
    
    pub fn parameter_rejected(port: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::new(port, PortFaultKind::ParameterRejected, detail)
    }
    
    /// Classify a driver error raised while opening `port`
    pub fn classify(port: &str, error: &tokio_serial::Error) -> Self {
        use tokio_serial::ErrorKind;
        
        let detail = error.description.clone();
        let lowered = detail.to_ascii_lowercase();
        
        let kind = if lowered.contains("access") && lowered.contains("denied")
            || lowered.contains("busy")
            || lowered.contains("in use")
            || lowered.contains("permission")
        {
            PortFaultKind::AccessDenied
        } else {
            match error.kind {
                ErrorKind::NoDevice => PortFaultKind::NotFound,
                ErrorKind::InvalidInput => PortFaultKind::ParameterRejected,
                ErrorKind::Io(io::ErrorKind::NotFound) => PortFaultKind::NotFound,
                ErrorKind::Io(io::ErrorKind::PermissionDenied) => PortFaultKind::AccessDenied,
                ErrorKind::Io(io::ErrorKind::InvalidInput) => PortFaultKind::ParameterRejected,
                _ => PortFaultKind::Other,
            }
        };
        
        Self::new(port, kind, detail)
    }
    
    /// Missing OS-level rights will not fix themselves by retrying
    pub fn is_permanent(&self) -> bool {
        matches!(self.kind, PortFaultKind::AccessDenied | PortFaultKind::ParameterRejected)
    }
}

impl fmt::Display for PortFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let what = match self.kind {
            PortFaultKind::NotFound => "not found",
            PortFaultKind::AccessDenied => "access denied (held by another process?)",
            PortFaultKind::ParameterRejected => "parameters rejected",
            PortFaultKind::Other => "open failed",
        };
        write!(f, "{} {}: {}", self.port, what, self.detail)
    }
}

impl Error {
    /// Serial fault carried by this error, if any
    pub fn port_fault(&self) -> Option<&PortFault> {
        match self {
            Self::PortUnavailable(fault) => Some(fault),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_serial::ErrorKind;
    
    #[test]
    fn test_classify_driver_errors() {
        let missing = tokio_serial::Error::new(ErrorKind::NoDevice, "No such file or directory");
        assert_eq!(PortFault::classify("COM9", &missing).kind, PortFaultKind::NotFound);
        
        let busy = tokio_serial::Error::new(ErrorKind::NoDevice, "Device or resource busy");
        assert_eq!(PortFault::classify("COM9", &busy).kind, PortFaultKind::AccessDenied);
        
        let denied = tokio_serial::Error::new(ErrorKind::Unknown, "Access is denied.");
        assert_eq!(PortFault::classify("COM9", &denied).kind, PortFaultKind::AccessDenied);
        
        let baud = tokio_serial::Error::new(ErrorKind::InvalidInput, "Invalid baud rate");
        assert_eq!(PortFault::classify("COM9", &baud).kind, PortFaultKind::ParameterRejected);
        
        let io = tokio_serial::Error::new(ErrorKind::Io(io::ErrorKind::PermissionDenied), "EACCES");
        let fault = PortFault::classify("/dev/ttyS0", &io);
        assert_eq!(fault.kind, PortFaultKind::AccessDenied);
        assert!(fault.is_permanent());
    }
    
    #[test]
    fn test_fault_display() {
        let fault = PortFault::not_found("COM2");
        assert_eq!(fault.to_string(), "COM2 not found: port does not exist");
    }
}
