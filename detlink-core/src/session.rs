//! Link session state for the S7 protocol
//!
//! A session represents one connection to a PLC and tracks:
//! - Connection state
//! - PDU reference counter (increments per job)
//! - Negotiated PDU size

use std::fmt;
use std::sync::atomic::{AtomicU16, Ordering};
use std::sync::Arc;

use crate::constants::REQUESTED_PDU_SIZE;
use crate::error::{Error, Result};

/// Connection state
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionState {
    /// Not connected
    Disconnected,

    /// Handshake in progress
    Connecting,

    /// Ready for read/write jobs
    Connected,

    /// Last connect attempt failed
    Failed(String),
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Disconnected => f.write_str("Disconnected"),
            Self::Connecting => f.write_str("Connecting"),
            Self::Connected => f.write_str("Connected"),
            Self::Failed(reason) => write!(f, "Failed: {}", reason),
        }
    }
}

/// Session manager
///
/// Manages connection state and PDU reference generation.
/// Thread-safe and can be cloned cheaply (Arc internally).
#[derive(Debug, Clone)]
pub struct Session {
    inner: Arc<SessionInner>,
}

#[derive(Debug)]
struct SessionInner {
    /// Next PDU reference
    pdu_ref: AtomicU16,

    /// PDU size agreed during setup communication
    pdu_size: AtomicU16,

    /// Current connection state
    state: parking_lot::RwLock<ConnectionState>,
}

impl Session {
    /// First PDU reference of a fresh session
    pub const INITIAL_PDU_REF: u16 = 1;

    /// Create a new disconnected session
    pub fn new() -> Self {
        Self {
            inner: Arc::new(SessionInner {
                pdu_ref: AtomicU16::new(Self::INITIAL_PDU_REF),
                pdu_size: AtomicU16::new(REQUESTED_PDU_SIZE),
                state: parking_lot::RwLock::new(ConnectionState::Disconnected),
            }),
        }
    }

    /// Get current state
    pub fn state(&self) -> ConnectionState {
        self.inner.state.read().clone()
    }

    /// Check if connected
    pub fn is_connected(&self) -> bool {
        matches!(*self.inner.state.read(), ConnectionState::Connected)
    }

    /// Negotiated PDU size
    pub fn pdu_size(&self) -> u16 {
        self.inner.pdu_size.load(Ordering::Acquire)
    }

    /// Enter the handshake; only allowed from `Disconnected`
    pub fn begin_connect(&self) -> Result<()> {
        let mut state = self.inner.state.write();

        if *state != ConnectionState::Disconnected {
            return Err(Error::InvalidState(
                format!("Cannot connect from state: {}", *state)
            ));
        }

        self.inner.pdu_ref.store(Self::INITIAL_PDU_REF, Ordering::Release);
        *state = ConnectionState::Connecting;
        Ok(())
    }

    /// Handshake finished with the given PDU size
    pub fn establish(&self, pdu_size: u16) -> Result<()> {
        let mut state = self.inner.state.write();

        if *state != ConnectionState::Connecting {
            return Err(Error::InvalidState(
                format!("Cannot establish from state: {}", *state)
            ));
        }

        self.inner.pdu_size.store(pdu_size, Ordering::Release);
        *state = ConnectionState::Connected;
        Ok(())
    }

    /// Handshake failed
    pub fn fail(&self, reason: impl Into<String>) {
        *self.inner.state.write() = ConnectionState::Failed(reason.into());
    }

    /// Close session
    pub fn close(&self) {
        self.inner.pdu_ref.store(Self::INITIAL_PDU_REF, Ordering::Release);
        self.inner.pdu_size.store(REQUESTED_PDU_SIZE, Ordering::Release);
        *self.inner.state.write() = ConnectionState::Disconnected;
    }

    /// Get next PDU reference
    ///
    /// Starts at 1 and wraps from 65535 back to 1; 0 is never handed out.
    pub fn next_pdu_ref(&self) -> u16 {
        let mut current = self.inner.pdu_ref.load(Ordering::Acquire);
        loop {
            let next = if current == u16::MAX { 1 } else { current + 1 };
            match self.inner.pdu_ref.compare_exchange_weak(
                current,
                next,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return current,
                Err(actual) => current = actual,
            }
        }
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_new() {
        let session = Session::new();
        assert_eq!(session.state(), ConnectionState::Disconnected);
        assert!(!session.is_connected());
        assert_eq!(session.pdu_size(), REQUESTED_PDU_SIZE);
    }

    #[test]
    fn test_session_establish() {
        let session = Session::new();
        session.begin_connect().unwrap();
        assert_eq!(session.state(), ConnectionState::Connecting);
        assert!(!session.is_connected());

        session.establish(240).unwrap();
        assert!(session.is_connected());
        assert_eq!(session.pdu_size(), 240);
    }

    #[test]
    fn test_session_fail_then_close() {
        let session = Session::new();
        session.begin_connect().unwrap();
        session.fail("timeout");

        assert_eq!(session.state(), ConnectionState::Failed("timeout".into()));
        assert_eq!(session.state().to_string(), "Failed: timeout");
        assert!(session.begin_connect().is_err());

        session.close();
        assert_eq!(session.state(), ConnectionState::Disconnected);
        assert!(session.begin_connect().is_ok());
    }

    #[test]
    fn test_invalid_state_transitions() {
        let session = Session::new();

        // Cannot establish without connecting
        assert!(session.establish(480).is_err());

        // Cannot connect twice
        session.begin_connect().unwrap();
        assert!(session.begin_connect().is_err());
    }

    #[test]
    fn test_pdu_ref_generation() {
        let session = Session::new();
        session.begin_connect().unwrap();

        assert_eq!(session.next_pdu_ref(), 1);
        assert_eq!(session.next_pdu_ref(), 2);
        assert_eq!(session.next_pdu_ref(), 3);
    }

    #[test]
    fn test_pdu_ref_wrap_skips_zero() {
        let session = Session::new();

        for _ in 0..u16::MAX as u32 + 10 {
            assert_ne!(session.next_pdu_ref(), 0);
        }
    }

    #[test]
    fn test_session_clone() {
        let session1 = Session::new();
        let session2 = session1.clone();

        session1.begin_connect().unwrap();
        session1.establish(480).unwrap();

        // Both share same state
        assert!(session2.is_connected());
    }
}
