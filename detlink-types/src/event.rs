//! Events produced for the application layer

use std::fmt;

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};

use crate::config::RoomId;

/// One decoded scan line
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanEvent {
    pub room_id: RoomId,
    pub room_name: String,
    pub payload: String,
    pub timestamp: DateTime<Local>,
}

impl ScanEvent {
    pub fn new(room_id: RoomId, room_name: impl Into<String>, payload: impl Into<String>) -> Self {
        Self {
            room_id,
            room_name: room_name.into(),
            payload: payload.into(),
            timestamp: Local::now(),
        }
    }
}

impl fmt::Display for ScanEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Scan[room {} ({}): {:?} at {}]",
            self.room_id,
            self.room_name,
            self.payload,
            self.timestamp.format("%H:%M:%S%.3f")
        )
    }
}

/// A realized open/close transition of a device connection
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionStatusChanged {
    /// `None` means the PLC
    pub room_id: Option<RoomId>,
    pub connected: bool,
    pub status_text: String,
}

impl ConnectionStatusChanged {
    pub fn plc(connected: bool, status_text: impl Into<String>) -> Self {
        Self {
            room_id: None,
            connected,
            status_text: status_text.into(),
        }
    }

    pub fn room(room_id: RoomId, connected: bool, status_text: impl Into<String>) -> Self {
        Self {
            room_id: Some(room_id),
            connected,
            status_text: status_text.into(),
        }
    }

    pub fn is_plc(&self) -> bool {
        self.room_id.is_none()
    }
}

impl fmt::Display for ConnectionStatusChanged {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let target = match self.room_id {
            Some(id) => format!("room {}", id),
            None => "PLC".to_string(),
        };
        let state = if self.connected { "connected" } else { "disconnected" };
        write!(f, "{} {}: {}", target, state, self.status_text)
    }
}

/// Everything published on the device event surface
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceEvent {
    Scan(ScanEvent),
    Status(ConnectionStatusChanged),
}

impl From<ScanEvent> for DeviceEvent {
    fn from(event: ScanEvent) -> Self {
        Self::Scan(event)
    }
}

impl From<ConnectionStatusChanged> for DeviceEvent {
    fn from(event: ConnectionStatusChanged) -> Self {
        Self::Status(event)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_display() {
        let plc = ConnectionStatusChanged::plc(false, "timeout");
        assert!(plc.is_plc());
        assert_eq!(plc.to_string(), "PLC disconnected: timeout");

        let room = ConnectionStatusChanged::room(2, true, "COM4 open");
        assert_eq!(room.to_string(), "room 2 connected: COM4 open");
    }

    #[test]
    fn test_scan_event_into_device_event() {
        let scan = ScanEvent::new(1, "Room 1", "H0001");
        match DeviceEvent::from(scan.clone()) {
            DeviceEvent::Scan(inner) => assert_eq!(inner, scan),
            other => panic!("unexpected event: {:?}", other),
        }
    }
}
