//! Device configuration structures
//!
//! These are read-only to the communication layer; the application owns them.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Identifier of an inspection room (one scanner line per room)
pub type RoomId = u32;

/// Serial parity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Parity {
    #[default]
    None,
    Odd,
    Even,
    Mark,
    Space,
}

impl fmt::Display for Parity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::None => "None",
            Self::Odd => "Odd",
            Self::Even => "Even",
            Self::Mark => "Mark",
            Self::Space => "Space",
        };
        f.write_str(name)
    }
}

/// Serial stop bits (only one and two are supported by scanner hardware)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum StopBits {
    #[default]
    One,
    Two,
}

impl TryFrom<u8> for StopBits {
    type Error = Error;

    fn try_from(value: u8) -> Result<Self> {
        match value {
            1 => Ok(Self::One),
            2 => Ok(Self::Two),
            other => Err(Error::Validation(format!(
                "stop bits must be 1 or 2, got {}",
                other
            ))),
        }
    }
}

impl From<StopBits> for u8 {
    fn from(bits: StopBits) -> u8 {
        match bits {
            StopBits::One => 1,
            StopBits::Two => 2,
        }
    }
}

/// Siemens CPU family, selects the TSAP pair used during connect
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CpuModel {
    #[serde(rename = "S7-200", alias = "S7200")]
    S7200,
    #[serde(rename = "S7-200Smart", alias = "S7200Smart")]
    S7200Smart,
    #[serde(rename = "Logo0BA8")]
    Logo0BA8,
    #[serde(rename = "S7-300", alias = "S7300")]
    S7300,
    #[serde(rename = "S7-400", alias = "S7400")]
    S7400,
    #[serde(rename = "S7-1200", alias = "S71200")]
    S71200,
    #[serde(rename = "S7-1500", alias = "S71500")]
    S71500,
}

impl CpuModel {
    /// Whether the remote TSAP is derived from rack and slot
    pub fn uses_rack_slot(self) -> bool {
        matches!(self, Self::S7300 | Self::S7400 | Self::S71200 | Self::S71500)
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::S7200 => "S7-200",
            Self::S7200Smart => "S7-200Smart",
            Self::Logo0BA8 => "Logo0BA8",
            Self::S7300 => "S7-300",
            Self::S7400 => "S7-400",
            Self::S71200 => "S7-1200",
            Self::S71500 => "S7-1500",
        }
    }
}

impl fmt::Display for CpuModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for CpuModel {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let normalized: String = s
            .trim()
            .chars()
            .filter(|c| *c != '-' && *c != '_' && *c != ' ')
            .collect::<String>()
            .to_ascii_uppercase();

        match normalized.as_str() {
            "S7200" => Ok(Self::S7200),
            "S7200SMART" => Ok(Self::S7200Smart),
            "LOGO0BA8" => Ok(Self::Logo0BA8),
            "S7300" => Ok(Self::S7300),
            "S7400" => Ok(Self::S7400),
            "S71200" => Ok(Self::S71200),
            "S71500" => Ok(Self::S71500),
            _ => Err(Error::Parse(format!("unknown CPU model: {}", s))),
        }
    }
}

/// PLC connection parameters
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlcConfig {
    /// Host name or IP address of the PLC
    pub host: String,

    pub cpu_model: CpuModel,

    #[serde(default)]
    pub rack: u8,

    #[serde(default = "default_slot")]
    pub slot: u8,
}

fn default_slot() -> u8 {
    1
}

impl PlcConfig {
    pub fn new(host: impl Into<String>, cpu_model: CpuModel, rack: u8, slot: u8) -> Self {
        Self {
            host: host.into(),
            cpu_model,
            rack,
            slot,
        }
    }
}

/// Serial line parameters of one scanner
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SerialPortConfig {
    /// Port name as known to the OS (`COM3`, `/dev/ttyUSB0`)
    #[serde(default)]
    pub port_name: String,

    #[serde(default = "default_baud_rate")]
    pub baud_rate: u32,

    #[serde(default = "default_data_bits")]
    pub data_bits: u8,

    #[serde(default)]
    pub stop_bits: StopBits,

    #[serde(default)]
    pub parity: Parity,

    /// Scanning enabled for this line
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_baud_rate() -> u32 {
    9600
}

fn default_data_bits() -> u8 {
    8
}

fn default_enabled() -> bool {
    true
}

impl SerialPortConfig {
    /// 9600 8N1 on the given port
    pub fn new(port_name: impl Into<String>) -> Self {
        Self {
            port_name: port_name.into(),
            baud_rate: default_baud_rate(),
            data_bits: default_data_bits(),
            stop_bits: StopBits::One,
            parity: Parity::None,
            enabled: true,
        }
    }

    pub fn with_baud_rate(mut self, baud_rate: u32) -> Self {
        self.baud_rate = baud_rate;
        self
    }

    pub fn with_parity(mut self, parity: Parity) -> Self {
        self.parity = parity;
        self
    }

    pub fn with_stop_bits(mut self, stop_bits: StopBits) -> Self {
        self.stop_bits = stop_bits;
        self
    }

    pub fn with_data_bits(mut self, data_bits: u8) -> Self {
        self.data_bits = data_bits;
        self
    }

    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Has a port been configured at all
    pub fn has_port(&self) -> bool {
        !self.port_name.trim().is_empty()
    }

    pub fn validate(&self) -> Result<()> {
        if self.baud_rate == 0 {
            return Err(Error::Validation(format!(
                "{}: baud rate must be non-zero",
                self.port_name
            )));
        }
        if !(5..=8).contains(&self.data_bits) {
            return Err(Error::Validation(format!(
                "{}: data bits must be 5..=8, got {}",
                self.port_name, self.data_bits
            )));
        }
        Ok(())
    }
}

impl fmt::Display for SerialPortConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}@{} {}{}{}",
            self.port_name,
            self.baud_rate,
            self.data_bits,
            self.parity.to_string().chars().next().unwrap_or('N'),
            u8::from(self.stop_bits)
        )
    }
}

/// One inspection room and its scanner line
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomConfig {
    pub room_id: RoomId,

    #[serde(default)]
    pub room_name: String,

    #[serde(flatten)]
    pub serial: SerialPortConfig,
}

impl RoomConfig {
    pub fn new(room_id: RoomId, room_name: impl Into<String>, serial: SerialPortConfig) -> Self {
        Self {
            room_id,
            room_name: room_name.into(),
            serial,
        }
    }

    /// Eligible for bulk auto-connect
    pub fn should_auto_connect(&self) -> bool {
        self.serial.enabled && self.serial.has_port()
    }
}
