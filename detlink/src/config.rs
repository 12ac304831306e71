//! Configuration loading
//!
//! A configuration file names the PLC and the scanner rooms:
//!
//! ```toml
//! [plc]
//! host = "192.168.0.10"
//! cpuModel = "S7-1200"
//! rack = 0
//! slot = 1
//!
//! [[rooms]]
//! roomId = 1
//! roomName = "Inspection 1"
//! portName = "COM3"
//! baudRate = 9600
//! parity = "Even"
//!
//! [link]
//! autoConnectDelayMs = 200
//! ```
//!
//! `DETLINK_PLC_HOST`, `DETLINK_PLC_RACK`, `DETLINK_PLC_SLOT` and
//! `DETLINK_AUTO_CONNECT_DELAY_MS` override the file when set.

use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;

use detlink_types::{PlcConfig, RoomConfig, RoomId};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Error, Result};

/// Prefix of environment overrides
pub const ENV_PREFIX: &str = "DETLINK";

/// Timing knobs of the links
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LinkOptions {
    /// Bound on every PLC exchange
    pub plc_timeout_ms: u64,

    /// Serial read wait before checking for shutdown
    pub serial_poll_ms: u64,

    /// Pause between rooms during auto-connect
    pub auto_connect_delay_ms: u64,
}

impl Default for LinkOptions {
    fn default() -> Self {
        Self {
            plc_timeout_ms: detlink_core::constants::DEFAULT_TIMEOUT_MS,
            serial_poll_ms: 100,
            auto_connect_delay_ms: 200,
        }
    }
}

impl LinkOptions {
    pub fn plc_timeout(&self) -> Duration {
        Duration::from_millis(self.plc_timeout_ms)
    }

    pub fn serial_poll(&self) -> Duration {
        Duration::from_millis(self.serial_poll_ms)
    }

    pub fn auto_connect_delay(&self) -> Duration {
        Duration::from_millis(self.auto_connect_delay_ms)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DetlinkConfig {
    pub plc: Option<PlcConfig>,
    pub rooms: Vec<RoomConfig>,
    pub link: LinkOptions,
}

impl DetlinkConfig {
    /// Load a TOML file, apply environment overrides and validate
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))?;

        let mut config = Self::parse(&content)?;
        config.apply_overrides(std::env::vars())?;
        config.validate()?;

        debug!(
            "Loaded {} ({} rooms, PLC {})",
            path.display(),
            config.rooms.len(),
            config.plc.as_ref().map_or("none", |plc| plc.host.as_str())
        );
        Ok(config)
    }

    /// Parse and validate TOML text, without environment overrides
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config = Self::parse(content)?;
        config.validate()?;
        Ok(config)
    }

    fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| Error::Config(e.to_string()))
    }

    /// Apply `DETLINK_*` overrides from the given variables
    pub fn apply_overrides<I>(&mut self, vars: I) -> Result<()>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        for (key, value) in vars {
            let Some(name) = key
                .strip_prefix(ENV_PREFIX)
                .and_then(|rest| rest.strip_prefix('_'))
            else {
                continue;
            };

            match name {
                "PLC_HOST" => match self.plc.as_mut() {
                    Some(plc) => plc.host = value,
                    None => {
                        return Err(Error::Config(format!(
                            "{} set but no [plc] section configured",
                            key
                        )));
                    }
                },
                "PLC_RACK" => {
                    if let Some(plc) = self.plc.as_mut() {
                        plc.rack = parse_number(&key, &value)?;
                    }
                }
                "PLC_SLOT" => {
                    if let Some(plc) = self.plc.as_mut() {
                        plc.slot = parse_number(&key, &value)?;
                    }
                }
                "AUTO_CONNECT_DELAY_MS" => {
                    self.link.auto_connect_delay_ms = parse_number(&key, &value)?;
                }
                _ => {}
            }
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if let Some(plc) = &self.plc {
            if plc.host.trim().is_empty() {
                return Err(Error::Config("PLC host is empty".into()));
            }
        }

        let mut seen = HashSet::new();
        for room in &self.rooms {
            if !seen.insert(room.room_id) {
                return Err(Error::Config(format!("duplicate room id {}", room.room_id)));
            }
            room.serial.validate()?;
        }

        if self.link.plc_timeout_ms == 0 {
            return Err(Error::Config("plcTimeoutMs must be non-zero".into()));
        }
        if self.link.serial_poll_ms == 0 {
            return Err(Error::Config("serialPollMs must be non-zero".into()));
        }
        Ok(())
    }

    /// Look up a room by id
    pub fn room(&self, room_id: RoomId) -> Option<&RoomConfig> {
        self.rooms.iter().find(|room| room.room_id == room_id)
    }
}

fn parse_number<T: std::str::FromStr>(key: &str, value: &str) -> Result<T> {
    value
        .trim()
        .parse()
        .map_err(|_| Error::Config(format!("{}: not a number: {:?}", key, value)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use detlink_types::{CpuModel, Parity, StopBits};
    use pretty_assertions::assert_eq;

    const SAMPLE: &str = r#"
        [plc]
        host = "192.168.0.10"
        cpuModel = "S7-1200"

        [[rooms]]
        roomId = 1
        roomName = "Inspection 1"
        portName = "COM3"
        parity = "Even"
        stopBits = 2

        [[rooms]]
        roomId = 2
        roomName = "Inspection 2"
        portName = ""
        enabled = false

        [link]
        autoConnectDelayMs = 50
    "#;

    #[test]
    fn test_parse_sample() {
        let config = DetlinkConfig::from_toml_str(SAMPLE).unwrap();

        let plc = config.plc.as_ref().unwrap();
        assert_eq!(plc.cpu_model, CpuModel::S71200);
        assert_eq!((plc.rack, plc.slot), (0, 1));

        assert_eq!(config.rooms.len(), 2);
        let room = config.room(1).unwrap();
        assert_eq!(room.serial.port_name, "COM3");
        assert_eq!(room.serial.baud_rate, 9600);
        assert_eq!(room.serial.parity, Parity::Even);
        assert_eq!(room.serial.stop_bits, StopBits::Two);
        assert!(room.should_auto_connect());
        assert!(!config.room(2).unwrap().should_auto_connect());

        assert_eq!(config.link.auto_connect_delay(), Duration::from_millis(50));
        assert_eq!(config.link.plc_timeout_ms, 5000);
    }

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = DetlinkConfig::from_toml_str("").unwrap();
        assert_eq!(config, DetlinkConfig::default());
    }

    #[test]
    fn test_duplicate_room_rejected() {
        let text = r#"
            [[rooms]]
            roomId = 4
            portName = "COM1"

            [[rooms]]
            roomId = 4
            portName = "COM2"
        "#;
        let err = DetlinkConfig::from_toml_str(text).unwrap_err();
        assert!(err.to_string().contains("duplicate room id 4"));
    }

    #[test]
    fn test_bad_serial_parameters_rejected() {
        let text = r#"
            [[rooms]]
            roomId = 1
            portName = "COM1"
            dataBits = 9
        "#;
        assert!(DetlinkConfig::from_toml_str(text).is_err());

        let text = r#"
            [[rooms]]
            roomId = 1
            portName = "COM1"
            baudRate = 0
        "#;
        assert!(DetlinkConfig::from_toml_str(text).is_err());
    }

    #[test]
    fn test_env_overrides() {
        let mut config = DetlinkConfig::from_toml_str(SAMPLE).unwrap();
        let vars = vec![
            ("DETLINK_PLC_HOST".to_string(), "10.0.0.5".to_string()),
            ("DETLINK_PLC_SLOT".to_string(), "2".to_string()),
            ("DETLINK_AUTO_CONNECT_DELAY_MS".to_string(), "0".to_string()),
            ("PATH".to_string(), "/usr/bin".to_string()),
        ];
        config.apply_overrides(vars).unwrap();

        let plc = config.plc.as_ref().unwrap();
        assert_eq!(plc.host, "10.0.0.5");
        assert_eq!(plc.slot, 2);
        assert_eq!(config.link.auto_connect_delay_ms, 0);
    }

    #[test]
    fn test_env_override_not_a_number() {
        let mut config = DetlinkConfig::from_toml_str(SAMPLE).unwrap();
        let vars = vec![("DETLINK_PLC_RACK".to_string(), "one".to_string())];
        assert!(config.apply_overrides(vars).is_err());
    }
}
