//! S7 protocol codes: message types, job functions and item return codes

use std::fmt;

use crate::error::{Error, Result};

/// ROSCTR field of the S7 header
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum MessageType {
    Job = 0x01,
    Ack = 0x02,
    AckData = 0x03,
    UserData = 0x07,
}

impl MessageType {
    /// Acknowledgements carry the two-byte error class/code pair
    pub fn has_error_field(self) -> bool {
        matches!(self, Self::Ack | Self::AckData)
    }

    pub fn header_size(self) -> usize {
        if self.has_error_field() { 12 } else { 10 }
    }
}

impl TryFrom<u8> for MessageType {
    type Error = Error;

    fn try_from(value: u8) -> Result<Self> {
        match value {
            0x01 => Ok(Self::Job),
            0x02 => Ok(Self::Ack),
            0x03 => Ok(Self::AckData),
            0x07 => Ok(Self::UserData),
            other => Err(Error::MalformedResponse(format!(
                "unknown message type 0x{:02X}",
                other
            ))),
        }
    }
}

/// Job function codes (first parameter byte)
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Function {
    CpuServices = 0x00,
    ReadVar = 0x04,
    WriteVar = 0x05,
    RequestDownload = 0x1A,
    DownloadBlock = 0x1B,
    DownloadEnded = 0x1C,
    StartUpload = 0x1D,
    Upload = 0x1E,
    EndUpload = 0x1F,
    PlcControl = 0x28,
    PlcStop = 0x29,
    SetupCommunication = 0xF0,
}

impl Function {
    /// Get function name
    pub fn name(self) -> &'static str {
        match self {
            Self::CpuServices => "CPU_SERVICES",
            Self::ReadVar => "READ_VAR",
            Self::WriteVar => "WRITE_VAR",
            Self::RequestDownload => "REQUEST_DOWNLOAD",
            Self::DownloadBlock => "DOWNLOAD_BLOCK",
            Self::DownloadEnded => "DOWNLOAD_ENDED",
            Self::StartUpload => "START_UPLOAD",
            Self::Upload => "UPLOAD",
            Self::EndUpload => "END_UPLOAD",
            Self::PlcControl => "PLC_CONTROL",
            Self::PlcStop => "PLC_STOP",
            Self::SetupCommunication => "SETUP_COMMUNICATION",
        }
    }
}

impl From<Function> for u8 {
    fn from(function: Function) -> u8 {
        function as u8
    }
}

impl TryFrom<u8> for Function {
    type Error = Error;

    fn try_from(value: u8) -> Result<Self> {
        match value {
            0x00 => Ok(Self::CpuServices),
            0x04 => Ok(Self::ReadVar),
            0x05 => Ok(Self::WriteVar),
            0x1A => Ok(Self::RequestDownload),
            0x1B => Ok(Self::DownloadBlock),
            0x1C => Ok(Self::DownloadEnded),
            0x1D => Ok(Self::StartUpload),
            0x1E => Ok(Self::Upload),
            0x1F => Ok(Self::EndUpload),
            0x28 => Ok(Self::PlcControl),
            0x29 => Ok(Self::PlcStop),
            0xF0 => Ok(Self::SetupCommunication),
            _ => Err(Error::UnknownFunction(value)),
        }
    }
}

impl fmt::Display for Function {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}(0x{:02X})", self.name(), *self as u8)
    }
}

/// Per-item return code of read/write acknowledgements
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum ReturnCode {
    Reserved,
    HardwareFault,
    AccessDenied,
    AddressOutOfRange,
    DataTypeNotSupported,
    DataTypeInconsistent,
    ObjectDoesNotExist,
    Success,
    Other(u8),
}

impl ReturnCode {
    pub fn is_success(self) -> bool {
        matches!(self, Self::Success)
    }

    pub fn description(self) -> &'static str {
        match self {
            Self::Reserved => "reserved",
            Self::HardwareFault => "hardware fault",
            Self::AccessDenied => "access to object denied",
            Self::AddressOutOfRange => "address out of range",
            Self::DataTypeNotSupported => "data type not supported",
            Self::DataTypeInconsistent => "data type inconsistent",
            Self::ObjectDoesNotExist => "object does not exist",
            Self::Success => "success",
            Self::Other(_) => "unknown return code",
        }
    }
}

impl From<u8> for ReturnCode {
    fn from(value: u8) -> Self {
        match value {
            0x00 => Self::Reserved,
            0x01 => Self::HardwareFault,
            0x03 => Self::AccessDenied,
            0x05 => Self::AddressOutOfRange,
            0x06 => Self::DataTypeNotSupported,
            0x07 => Self::DataTypeInconsistent,
            0x0A => Self::ObjectDoesNotExist,
            0xFF => Self::Success,
            other => Self::Other(other),
        }
    }
}

impl From<ReturnCode> for u8 {
    fn from(code: ReturnCode) -> u8 {
        match code {
            ReturnCode::Reserved => 0x00,
            ReturnCode::HardwareFault => 0x01,
            ReturnCode::AccessDenied => 0x03,
            ReturnCode::AddressOutOfRange => 0x05,
            ReturnCode::DataTypeNotSupported => 0x06,
            ReturnCode::DataTypeInconsistent => 0x07,
            ReturnCode::ObjectDoesNotExist => 0x0A,
            ReturnCode::Success => 0xFF,
            ReturnCode::Other(value) => value,
        }
    }
}

impl fmt::Display for ReturnCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (0x{:02X})", self.description(), u8::from(*self))
    }
}
