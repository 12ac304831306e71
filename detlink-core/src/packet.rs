//! S7 over ISO-on-TCP framing and encoding/decoding
//!
//! # Frame Structure
//!
//! ```text
//! ┌──────────────┬─────────────────┬──────────────────────────────────────────┐
//! │     TPKT     │      COTP       │                 S7 PDU                   │
//! │   4 bytes    │  LI + LI bytes  │ header(10/12) │ parameters │ data        │
//! │ 03 00 len BE │ DT: 02 F0 80    │ 32 rosctr ... │  N bytes   │  M bytes    │
//! └──────────────┴─────────────────┴──────────────────────────────────────────┘
//! ```
//!
//! All multi-byte values are big-endian.
//!
//! # Examples
//!
//! ```
//! use detlink_core::packet::{Cotp, ItemAddress, Packet};
//! use detlink_core::address::parse;
//!
//! let coord = parse("DB1.DBW4").unwrap();
//! let item = ItemAddress::for_coordinate(&coord, 2);
//! let frame = Packet::read_var(7, &item).into_frame();
//!
//! match Cotp::decode(frame).unwrap() {
//!     Cotp::Data(pdu) => assert_eq!(Packet::decode(pdu).unwrap().pdu_ref, 7),
//!     other => panic!("unexpected {:?}", other),
//! }
//! ```

use bytes::{Buf, BufMut, Bytes, BytesMut};
use std::fmt;

use crate::{
    address::{Area, Coordinate},
    command::{Function, MessageType, ReturnCode},
    constants::{cotp, s7, tpkt, MAX_BYTE_OFFSET},
    error::{Error, Result},
};

/// Validate a TPKT header and return the total frame length it announces
pub fn tpkt_length(header: &[u8]) -> Result<usize> {
    if header.len() < tpkt::HEADER_SIZE {
        return Err(Error::PacketTooShort {
            expected: tpkt::HEADER_SIZE,
            actual: header.len(),
        });
    }
    if header[0] != tpkt::VERSION {
        return Err(Error::MalformedResponse(format!(
            "TPKT version 0x{:02X}",
            header[0]
        )));
    }
    let length = u16::from_be_bytes([header[2], header[3]]) as usize;
    // TPKT header plus the smallest COTP unit
    if length < tpkt::HEADER_SIZE + 3 {
        return Err(Error::MalformedResponse(format!("TPKT length {}", length)));
    }
    Ok(length)
}

fn wrap_tpkt(cotp: &[u8]) -> BytesMut {
    let total = tpkt::HEADER_SIZE + cotp.len();
    let mut buf = BytesMut::with_capacity(total);
    buf.put_u8(tpkt::VERSION);
    buf.put_u8(0);
    buf.put_u16(total as u16);
    buf.put_slice(cotp);
    buf
}

/// Connection parameters carried by COTP CR/CC
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectParams {
    pub dst_ref: u16,
    pub src_ref: u16,
    pub calling_tsap: u16,
    pub called_tsap: u16,
    pub tpdu_size: u8,
}

impl ConnectParams {
    pub fn new(calling_tsap: u16, called_tsap: u16) -> Self {
        Self {
            dst_ref: 0,
            src_ref: cotp::LOCAL_REFERENCE,
            calling_tsap,
            called_tsap,
            tpdu_size: cotp::TPDU_SIZE_1024,
        }
    }
}

/// One COTP unit, wrapped in a TPKT frame on the wire
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Cotp {
    ConnectRequest(ConnectParams),
    ConnectConfirm(ConnectParams),
    DisconnectRequest { reason: u8 },
    Data(Bytes),
}

impl Cotp {
    /// Encode into a complete TPKT frame
    pub fn encode(&self) -> BytesMut {
        let mut unit = BytesMut::with_capacity(32);

        match self {
            Self::ConnectRequest(params) | Self::ConnectConfirm(params) => {
                let pdu_type = if matches!(self, Self::ConnectRequest(_)) {
                    cotp::CR
                } else {
                    cotp::CC
                };
                // fixed part (6) + three parameters (4 + 4 + 3)
                unit.put_u8(17);
                unit.put_u8(pdu_type);
                unit.put_u16(params.dst_ref);
                unit.put_u16(params.src_ref);
                unit.put_u8(0x00);
                unit.put_u8(cotp::PARAM_TPDU_SIZE);
                unit.put_u8(1);
                unit.put_u8(params.tpdu_size);
                unit.put_u8(cotp::PARAM_CALLING_TSAP);
                unit.put_u8(2);
                unit.put_u16(params.calling_tsap);
                unit.put_u8(cotp::PARAM_CALLED_TSAP);
                unit.put_u8(2);
                unit.put_u16(params.called_tsap);
            }
            Self::DisconnectRequest { reason } => {
                unit.put_u8(6);
                unit.put_u8(cotp::DR);
                unit.put_u16(0);
                unit.put_u16(cotp::LOCAL_REFERENCE);
                unit.put_u8(*reason);
            }
            Self::Data(payload) => {
                unit.put_u8(2);
                unit.put_u8(cotp::DT);
                unit.put_u8(cotp::EOT);
                unit.put_slice(payload);
            }
        }

        wrap_tpkt(&unit)
    }

    /// Decode a complete TPKT frame
    ///
    /// # Errors
    ///
    /// Returns an error if the TPKT header is invalid, the frame is truncated,
    /// or the COTP unit type is not one of CR/CC/DR/DT.
    pub fn decode(mut buf: BytesMut) -> Result<Self> {
        let length = tpkt_length(&buf)?;
        if buf.len() < length {
            return Err(Error::PacketTooShort {
                expected: length,
                actual: buf.len(),
            });
        }
        buf.truncate(length);
        buf.advance(tpkt::HEADER_SIZE);

        let li = buf.get_u8() as usize;
        if li == 0 || buf.len() < li {
            return Err(Error::MalformedResponse(format!(
                "COTP length indicator {} exceeds frame",
                li
            )));
        }
        let pdu_type = buf[0] & 0xF0;

        match pdu_type {
            cotp::DT => {
                buf.advance(li);
                Ok(Self::Data(buf.freeze()))
            }
            cotp::CR | cotp::CC => {
                let mut header = buf.split_to(li);
                if header.len() < 6 {
                    return Err(Error::MalformedResponse("COTP connect unit too short".into()));
                }
                header.advance(1);
                let dst_ref = header.get_u16();
                let src_ref = header.get_u16();
                header.advance(1); // class

                let mut params = ConnectParams {
                    dst_ref,
                    src_ref,
                    calling_tsap: 0,
                    called_tsap: 0,
                    tpdu_size: cotp::TPDU_SIZE_1024,
                };

                while header.len() >= 2 {
                    let code = header.get_u8();
                    let len = header.get_u8() as usize;
                    if header.len() < len {
                        return Err(Error::MalformedResponse(format!(
                            "COTP parameter 0x{:02X} truncated",
                            code
                        )));
                    }
                    let value = header.split_to(len);
                    match (code, len) {
                        (cotp::PARAM_CALLING_TSAP, 2) => {
                            params.calling_tsap = u16::from_be_bytes([value[0], value[1]]);
                        }
                        (cotp::PARAM_CALLED_TSAP, 2) => {
                            params.called_tsap = u16::from_be_bytes([value[0], value[1]]);
                        }
                        (cotp::PARAM_TPDU_SIZE, 1) => params.tpdu_size = value[0],
                        _ => {}
                    }
                }

                if pdu_type == cotp::CR {
                    Ok(Self::ConnectRequest(params))
                } else {
                    Ok(Self::ConnectConfirm(params))
                }
            }
            cotp::DR => {
                let reason = if li >= 6 { buf[5] } else { 0 };
                Ok(Self::DisconnectRequest { reason })
            }
            other => Err(Error::MalformedResponse(format!(
                "unexpected COTP unit 0x{:02X}",
                other
            ))),
        }
    }
}

/// Address of one read/write item (S7-ANY, byte transport size)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ItemAddress {
    pub area: Area,
    pub db: u16,
    pub byte: u32,
    pub bit: u8,
    /// Number of bytes addressed
    pub length: u16,
}

impl ItemAddress {
    /// Byte-range item starting at the coordinate's byte
    ///
    /// Bit offsets are not part of byte-range items; bit access is done by
    /// reading and writing the containing byte.
    pub fn for_coordinate(coord: &Coordinate, length: u16) -> Self {
        Self {
            area: coord.area,
            db: coord.db_number(),
            byte: coord.byte,
            bit: 0,
            length,
        }
    }

    /// Same item shifted by `offset` bytes with a new length
    pub fn slice(&self, offset: u32, length: u16) -> Self {
        Self {
            byte: self.byte + offset,
            length,
            ..*self
        }
    }

    fn bit_address(&self) -> u32 {
        (self.byte << 3) | (self.bit as u32 & 0x07)
    }

    fn encode(&self, buf: &mut BytesMut) {
        buf.put_u8(s7::ITEM_SPEC);
        buf.put_u8(s7::ITEM_LENGTH);
        buf.put_u8(s7::SYNTAX_ANY);
        buf.put_u8(s7::TS_BYTE);
        buf.put_u16(self.length);
        buf.put_u16(self.db);
        buf.put_u8(self.area.code());
        let address = self.bit_address();
        buf.put_u8((address >> 16) as u8);
        buf.put_u8((address >> 8) as u8);
        buf.put_u8(address as u8);
    }

    fn decode(buf: &mut Bytes) -> Result<Self> {
        if buf.len() < s7::ITEM_SIZE {
            return Err(Error::PacketTooShort {
                expected: s7::ITEM_SIZE,
                actual: buf.len(),
            });
        }
        if buf.get_u8() != s7::ITEM_SPEC || buf.get_u8() != s7::ITEM_LENGTH || buf.get_u8() != s7::SYNTAX_ANY {
            return Err(Error::MalformedResponse("unsupported item specification".into()));
        }
        let transport_size = buf.get_u8();
        let count = buf.get_u16();
        let length = match transport_size {
            s7::TS_BYTE => count,
            s7::TS_BIT => count.div_ceil(8),
            other => {
                return Err(Error::MalformedResponse(format!(
                    "unsupported transport size 0x{:02X}",
                    other
                )));
            }
        };
        let db = buf.get_u16();
        let area_code = buf.get_u8();
        let area = Area::from_code(area_code).ok_or_else(|| {
            Error::MalformedResponse(format!("unknown area 0x{:02X}", area_code))
        })?;
        let address = ((buf.get_u8() as u32) << 16) | ((buf.get_u8() as u32) << 8) | buf.get_u8() as u32;

        Ok(Self {
            area,
            db,
            byte: address >> 3,
            bit: (address & 0x07) as u8,
            length,
        })
    }
}

/// S7 PDU (the payload of a COTP DT unit)
#[derive(Clone, PartialEq, Eq)]
pub struct Packet {
    pub message_type: MessageType,

    /// Job reference echoed by the PLC in its reply
    pub pdu_ref: u16,

    /// Error class of acknowledgements (0 = no error)
    pub error_class: u8,

    /// Error code of acknowledgements (0 = no error)
    pub error_code: u8,

    pub params: Bytes,

    pub data: Bytes,
}

impl Packet {
    /// Create a job packet
    pub fn job(pdu_ref: u16, params: impl Into<Bytes>, data: impl Into<Bytes>) -> Self {
        Self {
            message_type: MessageType::Job,
            pdu_ref,
            error_class: 0,
            error_code: 0,
            params: params.into(),
            data: data.into(),
        }
    }

    /// Create an acknowledgement carrying data
    pub fn ack_data(pdu_ref: u16, params: impl Into<Bytes>, data: impl Into<Bytes>) -> Self {
        Self {
            message_type: MessageType::AckData,
            ..Self::job(pdu_ref, params, data)
        }
    }

    /// Acknowledgement rejecting the job in the header
    pub fn error_ack(pdu_ref: u16, function: Function, class: u8, code: u8) -> Self {
        Self {
            error_class: class,
            error_code: code,
            ..Self::ack_data(pdu_ref, vec![u8::from(function), 0], Bytes::new())
        }
    }

    /// Setup communication job negotiating the PDU size
    pub fn setup_communication(pdu_ref: u16, pdu_size: u16) -> Self {
        Self::job(pdu_ref, setup_params(pdu_size), Bytes::new())
    }

    /// Reply to a setup communication job
    pub fn setup_ack(pdu_ref: u16, pdu_size: u16) -> Self {
        Self::ack_data(pdu_ref, setup_params(pdu_size), Bytes::new())
    }

    /// Read one byte-range item
    pub fn read_var(pdu_ref: u16, item: &ItemAddress) -> Self {
        let mut params = BytesMut::with_capacity(2 + s7::ITEM_SIZE);
        params.put_u8(Function::ReadVar.into());
        params.put_u8(1);
        item.encode(&mut params);
        Self::job(pdu_ref, params.freeze(), Bytes::new())
    }

    /// Reply to a read job; `value` is ignored unless `code` is success
    pub fn read_ack(pdu_ref: u16, code: ReturnCode, value: &[u8]) -> Self {
        let mut data = BytesMut::with_capacity(4 + value.len());
        data.put_u8(code.into());
        if code.is_success() {
            data.put_u8(s7::DATA_TS_BYTE_WORD_DWORD);
            data.put_u16((value.len() * 8) as u16);
            data.put_slice(value);
        } else {
            data.put_u8(0);
            data.put_u16(0);
        }
        Self::ack_data(pdu_ref, vec![u8::from(Function::ReadVar), 1], data.freeze())
    }

    /// Write one byte-range item
    pub fn write_var(pdu_ref: u16, item: &ItemAddress, value: &[u8]) -> Self {
        let mut params = BytesMut::with_capacity(2 + s7::ITEM_SIZE);
        params.put_u8(Function::WriteVar.into());
        params.put_u8(1);
        item.encode(&mut params);

        let mut data = BytesMut::with_capacity(4 + value.len());
        data.put_u8(0x00);
        data.put_u8(s7::DATA_TS_BYTE_WORD_DWORD);
        data.put_u16((value.len() * 8) as u16);
        data.put_slice(value);

        Self::job(pdu_ref, params.freeze(), data.freeze())
    }

    /// Reply to a write job
    pub fn write_ack(pdu_ref: u16, code: ReturnCode) -> Self {
        Self::ack_data(pdu_ref, vec![u8::from(Function::WriteVar), 1], vec![u8::from(code)])
    }

    /// Largest read payload that fits a PDU of the given size
    pub fn max_read_payload(pdu_size: u16) -> usize {
        (pdu_size as usize).saturating_sub(s7::READ_OVERHEAD)
    }

    /// Largest write payload that fits a PDU of the given size
    pub fn max_write_payload(pdu_size: u16) -> usize {
        (pdu_size as usize).saturating_sub(s7::WRITE_OVERHEAD)
    }

    /// Encode S7 PDU to bytes (without TPKT/COTP)
    pub fn encode(&self) -> BytesMut {
        let header_size = self.message_type.header_size();
        let mut buf = BytesMut::with_capacity(header_size + self.params.len() + self.data.len());

        buf.put_u8(s7::PROTOCOL_ID);
        buf.put_u8(self.message_type as u8);
        buf.put_u16(0);
        buf.put_u16(self.pdu_ref);
        buf.put_u16(self.params.len() as u16);
        buf.put_u16(self.data.len() as u16);
        if self.message_type.has_error_field() {
            buf.put_u8(self.error_class);
            buf.put_u8(self.error_code);
        }
        buf.put_slice(&self.params);
        buf.put_slice(&self.data);

        buf
    }

    /// Encode into a complete TPKT/COTP DT frame
    pub fn into_frame(&self) -> BytesMut {
        Cotp::Data(self.encode().freeze()).encode()
    }

    /// Decode S7 PDU from the payload of a COTP DT unit
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - Buffer is shorter than the header
    /// - Protocol id is not 0x32
    /// - Announced parameter/data lengths exceed the buffer
    pub fn decode(mut buf: Bytes) -> Result<Self> {
        if buf.len() < 10 {
            return Err(Error::PacketTooShort {
                expected: 10,
                actual: buf.len(),
            });
        }

        let protocol_id = buf.get_u8();
        if protocol_id != s7::PROTOCOL_ID {
            return Err(Error::MalformedResponse(format!(
                "protocol id 0x{:02X}",
                protocol_id
            )));
        }
        let message_type = MessageType::try_from(buf.get_u8())?;
        buf.advance(2);
        let pdu_ref = buf.get_u16();
        let param_len = buf.get_u16() as usize;
        let data_len = buf.get_u16() as usize;

        let (error_class, error_code) = if message_type.has_error_field() {
            if buf.len() < 2 {
                return Err(Error::PacketTooShort {
                    expected: 12,
                    actual: 10 + buf.len(),
                });
            }
            (buf.get_u8(), buf.get_u8())
        } else {
            (0, 0)
        };

        if buf.len() < param_len + data_len {
            return Err(Error::PacketTooShort {
                expected: message_type.header_size() + param_len + data_len,
                actual: message_type.header_size() + buf.len(),
            });
        }

        let params = buf.split_to(param_len);
        let data = buf.split_to(data_len);

        Ok(Self {
            message_type,
            pdu_ref,
            error_class,
            error_code,
            params,
            data,
        })
    }

    /// Function code of this job or reply
    pub fn function(&self) -> Result<Function> {
        let code = *self
            .params
            .first()
            .ok_or_else(|| Error::MalformedResponse("missing parameter block".into()))?;
        Function::try_from(code)
    }

    /// Fail if the PLC rejected the job in the header
    pub fn check_header(&self) -> Result<()> {
        if self.error_class != 0 || self.error_code != 0 {
            return Err(Error::HeaderError {
                class: self.error_class,
                code: self.error_code,
            });
        }
        Ok(())
    }

    /// PDU size carried by a setup communication job or reply
    pub fn negotiated_pdu_size(&self) -> Result<u16> {
        self.check_header()?;
        self.expect_function(Function::SetupCommunication)?;
        if self.params.len() < 8 {
            return Err(Error::MalformedResponse("setup parameters too short".into()));
        }
        Ok(u16::from_be_bytes([self.params[6], self.params[7]]))
    }

    /// Bytes returned by a read acknowledgement
    pub fn read_data(&self) -> Result<Bytes> {
        self.check_header()?;
        self.expect_function(Function::ReadVar)?;

        let mut data = self.data.clone();
        if data.is_empty() {
            return Err(Error::MalformedResponse("read reply without data".into()));
        }
        let code = ReturnCode::from(data.get_u8());
        if !code.is_success() {
            return Err(Error::ItemFailed(code));
        }
        if data.len() < 3 {
            return Err(Error::PacketTooShort {
                expected: 4,
                actual: 1 + data.len(),
            });
        }
        let transport_size = data.get_u8();
        let raw_len = data.get_u16() as usize;
        let len = match transport_size {
            s7::DATA_TS_BIT | s7::DATA_TS_OCTET_STRING | s7::DATA_TS_REAL => raw_len,
            _ => raw_len.div_ceil(8),
        };
        if data.len() < len {
            return Err(Error::PacketTooShort {
                expected: 4 + len,
                actual: 4 + data.len(),
            });
        }
        Ok(data.split_to(len))
    }

    /// Outcome of a write acknowledgement
    pub fn write_result(&self) -> Result<()> {
        self.check_header()?;
        self.expect_function(Function::WriteVar)?;
        let code = ReturnCode::from(
            *self
                .data
                .first()
                .ok_or_else(|| Error::MalformedResponse("write reply without data".into()))?,
        );
        if code.is_success() {
            Ok(())
        } else {
            Err(Error::ItemFailed(code))
        }
    }

    /// Item and payload of a read/write job (the PLC side of the exchange)
    pub fn item_request(&self) -> Result<(Function, ItemAddress, Bytes)> {
        let function = self.function()?;
        if !matches!(function, Function::ReadVar | Function::WriteVar) {
            return Err(Error::MalformedResponse(format!("{} is not an item job", function)));
        }
        let mut params = self.params.slice(1..);
        if params.is_empty() || params.get_u8() != 1 {
            return Err(Error::MalformedResponse("only single-item jobs are supported".into()));
        }
        let item = ItemAddress::decode(&mut params)?;
        if item.byte > MAX_BYTE_OFFSET {
            return Err(Error::MalformedResponse("item address out of range".into()));
        }

        let value = if function == Function::WriteVar {
            let mut data = self.data.clone();
            if data.len() < 4 {
                return Err(Error::PacketTooShort {
                    expected: 4,
                    actual: data.len(),
                });
            }
            data.advance(1);
            let transport_size = data.get_u8();
            let raw_len = data.get_u16() as usize;
            let len = match transport_size {
                s7::DATA_TS_BIT | s7::DATA_TS_OCTET_STRING => raw_len,
                _ => raw_len.div_ceil(8),
            };
            if data.len() < len {
                return Err(Error::PacketTooShort {
                    expected: 4 + len,
                    actual: 4 + data.len(),
                });
            }
            data.split_to(len)
        } else {
            Bytes::new()
        };

        Ok((function, item, value))
    }

    fn expect_function(&self, expected: Function) -> Result<()> {
        let actual = self.function()?;
        if actual != expected {
            return Err(Error::MalformedResponse(format!(
                "expected {} reply, got {}",
                expected, actual
            )));
        }
        Ok(())
    }

    /// Get total PDU size
    pub fn size(&self) -> usize {
        self.message_type.header_size() + self.params.len() + self.data.len()
    }
}

fn setup_params(pdu_size: u16) -> Bytes {
    let mut params = BytesMut::with_capacity(8);
    params.put_u8(Function::SetupCommunication.into());
    params.put_u8(0);
    params.put_u16(1); // max AmQ calling
    params.put_u16(1); // max AmQ called
    params.put_u16(pdu_size);
    params.freeze()
}

impl fmt::Debug for Packet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Packet")
            .field("message_type", &self.message_type)
            .field("pdu_ref", &self.pdu_ref)
            .field("error", &format!("0x{:02X}{:02X}", self.error_class, self.error_code))
            .field("params", &hex::encode_upper(&self.params))
            .field("data_len", &self.data.len())
            .finish()
    }
}

impl fmt::Display for Packet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let function = self
            .function()
            .map(|function| function.name())
            .unwrap_or("UNKNOWN");
        write!(
            f,
            "S7[{:?} {}](ref={}, params={}, data={})",
            self.message_type,
            function,
            self.pdu_ref,
            self.params.len(),
            self.data.len()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::address::parse;
    use pretty_assertions::assert_eq;

    fn data_payload(frame: BytesMut) -> Bytes {
        match Cotp::decode(frame).unwrap() {
            Cotp::Data(payload) => payload,
            other => panic!("expected DT, got {:?}", other),
        }
    }

    #[test]
    fn test_connect_request_layout() {
        let frame = Cotp::ConnectRequest(ConnectParams::new(0x0100, 0x0301)).encode();

        assert_eq!(
            frame.as_ref(),
            &[
                0x03, 0x00, 0x00, 0x16, // TPKT, 22 bytes
                0x11, 0xE0, 0x00, 0x00, 0x00, 0x01, 0x00, // COTP CR
                0xC0, 0x01, 0x0A, // TPDU size
                0xC1, 0x02, 0x01, 0x00, // calling TSAP
                0xC2, 0x02, 0x03, 0x01, // called TSAP
            ][..]
        );
    }

    #[test]
    fn test_connect_confirm_decode() {
        let params = ConnectParams::new(0x0100, 0x0302);
        let decoded = Cotp::decode(Cotp::ConnectConfirm(params).encode()).unwrap();
        assert_eq!(decoded, Cotp::ConnectConfirm(params));
    }

    #[test]
    fn test_disconnect_request_decode() {
        let decoded = Cotp::decode(Cotp::DisconnectRequest { reason: 0x81 }.encode()).unwrap();
        assert_eq!(decoded, Cotp::DisconnectRequest { reason: 0x81 });
    }

    #[test]
    fn test_tpkt_validation() {
        assert!(matches!(tpkt_length(&[0x03, 0x00]), Err(Error::PacketTooShort { .. })));
        assert!(matches!(tpkt_length(&[0x04, 0x00, 0x00, 0x16]), Err(Error::MalformedResponse(_))));
        assert!(matches!(tpkt_length(&[0x03, 0x00, 0x00, 0x02]), Err(Error::MalformedResponse(_))));
        assert_eq!(tpkt_length(&[0x03, 0x00, 0x00, 0x16]).unwrap(), 22);
    }

    #[test]
    fn test_truncated_frame() {
        let mut frame = Packet::setup_communication(1, 480).into_frame();
        frame.truncate(frame.len() - 3);
        assert!(matches!(Cotp::decode(frame), Err(Error::PacketTooShort { .. })));
    }

    #[test]
    fn test_read_var_layout() {
        let coord = parse("DB2.DBW4").unwrap();
        let packet = Packet::read_var(0x0102, &ItemAddress::for_coordinate(&coord, 2));

        assert_eq!(
            packet.encode().as_ref(),
            &[
                0x32, 0x01, 0x00, 0x00, 0x01, 0x02, 0x00, 0x0E, 0x00, 0x00, // header
                0x04, 0x01, // read var, one item
                0x12, 0x0A, 0x10, 0x02, 0x00, 0x02, 0x00, 0x02, 0x84, 0x00, 0x00, 0x20,
            ][..]
        );
    }

    #[test]
    fn test_setup_negotiation() {
        let job = Packet::decode(data_payload(Packet::setup_communication(3, 480).into_frame())).unwrap();
        assert_eq!(job.message_type, MessageType::Job);
        assert_eq!(job.negotiated_pdu_size().unwrap(), 480);

        let ack = Packet::decode(data_payload(Packet::setup_ack(3, 240).into_frame())).unwrap();
        assert_eq!(ack.pdu_ref, 3);
        assert_eq!(ack.negotiated_pdu_size().unwrap(), 240);
    }

    #[test]
    fn test_read_ack_data() {
        let ack = Packet::decode(Packet::read_ack(9, ReturnCode::Success, &[0x3F, 0x80, 0x00, 0x00]).encode().freeze()).unwrap();
        assert_eq!(ack.read_data().unwrap().as_ref(), &[0x3F, 0x80, 0x00, 0x00]);
    }

    #[test]
    fn test_read_ack_item_failure() {
        let ack = Packet::decode(Packet::read_ack(9, ReturnCode::ObjectDoesNotExist, &[]).encode().freeze()).unwrap();
        assert!(matches!(ack.read_data(), Err(Error::ItemFailed(ReturnCode::ObjectDoesNotExist))));
    }

    #[test]
    fn test_header_error() {
        let ack = Packet::decode(Packet::error_ack(4, Function::ReadVar, 0x87, 0x04).encode().freeze()).unwrap();
        let err = ack.read_data().unwrap_err();
        assert!(matches!(err, Error::HeaderError { class: 0x87, code: 0x04 }));
        assert!(err.is_access_denied());
    }

    #[test]
    fn test_write_job_item_request() {
        let coord = parse("M10.3").unwrap();
        let item = ItemAddress::for_coordinate(&coord, 1);
        let job = Packet::decode(Packet::write_var(5, &item, &[0x08]).encode().freeze()).unwrap();

        let (function, decoded, value) = job.item_request().unwrap();
        assert_eq!(function, Function::WriteVar);
        assert_eq!(decoded, item);
        assert_eq!(value.as_ref(), &[0x08]);
    }

    #[test]
    fn test_write_ack_result() {
        let ok = Packet::decode(Packet::write_ack(1, ReturnCode::Success).encode().freeze()).unwrap();
        assert!(ok.write_result().is_ok());

        let denied = Packet::decode(Packet::write_ack(1, ReturnCode::AccessDenied).encode().freeze()).unwrap();
        assert!(matches!(denied.write_result(), Err(Error::ItemFailed(ReturnCode::AccessDenied))));
    }

    #[test]
    fn test_reply_function_mismatch() {
        let ack = Packet::decode(Packet::write_ack(1, ReturnCode::Success).encode().freeze()).unwrap();
        assert!(matches!(ack.read_data(), Err(Error::MalformedResponse(_))));
    }

    #[test]
    fn test_bad_protocol_id() {
        let mut raw = Packet::setup_communication(1, 480).encode();
        raw[0] = 0x72;
        assert!(matches!(Packet::decode(raw.freeze()), Err(Error::MalformedResponse(_))));
    }

    #[test]
    fn test_payload_limits() {
        assert_eq!(Packet::max_read_payload(480), 462);
        assert_eq!(Packet::max_write_payload(480), 452);
        assert_eq!(Packet::max_read_payload(10), 0);
    }
}
