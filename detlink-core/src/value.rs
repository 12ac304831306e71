//! Typed values on the wire
//!
//! S7 stores multi-byte numbers big-endian. Decoding always goes through
//! [`BigEndian`] so the host byte order never leaks into results.

use byteorder::{BigEndian, ByteOrder};

use crate::error::{Error, Result};

fn ensure_len(bytes: &[u8], expected: usize) -> Result<()> {
    if bytes.len() < expected {
        return Err(Error::PacketTooShort {
            expected,
            actual: bytes.len(),
        });
    }
    Ok(())
}

pub fn decode_u8(bytes: &[u8]) -> Result<u8> {
    ensure_len(bytes, 1)?;
    Ok(bytes[0])
}

pub fn decode_i16(bytes: &[u8]) -> Result<i16> {
    ensure_len(bytes, 2)?;
    Ok(BigEndian::read_i16(bytes))
}

pub fn decode_i32(bytes: &[u8]) -> Result<i32> {
    ensure_len(bytes, 4)?;
    Ok(BigEndian::read_i32(bytes))
}

pub fn decode_f32(bytes: &[u8]) -> Result<f32> {
    ensure_len(bytes, 4)?;
    Ok(BigEndian::read_f32(bytes))
}

pub fn encode_i16(value: i16) -> [u8; 2] {
    let mut buf = [0u8; 2];
    BigEndian::write_i16(&mut buf, value);
    buf
}

pub fn encode_i32(value: i32) -> [u8; 4] {
    let mut buf = [0u8; 4];
    BigEndian::write_i32(&mut buf, value);
    buf
}

pub fn encode_f32(value: f32) -> [u8; 4] {
    let mut buf = [0u8; 4];
    BigEndian::write_f32(&mut buf, value);
    buf
}

/// Extract one bit of a byte
pub fn get_bit(byte: u8, bit: u8) -> bool {
    byte & (1 << (bit & 0x07)) != 0
}

/// Return `byte` with one bit set or cleared
pub fn set_bit(byte: u8, bit: u8, value: bool) -> u8 {
    let mask = 1 << (bit & 0x07);
    if value { byte | mask } else { byte & !mask }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_f32_big_endian() {
        assert_eq!(decode_f32(&[0x3F, 0x80, 0x00, 0x00]).unwrap(), 1.0);
        assert_eq!(decode_f32(&[0xC0, 0x49, 0x0F, 0xDB]).unwrap(), -std::f32::consts::PI);
    }

    #[test]
    fn test_decode_integers() {
        assert_eq!(decode_i16(&[0x01, 0x02]).unwrap(), 0x0102);
        assert_eq!(decode_i16(&[0xFF, 0xFE]).unwrap(), -2);
        assert_eq!(decode_i32(&[0x00, 0x01, 0x00, 0x00]).unwrap(), 65536);
        assert_eq!(decode_u8(&[0xAB]).unwrap(), 0xAB);
    }

    #[test]
    fn test_decode_too_short() {
        assert!(matches!(
            decode_i32(&[0x00, 0x01]),
            Err(Error::PacketTooShort { expected: 4, actual: 2 })
        ));
        assert!(decode_u8(&[]).is_err());
    }

    #[test]
    fn test_encode_is_big_endian() {
        assert_eq!(encode_i16(0x0102), [0x01, 0x02]);
        assert_eq!(encode_i32(-1), [0xFF; 4]);
        assert_eq!(encode_f32(1.0), [0x3F, 0x80, 0x00, 0x00]);
    }

    #[test]
    fn test_bits() {
        assert_eq!(set_bit(0b0000_0000, 3, true), 0b0000_1000);
        assert_eq!(set_bit(0b1111_1111, 0, false), 0b1111_1110);
        assert!(get_bit(0b1000_0000, 7));
        assert!(!get_bit(0b1000_0000, 6));
    }
}
