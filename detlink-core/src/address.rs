//! Symbolic PLC address resolution
//!
//! Accepted syntax (case-insensitive, surrounding whitespace ignored):
//!
//! ```text
//! DB<n>.DBX<byte>.<bit>   bit in data block n
//! DB<n>.DBB<byte>         byte in data block n
//! DB<n>.DBW<byte>         word (2 bytes) in data block n
//! DB<n>.DBD<byte>         double word (4 bytes) in data block n
//! I<byte>[.<bit>]         input bit
//! Q<byte>[.<bit>]         output bit
//! M<byte>[.<bit>]         memory (merker) bit
//! ```
//!
//! # Examples
//!
//! ```
//! use detlink_core::address::{parse, Area, Width};
//!
//! let coord = parse("DB1.DBX0.3").unwrap();
//! assert_eq!(coord.area, Area::DataBlock);
//! assert_eq!(coord.block, Some(1));
//! assert_eq!(coord.bit, Some(3));
//! assert_eq!(coord.width, Width::Bit);
//! ```

use std::fmt;
use std::str::FromStr;

use crate::constants::{area, MAX_BYTE_OFFSET};
use crate::error::{Error, Result};

/// Named address space of the PLC
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum Area {
    DataBlock,
    Input,
    Output,
    Memory,
}

impl Area {
    /// Area code used in the S7 item address
    pub fn code(self) -> u8 {
        match self {
            Self::DataBlock => area::DATA_BLOCK,
            Self::Input => area::INPUT,
            Self::Output => area::OUTPUT,
            Self::Memory => area::MEMORY,
        }
    }

    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            area::DATA_BLOCK => Some(Self::DataBlock),
            area::INPUT => Some(Self::Input),
            area::OUTPUT => Some(Self::Output),
            area::MEMORY => Some(Self::Memory),
            _ => None,
        }
    }
}

/// Access width implied by the address
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum Width {
    Bit,
    Byte,
    Word,
    DWord,
}

impl Width {
    /// Number of bytes a read of this width covers
    pub fn bytes(self) -> usize {
        match self {
            Self::Bit | Self::Byte => 1,
            Self::Word => 2,
            Self::DWord => 4,
        }
    }
}

/// Resolved protocol coordinate
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct Coordinate {
    pub area: Area,
    /// Data block number, only set for [`Area::DataBlock`]
    pub block: Option<u16>,
    pub byte: u32,
    /// Bit offset 0..=7, set for bit addresses
    pub bit: Option<u8>,
    pub width: Width,
}

impl Coordinate {
    /// Block number as sent on the wire (0 outside data blocks)
    pub fn db_number(&self) -> u16 {
        self.block.unwrap_or(0)
    }

    /// Bit offset, 0 when the address has none
    pub fn bit_offset(&self) -> u8 {
        self.bit.unwrap_or(0)
    }
}

impl fmt::Display for Coordinate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.area {
            Area::DataBlock => {
                let db = self.db_number();
                match self.width {
                    Width::Bit => write!(f, "DB{}.DBX{}.{}", db, self.byte, self.bit_offset()),
                    Width::Byte => write!(f, "DB{}.DBB{}", db, self.byte),
                    Width::Word => write!(f, "DB{}.DBW{}", db, self.byte),
                    Width::DWord => write!(f, "DB{}.DBD{}", db, self.byte),
                }
            }
            Area::Input => write!(f, "I{}.{}", self.byte, self.bit_offset()),
            Area::Output => write!(f, "Q{}.{}", self.byte, self.bit_offset()),
            Area::Memory => write!(f, "M{}.{}", self.byte, self.bit_offset()),
        }
    }
}

impl FromStr for Coordinate {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        parse(s)
    }
}

/// Resolve a symbolic address to exactly one coordinate
pub fn parse(address: &str) -> Result<Coordinate> {
    let normalized = address.trim().to_ascii_uppercase();

    if normalized.is_empty() {
        return Err(Error::parse(address, "", "empty address"));
    }

    if normalized.starts_with("DB") {
        return parse_data_block(address, &normalized);
    }

    let prefix_len = normalized
        .find(|c: char| !c.is_ascii_alphabetic())
        .unwrap_or(normalized.len());
    let (prefix, rest) = normalized.split_at(prefix_len);

    let area = match prefix {
        "I" => Area::Input,
        "Q" => Area::Output,
        "M" => Area::Memory,
        _ => return Err(Error::parse(address, prefix, "unrecognized area prefix")),
    };

    let mut segments = rest.split('.');
    let byte = byte_offset(address, segments.next().unwrap_or(""))?;
    let bit = match segments.next() {
        Some(token) => bit_offset(address, token)?,
        None => 0,
    };
    if let Some(extra) = segments.next() {
        return Err(Error::parse(address, extra, "unexpected trailing segment"));
    }

    Ok(Coordinate {
        area,
        block: None,
        byte,
        bit: Some(bit),
        width: Width::Bit,
    })
}

fn parse_data_block(address: &str, normalized: &str) -> Result<Coordinate> {
    let segments: Vec<&str> = normalized.split('.').collect();

    let block_token = &segments[0][2..];
    let block = number::<u16>(address, block_token, "data block number is not numeric")?;

    let Some(access) = segments.get(1) else {
        return Err(Error::parse(address, segments[0], "missing DBX/DBB/DBW/DBD segment"));
    };

    let (width, offset_token) = if let Some(rest) = access.strip_prefix("DBX") {
        (Width::Bit, rest)
    } else if let Some(rest) = access.strip_prefix("DBB") {
        (Width::Byte, rest)
    } else if let Some(rest) = access.strip_prefix("DBW") {
        (Width::Word, rest)
    } else if let Some(rest) = access.strip_prefix("DBD") {
        (Width::DWord, rest)
    } else {
        return Err(Error::parse(address, access, "unrecognized data block access"));
    };

    let byte = byte_offset(address, offset_token)?;

    let bit = match (width, segments.get(2)) {
        (Width::Bit, Some(token)) => Some(bit_offset(address, token)?),
        (Width::Bit, None) => {
            return Err(Error::parse(address, access, "missing bit offset"));
        }
        (_, Some(token)) => {
            return Err(Error::parse(address, token, "bit offset not allowed here"));
        }
        (_, None) => None,
    };

    if let Some(extra) = segments.get(3) {
        return Err(Error::parse(address, extra, "unexpected trailing segment"));
    }

    Ok(Coordinate {
        area: Area::DataBlock,
        block: Some(block),
        byte,
        bit,
        width,
    })
}

fn byte_offset(address: &str, token: &str) -> Result<u32> {
    let byte = number::<u32>(address, token, "byte offset is not numeric")?;
    if byte > MAX_BYTE_OFFSET {
        return Err(Error::parse(address, token, "byte offset out of range"));
    }
    Ok(byte)
}

fn bit_offset(address: &str, token: &str) -> Result<u8> {
    let bit = number::<u8>(address, token, "bit offset is not numeric")?;
    if bit > 7 {
        return Err(Error::parse(address, token, "bit offset must be 0..=7"));
    }
    Ok(bit)
}

fn number<T: FromStr>(address: &str, token: &str, reason: &'static str) -> Result<T> {
    if token.is_empty() || !token.bytes().all(|b| b.is_ascii_digit()) {
        return Err(Error::parse(address, token, reason));
    }
    token
        .parse()
        .map_err(|_| Error::parse(address, token, "number out of range"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;

    #[test]
    fn test_parse_db_bit() {
        let coord = parse("DB1.DBX0.3").unwrap();
        assert_eq!(
            coord,
            Coordinate {
                area: Area::DataBlock,
                block: Some(1),
                byte: 0,
                bit: Some(3),
                width: Width::Bit,
            }
        );
    }

    #[test]
    fn test_parse_db_widths() {
        let word = parse("DB2.DBW4").unwrap();
        assert_eq!(word.block, Some(2));
        assert_eq!(word.byte, 4);
        assert_eq!(word.width.bytes(), 2);
        assert_eq!(word.bit, None);

        assert_eq!(parse("DB3.DBB10").unwrap().width, Width::Byte);
        assert_eq!(parse("DB3.DBD12").unwrap().width, Width::DWord);
    }

    #[test]
    fn test_parse_io_memory() {
        let input = parse("I0.7").unwrap();
        assert_eq!(input.area, Area::Input);
        assert_eq!(input.byte, 0);
        assert_eq!(input.bit, Some(7));
        assert_eq!(input.block, None);

        assert_eq!(parse("Q4.1").unwrap().area, Area::Output);
        assert_eq!(parse("M10.0").unwrap().area, Area::Memory);
    }

    #[test]
    fn test_bit_suffix_defaults_to_zero() {
        assert_eq!(parse("M5").unwrap(), parse("M5.0").unwrap());
    }

    #[test]
    fn test_case_and_whitespace() {
        assert_eq!(parse("  db1.dbx0.3 ").unwrap(), parse("DB1.DBX0.3").unwrap());
        assert_eq!(parse("q2.5").unwrap(), parse("Q2.5").unwrap());
    }

    #[test]
    fn test_leading_zeros_are_same_address() {
        assert_eq!(parse("DB01.DBW004").unwrap(), parse("DB1.DBW4").unwrap());
    }

    #[test]
    fn test_unrecognized_prefix() {
        match parse("XY9") {
            Err(Error::Parse { token, .. }) => assert_eq!(token, "XY"),
            other => panic!("expected parse error, got {:?}", other),
        }
    }

    #[test]
    fn test_non_numeric_tokens() {
        let cases = [
            ("DBA.DBX0.0", "A"),
            ("DB1.DBXB.0", "B"),
            ("DB1.DBX0.X", "X"),
            ("I1.Z", "Z"),
            ("M-1", "-1"),
        ];

        for (address, expected) in cases {
            match parse(address) {
                Err(Error::Parse { token, .. }) => assert_eq!(token, expected, "{}", address),
                other => panic!("{}: expected parse error, got {:?}", address, other),
            }
        }
    }

    #[test]
    fn test_missing_segments() {
        assert!(parse("DB1").is_err());
        assert!(parse("DB1.DBX0").is_err());
        assert!(parse("DB1.DBW").is_err());
        assert!(parse("I").is_err());
        assert!(parse("").is_err());
        assert!(parse("   ").is_err());
    }

    #[test]
    fn test_out_of_range() {
        assert!(parse("DB1.DBX0.8").is_err());
        assert!(parse("I0.9").is_err());
        assert!(parse("DB70000.DBB0").is_err());
        assert!(parse("M3000000").is_err());
    }

    #[test]
    fn test_trailing_segments_rejected() {
        assert!(parse("DB1.DBW4.1").is_err());
        assert!(parse("DB1.DBX0.1.2").is_err());
        assert!(parse("I0.1.2").is_err());
    }

    #[test]
    fn test_display_round_trip() {
        for address in ["DB1.DBX0.3", "DB2.DBW4", "DB9.DBD100", "DB4.DBB7", "I0.7", "Q1.0", "M3.2"] {
            assert_eq!(parse(address).unwrap().to_string(), address);
        }
    }

    #[test]
    fn test_area_codes() {
        for area in [Area::DataBlock, Area::Input, Area::Output, Area::Memory] {
            assert_eq!(Area::from_code(area.code()), Some(area));
        }
        assert_eq!(Area::from_code(0x1C), None);
    }

    proptest! {
        #[test]
        fn prop_db_bit_addresses_resolve(db in any::<u16>(), byte in 0u32..=MAX_BYTE_OFFSET, bit in 0u8..8) {
            let coord = parse(&format!("DB{}.DBX{}.{}", db, byte, bit)).unwrap();
            prop_assert_eq!(coord.block, Some(db));
            prop_assert_eq!(coord.byte, byte);
            prop_assert_eq!(coord.bit, Some(bit));
        }

        #[test]
        fn prop_case_and_padding_do_not_matter(
            area in prop::sample::select(vec!["i", "q", "m"]),
            byte in 0u32..65536,
            bit in 0u8..8,
            pad in "[ \t]{0,3}",
        ) {
            let lower = format!("{}{}{}.{}{}", pad, area, byte, bit, pad);
            let upper = format!("{}{}.{}", area.to_ascii_uppercase(), byte, bit);
            prop_assert_eq!(parse(&lower).unwrap(), parse(&upper).unwrap());
        }

        #[test]
        fn prop_unknown_prefixes_fail(prefix in "[A-HJ-LN-PR-Z][A-Z]{0,2}", byte in 0u32..1000) {
            prop_assume!(!prefix.starts_with("DB"));
            let address = format!("{}{}", prefix, byte);
            let is_parse_error = matches!(parse(&address), Err(Error::Parse { .. }));
            prop_assert!(is_parse_error);
        }
    }
}
