//! Protocol constants

/// ISO-on-TCP port of S7 PLCs
pub const ISO_TCP_PORT: u16 = 102;

/// Default read/write timeout (milliseconds)
pub const DEFAULT_TIMEOUT_MS: u64 = 5000;

/// PDU size requested during setup communication
pub const REQUESTED_PDU_SIZE: u16 = 480;

/// Smallest PDU size any S7 CPU negotiates
pub const MIN_PDU_SIZE: u16 = 240;

/// Highest addressable byte (bit address is 24 bits wide)
pub const MAX_BYTE_OFFSET: u32 = 0x1F_FFFF;

/// RFC 1006 framing
pub mod tpkt {
    pub const VERSION: u8 = 0x03;
    pub const HEADER_SIZE: usize = 4;
}

/// ISO 8073 connection-oriented transport
pub mod cotp {
    /// Connection request
    pub const CR: u8 = 0xE0;
    /// Connection confirm
    pub const CC: u8 = 0xD0;
    /// Disconnect request
    pub const DR: u8 = 0x80;
    /// Data transfer
    pub const DT: u8 = 0xF0;

    /// Last data unit flag of DT
    pub const EOT: u8 = 0x80;

    pub const PARAM_TPDU_SIZE: u8 = 0xC0;
    pub const PARAM_CALLING_TSAP: u8 = 0xC1;
    pub const PARAM_CALLED_TSAP: u8 = 0xC2;

    /// 2^10 = 1024 byte TPDUs
    pub const TPDU_SIZE_1024: u8 = 0x0A;

    /// Source reference we announce in CR
    pub const LOCAL_REFERENCE: u16 = 0x0001;
}

/// S7 header and item constants
pub mod s7 {
    pub const PROTOCOL_ID: u8 = 0x32;

    /// Variable specification of an item
    pub const ITEM_SPEC: u8 = 0x12;
    /// Length of the item address that follows
    pub const ITEM_LENGTH: u8 = 0x0A;
    /// S7-ANY syntax id
    pub const SYNTAX_ANY: u8 = 0x10;

    /// Item size of one addressed request item
    pub const ITEM_SIZE: usize = 12;

    /// Request transport sizes
    pub const TS_BIT: u8 = 0x01;
    pub const TS_BYTE: u8 = 0x02;

    /// Data transport sizes of the data section
    pub const DATA_TS_BIT: u8 = 0x03;
    pub const DATA_TS_BYTE_WORD_DWORD: u8 = 0x04;
    pub const DATA_TS_INTEGER: u8 = 0x05;
    pub const DATA_TS_REAL: u8 = 0x07;
    pub const DATA_TS_OCTET_STRING: u8 = 0x09;

    /// Overhead of a read ack around the returned bytes
    pub const READ_OVERHEAD: usize = 18;
    /// Overhead of a write job around the written bytes
    pub const WRITE_OVERHEAD: usize = 28;
}

/// Area codes of the S7 item address
pub mod area {
    pub const INPUT: u8 = 0x81;
    pub const OUTPUT: u8 = 0x82;
    pub const MEMORY: u8 = 0x83;
    pub const DATA_BLOCK: u8 = 0x84;
}

/// Transport service access points
pub mod tsap {
    pub const PG: u16 = 0x0100;
    pub const S7_200_LOCAL: u16 = 0x1000;
    pub const S7_200_REMOTE: u16 = 0x1001;
    pub const S7_200_SMART_LOCAL: u16 = 0x1000;
    pub const S7_200_SMART_REMOTE: u16 = 0x0301;
    pub const LOGO_LOCAL: u16 = 0x0100;
    pub const LOGO_REMOTE: u16 = 0x0200;
    /// High byte of rack/slot addressed remote TSAPs
    pub const RACK_SLOT_BASE: u16 = 0x0300;

    pub const MAX_RACK: u8 = 7;
    pub const MAX_SLOT: u8 = 31;
}
