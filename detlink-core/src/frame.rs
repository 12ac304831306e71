//! Scan line reassembly for serial barcode scanners
//!
//! Scanners deliver an unsegmented byte stream. Two wire conventions coexist
//! across firmware revisions:
//!
//! 1. Plain ASCII text terminated by a carriage return (`ABC123\r`).
//! 2. A space-separated hex dump where the carriage return is the printable
//!    token `0D` (`48 30 30 30 31 0D`).
//!
//! [`FrameAssembler`] owns the per-line buffer and asks an ordered list of
//! [`TerminatorRule`]s where the next frame ends. The first rule that finds a
//! boundary wins, so literal line breaks always take precedence over the hex
//! token. New device quirks are supported by adding a rule, without touching
//! the buffering.
//!
//! # Examples
//!
//! ```
//! use detlink_core::frame::FrameAssembler;
//!
//! let mut assembler = FrameAssembler::new();
//! assert!(assembler.feed(b"ABC").is_empty());
//! assert_eq!(assembler.feed(b"123\r"), vec!["ABC123".to_string()]);
//! ```

use std::fmt;

use tracing::{debug, trace, warn};

use crate::error::{Error, Result};

/// Location of a frame boundary inside the buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Terminator {
    /// First byte of the terminator; the frame is everything before it
    pub start: usize,

    /// One past the last byte of the terminator (`end > start`)
    pub end: usize,

    /// Frame was closed by a hex token, so its content is a hex dump
    pub hex: bool,
}

/// Strategy that locates the next frame boundary
pub trait TerminatorRule: Send + Sync + fmt::Debug {
    fn name(&self) -> &'static str;

    fn find(&self, buffer: &str) -> Option<Terminator>;
}

/// Literal CR or LF character
#[derive(Debug, Default, Clone, Copy)]
pub struct LineBreak;

impl TerminatorRule for LineBreak {
    fn name(&self) -> &'static str {
        "line-break"
    }

    fn find(&self, buffer: &str) -> Option<Terminator> {
        buffer.find(['\r', '\n']).map(|start| Terminator {
            start,
            end: start + 1,
            hex: false,
        })
    }
}

/// Printable `0D` token bounded by spaces or the buffer edges
///
/// A directly following ` 0A` token belongs to the same terminator.
#[derive(Debug, Default, Clone, Copy)]
pub struct HexCarriageReturn;

impl HexCarriageReturn {
    const TOKEN: &'static str = "0D";
    const LINE_FEED: &'static str = " 0A";
}

fn bounded(bytes: &[u8], start: usize, end: usize) -> bool {
    let left = start == 0 || bytes[start - 1] == b' ';
    let right = end == bytes.len() || bytes[end] == b' ';
    left && right
}

impl TerminatorRule for HexCarriageReturn {
    fn name(&self) -> &'static str {
        "hex-cr-token"
    }

    fn find(&self, buffer: &str) -> Option<Terminator> {
        let bytes = buffer.as_bytes();
        let mut from = 0;

        while let Some(pos) = buffer[from..].find(Self::TOKEN) {
            let start = from + pos;
            let mut end = start + Self::TOKEN.len();

            if bounded(bytes, start, end) {
                if buffer[end..].starts_with(Self::LINE_FEED)
                    && bounded(bytes, end + 1, end + Self::LINE_FEED.len())
                {
                    end += Self::LINE_FEED.len();
                }
                return Some(Terminator { start, end, hex: true });
            }

            from = start + 1;
        }

        None
    }
}

/// Rules used by [`FrameAssembler::new`], in priority order
pub fn default_rules() -> Vec<Box<dyn TerminatorRule>> {
    vec![Box::new(LineBreak), Box::new(HexCarriageReturn)]
}

/// Per-line receive buffer and frame splitter
pub struct FrameAssembler {
    buffer: String,
    rules: Vec<Box<dyn TerminatorRule>>,
}

impl FrameAssembler {
    /// Assembler with the literal line-break and hex `0D` rules
    pub fn new() -> Self {
        Self::with_rules(default_rules())
    }

    /// Assembler with a custom, ordered rule set
    pub fn with_rules(rules: Vec<Box<dyn TerminatorRule>>) -> Self {
        Self {
            buffer: String::new(),
            rules,
        }
    }

    /// Append a rule with the lowest priority
    pub fn push_rule(&mut self, rule: impl TerminatorRule + 'static) {
        self.rules.push(Box::new(rule));
    }

    /// Text received but not yet part of a complete frame
    pub fn buffered(&self) -> &str {
        &self.buffer
    }

    /// Drop everything buffered
    pub fn clear(&mut self) {
        self.buffer.clear();
    }

    /// Ingest newly received bytes and return every completed payload
    ///
    /// Bytes are decoded as ASCII (anything above 0x7F becomes `?`). Empty
    /// payloads are swallowed. Text after the last boundary stays buffered.
    pub fn feed(&mut self, bytes: &[u8]) -> Vec<String> {
        self.buffer
            .extend(bytes.iter().map(|&b| if b.is_ascii() { b as char } else { '?' }));

        trace!("Buffered {} chars: {:?}", self.buffer.len(), self.buffer);

        let mut payloads = Vec::new();

        while let Some((rule, terminator)) = self.next_terminator() {
            let segment = self.buffer[..terminator.start].trim().to_string();

            let mut consumed = terminator.end.max(terminator.start + 1);
            if self.buffer[consumed..].starts_with('\n') {
                consumed += 1;
            }
            self.buffer.drain(..consumed);

            let payload = match decode_payload(&segment, terminator.hex) {
                Ok(payload) => payload,
                Err(e) => {
                    warn!("{}; using raw text", e);
                    trim_line_end(&segment).to_string()
                }
            };

            if payload.is_empty() {
                trace!("Dropped empty frame ({})", rule);
                continue;
            }

            debug!("Frame complete via {}: {:?}", rule, payload);
            payloads.push(payload);
        }

        payloads
    }

    fn next_terminator(&self) -> Option<(&'static str, Terminator)> {
        self.rules
            .iter()
            .find_map(|rule| rule.find(&self.buffer).map(|t| (rule.name(), t)))
    }
}

impl Default for FrameAssembler {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for FrameAssembler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FrameAssembler")
            .field("buffered", &self.buffer.len())
            .field("rules", &self.rules.iter().map(|r| r.name()).collect::<Vec<_>>())
            .finish()
    }
}

fn trim_line_end(text: &str) -> &str {
    text.trim_end_matches(['\r', '\n', '\0'])
}

/// Does the text look like a space-separated hex dump
///
/// A single pair only counts when the frame was closed by a hex token;
/// otherwise two or more pairs are required.
pub fn is_hex_stream(text: &str, hex_terminated: bool) -> bool {
    let mut pairs = 0;
    for token in text.split_whitespace() {
        if token.len() != 2 || !token.bytes().all(|b| b.is_ascii_hexdigit()) {
            return false;
        }
        pairs += 1;
    }
    pairs >= 2 || (pairs == 1 && hex_terminated)
}

/// Turn one trimmed frame into its payload text
///
/// Hex dumps are converted pair by pair with `0D`/`0A` pairs dropped; plain
/// text is taken as-is minus trailing CR/LF/NUL.
///
/// # Errors
///
/// Returns [`Error::Decode`] when a hex dump decodes to non-printable bytes.
pub fn decode_payload(segment: &str, hex_terminated: bool) -> Result<String> {
    if !is_hex_stream(segment, hex_terminated) {
        return Ok(trim_line_end(segment).to_string());
    }

    let digits: String = segment
        .split_whitespace()
        .filter(|pair| !pair.eq_ignore_ascii_case("0D") && !pair.eq_ignore_ascii_case("0A"))
        .collect();

    let mut bytes = hex::decode(&digits).map_err(|e| Error::Decode(e.to_string()))?;
    while bytes.last() == Some(&0) {
        bytes.pop();
    }

    if let Some(bad) = bytes
        .iter()
        .find(|&&b| b != b'\t' && !(0x20..0x7F).contains(&b))
    {
        return Err(Error::Decode(format!(
            "non-printable byte 0x{:02X} in hex payload {:?}",
            bad, segment
        )));
    }

    Ok(bytes.into_iter().map(char::from).collect())
}
