// pipemux: child process output multiplexer
//
// SPDX-FileCopyrightText: 2026 Romeo Ahmed
// SPDX-License-Identifier: GPL-3.0-or-later

//! Decoding of child process output into UTF-8 lines.
//!
//! ```text
//! raw pipe bytes --add()--> EncodedBuffer --next_line(finished)--> String
//!                           CP1252 / IBM866 / UTF-16LE / UTF-8
//! ```
//!
//! Uses `encoding_rs`. Invalid sequences → U+FFFD.

use encoding_rs::{IBM866, WINDOWS_1252};
use serde::{Deserialize, Serialize};
use std::borrow::Cow;

use crate::error::ConfigError;

/// Encoding of a child's output stream.
///
/// - `Utf8`: UTF-8 (65001)
/// - `Utf16Le`: UTF-16 LE (1200)
/// - `Acp`: Active Code Page, typically Windows-1252 (1252)
/// - `Oem`: OEM Code Page, decoded as IBM866
/// - `Unknown`: Treat as UTF-8 passthrough
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Encoding {
    #[default]
    Unknown,
    Utf8,
    Utf16Le,
    Acp,
    Oem,
}

impl Encoding {
    /// Whether lines can be read with a plain UTF-8 line reader.
    #[must_use]
    pub const fn is_utf8(self) -> bool {
        matches!(self, Self::Utf8 | Self::Unknown)
    }
}

impl std::fmt::Display for Encoding {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Unknown => "unknown",
            Self::Utf8 => "utf-8",
            Self::Utf16Le => "utf-16le",
            Self::Acp => "acp",
            Self::Oem => "oem",
        })
    }
}

impl std::str::FromStr for Encoding {
    type Err = ConfigError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().replace('_', "-").as_str() {
            "unknown" => Ok(Self::Unknown),
            "utf8" | "utf-8" => Ok(Self::Utf8),
            "utf16le" | "utf-16le" => Ok(Self::Utf16Le),
            "acp" | "cp1252" => Ok(Self::Acp),
            "oem" => Ok(Self::Oem),
            _ => Err(ConfigError::InvalidValue {
                section: "redirect".to_string(),
                key: "encoding".to_string(),
                message: format!("expected 'utf-8', 'utf-16le', 'acp', 'oem' or 'unknown', got '{s}'"),
            }),
        }
    }
}

/// Converts bytes from the given encoding to UTF-8.
///
/// # Example
/// ```
/// use pipemux::utility::encoding::{bytes_to_utf8, Encoding};
///
/// let cp1252_bytes = b"caf\xe9"; // "café" in Windows-1252
/// let utf8 = bytes_to_utf8(Encoding::Acp, cp1252_bytes);
/// assert_eq!(utf8, "café");
/// ```
#[must_use]
pub fn bytes_to_utf8(encoding: Encoding, bytes: &[u8]) -> Cow<'_, str> {
    match encoding {
        Encoding::Utf8 | Encoding::Unknown => String::from_utf8_lossy(bytes),
        Encoding::Utf16Le => utf16_le_to_utf8(bytes),
        Encoding::Acp => WINDOWS_1252.decode_without_bom_handling(bytes).0,
        Encoding::Oem => IBM866.decode_without_bom_handling(bytes).0,
    }
}

fn utf16_le_to_utf8(bytes: &[u8]) -> Cow<'static, str> {
    // A dangling odd byte is not a code unit
    let len = bytes.len() & !1;
    if len == 0 {
        return Cow::Borrowed("");
    }
    let units: Vec<u16> = bytes[..len]
        .chunks_exact(2)
        .map(|chunk| u16::from_le_bytes([chunk[0], chunk[1]]))
        .collect();
    Cow::Owned(String::from_utf16_lossy(&units))
}

/// Incremental line splitter for non-UTF-8 pipes.
///
/// Bytes arrive in arbitrary chunks; [`next_line`](Self::next_line) hands out
/// one complete line at a time (LF terminated, a trailing CR is dropped).
/// Empty lines are preserved. When `finished` is set, the unterminated tail
/// is returned as a final line.
///
/// # Example
/// ```
/// use pipemux::utility::encoding::{EncodedBuffer, Encoding};
///
/// let mut buffer = EncodedBuffer::new(Encoding::Acp);
/// buffer.add(b"line1\r\n\r\nline2");
///
/// assert_eq!(buffer.next_line(false).as_deref(), Some("line1"));
/// assert_eq!(buffer.next_line(false).as_deref(), Some(""));
/// assert_eq!(buffer.next_line(false), None);
/// assert_eq!(buffer.next_line(true).as_deref(), Some("line2"));
/// ```
pub struct EncodedBuffer {
    encoding: Encoding,
    bytes: Vec<u8>,
    /// Start of the first unconsumed line.
    offset: usize,
}

impl EncodedBuffer {
    #[must_use]
    pub const fn new(encoding: Encoding) -> Self {
        Self {
            encoding,
            bytes: Vec::new(),
            offset: 0,
        }
    }

    /// Appends bytes to the buffer.
    pub fn add(&mut self, bytes: &[u8]) {
        // Drop the consumed prefix before growing
        if self.offset > 0 {
            self.bytes.drain(..self.offset);
            self.offset = 0;
        }
        self.bytes.extend_from_slice(bytes);
    }

    /// Returns true if no unconsumed bytes remain.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pending().is_empty()
    }

    fn pending(&self) -> &[u8] {
        &self.bytes[self.offset..]
    }

    /// Pops the next complete line, or the tail when `finished`.
    pub fn next_line(&mut self, finished: bool) -> Option<String> {
        let width = if self.encoding == Encoding::Utf16Le { 2 } else { 1 };
        let pending = self.pending();
        let usable = pending.len() - pending.len() % width;

        let newline = pending[..usable]
            .chunks_exact(width)
            .position(|unit| unit[0] == b'\n' && unit[1..].iter().all(|b| *b == 0));

        let (line_len, consumed) = match newline {
            Some(index) => (index * width, (index + 1) * width),
            None if finished && usable > 0 => (usable, pending.len()),
            None => return None,
        };

        let mut line = &pending[..line_len];
        if line.len() >= width
            && line[line.len() - width] == b'\r'
            && line[line.len() - width + 1..].iter().all(|b| *b == 0)
        {
            line = &line[..line.len() - width];
        }
        let decoded = bytes_to_utf8(self.encoding, line).into_owned();
        self.offset += consumed;
        Some(decoded)
    }
}
