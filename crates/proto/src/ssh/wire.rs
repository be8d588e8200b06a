//! SSH binary primitive encoding (RFC 4251 Section 5).
//!
//! Three primitive types appear in every handshake message:
//!
//! ```text
//! string     uint32 length || bytes
//! name-list  string of comma-separated names
//! mpint      string of big-endian bytes, sign-padded
//! ```
//!
//! Encoders write into a [`BytesMut`]; decoders work over a borrowed slice and
//! report how many bytes they consumed so callers can keep the exact wire
//! bytes of a record. A [`WireReader`] wraps a slice for sequential field
//! decoding.
//!
//! # Example
//!
//! ```rust
//! use sushi_proto::ssh::wire::{decode_namelist, encode_namelist, NameList};
//!
//! let list = NameList::from_names(["curve25519-sha256", "ssh-ed25519"]).unwrap();
//! let wire = encode_namelist(&list);
//! let (decoded, consumed) = decode_namelist(&wire).unwrap();
//! assert_eq!(decoded, list);
//! assert_eq!(consumed, wire.len());
//! ```

use crate::ssh::error::{Error, Result};
use bytes::{BufMut, BytesMut};

/// Leading-byte value at or above which [`encode_mpint`] prepends a zero byte.
///
/// This is the threshold used by the reference peer; the two's-complement
/// rule of RFC 4251 only requires the pad from 0x80 upwards.
pub const MPINT_PAD_THRESHOLD: u8 = 0x10;

/// Name-list separator.
const SEPARATOR: char = ',';

/// Ordered list of algorithm names, most preferred first.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct NameList(Vec<String>);

impl NameList {
    /// Creates an empty name-list.
    pub fn new() -> Self {
        Self(Vec::new())
    }

    /// Builds a name-list, rejecting names that contain a comma or are empty.
    pub fn from_names<I, S>(names: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let names: Vec<String> = names.into_iter().map(Into::into).collect();
        for name in &names {
            if name.is_empty() {
                return Err(Error::InvalidNameList("empty algorithm name".to_string()));
            }
            if name.contains(SEPARATOR) {
                return Err(Error::InvalidNameList(format!(
                    "algorithm name '{}' contains a separator",
                    name
                )));
            }
        }
        Ok(Self(names))
    }

    /// Single-entry list. Panics on a name containing `,`; meant for constants.
    pub fn single(name: &str) -> Self {
        assert!(
            !name.is_empty() && !name.contains(SEPARATOR),
            "invalid algorithm name: {:?}",
            name
        );
        Self(vec![name.to_string()])
    }

    /// Returns the names in preference order.
    pub fn names(&self) -> &[String] {
        &self.0
    }

    /// Returns the number of names.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns true if the list has no names.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Returns true if `name` is in the list.
    pub fn contains(&self, name: &str) -> bool {
        self.0.iter().any(|n| n == name)
    }

    /// Comma-joined wire text.
    pub fn joined(&self) -> String {
        self.0.join(",")
    }
}

impl std::fmt::Display for NameList {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.joined())
    }
}

/// Encodes `data` as an SSH string.
pub fn encode_string(data: &[u8]) -> Vec<u8> {
    let mut buf = BytesMut::with_capacity(4 + data.len());
    put_string(&mut buf, data);
    buf.to_vec()
}

/// Writes an SSH string into `buf`.
pub fn put_string(buf: &mut BytesMut, data: &[u8]) {
    buf.put_u32(data.len() as u32);
    buf.put_slice(data);
}

/// Decodes an SSH string from the front of `data`.
///
/// Returns the string bytes and the number of bytes consumed (length prefix
/// included).
pub fn decode_string(data: &[u8]) -> Result<(&[u8], usize)> {
    if data.len() < 4 {
        return Err(Error::TruncatedInput {
            needed: 4,
            available: data.len(),
        });
    }
    let length = u32::from_be_bytes([data[0], data[1], data[2], data[3]]) as usize;
    let rest = &data[4..];
    if rest.len() < length {
        return Err(Error::TruncatedInput {
            needed: length,
            available: rest.len(),
        });
    }
    Ok((&rest[..length], 4 + length))
}

/// Encodes a name-list.
pub fn encode_namelist(list: &NameList) -> Vec<u8> {
    encode_string(list.joined().as_bytes())
}

/// Writes a name-list into `buf`.
pub fn put_namelist(buf: &mut BytesMut, list: &NameList) {
    put_string(buf, list.joined().as_bytes());
}

/// Decodes a name-list from the front of `data`.
///
/// A zero-length string is the empty list, not a list holding one empty name.
/// Empty entries (`"a,,b"`, a leading or trailing comma) are rejected.
pub fn decode_namelist(data: &[u8]) -> Result<(NameList, usize)> {
    let (raw, consumed) = decode_string(data)?;
    let text = std::str::from_utf8(raw)
        .map_err(|_| Error::InvalidNameList("name-list contains invalid UTF-8".to_string()))?;

    if text.is_empty() {
        return Ok((NameList::new(), consumed));
    }

    let names: Vec<String> = text.split(SEPARATOR).map(String::from).collect();
    if names.iter().any(String::is_empty) {
        return Err(Error::InvalidNameList(format!(
            "empty name in name-list: {:?}",
            text
        )));
    }

    Ok((NameList(names), consumed))
}

/// Encodes unsigned big-endian bytes as an SSH mpint.
///
/// One zero byte is prepended when the leading byte is at or above
/// [`MPINT_PAD_THRESHOLD`]. Empty input is the value zero.
pub fn encode_mpint(value: &[u8]) -> Vec<u8> {
    let mut buf = BytesMut::with_capacity(5 + value.len());
    put_mpint(&mut buf, value);
    buf.to_vec()
}

/// Writes an SSH mpint into `buf`.
pub fn put_mpint(buf: &mut BytesMut, value: &[u8]) {
    let pad = value.first().is_some_and(|&b| b >= MPINT_PAD_THRESHOLD);
    let length = value.len() + usize::from(pad);

    buf.put_u32(length as u32);
    if pad {
        buf.put_u8(0);
    }
    buf.put_slice(value);
}

/// Bounds-checked cursor over a message payload.
#[derive(Debug, Clone)]
pub struct WireReader<'a> {
    data: &'a [u8],
    offset: usize,
}

impl<'a> WireReader<'a> {
    /// Creates a reader positioned at the start of `data`.
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, offset: 0 }
    }

    /// Bytes consumed so far.
    pub fn consumed(&self) -> usize {
        self.offset
    }

    /// Bytes left to read.
    pub fn remaining(&self) -> usize {
        self.data.len() - self.offset
    }

    /// Everything consumed so far, as one slice of the input.
    pub fn consumed_bytes(&self) -> &'a [u8] {
        &self.data[..self.offset]
    }

    /// Reads exactly `n` bytes.
    pub fn read_bytes(&mut self, n: usize) -> Result<&'a [u8]> {
        if self.remaining() < n {
            return Err(Error::TruncatedInput {
                needed: n,
                available: self.remaining(),
            });
        }
        let out = &self.data[self.offset..self.offset + n];
        self.offset += n;
        Ok(out)
    }

    /// Reads a single byte.
    pub fn read_u8(&mut self) -> Result<u8> {
        Ok(self.read_bytes(1)?[0])
    }

    /// Reads a big-endian `uint32`.
    pub fn read_u32(&mut self) -> Result<u32> {
        let b = self.read_bytes(4)?;
        Ok(u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
    }

    /// Reads an SSH boolean (any non-zero byte is true).
    pub fn read_bool(&mut self) -> Result<bool> {
        Ok(self.read_u8()? != 0)
    }

    /// Reads an SSH string.
    pub fn read_string(&mut self) -> Result<&'a [u8]> {
        let (s, consumed) = decode_string(&self.data[self.offset..])?;
        self.offset += consumed;
        Ok(s)
    }

    /// Reads an SSH string that must be UTF-8.
    pub fn read_utf8(&mut self) -> Result<&'a str> {
        let s = self.read_string()?;
        std::str::from_utf8(s)
            .map_err(|_| Error::InvalidNameList("string contains invalid UTF-8".to_string()))
    }

    /// Reads a name-list.
    pub fn read_namelist(&mut self) -> Result<NameList> {
        let (list, consumed) = decode_namelist(&self.data[self.offset..])?;
        self.offset += consumed;
        Ok(list)
    }
}
