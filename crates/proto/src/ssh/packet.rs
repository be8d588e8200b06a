//! SSH binary packet protocol (RFC 4253 Section 6).
//!
//! # Packet Format
//!
//! ```text
//! uint32    packet_length
//! byte      padding_length
//! byte[n1]  payload (n1 = packet_length - padding_length - 1)
//! byte[n2]  random padding (n2 = padding_length)
//! byte[m]   mac (MAC = Message Authentication Code)
//! ```
//!
//! # Constraints
//!
//! - `packet_length`: Does NOT include `mac` or `packet_length` field itself
//! - `padding_length`: At least 4 bytes, fits in a byte
//! - `packet_length` + 4 MUST be a multiple of 8 (or the cipher block size)
//! - Maximum packet size: 35000 bytes
//!
//! # Example
//!
//! ```rust
//! use sushi_proto::ssh::Packet;
//!
//! let packet = Packet::new(b"SSH-MSG-KEXINIT payload".to_vec()).unwrap();
//! let bytes = packet.to_bytes();
//! assert_eq!(bytes.len() % 8, 0);
//!
//! let parsed = Packet::from_bytes(&bytes, 0).unwrap();
//! assert_eq!(parsed.payload(), b"SSH-MSG-KEXINIT payload");
//! ```

use crate::ssh::error::{Error, Result};
use bytes::{BufMut, BytesMut};
use rand::RngCore;
use tokio::io::{AsyncRead, AsyncReadExt};

/// Maximum packet length in bytes (RFC 4253 Section 6.1).
pub const MAX_PACKET_SIZE: usize = 35000;

/// Minimum padding length in bytes (RFC 4253 Section 6).
pub const MIN_PADDING_LEN: usize = 4;

/// Maximum padding length in bytes (fits in u8).
pub const MAX_PADDING_LEN: usize = 255;

/// Block size used while no cipher is active.
pub const DEFAULT_BLOCK_SIZE: usize = 8;

/// Largest block size whose worst-case padding (`4 + block_size - 1`) still
/// fits in the padding-length byte.
pub const MAX_BLOCK_SIZE: usize = 248;

/// Bytes of the `packet_length` field.
const LENGTH_FIELD_LEN: usize = 4;

/// SSH binary packet.
///
/// # Invariants
///
/// - `1 + payload.len() + padding.len() == packet_length()`
/// - Padding is at least 4 bytes
/// - Packets built by [`Packet::frame`] are aligned to the requested block size
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    payload: Vec<u8>,
    padding: Vec<u8>,
    mac: Vec<u8>,
}

impl Packet {
    /// Frames `payload` for the unencrypted transport (block size 8, no MAC).
    pub fn new(payload: Vec<u8>) -> Result<Self> {
        Self::frame(payload, Vec::new(), DEFAULT_BLOCK_SIZE)
    }

    /// Frames `payload` with random padding aligned to `block_size`.
    ///
    /// Padding starts at [`MIN_PADDING_LEN`] and grows until
    /// `4 + 1 + payload + padding` is a multiple of `block_size`.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidBlockSize`] unless `block_size` is a multiple of 8 in
    ///   `8..=248`
    /// - [`Error::PayloadTooLarge`] if the framed packet would exceed
    ///   [`MAX_PACKET_SIZE`]
    ///
    /// # Example
    ///
    /// ```rust
    /// use sushi_proto::ssh::Packet;
    ///
    /// let packet = Packet::frame(vec![5], Vec::new(), 16).unwrap();
    /// assert_eq!(packet.to_bytes().len() % 16, 0);
    /// ```
    pub fn frame(payload: Vec<u8>, mac: Vec<u8>, block_size: usize) -> Result<Self> {
        if !(DEFAULT_BLOCK_SIZE..=MAX_BLOCK_SIZE).contains(&block_size)
            || block_size % DEFAULT_BLOCK_SIZE != 0
        {
            return Err(Error::InvalidBlockSize(block_size));
        }

        let unpadded_len = LENGTH_FIELD_LEN + 1 + payload.len();
        let mut padding_len = MIN_PADDING_LEN;
        let remainder = (unpadded_len + padding_len) % block_size;
        if remainder != 0 {
            padding_len += block_size - remainder;
        }

        let packet_length = 1 + payload.len() + padding_len;
        if packet_length > MAX_PACKET_SIZE {
            return Err(Error::PayloadTooLarge(payload.len()));
        }

        if padding_len > MAX_PADDING_LEN {
            return Err(Error::InvalidBlockSize(block_size));
        }
        debug_assert_eq!(
            (LENGTH_FIELD_LEN + packet_length) % block_size,
            0,
            "framed packet not aligned to block size"
        );

        let mut padding = vec![0u8; padding_len];
        rand::thread_rng().fill_bytes(&mut padding);

        Ok(Self {
            payload,
            padding,
            mac,
        })
    }

    /// Returns the payload of this packet.
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// Consumes the packet, returning its payload.
    pub fn into_payload(self) -> Vec<u8> {
        self.payload
    }

    /// Returns the padding of this packet.
    pub fn padding(&self) -> &[u8] {
        &self.padding
    }

    /// Returns the MAC (empty until a MAC algorithm is active).
    pub fn mac(&self) -> &[u8] {
        &self.mac
    }

    /// Sets the MAC for this packet.
    pub fn set_mac(&mut self, mac: Vec<u8>) {
        self.mac = mac;
    }

    /// Value of the `packet_length` field.
    pub fn packet_length(&self) -> usize {
        1 + self.payload.len() + self.padding.len()
    }

    /// Message code (first payload byte), if the payload is non-empty.
    pub fn message_type(&self) -> Option<u8> {
        self.payload.first().copied()
    }

    /// Serializes the packet without its MAC.
    ///
    /// This is the "unencrypted packet" a MAC is computed over and the byte
    /// range a stream cipher encrypts.
    pub fn to_unauthenticated_bytes(&self) -> Vec<u8> {
        let packet_length = self.packet_length();
        let mut buf = BytesMut::with_capacity(LENGTH_FIELD_LEN + packet_length);
        self.put_unauthenticated(&mut buf);
        buf.to_vec()
    }

    /// Serializes this packet to wire format.
    ///
    /// ```text
    /// uint32    packet_length (big-endian)
    /// byte      padding_length
    /// byte[n1]  payload
    /// byte[n2]  random padding
    /// byte[m]   mac
    /// ```
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf =
            BytesMut::with_capacity(LENGTH_FIELD_LEN + self.packet_length() + self.mac.len());
        self.put_unauthenticated(&mut buf);
        buf.put_slice(&self.mac);
        buf.to_vec()
    }

    fn put_unauthenticated(&self, buf: &mut BytesMut) {
        buf.put_u32(self.packet_length() as u32);
        buf.put_u8(self.padding.len() as u8);
        buf.put_slice(&self.payload);
        buf.put_slice(&self.padding);
    }

    /// Parses a packet from a buffer holding exactly one frame.
    ///
    /// # Errors
    ///
    /// Same as [`Packet::read_from`], plus [`Error::FrameLengthMismatch`] if
    /// bytes remain after the MAC.
    pub fn from_bytes(data: &[u8], mac_len: usize) -> Result<Self> {
        let (packet, used) = Self::decode(data, mac_len)?;
        if used != data.len() {
            return Err(Error::FrameLengthMismatch {
                declared: used,
                consumed: data.len(),
            });
        }
        Ok(packet)
    }

    /// Parses one frame from the front of `data`, returning it with the byte
    /// count it occupied.
    pub fn decode(data: &[u8], mac_len: usize) -> Result<(Self, usize)> {
        let mut cursor = data;
        let mut take = |n: usize| -> Result<&[u8]> {
            if cursor.len() < n {
                return Err(Error::TruncatedInput {
                    needed: n,
                    available: cursor.len(),
                });
            }
            let (head, tail) = cursor.split_at(n);
            cursor = tail;
            Ok(head)
        };

        let length_bytes = take(LENGTH_FIELD_LEN)?;
        let packet_length =
            u32::from_be_bytes([length_bytes[0], length_bytes[1], length_bytes[2], length_bytes[3]]);
        validate_packet_length(packet_length)?;

        let padding_length = take(1)?[0];
        let payload_length = payload_length(packet_length, padding_length)?;

        let payload = take(payload_length)?.to_vec();
        let padding = take(padding_length as usize)?.to_vec();
        let mac = take(mac_len)?.to_vec();

        check_accounting(packet_length, 1 + payload.len() + padding.len())?;

        let used = LENGTH_FIELD_LEN + packet_length as usize + mac_len;
        Ok((
            Self {
                payload,
                padding,
                mac,
            },
            used,
        ))
    }

    /// Reads one frame from a byte stream.
    ///
    /// Reads the length field, the padding length, then exactly the declared
    /// payload, padding and `mac_len` MAC bytes.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidPacketLength`] if the length is outside `[1, 35000]`
    /// - [`Error::InvalidPayloadLength`] if the padding does not fit
    /// - [`Error::TruncatedInput`] if the stream ends early
    /// - [`Error::FrameLengthMismatch`] if the consumed count disagrees with
    ///   the declared length
    pub async fn read_from<R>(reader: &mut R, mac_len: usize) -> Result<Self>
    where
        R: AsyncRead + Unpin + ?Sized,
    {
        let mut length_bytes = [0u8; LENGTH_FIELD_LEN];
        read_exact(reader, &mut length_bytes).await?;
        let packet_length = u32::from_be_bytes(length_bytes);
        validate_packet_length(packet_length)?;

        let mut padding_length = [0u8; 1];
        read_exact(reader, &mut padding_length).await?;
        let padding_length = padding_length[0];
        let payload_length = payload_length(packet_length, padding_length)?;

        let mut payload = vec![0u8; payload_length];
        read_exact(reader, &mut payload).await?;

        let mut padding = vec![0u8; padding_length as usize];
        read_exact(reader, &mut padding).await?;

        let mut mac = vec![0u8; mac_len];
        read_exact(reader, &mut mac).await?;

        check_accounting(packet_length, 1 + payload.len() + padding.len())?;

        Ok(Self {
            payload,
            padding,
            mac,
        })
    }
}

fn validate_packet_length(packet_length: u32) -> Result<()> {
    if packet_length < 1 || packet_length as usize > MAX_PACKET_SIZE {
        return Err(Error::InvalidPacketLength(packet_length));
    }
    Ok(())
}

fn payload_length(packet_length: u32, padding_length: u8) -> Result<usize> {
    (packet_length as usize)
        .checked_sub(padding_length as usize + 1)
        .ok_or(Error::InvalidPayloadLength {
            packet_length,
            padding_length,
        })
}

fn check_accounting(packet_length: u32, consumed: usize) -> Result<()> {
    if consumed != packet_length as usize {
        return Err(Error::FrameLengthMismatch {
            declared: packet_length as usize,
            consumed,
        });
    }
    Ok(())
}

/// `read_exact` that reports a short stream as [`Error::TruncatedInput`].
pub(crate) async fn read_exact<R>(reader: &mut R, buf: &mut [u8]) -> Result<()>
where
    R: AsyncRead + Unpin + ?Sized,
{
    match reader.read_exact(buf).await {
        Ok(_) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => Err(Error::TruncatedInput {
            needed: buf.len(),
            available: 0,
        }),
        Err(e) => Err(e.into()),
    }
}
