//! Transport layer message codes (RFC 4253 Section 12).
//!
//! Only the codes the client handshake sends or has to recognize are listed.
//!
//! # Example
//!
//! ```rust
//! use sushi_proto::ssh::message::MessageType;
//!
//! let msg_type = MessageType::KexInit;
//! assert_eq!(msg_type as u8, 20);
//! ```

use crate::ssh::error::{Error, Result};
use crate::ssh::wire::{put_string, WireReader};
use bytes::{BufMut, BytesMut};

/// SSH message types used by the transport handshake.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum MessageType {
    /// Disconnect message - terminates the connection.
    Disconnect = 1,
    /// Ignore message - skipped wherever it arrives.
    Ignore = 2,
    /// Unimplemented message - response to unknown message type.
    Unimplemented = 3,
    /// Debug message - skipped during the handshake.
    Debug = 4,
    /// Service request (e.g., "ssh-userauth").
    ServiceRequest = 5,
    /// Service accept.
    ServiceAccept = 6,
    /// Key exchange init - algorithm negotiation.
    KexInit = 20,
    /// New keys - switches to the derived keys.
    NewKeys = 21,
    /// ECDH key exchange init (client ephemeral key).
    KexEcdhInit = 30,
    /// ECDH key exchange reply (host key, server ephemeral key, signature).
    KexEcdhReply = 31,
}

impl MessageType {
    /// Converts a byte to a message type.
    ///
    /// ```rust
    /// use sushi_proto::ssh::message::MessageType;
    ///
    /// assert_eq!(MessageType::from_u8(20), Some(MessageType::KexInit));
    /// assert_eq!(MessageType::from_u8(94), None);
    /// ```
    pub fn from_u8(byte: u8) -> Option<Self> {
        match byte {
            1 => Some(MessageType::Disconnect),
            2 => Some(MessageType::Ignore),
            3 => Some(MessageType::Unimplemented),
            4 => Some(MessageType::Debug),
            5 => Some(MessageType::ServiceRequest),
            6 => Some(MessageType::ServiceAccept),
            20 => Some(MessageType::KexInit),
            21 => Some(MessageType::NewKeys),
            30 => Some(MessageType::KexEcdhInit),
            31 => Some(MessageType::KexEcdhReply),
            _ => None,
        }
    }

    /// Returns the RFC name of the message.
    pub fn name(&self) -> &'static str {
        match self {
            MessageType::Disconnect => "SSH_MSG_DISCONNECT",
            MessageType::Ignore => "SSH_MSG_IGNORE",
            MessageType::Unimplemented => "SSH_MSG_UNIMPLEMENTED",
            MessageType::Debug => "SSH_MSG_DEBUG",
            MessageType::ServiceRequest => "SSH_MSG_SERVICE_REQUEST",
            MessageType::ServiceAccept => "SSH_MSG_SERVICE_ACCEPT",
            MessageType::KexInit => "SSH_MSG_KEXINIT",
            MessageType::NewKeys => "SSH_MSG_NEWKEYS",
            MessageType::KexEcdhInit => "SSH_MSG_KEX_ECDH_INIT",
            MessageType::KexEcdhReply => "SSH_MSG_KEX_ECDH_REPLY",
        }
    }

    /// Returns true for messages the handshake silently skips.
    pub fn is_skippable(&self) -> bool {
        matches!(self, MessageType::Ignore | MessageType::Debug)
    }
}

impl std::fmt::Display for MessageType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}({})", self.name(), *self as u8)
    }
}

/// SSH_MSG_DISCONNECT payload.
///
/// ```text
/// byte      SSH_MSG_DISCONNECT
/// uint32    reason code
/// string    description in ISO-10646 UTF-8 encoding
/// string    language tag
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Disconnect {
    reason: u32,
    description: String,
}

impl Disconnect {
    /// Parses a disconnect payload.
    ///
    /// The language tag is optional here; some servers omit it.
    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        let mut reader = WireReader::new(data);
        let code = reader.read_u8()?;
        if code != MessageType::Disconnect as u8 {
            return Err(Error::UnexpectedMessage {
                expected: MessageType::Disconnect as u8,
                got: code,
            });
        }
        let reason = reader.read_u32()?;
        let description = String::from_utf8_lossy(reader.read_string()?).into_owned();
        Ok(Self {
            reason,
            description,
        })
    }

    /// Reason code.
    pub fn reason(&self) -> u32 {
        self.reason
    }

    /// Description sent by the peer.
    pub fn description(&self) -> &str {
        &self.description
    }

    /// Converts into the handshake error it causes.
    pub fn into_error(self) -> Error {
        Error::Disconnected {
            reason: self.reason,
            description: self.description,
        }
    }
}

/// SSH_MSG_SERVICE_REQUEST payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceRequest {
    service: String,
}

impl ServiceRequest {
    /// Creates a request for `service` (e.g. `ssh-userauth`).
    pub fn new(service: impl Into<String>) -> Self {
        Self {
            service: service.into(),
        }
    }

    /// Requested service name.
    pub fn service(&self) -> &str {
        &self.service
    }

    /// Serializes to payload bytes.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = BytesMut::with_capacity(5 + self.service.len());
        buf.put_u8(MessageType::ServiceRequest as u8);
        put_string(&mut buf, self.service.as_bytes());
        buf.to_vec()
    }

    /// Parses a service request payload.
    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        let mut reader = WireReader::new(data);
        let code = reader.read_u8()?;
        if code != MessageType::ServiceRequest as u8 {
            return Err(Error::UnexpectedMessage {
                expected: MessageType::ServiceRequest as u8,
                got: code,
            });
        }
        let service = reader.read_utf8()?.to_string();
        Ok(Self { service })
    }
}
