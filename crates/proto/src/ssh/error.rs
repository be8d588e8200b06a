//! Error types for the SSH transport handshake.
//!
//! Every failure the handshake can hit is one variant of [`Error`]. None of
//! them is retried: a malformed frame, a rejected key or a failed negotiation
//! leaves the connection in a state that cannot be resumed, so the caller is
//! expected to drop the stream.

use crate::ssh::kex::AlgorithmCategory;
use std::fmt;

/// Result type for SSH transport operations
pub type Result<T> = std::result::Result<T, Error>;

/// SSH transport errors
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// Fewer bytes were available than a declared length demands
    TruncatedInput {
        /// Bytes required by the declared length
        needed: usize,
        /// Bytes actually available
        available: usize,
    },

    /// Packet length field outside `[1, 35000]`
    InvalidPacketLength(u32),

    /// Padding length larger than the packet allows
    InvalidPayloadLength {
        /// Declared packet length
        packet_length: u32,
        /// Declared padding length
        padding_length: u8,
    },

    /// Bytes consumed after the length field disagree with the declared length
    FrameLengthMismatch {
        /// Declared packet length
        declared: usize,
        /// Bytes actually consumed
        consumed: usize,
    },

    /// Payload cannot be framed within the maximum packet size
    PayloadTooLarge(usize),

    /// Block size the framer cannot align to
    InvalidBlockSize(usize),

    /// Malformed name-list
    InvalidNameList(String),

    /// Malformed identification string
    InvalidVersion(String),

    /// Peer public key rejected (length or curve validity)
    InvalidPublicKey(String),

    /// ECDH agreement failed
    KeyExchangeFailed(String),

    /// No common algorithm in a required category
    AlgorithmNegotiationFailed(AlgorithmCategory),

    /// Negotiated an algorithm this crate cannot run
    UnsupportedAlgorithm(String),

    /// Host key signature over the exchange hash did not verify
    HostKeyVerificationFailed(String),

    /// Packet MAC did not match
    MacVerificationFailed,

    /// Received a message other than the one the handshake step expects
    UnexpectedMessage {
        /// Expected message code
        expected: u8,
        /// Received message code
        got: u8,
    },

    /// Peer sent SSH_MSG_DISCONNECT
    Disconnected {
        /// Reason code
        reason: u32,
        /// Human readable description sent by the peer
        description: String,
    },

    /// Invalid handshake state transition
    InvalidState(String),

    /// Invalid configuration
    Config(String),

    /// A timed operation did not complete
    Timeout(&'static str),

    /// The outbound cipher writer has stopped accepting packets
    WriterClosed,

    /// I/O error from the underlying stream
    Io(std::io::ErrorKind, String),
}

impl Error {
    /// Returns true if the error leaves the connection unusable.
    ///
    /// Only configuration mistakes are caught before any byte is exchanged.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, Error::Config(_))
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::TruncatedInput { needed, available } => {
                write!(
                    f,
                    "Truncated input: need {} bytes, have {}",
                    needed, available
                )
            }
            Error::InvalidPacketLength(len) => write!(f, "Invalid packet length: {}", len),
            Error::InvalidPayloadLength {
                packet_length,
                padding_length,
            } => write!(
                f,
                "Invalid payload length: padding {} does not fit packet length {}",
                padding_length, packet_length
            ),
            Error::FrameLengthMismatch { declared, consumed } => write!(
                f,
                "Frame length mismatch: declared {} bytes, consumed {}",
                declared, consumed
            ),
            Error::PayloadTooLarge(len) => write!(f, "Payload too large: {} bytes", len),
            Error::InvalidBlockSize(size) => write!(f, "Invalid cipher block size: {}", size),
            Error::InvalidNameList(msg) => write!(f, "Invalid name-list: {}", msg),
            Error::InvalidVersion(msg) => write!(f, "Invalid version string: {}", msg),
            Error::InvalidPublicKey(msg) => write!(f, "Invalid public key: {}", msg),
            Error::KeyExchangeFailed(msg) => write!(f, "Key exchange failed: {}", msg),
            Error::AlgorithmNegotiationFailed(category) => {
                write!(f, "No common algorithm for {}", category)
            }
            Error::UnsupportedAlgorithm(name) => write!(f, "Unsupported algorithm: {}", name),
            Error::HostKeyVerificationFailed(msg) => {
                write!(f, "Host key verification failed: {}", msg)
            }
            Error::MacVerificationFailed => write!(f, "MAC verification failed"),
            Error::UnexpectedMessage { expected, got } => write!(
                f,
                "Unexpected message: expected {}, got {}",
                expected, got
            ),
            Error::Disconnected {
                reason,
                description,
            } => write!(f, "Disconnected by peer (reason {}): {}", reason, description),
            Error::InvalidState(msg) => write!(f, "Invalid state: {}", msg),
            Error::Config(msg) => write!(f, "Configuration error: {}", msg),
            Error::Timeout(what) => write!(f, "Timed out: {}", what),
            Error::WriterClosed => write!(f, "Cipher writer closed"),
            Error::Io(kind, msg) => write!(f, "I/O error ({:?}): {}", kind, msg),
        }
    }
}

impl std::error::Error for Error {}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Io(err.kind(), err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::TruncatedInput {
            needed: 10,
            available: 4,
        };
        assert_eq!(err.to_string(), "Truncated input: need 10 bytes, have 4");

        let err = Error::AlgorithmNegotiationFailed(AlgorithmCategory::Kex);
        assert_eq!(err.to_string(), "No common algorithm for kex_algorithms");

        let err = Error::UnexpectedMessage {
            expected: 31,
            got: 20,
        };
        assert_eq!(err.to_string(), "Unexpected message: expected 31, got 20");
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::BrokenPipe, "pipe closed");
        let err: Error = io_err.into();
        match err {
            Error::Io(kind, msg) => {
                assert_eq!(kind, std::io::ErrorKind::BrokenPipe);
                assert!(msg.contains("pipe closed"));
            }
            _ => panic!("Expected Io error"),
        }
    }

    #[test]
    fn test_is_fatal() {
        assert!(Error::InvalidPacketLength(0).is_fatal());
        assert!(Error::KeyExchangeFailed("x".into()).is_fatal());
        assert!(!Error::Config("bad".into()).is_fatal());
    }
}
