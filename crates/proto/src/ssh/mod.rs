//! SSH client transport handshake (RFC 4251, RFC 4253, RFC 5656, RFC 8731).
//!
//! # Architecture
//!
//! The handshake is layered bottom-up:
//!
//! 1. **Wire encoding** ([`wire`]) - string, name-list and mpint (RFC 4251 Section 5)
//! 2. **Packet Layer** ([`packet`]) - Binary packet protocol (RFC 4253 Section 6)
//! 3. **Negotiation** ([`kex`]) - KEXINIT and algorithm selection
//! 4. **Key Exchange** ([`kex_dh`]) - curve25519 ECDH and the server reply
//! 5. **Key Derivation** ([`keys`]) - exchange hash and session keys
//! 6. **Cipher Transport** ([`crypto`], [`writer`]) - AES-CTR + HMAC, writer task
//! 7. **Driver** ([`client`]) - runs the handshake over a stream
//!
//! # Security Considerations
//!
//! - **Input Validation**: All packet parsing validates size limits (max 35000 bytes)
//! - **Constant-Time Operations**: MAC verification uses constant-time comparison
//! - **Memory Safety**: Secrets are zeroized on drop using [`zeroize`]
//! - **No Unsafe Code**: Pure Rust implementation without `unsafe`
//!
//! # Example
//!
//! ```rust
//! use sushi_proto::ssh::Packet;
//!
//! // Frame a payload
//! let packet = Packet::new(b"SSH-MSG-KEXINIT payload".to_vec()).unwrap();
//!
//! // Serialize to wire format
//! let bytes = packet.to_bytes();
//!
//! // Parse from wire format
//! let parsed = Packet::from_bytes(&bytes, 0).unwrap();
//! assert_eq!(parsed.payload(), b"SSH-MSG-KEXINIT payload");
//! ```
//!
//! # References
//!
//! - [RFC 4251](https://datatracker.ietf.org/doc/html/rfc4251) - SSH Protocol Architecture
//! - [RFC 4253](https://datatracker.ietf.org/doc/html/rfc4253) - SSH Transport Layer Protocol
//! - [RFC 5656](https://datatracker.ietf.org/doc/html/rfc5656) - ECC in the SSH Transport Layer
//! - [RFC 8731](https://datatracker.ietf.org/doc/html/rfc8731) - curve25519-sha256

pub mod client;
pub mod crypto;
pub mod error;
pub mod kex;
pub mod kex_dh;
pub mod keys;
pub mod message;
pub mod observer;
pub mod packet;
pub mod transport;
pub mod version;
pub mod wire;
pub mod writer;

// Re-export commonly used types
pub use client::{connect, handshake, ActiveSession, ClientConfig, EstablishedSession};
pub use crypto::{CipherAlgorithm, InboundCipher, MacAlgorithm, MacKey, OutboundCipher};
pub use error::{Error, Result};
pub use kex::{
    find_match, resolve_algorithms, AlgorithmCategory, AlgorithmSelection, KexAlgorithms,
    KexInit, NewKeys,
};
pub use kex_dh::{Curve25519Exchange, KexEcdhInit, KexEcdhReply, SharedSecret};
pub use keys::{compute_exchange_hash, derive_key, ConnectionState, KexTranscript, SessionKeys};
pub use message::MessageType;
pub use observer::{HandshakeObserver, NoopObserver, TracingObserver};
pub use packet::Packet;
pub use transport::State;
pub use version::Version;
pub use wire::NameList;
pub use writer::{CipherWriter, PacketSender};
