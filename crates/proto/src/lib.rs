//! SSH client transport handshake.
//!
//! This crate implements the part of an SSH-2 client that runs before user
//! authentication:
//!
//! - Version exchange
//! - KEXINIT algorithm negotiation
//! - curve25519-sha256 key exchange, exchange hash and key derivation
//! - Binary packet framing and the AES-CTR + HMAC-SHA2 cipher writer
//!
//! # Features
//!
//! - `ssh` (default) - SSH transport handshake
//!
//! # Example
//!
//! ```rust
//! use sushi_proto::ssh::Packet;
//!
//! // Create and serialize an SSH packet
//! let packet = Packet::new(b"SSH message payload".to_vec()).unwrap();
//! let wire_format = packet.to_bytes();
//!
//! // Parse from wire format
//! let parsed = Packet::from_bytes(&wire_format, 0).unwrap();
//! assert_eq!(parsed.payload(), b"SSH message payload");
//! ```
//!
//! # Security
//!
//! - All cryptographic operations use vetted libraries (`ring`, RustCrypto)
//! - Constant-time MAC comparison
//! - Secure memory handling with `zeroize`
//! - Fuzz targets for packet and KEXINIT decoding
//!
//! # References
//!
//! - [RFC 4251](https://datatracker.ietf.org/doc/html/rfc4251) - SSH Protocol Architecture
//! - [RFC 4253](https://datatracker.ietf.org/doc/html/rfc4253) - SSH Transport Layer Protocol

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]
#![forbid(unsafe_code)]

#[cfg(feature = "ssh")]
pub mod ssh;
