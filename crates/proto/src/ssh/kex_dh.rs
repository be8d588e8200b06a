//! Curve25519 key exchange (RFC 8731).
//!
//! The client generates an ephemeral X25519 keypair, sends the public half in
//! SSH_MSG_KEX_ECDH_INIT and receives the server's half, its host key and a
//! signature in SSH_MSG_KEX_ECDH_REPLY. Both sides then compute the same
//! 32-byte shared secret `K`.
//!
//! # Example
//!
//! ```rust
//! use sushi_proto::ssh::kex_dh::{import_peer_public, Curve25519Exchange};
//!
//! let client = Curve25519Exchange::generate().unwrap();
//! let server = Curve25519Exchange::generate().unwrap();
//!
//! let client_public = import_peer_public(client.public_key()).unwrap();
//! let server_public = import_peer_public(server.public_key()).unwrap();
//!
//! let k1 = client.compute_shared_secret(&server_public).unwrap();
//! let k2 = server.compute_shared_secret(&client_public).unwrap();
//! assert_eq!(k1.as_bytes(), k2.as_bytes());
//! ```

use crate::ssh::error::{Error, Result};
use crate::ssh::kex::HOST_KEY_ED25519;
use crate::ssh::message::MessageType;
use crate::ssh::wire::{put_string, WireReader};
use base64::Engine;
use bytes::{BufMut, BytesMut};
use ring::agreement::{agree_ephemeral, EphemeralPrivateKey, UnparsedPublicKey, X25519};
use ring::rand::SystemRandom;
use sha2::{Digest, Sha256};
use std::fmt;
use zeroize::Zeroize;

/// Length of an X25519 public key.
pub const X25519_KEY_LEN: usize = 32;

/// Curve25519 ephemeral key exchange.
///
/// The private key lives only inside this value and is consumed by
/// [`Curve25519Exchange::compute_shared_secret`].
pub struct Curve25519Exchange {
    private_key: EphemeralPrivateKey,
    public_key: [u8; X25519_KEY_LEN],
}

impl Curve25519Exchange {
    /// Generates a fresh ephemeral keypair from the system CSPRNG.
    pub fn generate() -> Result<Self> {
        let rng = SystemRandom::new();
        let private_key = EphemeralPrivateKey::generate(&X25519, &rng).map_err(|_| {
            Error::KeyExchangeFailed("failed to generate Curve25519 key".to_string())
        })?;

        let public_key = private_key.compute_public_key().map_err(|_| {
            Error::KeyExchangeFailed("failed to compute Curve25519 public key".to_string())
        })?;

        let mut public_key_bytes = [0u8; X25519_KEY_LEN];
        public_key_bytes.copy_from_slice(public_key.as_ref());

        Ok(Self {
            private_key,
            public_key: public_key_bytes,
        })
    }

    /// Returns the ephemeral public key (`Q_C` on the client).
    pub fn public_key(&self) -> &[u8; X25519_KEY_LEN] {
        &self.public_key
    }

    /// Computes `K` from the peer's public key, consuming the private key.
    ///
    /// # Errors
    ///
    /// Returns [`Error::KeyExchangeFailed`] if the agreement is rejected,
    /// which includes peer points of small order that yield an all-zero
    /// secret.
    pub fn compute_shared_secret(self, peer: &PeerPublicKey) -> Result<SharedSecret> {
        let peer_public_key = UnparsedPublicKey::new(&X25519, peer.as_bytes());

        agree_ephemeral(self.private_key, &peer_public_key, |key_material| {
            SharedSecret::new(key_material.to_vec())
        })
        .map_err(|_| Error::KeyExchangeFailed("Curve25519 key agreement failed".to_string()))
    }
}

impl fmt::Debug for Curve25519Exchange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Curve25519Exchange")
            .field("public_key", &hex::encode(self.public_key))
            .finish_non_exhaustive()
    }
}

/// A peer X25519 public key that passed [`import_peer_public`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerPublicKey([u8; X25519_KEY_LEN]);

impl PeerPublicKey {
    /// Raw key bytes.
    pub fn as_bytes(&self) -> &[u8; X25519_KEY_LEN] {
        &self.0
    }
}

/// Validates a peer public key.
///
/// # Errors
///
/// Returns [`Error::InvalidPublicKey`] unless `bytes` is exactly 32 bytes and
/// not all zero.
pub fn import_peer_public(bytes: &[u8]) -> Result<PeerPublicKey> {
    if bytes.len() != X25519_KEY_LEN {
        return Err(Error::InvalidPublicKey(format!(
            "expected {} bytes, got {}",
            X25519_KEY_LEN,
            bytes.len()
        )));
    }
    if bytes.iter().all(|&b| b == 0) {
        return Err(Error::InvalidPublicKey("all-zero point".to_string()));
    }

    let mut key = [0u8; X25519_KEY_LEN];
    key.copy_from_slice(bytes);
    Ok(PeerPublicKey(key))
}

/// Shared secret `K`, wiped on drop.
#[derive(Clone, PartialEq, Eq)]
pub struct SharedSecret(Vec<u8>);

impl SharedSecret {
    /// Wraps raw secret bytes (unsigned big-endian).
    pub fn new(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    /// Secret bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl Drop for SharedSecret {
    fn drop(&mut self) {
        self.0.zeroize();
    }
}

impl fmt::Debug for SharedSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SharedSecret([REDACTED; {}])", self.0.len())
    }
}

/// SSH_MSG_KEX_ECDH_INIT (RFC 5656 Section 4).
///
/// ```text
/// byte     SSH_MSG_KEX_ECDH_INIT (30)
/// string   Q_C, client's ephemeral public key octet string
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KexEcdhInit {
    client_public: Vec<u8>,
}

impl KexEcdhInit {
    /// Creates the message for `client_public`.
    pub fn new(client_public: &[u8]) -> Self {
        Self {
            client_public: client_public.to_vec(),
        }
    }

    /// Client ephemeral public key.
    pub fn client_public(&self) -> &[u8] {
        &self.client_public
    }

    /// Serializes to payload bytes.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = BytesMut::with_capacity(5 + self.client_public.len());
        buf.put_u8(MessageType::KexEcdhInit as u8);
        put_string(&mut buf, &self.client_public);
        buf.to_vec()
    }

    /// Parses a payload.
    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        let mut reader = WireReader::new(data);
        expect_code(&mut reader, MessageType::KexEcdhInit)?;
        Ok(Self::new(reader.read_string()?))
    }
}

/// SSH_MSG_KEX_ECDH_REPLY (RFC 5656 Section 4).
///
/// ```text
/// byte     SSH_MSG_KEX_ECDH_REPLY (31)
/// string   K_S, server's public host key
///            string  key type
///            string  key
/// string   Q_S, server's ephemeral public key octet string
/// string   the signature on the exchange hash
///            string  signature type
///            string  signature blob
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KexEcdhReply {
    host_key_blob: Vec<u8>,
    host_key_type: String,
    host_key: Vec<u8>,
    server_public: Vec<u8>,
    signature_type: String,
    signature: Vec<u8>,
}

impl KexEcdhReply {
    /// Parses a reply payload.
    ///
    /// # Errors
    ///
    /// - [`Error::UnexpectedMessage`] if the code is not 31
    /// - [`Error::TruncatedInput`] if any nested string is short
    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        let mut reader = WireReader::new(data);
        expect_code(&mut reader, MessageType::KexEcdhReply)?;

        let host_key_blob = reader.read_string()?;
        let server_public = reader.read_string()?;
        let signature_blob = reader.read_string()?;

        let mut key_reader = WireReader::new(host_key_blob);
        let host_key_type = lossy(key_reader.read_string()?);
        let host_key = key_reader.read_string()?;

        let mut sig_reader = WireReader::new(signature_blob);
        let signature_type = lossy(sig_reader.read_string()?);
        let signature = sig_reader.read_string()?;

        Ok(Self {
            host_key_blob: host_key_blob.to_vec(),
            host_key_type,
            host_key: host_key.to_vec(),
            server_public: server_public.to_vec(),
            signature_type,
            signature: signature.to_vec(),
        })
    }

    /// Builds a reply from its parts.
    pub fn new(
        host_key_type: &str,
        host_key: &[u8],
        server_public: &[u8],
        signature_type: &str,
        signature: &[u8],
    ) -> Self {
        let mut blob = BytesMut::new();
        put_string(&mut blob, host_key_type.as_bytes());
        put_string(&mut blob, host_key);

        Self {
            host_key_blob: blob.to_vec(),
            host_key_type: host_key_type.to_string(),
            host_key: host_key.to_vec(),
            server_public: server_public.to_vec(),
            signature_type: signature_type.to_string(),
            signature: signature.to_vec(),
        }
    }

    /// Serializes to payload bytes.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut sig = BytesMut::new();
        put_string(&mut sig, self.signature_type.as_bytes());
        put_string(&mut sig, &self.signature);

        let mut buf = BytesMut::new();
        buf.put_u8(MessageType::KexEcdhReply as u8);
        put_string(&mut buf, &self.host_key_blob);
        put_string(&mut buf, &self.server_public);
        put_string(&mut buf, &sig);
        buf.to_vec()
    }

    /// Full `K_S` blob as sent on the wire.
    pub fn host_key_blob(&self) -> &[u8] {
        &self.host_key_blob
    }

    /// Host key algorithm name inside `K_S`.
    pub fn host_key_type(&self) -> &str {
        &self.host_key_type
    }

    /// Host public key inside `K_S`.
    pub fn host_key(&self) -> &[u8] {
        &self.host_key
    }

    /// Server ephemeral public key `Q_S`.
    pub fn server_public(&self) -> &[u8] {
        &self.server_public
    }

    /// Signature algorithm name.
    pub fn signature_type(&self) -> &str {
        &self.signature_type
    }

    /// Raw signature bytes.
    pub fn signature(&self) -> &[u8] {
        &self.signature
    }

    /// OpenSSH-style `SHA256:<base64>` fingerprint of `K_S`.
    pub fn host_key_fingerprint(&self) -> String {
        let hash = Sha256::digest(&self.host_key_blob);
        format!(
            "SHA256:{}",
            base64::engine::general_purpose::STANDARD.encode(hash)
        )
    }

    /// Verifies the host signature over the exchange hash `H`.
    ///
    /// # Errors
    ///
    /// - [`Error::UnsupportedAlgorithm`] unless both key and signature are
    ///   `ssh-ed25519`
    /// - [`Error::HostKeyVerificationFailed`] if the signature does not verify
    pub fn verify_signature(&self, exchange_hash: &[u8]) -> Result<()> {
        if self.host_key_type != HOST_KEY_ED25519 {
            return Err(Error::UnsupportedAlgorithm(self.host_key_type.clone()));
        }
        if self.signature_type != HOST_KEY_ED25519 {
            return Err(Error::UnsupportedAlgorithm(self.signature_type.clone()));
        }

        let public_key =
            ring::signature::UnparsedPublicKey::new(&ring::signature::ED25519, &self.host_key);
        public_key
            .verify(exchange_hash, &self.signature)
            .map_err(|_| {
                Error::HostKeyVerificationFailed(format!(
                    "ssh-ed25519 signature rejected for {}",
                    self.host_key_fingerprint()
                ))
            })
    }
}

fn expect_code(reader: &mut WireReader<'_>, expected: MessageType) -> Result<()> {
    let code = reader.read_u8()?;
    if code != expected as u8 {
        return Err(Error::UnexpectedMessage {
            expected: expected as u8,
            got: code,
        });
    }
    Ok(())
}

fn lossy(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes).into_owned()
}
