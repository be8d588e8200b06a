//! Packet encryption and integrity (RFC 4253 Section 6.3 and 6.4, RFC 4344).
//!
//! This module implements:
//! - AES-128-CTR, AES-256-CTR stream ciphers
//! - HMAC-SHA256, HMAC-SHA512 packet MACs
//! - [`OutboundCipher`]: frame, MAC, encrypt
//! - [`InboundCipher`]: read, decrypt, verify
//!
//! # Packet Protection
//!
//! ```text
//! mac = MAC(key, sequence_number || unencrypted_packet)
//! wire = encrypt(unencrypted_packet) || mac
//! ```
//!
//! The CTR keystream continues from one packet to the next and the sequence
//! number keeps counting from the unencrypted packets that preceded NEWKEYS.
//!
//! # Example
//!
//! ```rust
//! use sushi_proto::ssh::crypto::{CipherAlgorithm, MacAlgorithm, OutboundCipher};
//!
//! let key = [7u8; 16];
//! let iv = [9u8; 16];
//! let mac_key = [3u8; 32];
//!
//! let mut tx = OutboundCipher::new(
//!     CipherAlgorithm::Aes128Ctr, MacAlgorithm::HmacSha256, &key, &iv, &mac_key, 3,
//! ).unwrap();
//! let wire = tx.seal(vec![5, 0, 0, 0, 0]).unwrap();
//! assert_eq!((wire.len() - 32) % 16, 0);
//! ```

use crate::ssh::error::{Error, Result};
use crate::ssh::kex::AlgorithmSelection;
use crate::ssh::keys::{Direction, SessionKeys};
use crate::ssh::packet::{read_exact, Packet, MAX_PACKET_SIZE};
use aes::{Aes128, Aes256};
use cipher::{KeyIvInit, StreamCipher};
use hmac::{Hmac, Mac};
use sha2::{Sha256, Sha512};
use subtle::ConstantTimeEq;
use tokio::io::AsyncRead;
use zeroize::Zeroize;

type Aes128Ctr = ctr::Ctr128BE<Aes128>;
type Aes256Ctr = ctr::Ctr128BE<Aes256>;

/// Cipher algorithm for SSH encryption.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CipherAlgorithm {
    /// AES-128-CTR stream cipher
    Aes128Ctr,
    /// AES-256-CTR stream cipher
    Aes256Ctr,
}

impl CipherAlgorithm {
    /// Returns the algorithm name.
    pub fn name(&self) -> &'static str {
        match self {
            CipherAlgorithm::Aes128Ctr => "aes128-ctr",
            CipherAlgorithm::Aes256Ctr => "aes256-ctr",
        }
    }

    /// Returns the key size in bytes.
    pub fn key_size(&self) -> usize {
        match self {
            CipherAlgorithm::Aes128Ctr => 16,
            CipherAlgorithm::Aes256Ctr => 32,
        }
    }

    /// Returns the IV size in bytes.
    pub fn iv_size(&self) -> usize {
        16
    }

    /// Returns the block size packets are aligned to.
    pub fn block_size(&self) -> usize {
        16
    }

    /// Parses cipher algorithm from name.
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "aes128-ctr" => Some(CipherAlgorithm::Aes128Ctr),
            "aes256-ctr" => Some(CipherAlgorithm::Aes256Ctr),
            _ => None,
        }
    }
}

/// MAC algorithm for SSH.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MacAlgorithm {
    /// HMAC-SHA256
    HmacSha256,
    /// HMAC-SHA512
    HmacSha512,
}

impl MacAlgorithm {
    /// Returns the algorithm name.
    pub fn name(&self) -> &'static str {
        match self {
            MacAlgorithm::HmacSha256 => "hmac-sha2-256",
            MacAlgorithm::HmacSha512 => "hmac-sha2-512",
        }
    }

    /// Returns the key size in bytes.
    pub fn key_size(&self) -> usize {
        match self {
            MacAlgorithm::HmacSha256 => 32,
            MacAlgorithm::HmacSha512 => 64,
        }
    }

    /// Returns the MAC output size in bytes.
    pub fn mac_size(&self) -> usize {
        match self {
            MacAlgorithm::HmacSha256 => 32,
            MacAlgorithm::HmacSha512 => 64,
        }
    }

    /// Parses MAC algorithm from name.
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "hmac-sha2-256" => Some(MacAlgorithm::HmacSha256),
            "hmac-sha2-512" => Some(MacAlgorithm::HmacSha512),
            _ => None,
        }
    }
}

enum Keystream {
    Aes128(Aes128Ctr),
    Aes256(Aes256Ctr),
}

/// AES-CTR keystream for one direction.
///
/// CTR is symmetric, so the same type decrypts. The counter position carries
/// across calls.
pub struct StreamEncryptor {
    algorithm: CipherAlgorithm,
    keystream: Keystream,
}

impl std::fmt::Debug for StreamEncryptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamEncryptor")
            .field("algorithm", &self.algorithm)
            .field("key", &"<redacted>")
            .finish()
    }
}

impl StreamEncryptor {
    /// Creates a keystream from key and IV.
    pub fn new(algorithm: CipherAlgorithm, key: &[u8], iv: &[u8]) -> Result<Self> {
        if key.len() < algorithm.key_size() || iv.len() < algorithm.iv_size() {
            return Err(Error::KeyExchangeFailed(format!(
                "insufficient key material for {}: key {} bytes, iv {} bytes",
                algorithm.name(),
                key.len(),
                iv.len()
            )));
        }
        let key = &key[..algorithm.key_size()];
        let iv = &iv[..algorithm.iv_size()];

        let invalid = |_: cipher::InvalidLength| {
            Error::KeyExchangeFailed(format!("invalid {} key", algorithm.name()))
        };
        let keystream = match algorithm {
            CipherAlgorithm::Aes128Ctr => {
                Keystream::Aes128(Aes128Ctr::new_from_slices(key, iv).map_err(invalid)?)
            }
            CipherAlgorithm::Aes256Ctr => {
                Keystream::Aes256(Aes256Ctr::new_from_slices(key, iv).map_err(invalid)?)
            }
        };

        Ok(Self {
            algorithm,
            keystream,
        })
    }

    /// XORs the next keystream bytes into `data`.
    pub fn apply(&mut self, data: &mut [u8]) {
        match &mut self.keystream {
            Keystream::Aes128(c) => c.apply_keystream(data),
            Keystream::Aes256(c) => c.apply_keystream(data),
        }
    }

    /// Returns the algorithm.
    pub fn algorithm(&self) -> CipherAlgorithm {
        self.algorithm
    }
}

/// MAC key with its running packet sequence number.
pub struct MacKey {
    algorithm: MacAlgorithm,
    key: Vec<u8>,
    sequence: u32,
}

impl std::fmt::Debug for MacKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MacKey")
            .field("algorithm", &self.algorithm)
            .field("key", &"<redacted>")
            .field("sequence", &self.sequence)
            .finish()
    }
}

impl MacKey {
    /// Creates a MAC key whose first packet carries `sequence`.
    pub fn new(algorithm: MacAlgorithm, key_material: &[u8], sequence: u32) -> Result<Self> {
        if key_material.len() < algorithm.key_size() {
            return Err(Error::KeyExchangeFailed(format!(
                "insufficient key material for MAC: expected {}, got {}",
                algorithm.key_size(),
                key_material.len()
            )));
        }

        Ok(Self {
            algorithm,
            key: key_material[..algorithm.key_size()].to_vec(),
            sequence,
        })
    }

    /// Computes the MAC over `sequence || packet` and advances the sequence.
    pub fn compute(&mut self, packet: &[u8]) -> Result<Vec<u8>> {
        let seq = self.sequence.to_be_bytes();
        let mac = match self.algorithm {
            MacAlgorithm::HmacSha256 => {
                let mut mac = Hmac::<Sha256>::new_from_slice(&self.key)
                    .map_err(|_| Error::KeyExchangeFailed("invalid HMAC key".to_string()))?;
                mac.update(&seq);
                mac.update(packet);
                mac.finalize().into_bytes().to_vec()
            }
            MacAlgorithm::HmacSha512 => {
                let mut mac = Hmac::<Sha512>::new_from_slice(&self.key)
                    .map_err(|_| Error::KeyExchangeFailed("invalid HMAC key".to_string()))?;
                mac.update(&seq);
                mac.update(packet);
                mac.finalize().into_bytes().to_vec()
            }
        };

        self.sequence = self.sequence.wrapping_add(1);
        Ok(mac)
    }

    /// Verifies a received MAC in constant time and advances the sequence.
    pub fn verify(&mut self, packet: &[u8], received: &[u8]) -> Result<()> {
        let computed = self.compute(packet)?;
        if computed.len() == received.len() && bool::from(computed.ct_eq(received)) {
            Ok(())
        } else {
            Err(Error::MacVerificationFailed)
        }
    }

    /// Sequence number of the next packet.
    pub fn sequence(&self) -> u32 {
        self.sequence
    }

    /// Returns the algorithm.
    pub fn algorithm(&self) -> MacAlgorithm {
        self.algorithm
    }
}

impl Drop for MacKey {
    fn drop(&mut self) {
        self.key.zeroize();
    }
}

fn direction_algorithms(
    selection: &AlgorithmSelection,
    direction: Direction,
) -> Result<(CipherAlgorithm, MacAlgorithm)> {
    let (cipher, mac) = match direction {
        Direction::ClientToServer => (
            &selection.encryption_client_to_server,
            &selection.mac_client_to_server,
        ),
        Direction::ServerToClient => (
            &selection.encryption_server_to_client,
            &selection.mac_server_to_client,
        ),
    };
    let cipher = CipherAlgorithm::from_name(cipher)
        .ok_or_else(|| Error::UnsupportedAlgorithm(cipher.to_string()))?;
    let mac =
        MacAlgorithm::from_name(mac).ok_or_else(|| Error::UnsupportedAlgorithm(mac.to_string()))?;
    Ok((cipher, mac))
}

/// Sending half of an active cipher.
#[derive(Debug)]
pub struct OutboundCipher {
    encryptor: StreamEncryptor,
    mac: MacKey,
}

impl OutboundCipher {
    /// Creates a sender from explicit key material.
    pub fn new(
        cipher: CipherAlgorithm,
        mac: MacAlgorithm,
        key: &[u8],
        iv: &[u8],
        mac_key: &[u8],
        sequence: u32,
    ) -> Result<Self> {
        Ok(Self {
            encryptor: StreamEncryptor::new(cipher, key, iv)?,
            mac: MacKey::new(mac, mac_key, sequence)?,
        })
    }

    /// Creates a sender for `direction` from derived session keys.
    pub fn from_session(
        keys: &SessionKeys,
        selection: &AlgorithmSelection,
        direction: Direction,
        sequence: u32,
    ) -> Result<Self> {
        let (cipher, mac) = direction_algorithms(selection, direction)?;
        Self::new(
            cipher,
            mac,
            keys.encryption_key(direction),
            keys.iv(direction),
            keys.mac_key(direction),
            sequence,
        )
    }

    /// Frames, authenticates and encrypts one payload.
    ///
    /// Returns the bytes to write: encrypted frame followed by the MAC.
    pub fn seal(&mut self, payload: Vec<u8>) -> Result<Vec<u8>> {
        let block_size = self.encryptor.algorithm().block_size();
        let packet = Packet::frame(payload, Vec::new(), block_size)?;

        let mut wire = packet.to_unauthenticated_bytes();
        let mac = self.mac.compute(&wire)?;
        self.encryptor.apply(&mut wire);
        wire.extend_from_slice(&mac);
        Ok(wire)
    }

    /// Sequence number the next packet will carry.
    pub fn sequence(&self) -> u32 {
        self.mac.sequence()
    }

    /// MAC length appended to every packet.
    pub fn mac_len(&self) -> usize {
        self.mac.algorithm().mac_size()
    }
}

/// Receiving half of an active cipher.
#[derive(Debug)]
pub struct InboundCipher {
    decryptor: StreamEncryptor,
    mac: MacKey,
}

impl InboundCipher {
    /// Creates a receiver from explicit key material.
    pub fn new(
        cipher: CipherAlgorithm,
        mac: MacAlgorithm,
        key: &[u8],
        iv: &[u8],
        mac_key: &[u8],
        sequence: u32,
    ) -> Result<Self> {
        Ok(Self {
            decryptor: StreamEncryptor::new(cipher, key, iv)?,
            mac: MacKey::new(mac, mac_key, sequence)?,
        })
    }

    /// Creates a receiver for `direction` from derived session keys.
    pub fn from_session(
        keys: &SessionKeys,
        selection: &AlgorithmSelection,
        direction: Direction,
        sequence: u32,
    ) -> Result<Self> {
        let (cipher, mac) = direction_algorithms(selection, direction)?;
        Self::new(
            cipher,
            mac,
            keys.encryption_key(direction),
            keys.iv(direction),
            keys.mac_key(direction),
            sequence,
        )
    }

    /// Reads, decrypts and verifies one packet.
    ///
    /// The first cipher block is decrypted alone to learn the packet length;
    /// the rest of the frame and the MAC follow.
    pub async fn open<R>(&mut self, reader: &mut R) -> Result<Packet>
    where
        R: AsyncRead + Unpin + ?Sized,
    {
        let block_size = self.decryptor.algorithm().block_size();

        let mut frame = vec![0u8; block_size];
        read_exact(reader, &mut frame).await?;
        self.decryptor.apply(&mut frame);

        let packet_length = u32::from_be_bytes([frame[0], frame[1], frame[2], frame[3]]);
        let total = 4 + packet_length as usize;
        if packet_length as usize > MAX_PACKET_SIZE
            || total < block_size
            || total % block_size != 0
        {
            return Err(Error::InvalidPacketLength(packet_length));
        }

        let mut rest = vec![0u8; total - block_size];
        read_exact(reader, &mut rest).await?;
        self.decryptor.apply(&mut rest);
        frame.extend_from_slice(&rest);

        let mut mac = vec![0u8; self.mac.algorithm().mac_size()];
        read_exact(reader, &mut mac).await?;
        self.mac.verify(&frame, &mac)?;

        let mut packet = Packet::from_bytes(&frame, 0)?;
        packet.set_mac(mac);
        Ok(packet)
    }

    /// Sequence number the next packet must carry.
    pub fn sequence(&self) -> u32 {
        self.mac.sequence()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pair(sequence: u32) -> (OutboundCipher, InboundCipher) {
        let key = [0x11u8; 16];
        let iv = [0x22u8; 16];
        let mac_key = [0x33u8; 32];
        let tx = OutboundCipher::new(
            CipherAlgorithm::Aes128Ctr,
            MacAlgorithm::HmacSha256,
            &key,
            &iv,
            &mac_key,
            sequence,
        )
        .unwrap();
        let rx = InboundCipher::new(
            CipherAlgorithm::Aes128Ctr,
            MacAlgorithm::HmacSha256,
            &key,
            &iv,
            &mac_key,
            sequence,
        )
        .unwrap();
        (tx, rx)
    }

    #[test]
    fn test_cipher_algorithm_properties() {
        let aes128 = CipherAlgorithm::Aes128Ctr;
        assert_eq!(aes128.name(), "aes128-ctr");
        assert_eq!(aes128.key_size(), 16);
        assert_eq!(aes128.iv_size(), 16);
        assert_eq!(aes128.block_size(), 16);

        assert_eq!(CipherAlgorithm::Aes256Ctr.key_size(), 32);
        assert_eq!(
            CipherAlgorithm::from_name("aes256-ctr"),
            Some(CipherAlgorithm::Aes256Ctr)
        );
        assert!(CipherAlgorithm::from_name("aes128-gcm@openssh.com").is_none());
    }

    #[test]
    fn test_mac_algorithm_properties() {
        assert_eq!(MacAlgorithm::HmacSha256.key_size(), 32);
        assert_eq!(MacAlgorithm::HmacSha512.mac_size(), 64);
        assert_eq!(
            MacAlgorithm::from_name("hmac-sha2-256"),
            Some(MacAlgorithm::HmacSha256)
        );
        assert!(MacAlgorithm::from_name("hmac-sha1").is_none());
    }

    #[test]
    fn test_mac_compute_and_verify() {
        let key = vec![0u8; 32];
        let mut sender = MacKey::new(MacAlgorithm::HmacSha256, &key, 0).unwrap();
        let mut receiver = MacKey::new(MacAlgorithm::HmacSha256, &key, 0).unwrap();

        let mac = sender.compute(b"Hello, SSH!").unwrap();
        assert_eq!(mac.len(), 32);
        assert!(receiver.verify(b"Hello, SSH!", &mac).is_ok());
        assert_eq!(sender.sequence(), 1);
        assert_eq!(receiver.sequence(), 1);

        // sequence 1 on the sender now; a replay of sequence 0 fails
        assert_eq!(
            receiver.verify(b"Hello, SSH!", &mac),
            Err(Error::MacVerificationFailed)
        );
    }

    #[test]
    fn test_mac_covers_sequence_number() {
        let key = vec![7u8; 32];
        let mut a = MacKey::new(MacAlgorithm::HmacSha256, &key, 3).unwrap();
        let mut b = MacKey::new(MacAlgorithm::HmacSha256, &key, 4).unwrap();
        assert_ne!(a.compute(b"data").unwrap(), b.compute(b"data").unwrap());

        let mut hmac = Hmac::<Sha256>::new_from_slice(&key).unwrap();
        hmac.update(&3u32.to_be_bytes());
        hmac.update(b"data");
        let mut c = MacKey::new(MacAlgorithm::HmacSha256, &key, 3).unwrap();
        assert_eq!(
            c.compute(b"data").unwrap(),
            hmac.finalize().into_bytes().to_vec()
        );
    }

    #[test]
    fn test_short_key_material_rejected() {
        assert!(MacKey::new(MacAlgorithm::HmacSha512, &[0u8; 32], 0).is_err());
        assert!(StreamEncryptor::new(CipherAlgorithm::Aes256Ctr, &[0u8; 16], &[0u8; 16]).is_err());
    }

    #[test]
    fn test_keystream_continuity() {
        let key = [5u8; 16];
        let iv = [6u8; 16];
        let mut whole = StreamEncryptor::new(CipherAlgorithm::Aes128Ctr, &key, &iv).unwrap();
        let mut split = StreamEncryptor::new(CipherAlgorithm::Aes128Ctr, &key, &iv).unwrap();

        let mut a = vec![0u8; 48];
        whole.apply(&mut a);

        let mut b1 = vec![0u8; 16];
        let mut b2 = vec![0u8; 32];
        split.apply(&mut b1);
        split.apply(&mut b2);
        b1.extend_from_slice(&b2);

        assert_eq!(a, b1);
    }

    #[test]
    fn test_seal_layout() {
        let (mut tx, _) = pair(3);
        let wire = tx.seal(vec![5, 1, 2, 3]).unwrap();
        assert_eq!((wire.len() - tx.mac_len()) % 16, 0);
        assert_eq!(tx.sequence(), 4);
    }

    #[tokio::test]
    async fn test_seal_open_sequence_of_packets() {
        let (mut tx, mut rx) = pair(3);

        let mut wire = Vec::new();
        for i in 0..5u8 {
            wire.extend_from_slice(&tx.seal(vec![94, i, i, i]).unwrap());
        }

        let mut reader = &wire[..];
        for i in 0..5u8 {
            let packet = rx.open(&mut reader).await.unwrap();
            assert_eq!(packet.payload(), &[94, i, i, i]);
        }
        assert!(reader.is_empty());
        assert_eq!(rx.sequence(), 8);
    }

    #[tokio::test]
    async fn test_open_detects_tampering() {
        let (mut tx, mut rx) = pair(0);
        let mut wire = tx.seal(b"payload".to_vec()).unwrap();
        wire[6] ^= 0x01;

        let mut reader = &wire[..];
        assert_eq!(
            rx.open(&mut reader).await.unwrap_err(),
            Error::MacVerificationFailed
        );
    }

    #[tokio::test]
    async fn test_open_wrong_sequence() {
        let (mut tx, _) = pair(3);
        let (_, mut rx) = pair(2);
        let wire = tx.seal(b"payload".to_vec()).unwrap();

        let mut reader = &wire[..];
        assert!(rx.open(&mut reader).await.is_err());
    }
}
