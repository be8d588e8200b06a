//! Exchange hash and session key derivation (RFC 4253 Sections 7.2 and 8).
//!
//! # Exchange Hash
//!
//! ```text
//! H = SHA256(string V_C || string V_S || string I_C || string I_S ||
//!            string K_S || string Q_C || string Q_S || mpint K)
//! ```
//!
//! `I_C` and `I_S` are the KEXINIT payloads exactly as they crossed the wire.
//! `K_S` is the full host key blob from the reply.
//!
//! # Key Derivation
//!
//! ```text
//! Initial IV client to server:     HASH(K || H || "A" || session_id)
//! Initial IV server to client:     HASH(K || H || "B" || session_id)
//! Encryption key client to server: HASH(K || H || "C" || session_id)
//! Encryption key server to client: HASH(K || H || "D" || session_id)
//! Integrity key client to server:  HASH(K || H || "E" || session_id)
//! Integrity key server to client:  HASH(K || H || "F" || session_id)
//! ```
//!
//! Keys longer than one digest are extended with
//! `K(n) = HASH(K || H || K1 || ... || K(n-1))`.

use crate::ssh::crypto::{CipherAlgorithm, MacAlgorithm};
use crate::ssh::error::{Error, Result};
use crate::ssh::kex::AlgorithmSelection;
use crate::ssh::kex_dh::SharedSecret;
use crate::ssh::wire::{encode_mpint, put_mpint, put_string};
use bytes::BytesMut;
use sha2::{Digest, Sha256};
use std::fmt;
use zeroize::Zeroize;

/// Length of a SHA-256 exchange hash.
pub const EXCHANGE_HASH_LEN: usize = 32;

/// Exchange hash `H`.
pub type ExchangeHash = [u8; EXCHANGE_HASH_LEN];

/// Traffic direction a key is used for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    /// Client to server
    ClientToServer,
    /// Server to client
    ServerToClient,
}

/// Everything the exchange hash covers apart from `K`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KexTranscript {
    /// Client identification string, without CR LF
    pub client_version: Vec<u8>,
    /// Server identification string, without CR LF
    pub server_version: Vec<u8>,
    /// Client KEXINIT payload
    pub client_kexinit: Vec<u8>,
    /// Server KEXINIT payload
    pub server_kexinit: Vec<u8>,
    /// Server host key blob `K_S`
    pub host_key_blob: Vec<u8>,
    /// Client ephemeral public key `Q_C`
    pub client_public: Vec<u8>,
    /// Server ephemeral public key `Q_S`
    pub server_public: Vec<u8>,
}

/// Computes the exchange hash `H` over the transcript and shared secret.
pub fn compute_exchange_hash(
    shared_secret: &SharedSecret,
    transcript: &KexTranscript,
) -> ExchangeHash {
    let mut buf = BytesMut::new();
    put_string(&mut buf, &transcript.client_version);
    put_string(&mut buf, &transcript.server_version);
    put_string(&mut buf, &transcript.client_kexinit);
    put_string(&mut buf, &transcript.server_kexinit);
    put_string(&mut buf, &transcript.host_key_blob);
    put_string(&mut buf, &transcript.client_public);
    put_string(&mut buf, &transcript.server_public);
    put_mpint(&mut buf, shared_secret.as_bytes());

    let digest = Sha256::digest(&buf);
    buf[..].zeroize();

    let mut hash = [0u8; EXCHANGE_HASH_LEN];
    hash.copy_from_slice(&digest);
    hash
}

/// Derives one session key of exactly `length` bytes.
///
/// ```rust
/// use sushi_proto::ssh::keys::derive_key;
/// use sushi_proto::ssh::kex_dh::SharedSecret;
///
/// let k = SharedSecret::new(vec![0x42; 32]);
/// let key = derive_key(&k, &[1; 32], &[2; 32], b'C', 16);
/// assert_eq!(key.len(), 16);
/// ```
pub fn derive_key(
    shared_secret: &SharedSecret,
    exchange_hash: &[u8],
    session_id: &[u8],
    label: u8,
    length: usize,
) -> Vec<u8> {
    let mut k_mpint = encode_mpint(shared_secret.as_bytes());

    let mut hasher = Sha256::new();
    hasher.update(&k_mpint);
    hasher.update(exchange_hash);
    hasher.update([label]);
    hasher.update(session_id);
    let mut key = hasher.finalize_reset().to_vec();

    while key.len() < length {
        hasher.update(&k_mpint);
        hasher.update(exchange_hash);
        hasher.update(&key);
        let block = hasher.finalize_reset();
        key.extend_from_slice(&block);
    }

    k_mpint.zeroize();
    key.truncate(length);
    key
}

/// Byte lengths of the six derived keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeySizes {
    /// IV client to server
    pub iv_client_to_server: usize,
    /// IV server to client
    pub iv_server_to_client: usize,
    /// Encryption key client to server
    pub enc_client_to_server: usize,
    /// Encryption key server to client
    pub enc_server_to_client: usize,
    /// Integrity key client to server
    pub mac_client_to_server: usize,
    /// Integrity key server to client
    pub mac_server_to_client: usize,
}

impl KeySizes {
    /// Sizes required by the negotiated cipher and MAC names.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnsupportedAlgorithm`] for a name this crate has no
    /// implementation of.
    pub fn for_selection(selection: &AlgorithmSelection) -> Result<Self> {
        let cipher_c2s = cipher_named(&selection.encryption_client_to_server)?;
        let cipher_s2c = cipher_named(&selection.encryption_server_to_client)?;
        let mac_c2s = mac_named(&selection.mac_client_to_server)?;
        let mac_s2c = mac_named(&selection.mac_server_to_client)?;

        Ok(Self {
            iv_client_to_server: cipher_c2s.iv_size(),
            iv_server_to_client: cipher_s2c.iv_size(),
            enc_client_to_server: cipher_c2s.key_size(),
            enc_server_to_client: cipher_s2c.key_size(),
            mac_client_to_server: mac_c2s.key_size(),
            mac_server_to_client: mac_s2c.key_size(),
        })
    }
}

fn cipher_named(name: &str) -> Result<CipherAlgorithm> {
    CipherAlgorithm::from_name(name).ok_or_else(|| Error::UnsupportedAlgorithm(name.to_string()))
}

fn mac_named(name: &str) -> Result<MacAlgorithm> {
    MacAlgorithm::from_name(name).ok_or_else(|| Error::UnsupportedAlgorithm(name.to_string()))
}

/// The six derived keys, wiped on drop.
#[derive(Clone, PartialEq, Eq)]
pub struct SessionKeys {
    iv_client_to_server: Vec<u8>,
    iv_server_to_client: Vec<u8>,
    enc_client_to_server: Vec<u8>,
    enc_server_to_client: Vec<u8>,
    mac_client_to_server: Vec<u8>,
    mac_server_to_client: Vec<u8>,
}

impl SessionKeys {
    /// Derives all six keys with labels `A` through `F`.
    pub fn derive(
        shared_secret: &SharedSecret,
        exchange_hash: &[u8],
        session_id: &[u8],
        sizes: &KeySizes,
    ) -> Self {
        let derive = |label: u8, length: usize| {
            derive_key(shared_secret, exchange_hash, session_id, label, length)
        };

        Self {
            iv_client_to_server: derive(b'A', sizes.iv_client_to_server),
            iv_server_to_client: derive(b'B', sizes.iv_server_to_client),
            enc_client_to_server: derive(b'C', sizes.enc_client_to_server),
            enc_server_to_client: derive(b'D', sizes.enc_server_to_client),
            mac_client_to_server: derive(b'E', sizes.mac_client_to_server),
            mac_server_to_client: derive(b'F', sizes.mac_server_to_client),
        }
    }

    /// Initial IV for `direction`.
    pub fn iv(&self, direction: Direction) -> &[u8] {
        match direction {
            Direction::ClientToServer => &self.iv_client_to_server,
            Direction::ServerToClient => &self.iv_server_to_client,
        }
    }

    /// Encryption key for `direction`.
    pub fn encryption_key(&self, direction: Direction) -> &[u8] {
        match direction {
            Direction::ClientToServer => &self.enc_client_to_server,
            Direction::ServerToClient => &self.enc_server_to_client,
        }
    }

    /// Integrity key for `direction`.
    pub fn mac_key(&self, direction: Direction) -> &[u8] {
        match direction {
            Direction::ClientToServer => &self.mac_client_to_server,
            Direction::ServerToClient => &self.mac_server_to_client,
        }
    }
}

impl Drop for SessionKeys {
    fn drop(&mut self) {
        self.iv_client_to_server.zeroize();
        self.iv_server_to_client.zeroize();
        self.enc_client_to_server.zeroize();
        self.enc_server_to_client.zeroize();
        self.mac_client_to_server.zeroize();
        self.mac_server_to_client.zeroize();
    }
}

impl fmt::Debug for SessionKeys {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionKeys")
            .field("iv_client_to_server", &self.iv_client_to_server.len())
            .field("enc_client_to_server", &self.enc_client_to_server.len())
            .field("mac_client_to_server", &self.mac_client_to_server.len())
            .finish_non_exhaustive()
    }
}

/// Key material of one completed key exchange.
///
/// Holds the transcript, `K`, `H`, the session identifier and the derived
/// keys. The ephemeral private key is not here; it was consumed computing `K`.
#[derive(Debug)]
pub struct ConnectionState {
    transcript: KexTranscript,
    selection: AlgorithmSelection,
    shared_secret: SharedSecret,
    exchange_hash: ExchangeHash,
    session_id: Vec<u8>,
    keys: SessionKeys,
}

impl ConnectionState {
    /// Computes `H`, fixes the session identifier and derives the keys.
    ///
    /// `session_id` is the identifier from an earlier exchange on the same
    /// connection, if any; it is kept as is. Otherwise `H` becomes the
    /// session identifier.
    pub fn establish(
        transcript: KexTranscript,
        shared_secret: SharedSecret,
        selection: AlgorithmSelection,
        session_id: Option<Vec<u8>>,
    ) -> Result<Self> {
        let sizes = KeySizes::for_selection(&selection)?;
        let exchange_hash = compute_exchange_hash(&shared_secret, &transcript);
        let session_id = session_id.unwrap_or_else(|| exchange_hash.to_vec());
        let keys = SessionKeys::derive(&shared_secret, &exchange_hash, &session_id, &sizes);

        Ok(Self {
            transcript,
            selection,
            shared_secret,
            exchange_hash,
            session_id,
            keys,
        })
    }

    /// Hash inputs.
    pub fn transcript(&self) -> &KexTranscript {
        &self.transcript
    }

    /// Negotiated algorithms.
    pub fn selection(&self) -> &AlgorithmSelection {
        &self.selection
    }

    /// Shared secret `K`.
    pub fn shared_secret(&self) -> &SharedSecret {
        &self.shared_secret
    }

    /// Exchange hash `H`.
    pub fn exchange_hash(&self) -> &ExchangeHash {
        &self.exchange_hash
    }

    /// Session identifier.
    pub fn session_id(&self) -> &[u8] {
        &self.session_id
    }

    /// Derived keys.
    pub fn keys(&self) -> &SessionKeys {
        &self.keys
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ssh::kex::{resolve_algorithms, KexAlgorithms};

    fn transcript() -> KexTranscript {
        KexTranscript {
            client_version: b"SSH-2.0-Sushi_0.1.0".to_vec(),
            server_version: b"SSH-2.0-OpenSSH_9.6".to_vec(),
            client_kexinit: vec![20; 150],
            server_kexinit: vec![20; 300],
            host_key_blob: vec![0x0b; 51],
            client_public: vec![0x11; 32],
            server_public: vec![0x22; 32],
        }
    }

    fn secret() -> SharedSecret {
        SharedSecret::new(vec![0x42; 32])
    }

    fn default_selection() -> AlgorithmSelection {
        resolve_algorithms(&KexAlgorithms::default(), &KexAlgorithms::default())
    }

    #[test]
    fn test_exchange_hash_deterministic() {
        let h1 = compute_exchange_hash(&secret(), &transcript());
        let h2 = compute_exchange_hash(&secret(), &transcript());
        assert_eq!(h1, h2);
    }

    #[test]
    fn test_exchange_hash_matches_manual_layout() {
        let t = transcript();
        let k = secret();

        let mut hasher = Sha256::new();
        for field in [
            &t.client_version,
            &t.server_version,
            &t.client_kexinit,
            &t.server_kexinit,
            &t.host_key_blob,
            &t.client_public,
            &t.server_public,
        ] {
            hasher.update((field.len() as u32).to_be_bytes());
            hasher.update(field);
        }
        // 0x42 >= 0x10 so one zero byte is prepended
        hasher.update(33u32.to_be_bytes());
        hasher.update([0u8]);
        hasher.update(k.as_bytes());
        let expected = hasher.finalize();

        assert_eq!(&compute_exchange_hash(&k, &t)[..], &expected[..]);
    }

    #[test]
    fn test_exchange_hash_sensitive_to_every_input() {
        let base = compute_exchange_hash(&secret(), &transcript());

        let mutations: Vec<fn(&mut KexTranscript)> = vec![
            |t| t.client_version[0] ^= 1,
            |t| t.server_version[0] ^= 1,
            |t| t.client_kexinit[10] ^= 1,
            |t| t.server_kexinit[10] ^= 1,
            |t| t.host_key_blob[0] ^= 1,
            |t| t.client_public[31] ^= 1,
            |t| t.server_public[0] ^= 1,
        ];
        for mutate in mutations {
            let mut t = transcript();
            mutate(&mut t);
            assert_ne!(compute_exchange_hash(&secret(), &t), base);
        }

        let other = SharedSecret::new(vec![0x43; 32]);
        assert_ne!(compute_exchange_hash(&other, &transcript()), base);
    }

    #[test]
    fn test_derive_key_lengths() {
        let k = secret();
        for length in [0usize, 1, 16, 32, 33, 64, 100] {
            assert_eq!(derive_key(&k, &[1; 32], &[2; 32], b'C', length).len(), length);
        }
    }

    #[test]
    fn test_derive_key_first_block() {
        let k = secret();
        let h = [1u8; 32];
        let sid = [2u8; 32];

        let mut hasher = Sha256::new();
        hasher.update(encode_mpint(k.as_bytes()));
        hasher.update(h);
        hasher.update([b'A']);
        hasher.update(sid);
        let k1 = hasher.finalize();

        assert_eq!(derive_key(&k, &h, &sid, b'A', 16), &k1[..16]);
    }

    #[test]
    fn test_derive_key_extension_uses_all_previous_blocks() {
        let k = secret();
        let h = [1u8; 32];
        let sid = [2u8; 32];
        let long = derive_key(&k, &h, &sid, b'E', 96);

        let mut hasher = Sha256::new();
        hasher.update(encode_mpint(k.as_bytes()));
        hasher.update(h);
        hasher.update(&long[..64]);
        let k3 = hasher.finalize();

        assert_eq!(&long[64..96], &k3[..]);
        assert_eq!(&long[..32], &derive_key(&k, &h, &sid, b'E', 32)[..]);
    }

    #[test]
    fn test_labels_produce_distinct_keys() {
        let k = secret();
        let keys: Vec<Vec<u8>> = (b'A'..=b'F')
            .map(|label| derive_key(&k, &[1; 32], &[2; 32], label, 32))
            .collect();
        for i in 0..keys.len() {
            for j in i + 1..keys.len() {
                assert_ne!(keys[i], keys[j]);
            }
        }
    }

    #[test]
    fn test_key_sizes_minimal_set() {
        let sizes = KeySizes::for_selection(&default_selection()).unwrap();
        assert_eq!(sizes.iv_client_to_server, 16);
        assert_eq!(sizes.enc_client_to_server, 16);
        assert_eq!(sizes.mac_client_to_server, 32);
        assert_eq!(sizes.mac_server_to_client, 32);
    }

    #[test]
    fn test_key_sizes_wider_algorithms() {
        let mut selection = default_selection();
        selection.encryption_client_to_server = "aes256-ctr".into();
        selection.mac_server_to_client = "hmac-sha2-512".into();

        let sizes = KeySizes::for_selection(&selection).unwrap();
        assert_eq!(sizes.enc_client_to_server, 32);
        assert_eq!(sizes.enc_server_to_client, 16);
        assert_eq!(sizes.mac_server_to_client, 64);
    }

    #[test]
    fn test_key_sizes_unsupported() {
        let mut selection = default_selection();
        selection.encryption_server_to_client = "3des-cbc".into();
        assert_eq!(
            KeySizes::for_selection(&selection),
            Err(Error::UnsupportedAlgorithm("3des-cbc".into()))
        );
    }

    #[test]
    fn test_establish_sets_session_id_once() {
        let first = ConnectionState::establish(transcript(), secret(), default_selection(), None)
            .unwrap();
        assert_eq!(first.session_id(), &first.exchange_hash()[..]);

        let mut t = transcript();
        t.client_public[0] ^= 1;
        let second = ConnectionState::establish(
            t,
            secret(),
            default_selection(),
            Some(first.session_id().to_vec()),
        )
        .unwrap();
        assert_ne!(second.exchange_hash(), first.exchange_hash());
        assert_eq!(second.session_id(), first.session_id());
    }

    #[test]
    fn test_establish_derives_sized_keys() {
        let state =
            ConnectionState::establish(transcript(), secret(), default_selection(), None).unwrap();
        let keys = state.keys();
        assert_eq!(keys.iv(Direction::ClientToServer).len(), 16);
        assert_eq!(keys.encryption_key(Direction::ServerToClient).len(), 16);
        assert_eq!(keys.mac_key(Direction::ClientToServer).len(), 32);
        assert_ne!(
            keys.encryption_key(Direction::ClientToServer),
            keys.encryption_key(Direction::ServerToClient)
        );
    }

    #[test]
    fn test_session_keys_debug_redacted() {
        let state =
            ConnectionState::establish(transcript(), secret(), default_selection(), None).unwrap();
        let text = format!("{:?}", state.keys());
        assert!(!text.contains(&hex::encode(state.keys().mac_key(Direction::ClientToServer))));
    }
}
