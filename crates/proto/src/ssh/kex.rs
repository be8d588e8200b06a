//! Algorithm negotiation (RFC 4253 Section 7.1).
//!
//! This module implements:
//! - SSH_MSG_KEXINIT encoding and decoding
//! - SSH_MSG_NEWKEYS
//! - Client-preference algorithm negotiation
//!
//! # Key Exchange Flow
//!
//! 1. Both sides send SSH_MSG_KEXINIT
//! 2. Algorithm negotiation (first client preference the server supports)
//! 3. ECDH key exchange (see [`kex_dh`](crate::ssh::kex_dh))
//! 4. Both sides send SSH_MSG_NEWKEYS
//! 5. Switch to encrypted communication
//!
//! # Example
//!
//! ```rust
//! use sushi_proto::ssh::kex::{resolve_algorithms, KexAlgorithms, KexInit};
//!
//! let client = KexInit::with_random_cookie(KexAlgorithms::default());
//! let bytes = client.to_bytes();
//! let (server, raw) = KexInit::decode(&bytes).unwrap();
//! assert_eq!(raw, &client.to_bytes()[..]);
//!
//! let selection = resolve_algorithms(client.algorithms(), server.algorithms());
//! assert_eq!(selection.kex, "curve25519-sha256");
//! selection.require_negotiated().unwrap();
//! ```

use crate::ssh::error::{Error, Result};
use crate::ssh::message::MessageType;
use crate::ssh::wire::{put_namelist, NameList, WireReader};
use bytes::{BufMut, BytesMut};
use rand::RngCore;
use std::fmt;

/// Length of the KEXINIT cookie.
pub const COOKIE_LEN: usize = 16;

/// Smallest KEXINIT payload accepted from a peer.
pub const KEXINIT_MIN_LEN: usize = 106;

/// Key exchange method this client implements.
pub const KEX_CURVE25519_SHA256: &str = "curve25519-sha256";

/// Host key algorithm this client implements.
pub const HOST_KEY_ED25519: &str = "ssh-ed25519";

/// Default cipher.
pub const CIPHER_AES128_CTR: &str = "aes128-ctr";

/// Default MAC.
pub const MAC_HMAC_SHA256: &str = "hmac-sha2-256";

/// The only compression method.
pub const COMPRESSION_NONE: &str = "none";

/// The ten negotiated categories, in KEXINIT field order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AlgorithmCategory {
    /// kex_algorithms
    Kex,
    /// server_host_key_algorithms
    HostKey,
    /// encryption_algorithms_client_to_server
    EncryptionClientToServer,
    /// encryption_algorithms_server_to_client
    EncryptionServerToClient,
    /// mac_algorithms_client_to_server
    MacClientToServer,
    /// mac_algorithms_server_to_client
    MacServerToClient,
    /// compression_algorithms_client_to_server
    CompressionClientToServer,
    /// compression_algorithms_server_to_client
    CompressionServerToClient,
    /// languages_client_to_server
    LanguageClientToServer,
    /// languages_server_to_client
    LanguageServerToClient,
}

impl AlgorithmCategory {
    /// All categories in wire order.
    pub const ALL: [AlgorithmCategory; 10] = [
        AlgorithmCategory::Kex,
        AlgorithmCategory::HostKey,
        AlgorithmCategory::EncryptionClientToServer,
        AlgorithmCategory::EncryptionServerToClient,
        AlgorithmCategory::MacClientToServer,
        AlgorithmCategory::MacServerToClient,
        AlgorithmCategory::CompressionClientToServer,
        AlgorithmCategory::CompressionServerToClient,
        AlgorithmCategory::LanguageClientToServer,
        AlgorithmCategory::LanguageServerToClient,
    ];

    /// KEXINIT field name of the category.
    pub fn field_name(&self) -> &'static str {
        match self {
            AlgorithmCategory::Kex => "kex_algorithms",
            AlgorithmCategory::HostKey => "server_host_key_algorithms",
            AlgorithmCategory::EncryptionClientToServer => {
                "encryption_algorithms_client_to_server"
            }
            AlgorithmCategory::EncryptionServerToClient => {
                "encryption_algorithms_server_to_client"
            }
            AlgorithmCategory::MacClientToServer => "mac_algorithms_client_to_server",
            AlgorithmCategory::MacServerToClient => "mac_algorithms_server_to_client",
            AlgorithmCategory::CompressionClientToServer => {
                "compression_algorithms_client_to_server"
            }
            AlgorithmCategory::CompressionServerToClient => {
                "compression_algorithms_server_to_client"
            }
            AlgorithmCategory::LanguageClientToServer => "languages_client_to_server",
            AlgorithmCategory::LanguageServerToClient => "languages_server_to_client",
        }
    }

    /// Returns false for the language categories, which may stay empty.
    pub fn is_required(&self) -> bool {
        !matches!(
            self,
            AlgorithmCategory::LanguageClientToServer | AlgorithmCategory::LanguageServerToClient
        )
    }
}

impl fmt::Display for AlgorithmCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.field_name())
    }
}

/// Algorithm preference lists advertised in a KEXINIT.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KexAlgorithms {
    /// Key exchange algorithms
    pub kex: NameList,
    /// Server host key algorithms
    pub host_key: NameList,
    /// Encryption algorithms client to server
    pub encryption_client_to_server: NameList,
    /// Encryption algorithms server to client
    pub encryption_server_to_client: NameList,
    /// MAC algorithms client to server
    pub mac_client_to_server: NameList,
    /// MAC algorithms server to client
    pub mac_server_to_client: NameList,
    /// Compression algorithms client to server
    pub compression_client_to_server: NameList,
    /// Compression algorithms server to client
    pub compression_server_to_client: NameList,
    /// Languages client to server (usually empty)
    pub language_client_to_server: NameList,
    /// Languages server to client (usually empty)
    pub language_server_to_client: NameList,
}

impl KexAlgorithms {
    /// Returns the list for `category`.
    pub fn get(&self, category: AlgorithmCategory) -> &NameList {
        match category {
            AlgorithmCategory::Kex => &self.kex,
            AlgorithmCategory::HostKey => &self.host_key,
            AlgorithmCategory::EncryptionClientToServer => &self.encryption_client_to_server,
            AlgorithmCategory::EncryptionServerToClient => &self.encryption_server_to_client,
            AlgorithmCategory::MacClientToServer => &self.mac_client_to_server,
            AlgorithmCategory::MacServerToClient => &self.mac_server_to_client,
            AlgorithmCategory::CompressionClientToServer => &self.compression_client_to_server,
            AlgorithmCategory::CompressionServerToClient => &self.compression_server_to_client,
            AlgorithmCategory::LanguageClientToServer => &self.language_client_to_server,
            AlgorithmCategory::LanguageServerToClient => &self.language_server_to_client,
        }
    }

    fn from_reader(reader: &mut WireReader<'_>) -> Result<Self> {
        Ok(Self {
            kex: reader.read_namelist()?,
            host_key: reader.read_namelist()?,
            encryption_client_to_server: reader.read_namelist()?,
            encryption_server_to_client: reader.read_namelist()?,
            mac_client_to_server: reader.read_namelist()?,
            mac_server_to_client: reader.read_namelist()?,
            compression_client_to_server: reader.read_namelist()?,
            compression_server_to_client: reader.read_namelist()?,
            language_client_to_server: reader.read_namelist()?,
            language_server_to_client: reader.read_namelist()?,
        })
    }
}

impl Default for KexAlgorithms {
    /// The minimal set the handshake can run end to end.
    fn default() -> Self {
        Self {
            kex: NameList::single(KEX_CURVE25519_SHA256),
            host_key: NameList::single(HOST_KEY_ED25519),
            encryption_client_to_server: NameList::single(CIPHER_AES128_CTR),
            encryption_server_to_client: NameList::single(CIPHER_AES128_CTR),
            mac_client_to_server: NameList::single(MAC_HMAC_SHA256),
            mac_server_to_client: NameList::single(MAC_HMAC_SHA256),
            compression_client_to_server: NameList::single(COMPRESSION_NONE),
            compression_server_to_client: NameList::single(COMPRESSION_NONE),
            language_client_to_server: NameList::new(),
            language_server_to_client: NameList::new(),
        }
    }
}

/// SSH_MSG_KEXINIT message (RFC 4253 Section 7.1).
///
/// Immutable once built. The bytes that go into the exchange hash are the
/// ones produced by [`KexInit::to_bytes`] (our side) or returned by
/// [`KexInit::decode`] (peer side), never a re-encoding of a parsed record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KexInit {
    cookie: [u8; COOKIE_LEN],
    algorithms: KexAlgorithms,
    first_kex_packet_follows: bool,
    reserved: u32,
}

impl KexInit {
    /// Creates a KEXINIT with an explicit cookie.
    pub fn new(
        cookie: [u8; COOKIE_LEN],
        algorithms: KexAlgorithms,
        first_kex_packet_follows: bool,
    ) -> Self {
        Self {
            cookie,
            algorithms,
            first_kex_packet_follows,
            reserved: 0,
        }
    }

    /// Creates a KEXINIT with a cookie drawn from the thread CSPRNG.
    pub fn with_random_cookie(algorithms: KexAlgorithms) -> Self {
        let mut cookie = [0u8; COOKIE_LEN];
        rand::thread_rng().fill_bytes(&mut cookie);
        Self::new(cookie, algorithms, false)
    }

    /// Returns the cookie.
    pub fn cookie(&self) -> &[u8; COOKIE_LEN] {
        &self.cookie
    }

    /// Returns the advertised algorithm lists.
    pub fn algorithms(&self) -> &KexAlgorithms {
        &self.algorithms
    }

    /// Returns whether a guessed key exchange packet follows.
    pub fn first_kex_packet_follows(&self) -> bool {
        self.first_kex_packet_follows
    }

    /// Returns the reserved field (zero when built locally).
    pub fn reserved(&self) -> u32 {
        self.reserved
    }

    /// Serializes the KEXINIT message to payload bytes.
    ///
    /// Format (RFC 4253 Section 7.1):
    /// ```text
    /// byte         SSH_MSG_KEXINIT (20)
    /// byte[16]     cookie (random bytes)
    /// name-list    kex_algorithms
    /// name-list    server_host_key_algorithms
    /// name-list    encryption_algorithms_client_to_server
    /// name-list    encryption_algorithms_server_to_client
    /// name-list    mac_algorithms_client_to_server
    /// name-list    mac_algorithms_server_to_client
    /// name-list    compression_algorithms_client_to_server
    /// name-list    compression_algorithms_server_to_client
    /// name-list    languages_client_to_server
    /// name-list    languages_server_to_client
    /// boolean      first_kex_packet_follows
    /// uint32       0 (reserved for future extension)
    /// ```
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = BytesMut::with_capacity(256);

        buf.put_u8(MessageType::KexInit as u8);
        buf.put_slice(&self.cookie);

        for category in AlgorithmCategory::ALL {
            put_namelist(&mut buf, self.algorithms.get(category));
        }

        buf.put_u8(u8::from(self.first_kex_packet_follows));
        buf.put_u32(self.reserved);

        buf.to_vec()
    }

    /// Decodes a KEXINIT from the front of `data`.
    ///
    /// Returns the record together with the exact slice of `data` it was
    /// decoded from; that slice is what the exchange hash covers.
    ///
    /// # Errors
    ///
    /// - [`Error::UnexpectedMessage`] if the first byte is not 20
    /// - [`Error::TruncatedInput`] if `data` is shorter than
    ///   [`KEXINIT_MIN_LEN`] or a field runs past the end
    /// - [`Error::InvalidNameList`] if a name-list is not UTF-8
    pub fn decode(data: &[u8]) -> Result<(Self, &[u8])> {
        let mut reader = WireReader::new(data);

        let code = reader.read_u8()?;
        if code != MessageType::KexInit as u8 {
            return Err(Error::UnexpectedMessage {
                expected: MessageType::KexInit as u8,
                got: code,
            });
        }

        if data.len() < KEXINIT_MIN_LEN {
            return Err(Error::TruncatedInput {
                needed: KEXINIT_MIN_LEN,
                available: data.len(),
            });
        }

        let mut cookie = [0u8; COOKIE_LEN];
        cookie.copy_from_slice(reader.read_bytes(COOKIE_LEN)?);

        let algorithms = KexAlgorithms::from_reader(&mut reader)?;
        let first_kex_packet_follows = reader.read_bool()?;
        let reserved = reader.read_u32()?;

        let kexinit = Self {
            cookie,
            algorithms,
            first_kex_packet_follows,
            reserved,
        };
        Ok((kexinit, reader.consumed_bytes()))
    }

    /// Parses a KEXINIT, discarding the raw slice.
    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        Self::decode(data).map(|(kexinit, _)| kexinit)
    }
}

/// SSH_MSG_NEWKEYS message (RFC 4253 Section 7.3).
///
/// After both sides send it, packets use the negotiated cipher and MAC. The
/// packet sequence number is NOT reset.
///
/// ```rust
/// use sushi_proto::ssh::kex::NewKeys;
///
/// assert_eq!(NewKeys::new().to_bytes(), vec![21]);
/// assert!(NewKeys::from_bytes(&[21]).is_ok());
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct NewKeys;

impl NewKeys {
    /// Creates a new SSH_MSG_NEWKEYS message.
    pub const fn new() -> Self {
        Self
    }

    /// Serializes to the single byte 21.
    pub fn to_bytes(&self) -> Vec<u8> {
        vec![MessageType::NewKeys as u8]
    }

    /// Parses a NEWKEYS payload.
    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        match data.first() {
            None => Err(Error::TruncatedInput {
                needed: 1,
                available: 0,
            }),
            Some(&code) if code != MessageType::NewKeys as u8 => Err(Error::UnexpectedMessage {
                expected: MessageType::NewKeys as u8,
                got: code,
            }),
            Some(_) => Ok(Self),
        }
    }
}

/// Picks the first entry of `client` that also appears in `server`.
///
/// Client preference dominates: the server's ordering is never consulted,
/// which is exactly the RFC 4253 rule for every category this client
/// negotiates. Returns an empty string when the lists share nothing.
///
/// ```rust
/// use sushi_proto::ssh::kex::find_match;
/// use sushi_proto::ssh::wire::NameList;
///
/// let client = NameList::from_names(["a", "b"]).unwrap();
/// let server = NameList::from_names(["b", "a"]).unwrap();
/// assert_eq!(find_match(&client, &server), "a");
/// ```
pub fn find_match(client: &NameList, server: &NameList) -> String {
    client
        .names()
        .iter()
        .find(|name| server.contains(name))
        .cloned()
        .unwrap_or_default()
}

/// Negotiated algorithm per category. An empty name means no match.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AlgorithmSelection {
    /// Key exchange algorithm
    pub kex: String,
    /// Server host key algorithm
    pub host_key: String,
    /// Cipher client to server
    pub encryption_client_to_server: String,
    /// Cipher server to client
    pub encryption_server_to_client: String,
    /// MAC client to server
    pub mac_client_to_server: String,
    /// MAC server to client
    pub mac_server_to_client: String,
    /// Compression client to server
    pub compression_client_to_server: String,
    /// Compression server to client
    pub compression_server_to_client: String,
    /// Language client to server
    pub language_client_to_server: String,
    /// Language server to client
    pub language_server_to_client: String,
}

impl AlgorithmSelection {
    /// Returns the resolved name for `category`.
    pub fn get(&self, category: AlgorithmCategory) -> &str {
        match category {
            AlgorithmCategory::Kex => &self.kex,
            AlgorithmCategory::HostKey => &self.host_key,
            AlgorithmCategory::EncryptionClientToServer => &self.encryption_client_to_server,
            AlgorithmCategory::EncryptionServerToClient => &self.encryption_server_to_client,
            AlgorithmCategory::MacClientToServer => &self.mac_client_to_server,
            AlgorithmCategory::MacServerToClient => &self.mac_server_to_client,
            AlgorithmCategory::CompressionClientToServer => &self.compression_client_to_server,
            AlgorithmCategory::CompressionServerToClient => &self.compression_server_to_client,
            AlgorithmCategory::LanguageClientToServer => &self.language_client_to_server,
            AlgorithmCategory::LanguageServerToClient => &self.language_server_to_client,
        }
    }

    fn slot(&mut self, category: AlgorithmCategory) -> &mut String {
        match category {
            AlgorithmCategory::Kex => &mut self.kex,
            AlgorithmCategory::HostKey => &mut self.host_key,
            AlgorithmCategory::EncryptionClientToServer => &mut self.encryption_client_to_server,
            AlgorithmCategory::EncryptionServerToClient => &mut self.encryption_server_to_client,
            AlgorithmCategory::MacClientToServer => &mut self.mac_client_to_server,
            AlgorithmCategory::MacServerToClient => &mut self.mac_server_to_client,
            AlgorithmCategory::CompressionClientToServer => {
                &mut self.compression_client_to_server
            }
            AlgorithmCategory::CompressionServerToClient => {
                &mut self.compression_server_to_client
            }
            AlgorithmCategory::LanguageClientToServer => &mut self.language_client_to_server,
            AlgorithmCategory::LanguageServerToClient => &mut self.language_server_to_client,
        }
    }

    /// Fails with [`Error::AlgorithmNegotiationFailed`] for the first
    /// required category left empty.
    pub fn require_negotiated(&self) -> Result<()> {
        match AlgorithmCategory::ALL
            .into_iter()
            .find(|c| c.is_required() && self.get(*c).is_empty())
        {
            Some(category) => Err(Error::AlgorithmNegotiationFailed(category)),
            None => Ok(()),
        }
    }
}

/// Runs [`find_match`] over every category.
pub fn resolve_algorithms(client: &KexAlgorithms, server: &KexAlgorithms) -> AlgorithmSelection {
    let mut selection = AlgorithmSelection::default();
    for category in AlgorithmCategory::ALL {
        *selection.slot(category) = find_match(client.get(category), server.get(category));
    }
    selection
}

#[cfg(test)]
mod tests {
    use super::*;

    fn list(names: &[&str]) -> NameList {
        NameList::from_names(names.iter().copied()).unwrap()
    }

    fn broad_algorithms() -> KexAlgorithms {
        KexAlgorithms {
            kex: list(&["curve25519-sha256", "curve25519-sha256@libssh.org"]),
            host_key: list(&["ssh-ed25519", "rsa-sha2-512"]),
            encryption_client_to_server: list(&["aes256-ctr", "aes128-ctr"]),
            encryption_server_to_client: list(&["aes256-ctr", "aes128-ctr"]),
            mac_client_to_server: list(&["hmac-sha2-512", "hmac-sha2-256"]),
            mac_server_to_client: list(&["hmac-sha2-512", "hmac-sha2-256"]),
            compression_client_to_server: list(&["none", "zlib@openssh.com"]),
            compression_server_to_client: list(&["none"]),
            language_client_to_server: NameList::new(),
            language_server_to_client: NameList::new(),
        }
    }

    #[test]
    fn test_category_display() {
        assert_eq!(AlgorithmCategory::Kex.to_string(), "kex_algorithms");
        assert_eq!(
            AlgorithmCategory::MacServerToClient.to_string(),
            "mac_algorithms_server_to_client"
        );
        assert!(!AlgorithmCategory::LanguageClientToServer.is_required());
        assert!(AlgorithmCategory::CompressionServerToClient.is_required());
    }

    #[test]
    fn test_kexinit_default_algorithms() {
        let kexinit = KexInit::with_random_cookie(KexAlgorithms::default());
        assert_eq!(kexinit.cookie().len(), 16);
        assert!(kexinit.algorithms().kex.contains("curve25519-sha256"));
        assert!(kexinit.algorithms().host_key.contains("ssh-ed25519"));
        assert!(kexinit.algorithms().language_client_to_server.is_empty());
        assert!(!kexinit.first_kex_packet_follows());
    }

    #[test]
    fn test_kexinit_layout() {
        let kexinit = KexInit::new([0x11; 16], KexAlgorithms::default(), false);
        let bytes = kexinit.to_bytes();

        assert_eq!(bytes[0], 20);
        assert_eq!(&bytes[1..17], &[0x11; 16]);
        assert_eq!(&bytes[17..21], &17u32.to_be_bytes());
        assert_eq!(&bytes[21..38], b"curve25519-sha256");
        // trailing flag + reserved
        assert_eq!(&bytes[bytes.len() - 5..], &[0, 0, 0, 0, 0]);
    }

    #[test]
    fn test_kexinit_decode_returns_consumed_slice() {
        let kexinit = KexInit::new([7; 16], broad_algorithms(), true);
        let mut bytes = kexinit.to_bytes();
        let encoded_len = bytes.len();
        bytes.extend_from_slice(b"trailing");

        let (parsed, raw) = KexInit::decode(&bytes).unwrap();
        assert_eq!(parsed, kexinit);
        assert_eq!(raw.len(), encoded_len);
        assert_eq!(raw, &bytes[..encoded_len]);
    }

    #[test]
    fn test_kexinit_flag_and_reserved_decoded() {
        let kexinit = KexInit::new([0; 16], broad_algorithms(), true);
        let mut bytes = kexinit.to_bytes();
        let n = bytes.len();
        bytes[n - 4..].copy_from_slice(&0xdead_beefu32.to_be_bytes());

        let parsed = KexInit::from_bytes(&bytes).unwrap();
        assert!(parsed.first_kex_packet_follows());
        assert_eq!(parsed.reserved(), 0xdead_beef);
    }

    #[test]
    fn test_kexinit_too_short() {
        let mut data = vec![20];
        data.extend_from_slice(&[0u8; 60]);
        assert_eq!(
            KexInit::from_bytes(&data),
            Err(Error::TruncatedInput {
                needed: KEXINIT_MIN_LEN,
                available: 61
            })
        );
    }

    #[test]
    fn test_kexinit_wrong_code() {
        let mut bytes = KexInit::new([0; 16], broad_algorithms(), false).to_bytes();
        bytes[0] = 21;
        assert_eq!(
            KexInit::from_bytes(&bytes),
            Err(Error::UnexpectedMessage {
                expected: 20,
                got: 21
            })
        );
    }

    #[test]
    fn test_kexinit_truncated_namelist() {
        let mut data = vec![20];
        data.extend_from_slice(&[0u8; 16]);
        // first name-list claims 500 bytes
        data.extend_from_slice(&500u32.to_be_bytes());
        data.extend_from_slice(&[b'a'; 100]);
        assert!(matches!(
            KexInit::from_bytes(&data),
            Err(Error::TruncatedInput { .. })
        ));
    }

    #[test]
    fn test_find_match_client_preference() {
        assert_eq!(find_match(&list(&["a", "b"]), &list(&["b", "a"])), "a");
        assert_eq!(find_match(&list(&["x", "b"]), &list(&["a", "b"])), "b");
    }

    #[test]
    fn test_find_match_disjoint() {
        assert_eq!(find_match(&list(&["a"]), &list(&["b"])), "");
        assert_eq!(find_match(&NameList::new(), &list(&["b"])), "");
    }

    #[test]
    fn test_resolve_fixed_cookie_scenario() {
        let client = KexInit::new([0; 16], KexAlgorithms::default(), false);
        let server = KexInit::new([0; 16], KexAlgorithms::default(), false);

        let selection = resolve_algorithms(client.algorithms(), server.algorithms());
        assert_eq!(selection.kex, "curve25519-sha256");
        assert_eq!(selection.host_key, "ssh-ed25519");
        assert_eq!(selection.encryption_client_to_server, "aes128-ctr");
        assert_eq!(selection.mac_server_to_client, "hmac-sha2-256");
        assert_eq!(selection.compression_client_to_server, "none");
        assert_eq!(selection.language_client_to_server, "");
        assert!(selection.require_negotiated().is_ok());
    }

    #[test]
    fn test_resolve_against_broad_server() {
        let selection = resolve_algorithms(&KexAlgorithms::default(), &broad_algorithms());
        assert_eq!(selection.encryption_client_to_server, "aes128-ctr");
        assert_eq!(selection.mac_client_to_server, "hmac-sha2-256");
    }

    #[test]
    fn test_require_negotiated_reports_category() {
        let mut server = KexAlgorithms::default();
        server.mac_client_to_server = list(&["hmac-sha1"]);

        let selection = resolve_algorithms(&KexAlgorithms::default(), &server);
        assert_eq!(selection.mac_client_to_server, "");
        match selection.require_negotiated() {
            Err(Error::AlgorithmNegotiationFailed(category)) => {
                assert_eq!(category, AlgorithmCategory::MacClientToServer);
            }
            other => panic!("Expected negotiation failure, got {:?}", other),
        }
    }

    #[test]
    fn test_newkeys() {
        assert_eq!(NewKeys::new().to_bytes(), vec![21]);
        assert_eq!(NewKeys::from_bytes(&[21]), Ok(NewKeys));
        assert_eq!(
            NewKeys::from_bytes(&[20]),
            Err(Error::UnexpectedMessage {
                expected: 21,
                got: 20
            })
        );
        assert!(matches!(
            NewKeys::from_bytes(&[]),
            Err(Error::TruncatedInput { .. })
        ));
    }
}
