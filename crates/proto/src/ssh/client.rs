//! SSH client handshake driver.
//!
//! Runs the transport handshake over any `AsyncRead + AsyncWrite` stream:
//! version exchange, KEXINIT negotiation, curve25519 ECDH, key derivation and
//! NEWKEYS. The result is an [`EstablishedSession`] whose keys can start the
//! cipher writer.
//!
//! # Example
//!
//! ```rust,no_run
//! use sushi_proto::ssh::client::{self, ClientConfig};
//! use sushi_proto::ssh::message::ServiceRequest;
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let session = client::connect("127.0.0.1:22", &ClientConfig::default()).await?;
//! let active = session.start_writer()?;
//!
//! active.sender.send(ServiceRequest::new("ssh-userauth").to_bytes()).await?;
//! drop(active.sender);
//! active.writer.await??;
//! # Ok(())
//! # }
//! ```

use crate::ssh::crypto::{InboundCipher, OutboundCipher};
use crate::ssh::error::{Error, Result};
use crate::ssh::kex::{
    resolve_algorithms, AlgorithmCategory, AlgorithmSelection, KexAlgorithms, KexInit, NewKeys,
    COMPRESSION_NONE, HOST_KEY_ED25519, KEX_CURVE25519_SHA256,
};
use crate::ssh::kex_dh::{import_peer_public, Curve25519Exchange, KexEcdhInit, KexEcdhReply};
use crate::ssh::keys::{ConnectionState, Direction, KeySizes, KexTranscript};
use crate::ssh::message::MessageType;
use crate::ssh::observer::{HandshakeObserver, TracingObserver};
use crate::ssh::transport::{State, Transport};
use crate::ssh::version::Version;
use crate::ssh::writer::{CipherWriter, PacketSender, DEFAULT_QUEUE_CAPACITY};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite, ReadHalf, WriteHalf};
use tokio::net::TcpStream;
use tokio::task::JoinHandle;
use tracing::{debug, info};

/// Pre-standard name some servers still advertise for the same exchange.
const KEX_CURVE25519_SHA256_LIBSSH: &str = "curve25519-sha256@libssh.org";

/// SSH client configuration.
#[derive(Clone)]
pub struct ClientConfig {
    /// Identification we send.
    pub version: Version,
    /// Algorithm preference lists for our KEXINIT.
    pub algorithms: KexAlgorithms,
    /// TCP connect timeout.
    pub connect_timeout: Duration,
    /// Timeout for each handshake read.
    pub read_timeout: Duration,
    /// Capacity of the cipher writer queue.
    pub outbound_queue_capacity: usize,
    /// Check the server's ed25519 signature over the exchange hash.
    ///
    /// Off by default: the signature proves possession of the host key, but
    /// without a known-hosts check it does not authenticate the server.
    pub verify_host_signature: bool,
    /// Handshake event hook.
    pub observer: Arc<dyn HandshakeObserver>,
}

// Manual Debug implementation because the observer is a trait object
impl std::fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientConfig")
            .field("version", &self.version)
            .field("algorithms", &self.algorithms)
            .field("connect_timeout", &self.connect_timeout)
            .field("read_timeout", &self.read_timeout)
            .field("outbound_queue_capacity", &self.outbound_queue_capacity)
            .field("verify_host_signature", &self.verify_host_signature)
            .field("observer", &"<observer>")
            .finish()
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            version: Version::default(),
            algorithms: KexAlgorithms::default(),
            connect_timeout: Duration::from_secs(30),
            read_timeout: Duration::from_secs(60),
            outbound_queue_capacity: DEFAULT_QUEUE_CAPACITY,
            verify_host_signature: false,
            observer: Arc::new(TracingObserver),
        }
    }
}

impl ClientConfig {
    /// Sets the identification string.
    pub fn with_version(mut self, version: Version) -> Self {
        self.version = version;
        self
    }

    /// Sets the KEXINIT preference lists.
    pub fn with_algorithms(mut self, algorithms: KexAlgorithms) -> Self {
        self.algorithms = algorithms;
        self
    }

    /// Sets the TCP connect timeout.
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Sets the per-read handshake timeout.
    pub fn with_read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = timeout;
        self
    }

    /// Sets the cipher writer queue capacity.
    pub fn with_outbound_queue_capacity(mut self, capacity: usize) -> Self {
        self.outbound_queue_capacity = capacity;
        self
    }

    /// Enables or disables host signature verification.
    pub fn with_host_signature_verification(mut self, enabled: bool) -> Self {
        self.verify_host_signature = enabled;
        self
    }

    /// Replaces the handshake observer.
    pub fn with_observer(mut self, observer: Arc<dyn HandshakeObserver>) -> Self {
        self.observer = observer;
        self
    }

    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] for an empty required algorithm list, a zero
    /// queue capacity or a zero timeout.
    pub fn validate(&self) -> Result<()> {
        if let Some(category) = AlgorithmCategory::ALL
            .into_iter()
            .find(|c| c.is_required() && self.algorithms.get(*c).is_empty())
        {
            return Err(Error::Config(format!("{} must not be empty", category)));
        }

        if self.outbound_queue_capacity == 0 {
            return Err(Error::Config(
                "outbound_queue_capacity must be at least 1".to_string(),
            ));
        }

        if self.connect_timeout.is_zero() || self.read_timeout.is_zero() {
            return Err(Error::Config("timeouts must be non-zero".to_string()));
        }

        Ok(())
    }
}

/// A stream that finished the handshake, with its key material.
pub struct EstablishedSession<S> {
    stream: S,
    state: ConnectionState,
    server_version: Version,
    send_sequence: u32,
    recv_sequence: u32,
    queue_capacity: usize,
}

impl<S> std::fmt::Debug for EstablishedSession<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EstablishedSession")
            .field("server_version", &self.server_version)
            .field("selection", self.state.selection())
            .field("send_sequence", &self.send_sequence)
            .field("recv_sequence", &self.recv_sequence)
            .finish_non_exhaustive()
    }
}

/// Split stream with the ciphers running.
#[derive(Debug)]
pub struct ActiveSession<S> {
    /// Queue into the cipher writer.
    pub sender: PacketSender,
    /// Writer task; resolves to the write half once the queue is closed.
    pub writer: JoinHandle<Result<WriteHalf<S>>>,
    /// Read half of the stream.
    pub reader: ReadHalf<S>,
    /// Decrypts packets arriving on `reader`.
    pub inbound: InboundCipher,
    /// Key material of the exchange.
    pub state: ConnectionState,
}

impl<S> EstablishedSession<S> {
    /// Key material and negotiated algorithms.
    pub fn state(&self) -> &ConnectionState {
        &self.state
    }

    /// The server's identification.
    pub fn server_version(&self) -> &Version {
        &self.server_version
    }

    /// Sequence number our first encrypted packet carries.
    pub fn send_sequence(&self) -> u32 {
        self.send_sequence
    }

    /// Sequence number the server's first encrypted packet carries.
    pub fn recv_sequence(&self) -> u32 {
        self.recv_sequence
    }

    /// Gives back the raw stream and key material.
    pub fn into_parts(self) -> (S, ConnectionState) {
        (self.stream, self.state)
    }
}

impl<S> EstablishedSession<S>
where
    S: AsyncRead + AsyncWrite + Send + 'static,
{
    /// Splits the stream and spawns the cipher writer on the write half.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start_writer(self) -> Result<ActiveSession<S>> {
        let outbound = OutboundCipher::from_session(
            self.state.keys(),
            self.state.selection(),
            Direction::ClientToServer,
            self.send_sequence,
        )?;
        let inbound = InboundCipher::from_session(
            self.state.keys(),
            self.state.selection(),
            Direction::ServerToClient,
            self.recv_sequence,
        )?;

        let (reader, write_half) = tokio::io::split(self.stream);
        let (sender, writer) = CipherWriter::spawn(write_half, outbound, self.queue_capacity)?;

        Ok(ActiveSession {
            sender,
            writer,
            reader,
            inbound,
            state: self.state,
        })
    }
}

/// Connects over TCP and runs the handshake.
///
/// # Errors
///
/// [`Error::Timeout`] if the connection is not up within
/// `config.connect_timeout`, otherwise anything [`handshake`] returns.
pub async fn connect(addr: &str, config: &ClientConfig) -> Result<EstablishedSession<TcpStream>> {
    config.validate()?;

    let stream = tokio::time::timeout(config.connect_timeout, TcpStream::connect(addr))
        .await
        .map_err(|_| Error::Timeout("connect"))??;
    stream.set_nodelay(true)?;
    debug!(addr, "TCP connected");

    handshake(stream, config).await
}

/// Runs the client handshake on `stream`.
///
/// Either every step completes and the session is returned, or the first
/// failure is returned and the stream is dropped.
pub async fn handshake<S>(stream: S, config: &ClientConfig) -> Result<EstablishedSession<S>>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    config.validate()?;
    let observer = config.observer.as_ref();
    let mut transport = Transport::new(stream, config.read_timeout);

    // 1. Version exchange
    let (server_version, server_line) = transport.exchange_versions(&config.version).await?;
    let client_line = config.version.to_string();
    observer.version_exchanged(&client_line, &server_line);

    // 2. KEXINIT
    let client_kexinit = KexInit::with_random_cookie(config.algorithms.clone());
    let client_kexinit_bytes = client_kexinit.to_bytes();
    transport.send(client_kexinit_bytes.clone()).await?;
    observer.kexinit_sent(&client_kexinit);

    let payload = transport.expect(MessageType::KexInit).await?;
    let (server_kexinit, server_kexinit_bytes) = KexInit::decode(&payload)?;
    let server_kexinit_bytes = server_kexinit_bytes.to_vec();
    observer.kexinit_received(&server_kexinit);

    let selection = resolve_algorithms(client_kexinit.algorithms(), server_kexinit.algorithms());
    observer.algorithms_resolved(&selection);
    selection.require_negotiated()?;
    check_supported(&selection, config.verify_host_signature)?;
    transport.transition(State::KeyExchange)?;

    // 3. ECDH
    let exchange = Curve25519Exchange::generate()?;
    let client_public = exchange.public_key().to_vec();
    transport.send(KexEcdhInit::new(&client_public).to_bytes()).await?;

    let payload = transport.expect(MessageType::KexEcdhReply).await?;
    let reply = KexEcdhReply::from_bytes(&payload)?;
    observer.reply_received(&reply);

    let server_public = import_peer_public(reply.server_public())?;
    let shared_secret = exchange.compute_shared_secret(&server_public)?;

    // 4. Exchange hash and keys
    let transcript = KexTranscript {
        client_version: client_line.into_bytes(),
        server_version: server_line.into_bytes(),
        client_kexinit: client_kexinit_bytes,
        server_kexinit: server_kexinit_bytes,
        host_key_blob: reply.host_key_blob().to_vec(),
        client_public,
        server_public: reply.server_public().to_vec(),
    };
    let state = ConnectionState::establish(transcript, shared_secret, selection, None)?;

    if config.verify_host_signature {
        reply.verify_signature(state.exchange_hash())?;
        debug!(fingerprint = %reply.host_key_fingerprint(), "host signature verified");
    }
    observer.keys_derived(&state);
    transport.transition(State::NewKeys)?;

    // 5. NEWKEYS
    transport.send(NewKeys::new().to_bytes()).await?;
    let payload = transport.expect(MessageType::NewKeys).await?;
    NewKeys::from_bytes(&payload)?;
    transport.transition(State::Encrypted)?;

    let (stream, send_sequence, recv_sequence) = transport.into_parts();
    info!(
        server = %server_version,
        kex = %state.selection().kex,
        cipher = %state.selection().encryption_client_to_server,
        "SSH handshake complete"
    );

    Ok(EstablishedSession {
        stream,
        state,
        server_version,
        send_sequence,
        recv_sequence,
        queue_capacity: config.outbound_queue_capacity,
    })
}

fn check_supported(selection: &AlgorithmSelection, verify_host_signature: bool) -> Result<()> {
    if selection.kex != KEX_CURVE25519_SHA256 && selection.kex != KEX_CURVE25519_SHA256_LIBSSH {
        return Err(Error::UnsupportedAlgorithm(selection.kex.clone()));
    }

    if verify_host_signature && selection.host_key != HOST_KEY_ED25519 {
        return Err(Error::UnsupportedAlgorithm(selection.host_key.clone()));
    }

    for compression in [
        &selection.compression_client_to_server,
        &selection.compression_server_to_client,
    ] {
        if compression != COMPRESSION_NONE {
            return Err(Error::UnsupportedAlgorithm(compression.clone()));
        }
    }

    KeySizes::for_selection(selection).map(|_| ())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ssh::packet::Packet;
    use crate::ssh::wire::NameList;
    use tokio::io::AsyncWriteExt;

    #[test]
    fn test_config_default() {
        let config = ClientConfig::default();
        assert_eq!(config.connect_timeout, Duration::from_secs(30));
        assert_eq!(config.read_timeout, Duration::from_secs(60));
        assert_eq!(config.outbound_queue_capacity, 20);
        assert!(!config.verify_host_signature);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_builders() {
        let config = ClientConfig::default()
            .with_version(Version::new("Test_1.0", None))
            .with_connect_timeout(Duration::from_secs(5))
            .with_read_timeout(Duration::from_secs(7))
            .with_outbound_queue_capacity(3)
            .with_host_signature_verification(true)
            .with_observer(Arc::new(crate::ssh::observer::NoopObserver));

        assert_eq!(config.version.software(), "Test_1.0");
        assert_eq!(config.connect_timeout, Duration::from_secs(5));
        assert_eq!(config.read_timeout, Duration::from_secs(7));
        assert_eq!(config.outbound_queue_capacity, 3);
        assert!(config.verify_host_signature);

        let debug = format!("{:?}", config);
        assert!(debug.contains("<observer>"));
    }

    #[test]
    fn test_config_validate_errors() {
        let mut algorithms = KexAlgorithms::default();
        algorithms.mac_server_to_client = NameList::new();
        let config = ClientConfig::default().with_algorithms(algorithms);
        assert!(matches!(
            config.validate(),
            Err(Error::Config(msg)) if msg.contains("mac_algorithms_server_to_client")
        ));

        let config = ClientConfig::default().with_outbound_queue_capacity(0);
        assert!(matches!(config.validate(), Err(Error::Config(_))));

        let config = ClientConfig::default().with_read_timeout(Duration::ZERO);
        assert!(matches!(config.validate(), Err(Error::Config(_))));
    }

    #[test]
    fn test_check_supported() {
        let algorithms = KexAlgorithms::default();
        let mut selection = resolve_algorithms(&algorithms, &algorithms);
        assert!(check_supported(&selection, true).is_ok());

        selection.host_key = "rsa-sha2-256".to_string();
        assert!(check_supported(&selection, false).is_ok());
        assert_eq!(
            check_supported(&selection, true),
            Err(Error::UnsupportedAlgorithm("rsa-sha2-256".to_string()))
        );

        selection.kex = KEX_CURVE25519_SHA256_LIBSSH.to_string();
        assert!(check_supported(&selection, false).is_ok());
        selection.kex = "diffie-hellman-group14-sha256".to_string();
        assert!(check_supported(&selection, false).is_err());

        let mut selection = resolve_algorithms(&algorithms, &algorithms);
        selection.compression_server_to_client = "zlib".to_string();
        assert!(check_supported(&selection, false).is_err());

        let mut selection = resolve_algorithms(&algorithms, &algorithms);
        selection.encryption_client_to_server = "3des-cbc".to_string();
        assert!(check_supported(&selection, false).is_err());
    }

    #[tokio::test]
    async fn test_handshake_negotiation_failure() {
        let (client, mut server) = tokio::io::duplex(16 * 1024);

        let mut algorithms = KexAlgorithms::default();
        algorithms.kex = NameList::single("diffie-hellman-group14-sha256");
        let server_kexinit = KexInit::new([7; 16], algorithms, false);

        server.write_all(b"SSH-2.0-Scripted_1.0\r\n").await.unwrap();
        server
            .write_all(&Packet::new(server_kexinit.to_bytes()).unwrap().to_bytes())
            .await
            .unwrap();

        let config = ClientConfig::default().with_read_timeout(Duration::from_secs(5));
        let result = handshake(client, &config).await;
        assert!(matches!(
            result,
            Err(Error::AlgorithmNegotiationFailed(AlgorithmCategory::Kex))
        ));
    }

    #[tokio::test]
    async fn test_handshake_rejects_invalid_config() {
        let (client, _server) = tokio::io::duplex(1024);
        let config = ClientConfig::default().with_outbound_queue_capacity(0);
        assert!(matches!(
            handshake(client, &config).await,
            Err(Error::Config(_))
        ));
    }

    #[tokio::test]
    async fn test_handshake_bad_server_version() {
        let (client, mut server) = tokio::io::duplex(1024);
        server.write_all(b"SSH-1.5-Ancient\r\n").await.unwrap();
        assert!(matches!(
            handshake(client, &ClientConfig::default()).await,
            Err(Error::InvalidVersion(_))
        ));
    }
}
