//! Handshake event hook.
//!
//! The handshake driver reports progress through a [`HandshakeObserver`] at
//! fixed points; negotiation and key derivation code never logs on its own.
//! [`TracingObserver`] turns the events into structured `tracing` records.
//!
//! # Log Levels
//!
//! - **INFO**: Version exchange, negotiated algorithms, keys ready
//! - **DEBUG**: KEXINIT contents, host key fingerprint
//! - **TRACE**: Exchange hash prefix
//!
//! Secrets (`K`, derived keys) are never passed to an observer method that
//! logs them.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use sushi_proto::ssh::{ClientConfig, TracingObserver};
//!
//! tracing_subscriber::fmt()
//!     .with_env_filter("sushi_proto::ssh=debug")
//!     .init();
//!
//! let config = ClientConfig::default().with_observer(Arc::new(TracingObserver));
//! ```

use crate::ssh::kex::{AlgorithmSelection, KexInit};
use crate::ssh::kex_dh::KexEcdhReply;
use crate::ssh::keys::ConnectionState;
use tracing::{debug, info, trace};

/// Receives handshake progress events. Every method defaults to a no-op.
pub trait HandshakeObserver: Send + Sync {
    /// Both identification strings are known.
    fn version_exchanged(&self, _client: &str, _server: &str) {}

    /// Our KEXINIT was written.
    fn kexinit_sent(&self, _kexinit: &KexInit) {}

    /// The server's KEXINIT was decoded.
    fn kexinit_received(&self, _kexinit: &KexInit) {}

    /// Algorithms were resolved (before the empty-name check).
    fn algorithms_resolved(&self, _selection: &AlgorithmSelection) {}

    /// SSH_MSG_KEX_ECDH_REPLY was parsed.
    fn reply_received(&self, _reply: &KexEcdhReply) {}

    /// Exchange hash and session keys are ready.
    fn keys_derived(&self, _state: &ConnectionState) {}
}

/// Observer that ignores everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopObserver;

impl HandshakeObserver for NoopObserver {}

/// Observer that emits `tracing` events.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingObserver;

impl HandshakeObserver for TracingObserver {
    fn version_exchanged(&self, client: &str, server: &str) {
        info!(client, server, "SSH version exchanged");
    }

    fn kexinit_sent(&self, kexinit: &KexInit) {
        log_kexinit("sent", kexinit);
    }

    fn kexinit_received(&self, kexinit: &KexInit) {
        log_kexinit("received", kexinit);
    }

    fn algorithms_resolved(&self, selection: &AlgorithmSelection) {
        info!(
            kex = %selection.kex,
            host_key = %selection.host_key,
            cipher_c2s = %selection.encryption_client_to_server,
            cipher_s2c = %selection.encryption_server_to_client,
            mac_c2s = %selection.mac_client_to_server,
            mac_s2c = %selection.mac_server_to_client,
            compression = %selection.compression_client_to_server,
            "Algorithms negotiated"
        );
    }

    fn reply_received(&self, reply: &KexEcdhReply) {
        debug!(
            host_key_type = reply.host_key_type(),
            fingerprint = %reply.host_key_fingerprint(),
            signature_type = reply.signature_type(),
            server_public = %hex::encode(reply.server_public()),
            "KEX_ECDH_REPLY received"
        );
    }

    fn keys_derived(&self, state: &ConnectionState) {
        trace!(
            exchange_hash = %hex::encode(&state.exchange_hash()[..8]),
            "Exchange hash computed"
        );
        info!(
            session_id_len = state.session_id().len(),
            cipher = %state.selection().encryption_client_to_server,
            mac = %state.selection().mac_client_to_server,
            "Session keys derived"
        );
    }
}

fn log_kexinit(direction: &str, kexinit: &KexInit) {
    let algorithms = kexinit.algorithms();
    debug!(
        direction,
        cookie = %hex::encode(kexinit.cookie()),
        kex = %algorithms.kex,
        host_key = %algorithms.host_key,
        cipher_c2s = %algorithms.encryption_client_to_server,
        mac_c2s = %algorithms.mac_client_to_server,
        first_kex_packet_follows = kexinit.first_kex_packet_follows(),
        "KEXINIT"
    );
}
