//! SSH transport layer state machine (RFC 4253).
//!
//! Tracks where the handshake is and carries unencrypted packets until
//! NEWKEYS.
//!
//! # Transport States
//!
//! 1. **VersionExchange** - Exchange SSH-2.0 identification strings
//! 2. **KexInit** - Send/receive SSH_MSG_KEXINIT
//! 3. **KeyExchange** - curve25519 ECDH
//! 4. **NewKeys** - Send/receive SSH_MSG_NEWKEYS
//! 5. **Encrypted** - Keys installed; the stream is handed to the cipher writer
//!
//! Rekeying is not supported, so `Encrypted` is terminal.
//!
//! # Example
//!
//! ```rust
//! use sushi_proto::ssh::transport::{State, StateMachine};
//!
//! let mut machine = StateMachine::new();
//! assert_eq!(machine.current(), &State::VersionExchange);
//! machine.transition(State::KexInit).unwrap();
//! assert!(machine.transition(State::Encrypted).is_err());
//! ```

use crate::ssh::error::{Error, Result};
use crate::ssh::message::{Disconnect, MessageType};
use crate::ssh::packet::Packet;
use crate::ssh::version::{read_identification, write_identification, Version};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tracing::{debug, trace};

/// Handshake state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    /// Identification strings are being exchanged.
    VersionExchange,

    /// KEXINIT messages are being exchanged.
    KexInit,

    /// ECDH init/reply in progress.
    KeyExchange,

    /// Waiting for both NEWKEYS.
    NewKeys,

    /// Keys are in use.
    Encrypted,
}

impl State {
    /// Returns true if `next` may directly follow `self`.
    pub fn can_transition(&self, next: State) -> bool {
        matches!(
            (self, next),
            (State::VersionExchange, State::KexInit)
                | (State::KexInit, State::KeyExchange)
                | (State::KeyExchange, State::NewKeys)
                | (State::NewKeys, State::Encrypted)
        ) || *self == next
    }
}

/// Ordered handshake progress.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateMachine {
    state: State,
}

impl StateMachine {
    /// Starts at [`State::VersionExchange`].
    pub fn new() -> Self {
        Self {
            state: State::VersionExchange,
        }
    }

    /// Current state.
    pub fn current(&self) -> &State {
        &self.state
    }

    /// Moves to `next`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidState`] if the transition skips or reverses a
    /// step (e.g. VersionExchange -> Encrypted).
    pub fn transition(&mut self, next: State) -> Result<()> {
        if !self.state.can_transition(next) {
            return Err(Error::InvalidState(format!(
                "invalid state transition: {:?} -> {:?}",
                self.state, next
            )));
        }

        trace!(from = ?self.state, to = ?next, "transport state");
        self.state = next;
        Ok(())
    }

    /// Fails unless the current state is `expected`.
    pub fn require(&self, expected: State) -> Result<()> {
        if self.state != expected {
            return Err(Error::InvalidState(format!(
                "expected state {:?}, currently {:?}",
                expected, self.state
            )));
        }
        Ok(())
    }
}

impl Default for StateMachine {
    fn default() -> Self {
        Self::new()
    }
}

/// Unencrypted packet transport used during the handshake.
///
/// Owns the stream and both sequence numbers. Every packet sent or received
/// counts, including skipped IGNORE/DEBUG messages, so the counters are
/// correct when the ciphers take over.
#[derive(Debug)]
pub struct Transport<S> {
    stream: S,
    machine: StateMachine,
    send_sequence: u32,
    recv_sequence: u32,
    read_timeout: Duration,
}

impl<S> Transport<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Wraps a freshly connected stream.
    pub fn new(stream: S, read_timeout: Duration) -> Self {
        Self {
            stream,
            machine: StateMachine::new(),
            send_sequence: 0,
            recv_sequence: 0,
            read_timeout,
        }
    }

    /// Current handshake state.
    pub fn state(&self) -> &State {
        self.machine.current()
    }

    /// Advances the state machine.
    pub fn transition(&mut self, next: State) -> Result<()> {
        self.machine.transition(next)
    }

    /// Sequence number of the next packet we send.
    pub fn send_sequence(&self) -> u32 {
        self.send_sequence
    }

    /// Sequence number of the next packet we receive.
    pub fn recv_sequence(&self) -> u32 {
        self.recv_sequence
    }

    /// Sends our identification and reads the peer's.
    ///
    /// Returns the peer version with its raw line (no CR LF). Moves to
    /// [`State::KexInit`].
    pub async fn exchange_versions(&mut self, ours: &Version) -> Result<(Version, String)> {
        self.machine.require(State::VersionExchange)?;

        write_identification(&mut self.stream, ours).await?;
        let peer = tokio::time::timeout(self.read_timeout, read_identification(&mut self.stream))
            .await
            .map_err(|_| Error::Timeout("identification"))??;

        self.machine.transition(State::KexInit)?;
        Ok(peer)
    }

    /// Frames and writes one payload.
    pub async fn send(&mut self, payload: Vec<u8>) -> Result<()> {
        let code = payload.first().copied();
        let bytes = Packet::new(payload)?.to_bytes();

        self.stream.write_all(&bytes).await?;
        self.stream.flush().await?;

        trace!(
            sequence = self.send_sequence,
            code,
            len = bytes.len(),
            "plain packet sent"
        );
        self.send_sequence = self.send_sequence.wrapping_add(1);
        Ok(())
    }

    /// Reads the next meaningful payload.
    ///
    /// IGNORE and DEBUG are skipped. DISCONNECT ends the handshake with
    /// [`Error::Disconnected`]. Each read is bounded by the read timeout.
    pub async fn recv(&mut self) -> Result<Vec<u8>> {
        loop {
            let packet = tokio::time::timeout(
                self.read_timeout,
                Packet::read_from(&mut self.stream, 0),
            )
            .await
            .map_err(|_| Error::Timeout("packet read"))??;

            let sequence = self.recv_sequence;
            self.recv_sequence = self.recv_sequence.wrapping_add(1);

            match packet.message_type().and_then(MessageType::from_u8) {
                Some(MessageType::Disconnect) => {
                    let disconnect = Disconnect::from_bytes(packet.payload())?;
                    debug!(
                        reason = disconnect.reason(),
                        description = disconnect.description(),
                        "peer disconnected"
                    );
                    return Err(disconnect.into_error());
                }
                Some(kind) if kind.is_skippable() => {
                    trace!(sequence, %kind, "skipping message");
                }
                _ => {
                    trace!(sequence, code = packet.message_type(), "plain packet received");
                    return Ok(packet.into_payload());
                }
            }
        }
    }

    /// Reads the next meaningful payload and checks its message code.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnexpectedMessage`] for any other code.
    pub async fn expect(&mut self, expected: MessageType) -> Result<Vec<u8>> {
        let payload = self.recv().await?;
        match payload.first() {
            Some(&code) if code == expected as u8 => Ok(payload),
            Some(&code) => Err(Error::UnexpectedMessage {
                expected: expected as u8,
                got: code,
            }),
            None => Err(Error::TruncatedInput {
                needed: 1,
                available: 0,
            }),
        }
    }

    /// Gives back the stream and both sequence numbers.
    pub fn into_parts(self) -> (S, u32, u32) {
        (self.stream, self.send_sequence, self.recv_sequence)
    }
}
