//! Outbound cipher writer task.
//!
//! After NEWKEYS every packet the client sends goes through one background
//! task that owns the write half of the stream and the [`OutboundCipher`].
//! Callers enqueue payloads through a [`PacketSender`]; the task frames,
//! MACs, encrypts and writes them one at a time, in submission order.
//!
//! Dropping every [`PacketSender`] closes the queue. The task then drains
//! what is already queued, flushes, and its join handle resolves to the
//! write half.
//!
//! # Example
//!
//! ```rust,ignore
//! let (sender, handle) = CipherWriter::spawn(write_half, cipher, 20)?;
//! sender.send(ServiceRequest::new("ssh-userauth").to_bytes()).await?;
//! drop(sender);
//! let write_half = handle.await??;
//! ```

use crate::ssh::crypto::OutboundCipher;
use crate::ssh::error::{Error, Result};
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, trace, warn};

/// Default number of payloads that can wait in the queue.
pub const DEFAULT_QUEUE_CAPACITY: usize = 20;

/// Handle for submitting payloads to a running [`CipherWriter`].
#[derive(Debug, Clone)]
pub struct PacketSender {
    tx: mpsc::Sender<Vec<u8>>,
}

impl PacketSender {
    /// Enqueues one payload, waiting while the queue is full.
    ///
    /// # Errors
    ///
    /// Returns [`Error::WriterClosed`] once the worker has stopped.
    pub async fn send(&self, payload: Vec<u8>) -> Result<()> {
        self.tx.send(payload).await.map_err(|_| Error::WriterClosed)
    }

    /// Returns true if the worker is gone.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Background task that writes encrypted packets.
pub struct CipherWriter;

impl CipherWriter {
    /// Starts the worker on the current tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if `capacity` is zero.
    pub fn spawn<W>(
        writer: W,
        cipher: OutboundCipher,
        capacity: usize,
    ) -> Result<(PacketSender, JoinHandle<Result<W>>)>
    where
        W: AsyncWrite + Unpin + Send + 'static,
    {
        if capacity == 0 {
            return Err(Error::Config(
                "outbound queue capacity must be at least 1".to_string(),
            ));
        }

        let (tx, rx) = mpsc::channel(capacity);
        let handle = tokio::spawn(run(writer, cipher, rx));
        Ok((PacketSender { tx }, handle))
    }
}

async fn run<W>(
    mut writer: W,
    mut cipher: OutboundCipher,
    mut rx: mpsc::Receiver<Vec<u8>>,
) -> Result<W>
where
    W: AsyncWrite + Unpin,
{
    debug!(sequence = cipher.sequence(), "cipher writer started");
    let mut written = 0usize;

    while let Some(payload) = rx.recv().await {
        let sequence = cipher.sequence();
        let payload_len = payload.len();

        let wire = cipher.seal(payload)?;
        if let Err(e) = writer.write_all(&wire).await {
            warn!(sequence, error = %e, "cipher writer failed");
            return Err(e.into());
        }

        trace!(sequence, payload_len, wire_len = wire.len(), "packet written");
        written += 1;
    }

    writer.flush().await?;
    debug!(packets = written, "cipher writer drained");
    Ok(writer)
}
