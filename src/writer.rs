//! Dedicated writer task: the single owner of the output stream.
//!
//! Every outbound message (responses, events, outbound requests) is
//! serialized and framed by the sender, then queued on an unbounded mpsc
//! channel. One writer task drains the queue and writes whole frames, so
//! frames never interleave and enqueue order is wire order.
//!
//! # Architecture
//!
//! ```text
//! Handler 1 ─┐
//! Handler 2 ─┼─► mpsc::UnboundedSender<OutboundFrame> ─► Writer Task ─► stdout
//! Handler N ─┘
//! ```
//!
//! Enqueueing never suspends, so handlers on blocking threads can send
//! without a runtime handle. Frames already queued are batched into a single
//! vectored write.

use std::io::IoSlice;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::codec::TextEncoding;
use crate::error::{HostError, Result};
use crate::protocol::{encode_header, Message};

/// Upper bound on frames gathered into one batch.
const MAX_BATCH_SIZE: usize = 64;

/// A frame ready to be written to the stream.
#[derive(Debug, Clone)]
pub struct OutboundFrame {
    /// Encoded header block, including the blank line.
    pub header: Bytes,
    /// Encoded content bytes.
    pub payload: Bytes,
}

impl OutboundFrame {
    /// Frame already encoded content bytes.
    pub fn new(payload: impl Into<Bytes>) -> Self {
        let payload = payload.into();
        Self {
            header: Bytes::from(encode_header(payload.len())),
            payload,
        }
    }

    /// Serialize, encode and frame a message.
    ///
    /// # Errors
    ///
    /// Returns [`HostError::Json`] if a payload cannot be serialized.
    pub fn from_message(message: &Message, encoding: TextEncoding) -> Result<Self> {
        let text = message.serialize()?;
        Ok(Self::new(encoding.encode(&text)))
    }

    /// Total size of this frame (header + payload).
    #[inline]
    pub fn size(&self) -> usize {
        self.header.len() + self.payload.len()
    }
}

/// Handle for queueing frames on the writer task.
///
/// Cheaply cloneable; every context object holds one.
#[derive(Clone)]
pub struct WriterHandle {
    /// Channel sender for frames.
    tx: mpsc::UnboundedSender<OutboundFrame>,
    /// Frames queued but not yet written.
    pending: Arc<AtomicUsize>,
    /// Content encoding applied by [`send_message`](Self::send_message).
    encoding: TextEncoding,
}

impl std::fmt::Debug for WriterHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WriterHandle")
            .field("pending", &self.pending_count())
            .field("encoding", &self.encoding)
            .field("closed", &self.is_closed())
            .finish()
    }
}

impl WriterHandle {
    fn new(
        tx: mpsc::UnboundedSender<OutboundFrame>,
        pending: Arc<AtomicUsize>,
        encoding: TextEncoding,
    ) -> Self {
        Self {
            tx,
            pending,
            encoding,
        }
    }

    /// Queue a framed message. Never suspends.
    ///
    /// # Errors
    ///
    /// - [`HostError::Json`] if the message cannot be serialized
    /// - [`HostError::ConnectionClosed`] if the writer task has stopped
    pub fn send_message(&self, message: &Message) -> Result<()> {
        let frame = OutboundFrame::from_message(message, self.encoding)?;
        self.send(frame)
    }

    /// Queue an already built frame. Never suspends.
    ///
    /// # Errors
    ///
    /// Returns [`HostError::ConnectionClosed`] if the writer task has stopped.
    pub fn send(&self, frame: OutboundFrame) -> Result<()> {
        // Counted before the send so the consumer never underflows it.
        self.pending.fetch_add(1, Ordering::AcqRel);

        self.tx.send(frame).map_err(|_| {
            self.pending.fetch_sub(1, Ordering::Release);
            HostError::ConnectionClosed
        })
    }

    /// Frames queued but not yet written.
    #[inline]
    pub fn pending_count(&self) -> usize {
        self.pending.load(Ordering::Acquire)
    }

    /// Whether the writer task has stopped receiving.
    #[inline]
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Spawn the writer task and return a handle for queueing frames.
///
/// The task runs until `cancel` fires (frames queued before that are still
/// written) or every handle is dropped. It then shuts the stream down.
///
/// The join handle resolves with the first write error, if any.
pub fn spawn_writer_task<W>(
    writer: W,
    encoding: TextEncoding,
    cancel: CancellationToken,
) -> (WriterHandle, JoinHandle<Result<()>>)
where
    W: AsyncWrite + Unpin + Send + 'static,
{
    let (tx, rx) = mpsc::unbounded_channel();
    let pending = Arc::new(AtomicUsize::new(0));

    let handle = WriterHandle::new(tx, pending.clone(), encoding);
    let task = tokio::spawn(writer_loop(rx, writer, pending, cancel));

    (handle, task)
}

/// Main writer loop - receives frames and writes them to the stream.
///
/// Frames go out whole and in queue order; each batch is one vectored write sequence.
async fn writer_loop<W>(
    mut rx: mpsc::UnboundedReceiver<OutboundFrame>,
    mut writer: W,
    pending: Arc<AtomicUsize>,
    cancel: CancellationToken,
) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    loop {
        // Queued frames win over cancellation.
        let first = tokio::select! {
            biased;
            frame = rx.recv() => match frame {
                Some(f) => f,
                None => break,
            },
            _ = cancel.cancelled() => break,
        };

        // Drain whatever else is already queued
        let mut batch = Vec::with_capacity(MAX_BATCH_SIZE);
        batch.push(first);

        while batch.len() < MAX_BATCH_SIZE {
            match rx.try_recv() {
                Ok(frame) => batch.push(frame),
                Err(_) => break,
            }
        }

        let batch_size = batch.len();
        let written = write_batch(&mut writer, &batch).await;
        pending.fetch_sub(batch_size, Ordering::Release);
        if let Err(e) = written {
            tracing::error!(error = %e, "writer task failed");
            // A broken output stream stops the whole host.
            cancel.cancel();
            return Err(e);
        }
    }

    rx.close();
    tracing::debug!("writer task stopping, closing output stream");
    writer.shutdown().await?;
    Ok(())
}

/// Write a batch of frames using scatter/gather I/O (write_vectored).
async fn write_batch<W>(writer: &mut W, batch: &[OutboundFrame]) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    if batch.is_empty() {
        return Ok(());
    }

    let total_size: usize = batch.iter().map(OutboundFrame::size).sum();
    let mut total_written = 0;

    while total_written < total_size {
        let slices = build_remaining_slices(batch, total_written);
        if slices.is_empty() {
            break;
        }

        let written = writer.write_vectored(&slices).await?;
        if written == 0 {
            return Err(HostError::Io(std::io::Error::new(
                std::io::ErrorKind::WriteZero,
                "write_vectored returned 0",
            )));
        }

        total_written += written;
    }

    writer.flush().await?;
    Ok(())
}

/// Build IoSlice array for the data after `skip_bytes` already written bytes.
fn build_remaining_slices(batch: &[OutboundFrame], skip_bytes: usize) -> Vec<IoSlice<'_>> {
    let mut slices = Vec::with_capacity(batch.len() * 2);
    let mut offset = 0;

    for frame in batch {
        for part in [&frame.header, &frame.payload] {
            let start = offset;
            let end = offset + part.len();

            if !part.is_empty() && skip_bytes < end {
                let start_in_part = skip_bytes.saturating_sub(start);
                slices.push(IoSlice::new(&part[start_in_part..]));
            }
            offset = end;
        }
    }

    slices
}
