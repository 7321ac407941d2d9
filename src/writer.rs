//! Dedicated writer task for the serial write half.
//!
//! Every frame goes through one bounded mpsc channel to a single task that
//! owns the write half, so callers never contend for the stream. Frames that
//! queue up while a write is in progress are coalesced into one write.
//!
//! ```text
//! Facade call ─┐
//! Heartbeat  ──┼─► mpsc::Sender<Bytes> ─► Writer Task ─► Serial port
//! Handshake  ──┘
//! ```
//!
//! Queued-but-unwritten frames are counted with semaphore credits. A sender
//! takes one credit per frame and the task hands them back once the frame is
//! on the wire, so a stalled port pushes back on callers instead of growing
//! the queue.

use std::sync::Arc;
use std::time::Duration;

use bytes::{Bytes, BytesMut};
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::{mpsc, Semaphore, SemaphorePermit, TryAcquireError};
use tokio::task::JoinHandle;
use tracing::{error, trace};

use crate::error::{CoconutError, Result};

/// Default maximum pending frames before backpressure kicks in.
pub const DEFAULT_MAX_PENDING_FRAMES: usize = 64;

/// Default channel capacity.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 64;

/// Default backpressure timeout.
pub const DEFAULT_BACKPRESSURE_TIMEOUT: Duration = Duration::from_secs(5);

/// Most frames coalesced into one write.
const MAX_BATCH_SIZE: usize = 32;

/// Configuration for the writer task.
#[derive(Debug, Clone)]
pub struct WriterConfig {
    /// Maximum pending frames before backpressure kicks in.
    pub max_pending_frames: usize,
    /// Channel capacity for the frame queue.
    pub channel_capacity: usize,
    /// Timeout when waiting for backpressure to clear.
    pub backpressure_timeout: Duration,
}

impl Default for WriterConfig {
    fn default() -> Self {
        Self {
            max_pending_frames: DEFAULT_MAX_PENDING_FRAMES,
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
            backpressure_timeout: DEFAULT_BACKPRESSURE_TIMEOUT,
        }
    }
}

/// Handle for queueing frames on the writer task.
#[derive(Clone)]
pub struct WriterHandle {
    tx: mpsc::Sender<Bytes>,
    credits: Arc<Semaphore>,
    max_pending: usize,
    timeout: Duration,
}

impl WriterHandle {
    /// Queue a frame, waiting up to the backpressure timeout for a credit.
    pub async fn send(&self, frame: Bytes) -> Result<()> {
        let credit = match self.credits.try_acquire() {
            Ok(credit) => credit,
            Err(TryAcquireError::Closed) => return Err(CoconutError::ConnectionClosed),
            Err(TryAcquireError::NoPermits) => self.wait_for_credit().await?,
        };

        self.tx
            .send(frame)
            .await
            .map_err(|_| CoconutError::ConnectionClosed)?;
        credit.forget();
        Ok(())
    }

    async fn wait_for_credit(&self) -> Result<SemaphorePermit<'_>> {
        if self.tx.is_closed() {
            return Err(CoconutError::ConnectionClosed);
        }
        trace!(pending = self.pending_count(), "Writer backpressure");
        match tokio::time::timeout(self.timeout, self.credits.acquire()).await {
            Ok(Ok(credit)) => Ok(credit),
            Ok(Err(_)) => Err(CoconutError::ConnectionClosed),
            Err(_) => Err(CoconutError::BackpressureTimeout),
        }
    }

    /// Queue a frame only if that needs no waiting.
    ///
    /// Fails with [`CoconutError::BackpressureTimeout`] when no credit or
    /// channel slot is free.
    pub fn try_send(&self, frame: Bytes) -> Result<()> {
        let credit = self.credits.try_acquire().map_err(|e| match e {
            TryAcquireError::NoPermits => CoconutError::BackpressureTimeout,
            TryAcquireError::Closed => CoconutError::ConnectionClosed,
        })?;
        self.tx.try_send(frame).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => CoconutError::BackpressureTimeout,
            mpsc::error::TrySendError::Closed(_) => CoconutError::ConnectionClosed,
        })?;
        credit.forget();
        Ok(())
    }

    /// Frames queued but not yet written.
    pub fn pending_count(&self) -> usize {
        self.max_pending
            .saturating_sub(self.credits.available_permits())
    }

    /// Check if the writer task has stopped.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Spawn the writer task and return a handle for queueing frames.
///
/// The task ends cleanly once every handle is dropped, or with an error if
/// the stream fails.
pub fn spawn_writer_task<W>(writer: W, config: WriterConfig) -> (WriterHandle, JoinHandle<Result<()>>)
where
    W: AsyncWrite + Unpin + Send + 'static,
{
    let max_pending = config.max_pending_frames.max(1);
    let (tx, rx) = mpsc::channel(config.channel_capacity.max(1));
    let credits = Arc::new(Semaphore::new(max_pending));

    let handle = WriterHandle {
        tx,
        credits: credits.clone(),
        max_pending,
        timeout: config.backpressure_timeout,
    };
    let task = tokio::spawn(writer_loop(rx, writer, credits));

    (handle, task)
}

async fn writer_loop<W>(mut rx: mpsc::Receiver<Bytes>, mut writer: W, credits: Arc<Semaphore>) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    let result = drain(&mut rx, &mut writer, &credits).await;
    credits.close();
    if let Err(e) = &result {
        error!("Writer task stopped: {}", e);
    }
    result
}

async fn drain<W>(rx: &mut mpsc::Receiver<Bytes>, writer: &mut W, credits: &Semaphore) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    let mut batch = Vec::with_capacity(MAX_BATCH_SIZE);
    let mut out = BytesMut::new();

    loop {
        let count = rx.recv_many(&mut batch, MAX_BATCH_SIZE).await;
        if count == 0 {
            break;
        }

        out.clear();
        for frame in batch.drain(..) {
            trace!(frame = ?&frame[..], "TX");
            out.extend_from_slice(&frame);
        }

        let result = write_frames(writer, &out).await;
        credits.add_permits(count);
        result?;
    }

    Ok(())
}

/// Write coalesced frames, then flush.
async fn write_frames<W>(writer: &mut W, bytes: &[u8]) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    if bytes.is_empty() {
        return Ok(());
    }
    writer.write_all(bytes).await?;
    writer.flush().await?;
    Ok(())
}
