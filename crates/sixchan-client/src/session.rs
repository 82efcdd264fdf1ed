//! Shared connection state.
//!
//! One [`Session`] is shared by every duty of a connected client. The stream
//! is split into two exclusion domains so that duties never interleave bytes:
//!
//! - **outbound**: every request write, taken with [`Session::send`] or
//!   [`Session::outbound`]
//! - **inbound**: every response read, behind an [`InboundGate`]
//!
//! When a duty needs both, it takes outbound first. A download holds outbound
//! for the whole exchange, so no sync request can slip in between its request
//! and its reply.

use std::{
    ops::{Deref, DerefMut},
    pin::pin,
    sync::atomic::{AtomicBool, AtomicI64, AtomicUsize, Ordering},
};

use bytes::Bytes;
use sixchan_proto::{DELIMITER, FrameReader, MessageId, ProtocolError};
use tokio::{
    io::{AsyncRead, AsyncWrite, AsyncWriteExt},
    sync::{Mutex, MutexGuard, Notify},
};

use crate::{error::ClientError, render::Renderer};

/// Last message id this client has seen.
///
/// Starts at "no messages yet" and only moves forward.
#[derive(Debug)]
pub struct SyncCursor(AtomicI64);

impl SyncCursor {
    const NONE: i64 = -1;

    /// Cursor that has seen nothing.
    pub fn new() -> Self {
        Self(AtomicI64::new(Self::NONE))
    }

    /// Current position, `None` before the first message.
    pub fn get(&self) -> Option<MessageId> {
        let value = self.0.load(Ordering::Acquire);
        (value != Self::NONE).then_some(value as MessageId)
    }

    /// Move past `id`. Returns false if `id` was already seen.
    pub fn advance(&self, id: MessageId) -> bool {
        let id = i64::from(id);
        self.0.fetch_max(id, Ordering::AcqRel) < id
    }
}

impl Default for SyncCursor {
    fn default() -> Self {
        Self::new()
    }
}

/// One-shot stop flag with a wakeup for waiters.
#[derive(Debug, Default)]
pub struct StopSignal {
    raised: AtomicBool,
    notify: Notify,
}

impl StopSignal {
    /// New, unraised signal.
    pub fn new() -> Self {
        Self::default()
    }

    /// Raise the signal. Returns true for the caller that raised it first.
    pub fn raise(&self) -> bool {
        let first = !self.raised.swap(true, Ordering::AcqRel);
        if first {
            self.notify.notify_waiters();
        }
        first
    }

    /// Whether the signal has been raised.
    pub fn is_raised(&self) -> bool {
        self.raised.load(Ordering::Acquire)
    }

    /// Wait until the signal is raised.
    pub async fn wait(&self) {
        loop {
            let mut notified = pin!(self.notify.notified());
            notified.as_mut().enable();
            if self.is_raised() {
                return;
            }
            notified.await;
        }
    }
}

/// Inbound exclusion domain.
///
/// The receive duty reads frames through [`InboundGate::next_frame`] and
/// steps aside whenever another duty [claims](InboundGate::claim) the reader.
/// Reads are cancel-safe, so a frame half-read when the claim arrives stays
/// buffered for whoever reads next.
pub struct InboundGate<R> {
    reader: Mutex<FrameReader<R>>,
    claims: AtomicUsize,
    claimed: Notify,
    released: Notify,
}

impl<R> InboundGate<R>
where
    R: AsyncRead + Unpin,
{
    /// Gate around `reader`.
    pub fn new(reader: FrameReader<R>) -> Self {
        Self {
            reader: Mutex::new(reader),
            claims: AtomicUsize::new(0),
            claimed: Notify::new(),
            released: Notify::new(),
        }
    }

    /// Take exclusive use of the reader, preempting a parked
    /// [`next_frame`](Self::next_frame).
    pub async fn claim(&self) -> InboundClaim<'_, R> {
        self.claims.fetch_add(1, Ordering::AcqRel);
        self.claimed.notify_waiters();
        let reader = self.reader.lock().await;
        InboundClaim { gate: self, reader }
    }

    /// Read the next frame unless a claim is pending.
    pub async fn next_frame(&self) -> Result<Bytes, ProtocolError> {
        loop {
            let mut claimed = pin!(self.claimed.notified());
            claimed.as_mut().enable();

            if self.claims.load(Ordering::Acquire) > 0 {
                let mut released = pin!(self.released.notified());
                released.as_mut().enable();
                if self.claims.load(Ordering::Acquire) > 0 {
                    released.await;
                }
                continue;
            }

            let mut reader = self.reader.lock().await;
            tokio::select! {
                biased;
                () = &mut claimed => {},
                frame = reader.read_until(DELIMITER) => return frame,
            }
        }
    }
}

/// Exclusive use of the inbound reader, released on drop.
pub struct InboundClaim<'a, R> {
    gate: &'a InboundGate<R>,
    reader: MutexGuard<'a, FrameReader<R>>,
}

impl<R> Deref for InboundClaim<'_, R> {
    type Target = FrameReader<R>;

    fn deref(&self) -> &Self::Target {
        &self.reader
    }
}

impl<R> DerefMut for InboundClaim<'_, R> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.reader
    }
}

impl<R> Drop for InboundClaim<'_, R> {
    fn drop(&mut self) {
        if self.gate.claims.fetch_sub(1, Ordering::AcqRel) == 1 {
            self.gate.released.notify_waiters();
        }
    }
}

/// Connection state shared by all duties.
pub struct Session<R, W> {
    outbound: Mutex<W>,
    inbound: InboundGate<R>,
    cursor: SyncCursor,
    stop: StopSignal,
    renderer: Renderer,
}

impl<R, W> Session<R, W>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    /// Session over an already-connected stream pair.
    pub fn new(reader: FrameReader<R>, writer: W, renderer: Renderer) -> Self {
        Self {
            outbound: Mutex::new(writer),
            inbound: InboundGate::new(reader),
            cursor: SyncCursor::new(),
            stop: StopSignal::new(),
            renderer,
        }
    }

    /// Write one encoded request under the outbound domain.
    pub async fn send(&self, request: &[u8]) -> Result<(), ClientError> {
        let mut writer = self.outbound.lock().await;
        write_request(&mut *writer, request).await
    }

    /// Hold the outbound domain.
    pub async fn outbound(&self) -> MutexGuard<'_, W> {
        self.outbound.lock().await
    }

    /// Inbound domain.
    pub fn inbound(&self) -> &InboundGate<R> {
        &self.inbound
    }

    /// Sync cursor.
    pub fn cursor(&self) -> &SyncCursor {
        &self.cursor
    }

    /// Stop signal.
    pub fn stop(&self) -> &StopSignal {
        &self.stop
    }

    /// Console renderer.
    pub fn renderer(&self) -> &Renderer {
        &self.renderer
    }

    /// Render one response frame and track its id.
    pub fn show_frame(&self, frame: &[u8]) {
        self.renderer.frame(frame, &self.cursor);
    }
}

/// Write `request` in full and flush.
pub async fn write_request<W>(writer: &mut W, request: &[u8]) -> Result<(), ClientError>
where
    W: AsyncWrite + Unpin,
{
    writer.write_all(request).await?;
    writer.flush().await?;
    Ok(())
}
