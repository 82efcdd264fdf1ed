//! Stream framer.
//!
//! Turns an unbounded byte stream into discrete frames. Two framings share one
//! persistent, connection-scoped buffer:
//!
//! - [`FrameReader::read_until`]: everything up to and including a delimiter
//!   byte (requests and text responses, delimited by `\0`)
//! - [`FrameReader::read_exact`]: exactly `n` bytes (binary bodies that follow
//!   an agreed size field)
//!
//! A single transport read may return less than one frame or more than one
//! frame. Bytes past the current frame stay buffered for the next call, so
//! arbitrary segmentation never moves a frame boundary.
//!
//! # Memory
//!
//! The buffer starts empty, grows by [`FramerConfig::base_capacity`] per step
//! and never holds more than [`FramerConfig::max_size`] bytes. After a frame is
//! taken the buffer shrinks back towards the bytes it still holds, so an idle
//! connection that once received a large upload does not pin that memory.
//!
//! # Cancellation
//!
//! Both reads are cancel-safe. All partial progress lives in the buffer and
//! the only await point is a single `read_buf`, so dropping a pending read
//! future loses no bytes. The client relies on this to hand the inbound side
//! of a connection from one duty to another.

use bytes::{Bytes, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt};

use crate::errors::{ProtocolError, Result};

/// Buffer sizing for a [`FrameReader`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FramerConfig {
    /// Initial capacity and growth step in bytes
    pub base_capacity: usize,
    /// Hard maximum of buffered bytes; also the largest length-framed read
    pub max_size: usize,
}

impl FramerConfig {
    /// Default growth step (1 MiB)
    pub const DEFAULT_BASE_CAPACITY: usize = 1024 * 1024;

    /// Default hard maximum (100 MiB)
    pub const DEFAULT_MAX_SIZE: usize = 100 * 1024 * 1024;

    /// Create a config, clamping `base_capacity` to at least one byte and
    /// `max_size` to at least `base_capacity`.
    #[must_use]
    pub fn new(base_capacity: usize, max_size: usize) -> Self {
        let base_capacity = base_capacity.max(1);
        Self { base_capacity, max_size: max_size.max(base_capacity) }
    }
}

impl Default for FramerConfig {
    fn default() -> Self {
        Self::new(Self::DEFAULT_BASE_CAPACITY, Self::DEFAULT_MAX_SIZE)
    }
}

/// Framing reader over one connection's inbound byte stream.
///
/// Owns the stream's read side together with the bytes already read but not
/// yet handed out. Never share a `FrameReader` between unrelated connections.
#[derive(Debug)]
pub struct FrameReader<R> {
    inner: R,
    buf: BytesMut,
    config: FramerConfig,
}

impl<R> FrameReader<R>
where
    R: AsyncRead + Unpin,
{
    /// Wrap a stream with the default buffer sizing.
    pub fn new(inner: R) -> Self {
        Self::with_config(inner, FramerConfig::default())
    }

    /// Wrap a stream with explicit buffer sizing.
    pub fn with_config(inner: R, config: FramerConfig) -> Self {
        Self { inner, buf: BytesMut::new(), config }
    }

    /// Read up to and including the first `delimiter` byte.
    ///
    /// Blocks on the transport until a delimiter is buffered.
    ///
    /// # Errors
    ///
    /// - [`ProtocolError::FrameTooLarge`] if `max_size` bytes are buffered
    ///   without a delimiter. The buffer is discarded.
    /// - [`ProtocolError::EndOfStream`] on orderly close
    /// - [`ProtocolError::Transport`] on transport failure
    pub async fn read_until(&mut self, delimiter: u8) -> Result<Bytes> {
        let mut scanned = 0;

        loop {
            if let Some(offset) = self.buf[scanned..].iter().position(|&b| b == delimiter) {
                let frame = self.buf.split_to(scanned + offset + 1).freeze();
                self.shrink(frame.len());

                debug_assert_eq!(frame.last(), Some(&delimiter));
                return Ok(frame);
            }
            scanned = self.buf.len();

            if self.buf.len() >= self.config.max_size {
                self.discard();
                return Err(ProtocolError::FrameTooLarge { max: self.config.max_size });
            }

            self.fill().await?;
        }
    }

    /// Read exactly `len` bytes.
    ///
    /// Fails without touching the transport if `len` exceeds `max_size`.
    ///
    /// # Errors
    ///
    /// - [`ProtocolError::FrameTooLarge`] if `len > max_size`
    /// - [`ProtocolError::EndOfStream`] on orderly close before `len` bytes
    /// - [`ProtocolError::Transport`] on transport failure
    pub async fn read_exact(&mut self, len: usize) -> Result<Bytes> {
        if len > self.config.max_size {
            return Err(ProtocolError::FrameTooLarge { max: self.config.max_size });
        }

        if self.buf.capacity() < len {
            self.buf.reserve(len - self.buf.len());
        }

        while self.buf.len() < len {
            self.fill().await?;
        }

        let frame = self.buf.split_to(len).freeze();
        self.shrink(len);

        debug_assert_eq!(frame.len(), len);
        Ok(frame)
    }

    /// Wait until at least `len` bytes are buffered and return all buffered
    /// bytes without consuming any.
    ///
    /// # Errors
    ///
    /// Same as [`Self::read_exact`].
    pub async fn peek(&mut self, len: usize) -> Result<&[u8]> {
        if len > self.config.max_size {
            return Err(ProtocolError::FrameTooLarge { max: self.config.max_size });
        }

        while self.buf.len() < len {
            self.fill().await?;
        }
        Ok(&self.buf)
    }

    /// Bytes buffered but not yet returned.
    pub fn buffered(&self) -> &[u8] {
        &self.buf
    }

    /// Current buffer capacity.
    pub fn capacity(&self) -> usize {
        self.buf.capacity()
    }

    /// Buffer sizing in use.
    pub fn config(&self) -> FramerConfig {
        self.config
    }

    /// Underlying stream.
    pub fn get_ref(&self) -> &R {
        &self.inner
    }

    /// Underlying stream, mutably. Reading from it directly skips the buffer.
    pub fn get_mut(&mut self) -> &mut R {
        &mut self.inner
    }

    /// Perform one transport read into the tail of the buffer.
    async fn fill(&mut self) -> Result<()> {
        debug_assert!(self.buf.len() < self.config.max_size);

        let room = self.config.max_size - self.buf.len();
        if self.buf.capacity() == self.buf.len() {
            self.buf.reserve(room.min(self.config.base_capacity));
        }

        let read = (&mut self.inner).take(room as u64).read_buf(&mut self.buf).await;
        match read {
            Ok(0) => {
                self.discard();
                Err(ProtocolError::EndOfStream)
            },
            Ok(_) => Ok(()),
            Err(e) => {
                self.discard();
                Err(ProtocolError::Transport(e))
            },
        }
    }

    /// Reallocate down to the held bytes rounded up to the next base step.
    ///
    /// `consumed` is the length of the frame just split off the front. The
    /// split frame still shares the old allocation, so the allocation size is
    /// `consumed` plus the remaining capacity.
    fn shrink(&mut self, consumed: usize) {
        let base = self.config.base_capacity;
        let target = (self.buf.len() / base + 1) * base;

        if consumed + self.buf.capacity() > target + base {
            let mut fresh = BytesMut::with_capacity(target);
            fresh.extend_from_slice(&self.buf);
            self.buf = fresh;
        }
    }

    fn discard(&mut self) {
        self.buf = BytesMut::new();
    }
}
