//! Download response header.
//!
//! A download reply is not a delimited line. It is a fixed 8-byte header
//! followed by the raw payload:
//!
//! ```text
//! 00 00 00 FF | size (u32 LE) | size bytes
//! ```
//!
//! An unknown id, or an entry with an empty payload, is answered with
//! [`DownloadHeader::INVALID_SIZE`] and no body.

use bytes::Bytes;
use tokio::io::AsyncRead;
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};

use crate::{
    DELIMITER,
    errors::{ProtocolError, Result},
    framer::FrameReader,
};

/// Fixed 8-byte download header.
///
/// Fields are raw byte arrays so every bit pattern is a valid header and the
/// struct can be cast straight from the wire.
#[repr(C, packed)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, FromBytes, IntoBytes, KnownLayout, Immutable)]
pub struct DownloadHeader {
    magic: [u8; 4],
    size: [u8; 4],
}

impl DownloadHeader {
    /// Serialized size.
    pub const SIZE: usize = 8;

    /// Leading sentinel bytes.
    pub const MAGIC: [u8; 4] = [0x00, 0x00, 0x00, 0xFF];

    /// Size value meaning "nothing to download".
    pub const INVALID_SIZE: u32 = u32::MAX;

    /// Header announcing `size` bytes of content.
    pub fn found(size: u32) -> Self {
        Self { magic: Self::MAGIC, size: size.to_le_bytes() }
    }

    /// Header for a missing or empty entry.
    pub fn not_found() -> Self {
        Self::found(Self::INVALID_SIZE)
    }

    /// Parse a header from the start of `bytes`.
    ///
    /// # Errors
    ///
    /// [`ProtocolError::Malformed`] if `bytes` is short or does not start with
    /// [`Self::MAGIC`].
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let (header, _) = Self::read_from_prefix(bytes).map_err(|_| {
            ProtocolError::Malformed(format!(
                "download header needs {} bytes, got {}",
                Self::SIZE,
                bytes.len()
            ))
        })?;

        if header.magic != Self::MAGIC {
            return Err(ProtocolError::Malformed("bad download header magic".to_string()));
        }
        Ok(header)
    }

    /// Announced size, `None` for [`Self::INVALID_SIZE`].
    pub fn size(&self) -> Option<u32> {
        let size = u32::from_le_bytes(self.size);
        (size != Self::INVALID_SIZE).then_some(size)
    }
}

/// Read one download reply.
///
/// Response lines still in flight ahead of the header (the tail of a sync
/// batch, an upload reply) are handed to `on_line` in order, delimiter
/// included. No server line starts with the header sentinel, so the header is
/// recognised at any frame boundary. Returns `None` when the server had
/// nothing to send.
///
/// # Errors
///
/// - [`ProtocolError::FrameTooLarge`] if the announced size is above the
///   reader's maximum
/// - any framer error
pub async fn read_download<R, F>(
    reader: &mut FrameReader<R>,
    mut on_line: F,
) -> Result<Option<Bytes>>
where
    R: AsyncRead + Unpin,
    F: FnMut(Bytes),
{
    while !reader.peek(DownloadHeader::MAGIC.len()).await?.starts_with(&DownloadHeader::MAGIC) {
        on_line(reader.read_until(DELIMITER).await?);
    }

    let raw = reader.read_exact(DownloadHeader::SIZE).await?;
    match DownloadHeader::from_bytes(&raw)?.size() {
        None => Ok(None),
        Some(size) => reader.read_exact(size as usize).await.map(Some),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::FramerConfig;

    #[test]
    fn layout() {
        assert_eq!(size_of::<DownloadHeader>(), DownloadHeader::SIZE);
        assert_eq!(DownloadHeader::found(5).as_bytes(), &[0, 0, 0, 0xFF, 5, 0, 0, 0][..]);
        let missing = DownloadHeader::not_found();
        assert_eq!(missing.as_bytes(), &[0, 0, 0, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF][..]);
    }

    #[test]
    fn parse_rejects_bad_magic() {
        assert!(DownloadHeader::from_bytes(&[1, 0, 0, 0xFF, 0, 0, 0, 0]).is_err());
        assert!(DownloadHeader::from_bytes(&[0, 0, 0]).is_err());
        let header = DownloadHeader::from_bytes(&[0, 0, 0, 0xFF, 3, 0, 0, 0]).unwrap();
        assert_eq!(header.size(), Some(3));
    }

    #[tokio::test]
    async fn reads_content() {
        let mut wire = DownloadHeader::found(3).as_bytes().to_vec();
        wire.extend_from_slice(b"abc#1 next\0");

        let mut reader = FrameReader::new(&wire[..]);
        let content = read_download(&mut reader, |_| {}).await.unwrap();
        assert_eq!(content, Some(Bytes::from_static(b"abc")));
        assert_eq!(reader.read_until(0).await.unwrap(), Bytes::from_static(b"#1 next\0"));
    }

    #[tokio::test]
    async fn not_found_has_no_body() {
        let mut wire = DownloadHeader::not_found().as_bytes().to_vec();
        wire.extend_from_slice(b"\0");

        let mut reader = FrameReader::new(&wire[..]);
        assert_eq!(read_download(&mut reader, |_| {}).await.unwrap(), None);
        assert_eq!(reader.buffered(), b"\0");
    }

    #[tokio::test]
    async fn hands_back_lines_ahead_of_header() {
        let mut wire = b"#5 [10:00] Anonim #2: hi\0\0File uploaded\0".to_vec();
        wire.extend_from_slice(DownloadHeader::found(1).as_bytes());
        wire.push(b'z');

        let mut lines = Vec::new();
        let mut reader = FrameReader::new(&wire[..]);
        let content = read_download(&mut reader, |line| lines.push(line)).await.unwrap();

        assert_eq!(content, Some(Bytes::from_static(b"z")));
        assert_eq!(lines, vec![
            Bytes::from_static(b"#5 [10:00] Anonim #2: hi\0"),
            Bytes::from_static(b"\0"),
            Bytes::from_static(b"File uploaded\0"),
        ]);
    }

    #[tokio::test]
    async fn oversized_announcement_fails() {
        let wire = DownloadHeader::found(1000).as_bytes().to_vec();
        let mut reader = FrameReader::with_config(&wire[..], FramerConfig::new(16, 64));
        assert!(matches!(
            read_download(&mut reader, |_| {}).await,
            Err(ProtocolError::FrameTooLarge { max: 64 })
        ));
    }
}
