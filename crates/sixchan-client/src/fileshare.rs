//! File upload and download.
//!
//! A download holds the outbound domain from the `/dl` request until the
//! reply is read, and claims the inbound domain for the reply itself. Lines
//! that were already on their way (the rest of a sync batch) are rendered as
//! they are passed. An upload only needs outbound; its reply line is picked
//! up by whichever duty reads next.

use std::{
    future::Future,
    path::{Path, PathBuf},
};

use bytes::Bytes;
use sixchan_proto::{MessageId, Request, bounded_file_name, read_download};
use tokio::{
    io::{AsyncRead, AsyncWrite},
    sync::mpsc,
};

use crate::{
    error::ClientError,
    render::Renderer,
    session::{Session, write_request},
};

/// Interactive input lines, one per entry.
pub type LineInput = mpsc::Receiver<String>;

/// Chooses local paths for uploads and downloads.
pub trait FilePicker: Send {
    /// Path of a file to upload; `None` cancels.
    fn pick_open(
        &mut self,
        input: &mut LineInput,
        renderer: &Renderer,
    ) -> impl Future<Output = Option<PathBuf>> + Send;

    /// Where to save message `id`; `None` cancels.
    fn pick_save(
        &mut self,
        id: MessageId,
        input: &mut LineInput,
        renderer: &Renderer,
    ) -> impl Future<Output = Option<PathBuf>> + Send;
}

/// Asks for paths on the console.
#[derive(Debug, Default, Clone, Copy)]
pub struct ConsolePicker;

impl ConsolePicker {
    async fn ask(question: &str, input: &mut LineInput, renderer: &Renderer) -> Option<PathBuf> {
        renderer.notice(question);
        let answer = input.recv().await?;
        let answer = answer.trim();
        (!answer.is_empty()).then(|| PathBuf::from(answer))
    }
}

impl FilePicker for ConsolePicker {
    async fn pick_open(&mut self, input: &mut LineInput, renderer: &Renderer) -> Option<PathBuf> {
        Self::ask("File to upload (empty to cancel):", input, renderer).await
    }

    async fn pick_save(
        &mut self,
        id: MessageId,
        input: &mut LineInput,
        renderer: &Renderer,
    ) -> Option<PathBuf> {
        Self::ask(&format!("Save #{id} as (empty to cancel):"), input, renderer).await
    }
}

/// Request message `id` and read its payload.
///
/// Returns `None` when the server has nothing under that id.
pub async fn fetch<R, W>(
    session: &Session<R, W>,
    id: MessageId,
) -> Result<Option<Bytes>, ClientError>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut outbound = session.outbound().await;
    write_request(&mut *outbound, &Request::Download { id }.to_bytes()).await?;

    let content = {
        let mut inbound = session.inbound().claim().await;
        read_download(&mut *inbound, |line| session.show_frame(&line)).await?
    };
    drop(outbound);

    let size = content.as_ref().map(Bytes::len);
    tracing::debug!(message_id = id, size, "download finished");
    Ok(content)
}

/// Read `path` and build its upload request.
pub async fn load_upload(path: &Path) -> Result<Request, ClientError> {
    let content = tokio::fs::read(path).await.map_err(|source| ClientError::File {
        action: "could not read file",
        path: path.to_path_buf(),
        source,
    })?;
    if u32::try_from(content.len()).is_err() {
        return Err(ClientError::FileTooLarge { size: content.len() });
    }

    let name = path.file_name().map(|name| name.to_string_lossy()).unwrap_or_default();
    Ok(Request::Upload { name: bounded_file_name(&name), content: Bytes::from(content) })
}

/// Write downloaded `content` to `path`, replacing any existing file.
pub async fn save(path: &Path, content: &[u8]) -> Result<(), ClientError> {
    tokio::fs::write(path, content).await.map_err(|source| ClientError::File {
        action: "could not save to",
        path: path.to_path_buf(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn upload_uses_bounded_base_name() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a-very-long-file-name-for-the-upload-test.txt");
        tokio::fs::write(&path, b"content").await.unwrap();

        match load_upload(&path).await.unwrap() {
            Request::Upload { name, content } => {
                assert_eq!(name, "a-very-long-file-name-for-the-u");
                assert_eq!(content, Bytes::from_static(b"content"));
            },
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn missing_file_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let err = load_upload(&dir.path().join("absent")).await.unwrap_err();
        assert!(matches!(err, ClientError::File { action: "could not read file", .. }));
        assert!(!err.is_fatal());
    }

    #[tokio::test]
    async fn save_overwrites() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.bin");
        save(&path, b"first").await.unwrap();
        save(&path, b"second").await.unwrap();
        assert_eq!(tokio::fs::read(&path).await.unwrap(), b"second");
    }
}
