//! The client's concurrent duties.
//!
//! - **sync**: asks for new history on a fixed interval
//! - **receive**: reads and renders server lines (split mode only)
//! - **send**: turns input lines into requests
//!
//! In [`SyncMode::Inline`] the sync duty reads each batch itself, right after
//! sending its request, and there is no receive duty.

use std::{path::PathBuf, sync::Arc, time::Duration};

use sixchan_proto::{DELIMITER, MessageId, Request, Response};
use tokio::io::{AsyncRead, AsyncWrite};

use crate::{
    command::{Command, HELP},
    error::ClientError,
    fileshare::{self, FilePicker, LineInput},
    session::{Session, write_request},
};

/// How sync batches are read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SyncMode {
    /// A separate receive duty reads every response line.
    #[default]
    Split,
    /// The sync duty reads its own batch before sleeping.
    Inline,
}

/// Ask for new history every `interval` until stopped.
pub async fn sync_duty<R, W>(
    session: Arc<Session<R, W>>,
    mode: SyncMode,
    interval: Duration,
) -> Result<(), ClientError>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    while !session.stop().is_raised() {
        let request = Request::Sync { cursor: session.cursor().get() }.to_bytes();
        match mode {
            SyncMode::Split => session.send(&request).await?,
            SyncMode::Inline => {
                let mut outbound = session.outbound().await;
                write_request(&mut *outbound, &request).await?;
                let mut inbound = session.inbound().claim().await;
                drop(outbound);

                loop {
                    let frame = inbound.read_until(DELIMITER).await?;
                    session.show_frame(&frame);
                    if Response::parse(&frame).is_terminator() {
                        break;
                    }
                }
            },
        }
        tokio::time::sleep(interval).await;
    }
    Ok(())
}

/// Render server lines as they arrive until stopped.
pub async fn receive_duty<R, W>(session: Arc<Session<R, W>>) -> Result<(), ClientError>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    while !session.stop().is_raised() {
        let frame = session.inbound().next_frame().await?;
        session.show_frame(&frame);
    }
    Ok(())
}

/// Act on input lines until `/q` or the input closes.
pub async fn send_duty<R, W, P>(
    session: Arc<Session<R, W>>,
    mut input: LineInput,
    mut picker: P,
) -> Result<(), ClientError>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
    P: FilePicker,
{
    let renderer = session.renderer();
    while let Some(line) = input.recv().await {
        if session.stop().is_raised() {
            break;
        }

        let command = match Command::parse(&line) {
            Ok(command) => command,
            Err(e) => {
                renderer.notice(&e.to_string());
                continue;
            },
        };

        let outcome = match command {
            Command::Empty => Ok(()),
            Command::Quit => {
                renderer.notice("Disconnecting...");
                return Ok(());
            },
            Command::Help => {
                renderer.notice(HELP);
                Ok(())
            },
            Command::Post(text) => session.send(&Request::Post { text }.to_bytes()).await,
            Command::Download { id, path } => {
                download(&*session, id, path, &mut input, &mut picker).await
            },
            Command::Upload { path } => upload(&*session, path, &mut input, &mut picker).await,
        };

        match outcome {
            Err(e) if !e.is_fatal() => {
                tracing::debug!("{}", e);
                renderer.notice(&capitalized(&e.to_string()));
            },
            other => other?,
        }
    }
    Ok(())
}

async fn download<R, W, P>(
    session: &Session<R, W>,
    id: MessageId,
    path: Option<PathBuf>,
    input: &mut LineInput,
    picker: &mut P,
) -> Result<(), ClientError>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
    P: FilePicker,
{
    let renderer = session.renderer();
    let Some(content) = fileshare::fetch(session, id).await? else {
        renderer.notice(&format!("File #{id} not found."));
        return Ok(());
    };
    renderer.notice(&format!("Downloading file #{id} ({} bytes)...", content.len()));

    let path = match path {
        Some(path) => path,
        None => match picker.pick_save(id, input, renderer).await {
            Some(path) => path,
            None => return Ok(()),
        },
    };
    fileshare::save(&path, &content).await?;
    renderer.notice(&format!("File #{id} saved as {}", path.display()));
    Ok(())
}

async fn upload<R, W, P>(
    session: &Session<R, W>,
    path: Option<PathBuf>,
    input: &mut LineInput,
    picker: &mut P,
) -> Result<(), ClientError>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
    P: FilePicker,
{
    let path = match path {
        Some(path) => path,
        None => match picker.pick_open(input, session.renderer()).await {
            Some(path) => path,
            None => return Ok(()),
        },
    };
    let request = fileshare::load_upload(&path).await?;
    session.send(&request.to_bytes()).await?;
    tracing::debug!(path = %path.display(), "upload sent");
    Ok(())
}

fn capitalized(text: &str) -> String {
    let mut chars = text.chars();
    chars.next().map(|first| first.to_uppercase().chain(chars).collect()).unwrap_or_default()
}
