//! Simulated interactive client.
//!
//! `SimClient` runs the real client duties over a turmoil TCP stream. Input
//! lines are typed through a channel and every rendered line is recorded in a
//! [`Transcript`], so tests can wait on and assert what a user would see.

use std::{
    io,
    path::PathBuf,
    sync::{Arc, Mutex, PoisonError},
    time::Duration,
};

use sixchan_client::{
    Accent, Client, ClientConfig, FilePicker, LineInput, Output, Renderer, SyncMode,
};
use sixchan_proto::MessageId;
use tokio::{sync::mpsc, task::JoinHandle};
use turmoil::net::TcpStream;

/// Lines rendered by one client, in order.
#[derive(Debug, Clone, Default)]
pub struct Transcript(Arc<Mutex<Vec<String>>>);

impl Transcript {
    /// Snapshot of every line so far.
    pub fn lines(&self) -> Vec<String> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Whether any line contains `needle`.
    pub fn contains(&self, needle: &str) -> bool {
        self.lines().iter().any(|line| line.contains(needle))
    }

    /// History lines as `(id, text)`, skipping notices.
    pub fn messages(&self) -> Vec<(MessageId, String)> {
        self.lines()
            .into_iter()
            .filter_map(|line| {
                let rest = line.strip_prefix('#')?;
                let (id, _) = rest.split_once(' ')?;
                Some((id.parse().ok()?, line.clone()))
            })
            .collect()
    }

    /// Wait (in simulated time) until a line contains `needle`.
    pub async fn wait_for(&self, needle: &str) -> io::Result<()> {
        for _ in 0..500 {
            if self.contains(needle) {
                return Ok(());
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        Err(io::Error::new(io::ErrorKind::TimedOut, format!("never saw {needle:?}")))
    }
}

impl Output for Transcript {
    fn line(&self, _accent: Accent, text: &str) {
        self.0.lock().unwrap_or_else(PoisonError::into_inner).push(text.to_string());
    }
}

/// Picker answering with fixed paths.
#[derive(Debug, Clone, Default)]
pub struct ScriptedPicker {
    /// Answer for uploads
    pub open: Option<PathBuf>,
    /// Answer for downloads
    pub save: Option<PathBuf>,
}

impl FilePicker for ScriptedPicker {
    async fn pick_open(
        &mut self,
        _input: &mut LineInput,
        _renderer: &Renderer,
    ) -> Option<PathBuf> {
        self.open.clone()
    }

    async fn pick_save(
        &mut self,
        _id: MessageId,
        _input: &mut LineInput,
        _renderer: &Renderer,
    ) -> Option<PathBuf> {
        self.save.clone()
    }
}

/// A client running all its duties inside a simulated host.
pub struct SimClient {
    input: mpsc::Sender<String>,
    transcript: Transcript,
    task: JoinHandle<()>,
}

impl SimClient {
    /// Connect to `address` and start the duties.
    pub async fn connect(
        address: &str,
        mode: SyncMode,
        picker: ScriptedPicker,
    ) -> io::Result<Self> {
        let stream = TcpStream::connect(address).await?;
        let (reader, writer) = tokio::io::split(stream);

        let transcript = Transcript::default();
        let config = ClientConfig { sync_mode: mode, ..ClientConfig::default() };
        let client = Client::new(reader, writer, Renderer::new(transcript.clone()), &config);

        let (input, lines) = mpsc::channel(16);
        let task = tokio::spawn(client.run(lines, picker));
        Ok(Self { input, transcript, task })
    }

    /// Type one input line.
    pub async fn type_line(&self, line: impl Into<String>) -> io::Result<()> {
        self.input.send(line.into()).await.map_err(|_| io::Error::from(io::ErrorKind::BrokenPipe))
    }

    /// Everything rendered so far.
    pub fn transcript(&self) -> &Transcript {
        &self.transcript
    }

    /// Type `/q` and wait for the duties to finish.
    pub async fn quit(self) -> io::Result<Transcript> {
        self.type_line("/q").await?;
        self.task.await.map_err(io::Error::other)?;
        Ok(self.transcript)
    }

    /// Wait for the client to stop on its own (server went away).
    pub async fn wait_stopped(self) -> io::Result<Transcript> {
        self.task.await.map_err(io::Error::other)?;
        Ok(self.transcript)
    }
}
