//! End-to-end client tests against an in-process `ChatService`.
//!
//! Each client runs all of its duties over one half of an in-memory duplex
//! stream; the other half is admitted to the service exactly like an accepted
//! socket. Output is captured instead of printed.

use std::{
    path::PathBuf,
    sync::{Arc, Mutex},
    time::Duration,
};

use chrono::{NaiveDate, NaiveDateTime};
use sixchan_client::{
    Accent, Client, ClientConfig, FilePicker, LineInput, Output, Renderer, SyncMode,
};
use sixchan_proto::MessageId;
use sixchan_server::{ChatService, Environment, ServiceConfig};
use tokio::{
    io::{DuplexStream, ReadHalf, WriteHalf},
    sync::mpsc,
    task::JoinHandle,
};

#[derive(Clone)]
struct FixedClock;

impl Environment for FixedClock {
    fn wall_clock(&self) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 7, 4).and_then(|d| d.and_hms_opt(21, 30, 0)).unwrap()
    }
}

#[derive(Clone, Default)]
struct Capture(Arc<Mutex<Vec<String>>>);

impl Output for Capture {
    fn line(&self, _accent: Accent, text: &str) {
        self.0.lock().unwrap().push(text.to_string());
    }
}

impl Capture {
    fn lines(&self) -> Vec<String> {
        self.0.lock().unwrap().clone()
    }

    fn has(&self, needle: &str) -> bool {
        self.lines().iter().any(|line| line.contains(needle))
    }

    async fn wait_for(&self, needle: &str) {
        for _ in 0..300 {
            if self.has(needle) {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("never saw {needle:?} in {:#?}", self.lines());
    }
}

/// Picker that always answers with the same path.
struct FixedPicker(Option<PathBuf>);

impl FilePicker for FixedPicker {
    async fn pick_open(
        &mut self,
        _input: &mut LineInput,
        _renderer: &Renderer,
    ) -> Option<PathBuf> {
        self.0.clone()
    }

    async fn pick_save(
        &mut self,
        _id: MessageId,
        _input: &mut LineInput,
        _renderer: &Renderer,
    ) -> Option<PathBuf> {
        self.0.clone()
    }
}

struct Running {
    input: mpsc::Sender<String>,
    output: Capture,
    task: JoinHandle<()>,
}

impl Running {
    async fn type_line(&self, line: &str) {
        self.input.send(line.to_string()).await.unwrap();
    }

    async fn quit(self) -> Capture {
        self.type_line("/q").await;
        tokio::time::timeout(Duration::from_secs(3), self.task).await.unwrap().unwrap();
        self.output
    }
}

fn service() -> Arc<ChatService<FixedClock>> {
    Arc::new(ChatService::new(FixedClock, ServiceConfig::default()).unwrap())
}

fn client(
    service: &ChatService<FixedClock>,
    mode: SyncMode,
) -> (Client<ReadHalf<DuplexStream>, WriteHalf<DuplexStream>>, Capture) {
    let (client_end, server_end) = tokio::io::duplex(64 * 1024);
    service.admit(server_end, None).expect("client should be admitted");

    let (reader, writer) = tokio::io::split(client_end);
    let output = Capture::default();
    let config = ClientConfig {
        sync_mode: mode,
        poll_interval: Duration::from_millis(10),
        ..ClientConfig::default()
    };
    (Client::new(reader, writer, Renderer::new(output.clone()), &config), output)
}

fn start(service: &ChatService<FixedClock>, mode: SyncMode, picker: FixedPicker) -> Running {
    let (client, output) = client(service, mode);
    let (input, lines) = mpsc::channel(8);
    let task = tokio::spawn(client.run(lines, picker));
    Running { input, output, task }
}

#[tokio::test]
async fn split_clients_see_each_other() {
    let service = service();
    let alice = start(&service, SyncMode::Split, FixedPicker(None));
    let bob = start(&service, SyncMode::Split, FixedPicker(None));

    alice.output.wait_for("Welcome back, Anonim #").await;
    bob.output.wait_for("Welcome back, Anonim #").await;

    alice.type_line("hello from alice").await;
    bob.output.wait_for(": hello from alice").await;

    let alice_out = alice.quit().await;
    assert!(alice_out.has("Disconnecting..."));

    // Every history line is printed once, even with overlapping syncs
    let bob_out = bob.quit().await;
    let posts = bob_out.lines().iter().filter(|l| l.ends_with(": hello from alice")).count();
    assert_eq!(posts, 1);
}

#[tokio::test]
async fn inline_sync_reads_its_own_batches() {
    let service = service();
    let writer = start(&service, SyncMode::Split, FixedPicker(None));
    let reader = start(&service, SyncMode::Inline, FixedPicker(None));

    reader.output.wait_for("Welcome back, Anonim #").await;
    writer.type_line("over the pipe").await;
    reader.output.wait_for(": over the pipe").await;

    writer.quit().await;
    let out = reader.quit().await;
    assert!(out.lines().iter().all(|line| !line.is_empty()), "terminators are not printed");
}

#[tokio::test]
async fn upload_then_download_to_explicit_path() {
    for mode in [SyncMode::Split, SyncMode::Inline] {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("report.bin");
        let saved = dir.path().join("copy.bin");
        let content: Vec<u8> = (0u8..=255).cycle().take(10_000).collect();
        tokio::fs::write(&source, &content).await.unwrap();

        let service = service();
        let running = start(&service, mode, FixedPicker(None));
        running.output.wait_for("Welcome back").await;

        running.type_line(&format!("/file {}", source.display())).await;
        running.output.wait_for("File uploaded").await;
        running.output.wait_for("File 'report.bin' (10000 bytes). Type '/dl 2' to download").await;

        running.type_line(&format!("/dl 2 {}", saved.display())).await;
        running.output.wait_for("File #2 saved as").await;
        assert!(running.output.has("Downloading file #2 (10000 bytes)..."));
        assert_eq!(tokio::fs::read(&saved).await.unwrap(), content);

        running.quit().await;
    }
}

#[tokio::test]
async fn picker_supplies_missing_paths() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("note.txt");
    tokio::fs::write(&path, b"picked").await.unwrap();

    let service = service();
    let running = start(&service, SyncMode::Split, FixedPicker(Some(path.clone())));
    running.output.wait_for("Welcome back").await;

    running.type_line("/file").await;
    running.output.wait_for("File 'note.txt' (6 bytes)").await;

    // The picker points the download back at the same file
    tokio::fs::remove_file(&path).await.unwrap();
    running.type_line("/dl 2").await;
    running.output.wait_for("File #2 saved as").await;
    assert_eq!(tokio::fs::read(&path).await.unwrap(), b"picked");

    running.quit().await;
}

#[tokio::test]
async fn download_of_text_message_and_unknown_id() {
    let dir = tempfile::tempdir().unwrap();
    let saved = dir.path().join("message.txt");

    let service = service();
    let running = start(&service, SyncMode::Split, FixedPicker(None));
    running.output.wait_for("Welcome back").await;

    running.type_line("keep this").await;
    running.output.wait_for(": keep this").await;
    running.type_line(&format!("/dl 2 {}", saved.display())).await;
    running.output.wait_for("File #2 saved as").await;
    assert_eq!(tokio::fs::read(&saved).await.unwrap(), b"keep this");

    running.type_line("/dl 99").await;
    running.output.wait_for("File #99 not found.").await;

    running.quit().await;
}

#[tokio::test]
async fn local_mistakes_are_reported_without_traffic() {
    let service = service();
    let running = start(&service, SyncMode::Split, FixedPicker(None));
    running.output.wait_for("Welcome back").await;

    running.type_line("/help").await;
    running.output.wait_for("Available commands:").await;
    running.type_line("/dl").await;
    running.output.wait_for("Specify file id to download.").await;
    running.type_line(&"x".repeat(2000)).await;
    running.output.wait_for("Message is too long. Consider sending as a file.").await;
    running.type_line("/file /definitely/not/here").await;
    running.output.wait_for("Could not read file /definitely/not/here").await;

    let out = running.quit().await;
    assert!(!out.has(": /help"));
    // Welcome and own announcement only
    assert_eq!(service.history().len(), 1);
}

#[tokio::test]
async fn server_shutdown_stops_the_client() {
    for mode in [SyncMode::Split, SyncMode::Inline] {
        let service = service();
        let running = start(&service, mode, FixedPicker(None));
        running.output.wait_for("Welcome back").await;

        service.shutdown().await;
        tokio::time::timeout(Duration::from_secs(3), running.task).await.unwrap().unwrap();
        assert!(
            running.output.has("Disconnected from server.")
                || running.output.has("Connection reset.")
        );
    }
}
