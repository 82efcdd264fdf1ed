//! Sixchan client binary.
//!
//! # Usage
//!
//! ```bash
//! # Connect to 127.0.0.1:5000
//! sixchan-client
//!
//! # Connect to chat.example:6000
//! sixchan-client chat.example 6000
//!
//! # Connect over a local stream socket
//! sixchan-client --local /tmp/6chan.sock
//! ```
//!
//! Type to post, `/file` to upload, `/dl <id>` to download, `/q` to quit.

use std::{
    io::{self, BufRead},
    time::Duration,
};
#[cfg(unix)]
use std::path::PathBuf;

use clap::Parser;
use sixchan_client::{
    Accent, Client, ClientConfig, Console, ConsolePicker, DEFAULT_POLL_INTERVAL, Endpoint,
    LineInput, Output, Renderer, SyncMode, connect,
};
use sixchan_proto::FramerConfig;
use tokio::sync::mpsc;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

const DEFAULT_HOST: &str = "127.0.0.1";
const DEFAULT_PORT: u16 = 5000;

/// Sixchan chat client
#[derive(Parser, Debug)]
#[command(name = "sixchan-client")]
#[command(about = "Anonymous text and file chat client")]
#[command(version)]
struct Args {
    /// `[HOST] PORT`, or `PORT` alone
    #[arg(num_args = 0..=2, value_name = "HOST PORT")]
    endpoint: Vec<String>,

    /// Connect to a local stream socket at this path instead of TCP
    #[cfg(unix)]
    #[arg(long, value_name = "PATH")]
    local: Option<PathBuf>,

    /// Read each sync batch right after requesting it instead of in a
    /// separate receiver (default: on for --local, off for TCP)
    #[arg(long, num_args = 0..=1, default_missing_value = "true", value_name = "BOOL")]
    inline_sync: Option<bool>,

    /// Delay between sync requests in milliseconds
    #[arg(long, default_value_t = DEFAULT_POLL_INTERVAL.as_millis() as u64)]
    poll_interval_ms: u64,

    /// Largest accepted response or download in bytes
    #[arg(long, default_value_t = FramerConfig::DEFAULT_MAX_SIZE)]
    max_frame_bytes: usize,

    /// Print without colors
    #[arg(long)]
    no_color: bool,

    /// Log level for stderr (trace, debug, info, warn, error)
    #[arg(long, default_value = "warn")]
    log_level: String,
}

impl Args {
    #[cfg(unix)]
    fn local_endpoint(&self) -> Option<Endpoint> {
        self.local.clone().map(Endpoint::Local)
    }

    #[cfg(not(unix))]
    fn local_endpoint(&self) -> Option<Endpoint> {
        None
    }

    fn endpoint(&self) -> Result<Endpoint, String> {
        if let Some(local) = self.local_endpoint() {
            return Ok(local);
        }

        let (host, port) = match self.endpoint.as_slice() {
            [] => (DEFAULT_HOST, DEFAULT_PORT.to_string()),
            [port] => (DEFAULT_HOST, port.clone()),
            [host, port, ..] => (host.as_str(), port.clone()),
        };
        let port: u16 = port.parse().map_err(|e| format!("invalid port '{port}': {e}"))?;
        Ok(Endpoint::Tcp(format!("{host}:{port}")))
    }

    fn config(&self) -> Result<ClientConfig, String> {
        let endpoint = self.endpoint()?;
        let inline = self.inline_sync.unwrap_or(!matches!(endpoint, Endpoint::Tcp(_)));
        Ok(ClientConfig {
            endpoint,
            sync_mode: if inline { SyncMode::Inline } else { SyncMode::Split },
            poll_interval: Duration::from_millis(self.poll_interval_ms),
            framer: FramerConfig::new(FramerConfig::DEFAULT_BASE_CAPACITY, self.max_frame_bytes),
        })
    }
}

/// Feed stdin lines into a channel from a dedicated thread.
///
/// A blocking console read cannot be cancelled, so it lives outside the
/// runtime and simply dies with the process.
fn stdin_lines() -> LineInput {
    let (tx, rx) = mpsc::channel(16);
    std::thread::spawn(move || {
        let mut stdin = io::stdin().lock();
        let mut buf = Vec::new();
        loop {
            buf.clear();
            match stdin.read_until(b'\n', &mut buf) {
                Ok(0) | Err(_) => break,
                Ok(_) => {},
            }
            let line = String::from_utf8_lossy(&buf);
            let line = line.trim_end_matches(['\r', '\n']).to_string();
            if tx.blocking_send(line).is_err() {
                break;
            }
        }
    });
    rx
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));

    tracing_subscriber::registry().with(fmt::layer().with_writer(io::stderr)).with(filter).init();

    let config = args.config()?;
    let console = Console::new(!args.no_color);
    console.line(Accent::Plain, &format!("Connecting to {}...", config.endpoint));

    let (reader, writer) = connect(&config.endpoint).await?;
    tracing::info!(endpoint = %config.endpoint, mode = ?config.sync_mode, "connected");

    let client = Client::new(reader, writer, Renderer::new(console), &config);
    client.run(stdin_lines(), ConsolePicker).await;

    Ok(())
}
