//! Sixchan server binary.
//!
//! # Usage
//!
//! ```bash
//! # Listen on 127.0.0.1:5000
//! sixchan-server
//!
//! # Listen on all interfaces, port 6000
//! sixchan-server 0.0.0.0 6000
//!
//! # Listen on a local stream socket instead of TCP
//! sixchan-server --local /tmp/6chan.sock
//! ```
//!
//! Stop with Ctrl-C; every connected client is disconnected.

#[cfg(unix)]
use std::path::PathBuf;

use clap::Parser;
use sixchan_proto::FramerConfig;
use sixchan_server::{
    BindTarget, DEFAULT_MAX_CLIENTS, DispatchConfig, Server, ServerRuntimeConfig, ServiceConfig,
};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

const DEFAULT_HOST: &str = "127.0.0.1";
const DEFAULT_PORT: u16 = 5000;

/// Sixchan chat broker
#[derive(Parser, Debug)]
#[command(name = "sixchan-server")]
#[command(about = "Anonymous text and file chat broker")]
#[command(version)]
struct Args {
    /// `[HOST] PORT`, or `PORT` alone
    #[arg(num_args = 0..=2, value_name = "HOST PORT")]
    endpoint: Vec<String>,

    /// Serve on a local stream socket at this path instead of TCP
    #[cfg(unix)]
    #[arg(long, value_name = "PATH")]
    local: Option<PathBuf>,

    /// Connections admitted before the server stops registering new ones
    #[arg(long, default_value_t = DEFAULT_MAX_CLIENTS)]
    max_clients: u32,

    /// Also mirror file uploads to the console log
    #[arg(long)]
    echo_files: bool,

    /// Largest accepted frame or upload in bytes
    #[arg(long, default_value_t = FramerConfig::DEFAULT_MAX_SIZE)]
    max_frame_bytes: usize,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,
}

impl Args {
    #[cfg(unix)]
    fn local_target(&self) -> Option<BindTarget> {
        self.local.clone().map(BindTarget::Local)
    }

    #[cfg(not(unix))]
    fn local_target(&self) -> Option<BindTarget> {
        None
    }

    fn bind_target(&self) -> Result<BindTarget, String> {
        if let Some(local) = self.local_target() {
            return Ok(local);
        }

        let (host, port) = match self.endpoint.as_slice() {
            [] => (DEFAULT_HOST, DEFAULT_PORT.to_string()),
            [port] => (DEFAULT_HOST, port.clone()),
            [host, port, ..] => (host.as_str(), port.clone()),
        };
        let port: u16 = port.parse().map_err(|e| format!("invalid port '{port}': {e}"))?;
        Ok(BindTarget::Tcp(format!("{host}:{port}")))
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));

    tracing_subscriber::registry().with(fmt::layer()).with(filter).init();

    tracing::info!("Sixchan server starting");

    let config = ServerRuntimeConfig {
        bind: args.bind_target()?,
        service: ServiceConfig {
            max_clients: args.max_clients,
            framer: FramerConfig::new(FramerConfig::DEFAULT_BASE_CAPACITY, args.max_frame_bytes),
            dispatch: DispatchConfig {
                echo_file_posts: args.echo_files,
                ..DispatchConfig::default()
            },
        },
    };

    let server = Server::bind(config).await?;

    server
        .run(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!("Failed to listen for Ctrl-C: {}", e);
                std::future::pending::<()>().await;
            }
            tracing::info!("Shutting down");
        })
        .await?;

    Ok(())
}
