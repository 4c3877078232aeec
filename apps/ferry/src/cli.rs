use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use ferry_client::UploadConfig;
use ferry_protocol::DEFAULT_MAX_PAYLOAD;
use ferry_server::ServerConfig;

use crate::config::{ClientSection, ServerSection};

#[derive(Debug, Parser)]
#[command(
    name = "ferry",
    version,
    about = "Resumable single-file uploads over TCP"
)]
pub struct Cli {
    /// Configuration file (defaults to ~/.config/ferry/ferry.toml when present)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Receive uploads into <root>/<client_id>/<file_name>
    Serve(ServeArgs),
    /// Upload one file, resuming across dropped connections
    Send(SendArgs),
}

#[derive(Debug, Args)]
pub struct ServeArgs {
    /// TCP port to listen on
    #[arg(long)]
    pub port: Option<u16>,

    /// Address to bind
    #[arg(long)]
    pub bind: Option<IpAddr>,

    /// Directory receiving uploads
    #[arg(long)]
    pub root: Option<PathBuf>,

    /// Refuse concurrent connections writing the same destination
    #[arg(long)]
    pub exclusive_paths: bool,

    /// Largest accepted DATA payload in bytes
    #[arg(long)]
    pub max_payload: Option<usize>,
}

#[derive(Debug, Args)]
pub struct SendArgs {
    /// Server host name or IP address
    pub server: String,

    pub port: u16,

    /// Client identity; `-` uses the configured one
    pub client_id: String,

    /// File to upload; its base name is used on the server
    pub file_path: PathBuf,

    /// Bytes per DATA message
    #[arg(long)]
    pub chunk_size: Option<usize>,

    /// Consecutive failed attempts before giving up (default: never)
    #[arg(long)]
    pub max_attempts: Option<u32>,

    /// Delay between reconnect attempts
    #[arg(long)]
    pub retry_delay_ms: Option<u64>,

    /// Hide the progress bar
    #[arg(short, long)]
    pub quiet: bool,
}

impl ServeArgs {
    /// Merges flags over the `[server]` table.
    pub fn resolve(&self, file: &ServerSection) -> anyhow::Result<ServerConfig> {
        let ip = match self.bind {
            Some(ip) => ip,
            None => file
                .bind
                .parse()
                .with_context(|| format!("invalid bind address {:?}", file.bind))?,
        };
        let max_payload = self.max_payload.unwrap_or(file.max_payload);
        anyhow::ensure!(max_payload > 0, "max payload must be positive");

        Ok(ServerConfig {
            bind: SocketAddr::new(ip, self.port.unwrap_or(file.port)),
            root: self.root.clone().unwrap_or_else(|| file.root.clone()),
            exclusive_paths: self.exclusive_paths || file.exclusive_paths,
            max_payload,
        })
    }
}

impl SendArgs {
    /// Merges flags over the `[client]` table.
    pub fn resolve(&self, file: &ClientSection) -> anyhow::Result<UploadConfig> {
        let client_id = if self.client_id == "-" {
            file.client_id.clone()
        } else {
            self.client_id.clone()
        };
        let chunk_size = self.chunk_size.unwrap_or(file.chunk_size);
        anyhow::ensure!(
            (1..=DEFAULT_MAX_PAYLOAD).contains(&chunk_size),
            "chunk size must be between 1 and {DEFAULT_MAX_PAYLOAD} bytes"
        );

        let mut retry = file.retry_policy();
        if let Some(ms) = self.retry_delay_ms {
            let delay = Duration::from_millis(ms);
            retry.initial_delay = delay;
            retry.max_delay = retry.max_delay.max(delay);
        }
        if self.max_attempts.is_some() {
            retry.max_attempts = self.max_attempts;
        }

        Ok(UploadConfig {
            client_id,
            file_path: self.file_path.clone(),
            chunk_size,
            retry,
        })
    }
}
