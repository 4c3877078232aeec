//! Ferry command-line entry point.

mod cli;
mod config;
mod send;
mod serve;

use clap::Parser;
use ferry_client::TcpConnector;
use tracing_subscriber::EnvFilter;

use cli::{Cli, Command};

fn main() -> anyhow::Result<()> {
    // Logs go to stderr so they never interleave with the progress bar's line.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = config::Config::load(cli.config.as_deref())?;

    let rt = tokio::runtime::Runtime::new()?;
    match cli.command {
        Command::Serve(args) => {
            let server_config = args.resolve(&config.server)?;
            tracing::info!(version = env!("CARGO_PKG_VERSION"), "starting ferry server");
            rt.block_on(serve::run(server_config))?;
        }
        Command::Send(args) => {
            let upload_config = args.resolve(&config.client)?;
            let connector = TcpConnector::new(args.server.clone(), args.port)
                .with_timeout(config.client.connect_timeout());
            let report = rt.block_on(send::run(connector, upload_config, args.quiet))?;
            tracing::info!(
                bytes = report.total_size,
                connections = report.connections,
                elapsed_ms = report.elapsed.as_millis() as u64,
                "upload finished"
            );
        }
    }

    Ok(())
}
