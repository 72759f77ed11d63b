//! resocket CLI: an echo server and an interactive reconnecting client.

use std::io::Write as _;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use resocket::constants::DEFAULT_ADDRESS;
use resocket::{
    Address, ClientConfig, ClientError, EchoServer, Framing, ReconnectPolicy, ReconnectingClient,
};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio_util::sync::CancellationToken;

// CLI
#[derive(Parser)]
#[command(name = "resocket")]
#[command(version)]
#[command(about = "Self-healing socket client and echo server")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run an echo server
    Serve {
        /// Address to listen on (`unix://path`, `tcp://host:port`, or a bare path)
        #[arg(long, default_value = DEFAULT_ADDRESS)]
        address: String,
        /// Echo raw chunks prefixed with `echo:` instead of frames
        #[arg(long)]
        raw: bool,
    },
    /// Relay stdin lines to a server through a reconnecting client (`q` quits)
    Connect {
        /// Address to connect to
        #[arg(long, default_value = DEFAULT_ADDRESS)]
        address: String,
        /// Send and print raw bytes instead of frames
        #[arg(long)]
        raw: bool,
        /// Back off exponentially (with jitter) between failed dials
        #[arg(long)]
        backoff: bool,
        /// Path to a JSON config file
        #[arg(long)]
        config: Option<PathBuf>,
    },
}

/// Prints everything the server sends.
struct ServerPrinter;

impl std::io::Write for ServerPrinter {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        let mut out = std::io::stdout().lock();
        writeln!(out, "Server: {}", String::from_utf8_lossy(buf).trim_end())?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        std::io::stdout().flush()
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Logs go to stderr so they never mix with relayed output.
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .target(env_logger::Target::Stderr)
        .format_timestamp_secs()
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Serve { address, raw } => serve(&address, framing_for(raw)).await,
        Commands::Connect {
            address,
            raw,
            backoff,
            config,
        } => {
            let mut config = ClientConfig::load(config.as_deref())?;
            if raw {
                config.framing = Framing::Raw;
            }
            if backoff {
                config.reconnect = ReconnectPolicy::exponential();
            }
            connect(&address, config).await
        }
    }
}

fn framing_for(raw: bool) -> Framing {
    if raw {
        Framing::Raw
    } else {
        Framing::LengthPrefixed
    }
}

async fn serve(address: &str, framing: Framing) -> Result<()> {
    let address = Address::parse(address).context("Invalid listen address")?;
    let server = EchoServer::start(&address, framing)?;
    println!("Listening on {}", server.local_address());

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for Ctrl-C")?;
    log::info!("Ctrl-C received, shutting down");
    server.shutdown();
    Ok(())
}

async fn connect(address: &str, config: ClientConfig) -> Result<()> {
    let client = ReconnectingClient::new(config);
    let cancel = CancellationToken::new();

    let runner = client.clone();
    let runner_cancel = cancel.clone();
    let address = address.to_string();
    let mut connection =
        tokio::spawn(async move { runner.connect(runner_cancel, &address, ServerPrinter).await });

    println!("Type a message and press Enter (q to quit)");
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        tokio::select! {
            result = &mut connection => {
                return match result.context("Connection task failed")? {
                    Err(ClientError::Cancelled | ClientError::Closed) | Ok(()) => Ok(()),
                    Err(e) => Err(e.into()),
                };
            }
            _ = tokio::signal::ctrl_c() => {
                log::info!("Ctrl-C received, cancelling");
                cancel.cancel();
                break;
            }
            line = lines.next_line() => {
                let Some(line) = line.context("Failed to read stdin")? else {
                    break;
                };
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                if line == "q" {
                    break;
                }
                match client.write(line.as_bytes()) {
                    Ok(_) => {}
                    Err(ClientError::QueueFull) => {
                        log::warn!("Write queue full, message dropped");
                    }
                    Err(e) => return Err(e.into()),
                }
            }
        }
    }

    client.close();
    match connection.await.context("Connection task failed")? {
        Err(ClientError::Cancelled | ClientError::Closed) | Ok(()) => Ok(()),
        Err(e) => Err(e.into()),
    }
}
