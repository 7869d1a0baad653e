//! Chunksync CLI - bring a local file up to date from a reference peer.

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tracing::debug;

use chunksync::async_sync::AsyncSyncClient;
use chunksync::logging::init_logging;
use chunksync::{
    DigestLength, DigestTable, SyncClient, SyncConfig, TransferMode, WireFormat, MAX_CHUNK_SIZE,
};

/// Chunksync - chunk-level file synchronization client
#[derive(Parser)]
#[command(name = "chunksync")]
#[command(version)]
#[command(about = "Synchronize a local file with a peer's reference copy")]
#[command(long_about = None)]
struct Cli {
    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// TOML configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Append logs to this file instead of stderr
    #[arg(long, global = true)]
    log_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Synchronize a local file with the peer at ADDR
    Sync {
        /// Peer address (host:port)
        #[arg(required = true)]
        addr: String,

        /// Local file to bring up to date
        #[arg(required = true)]
        file: PathBuf,

        /// Chunk size in bytes (must match the peer)
        #[arg(short = 's', long)]
        chunk_size: Option<usize>,

        /// Use the tagged envelope for control messages
        #[arg(long)]
        framed: bool,

        /// Announce exactly ceil(size / chunk) digests
        #[arg(long)]
        exact_digest_length: bool,

        /// Channel timeout in milliseconds (0 waits forever)
        #[arg(long)]
        timeout_ms: Option<u64>,
    },

    /// Print the chunk digests a sync would send for a file
    Digest {
        /// File to digest
        #[arg(required = true)]
        file: PathBuf,

        /// Chunk size in bytes
        #[arg(short = 's', long)]
        chunk_size: Option<usize>,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    if let Err(e) = init_logging(cli.verbose, cli.log_file.as_deref()) {
        eprintln!("Error: {e}");
        return ExitCode::FAILURE;
    }

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    let config = match &cli.config {
        Some(path) => SyncConfig::load(path)?,
        None => SyncConfig::default(),
    };

    match cli.command {
        Commands::Sync {
            addr,
            file,
            chunk_size,
            framed,
            exact_digest_length,
            timeout_ms,
        } => {
            let mut config = config;
            if let Some(size) = chunk_size {
                config.chunk_size = size;
            }
            if framed {
                config.wire_format = WireFormat::Framed;
            }
            if exact_digest_length {
                config.digest_length = DigestLength::Exact;
            }
            if let Some(ms) = timeout_ms {
                config.io_timeout_ms = (ms > 0).then_some(ms);
            }
            run_sync(&addr, file, config).await
        }
        Commands::Digest { file, chunk_size } => {
            run_digest(&file, chunk_size.unwrap_or(config.chunk_size))
        }
    }
}

async fn run_sync(
    addr: &str,
    file: PathBuf,
    config: SyncConfig,
) -> Result<(), Box<dyn std::error::Error>> {
    debug!(?config, "effective configuration");
    let client = AsyncSyncClient::from_client(SyncClient::from_config(config)?);
    let display = file.display().to_string();
    let outcome = client.connect_and_sync(addr, file).await?;

    let mode = match outcome.mode {
        TransferMode::FullTransfer => "full",
        TransferMode::IncrementalTransfer => "incremental",
    };
    println!(
        "Synced {display} ({mode}): {} bytes received, {} bytes written, {} chunks patched",
        outcome.bytes_received, outcome.bytes_written, outcome.chunks_patched
    );
    Ok(())
}

fn run_digest(file: &Path, chunk_size: usize) -> Result<(), Box<dyn std::error::Error>> {
    if !(1..=MAX_CHUNK_SIZE).contains(&chunk_size) {
        return Err(format!("Chunk size must be 1-{MAX_CHUNK_SIZE}, got {chunk_size}").into());
    }
    let table = DigestTable::compute_file(file, chunk_size)?;
    for (index, digest) in table.iter().enumerate() {
        println!("{index}\t{}", digest.to_hex());
    }
    Ok(())
}
