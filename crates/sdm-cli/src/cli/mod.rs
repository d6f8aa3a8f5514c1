//! CLI for the SDM range downloader.

mod commands;

use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use sdm_core::config;
use std::path::{Path, PathBuf};

use commands::{run_checksum, run_get};

#[derive(Debug, Parser)]
#[command(name = "sdm")]
#[command(about = "SDM: parallel HTTP range downloader with work stealing", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: CliCommand,
}

#[derive(Debug, Subcommand)]
pub enum CliCommand {
    /// Download a URL.
    Get(GetArgs),

    /// Compute SHA-256 of a file (e.g. after download).
    Checksum {
        /// Path to the file.
        path: String,
    },
}

#[derive(Debug, Args)]
pub struct GetArgs {
    /// HTTP/HTTPS URL to download.
    pub url: String,

    /// Concurrent range requests (default from config, 32).
    #[arg(short = 't', long, value_name = "N")]
    pub threads: Option<usize>,

    /// Chunk size in bytes (default from config, 1 MiB).
    #[arg(long, value_name = "BYTES")]
    pub chunk_size: Option<u64>,

    /// First chunk index to fetch.
    #[arg(long, default_value_t = 0, value_name = "INDEX")]
    pub start_chunk: usize,

    /// Last chunk index to fetch (inclusive).
    #[arg(long, value_name = "INDEX")]
    pub end_chunk: Option<usize>,

    /// Destination directory.
    #[arg(short = 'd', long, default_value = ".")]
    pub dir: PathBuf,

    /// Save under this name instead of the one the server suggests.
    #[arg(short = 'o', long)]
    pub filename: Option<String>,

    /// Proxy URL.
    #[arg(long)]
    pub proxy: Option<String>,

    /// Extra request headers as a JSON object, e.g. '{"Cookie":"a=b"}'.
    #[arg(long, value_name = "JSON")]
    pub headers: Option<String>,

    /// Give up after this many consecutive failures of one range.
    #[arg(long, value_name = "N")]
    pub max_retries: Option<u32>,

    /// Verify the finished file against this SHA-256 (hex).
    #[arg(long, value_name = "HEX")]
    pub sha256: Option<String>,
}

impl CliCommand {
    pub async fn run_from_args() -> Result<()> {
        let cli = Cli::parse();
        match cli.command {
            CliCommand::Get(args) => {
                let cfg = config::load_or_init()?;
                tracing::debug!("loaded config: {:?}", cfg);
                run_get(&args, &cfg).await?
            }
            CliCommand::Checksum { path } => run_checksum(Path::new(&path)).await?,
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests;
