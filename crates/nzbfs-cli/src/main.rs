mod commands;
mod config;
mod demo_transport;
mod output;

use std::io;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use nzbfs_core::catalog::JsonFileCatalog;
use nzbfs_core::filesystem::NzbFilesystem;
use nzbfs_core::reader::virtual_file::ReaderTuning;

use crate::commands::{cat, ls, stat};
use crate::config::Config;
use crate::demo_transport::FileSystemDemoTransport;

/// Command-line interface for the nzbfs read-only virtual filesystem
#[derive(Parser)]
#[command(name = "nzbfs")]
#[command(author, version)]
#[command(propagate_version = true)]
#[command(after_help = "EXAMPLES:
    # List catalog entries
    nzbfs ls /movies

    # Show metadata for a file
    nzbfs stat /movies/example.mkv

    # Read a file's decrypted contents
    nzbfs cat /movies/example.mkv > example.mkv
")]
struct Cli {
    /// Verbosity level (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Suppress non-essential output
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Path to the TOML config file (default: XDG config dir)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Path to the JSON-backed metadata catalog (overrides config)
    #[arg(long, global = true)]
    catalog: Option<PathBuf>,

    /// Root directory the demo article transport reads from (overrides
    /// config). The real NNTP connection pool is an external
    /// collaborator this workspace doesn't implement.
    #[arg(long, global = true)]
    articles_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List catalog entries under a path prefix
    Ls(ls::Args),

    /// Show metadata for a logical file
    Stat(stat::Args),

    /// Read and output a file's decrypted contents
    Cat(cat::Args),
}

fn main() -> ExitCode {
    let runtime = match tokio::runtime::Builder::new_multi_thread().enable_all().build() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("Error: failed to start async runtime: {e}");
            return ExitCode::FAILURE;
        }
    };

    match runtime.block_on(run()) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run() -> Result<()> {
    let cli = Cli::parse();

    if !cli.quiet {
        setup_tracing(cli.verbose);
    }

    let config = Config::load(cli.config.as_ref()).context("failed to load configuration")?;

    let catalog_path = cli
        .catalog
        .clone()
        .or(config.defaults.catalog_path.clone())
        .ok_or_else(|| anyhow::anyhow!("no catalog path configured (pass --catalog or set catalog_path in config.toml)"))?;
    let articles_dir = cli
        .articles_dir
        .clone()
        .or(config.defaults.articles_dir.clone())
        .ok_or_else(|| anyhow::anyhow!("no articles directory configured (pass --articles-dir or set articles_dir in config.toml)"))?;

    let catalog = Arc::new(JsonFileCatalog::load(catalog_path).await.context("failed to load catalog")?);
    let transport = Arc::new(FileSystemDemoTransport::new(articles_dir));
    let tuning = ReaderTuning {
        streaming_chunk_size: config.defaults.streaming_chunk_size,
        max_range_size: config.defaults.max_range_size,
        seek_threshold: config.defaults.seek_threshold,
    };
    let fs = NzbFilesystem::with_tuning(catalog, transport, config.defaults.max_download_workers, tuning);

    match cli.command {
        Commands::Ls(args) => ls::execute(&fs, &args).await,
        Commands::Stat(args) => stat::execute(&fs, &args).await,
        Commands::Cat(args) => cat::execute(&fs, &args).await,
    }
}

fn setup_tracing(verbose: u8) {
    let filter = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| filter.into()))
        .with_writer(io::stderr)
        .init();
}
