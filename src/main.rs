//! S3 conformance runner
//!
//! Exercises an S3-compatible object storage server through the AWS SDK and
//! prints one JSON report line per test.

use std::path::PathBuf;

use clap::Parser;
use commands::Commands;
use s3_conformance::{cli, commands, common::logging};

#[derive(Parser)]
#[command(name = "s3-conformance", about = "Conformance tests for S3-compatible storage")]
#[command(version, long_about = None)]
struct Cli {
    /// Configuration file (default: platform config directory)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Write detailed logs to this file
    #[arg(long, global = true)]
    log_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let log_file = cli
        .log_file
        .clone()
        .or_else(|| cli.command.log_file().map(PathBuf::from));
    logging::init(log_file.as_deref());

    if let Err(e) = cli::dispatch(cli.command, cli.config.as_deref()).await {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}
