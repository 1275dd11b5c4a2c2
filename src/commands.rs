//! CLI command definitions
//!
//! Defines the clap commands for the conformance runner.

use clap::Subcommand;
use std::path::{Path, PathBuf};

#[derive(Subcommand)]
pub enum Commands {
    /// Run conformance tests against the configured server
    Run {
        /// Suite to run (functional, s3select); all suites when omitted
        /// Can be specified multiple times: --suite functional --suite s3select
        #[arg(long = "suite", short = 's')]
        suites: Vec<String>,

        /// Run only the named test (name or suite:name); repeatable
        #[arg(long)]
        only: Vec<String>,

        /// Write detailed logs to this file
        log_file: Option<PathBuf>,
    },

    /// List the registered tests
    List {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Run a table of select cases defined in a YAML file
    Cases {
        /// Path to the YAML case table
        path: PathBuf,
    },
}

impl Commands {
    /// Log file given positionally to `run`
    pub fn log_file(&self) -> Option<&Path> {
        match self {
            Commands::Run { log_file, .. } => log_file.as_deref(),
            _ => None,
        }
    }
}
