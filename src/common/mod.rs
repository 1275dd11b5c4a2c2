//! Common utilities shared by the CLI, the suites and the harness

pub mod config;
pub mod error;
pub mod logging;
pub mod paths;

pub use config::Config;
pub use error::{Error, Result, PRECONDITION_FAILED_MESSAGE};
