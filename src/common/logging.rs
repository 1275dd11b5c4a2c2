//! Logging and tracing configuration
//!
//! Standard output is reserved for JSON test records, so human-readable
//! logs always go to stderr. An optional log file receives full detail.

use std::fs::File;
use std::path::Path;

use tracing_subscriber::{
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter,
};

/// Default filter: INFO for this crate, WARN for dependencies
const DEFAULT_FILTER: &str = "s3_conformance=info,warn";

/// Initialize tracing for a run
///
/// Logs are controlled by the `RUST_LOG` environment variable. When
/// `log_file` is given it is truncated and receives every event with
/// source file, line number and span enter/exit markers.
pub fn init(log_file: Option<&Path>) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    let stderr_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .compact();

    let file_layer = log_file.and_then(open_log_file).map(|file| {
        fmt::layer()
            .with_writer(file)
            .with_ansi(false)
            .with_target(true)
            .with_file(true)
            .with_line_number(true)
            .with_span_events(FmtSpan::ENTER | FmtSpan::EXIT)
    });

    tracing_subscriber::registry()
        .with(filter)
        .with(file_layer)
        .with(stderr_layer)
        .init();
}

/// Create (or truncate) the log file, warning on stderr when it cannot be opened
fn open_log_file(path: &Path) -> Option<File> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        let _ = std::fs::create_dir_all(parent);
    }
    match File::create(path) {
        Ok(file) => Some(file),
        Err(e) => {
            eprintln!("Warning: Could not open log file {}: {}", path.display(), e);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_log_file_creates_parent_and_truncates() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("logs").join("run.log");
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, "stale").unwrap();

        assert!(open_log_file(&path).is_some());
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "");

        let nested = dir.path().join("a").join("b").join("run.log");
        assert!(open_log_file(&nested).is_some());
        assert!(nested.exists());
    }

    #[test]
    fn test_open_log_file_unwritable_path() {
        let dir = tempfile::tempdir().unwrap();
        // A directory cannot be opened as a log file
        assert!(open_log_file(dir.path()).is_none());
    }
}
