//! Tracing setup for Tracklift
//!
//! The console follows the caller's level. The run log keeps a full trace of
//! this crate so a failed upload can be inspected after the fact: every upload
//! runs inside an `upload` span carrying the tracker and a per-process upload
//! id, and the span's close event records how long the upload took.

use std::fs::{File, create_dir_all};
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};

use tracing::{Level, Span};
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, fmt};

/// File name of the per-run trace log
pub const LOG_FILE_NAME: &str = "tracklift-last-run.log";

/// Run log filter: everything from this crate, only warnings from the HTTP stack
const RUN_LOG_FILTER: &str = "info,tracklift_core=trace,hyper=warn,reqwest=warn";

static NEXT_UPLOAD_ID: AtomicU64 = AtomicU64::new(1);

/// Allocates the id that ties one upload's log lines together.
pub fn next_upload_id() -> u64 {
    NEXT_UPLOAD_ID.fetch_add(1, Ordering::Relaxed)
}

/// Span wrapping one upload attempt sequence.
pub fn upload_span(tracker: &str, upload_id: u64) -> Span {
    tracing::info_span!("upload", tracker = %tracker, upload = upload_id)
}

/// Initialize tracing with dual output: console (user level) + run log (full trace)
///
/// # Arguments
/// * `console_level` - Log level for console output; `RUST_LOG` overrides it
/// * `logs_dir` - Directory for the run log (defaults to "./logs")
///
/// # File Output
/// Writes `logs/tracklift-last-run.log`, overwriting the previous run.
///
/// # Errors
///
/// - `Box<dyn std::error::Error>` - If the logs directory or log file cannot be created,
///   or a global subscriber is already installed
pub fn init_tracing(
    console_level: LogLevel,
    logs_dir: Option<&Path>,
) -> Result<(), Box<dyn std::error::Error>> {
    let logs_path = logs_dir.unwrap_or_else(|| Path::new("logs"));
    create_dir_all(logs_path)?;

    let log_file_path = logs_path.join(LOG_FILE_NAME);
    let log_file = File::create(&log_file_path)?;

    let console_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(console_level.to_string()));

    let console_layer = fmt::layer()
        .with_target(false)
        .with_file(false)
        .with_line_number(false)
        .with_filter(console_filter);

    let file_layer = fmt::layer()
        .with_target(true)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
        .with_ansi(false)
        .with_span_events(FmtSpan::CLOSE)
        .with_writer(std::sync::Mutex::new(log_file))
        .with_filter(EnvFilter::new(RUN_LOG_FILTER));

    tracing_subscriber::registry()
        .with(console_layer)
        .with(file_layer)
        .try_init()?;

    tracing::info!(
        "Tracing initialized: console={}, run_log={}",
        console_level,
        log_file_path.display()
    );

    Ok(())
}

/// Log levels selectable by the embedding application
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogLevel {
    Error,
    Warn,
    #[default]
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    /// Converts to the tracing `Level`.
    ///
    /// # Examples
    /// ```
    /// use tracklift_core::tracing_setup::LogLevel;
    ///
    /// let level = LogLevel::Info.as_tracing_level();
    /// assert_eq!(level, tracing::Level::INFO);
    /// ```
    pub fn as_tracing_level(self) -> Level {
        match self {
            LogLevel::Error => Level::ERROR,
            LogLevel::Warn => Level::WARN,
            LogLevel::Info => Level::INFO,
            LogLevel::Debug => Level::DEBUG,
            LogLevel::Trace => Level::TRACE,
        }
    }
}

impl std::str::FromStr for LogLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "error" => Ok(LogLevel::Error),
            "warn" | "warning" => Ok(LogLevel::Warn),
            "info" => Ok(LogLevel::Info),
            "debug" => Ok(LogLevel::Debug),
            "trace" => Ok(LogLevel::Trace),
            _ => Err(format!("Invalid log level: {s}")),
        }
    }
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LogLevel::Error => write!(f, "error"),
            LogLevel::Warn => write!(f, "warn"),
            LogLevel::Info => write!(f, "info"),
            LogLevel::Debug => write!(f, "debug"),
            LogLevel::Trace => write!(f, "trace"),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use parking_lot::Mutex;
    use tracing_subscriber::fmt;

    use super::*;

    #[test]
    fn test_log_level_parsing() {
        assert_eq!("DEBUG".parse::<LogLevel>(), Ok(LogLevel::Debug));
        assert_eq!("warning".parse::<LogLevel>(), Ok(LogLevel::Warn));
        assert!("loud".parse::<LogLevel>().is_err());
        assert_eq!(LogLevel::default(), LogLevel::Info);
    }

    #[test]
    fn test_log_level_display_roundtrip() {
        for level in [
            LogLevel::Error,
            LogLevel::Warn,
            LogLevel::Info,
            LogLevel::Debug,
            LogLevel::Trace,
        ] {
            assert_eq!(level.to_string().parse::<LogLevel>(), Ok(level));
        }
    }

    #[test]
    fn test_init_tracing_creates_log_file() {
        let dir = tempfile::tempdir().unwrap();
        let logs = dir.path().join("logs");

        // Another test may already own the global subscriber; the file is created either way.
        let _ = init_tracing(LogLevel::Warn, Some(&logs));
        assert!(logs.join(LOG_FILE_NAME).exists());
    }

    #[derive(Clone, Default)]
    struct Captured(Arc<Mutex<Vec<u8>>>);

    impl std::io::Write for Captured {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_upload_span_tags_events() {
        let captured = Captured::default();
        let writer = captured.clone();
        let subscriber = fmt()
            .with_ansi(false)
            .with_writer(move || writer.clone())
            .finish();

        let first = next_upload_id();
        let second = next_upload_id();
        assert!(second > first);

        tracing::subscriber::with_default(subscriber, || {
            let _entered = upload_span("YUS", second).entered();
            tracing::info!("dispatching (attempt 1)");
        });

        let output = String::from_utf8(captured.0.lock().clone()).unwrap();
        assert!(output.contains(&format!("upload{{tracker=YUS upload={second}}}")), "{output}");
        assert!(output.contains("dispatching (attempt 1)"));
    }
}
