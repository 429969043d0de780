//! Tracing configuration and log routing.
//!
//! Logs go to stderr with a compact formatter; stdout is reserved for the JSON run result.
//! A second, ANSI-free layer appends to a log file chosen in this order: the explicit
//! [`LogOptions::log_file`], `DIGEST_LOG_FILE`, then `logs/coursedigest.log`.
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use tracing_appender::non_blocking::{NonBlocking, WorkerGuard};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

static LOG_GUARD: OnceLock<WorkerGuard> = OnceLock::new();

const DEFAULT_LOG_DIR: &str = "logs";
const DEFAULT_LOG_NAME: &str = "coursedigest.log";

/// Knobs the CLI exposes for log routing.
#[derive(Debug, Clone, Default)]
pub struct LogOptions {
    /// Raise the default filter from `info` to `debug` when `RUST_LOG` is unset.
    pub verbose: bool,
    /// Explicit log file path.
    pub log_file: Option<PathBuf>,
    /// Skip the file layer entirely.
    pub disable_file: bool,
}

/// Configure tracing subscribers for stderr and optional file logging.
///
/// `RUST_LOG` always wins over the verbosity flag.
pub fn init_tracing(options: &LogOptions) {
    let default_level = if options.verbose { "debug" } else { "info" };
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let stderr_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false)
        .compact();

    let registry = tracing_subscriber::registry()
        .with(env_filter)
        .with(stderr_layer);

    let writer = if options.disable_file {
        None
    } else {
        resolve_log_path(options.log_file.as_deref()).and_then(|path| open_writer(&path))
    };

    match writer {
        Some(writer) => {
            let file_layer = fmt::layer()
                .with_writer(writer)
                .with_target(true)
                .with_ansi(false)
                .compact();
            registry.with(file_layer).init();
        }
        None => registry.init(),
    }
}

fn resolve_log_path(explicit: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit {
        return Some(path.to_path_buf());
    }
    if let Some(path) = std::env::var_os("DIGEST_LOG_FILE").filter(|value| !value.is_empty()) {
        return Some(PathBuf::from(path));
    }
    if let Err(err) = std::fs::create_dir_all(DEFAULT_LOG_DIR) {
        eprintln!("Failed to create logs directory: {err}");
        return None;
    }
    Some(Path::new(DEFAULT_LOG_DIR).join(DEFAULT_LOG_NAME))
}

/// Open `path` for appending behind a non‑blocking writer.
fn open_writer(path: &Path) -> Option<NonBlocking> {
    match std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
    {
        Ok(file) => {
            let (non_blocking, guard) = tracing_appender::non_blocking(file);
            let _ = LOG_GUARD.set(guard);
            Some(non_blocking)
        }
        Err(err) => {
            eprintln!("Failed to open log file {}: {err}", path.display());
            None
        }
    }
}
