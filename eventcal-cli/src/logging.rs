//! Log setup: human-readable records on stderr, plus warnings and errors
//! appended to the error log file.

use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::{EnvFilter, Layer, layer::SubscriberExt, util::SubscriberInitExt};

const LOG_ENV: &str = "EVENTCAL_LOG";

pub fn init(log_path: Option<&Path>) {
    let stderr_filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("warn"));

    let stderr_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_filter(stderr_filter);

    // A log file we cannot open is not worth failing over.
    let file_layer = log_path.and_then(open_log_file).map(|file| {
        tracing_subscriber::fmt::layer()
            .with_ansi(false)
            .with_writer(Mutex::new(file))
            .with_filter(LevelFilter::WARN)
    });

    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(file_layer)
        .init();
}

fn open_log_file(path: &Path) -> Option<File> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).ok()?;
    }

    OpenOptions::new().create(true).append(true).open(path).ok()
}

/// Record panics in the error log before the default output.
pub fn install_panic_hook(log_path: Option<PathBuf>) {
    std::panic::set_hook(Box::new(move |info| {
        let backtrace = std::backtrace::Backtrace::force_capture();
        tracing::error!(panic = %info, %backtrace, "Unexpected panic");
        eprintln!("{}", generic_message(log_path.as_deref()));
    }));
}

pub fn generic_message(log_path: Option<&Path>) -> String {
    match log_path {
        Some(path) => format!(
            "Something went wrong. Details were written to {}",
            path.display()
        ),
        None => format!("Something went wrong. Run with {LOG_ENV}=debug for details"),
    }
}
