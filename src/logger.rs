//! Session logger: routes all `tracing` output to a single file in the OS
//! data directory.
//!
//! The file is **truncated (overwritten) at each launch**, so it only ever
//! contains output from the most-recent session.
//!
//! Log location:
//!   Windows:  `%APPDATA%\RasterLab\rasterlab.log`
//!   Linux:    `~/.local/share/RasterLab/rasterlab.log`
//!   macOS:    `~/Library/Application Support/RasterLab/rasterlab.log`

use std::fs::{self, OpenOptions};
use std::path::PathBuf;
use std::sync::{Mutex, OnceLock};

use tracing::Level;
use tracing_subscriber::fmt::writer::MakeWriterExt;

static LOG_PATH: OnceLock<PathBuf> = OnceLock::new();

/// Returns the path to the current session log file.
pub fn log_path() -> Option<&'static PathBuf> {
    LOG_PATH.get()
}

/// Initialise the session logger. Call once, before any engine work.
///
/// * Creates (or truncates) the log file and installs it as the global
///   `tracing` subscriber at `level`.
/// * With `echo_stderr`, events are also printed to stderr.
/// * Installs a panic hook that logs the panic before running the default
///   handler.
pub fn init(level: Level, echo_stderr: bool) {
    let path = log_file_path();

    if let Some(parent) = path.parent() {
        let _ = fs::create_dir_all(parent);
    }

    let file = OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(true)
        .open(&path);

    let file = match file {
        Ok(f) => f,
        Err(e) => {
            // Not fatal, run without a log file
            eprintln!("[logger] Failed to open log file {:?}: {}", path, e);
            return;
        }
    };
    let _ = LOG_PATH.set(path.clone());

    let builder = tracing_subscriber::fmt()
        .with_max_level(level)
        .with_ansi(false)
        .with_thread_names(true);
    let installed = if echo_stderr {
        builder.with_writer(Mutex::new(file).and(std::io::stderr)).try_init()
    } else {
        builder.with_writer(Mutex::new(file)).try_init()
    };
    if installed.is_err() {
        // Another subscriber is already active (tests, embedding app).
        return;
    }

    tracing::info!(log = %path.display(), "=== RasterLab session started ===");

    let prev = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        tracing::error!("PANIC: {}", info);
        prev(info);
    }));
}

fn log_file_path() -> PathBuf {
    data_dir().join("RasterLab").join("rasterlab.log")
}

/// Platform data directory (without the app sub-folder).
fn data_dir() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        if let Ok(appdata) = std::env::var("APPDATA") {
            return PathBuf::from(appdata);
        }
    }
    #[cfg(target_os = "macos")]
    {
        if let Ok(home) = std::env::var("HOME") {
            return PathBuf::from(home)
                .join("Library")
                .join("Application Support");
        }
    }
    // Linux / fallback
    if let Ok(xdg) = std::env::var("XDG_DATA_HOME") {
        return PathBuf::from(xdg);
    }
    if let Ok(home) = std::env::var("HOME") {
        return PathBuf::from(home).join(".local").join("share");
    }
    // Last resort: current working directory
    PathBuf::from(".")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_file_lives_under_app_folder() {
        let path = log_file_path();
        assert!(path.ends_with("RasterLab/rasterlab.log"));
    }
}
