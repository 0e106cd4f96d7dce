//! Ensure only one `eventcal watch` delivers notifications for an events file.

use anyhow::{Context, Result};
use fs2::FileExt;
use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};

use crate::commands::user_bail;

/// A lock guard that releases the lock when dropped
pub struct LockGuard {
    _file: File,
}

fn lock_path(events_path: &Path) -> PathBuf {
    let mut name = events_path.as_os_str().to_owned();
    name.push(".watch.lock");
    PathBuf::from(name)
}

/// Acquire an exclusive lock, failing if another watcher is running
pub fn acquire_lock(events_path: &Path) -> Result<LockGuard> {
    let path = lock_path(events_path);

    if let Some(dir) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(dir)?;
    }

    let file = OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(false)
        .open(&path)
        .context("Failed to create lock file")?;

    if file.try_lock_exclusive().is_err() {
        user_bail!(
            "Another eventcal watcher is already running for {}.\n\
            If you believe this is an error, remove: {}",
            events_path.display(),
            path.display()
        );
    }

    Ok(LockGuard { _file: file })
}
