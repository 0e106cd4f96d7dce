//! Whole-collection persistence of events in a single JSON file.
//!
//! Every operation runs as one critical section: an in-process mutex plus an
//! advisory lock on a sibling `.lock` file, so a read-modify-write can never
//! interleave with another one from this process or another eventcal process.
//! Writes go to a temp file that is renamed over the target, so readers see
//! either the old or the new collection.
//!
//! The whole file is rewritten on every change.

use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

use fs2::FileExt;
use tracing::{debug, warn};

use crate::error::{StoreError, StoreResult};
use crate::event::{Event, EventId};

const TEMP_SUFFIX: &str = ".tmp";
const LOCK_SUFFIX: &str = ".lock";
const CORRUPT_SUFFIX: &str = ".corrupt";

#[derive(Debug)]
pub struct EventStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl EventStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        EventStore {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// All persisted events, in file order.
    ///
    /// A missing, empty, unreadable or corrupt file yields an empty list; the
    /// problem is logged rather than returned. If the lock file cannot be
    /// created (e.g. a read-only directory) the file is read without it.
    pub fn load(&self) -> Vec<Event> {
        let _guard = self.guard();

        let _lock = match FileLock::shared(&sibling(&self.path, LOCK_SUFFIX)) {
            Ok(lock) => Some(lock),
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "Could not lock events file, reading without the lock");
                None
            }
        };

        match self.read_events() {
            Ok(events) => events,
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "Could not load events, using an empty list");
                Vec::new()
            }
        }
    }

    /// Replace the persisted collection with `events`.
    pub fn save(&self, events: &[Event]) -> StoreResult<()> {
        let _guard = self.guard();
        let _lock = FileLock::exclusive(&sibling(&self.path, LOCK_SUFFIX))?;

        self.write_events(events)
    }

    /// Append `event` to the persisted collection.
    pub fn add(&self, event: Event) -> StoreResult<()> {
        self.modify(|events| events.push(event))
    }

    /// Remove the event with `id`. Removing an absent id is a no-op.
    pub fn remove(&self, id: EventId) -> StoreResult<()> {
        self.modify(|events| events.retain(|e| e.id != id))
    }

    /// Run `mutate` on the current collection and persist the result, all in
    /// one critical section. Nothing is written if the collection is unchanged.
    pub fn modify<T>(&self, mutate: impl FnOnce(&mut Vec<Event>) -> T) -> StoreResult<T> {
        let _guard = self.guard();
        let _lock = FileLock::exclusive(&sibling(&self.path, LOCK_SUFFIX))?;

        let mut events = self.read_for_update()?;
        let before = events.clone();

        let output = mutate(&mut events);

        if events != before {
            self.write_events(&events)?;
        } else {
            debug!(path = %self.path.display(), "Collection unchanged, skipping write");
        }

        Ok(output)
    }

    fn guard(&self) -> MutexGuard<'_, ()> {
        // Guards no data; poisoning is ignored.
        self.lock.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn read_events(&self) -> StoreResult<Vec<Event>> {
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(StoreError::io(&self.path, e)),
        };

        if content.trim().is_empty() {
            return Ok(Vec::new());
        }

        let events: Option<Vec<Event>> =
            serde_json::from_str(&content).map_err(|source| StoreError::CorruptData {
                path: self.path.clone(),
                source,
            })?;

        Ok(events.unwrap_or_default())
    }

    /// Like `read_events`, but a corrupt file is copied aside and treated as
    /// empty so the mutation can go ahead. Other read failures abort the
    /// mutation instead of overwriting a file we could not read.
    fn read_for_update(&self) -> StoreResult<Vec<Event>> {
        match self.read_events() {
            Err(StoreError::CorruptData { path, source }) => {
                let backup = sibling(&path, CORRUPT_SUFFIX);
                fs::copy(&path, &backup).map_err(|e| StoreError::io(&backup, e))?;
                warn!(
                    path = %path.display(),
                    backup = %backup.display(),
                    error = %source,
                    "Event file is corrupt, preserved a copy and starting from an empty list"
                );
                Ok(Vec::new())
            }
            other => other,
        }
    }

    fn write_events(&self, events: &[Event]) -> StoreResult<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| StoreError::io(parent, e))?;
        }

        let content =
            serde_json::to_string_pretty(events).map_err(|e| StoreError::io(&self.path, e.into()))?;

        let temp = sibling(&self.path, TEMP_SUFFIX);
        fs::write(&temp, content).map_err(|e| StoreError::io(&temp, e))?;

        if let Err(e) = fs::rename(&temp, &self.path) {
            let _ = fs::remove_file(&temp);
            return Err(StoreError::io(&self.path, e));
        }

        debug!(path = %self.path.display(), count = events.len(), "Saved events");
        Ok(())
    }
}

/// `events.json` + `.lock` -> `events.json.lock`
fn sibling(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(suffix);
    PathBuf::from(name)
}

/// Advisory lock on a file, released on drop.
struct FileLock {
    file: File,
}

impl FileLock {
    fn shared(path: &Path) -> StoreResult<Self> {
        let file = Self::open(path)?;
        file.lock_shared().map_err(|e| StoreError::io(path, e))?;
        Ok(FileLock { file })
    }

    fn exclusive(path: &Path) -> StoreResult<Self> {
        let file = Self::open(path)?;
        file.lock_exclusive().map_err(|e| StoreError::io(path, e))?;
        Ok(FileLock { file })
    }

    fn open(path: &Path) -> StoreResult<File> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| StoreError::io(parent, e))?;
        }

        OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)
            .map_err(|e| StoreError::io(path, e))
    }
}

impl Drop for FileLock {
    fn drop(&mut self) {
        let _ = FileExt::unlock(&self.file);
    }
}
