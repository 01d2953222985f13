//! Per-calendar event cache.
//!
//! Each calendar is persisted as `<cache_dir>/<calendar id>.json`. Writes go
//! to a temporary file that is synced and then renamed over the previous one,
//! so a reader (or a crash) only ever sees a complete entry.

use std::collections::HashMap;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::PathBuf;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{CalTrackError, CalTrackResult};
use crate::event::{CalendarId, Event};

const CACHE_FORMAT_VERSION: u32 = 1;

/// Merged events of one calendar and when they were last synced.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct CacheEntry {
    /// None when the entry was only ever filled by an import.
    pub last_synced: Option<DateTime<Utc>>,
    pub events: Vec<Event>,
}

impl CacheEntry {
    pub fn new(events: Vec<Event>, last_synced: Option<DateTime<Utc>>) -> Self {
        CacheEntry {
            last_synced,
            events,
        }
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Events sorted by start, then uid.
    pub fn sorted_events(&self) -> Vec<&Event> {
        let mut events: Vec<&Event> = self.events.iter().collect();
        events.sort_by(|a, b| a.start.cmp(&b.start).then_with(|| a.uid.cmp(&b.uid)));
        events
    }
}

/// Durable mapping from calendar id to cache entry.
pub trait CacheStore: Send + Sync {
    /// The stored entry, or None if the calendar was never cached.
    fn load(&self, id: &CalendarId) -> CalTrackResult<Option<CacheEntry>>;

    /// Replace the stored entry atomically.
    fn save(&self, id: &CalendarId, entry: &CacheEntry) -> CalTrackResult<()>;

    /// Drop the stored entry. Returns whether one existed.
    fn remove(&self, id: &CalendarId) -> CalTrackResult<bool>;
}

#[derive(Serialize)]
struct CacheFileRef<'a> {
    version: u32,
    calendar_id: &'a CalendarId,
    #[serde(flatten)]
    entry: &'a CacheEntry,
}

#[derive(Deserialize)]
struct CacheFile {
    version: u32,
    #[serde(flatten)]
    entry: CacheEntry,
}

/// Cache store writing one JSON file per calendar.
#[derive(Debug, Clone)]
pub struct FileCacheStore {
    dir: PathBuf,
}

impl FileCacheStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        FileCacheStore { dir: dir.into() }
    }

    pub fn path_for(&self, id: &CalendarId) -> PathBuf {
        self.dir.join(format!("{}.json", id))
    }

    fn temp_path_for(&self, id: &CalendarId) -> PathBuf {
        self.dir.join(format!(".{}.json.tmp", id))
    }
}

impl CacheStore for FileCacheStore {
    fn load(&self, id: &CalendarId) -> CalTrackResult<Option<CacheEntry>> {
        let path = self.path_for(id);

        if !path.exists() {
            return Ok(None);
        }

        let content = std::fs::read_to_string(&path)?;
        if content.trim().is_empty() {
            log::warn!("Ignoring empty cache file {}", path.display());
            return Ok(None);
        }

        let file: CacheFile =
            serde_json::from_str(&content).map_err(|e| CalTrackError::CacheCorrupt {
                path: path.display().to_string(),
                reason: e.to_string(),
            })?;

        if file.version > CACHE_FORMAT_VERSION {
            return Err(CalTrackError::CacheCorrupt {
                path: path.display().to_string(),
                reason: format!("unsupported format version {}", file.version),
            });
        }

        Ok(Some(file.entry))
    }

    fn save(&self, id: &CalendarId, entry: &CacheEntry) -> CalTrackResult<()> {
        std::fs::create_dir_all(&self.dir)?;

        let path = self.path_for(id);
        let temp = self.temp_path_for(id);

        let file = CacheFileRef {
            version: CACHE_FORMAT_VERSION,
            calendar_id: id,
            entry,
        };

        let mut writer = BufWriter::new(File::create(&temp)?);
        serde_json::to_writer_pretty(&mut writer, &file)
            .map_err(|e| CalTrackError::Serialization(e.to_string()))?;
        writer.flush()?;
        writer
            .into_inner()
            .map_err(|e| CalTrackError::CacheIo(e.into_error()))?
            .sync_all()?;

        std::fs::rename(&temp, &path)?;
        Ok(())
    }

    fn remove(&self, id: &CalendarId) -> CalTrackResult<bool> {
        match std::fs::remove_file(self.path_for(id)) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }
}

/// In-process store, for tests and callers that do not need persistence.
#[derive(Debug, Default)]
pub struct MemoryCacheStore {
    entries: Mutex<HashMap<CalendarId, CacheEntry>>,
}

impl MemoryCacheStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn entries(&self) -> std::sync::MutexGuard<'_, HashMap<CalendarId, CacheEntry>> {
        self.entries.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl CacheStore for MemoryCacheStore {
    fn load(&self, id: &CalendarId) -> CalTrackResult<Option<CacheEntry>> {
        Ok(self.entries().get(id).cloned())
    }

    fn save(&self, id: &CalendarId, entry: &CacheEntry) -> CalTrackResult<()> {
        self.entries().insert(*id, entry.clone());
        Ok(())
    }

    fn remove(&self, id: &CalendarId) -> CalTrackResult<bool> {
        Ok(self.entries().remove(id).is_some())
    }
}
