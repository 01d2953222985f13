//! Core of caltrack: keeps a durable, deduplicated local cache of events from
//! remote `.ics` feeds.
//!
//! - `feed` fetches raw feed bytes, `ics` turns them into [`Event`]s
//! - `merge` reconciles a fresh feed with the cached entry
//! - `cache` persists entries, `sync` schedules and gates the whole pipeline
//! - `dataset` flattens cached events into per-day rows for reporting

pub mod cache;
pub mod config;
pub mod dataset;
pub mod date_range;
pub mod diff;
pub mod error;
pub mod event;
pub mod feed;
pub mod fragment;
pub mod ics;
pub mod merge;
pub mod source;
pub mod sync;
pub mod time_mode;

pub use cache::{CacheEntry, CacheStore, FileCacheStore, MemoryCacheStore};
pub use config::{SyncPolicy, TrackerConfig};
pub use error::{CalTrackError, CalTrackResult};
pub use event::{CalendarId, Event};
pub use source::CalendarSource;
pub use sync::{CalendarData, SyncReport, SyncStatus, SyncSummary, Syncer};
pub use time_mode::TimeMode;
