//! Sync scheduling: freshness checks, per-calendar gating, and the
//! fetch → parse → merge → save pipeline.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use futures::future::join_all;

use crate::cache::{CacheEntry, CacheStore};
use crate::config::SyncPolicy;
use crate::date_range::DateRange;
use crate::diff::{DiffCounts, EventDiff};
use crate::error::{CalTrackError, CalTrackResult};
use crate::event::CalendarId;
use crate::feed::FeedFetcher;
use crate::ics::parse_feed;
use crate::merge::{merge, upsert};
use crate::source::CalendarSource;

type Clock = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;
type Gate = Arc<tokio::sync::Mutex<()>>;

/// Whether a calendar synced at `last_synced` is due for a refresh.
///
/// A ttl too large to add to the sync time never expires.
pub fn needs_sync(last_synced: Option<DateTime<Utc>>, now: DateTime<Utc>, policy: &SyncPolicy) -> bool {
    let Some(synced) = last_synced else {
        return true;
    };

    synced
        .checked_add_signed(policy.ttl)
        .and_then(|expiry| expiry.checked_sub_signed(policy.early_refresh))
        .is_some_and(|due| now >= due)
}

/// What a successful sync or import changed.
#[derive(Debug, Clone, PartialEq)]
pub struct SyncSummary {
    pub diffs: Vec<EventDiff>,
    /// VEVENTs the parser could not use.
    pub skipped: usize,
    /// Old events kept although the feed no longer lists them.
    pub retained_history: usize,
    /// Events in the cache entry after the merge.
    pub total: usize,
    /// Name the feed gives itself, if any.
    pub feed_name: Option<String>,
}

impl SyncSummary {
    pub fn counts(&self) -> DiffCounts {
        DiffCounts::from_diffs(&self.diffs)
    }
}

#[derive(Debug)]
pub enum SyncStatus {
    /// Synced recently enough that nothing was fetched.
    Fresh,
    Synced(SyncSummary),
    /// The previous entry, if any, is untouched and still readable.
    Failed {
        error: CalTrackError,
        stale_available: bool,
    },
}

/// Outcome of syncing one calendar.
#[derive(Debug)]
pub struct SyncReport {
    pub source: CalendarSource,
    pub status: SyncStatus,
}

impl SyncReport {
    pub fn is_failure(&self) -> bool {
        matches!(self.status, SyncStatus::Failed { .. })
    }
}

/// What readers get for a calendar.
#[derive(Debug, Clone, PartialEq)]
pub enum CalendarData {
    Available(CacheEntry),
    NoData,
}

impl CalendarData {
    pub fn entry(&self) -> Option<&CacheEntry> {
        match self {
            CalendarData::Available(entry) => Some(entry),
            CalendarData::NoData => None,
        }
    }
}

/// Drives syncs against a fetcher and a cache store.
///
/// At most one sync or import runs per calendar at a time; different
/// calendars proceed in parallel. Readers never wait on a sync.
///
/// Store calls made while syncing run on tokio's blocking pool, so slow disk
/// I/O for one calendar does not hold up the others.
pub struct Syncer<F, S> {
    fetcher: F,
    store: Arc<S>,
    policy: SyncPolicy,
    gates: Mutex<HashMap<CalendarId, Gate>>,
    clock: Clock,
}

impl<F: FeedFetcher, S: CacheStore + 'static> Syncer<F, S> {
    pub fn new(fetcher: F, store: S, policy: SyncPolicy) -> Self {
        Syncer {
            fetcher,
            store: Arc::new(store),
            policy,
            gates: Mutex::new(HashMap::new()),
            clock: Arc::new(Utc::now),
        }
    }

    /// Replace the wall clock, e.g. to pin `now` in tests.
    pub fn with_clock(mut self, clock: impl Fn() -> DateTime<Utc> + Send + Sync + 'static) -> Self {
        self.clock = Arc::new(clock);
        self
    }

    pub fn fetcher(&self) -> &F {
        &self.fetcher
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    fn now(&self) -> DateTime<Utc> {
        (self.clock)()
    }

    fn gate(&self, id: &CalendarId) -> Gate {
        let mut gates = self.gates.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        gates.entry(*id).or_default().clone()
    }

    /// Run a store operation on the blocking pool.
    async fn blocking<T, Op>(&self, op: Op) -> CalTrackResult<T>
    where
        T: Send + 'static,
        Op: FnOnce(&S) -> CalTrackResult<T> + Send + 'static,
    {
        let store = Arc::clone(&self.store);
        tokio::task::spawn_blocking(move || op(&store))
            .await
            .map_err(std::io::Error::from)?
    }

    fn horizon(&self, now: DateTime<Utc>) -> DateRange {
        DateRange::around(now, self.policy.lookback, self.policy.lookahead)
    }

    /// Whether `entry` is due for a refresh right now.
    pub fn is_due(&self, entry: Option<&CacheEntry>) -> bool {
        needs_sync(entry.and_then(|e| e.last_synced), self.now(), &self.policy)
    }

    /// Sync one calendar unless it is still fresh (or `force` is set).
    ///
    /// Errors never escape: they are reported in the status and leave the
    /// stored entry as it was.
    pub async fn sync_calendar(&self, source: &CalendarSource, force: bool) -> SyncReport {
        let id = source.id();
        let gate = self.gate(&id);
        let _guard = gate.lock().await;

        let status = match self.run_sync(source, id, force).await {
            Ok(status) => status,
            Err(error) => {
                log::warn!("Sync of '{}' failed: {}", source.name, error);
                let stale_available =
                    matches!(self.blocking(move |store| store.load(&id)).await, Ok(Some(_)));
                SyncStatus::Failed {
                    error,
                    stale_available,
                }
            }
        };

        SyncReport {
            source: source.clone(),
            status,
        }
    }

    async fn run_sync(
        &self,
        source: &CalendarSource,
        id: CalendarId,
        force: bool,
    ) -> CalTrackResult<SyncStatus> {
        // Checked under the gate so a sync that just finished is seen
        let existing = self.blocking(move |store| store.load(&id)).await?;
        let now = self.now();

        if !force && !needs_sync(existing.as_ref().and_then(|e| e.last_synced), now, &self.policy) {
            log::debug!("'{}' is fresh, skipping", source.name);
            return Ok(SyncStatus::Fresh);
        }

        let bytes = self.fetcher.fetch(source).await?;
        let parsed = parse_feed(&bytes, source, &self.horizon(now))?;

        let outcome = merge(existing.as_ref(), parsed.events, now, &self.policy);
        let total = outcome.entry.len();
        let entry = outcome.entry;
        self.blocking(move |store| store.save(&id, &entry)).await?;

        let summary = SyncSummary {
            skipped: parsed.skipped,
            retained_history: outcome.retained_history,
            total,
            feed_name: parsed.calendar_name,
            diffs: outcome.diffs,
        };

        let counts = summary.counts();
        log::info!(
            "Synced '{}': {} created, {} updated, {} deleted, {} total",
            source.name,
            counts.created,
            counts.updated,
            counts.deleted,
            summary.total
        );

        Ok(SyncStatus::Synced(summary))
    }

    /// Sync every source concurrently, reporting in input order.
    pub async fn sync_all(&self, sources: &[CalendarSource], force: bool) -> Vec<SyncReport> {
        join_all(sources.iter().map(|source| self.sync_calendar(source, force))).await
    }

    /// Merge an uploaded ICS file into a calendar without deleting anything.
    pub async fn import(&self, source: &CalendarSource, bytes: &[u8]) -> CalTrackResult<SyncSummary> {
        let id = source.id();
        let gate = self.gate(&id);
        let _guard = gate.lock().await;

        let existing = self.blocking(move |store| store.load(&id)).await?;
        let parsed = parse_feed(bytes, source, &self.horizon(self.now()))?;

        let outcome = upsert(existing.as_ref(), parsed.events);
        let total = outcome.entry.len();
        let entry = outcome.entry;
        self.blocking(move |store| store.save(&id, &entry)).await?;

        log::info!(
            "Imported {} events into '{}'",
            outcome.diffs.len(),
            source.name
        );

        Ok(SyncSummary {
            skipped: parsed.skipped,
            retained_history: outcome.retained_history,
            total,
            feed_name: parsed.calendar_name,
            diffs: outcome.diffs,
        })
    }

    /// Current cached data for a calendar, without waiting for any sync.
    ///
    /// Reads the store directly on the calling thread.
    pub fn snapshot(&self, id: &CalendarId) -> CalTrackResult<CalendarData> {
        Ok(match self.store.load(id)? {
            Some(entry) => CalendarData::Available(entry),
            None => CalendarData::NoData,
        })
    }

    /// Delete a calendar's cache entry. Returns whether one existed.
    pub async fn clear(&self, source: &CalendarSource) -> CalTrackResult<bool> {
        let id = source.id();
        let gate = self.gate(&id);
        let _guard = gate.lock().await;

        self.blocking(move |store| store.remove(&id)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn at(h: u32, m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 10, h, m, 0).unwrap()
    }

    #[test]
    fn test_never_synced_needs_sync() {
        assert!(needs_sync(None, at(12, 0), &SyncPolicy::default()));
    }

    #[test]
    fn test_fresh_within_ttl() {
        let policy = SyncPolicy::default();
        let synced = at(0, 0);
        assert!(!needs_sync(Some(synced), synced + Duration::hours(12), &policy));
    }

    #[test]
    fn test_early_refresh_window() {
        let policy = SyncPolicy::default();
        let synced = at(0, 0);
        let due = synced + policy.ttl - policy.early_refresh;

        assert!(!needs_sync(Some(synced), due - Duration::seconds(1), &policy));
        assert!(needs_sync(Some(synced), due, &policy));
        assert!(needs_sync(Some(synced), synced + policy.ttl + Duration::hours(1), &policy));
    }

    #[test]
    fn test_huge_ttl_never_expires() {
        let policy = SyncPolicy {
            ttl: Duration::days(100_000_000),
            ..SyncPolicy::default()
        };
        let synced = at(0, 0);

        assert!(!needs_sync(Some(synced), synced + Duration::days(365 * 100), &policy));
        assert!(needs_sync(None, synced, &policy));
    }

    #[test]
    fn test_calendar_data_entry() {
        assert!(CalendarData::NoData.entry().is_none());
        let data = CalendarData::Available(CacheEntry::default());
        assert_eq!(data.entry().map(|e| e.len()), Some(0));
    }
}
