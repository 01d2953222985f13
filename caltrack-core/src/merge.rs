//! Reconciliation of a cached calendar with a freshly parsed feed.
//!
//! Feeds commonly drop old entries once they fall out of their retention
//! window, so a fresh feed is only authoritative for events starting inside
//! the trust window (`now - trust_window` onwards, future included):
//!
//! - cached events older than the boundary are kept whether or not the feed
//!   still lists them;
//! - cached events inside the window are replaced by the fresh version, or
//!   dropped when the feed no longer has them;
//! - fresh events unknown to the cache are added.
//!
//! Everything here is pure: callers supply `now` and persist the result.

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Duration, Utc};

use crate::cache::CacheEntry;
use crate::config::SyncPolicy;
use crate::diff::{DiffCounts, EventDiff};
use crate::event::Event;

/// Result of merging a fresh batch into a cache entry.
#[derive(Debug, Clone, PartialEq)]
pub struct MergeOutcome {
    pub entry: CacheEntry,
    /// Changes relative to the previous entry, ordered by event start.
    pub diffs: Vec<EventDiff>,
    /// Old events kept although the feed no longer lists them.
    pub retained_history: usize,
    /// Fresh events dropped because a later one in the batch had the same uid.
    pub duplicates: usize,
}

impl MergeOutcome {
    pub fn counts(&self) -> DiffCounts {
        DiffCounts::from_diffs(&self.diffs)
    }
}

/// Start of the trust window.
pub fn trust_boundary(now: DateTime<Utc>, trust_window: Duration) -> DateTime<Utc> {
    now.checked_sub_signed(trust_window).unwrap_or(DateTime::<Utc>::MIN_UTC)
}

/// Merge a synced feed into `existing` and stamp the entry with `now`.
pub fn merge(
    existing: Option<&CacheEntry>,
    fresh: Vec<Event>,
    now: DateTime<Utc>,
    policy: &SyncPolicy,
) -> MergeOutcome {
    let boundary = trust_boundary(now, policy.trust_window);
    let mut outcome = reconcile(existing, fresh, Some(boundary));
    outcome.entry.last_synced = Some(now);
    outcome
}

/// Merge events from an uploaded file into `existing`.
///
/// An upload is not a complete picture of the calendar, so nothing is ever
/// deleted and the sync timestamp is left alone.
pub fn upsert(existing: Option<&CacheEntry>, incoming: Vec<Event>) -> MergeOutcome {
    let mut outcome = reconcile(existing, incoming, None);
    outcome.entry.last_synced = existing.and_then(|e| e.last_synced);
    outcome
}

/// Collapse duplicate uids, keeping the last occurrence in batch order.
fn dedup_last_wins(batch: Vec<Event>) -> (Vec<Event>, usize) {
    let mut last_index: HashMap<String, usize> = HashMap::new();
    for (i, event) in batch.iter().enumerate() {
        last_index.insert(event.uid.clone(), i);
    }

    let duplicates = batch.len() - last_index.len();
    let unique = batch
        .into_iter()
        .enumerate()
        .filter(|(i, event)| last_index.get(&event.uid) == Some(i))
        .map(|(_, event)| event)
        .collect();

    (unique, duplicates)
}

/// Core reconciliation. With a boundary, cached events starting at or after it
/// are deleted when the batch lacks them; without one nothing is deleted.
fn reconcile(
    existing: Option<&CacheEntry>,
    batch: Vec<Event>,
    boundary: Option<DateTime<Utc>>,
) -> MergeOutcome {
    let (batch, duplicates) = dedup_last_wins(batch);
    let cached: &[Event] = existing.map(|e| e.events.as_slice()).unwrap_or_default();

    let cached_by_uid: HashMap<&str, &Event> =
        cached.iter().map(|e| (e.uid.as_str(), e)).collect();
    let batch_by_uid: HashMap<&str, &Event> =
        batch.iter().map(|e| (e.uid.as_str(), e)).collect();

    let mut merged: BTreeMap<String, Event> = BTreeMap::new();
    let mut diffs = Vec::new();
    let mut retained_history = 0;

    for event in cached {
        if batch_by_uid.contains_key(event.uid.as_str()) {
            // superseded by the fresh version below
            continue;
        }

        let trusted = boundary.is_some_and(|b| event.starts_at_or_after(b));
        if trusted {
            if let Some(diff) = EventDiff::get_diff(Some(event.clone()), None) {
                diffs.push(diff);
            }
        } else {
            if boundary.is_some() {
                retained_history += 1;
            }
            merged.insert(event.uid.clone(), event.clone());
        }
    }

    for event in batch {
        let previous = cached_by_uid.get(event.uid.as_str()).map(|e| (*e).clone());
        if let Some(diff) = EventDiff::get_diff(previous, Some(event.clone())) {
            diffs.push(diff);
        }
        merged.insert(event.uid.clone(), event);
    }

    let mut events: Vec<Event> = merged.into_values().collect();
    events.sort_by(|a, b| a.start.cmp(&b.start).then_with(|| a.uid.cmp(&b.uid)));

    diffs.sort_by(|a, b| {
        let (a, b) = (a.event(), b.event());
        a.start.cmp(&b.start).then_with(|| a.uid.cmp(&b.uid))
    });

    MergeOutcome {
        entry: CacheEntry::new(events, None),
        diffs,
        retained_history,
        duplicates,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diff::DiffKind;
    use crate::event::CalendarId;
    use chrono::TimeZone;
    use std::collections::HashSet;

    fn policy() -> SyncPolicy {
        SyncPolicy::default()
    }

    fn trusting(days: i64) -> SyncPolicy {
        SyncPolicy {
            trust_window: Duration::days(days),
            ..SyncPolicy::default()
        }
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 10, 12, 0, 0).unwrap()
    }

    fn event(uid: &str, start: DateTime<Utc>, title: &str) -> Event {
        Event {
            uid: uid.to_string(),
            calendar_id: CalendarId::from_url("https://example.com/work.ics"),
            start,
            end: start + Duration::hours(1),
            title: title.to_string(),
            category: None,
        }
    }

    fn uids(entry: &CacheEntry) -> Vec<&str> {
        entry.events.iter().map(|e| e.uid.as_str()).collect()
    }

    #[test]
    fn test_old_kept_recent_dropped_new_added() {
        let cache = CacheEntry::new(
            vec![
                event("1", Utc.with_ymd_and_hms(2024, 1, 10, 9, 0, 0).unwrap(), "Old"),
                event("2", now() - Duration::days(2), "Recent"),
            ],
            Some(now() - Duration::days(1)),
        );
        let fresh = vec![event("3", now() + Duration::days(1), "Future")];

        let outcome = merge(Some(&cache), fresh, now(), &policy());

        assert_eq!(uids(&outcome.entry), vec!["1", "3"]);
        assert_eq!(outcome.entry.last_synced, Some(now()));
        assert_eq!(outcome.retained_history, 1);
        assert_eq!(
            outcome.counts(),
            DiffCounts { created: 1, updated: 0, deleted: 1 }
        );
    }

    #[test]
    fn test_fresh_version_replaces_cached() {
        let start = now() - Duration::days(3);
        let cache = CacheEntry::new(vec![event("2", start, "Old")], Some(now()));

        let outcome = merge(Some(&cache), vec![event("2", start, "Updated")], now(), &policy());

        assert_eq!(outcome.entry.len(), 1);
        assert_eq!(outcome.entry.events[0].title, "Updated");
        assert_eq!(outcome.diffs.len(), 1);
        assert_eq!(outcome.diffs[0].kind, DiffKind::Update);
        assert_eq!(outcome.diffs[0].old.as_ref().unwrap().title, "Old");
    }

    #[test]
    fn test_unchanged_events_produce_no_diffs() {
        let start = now() + Duration::days(3);
        let cache = CacheEntry::new(vec![event("a", start, "Same")], None);

        let outcome = merge(Some(&cache), vec![event("a", start, "Same")], now(), &policy());

        assert!(outcome.diffs.is_empty());
        assert_eq!(outcome.entry.len(), 1);
    }

    #[test]
    fn test_first_sync_without_cache() {
        let fresh = vec![
            event("b", now() + Duration::days(1), "B"),
            event("a", now() - Duration::days(90), "A"),
        ];

        let outcome = merge(None, fresh, now(), &policy());

        assert_eq!(uids(&outcome.entry), vec!["a", "b"]);
        assert_eq!(outcome.counts().created, 2);
        assert_eq!(outcome.retained_history, 0);
    }

    #[test]
    fn test_duplicate_uids_in_batch_last_wins() {
        let start = now() + Duration::days(1);
        let fresh = vec![
            event("dup", start, "first"),
            event("other", start, "other"),
            event("dup", start + Duration::hours(2), "second"),
        ];

        let outcome = merge(None, fresh, now(), &policy());

        assert_eq!(outcome.duplicates, 1);
        assert_eq!(outcome.entry.len(), 2);
        let dup = outcome.entry.events.iter().find(|e| e.uid == "dup").unwrap();
        assert_eq!(dup.title, "second");
    }

    #[test]
    fn test_event_straddling_boundary_is_partitioned_by_start() {
        // starts just before the boundary and is still running afterwards
        let boundary = trust_boundary(now(), policy().trust_window);
        let mut long = event("long", boundary - Duration::minutes(1), "Sabbatical");
        long.end = now() + Duration::days(5);
        let cache = CacheEntry::new(vec![long.clone()], Some(now()));

        let outcome = merge(Some(&cache), Vec::new(), now(), &policy());

        assert_eq!(outcome.entry.events, vec![long]);
        assert!(outcome.diffs.is_empty());
    }

    #[test]
    fn test_event_exactly_on_boundary_is_trusted() {
        let boundary = trust_boundary(now(), policy().trust_window);
        let cache = CacheEntry::new(vec![event("edge", boundary, "Edge")], Some(now()));

        let outcome = merge(Some(&cache), Vec::new(), now(), &policy());

        assert!(outcome.entry.is_empty());
        assert_eq!(outcome.counts().deleted, 1);
    }

    #[test]
    fn test_fresh_copy_supersedes_old_event_with_same_uid() {
        let old_start = now() - Duration::days(60);
        let cache = CacheEntry::new(vec![event("moved", old_start, "Old slot")], Some(now()));

        let fresh = vec![event("moved", now() + Duration::days(2), "New slot")];
        let outcome = merge(Some(&cache), fresh, now(), &policy());

        assert_eq!(outcome.entry.len(), 1);
        assert_eq!(outcome.entry.events[0].title, "New slot");
        assert_eq!(outcome.counts().updated, 1);
    }

    #[test]
    fn test_trust_window_is_configurable() {
        let cache = CacheEntry::new(vec![event("x", now() - Duration::days(10), "X")], Some(now()));

        let narrow = merge(Some(&cache), Vec::new(), now(), &trusting(7));
        assert_eq!(narrow.entry.len(), 1);

        let wide = merge(Some(&cache), Vec::new(), now(), &trusting(14));
        assert!(wide.entry.is_empty());
    }

    #[test]
    fn test_unrepresentable_trust_window_trusts_everything() {
        let cache = CacheEntry::new(
            vec![event("ancient", now() - Duration::days(3650), "Kickoff")],
            Some(now()),
        );

        let outcome = merge(Some(&cache), Vec::new(), now(), &trusting(100_000_000));

        assert!(outcome.entry.is_empty());
        assert_eq!(outcome.retained_history, 0);
    }

    #[test]
    fn test_repeated_syncs_keep_history_and_unique_uids() {
        let mut entry: Option<CacheEntry> = None;
        let mut clock = now();

        // A feed that only ever shows the last two weeks and the next one
        for day in 0..90 {
            let fresh: Vec<Event> = (-14..7)
                .map(|offset| {
                    let start = clock + Duration::days(offset);
                    event(&format!("d{}", day + offset), start, "Daily")
                })
                .collect();
            entry = Some(merge(entry.as_ref(), fresh, clock, &policy()).entry);
            clock += Duration::days(1);
        }

        let entry = entry.unwrap();
        let unique: HashSet<_> = entry.events.iter().map(|e| e.uid.as_str()).collect();
        assert_eq!(unique.len(), entry.len());
        // the very first day is long out of the feed but still cached
        assert!(unique.contains("d-14"));
    }

    #[test]
    fn test_upsert_never_deletes_and_keeps_sync_time() {
        let synced = now() - Duration::hours(3);
        let cache = CacheEntry::new(
            vec![
                event("a", now() + Duration::days(1), "A"),
                event("b", now() + Duration::days(2), "B"),
            ],
            Some(synced),
        );

        let outcome = upsert(
            Some(&cache),
            vec![
                event("b", now() + Duration::days(2), "B (edited)"),
                event("c", now() + Duration::days(3), "C"),
            ],
        );

        assert_eq!(uids(&outcome.entry), vec!["a", "b", "c"]);
        assert_eq!(outcome.entry.last_synced, Some(synced));
        assert_eq!(outcome.counts(), DiffCounts { created: 1, updated: 1, deleted: 0 });
        assert_eq!(outcome.retained_history, 0);
    }

    #[test]
    fn test_upsert_into_empty_calendar_is_unsynced() {
        let outcome = upsert(None, vec![event("a", now(), "A")]);
        assert_eq!(outcome.entry.last_synced, None);
        assert_eq!(outcome.entry.len(), 1);
    }
}
