use std::fmt;

use serde::{Deserialize, Serialize};

use crate::diff::DiffKind;
use crate::event::Event;

/// One change applied to a cache entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventDiff {
    pub kind: DiffKind,
    pub old: Option<Event>,
    pub new: Option<Event>,
}

impl fmt::Display for EventDiff {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.event())
    }
}

impl EventDiff {
    /// Classify the change between two versions of an event.
    /// None when nothing changed.
    pub fn get_diff(old_event: Option<Event>, new_event: Option<Event>) -> Option<EventDiff> {
        let kind = match (&old_event, &new_event) {
            (None, Some(_)) => DiffKind::Create,
            (Some(_), None) => DiffKind::Delete,
            (Some(old), Some(new)) if old != new => DiffKind::Update,
            _ => return None,
        };

        Some(EventDiff {
            kind,
            old: old_event,
            new: new_event,
        })
    }

    /// Get the event (prefer new, fallback to old)
    pub fn event(&self) -> &Event {
        match (&self.new, &self.old) {
            (Some(event), _) | (None, Some(event)) => event,
            // get_diff never builds an empty diff
            (None, None) => unreachable!("EventDiff must have at least one event"),
        }
    }
}

/// Number of created, updated and deleted events.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DiffCounts {
    pub created: usize,
    pub updated: usize,
    pub deleted: usize,
}

impl DiffCounts {
    pub fn from_diffs<'a>(diffs: impl IntoIterator<Item = &'a EventDiff>) -> Self {
        let mut counts = DiffCounts::default();

        for diff in diffs {
            match diff.kind {
                DiffKind::Create => counts.created += 1,
                DiffKind::Update => counts.updated += 1,
                DiffKind::Delete => counts.deleted += 1,
            }
        }

        counts
    }

    pub fn is_empty(&self) -> bool {
        self.created == 0 && self.updated == 0 && self.deleted == 0
    }
}

impl std::ops::AddAssign for DiffCounts {
    fn add_assign(&mut self, other: Self) {
        self.created += other.created;
        self.updated += other.updated;
        self.deleted += other.deleted;
    }
}
