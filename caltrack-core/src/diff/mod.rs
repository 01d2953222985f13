//! Change records produced when a cache entry is merged with a fresh feed.

mod diff_kind;
mod event_diff;

pub use diff_kind::DiffKind;
pub use event_diff::{DiffCounts, EventDiff};
