//! Change tracking for the tracked fields of a project.
//!
//! [`diff`] is pure and deterministic. [`record`] stamps an entry, prepends it
//! to the project's history and enforces [`HISTORY_CAP`].

use chrono::NaiveDateTime;
use std::collections::BTreeMap;

use crate::model::field::{TrackedField, normalize_email, normalize_value};
use crate::model::project::{FieldChange, HistoryEntry, Project, TrackedSnapshot};

/// Maximum entries kept per project; older ones are dropped.
pub const HISTORY_CAP: usize = 50;

/// Timestamp layout used in history entries and `last_updated`.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Actor recorded when the caller supplied no email.
pub const UNKNOWN_ACTOR: &str = "unknown";

/// Fields whose normalized value differs between `before` and `after`.
#[must_use]
pub fn diff(
    before: &TrackedSnapshot,
    after: &TrackedSnapshot,
) -> BTreeMap<TrackedField, FieldChange> {
    TrackedField::ALL
        .into_iter()
        .filter_map(|field| {
            let old = normalize_value(before.get(field));
            let new = normalize_value(after.get(field));
            (old != new).then(|| (field, FieldChange { old, new }))
        })
        .collect()
}

/// Drop everything past the first `cap` entries (newest first).
pub fn trim(history: &mut Vec<HistoryEntry>, cap: usize) {
    history.truncate(cap);
}

/// Stamp for a new entry: `now`, but never earlier than the newest entry.
#[must_use]
pub fn next_timestamp(history: &[HistoryEntry], now: NaiveDateTime) -> String {
    let newest = history
        .first()
        .and_then(|entry| NaiveDateTime::parse_from_str(&entry.timestamp, TIMESTAMP_FORMAT).ok());
    let stamp = newest.map_or(now, |newest| newest.max(now));
    stamp.format(TIMESTAMP_FORMAT).to_string()
}

/// Snapshot of every tracked field, normalized.
#[must_use]
pub fn snapshot(project: &Project) -> TrackedSnapshot {
    let mut snapshot = TrackedSnapshot::default();
    for field in TrackedField::ALL {
        snapshot.set(field, normalize_value(project.get(field)));
    }
    snapshot
}

/// Prepend an entry describing `changes` and trim.
///
/// `previous_state` is taken from `project` as it is when called, so call
/// this before applying the new values. `changes` must not be empty.
pub fn record(
    project: &mut Project,
    changes: BTreeMap<String, FieldChange>,
    actor: &str,
    now: NaiveDateTime,
) -> HistoryEntry {
    debug_assert!(!changes.is_empty(), "history entries need at least one change");
    let user = normalize_email(actor);
    let entry = HistoryEntry {
        timestamp: next_timestamp(&project.history, now),
        user: if user.is_empty() {
            UNKNOWN_ACTOR.to_string()
        } else {
            user
        },
        changes,
        previous_state: snapshot(project),
    };
    project.history.insert(0, entry.clone());
    trim(&mut project.history, HISTORY_CAP);
    entry
}

/// Key a tracked-field diff by document field name.
#[must_use]
pub fn keyed(changes: BTreeMap<TrackedField, FieldChange>) -> BTreeMap<String, FieldChange> {
    changes
        .into_iter()
        .map(|(field, change)| (field.as_str().to_string(), change))
        .collect()
}
