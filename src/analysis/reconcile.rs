/// Hourly series reconciliation.
///
/// Merges a freshly fetched batch into the persisted history for a site.
/// The result covers every hour between the earliest and latest timestamp of
/// either input, so a site's history never has holes even when a fetch
/// skipped hours. New data wins wherever it has a value; hours or fields the
/// new batch does not carry keep whatever the history had.

use chrono::Duration;

use crate::model::{Row, Series, Timestamp};

/// Upserts `incoming` into `existing`.
///
/// Both inputs are already validated (`Series` only holds hour-aligned
/// timestamps), so this cannot fail. Present incoming fields overwrite
/// existing ones, including late corrections with a different value; an
/// incoming row with no fields leaves the existing row untouched.
pub fn reconcile(existing: &Series, incoming: &Series) -> Series {
    let Some((start, end)) = hourly_span(existing, incoming) else {
        return Series::new();
    };

    let mut merged = Series::new();
    let mut ts = start;
    while ts <= end {
        let mut row = existing.get(&ts).cloned().unwrap_or_default();
        if let Some(update) = incoming.get(&ts) {
            overlay(&mut row, update);
        }
        merged.insert_aligned(ts, row);
        ts += Duration::hours(1);
    }
    merged
}

/// Copies every present field of `update` onto `row`.
fn overlay(row: &mut Row, update: &Row) {
    for (name, value) in update.iter() {
        row.set_opt(name, Some(value.clone()));
    }
}

/// Earliest and latest timestamp across both series.
fn hourly_span(a: &Series, b: &Series) -> Option<(Timestamp, Timestamp)> {
    let start = match (a.first_timestamp(), b.first_timestamp()) {
        (Some(x), Some(y)) => x.min(y),
        (Some(x), None) | (None, Some(x)) => x,
        (None, None) => return None,
    };
    let end = match (a.last_timestamp(), b.last_timestamp()) {
        (Some(x), Some(y)) => x.max(y),
        (Some(x), None) | (None, Some(x)) => x,
        (None, None) => return None,
    };
    Some((start, end))
}
