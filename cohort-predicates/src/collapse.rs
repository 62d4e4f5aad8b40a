//! Temporal collapsing
//!
//! Groups predicate rows by exact (subject_id, timestamp) and sums their
//! counts. Static rows share the key (subject, None), so all static facts of a
//! subject land in one row. Summation is commutative and associative, which is
//! what lets per-subject or per-batch partial results be merged later.

use crate::types::{PredicateRow, RowKey};
use std::collections::BTreeMap;

/// Collapse rows to one row per (subject_id, timestamp)
///
/// Output is ordered by subject, then the static row, then ascending time.
pub fn collapse(rows: impl IntoIterator<Item = PredicateRow>) -> Vec<PredicateRow> {
    let mut groups: BTreeMap<RowKey, PredicateRow> = BTreeMap::new();

    for row in rows {
        match groups.get_mut(&row.key()) {
            Some(existing) => existing.absorb(&row),
            None => {
                groups.insert(row.key(), row);
            }
        }
    }

    let collapsed: Vec<PredicateRow> = groups.into_values().collect();
    debug_assert!(has_unique_keys(&collapsed));
    collapsed
}

/// Merge batches that were each collapsed on their own
///
/// Gives the same result as collapsing the concatenation of the raw inputs.
pub fn merge(batches: impl IntoIterator<Item = Vec<PredicateRow>>) -> Vec<PredicateRow> {
    collapse(batches.into_iter().flatten())
}

/// True if rows are strictly ordered by key (which implies no duplicates)
pub fn has_unique_keys(rows: &[PredicateRow]) -> bool {
    rows.windows(2).all(|pair| pair[0].key() < pair[1].key())
}
