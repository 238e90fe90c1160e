//! Natural-key deduplication

use crate::melt::types::NaturalKey;
use std::collections::HashMap;

/// Rows with one entry per natural key, plus what was collapsed
#[derive(Debug, Clone, PartialEq)]
pub struct Deduplicated<T> {
    pub rows: Vec<T>,

    /// `input_rows - output_rows`
    pub duplicates_removed: usize,

    /// Repeats whose non-key fields differed from the kept row
    pub conflicts: usize,
}

/// Keep the first row for every natural key, in input order.
///
/// Later rows with the same key are discarded even when their other fields
/// differ; such rows are counted in `conflicts`.
pub fn dedup_by_natural_key<T, I>(rows: I) -> Deduplicated<T>
where
    T: NaturalKey + PartialEq,
    I: IntoIterator<Item = T>,
{
    let mut seen: HashMap<String, usize> = HashMap::new();
    let mut kept: Vec<T> = Vec::new();
    let mut duplicates_removed = 0;
    let mut conflicts = 0;

    for row in rows {
        match seen.get(row.natural_key()).copied() {
            Some(idx) => {
                duplicates_removed += 1;
                if kept[idx] != row {
                    conflicts += 1;
                }
            }
            None => {
                seen.insert(row.natural_key().to_string(), kept.len());
                kept.push(row);
            }
        }
    }

    Deduplicated {
        rows: kept,
        duplicates_removed,
        conflicts,
    }
}
