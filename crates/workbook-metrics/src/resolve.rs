//! Effective-record resolution.
//!
//! Workbook keeps a history of date-qualified records per subject (hourly
//! prices, capacity profiles). Exactly one of them applies at a given instant:
//! the one with the latest validity start that is not in the future.

use std::collections::BTreeMap;

use tracing::debug;

use workbook_core::{Dated, FinanceBalance, Timestamp};

/// Index of the record effective at `now`, if any.
///
/// Records starting strictly after `now` are never chosen. A record without a
/// validity start counts as valid since the beginning of time. Ties on the
/// start date go to the record seen first.
pub fn effective_index<T: Dated>(candidates: &[T], now: Timestamp) -> Option<usize> {
    let mut best: Option<(usize, Option<Timestamp>)> = None;
    for (i, candidate) in candidates.iter().enumerate() {
        let from = candidate.valid_from();
        if from.is_some_and(|f| f > now) {
            continue;
        }
        match best {
            Some((_, best_from)) if from <= best_from => {}
            _ => best = Some((i, from)),
        }
    }
    best.map(|(i, _)| i)
}

/// The record effective at `now`, if any.
pub fn resolve_effective<T: Dated>(candidates: &[T], now: Timestamp) -> Option<&T> {
    effective_index(candidates, now).map(|i| &candidates[i])
}

/// Group `records` by subject and keep each subject's effective record.
///
/// Records for which `subject` returns `None` are dropped (stale references).
/// Subjects whose every record lies in the future are left out.
pub fn resolve_by_subject<T, K, F>(records: Vec<T>, now: Timestamp, subject: F) -> BTreeMap<K, T>
where
    T: Dated,
    K: Ord + Clone + std::fmt::Debug,
    F: Fn(&T) -> Option<K>,
{
    let mut grouped: BTreeMap<K, Vec<T>> = BTreeMap::new();
    for record in records {
        if let Some(key) = subject(&record) {
            grouped.entry(key).or_default().push(record);
        }
    }

    grouped
        .into_iter()
        .filter_map(|(key, candidates)| match effective_index(&candidates, now) {
            Some(i) => candidates.into_iter().nth(i).map(|r| (key, r)),
            None => {
                debug!(subject = ?key, candidates = candidates.len(), "no effective record yet");
                None
            }
        })
        .collect()
}

/// Latest entry of a finance balance list: the highest id wins.
pub fn latest_balance(entries: &[FinanceBalance]) -> Option<&FinanceBalance> {
    entries.iter().max_by_key(|e| e.id)
}
