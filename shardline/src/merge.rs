//! Merging collections of readings.
//!
//! [`merge`] combines stored readings with newly ingested ones into a single
//! collection that is sorted in canonical order and holds at most one reading
//! per key. When both sides carry the same key the incoming reading wins,
//! and when one side lists a key more than once the last listing wins.
//!
//! # Algorithm
//!
//! 1. Stable-sort both sides, so equal keys keep their listed order.
//! 2. Collapse the base to one reading per key.
//! 3. For each incoming reading, binary-search the base and replace on a hit;
//!    otherwise binary-search an overflow list of unmatched incoming readings,
//!    replacing on a hit and appending on a miss.
//! 4. Concatenate base and overflow and sort again.
//!
//! Every step is O((n + m) log(n + m)).

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};

use crate::reading::Reading;

/// Returns a copy of `readings` in canonical order.
///
/// The sort is stable: readings sharing a key keep their relative order.
pub fn sort(readings: &[Reading]) -> Vec<Reading> {
    let mut sorted = readings.to_vec();
    sort_in_place(&mut sorted);
    sorted
}

fn sort_in_place(readings: &mut [Reading]) {
    readings.sort_by(Reading::key_cmp);
}

/// Collapses runs of equal keys in a sorted collection, keeping the last.
fn dedup_last_wins(sorted: Vec<Reading>) -> Vec<Reading> {
    let mut unique: Vec<Reading> = Vec::with_capacity(sorted.len());
    for reading in sorted {
        match unique.last_mut() {
            Some(last) if last.same_key(&reading) => *last = reading,
            _ => unique.push(reading),
        }
    }
    unique
}

/// Merges `incoming` into `base`.
///
/// Neither side needs to be sorted or free of duplicate keys. The result is
/// in canonical order, holds one reading per key, and takes the value of the
/// last incoming reading for any key present in `incoming`.
pub fn merge(base: &[Reading], incoming: &[Reading]) -> Vec<Reading> {
    let mut list = dedup_last_wins(sort(base));
    let check = sort(incoming);

    let mut overflow: Vec<Reading> = Vec::new();
    for reading in check {
        match list.binary_search_by(|held| held.key_cmp(&reading)) {
            Ok(i) => list[i] = reading,
            Err(_) => match overflow.binary_search_by(|held| held.key_cmp(&reading)) {
                Ok(j) => overflow[j] = reading,
                Err(j) => overflow.insert(j, reading),
            },
        }
    }

    list.append(&mut overflow);
    sort_in_place(&mut list);
    list
}

/// Merges by folding both sides into an ordered map keyed by identity.
///
/// Produces the same collection as [`merge`]. The map is ordered by
/// `(source, epoch)`, so its iteration order is already canonical.
pub fn merge_map(base: &[Reading], incoming: &[Reading]) -> Vec<Reading> {
    let mut folded: BTreeMap<(&str, DateTime<Utc>), &Reading> = BTreeMap::new();
    for reading in base.iter().chain(incoming) {
        folded.insert((reading.source.as_str(), reading.epoch), reading);
    }
    folded.into_values().cloned().collect()
}
