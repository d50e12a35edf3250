//! Dominant-status selection over one or more buckets.

use crate::types::{Precedence, Status, StatsBucket};

/// The most important status with at least one check-in in `stats`.
///
/// Falls back to the first status in `precedence` when the bucket is empty.
pub fn get_aggregate_status<S: Status>(precedence: &Precedence<S>, stats: &StatsBucket<S>) -> S {
    precedence
        .iter()
        .find(|status| stats.get(status) > 0)
        .unwrap_or_else(|| precedence.fallback())
        .clone()
}

/// The most important status across several buckets.
///
/// Each bucket is reduced to its own aggregate status first; empty buckets
/// contribute nothing. With no non-empty bucket the precedence fallback is
/// returned.
pub fn get_aggregate_status_from_multiple_buckets<'a, S, I>(
    precedence: &Precedence<S>,
    buckets: I,
) -> S
where
    S: Status + 'a,
    I: IntoIterator<Item = &'a StatsBucket<S>>,
{
    buckets
        .into_iter()
        .filter(|stats| !is_stats_bucket_empty(stats))
        .map(|stats| get_aggregate_status(precedence, stats))
        .min_by_key(|status| precedence.rank(status).unwrap_or(usize::MAX))
        .unwrap_or_else(|| precedence.fallback().clone())
}

pub fn is_stats_bucket_empty<S: Status>(stats: &StatsBucket<S>) -> bool {
    stats.counts().all(|(_, &count)| count == 0)
}

/// Sum two buckets over the statuses in `precedence`.
///
/// Statuses not listed in `precedence` are dropped from the result.
pub fn merge_stats<S: Status>(
    precedence: &Precedence<S>,
    a: &StatsBucket<S>,
    b: &StatsBucket<S>,
) -> StatsBucket<S> {
    precedence
        .iter()
        .map(|status| (status.clone(), a.get(status) + b.get(status)))
        .collect()
}
