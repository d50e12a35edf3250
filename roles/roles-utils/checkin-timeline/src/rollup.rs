//! Rollup interval selection for check-in timelines.
//!
//! Given a time span and the pixel width available to draw it, pick the bucket
//! interval that wastes the fewest pixels while keeping buckets small and
//! numerous.
//!
//! # Strategy
//!
//! Every interval in [`ROLLUP_INTERVALS`] is evaluated:
//! - The naive bucket count is halved (and each bucket made to stand for twice
//!   as many real buckets) until it fits the available pixels
//! - The timeline is clamped to the widest width evenly divisible by the
//!   virtual bucket count; the remainder becomes underscan
//! - Candidates requesting [`MAX_BUCKETS`] or more buckets are dropped
//!
//! Survivors are scored and the best one wins. Minimising underscan dominates
//! the score; granularity and narrow buckets break near-ties.
//!
//! # Examples
//!
//! ```ignore
//! use checkin_timeline::rollup::compute_rollup;
//!
//! // 5 minutes across 800px uses 15 second buckets, 40px each
//! let rollup = compute_rollup(300.0, 800);
//! assert_eq!(rollup.interval, 15);
//! assert_eq!(rollup.bucket_pixels, 40.0);
//! ```

use crate::types::RollupConfig;

/// Candidate bucket sizes in seconds, in ascending order.
pub const ROLLUP_INTERVALS: &[u64] = &[
    15, 30, 60, 120, 300, 600, 900, 1800, 3600, 7200, 10800, 14400, 43200, 86400,
];

/// Upper bound (exclusive) on the buckets a rollup may request.
pub const MAX_BUCKETS: u64 = 2016;

const GRANULARITY_WEIGHT: f64 = 1.0;
const UNDERSCAN_WEIGHT: f64 = 3.0;
const BUCKET_PIXELS_WEIGHT: f64 = 1.5;

struct Candidate {
    config: RollupConfig,
    underscan_pct: f64,
}

/// Lay out `interval` sized buckets, or `None` when the bucket counts do not
/// fit in a `u64`.
fn evaluate_interval(
    elapsed_seconds: f64,
    timeline_width: u32,
    interval: u64,
) -> Option<Candidate> {
    let width = u64::from(timeline_width);

    let mut virtual_buckets = (elapsed_seconds / interval as f64).ceil() as u64;
    let mut buckets_in_virtual_bucket = 1u64;

    while virtual_buckets > width {
        virtual_buckets = virtual_buckets.div_ceil(2);
        buckets_in_virtual_bucket = buckets_in_virtual_bucket.checked_mul(2)?;
    }

    let total_buckets = virtual_buckets.checked_mul(buckets_in_virtual_bucket)?;
    let clamped_width = (width / virtual_buckets) * virtual_buckets;
    let timeline_underscan_width = width - clamped_width;
    let underscan_pct = timeline_underscan_width as f64 / width as f64;

    let bucket_pixels = clamped_width as f64 / total_buckets as f64;
    let underscan_buckets = (timeline_underscan_width as f64 / bucket_pixels).floor() as u64;
    let underscan_period = underscan_buckets.checked_mul(interval)?;

    Some(Candidate {
        config: RollupConfig {
            interval,
            bucket_pixels,
            total_buckets,
            underscan_buckets,
            timeline_underscan_width: timeline_underscan_width as u32,
            underscan_period,
        },
        underscan_pct,
    })
}

/// Choose the rollup for `elapsed_seconds` drawn across `timeline_width` pixels.
///
/// # Returns
///
/// The zeroed [`RollupConfig`] when the width is zero, the span is not a
/// positive finite number, or no interval stays under [`MAX_BUCKETS`].
pub fn compute_rollup(elapsed_seconds: f64, timeline_width: u32) -> RollupConfig {
    if timeline_width == 0 || !elapsed_seconds.is_finite() || elapsed_seconds <= 0.0 {
        return RollupConfig::default();
    }

    let candidates: Vec<Candidate> = ROLLUP_INTERVALS
        .iter()
        .filter_map(|&interval| evaluate_interval(elapsed_seconds, timeline_width, interval))
        .filter(|c| {
            c.config
                .total_buckets
                .checked_add(c.config.underscan_buckets)
                .is_some_and(|buckets| buckets < MAX_BUCKETS)
        })
        .collect();

    let max_total_buckets = candidates
        .iter()
        .map(|c| c.config.total_buckets)
        .max()
        .unwrap_or(0) as f64;
    let max_bucket_pixels = candidates
        .iter()
        .map(|c| c.config.bucket_pixels)
        .fold(0.0, f64::max);

    let score = |c: &Candidate| {
        GRANULARITY_WEIGHT * (c.config.total_buckets as f64 / max_total_buckets)
            + UNDERSCAN_WEIGHT * (1.0 - c.underscan_pct)
            + BUCKET_PIXELS_WEIGHT * (1.0 - c.config.bucket_pixels / max_bucket_pixels)
    };

    // Strictly greater keeps the smallest interval among equal scores
    let mut best: Option<(f64, Candidate)> = None;
    for candidate in candidates {
        let candidate_score = score(&candidate);
        match &best {
            Some((best_score, _)) if candidate_score <= *best_score => {}
            _ => best = Some((candidate_score, candidate)),
        }
    }

    match best {
        Some((best_score, candidate)) => {
            tracing::debug!(
                "Rollup for elapsed={}s width={}px: interval={}s, bucket_pixels={}, total_buckets={}, underscan={}px, score={:.4}",
                elapsed_seconds,
                timeline_width,
                candidate.config.interval,
                candidate.config.bucket_pixels,
                candidate.config.total_buckets,
                candidate.config.timeline_underscan_width,
                best_score
            );
            candidate.config
        }
        None => {
            tracing::debug!(
                "No rollup interval fits elapsed={}s within {} buckets",
                elapsed_seconds,
                MAX_BUCKETS
            );
            RollupConfig::default()
        }
    }
}
