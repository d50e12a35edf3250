//! Merging rollup buckets into renderable ticks.
//!
//! Adjacent buckets collapse into one tick while their dominant status holds.
//! A tick only ends once it is at least [`MIN_TICK_WIDTH`] buckets wide, and a
//! status change only splits it when the change persists across the next
//! [`MIN_TICK_WIDTH`] buckets, so a single stray check-in does not leave a
//! sliver behind.

use crate::aggregate::{
    get_aggregate_status, get_aggregate_status_from_multiple_buckets, is_stats_bucket_empty,
    merge_stats,
};
use crate::types::{CheckInBucket, JobTickData, Precedence, Status};

/// Minimum width of a tick, in buckets, before it may be closed.
pub const MIN_TICK_WIDTH: u32 = 4;

/// Merge contiguous buckets, sorted by timestamp, into ticks.
///
/// Empty buckets between ticks are skipped; an empty bucket inside a tick
/// that has not reached [`MIN_TICK_WIDTH`] is folded into it.
pub fn merge_buckets<S: Status>(
    precedence: &Precedence<S>,
    buckets: &[CheckInBucket<S>],
) -> Vec<JobTickData<S>> {
    debug_assert!(
        buckets.windows(2).all(|pair| pair[0].0 < pair[1].0),
        "buckets must be sorted by timestamp"
    );

    let look_ahead = MIN_TICK_WIDTH as usize;
    let last_idx = buckets.len().saturating_sub(1);

    let mut ticks = Vec::new();
    let mut current: Option<JobTickData<S>> = None;

    for (idx, (timestamp, stats)) in buckets.iter().enumerate() {
        let stats_empty = is_stats_bucket_empty(stats);

        let mut tick = match current.take() {
            None if stats_empty => continue,
            None => JobTickData {
                start_ts: *timestamp,
                end_ts: *timestamp,
                width: 1,
                stats: stats.clone(),
                rounded_left: true,
                rounded_right: false,
            },
            Some(mut tick) if stats_empty && tick.width >= MIN_TICK_WIDTH => {
                tick.rounded_right = true;
                ticks.push(tick);
                continue;
            }
            Some(mut tick) => {
                let bucket_status = get_aggregate_status(precedence, stats);
                let tick_status = get_aggregate_status(precedence, &tick.stats);
                let next_status = get_aggregate_status_from_multiple_buckets(
                    precedence,
                    buckets[idx..].iter().take(look_ahead).map(|(_, s)| s),
                );

                if bucket_status != tick_status
                    && next_status != tick_status
                    && tick.width >= MIN_TICK_WIDTH
                {
                    ticks.push(tick);
                    JobTickData {
                        start_ts: *timestamp,
                        end_ts: *timestamp,
                        width: 1,
                        stats: stats.clone(),
                        rounded_left: false,
                        rounded_right: false,
                    }
                } else {
                    tick.end_ts = *timestamp;
                    tick.stats = merge_stats(precedence, &tick.stats, stats);
                    tick.width += 1;
                    tick
                }
            }
        };

        if idx == last_idx {
            tick.rounded_right = true;
            ticks.push(tick);
        } else {
            current = Some(tick);
        }
    }

    tracing::debug!("Merged {} buckets into {} ticks", buckets.len(), ticks.len());

    ticks
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{CheckInStatus, StatsBucket};

    fn precedence() -> Precedence<CheckInStatus> {
        Precedence::new(vec![
            CheckInStatus::Error,
            CheckInStatus::Timeout,
            CheckInStatus::Missed,
            CheckInStatus::Ok,
            CheckInStatus::InProgress,
        ])
        .unwrap()
    }

    fn run(status: CheckInStatus) -> StatsBucket<CheckInStatus> {
        let mut stats = StatsBucket::zeroed(&precedence());
        stats.set(status, 1);
        stats
    }

    fn empty() -> StatsBucket<CheckInStatus> {
        StatsBucket::zeroed(&precedence())
    }

    /// Buckets one second apart starting at timestamp 1.
    fn buckets(stats: Vec<StatsBucket<CheckInStatus>>) -> Vec<CheckInBucket<CheckInStatus>> {
        stats
            .into_iter()
            .enumerate()
            .map(|(idx, stats)| (idx as i64 + 1, stats))
            .collect()
    }

    fn counts(pairs: &[(CheckInStatus, u64)]) -> StatsBucket<CheckInStatus> {
        let mut stats = empty();
        for &(status, count) in pairs {
            stats.set(status, count);
        }
        stats
    }

    #[test]
    fn test_merges_consistent_statuses() {
        let data = buckets(vec![run(CheckInStatus::Ok); 8]);
        let ticks = merge_buckets(&precedence(), &data);

        assert_eq!(
            ticks,
            vec![JobTickData {
                start_ts: 1,
                end_ts: 8,
                width: 8,
                stats: counts(&[(CheckInStatus::Ok, 8)]),
                rounded_left: true,
                rounded_right: true,
            }]
        );
    }

    #[test]
    fn test_short_gap_is_absorbed() {
        let mut data = vec![run(CheckInStatus::Ok); 3];
        data.push(empty());
        data.extend(vec![run(CheckInStatus::Ok); 4]);

        let ticks = merge_buckets(&precedence(), &buckets(data));

        assert_eq!(ticks.len(), 1);
        assert_eq!(ticks[0].start_ts, 1);
        assert_eq!(ticks[0].end_ts, 8);
        assert_eq!(ticks[0].width, 8);
        assert_eq!(ticks[0].stats.get(&CheckInStatus::Ok), 7);
        assert!(ticks[0].rounded_left);
        assert!(ticks[0].rounded_right);
    }

    #[test]
    fn test_gap_after_min_width_closes_tick() {
        let mut data = vec![run(CheckInStatus::Ok); 4];
        data.push(empty());
        data.extend(vec![run(CheckInStatus::Ok); 3]);

        let ticks = merge_buckets(&precedence(), &buckets(data));

        assert_eq!(
            ticks,
            vec![
                JobTickData {
                    start_ts: 1,
                    end_ts: 4,
                    width: 4,
                    stats: counts(&[(CheckInStatus::Ok, 4)]),
                    rounded_left: true,
                    rounded_right: true,
                },
                JobTickData {
                    start_ts: 6,
                    end_ts: 8,
                    width: 3,
                    stats: counts(&[(CheckInStatus::Ok, 3)]),
                    rounded_left: true,
                    rounded_right: true,
                },
            ]
        );
    }

    #[test]
    fn test_adjacent_ticks_share_flat_seam() {
        let mut data = vec![run(CheckInStatus::Ok); 4];
        data.extend(vec![
            run(CheckInStatus::Missed),
            run(CheckInStatus::Timeout),
            run(CheckInStatus::Missed),
            run(CheckInStatus::Missed),
        ]);

        let ticks = merge_buckets(&precedence(), &buckets(data));

        assert_eq!(
            ticks,
            vec![
                JobTickData {
                    start_ts: 1,
                    end_ts: 4,
                    width: 4,
                    stats: counts(&[(CheckInStatus::Ok, 4)]),
                    rounded_left: true,
                    rounded_right: false,
                },
                JobTickData {
                    start_ts: 5,
                    end_ts: 8,
                    width: 4,
                    stats: counts(&[(CheckInStatus::Missed, 3), (CheckInStatus::Timeout, 1)]),
                    rounded_left: false,
                    rounded_right: true,
                },
            ]
        );
    }

    #[test]
    fn test_look_ahead_suppresses_flicker() {
        let mut data = vec![run(CheckInStatus::Timeout); 4];
        data.extend(vec![
            run(CheckInStatus::Missed),
            run(CheckInStatus::Ok),
            run(CheckInStatus::Missed),
            run(CheckInStatus::Timeout),
        ]);

        let ticks = merge_buckets(&precedence(), &buckets(data));

        assert_eq!(
            ticks,
            vec![JobTickData {
                start_ts: 1,
                end_ts: 8,
                width: 8,
                stats: counts(&[
                    (CheckInStatus::Timeout, 5),
                    (CheckInStatus::Missed, 2),
                    (CheckInStatus::Ok, 1),
                ]),
                rounded_left: true,
                rounded_right: true,
            }]
        );
    }

    #[test]
    fn test_status_change_before_min_width_is_merged() {
        let data = buckets(vec![
            run(CheckInStatus::Ok),
            run(CheckInStatus::Ok),
            run(CheckInStatus::Error),
            run(CheckInStatus::Error),
            run(CheckInStatus::Error),
            run(CheckInStatus::Error),
        ]);

        let ticks = merge_buckets(&precedence(), &data);

        assert_eq!(ticks.len(), 1);
        assert_eq!(ticks[0].width, 6);
        assert_eq!(ticks[0].stats.get(&CheckInStatus::Error), 4);
    }

    #[test]
    fn test_leading_and_trailing_empty_buckets() {
        let mut data = vec![empty(), empty()];
        data.extend(vec![run(CheckInStatus::Ok); 5]);
        data.extend(vec![empty(), empty()]);

        let ticks = merge_buckets(&precedence(), &buckets(data));

        assert_eq!(
            ticks,
            vec![JobTickData {
                start_ts: 3,
                end_ts: 7,
                width: 5,
                stats: counts(&[(CheckInStatus::Ok, 5)]),
                rounded_left: true,
                rounded_right: true,
            }]
        );
    }

    #[test]
    fn test_short_tick_sealed_at_end() {
        let mut data = vec![empty(); 4];
        data.extend(vec![run(CheckInStatus::Missed); 2]);

        let ticks = merge_buckets(&precedence(), &buckets(data));

        assert_eq!(ticks.len(), 1);
        assert_eq!(ticks[0].start_ts, 5);
        assert_eq!(ticks[0].width, 2);
        assert!(ticks[0].rounded_left);
        assert!(ticks[0].rounded_right);
    }

    #[test]
    fn test_split_on_last_bucket_seals_new_tick() {
        let mut data = vec![run(CheckInStatus::Ok); 4];
        data.push(run(CheckInStatus::Error));

        let ticks = merge_buckets(&precedence(), &buckets(data));

        assert_eq!(ticks.len(), 2);
        assert!(!ticks[0].rounded_right);
        assert_eq!(ticks[1].start_ts, 5);
        assert_eq!(ticks[1].width, 1);
        assert!(!ticks[1].rounded_left);
        assert!(ticks[1].rounded_right);
    }

    #[test]
    fn test_single_bucket() {
        let ticks = merge_buckets(&precedence(), &buckets(vec![run(CheckInStatus::Error)]));
        assert_eq!(ticks.len(), 1);
        assert_eq!(ticks[0].width, 1);
        assert!(ticks[0].rounded_left && ticks[0].rounded_right);
    }

    #[test]
    fn test_no_data() {
        assert!(merge_buckets(&precedence(), &[]).is_empty());
        assert!(merge_buckets(&precedence(), &buckets(vec![empty(); 6])).is_empty());
    }

    #[test]
    fn test_generic_over_string_statuses() {
        let precedence = Precedence::new(vec!["down".to_string(), "up".to_string()]).unwrap();
        let up: StatsBucket<String> = [("up".to_string(), 1)].into_iter().collect();
        let down: StatsBucket<String> = [("down".to_string(), 1)].into_iter().collect();

        let data: Vec<CheckInBucket<String>> = (0..8)
            .map(|i| (i * 60, if i < 4 { up.clone() } else { down.clone() }))
            .collect();

        let ticks = merge_buckets(&precedence, &data);
        assert_eq!(ticks.len(), 2);
        assert_eq!(ticks[0].end_ts, 180);
        assert_eq!(ticks[1].start_ts, 240);
        assert_eq!(ticks[1].stats.get(&"down".to_string()), 4);
    }
}
