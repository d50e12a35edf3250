//! Pixel placement for grid lines and ticks.

use chrono::DateTime;

use crate::types::{JobTickData, Status, TickPosition, TimeMarker, TimeWindowConfig};

/// Grid lines every `normal_marker_interval` minutes across the window.
///
/// Markers land on multiples of the interval in the window's local time, so
/// hourly markers sit on the hour and day markers on local midnight. Positions
/// are measured from the left edge of the container.
pub fn get_time_markers(config: &TimeWindowConfig) -> Vec<TimeMarker> {
    let interval_secs = config.intervals.normal_marker_interval as i64 * 60;
    if interval_secs == 0 || config.timeline_width == 0 || config.elapsed_minutes <= 0.0 {
        return Vec::new();
    }

    let width = f64::from(config.timeline_width);
    let elapsed_ms = config.elapsed_minutes * 60_000.0;
    let offset = i64::from(config.utc_offset_secs);
    let start_ms = config.start.timestamp_millis();
    let end_secs = config.end.timestamp();

    // First local multiple of the interval at or after the window start
    let local_start = config.start.timestamp() + offset;
    let first_local = (local_start + interval_secs - 1).div_euclid(interval_secs) * interval_secs;

    let mut markers = Vec::new();
    let mut ts = first_local - offset;
    while ts <= end_secs {
        let Some(date) = DateTime::from_timestamp(ts, 0) else {
            break;
        };

        let position = (ts * 1000 - start_ms) as f64 * width / elapsed_ms;
        markers.push(TimeMarker { date, position });
        ts += interval_secs;
    }

    markers
}

/// Left offset and width in pixels of a tick within the container.
pub fn tick_position<S: Status>(config: &TimeWindowConfig, tick: &JobTickData<S>) -> TickPosition {
    let rollup = &config.rollup_config;
    if rollup.interval == 0 {
        return TickPosition {
            left: 0.0,
            width: 0.0,
        };
    }

    let buckets_from_start =
        (tick.start_ts - config.start.timestamp()) as f64 / rollup.interval as f64;

    TickPosition {
        left: buckets_from_start * rollup.bucket_pixels,
        width: f64::from(tick.width) * rollup.bucket_pixels,
    }
}
