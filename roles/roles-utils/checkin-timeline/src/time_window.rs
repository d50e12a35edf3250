//! Time window configuration for a timeline of a given pixel width.
//!
//! Wraps [`compute_rollup`] and adds what a renderer needs on top of the bucket
//! layout: the underscan-adjusted window bounds, grid-line spacing and the
//! label format for the markers.

use chrono::{DateTime, Duration, Offset, TimeZone, Utc};

use crate::rollup::compute_rollup;
use crate::types::{DateTimeProps, MarkerIntervals, TimeWindowConfig};

/// Marker spacings in minutes, in ascending order.
const MARKER_INTERVALS: &[u64] = &[1, 5, 10, 20, 30, 60, 120, 240, 480, 720];

const ONE_DAY_MINUTES: f64 = 1440.0;

/// Width of a time-only label.
const TIME_LABEL_WIDTH: f64 = 100.0;

/// Width of a date and time label.
const DATE_TIME_LABEL_WIDTH: f64 = 110.0;

/// Width of the reference label (date, time and zone).
const REFERENCE_LABEL_WIDTH: f64 = 115.0;

/// Underscan wider than this gets an explanation in the UI.
const UNDERSCAN_HELP_THRESHOLD: u32 = 140;

/// Inputs to [`get_format`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FormatOptions {
    pub date_only: bool,
    pub time_only: bool,
    pub seconds: bool,
    pub year: bool,
    pub timezone: bool,
    pub clock_24_hours: bool,
}

/// Select a chrono strftime pattern for timestamp labels.
pub fn get_format(options: &FormatOptions) -> String {
    let date = if options.year { "%b %-d, %Y" } else { "%b %-d" };

    if options.date_only {
        return date.to_string();
    }

    let time = match (options.clock_24_hours, options.seconds) {
        (true, true) => "%H:%M:%S",
        (true, false) => "%H:%M",
        (false, true) => "%-I:%M:%S %p",
        (false, false) => "%-I:%M %p",
    };
    let zone = if options.timezone { " %Z" } else { "" };

    if options.time_only {
        format!("{}{}", time, zone)
    } else {
        format!("{} {}{}", date, time, zone)
    }
}

/// Build the window configuration for `[start, end)` drawn across
/// `container_width` pixels.
///
/// Calendar comparisons happen in `Tz`, so pass the times in the zone the
/// labels will be shown in. An empty or inverted range, or a zero width,
/// yields a degenerate config with no rollup and zero marker spacing.
pub fn get_config_from_time_range<Tz: TimeZone>(
    start: &DateTime<Tz>,
    end: &DateTime<Tz>,
    container_width: u32,
) -> TimeWindowConfig {
    let elapsed_minutes = (end.clone() - start.clone()).num_milliseconds() as f64 / 60_000.0;
    let elapsed_seconds = elapsed_minutes * 60.0;

    let rollup_config = compute_rollup(elapsed_seconds, container_width);
    let timeline_width = container_width - rollup_config.timeline_underscan_width;

    let time_only = elapsed_minutes <= ONE_DAY_MINUTES && start.date_naive() == end.date_naive();
    let display_seconds = elapsed_minutes < f64::from(timeline_width);

    let utc_offset = start.offset().fix();
    let period_start = start.with_timezone(&Utc);

    let mut config = TimeWindowConfig {
        start: period_start - Duration::seconds(rollup_config.underscan_period as i64),
        end: end.with_timezone(&Utc),
        period_start,
        elapsed_minutes,
        timeline_width,
        show_underscan_help: rollup_config.timeline_underscan_width > UNDERSCAN_HELP_THRESHOLD,
        rollup_config,
        intervals: MarkerIntervals::default(),
        date_label_format: get_format(&FormatOptions {
            time_only,
            seconds: display_seconds,
            ..Default::default()
        }),
        date_time_props: DateTimeProps {
            time_only,
            date_only: false,
            seconds: display_seconds,
        },
        timezone: timezone_name(utc_offset.local_minus_utc()),
        utc_offset_secs: utc_offset.local_minus_utc(),
    };

    if elapsed_minutes <= 0.0 || timeline_width == 0 {
        tracing::debug!(
            "Degenerate time window: elapsed={}min, width={}px",
            elapsed_minutes,
            container_width
        );
        return config;
    }

    let compute_marker_interval =
        |pixels: f64| (elapsed_minutes / f64::from(timeline_width)) * pixels;

    let minimum_marker_interval = compute_marker_interval(if time_only {
        TIME_LABEL_WIDTH
    } else {
        DATE_TIME_LABEL_WIDTH
    });
    let reference_marker_interval = compute_marker_interval(REFERENCE_LABEL_WIDTH);

    match MARKER_INTERVALS
        .iter()
        .copied()
        .find(|&interval| interval as f64 >= minimum_marker_interval)
    {
        Some(normal_marker_interval) => {
            config.intervals = MarkerIntervals {
                minimum_marker_interval,
                normal_marker_interval,
                reference_marker_interval,
            };
        }
        None => {
            // Markers further apart than the largest spacing snap to whole days
            let days = (minimum_marker_interval / ONE_DAY_MINUTES).ceil();
            config.intervals = MarkerIntervals {
                minimum_marker_interval,
                normal_marker_interval: (days * ONE_DAY_MINUTES) as u64,
                reference_marker_interval,
            };
            config.date_label_format = get_format(&FormatOptions {
                date_only: true,
                ..Default::default()
            });
            config.date_time_props = DateTimeProps {
                time_only: false,
                date_only: true,
                seconds: false,
            };
        }
    }

    tracing::debug!(
        "Time window {} to {}: interval={}s, timeline_width={}px, normal_marker_interval={}min",
        config.period_start,
        config.end,
        config.rollup_config.interval,
        config.timeline_width,
        config.intervals.normal_marker_interval
    );

    config
}

/// Range of length `period` centred on `focus`, never ending after `now`.
///
/// When the centred range would run past `now`, it is shifted back so that it
/// ends at `now` and still spans `period`.
pub fn centered_time_range<Tz: TimeZone>(
    focus: &DateTime<Tz>,
    now: &DateTime<Tz>,
    period: Duration,
) -> (DateTime<Tz>, DateTime<Tz>) {
    let half = period / 2;
    let mut start = focus.clone() - half;
    let mut end = focus.clone() + (period - half);

    if end > *now {
        let overshoot = end.clone() - now.clone();
        end = now.clone();
        start = start - overshoot;
    }

    (start, end)
}

fn timezone_name(offset_secs: i32) -> String {
    if offset_secs == 0 {
        return "UTC".to_string();
    }

    let sign = if offset_secs < 0 { '-' } else { '+' };
    let abs = offset_secs.unsigned_abs();
    format!("{}{:02}:{:02}", sign, abs / 3600, (abs % 3600) / 60)
}
