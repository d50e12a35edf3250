//! Value types shared by the rollup, window and merge stages.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::hash::Hash;
use std::str::FromStr;
use std::time::{SystemTime, UNIX_EPOCH};
use thiserror::Error;

/// Any key usable as a check-in status.
///
/// The engine never inspects status values; it only compares them and ranks
/// them through a [`Precedence`].
pub trait Status: Clone + Eq + Hash + fmt::Debug {}

impl<T: Clone + Eq + Hash + fmt::Debug> Status for T {}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PrecedenceError {
    #[error("status precedence list is empty")]
    Empty,

    #[error("duplicate status in precedence list: {0}")]
    Duplicate(String),
}

/// Statuses ordered from most to least important.
///
/// Always holds at least one status, so the first entry doubles as the
/// fallback for buckets without any check-ins.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Precedence<S: Status> {
    statuses: Vec<S>,
}

impl<S: Status> Precedence<S> {
    pub fn new(statuses: Vec<S>) -> Result<Self, PrecedenceError> {
        if statuses.is_empty() {
            return Err(PrecedenceError::Empty);
        }

        for (idx, status) in statuses.iter().enumerate() {
            if statuses[..idx].contains(status) {
                return Err(PrecedenceError::Duplicate(format!("{:?}", status)));
            }
        }

        Ok(Self { statuses })
    }

    /// The most important status, returned when nothing else applies.
    pub fn fallback(&self) -> &S {
        &self.statuses[0]
    }

    /// Position of `status` in the list; lower is more important.
    pub fn rank(&self, status: &S) -> Option<usize> {
        self.statuses.iter().position(|s| s == status)
    }

    pub fn iter(&self) -> impl Iterator<Item = &S> {
        self.statuses.iter()
    }

    pub fn len(&self) -> usize {
        self.statuses.len()
    }

    pub fn is_empty(&self) -> bool {
        self.statuses.is_empty()
    }
}

/// Per-bucket check-in counts keyed by status. Missing keys count as zero.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StatsBucket<S: Status>(HashMap<S, u64>);

impl<S: Status> StatsBucket<S> {
    pub fn new() -> Self {
        Self(HashMap::new())
    }

    /// A bucket with a zero entry for every status in `precedence`.
    pub fn zeroed(precedence: &Precedence<S>) -> Self {
        Self(precedence.iter().map(|s| (s.clone(), 0)).collect())
    }

    pub fn get(&self, status: &S) -> u64 {
        self.0.get(status).copied().unwrap_or(0)
    }

    pub fn set(&mut self, status: S, count: u64) {
        self.0.insert(status, count);
    }

    pub fn increment(&mut self, status: S, by: u64) {
        *self.0.entry(status).or_insert(0) += by;
    }

    pub fn counts(&self) -> impl Iterator<Item = (&S, &u64)> {
        self.0.iter()
    }

    pub fn total(&self) -> u64 {
        self.0.values().sum()
    }
}

impl<S: Status> Default for StatsBucket<S> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S: Status> FromIterator<(S, u64)> for StatsBucket<S> {
    fn from_iter<I: IntoIterator<Item = (S, u64)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// One rollup bucket: its start as Unix seconds and its status counts.
pub type CheckInBucket<S> = (i64, StatsBucket<S>);

/// A merged run of buckets rendered as one segment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobTickData<S: Status> {
    /// Timestamp of the first bucket in the tick
    pub start_ts: i64,

    /// Timestamp of the last bucket in the tick
    pub end_ts: i64,

    /// Number of buckets covered, at least 1
    pub width: u32,

    /// Counts summed over every bucket in the tick
    pub stats: StatsBucket<S>,

    pub rounded_left: bool,
    pub rounded_right: bool,
}

/// Monitor check-in statuses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckInStatus {
    Ok,
    Error,
    InProgress,
    Missed,
    Timeout,
    Unknown,
}

impl CheckInStatus {
    /// Most to least important.
    pub const PRECEDENCE: [CheckInStatus; 6] = [
        CheckInStatus::Error,
        CheckInStatus::Timeout,
        CheckInStatus::Missed,
        CheckInStatus::Unknown,
        CheckInStatus::Ok,
        CheckInStatus::InProgress,
    ];

    pub fn precedence() -> Precedence<CheckInStatus> {
        Precedence {
            statuses: Self::PRECEDENCE.to_vec(),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            CheckInStatus::Ok => "ok",
            CheckInStatus::Error => "error",
            CheckInStatus::InProgress => "in_progress",
            CheckInStatus::Missed => "missed",
            CheckInStatus::Timeout => "timeout",
            CheckInStatus::Unknown => "unknown",
        }
    }
}

impl fmt::Display for CheckInStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CheckInStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ok" => Ok(CheckInStatus::Ok),
            "error" => Ok(CheckInStatus::Error),
            "in_progress" => Ok(CheckInStatus::InProgress),
            "missed" => Ok(CheckInStatus::Missed),
            "timeout" => Ok(CheckInStatus::Timeout),
            "unknown" => Ok(CheckInStatus::Unknown),
            other => Err(format!("unknown check-in status: {}", other)),
        }
    }
}

/// Bucket layout chosen for a time span and pixel width.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RollupConfig {
    /// Bucket size in seconds
    pub interval: u64,

    /// Pixels per bucket; fractional when buckets are packed below one pixel
    pub bucket_pixels: f64,

    /// Buckets that fit the clamped timeline
    pub total_buckets: u64,

    /// Whole buckets that fit into the leftover width
    pub underscan_buckets: u64,

    /// Leftover pixels not evenly divisible into buckets
    pub timeline_underscan_width: u32,

    /// Seconds covered by the underscan buckets
    pub underscan_period: u64,
}

/// Grid-line spacing in minutes.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MarkerIntervals {
    pub minimum_marker_interval: f64,
    pub normal_marker_interval: u64,
    pub reference_marker_interval: f64,
}

/// Which parts of a timestamp the labels show.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateTimeProps {
    pub time_only: bool,
    pub date_only: bool,
    pub seconds: bool,
}

/// Everything a renderer needs to lay out one timeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeWindowConfig {
    /// Left edge of the rendered window, including underscan
    pub start: DateTime<Utc>,

    pub end: DateTime<Utc>,

    /// Start of the requested range
    pub period_start: DateTime<Utc>,

    pub elapsed_minutes: f64,

    /// Container width minus the underscan width
    pub timeline_width: u32,

    pub rollup_config: RollupConfig,
    pub intervals: MarkerIntervals,

    /// chrono strftime pattern for marker labels
    pub date_label_format: String,

    pub date_time_props: DateTimeProps,

    /// Display name of the caller's offset, e.g. `UTC` or `+02:00`
    pub timezone: String,

    pub utc_offset_secs: i32,
    pub show_underscan_help: bool,
}

/// A grid line on the timeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeMarker {
    pub date: DateTime<Utc>,

    /// Pixels from the left edge of the container
    pub position: f64,
}

/// Pixel placement of a tick within the container.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TickPosition {
    pub left: f64,
    pub width: f64,
}

/// Get current Unix timestamp in seconds.
pub fn unix_timestamp() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or_default()
}
