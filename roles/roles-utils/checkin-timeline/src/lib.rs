//! Check-in timeline engine for cron monitors.
//!
//! This crate turns a time range and a pixel width into a drawable timeline:
//! it picks a rollup interval, derives the window and grid-marker layout, and
//! merges per-bucket check-in counts into ticks coloured by their dominant
//! status. A SQLite-backed store supplies the bucketed counts.

pub mod aggregate;
pub mod markers;
pub mod merge;
pub mod rollup;
pub mod storage;
pub mod time_window;
pub mod types;

pub use aggregate::{get_aggregate_status, get_aggregate_status_from_multiple_buckets};
pub use markers::{get_time_markers, tick_position};
pub use merge::merge_buckets;
pub use rollup::compute_rollup;
pub use storage::{CheckIn, CheckInStorage, SqliteStorage, StorageError};
pub use time_window::{centered_time_range, get_config_from_time_range, get_format};
pub use types::{
    unix_timestamp, CheckInBucket, CheckInStatus, JobTickData, MarkerIntervals, Precedence,
    RollupConfig, StatsBucket, TimeMarker, TimeWindowConfig,
};
