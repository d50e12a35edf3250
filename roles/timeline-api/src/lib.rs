//! HTTP service serving check-in timelines for cron monitors.

pub mod api;
pub mod config;
pub mod db;
pub mod error;

pub use db::{TimelineData, WindowKey};
pub use error::ApiError;
