use std::{
    collections::{HashMap, VecDeque},
    sync::{Arc, PoisonError, RwLock},
};

use chrono::{DateTime, FixedOffset, TimeZone};
use serde::Serialize;

use checkin_timeline::{
    get_aggregate_status, get_config_from_time_range, get_time_markers, merge_buckets,
    tick_position, types::TickPosition, CheckIn, CheckInStatus, CheckInStorage, JobTickData,
    TimeMarker, TimeWindowConfig,
};

use crate::error::{ApiError, Result};

/// Parameters identifying one timeline window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WindowKey {
    pub since: i64,
    pub until: i64,
    pub width: u32,
    pub utc_offset_secs: i32,
}

impl WindowKey {
    fn bounds(&self) -> Result<(DateTime<FixedOffset>, DateTime<FixedOffset>)> {
        let offset = FixedOffset::east_opt(self.utc_offset_secs).ok_or_else(|| {
            ApiError::InvalidParameter(format!("utc offset {}s out of range", self.utc_offset_secs))
        })?;
        let at = |ts: i64| {
            offset
                .timestamp_opt(ts, 0)
                .single()
                .ok_or_else(|| ApiError::InvalidParameter(format!("timestamp {} out of range", ts)))
        };

        Ok((at(self.since)?, at(self.until)?))
    }
}

/// A merged tick with its dominant status and pixel placement.
#[derive(Debug, Clone, Serialize)]
pub struct RenderedTick {
    #[serde(flatten)]
    pub tick: JobTickData<CheckInStatus>,
    pub status: CheckInStatus,
    pub position: TickPosition,
}

#[derive(Debug, Clone, Serialize)]
pub struct Timeline {
    pub config: TimeWindowConfig,
    pub ticks: Vec<RenderedTick>,
    pub markers: Vec<TimeMarker>,
}

/// Bounded memo of window configs, evicting the oldest entry first.
struct ConfigCache {
    entries: HashMap<WindowKey, TimeWindowConfig>,
    order: VecDeque<WindowKey>,
}

/// Check-in storage plus memoised window layouts.
pub struct TimelineData {
    storage: Arc<dyn CheckInStorage>,
    config_cache: RwLock<ConfigCache>,
    cache_capacity: usize,
    default_width: u32,
}

impl TimelineData {
    pub fn new(storage: Arc<dyn CheckInStorage>, default_width: u32, cache_capacity: usize) -> Self {
        Self {
            storage,
            config_cache: RwLock::new(ConfigCache {
                entries: HashMap::new(),
                order: VecDeque::new(),
            }),
            cache_capacity,
            default_width,
        }
    }

    pub fn default_width(&self) -> u32 {
        self.default_width
    }

    /// Window layout for `key`, computed once per distinct key while cached.
    pub fn window_config(&self, key: &WindowKey) -> Result<TimeWindowConfig> {
        {
            let cache = self.config_cache.read().unwrap_or_else(PoisonError::into_inner);
            if let Some(config) = cache.entries.get(key) {
                return Ok(config.clone());
            }
        }

        let (since, until) = key.bounds()?;
        let config = get_config_from_time_range(&since, &until, key.width);

        if self.cache_capacity > 0 {
            let mut cache = self.config_cache.write().unwrap_or_else(PoisonError::into_inner);
            if !cache.entries.contains_key(key) {
                while cache.order.len() >= self.cache_capacity {
                    match cache.order.pop_front() {
                        Some(oldest) => {
                            cache.entries.remove(&oldest);
                        }
                        None => break,
                    }
                }
                cache.order.push_back(*key);
                cache.entries.insert(*key, config.clone());
            }
        }

        Ok(config)
    }

    pub fn cached_configs(&self) -> usize {
        self.config_cache
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .entries
            .len()
    }

    pub async fn record_check_in(&self, check_in: &CheckIn) -> Result<()> {
        Ok(self.storage.record_check_in(check_in).await?)
    }

    /// Ticks and grid markers for `monitor_id` over the window `key`.
    pub async fn timeline(&self, monitor_id: &str, key: &WindowKey) -> Result<Timeline> {
        let config = self.window_config(key)?;
        let markers = get_time_markers(&config);

        // No rollup fits the window, so there is nothing to bucket
        if config.rollup_config.interval == 0 {
            return Ok(Timeline {
                config,
                ticks: Vec::new(),
                markers,
            });
        }

        let buckets = self
            .storage
            .query_buckets(
                monitor_id,
                config.start.timestamp(),
                config.end.timestamp(),
                config.rollup_config.interval,
            )
            .await?;

        let precedence = CheckInStatus::precedence();
        let ticks: Vec<RenderedTick> = merge_buckets(&precedence, &buckets)
            .into_iter()
            .map(|tick| RenderedTick {
                status: get_aggregate_status(&precedence, &tick.stats),
                position: tick_position(&config, &tick),
                tick,
            })
            .collect();

        tracing::info!(
            "Timeline for monitor {}: {} buckets, {} ticks, {} markers",
            monitor_id,
            buckets.len(),
            ticks.len(),
            markers.len()
        );

        Ok(Timeline {
            config,
            ticks,
            markers,
        })
    }
}
