//! SQLite storage backend for monitor check-ins.

use crate::types::{CheckInBucket, CheckInStatus, StatsBucket};
use serde::{Deserialize, Serialize};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Pool, Row, Sqlite};
use std::collections::BTreeMap;
use std::path::Path;
use std::str::FromStr;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, StorageError>;

/// A single check-in reported by a monitor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckIn {
    pub monitor_id: String,
    pub timestamp: i64,
    pub status: CheckInStatus,
}

/// Storage abstraction for check-in history.
#[async_trait::async_trait]
pub trait CheckInStorage: Send + Sync {
    /// Store a check-in.
    async fn record_check_in(&self, check_in: &CheckIn) -> Result<()>;

    /// Check-in counts per status for one monitor, bucketed by `interval`
    /// seconds over `[from, to)`.
    ///
    /// The result is contiguous and ascending: buckets without check-ins are
    /// present with empty stats.
    async fn query_buckets(
        &self,
        monitor_id: &str,
        from_timestamp: i64,
        to_timestamp: i64,
        interval: u64,
    ) -> Result<Vec<CheckInBucket<CheckInStatus>>>;
}

/// Every `interval` aligned bucket start in `[floor(from), to)`, in order.
///
/// Buckets found in `sparse` keep their stats; the rest are empty. Entries in
/// `sparse` outside the range are ignored.
pub fn fill_buckets(
    from_timestamp: i64,
    to_timestamp: i64,
    interval: u64,
    sparse: BTreeMap<i64, StatsBucket<CheckInStatus>>,
) -> Vec<CheckInBucket<CheckInStatus>> {
    let step = match i64::try_from(interval) {
        Ok(step) if step > 0 => step,
        _ => return Vec::new(),
    };

    let Some(mut bucket_ts) = from_timestamp.div_euclid(step).checked_mul(step) else {
        return Vec::new();
    };

    let mut sparse = sparse;
    let mut buckets = Vec::new();

    while bucket_ts < to_timestamp {
        let stats = sparse.remove(&bucket_ts).unwrap_or_default();
        buckets.push((bucket_ts, stats));
        bucket_ts = match bucket_ts.checked_add(step) {
            Some(next) => next,
            None => break,
        };
    }

    buckets
}

/// SQLite-backed storage implementation.
pub struct SqliteStorage {
    pool: Pool<Sqlite>,
}

impl SqliteStorage {
    /// Open (or create) the database at `db_path`.
    pub async fn new<P: AsRef<Path>>(db_path: P) -> Result<Self> {
        let db_path = db_path.as_ref();

        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let connection_options =
            SqliteConnectOptions::from_str(&format!("sqlite://{}", db_path.display()))?
                .create_if_missing(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(connection_options)
            .await?;

        let storage = Self { pool };
        storage.init_schema().await?;

        Ok(storage)
    }

    async fn init_schema(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS checkins (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                monitor_id TEXT NOT NULL,
                timestamp INTEGER NOT NULL,
                status TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE INDEX IF NOT EXISTS idx_monitor_timestamp
            ON checkins(monitor_id, timestamp)
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

#[async_trait::async_trait]
impl CheckInStorage for SqliteStorage {
    async fn record_check_in(&self, check_in: &CheckIn) -> Result<()> {
        if check_in.monitor_id.is_empty() {
            return Err(StorageError::InvalidArgument(
                "monitor id must not be empty".to_string(),
            ));
        }

        tracing::debug!(
            "Storing check-in: monitor_id={}, timestamp={}, status={}",
            check_in.monitor_id,
            check_in.timestamp,
            check_in.status
        );

        sqlx::query(
            r#"
            INSERT INTO checkins (monitor_id, timestamp, status)
            VALUES (?, ?, ?)
            "#,
        )
        .bind(&check_in.monitor_id)
        .bind(check_in.timestamp)
        .bind(check_in.status.as_str())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn query_buckets(
        &self,
        monitor_id: &str,
        from_timestamp: i64,
        to_timestamp: i64,
        interval: u64,
    ) -> Result<Vec<CheckInBucket<CheckInStatus>>> {
        let step = i64::try_from(interval)
            .ok()
            .filter(|step| *step > 0)
            .ok_or_else(|| {
                StorageError::InvalidArgument(format!("invalid bucket interval {}", interval))
            })?;
        if from_timestamp >= to_timestamp {
            return Err(StorageError::InvalidArgument(format!(
                "empty range {}..{}",
                from_timestamp, to_timestamp
            )));
        }

        let aligned_from = from_timestamp
            .div_euclid(step)
            .checked_mul(step)
            .ok_or_else(|| {
                StorageError::InvalidArgument(format!("timestamp {} out of range", from_timestamp))
            })?;

        // Floored bucket start; SQLite's `/` and `%` truncate toward zero
        let rows = sqlx::query(
            r#"
            SELECT
                timestamp - ((timestamp % ?) + ?) % ? AS bucket_timestamp,
                status,
                COUNT(*) AS checkin_count
            FROM checkins
            WHERE monitor_id = ? AND timestamp >= ? AND timestamp < ?
            GROUP BY bucket_timestamp, status
            ORDER BY bucket_timestamp ASC
            "#,
        )
        .bind(step)
        .bind(step)
        .bind(step)
        .bind(monitor_id)
        .bind(aligned_from)
        .bind(to_timestamp)
        .fetch_all(&self.pool)
        .await?;

        let mut sparse: BTreeMap<i64, StatsBucket<CheckInStatus>> = BTreeMap::new();
        for row in &rows {
            let bucket_timestamp = row.get::<i64, _>("bucket_timestamp");
            let status_text = row.get::<String, _>("status");
            let count = row.get::<i64, _>("checkin_count") as u64;

            let status = match CheckInStatus::from_str(&status_text) {
                Ok(status) => status,
                Err(e) => {
                    tracing::warn!("Skipping stored check-in: {}", e);
                    continue;
                }
            };

            sparse
                .entry(bucket_timestamp)
                .or_default()
                .increment(status, count);
        }

        let buckets = fill_buckets(from_timestamp, to_timestamp, interval, sparse);

        tracing::info!(
            "Query buckets: monitor_id={}, from={}, to={}, interval={}s, rows={}, buckets={}",
            monitor_id,
            from_timestamp,
            to_timestamp,
            interval,
            rows.len(),
            buckets.len()
        );

        Ok(buckets)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregate::is_stats_bucket_empty;
    use tempfile::TempDir;

    fn check_in(monitor_id: &str, timestamp: i64, status: CheckInStatus) -> CheckIn {
        CheckIn {
            monitor_id: monitor_id.to_string(),
            timestamp,
            status,
        }
    }

    #[test]
    fn test_fill_buckets_dense_and_aligned() {
        let mut sparse = BTreeMap::new();
        sparse.insert(120, [(CheckInStatus::Ok, 2)].into_iter().collect());

        // from=30 floors to 0; to=240 is exclusive
        let buckets = fill_buckets(30, 240, 60, sparse);
        let starts: Vec<i64> = buckets.iter().map(|(ts, _)| *ts).collect();

        assert_eq!(starts, vec![0, 60, 120, 180]);
        assert!(is_stats_bucket_empty(&buckets[0].1));
        assert_eq!(buckets[2].1.get(&CheckInStatus::Ok), 2);
        assert!(is_stats_bucket_empty(&buckets[3].1));
    }

    #[test]
    fn test_fill_buckets_ignores_out_of_range() {
        let mut sparse = BTreeMap::new();
        sparse.insert(600, [(CheckInStatus::Error, 1)].into_iter().collect());

        let buckets = fill_buckets(0, 120, 60, sparse);
        assert_eq!(buckets.len(), 2);
        assert!(buckets.iter().all(|(_, stats)| is_stats_bucket_empty(stats)));
    }

    #[test]
    fn test_fill_buckets_degenerate() {
        assert!(fill_buckets(0, 600, 0, BTreeMap::new()).is_empty());
        assert!(fill_buckets(600, 600, 60, BTreeMap::new()).is_empty());
        assert!(fill_buckets(900, 600, 60, BTreeMap::new()).is_empty());
    }

    #[test]
    fn test_fill_buckets_near_timestamp_limits() {
        let buckets = fill_buckets(i64::MAX - 90, i64::MAX, 60, BTreeMap::new());
        let last_boundary = i64::MAX - i64::MAX % 60;
        let starts: Vec<i64> = buckets.iter().map(|(ts, _)| *ts).collect();
        assert_eq!(
            starts,
            vec![last_boundary - 120, last_boundary - 60, last_boundary]
        );

        // Flooring i64::MIN to a 60s boundary leaves the i64 range
        assert!(fill_buckets(i64::MIN, i64::MIN + 60, 60, BTreeMap::new()).is_empty());
    }

    #[tokio::test]
    async fn test_storage_creation() {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir.path().join("nested").join("checkins.db");

        let storage = SqliteStorage::new(&db_path).await.unwrap();

        let result: (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name='checkins'",
        )
        .fetch_one(&storage.pool)
        .await
        .unwrap();

        assert_eq!(result.0, 1);
    }

    #[tokio::test]
    async fn test_record_and_query_buckets() {
        let temp_dir = TempDir::new().unwrap();
        let storage = SqliteStorage::new(temp_dir.path().join("test.db"))
            .await
            .unwrap();

        for (ts, status) in [
            (6000, CheckInStatus::Ok),
            (6010, CheckInStatus::Ok),
            (6050, CheckInStatus::Error),
            (6130, CheckInStatus::Missed),
        ] {
            storage
                .record_check_in(&check_in("backup", ts, status))
                .await
                .unwrap();
        }

        let buckets = storage.query_buckets("backup", 6000, 6240, 60).await.unwrap();
        let starts: Vec<i64> = buckets.iter().map(|(ts, _)| *ts).collect();
        assert_eq!(starts, vec![6000, 6060, 6120, 6180]);

        assert_eq!(buckets[0].1.get(&CheckInStatus::Ok), 2);
        assert_eq!(buckets[0].1.get(&CheckInStatus::Error), 1);
        assert!(is_stats_bucket_empty(&buckets[1].1));
        assert_eq!(buckets[2].1.get(&CheckInStatus::Missed), 1);
        assert!(is_stats_bucket_empty(&buckets[3].1));
    }

    #[tokio::test]
    async fn test_query_is_per_monitor() {
        let temp_dir = TempDir::new().unwrap();
        let storage = SqliteStorage::new(temp_dir.path().join("test.db"))
            .await
            .unwrap();

        storage
            .record_check_in(&check_in("backup", 6000, CheckInStatus::Ok))
            .await
            .unwrap();
        storage
            .record_check_in(&check_in("cleanup", 6000, CheckInStatus::Timeout))
            .await
            .unwrap();

        let backup = storage.query_buckets("backup", 6000, 6060, 60).await.unwrap();
        let cleanup = storage.query_buckets("cleanup", 6000, 6060, 60).await.unwrap();

        assert_eq!(backup[0].1.get(&CheckInStatus::Ok), 1);
        assert_eq!(backup[0].1.get(&CheckInStatus::Timeout), 0);
        assert_eq!(cleanup[0].1.get(&CheckInStatus::Timeout), 1);
    }

    #[tokio::test]
    async fn test_range_end_is_exclusive() {
        let temp_dir = TempDir::new().unwrap();
        let storage = SqliteStorage::new(temp_dir.path().join("test.db"))
            .await
            .unwrap();

        storage
            .record_check_in(&check_in("backup", 6120, CheckInStatus::Ok))
            .await
            .unwrap();

        let buckets = storage.query_buckets("backup", 6000, 6120, 60).await.unwrap();
        assert_eq!(buckets.len(), 2);
        assert!(buckets.iter().all(|(_, stats)| is_stats_bucket_empty(stats)));
    }

    #[tokio::test]
    async fn test_empty_query() {
        let temp_dir = TempDir::new().unwrap();
        let storage = SqliteStorage::new(temp_dir.path().join("test.db"))
            .await
            .unwrap();

        let buckets = storage.query_buckets("backup", 1000, 2000, 300).await.unwrap();
        assert_eq!(buckets.len(), 4);
        assert!(buckets.iter().all(|(_, stats)| is_stats_bucket_empty(stats)));
    }

    #[tokio::test]
    async fn test_negative_timestamps_floor_to_bucket_start() {
        let temp_dir = TempDir::new().unwrap();
        let storage = SqliteStorage::new(temp_dir.path().join("test.db"))
            .await
            .unwrap();

        for ts in [-30, -60, -61] {
            storage
                .record_check_in(&check_in("backup", ts, CheckInStatus::Ok))
                .await
                .unwrap();
        }

        let buckets = storage.query_buckets("backup", -120, 60, 60).await.unwrap();
        let starts: Vec<i64> = buckets.iter().map(|(ts, _)| *ts).collect();
        assert_eq!(starts, vec![-120, -60, 0]);

        assert_eq!(buckets[0].1.get(&CheckInStatus::Ok), 1);
        assert_eq!(buckets[1].1.get(&CheckInStatus::Ok), 2);
        assert!(is_stats_bucket_empty(&buckets[2].1));
    }

    #[tokio::test]
    async fn test_invalid_arguments() {
        let temp_dir = TempDir::new().unwrap();
        let storage = SqliteStorage::new(temp_dir.path().join("test.db"))
            .await
            .unwrap();

        let result = storage.query_buckets("backup", 1000, 2000, 0).await;
        assert!(matches!(result, Err(StorageError::InvalidArgument(_))));

        let result = storage.query_buckets("backup", 2000, 1000, 60).await;
        assert!(matches!(result, Err(StorageError::InvalidArgument(_))));

        let result = storage
            .record_check_in(&check_in("", 1000, CheckInStatus::Ok))
            .await;
        assert!(matches!(result, Err(StorageError::InvalidArgument(_))));
    }
}
