//! Rolling-window retention
//!
//! A background task enforces the horizon by purging expired records on a
//! fixed cadence. Purge failures are logged and retried next cycle; they
//! never touch the ingestion path.

use crate::store::{now_ms, EventStore};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::interval;

pub const DEFAULT_RETENTION_DAYS: i64 = 5;
pub const DEFAULT_PURGE_INTERVAL_SECS: u64 = 3600;

#[derive(Debug, Clone)]
pub struct RetentionPolicy {
    pub horizon_ms: i64,
    pub purge_interval: Duration,
}

impl Default for RetentionPolicy {
    fn default() -> Self {
        Self::new(
            DEFAULT_RETENTION_DAYS,
            Duration::from_secs(DEFAULT_PURGE_INTERVAL_SECS),
        )
    }
}

impl RetentionPolicy {
    pub fn new(retention_days: i64, purge_interval: Duration) -> Self {
        Self {
            horizon_ms: retention_days * 24 * 60 * 60 * 1000,
            purge_interval,
        }
    }

    /// Everything strictly older than this is expired
    pub fn cutoff(&self, now: i64) -> i64 {
        now - self.horizon_ms
    }
}

/// Periodically purge records past the retention horizon
///
/// Runs until the task is dropped. The first tick fires immediately, so a
/// restart cleans up anything that expired while the process was down.
pub async fn retention_task(store: Arc<EventStore>, policy: RetentionPolicy) {
    log::info!(
        "⏰ Retention task started (horizon: {}ms, interval: {:?})",
        policy.horizon_ms,
        policy.purge_interval
    );

    let mut timer = interval(policy.purge_interval);

    loop {
        timer.tick().await;

        let cutoff = policy.cutoff(now_ms());
        match store.purge_before(cutoff) {
            Ok(0) => log::debug!("🧹 Retention pass: nothing expired"),
            Ok(deleted) => log::info!("🧹 Purged {} expired pulses (cutoff: {})", deleted, cutoff),
            Err(e) => log::error!("❌ Retention purge failed, retrying next cycle: {}", e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rusqlite::Connection;
    use tempfile::tempdir;

    #[test]
    fn test_cutoff_math() {
        let policy = RetentionPolicy::new(5, Duration::from_secs(3600));
        assert_eq!(policy.horizon_ms, 5 * 24 * 60 * 60 * 1000);
        assert_eq!(policy.cutoff(1_000_000_000), 1_000_000_000 - policy.horizon_ms);
    }

    #[tokio::test]
    async fn test_task_purges_expired_records() {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("test.db");
        let store = Arc::new(EventStore::open(&db_path).unwrap());

        let now = now_ms();
        let conn = Connection::open(&db_path).unwrap();
        // One record far past any horizon, one fresh
        conn.execute(
            "INSERT INTO pulses (device_id, server_time) VALUES ('dev', ?1)",
            [now - 10 * 24 * 60 * 60 * 1000],
        )
        .unwrap();
        conn.execute(
            "INSERT INTO pulses (device_id, server_time) VALUES ('dev', ?1)",
            [now],
        )
        .unwrap();
        drop(conn);

        let policy = RetentionPolicy::new(5, Duration::from_millis(10));
        let task = tokio::spawn(retention_task(store.clone(), policy));

        tokio::time::sleep(Duration::from_millis(50)).await;
        task.abort();

        let survivors = store.query_since(0).unwrap();
        assert_eq!(survivors.len(), 1);
        assert!(survivors[0].server_time >= now);
    }
}
