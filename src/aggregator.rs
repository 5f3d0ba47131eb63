//! Read-side aggregation over the pulse store
//!
//! Stateless: every function runs a fresh query and derives its output per
//! request. Buckets have no identity of their own and are never persisted.

use crate::store::{now_ms, EventStore, PulseRecord, StorageError, StoreSummary};
use serde::{Deserialize, Serialize};

/// Production bucket width for the history endpoint
pub const BUCKET_WIDTH_MS: i64 = 10 * 60 * 1000;

/// Hard cap on the raw-record lookback, regardless of what was requested
pub const MAX_RECENT_LOOKBACK_MS: i64 = 60 * 60 * 1000;

/// Fixed-width time bucket derived from raw pulses
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bucket {
    pub bucket_start_ms: i64,
    pub count: u64,
    pub first_pulse_ms: i64,
    pub last_pulse_ms: i64,
}

/// Group pulses since `since_ms` into `bucket_width_ms`-wide buckets
///
/// Alignment uses truncating integer division: a pulse at 599_999 with a
/// 600_000 width lands in bucket 0, one at 600_000 in bucket 600_000.
/// Intervals without pulses produce no bucket; gaps are the caller's
/// problem to render.
pub fn buckets(
    store: &EventStore,
    since_ms: i64,
    bucket_width_ms: i64,
) -> Result<Vec<Bucket>, StorageError> {
    let records = store.query_since(since_ms)?;

    let mut out: Vec<Bucket> = Vec::new();
    for record in records {
        let start = record.server_time / bucket_width_ms * bucket_width_ms;
        match out.last_mut() {
            // Input is ordered by server_time, so the current bucket is
            // always the last one emitted
            Some(bucket) if bucket.bucket_start_ms == start => {
                bucket.count += 1;
                bucket.last_pulse_ms = record.server_time;
            }
            _ => out.push(Bucket {
                bucket_start_ms: start,
                count: 1,
                first_pulse_ms: record.server_time,
                last_pulse_ms: record.server_time,
            }),
        }
    }

    Ok(out)
}

/// Raw records since `since_ms`, clamped to the last 60 minutes
pub fn recent(store: &EventStore, since_ms: i64) -> Result<Vec<PulseRecord>, StorageError> {
    let floor = now_ms() - MAX_RECENT_LOOKBACK_MS;
    store.query_since(since_ms.max(floor))
}

/// Summary statistics over the full retained window
pub fn stats(store: &EventStore) -> Result<StoreSummary, StorageError> {
    store.summary()
}
