//! Stats register
//!
//! Two independent atomics: a snapshot may pair a fresh count with the
//! previous timestamp. That is acceptable for a statistics display and keeps
//! readers lock-free.

use chrono::{DateTime, TimeZone, Utc};
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};

use crate::models::StatsSnapshot;

const NO_EVENT: i64 = i64::MIN;

#[derive(Debug)]
pub struct StatsRegister {
    events_processed: AtomicU64,
    /// Unix nanos of the last processed event, `NO_EVENT` until the first one
    last_event_nanos: AtomicI64,
}

impl StatsRegister {
    pub fn new() -> Self {
        Self {
            events_processed: AtomicU64::new(0),
            last_event_nanos: AtomicI64::new(NO_EVENT),
        }
    }

    pub fn record_processed(&self) {
        self.record_processed_at(Utc::now());
    }

    pub fn record_processed_at(&self, at: DateTime<Utc>) {
        self.events_processed.fetch_add(1, Ordering::Relaxed);
        // i64 nanos cover 1677..2262; saturate outside that range
        let nanos = at
            .timestamp_nanos_opt()
            .unwrap_or_else(|| at.timestamp_micros().saturating_mul(1_000));
        self.last_event_nanos.store(nanos, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        let nanos = self.last_event_nanos.load(Ordering::Relaxed);
        StatsSnapshot {
            events_processed: self.events_processed.load(Ordering::Relaxed),
            last_event_time: (nanos != NO_EVENT).then(|| Utc.timestamp_nanos(nanos)),
        }
    }
}

impl Default for StatsRegister {
    fn default() -> Self {
        Self::new()
    }
}
