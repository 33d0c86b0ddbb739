//! Enrichment stage
//!
//! Stamps a raw event with ingestion metadata. The only shared state is the
//! sequence counter; everything else is a pure mapping with defaults, so
//! enrichment never fails.

use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::{Map, Value};
use std::sync::atomic::{AtomicU64, Ordering};

use crate::models::{EnrichedEvent, ProcessingMetadata, RawEvent, INGESTED_BY};

const DEFAULT_DEVICE_ID: &str = "unknown";
const DEFAULT_EVENT_TYPE: &str = "telemetry";

/// Process-lifetime sequence shared by the consumer and `/simulate`
#[derive(Debug, Default)]
pub struct SequenceCounter(AtomicU64);

impl SequenceCounter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim the next sequence number (the first call returns 1).
    pub fn next(&self) -> u64 {
        self.0.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Last claimed sequence number, 0 before any enrichment.
    pub fn current(&self) -> u64 {
        self.0.load(Ordering::SeqCst)
    }
}

/// Enrich `raw` with the next sequence number and the current time.
pub fn enrich(raw: &RawEvent, counter: &SequenceCounter) -> EnrichedEvent {
    enrich_at(raw, counter.next(), Utc::now())
}

/// Enrichment with an explicit sequence number and clock reading.
pub fn enrich_at(raw: &RawEvent, sequence_number: u64, now: DateTime<Utc>) -> EnrichedEvent {
    let field_or = |key: &str, default: Value| raw.field(key).cloned().unwrap_or(default);
    // Same rendering as `ingestedAt`
    let stamped = now.to_rfc3339_opts(SecondsFormat::AutoSi, true);

    EnrichedEvent {
        id: field_or("id", Value::String(sequence_number.to_string())),
        device_id: field_or("deviceId", Value::from(DEFAULT_DEVICE_ID)),
        timestamp: field_or("timestamp", Value::String(stamped)),
        event_type: field_or("eventType", Value::from(DEFAULT_EVENT_TYPE)),
        payload: field_or("payload", Value::Object(Map::new())),
        processing_metadata: ProcessingMetadata {
            ingested_at: now,
            ingested_by: INGESTED_BY.to_string(),
            sequence_number,
        },
    }
}
