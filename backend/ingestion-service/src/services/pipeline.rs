//! Ingest pipeline: enrich → record → forward
//!
//! Shared by the consumption loop and the `/simulate` endpoint. Checkpointing
//! is deliberately not part of it; only the loop owns log positions.

use std::sync::Arc;
use tracing::debug;

use super::enrichment::{enrich, SequenceCounter};
use super::forwarder::Forwarder;
use super::stats::StatsRegister;
use crate::error::ForwardError;
use crate::metrics;
use crate::models::{EnrichedEvent, RawEvent, StatsSnapshot};

/// Result of pushing one raw event through the pipeline
#[derive(Debug)]
pub struct IngestOutcome {
    pub event: EnrichedEvent,
    pub delivery: Result<(), ForwardError>,
}

impl IngestOutcome {
    pub fn delivered(&self) -> bool {
        self.delivery.is_ok()
    }
}

pub struct IngestPipeline {
    sequence: SequenceCounter,
    stats: StatsRegister,
    forwarder: Arc<dyn Forwarder>,
}

impl IngestPipeline {
    pub fn new(forwarder: Arc<dyn Forwarder>) -> Self {
        Self {
            sequence: SequenceCounter::new(),
            stats: StatsRegister::new(),
            forwarder,
        }
    }

    /// Enrich, count and forward one event.
    ///
    /// The event is counted as processed before the forward, so stats and
    /// sequence numbers include events whose publish later failed.
    pub async fn ingest(&self, raw: &RawEvent) -> IngestOutcome {
        let event = enrich(raw, &self.sequence);
        self.stats
            .record_processed_at(event.processing_metadata.ingested_at);
        metrics::record_received();

        debug!(
            id = %event.id,
            device_id = %event.device_id,
            sequence = event.processing_metadata.sequence_number,
            "Enriched event"
        );

        let delivery = self.forwarder.forward(&event).await;
        match &delivery {
            Ok(()) => metrics::record_forwarded(),
            Err(_) => metrics::record_forward_failure(),
        }

        IngestOutcome { event, delivery }
    }

    /// Sequence number the next enriched event would receive
    pub fn next_sequence(&self) -> u64 {
        self.sequence.current() + 1
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }
}
