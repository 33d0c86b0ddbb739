//! Ingestion service
//!
//! Consumes telemetry from an Event Hubs consumer group, enriches each event
//! with processing metadata, publishes it through the Dapr pub/sub sidecar
//! and checkpoints the log position once the publish was accepted. A small
//! HTTP surface serves probes, statistics and a simulate endpoint that feeds
//! the same pipeline.

pub mod config;
pub mod credentials;
pub mod error;
pub mod eventlog;
pub mod handlers;
pub mod metrics;
pub mod models;
pub mod services;

use std::sync::Arc;
use std::time::Duration;

use crate::config::Config;
use crate::services::IngestPipeline;

/// Shared state for HTTP handlers
pub struct AppState {
    pub pipeline: Arc<IngestPipeline>,
    pub consumer_group: String,
    pub eventhub_name: String,
    pub simulate_delay: Duration,
}

impl AppState {
    pub fn new(pipeline: Arc<IngestPipeline>, config: &Config) -> Self {
        Self {
            pipeline,
            consumer_group: config.consumer_group.clone(),
            eventhub_name: config.eventhub_name.clone(),
            simulate_delay: config.simulate_delay(),
        }
    }
}
