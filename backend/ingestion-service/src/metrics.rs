use actix_web::HttpResponse;
use once_cell::sync::Lazy;
use prometheus::{Encoder, IntCounter, TextEncoder};

use crate::error::{IngestionError, Result};

fn register_counter(name: &str, help: &str) -> IntCounter {
    let counter = IntCounter::new(name, help)
        .unwrap_or_else(|e| panic!("failed to create {}: {}", name, e));
    prometheus::default_registry()
        .register(Box::new(counter.clone()))
        .unwrap_or_else(|e| panic!("failed to register {}: {}", name, e));
    counter
}

static EVENTS_RECEIVED_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    register_counter(
        "ingestion_events_received_total",
        "Events enriched from the log or /simulate",
    )
});

static EVENTS_FORWARDED_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    register_counter(
        "ingestion_events_forwarded_total",
        "Events accepted by the pub/sub sidecar",
    )
});

static FORWARD_FAILURES_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    register_counter(
        "ingestion_forward_failures_total",
        "Events the pub/sub sidecar did not accept",
    )
});

static CHECKPOINTS_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    register_counter(
        "ingestion_checkpoints_total",
        "Log positions checkpointed after a successful forward",
    )
});

static DECODE_FAILURES_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    register_counter(
        "ingestion_decode_failures_total",
        "Log records whose body was not a JSON object",
    )
});

static SUBSCRIPTION_ATTEMPTS_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    register_counter(
        "ingestion_subscription_attempts_total",
        "Subscription attempts against the event log",
    )
});

pub fn record_received() {
    EVENTS_RECEIVED_TOTAL.inc();
}

pub fn record_forwarded() {
    EVENTS_FORWARDED_TOTAL.inc();
}

pub fn record_forward_failure() {
    FORWARD_FAILURES_TOTAL.inc();
}

pub fn record_checkpoint() {
    CHECKPOINTS_TOTAL.inc();
}

pub fn record_decode_failure() {
    DECODE_FAILURES_TOTAL.inc();
}

pub fn record_subscription_attempt() {
    SUBSCRIPTION_ATTEMPTS_TOTAL.inc();
}

/// Force registration so `/metrics` lists every counter from the start.
pub fn init() {
    Lazy::force(&EVENTS_RECEIVED_TOTAL);
    Lazy::force(&EVENTS_FORWARDED_TOTAL);
    Lazy::force(&FORWARD_FAILURES_TOTAL);
    Lazy::force(&CHECKPOINTS_TOTAL);
    Lazy::force(&DECODE_FAILURES_TOTAL);
    Lazy::force(&SUBSCRIPTION_ATTEMPTS_TOTAL);
}

pub async fn serve_metrics() -> Result<HttpResponse> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();

    let mut buffer = Vec::new();
    encoder
        .encode(&metric_families, &mut buffer)
        .map_err(|e| IngestionError::Internal(format!("Failed to encode metrics: {}", e)))?;

    Ok(HttpResponse::Ok()
        .content_type(encoder.format_type())
        .body(buffer))
}
