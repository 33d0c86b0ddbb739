//! `POST /simulate`
//!
//! Pushes one event through the same pipeline as the consumer, without a
//! log position. The artificial delay makes request concurrency visible to
//! the autoscaler during demos.

use actix_web::{post, web, HttpResponse};
use futures::StreamExt;
use serde::Serialize;
use tracing::{debug, warn};

use crate::models::{EnrichedEvent, RawEvent};
use crate::AppState;

#[derive(Debug, Serialize)]
pub struct SimulateResponse {
    pub message: &'static str,
    pub event: EnrichedEvent,
}

/// Largest simulate body that is parsed; anything bigger is replaced by a
/// synthetic event.
pub const MAX_SIMULATE_BODY: usize = 1024 * 1024;

/// Collect the request body, or `None` when it is unreadable or too large.
async fn read_body(payload: &mut web::Payload, limit: usize) -> Option<web::BytesMut> {
    let mut body = web::BytesMut::new();
    while let Some(chunk) = payload.next().await {
        let chunk = match chunk {
            Ok(chunk) => chunk,
            Err(e) => {
                debug!(error = %e, "Failed to read simulate body");
                return None;
            }
        };
        if body.len() + chunk.len() > limit {
            debug!(limit, "Simulate body over limit");
            return None;
        }
        body.extend_from_slice(&chunk);
    }
    Some(body)
}

#[post("/simulate")]
pub async fn simulate_event(state: web::Data<AppState>, mut payload: web::Payload) -> HttpResponse {
    tokio::time::sleep(state.simulate_delay).await;

    let parsed = read_body(&mut payload, MAX_SIMULATE_BODY)
        .await
        .and_then(|body| match RawEvent::from_slice(&body) {
            Ok(raw) => Some(raw),
            Err(e) => {
                debug!(error = %e, "Simulate body is not a JSON object");
                None
            }
        });
    let raw = match parsed {
        Some(raw) => raw,
        None => {
            debug!("No usable simulate body, using synthetic event");
            RawEvent::simulated(state.pipeline.next_sequence())
        }
    };

    let outcome = state.pipeline.ingest(&raw).await;
    if let Err(e) = &outcome.delivery {
        warn!(
            sequence = outcome.event.processing_metadata.sequence_number,
            error = %e,
            "Simulated event was not forwarded"
        );
    }

    HttpResponse::Ok().json(SimulateResponse {
        message: "Event simulated",
        event: outcome.event,
    })
}
