use actix_web::{get, HttpResponse};
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::models::INGESTED_BY;

#[derive(Debug, Serialize)]
pub struct ServiceInfo {
    pub service: &'static str,
    pub version: &'static str,
    pub description: &'static str,
    pub differentiators: [&'static str; 3],
}

#[derive(Debug, Serialize)]
pub struct ProbeResponse {
    pub status: &'static str,
    pub timestamp: DateTime<Utc>,
}

#[get("/")]
pub async fn service_info() -> HttpResponse {
    HttpResponse::Ok().json(ServiceInfo {
        service: INGESTED_BY,
        version: env!("CARGO_PKG_VERSION"),
        description: "Event Hub consumer for CloudBurst Analytics",
        differentiators: [
            "Scale-to-zero when no events",
            "Event-driven autoscaling via KEDA",
            "Dapr pub/sub for reliable messaging",
        ],
    })
}

/// Liveness probe
#[get("/health")]
pub async fn health_check() -> HttpResponse {
    HttpResponse::Ok().json(ProbeResponse {
        status: "healthy",
        timestamp: Utc::now(),
    })
}

/// Readiness probe. Answers independently of the consumer and the sidecar.
#[get("/ready")]
pub async fn readiness() -> HttpResponse {
    HttpResponse::Ok().json(ProbeResponse {
        status: "ready",
        timestamp: Utc::now(),
    })
}

/// Dapr asks which topics to deliver to this app; it only publishes.
#[get("/dapr/subscribe")]
pub async fn dapr_subscribe() -> HttpResponse {
    HttpResponse::Ok().json(Vec::<serde_json::Value>::new())
}
