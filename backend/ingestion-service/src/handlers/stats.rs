use actix_web::{get, web, HttpResponse};
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::AppState;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatsResponse {
    pub events_processed: u64,
    pub last_event_time: Option<DateTime<Utc>>,
    pub consumer_group: String,
    pub event_hub_name: String,
}

#[get("/stats")]
pub async fn get_stats(state: web::Data<AppState>) -> HttpResponse {
    let snapshot = state.pipeline.stats();

    HttpResponse::Ok().json(StatsResponse {
        events_processed: snapshot.events_processed,
        last_event_time: snapshot.last_event_time,
        consumer_group: state.consumer_group.clone(),
        event_hub_name: state.eventhub_name.clone(),
    })
}
