//! Telemetry event models
//!
//! Upstream producers are not bound to a schema: a raw event is any JSON
//! object. Only five top-level fields are looked at; everything else is
//! ignored and field values keep whatever JSON type the producer used.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

/// Identifier stamped into every enriched event
pub const INGESTED_BY: &str = "ingestion-service";

/// Schema-free event as delivered by the log or posted to `/simulate`
///
/// ```json
/// {
///   "id": "t1",
///   "deviceId": "d1",
///   "timestamp": "2024-05-01T12:00:00Z",
///   "eventType": "temp",
///   "payload": {"v": 1}
/// }
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RawEvent(Map<String, Value>);

impl RawEvent {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a log record body. Anything but a JSON object is rejected.
    pub fn from_slice(body: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(body)
    }

    pub fn with(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.0.insert(key.to_string(), value.into());
        self
    }

    /// Field value, treating an explicit `null` as absent
    pub fn field(&self, key: &str) -> Option<&Value> {
        self.0.get(key).filter(|v| !v.is_null())
    }

    /// Synthetic event used when `/simulate` receives no usable body
    pub fn simulated(next_sequence: u64) -> Self {
        Self::new()
            .with("id", format!("sim-{}", next_sequence))
            .with("deviceId", "simulator-001")
            .with("eventType", "temperature")
            .with(
                "payload",
                json!({
                    "temperature": 72.5,
                    "humidity": 45.2,
                    "pressure": 1013.25
                }),
            )
    }
}

impl From<Map<String, Value>> for RawEvent {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

/// Ingestion metadata appended during enrichment
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessingMetadata {
    pub ingested_at: DateTime<Utc>,
    pub ingested_by: String,
    /// Per-process sequence, starts at 1 and resets on restart
    pub sequence_number: u64,
}

/// Event as published to the pub/sub topic
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnrichedEvent {
    pub id: Value,
    pub device_id: Value,
    pub timestamp: Value,
    pub event_type: Value,
    pub payload: Value,
    pub processing_metadata: ProcessingMetadata,
}

/// Point-in-time copy of the stats register
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatsSnapshot {
    pub events_processed: u64,
    pub last_event_time: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_raw_event_accepts_any_object() {
        let raw = RawEvent::from_slice(br#"{"id": 7, "extra": [1, 2]}"#).unwrap();
        assert_eq!(raw.field("id"), Some(&json!(7)));
        assert_eq!(raw.field("deviceId"), None);
    }

    #[test]
    fn test_raw_event_rejects_non_objects() {
        assert!(RawEvent::from_slice(b"[1, 2, 3]").is_err());
        assert!(RawEvent::from_slice(b"\"text\"").is_err());
        assert!(RawEvent::from_slice(b"null").is_err());
        assert!(RawEvent::from_slice(b"not json").is_err());
        assert!(RawEvent::from_slice(b"").is_err());
    }

    #[test]
    fn test_null_field_counts_as_absent() {
        let raw = RawEvent::from_slice(br#"{"deviceId": null}"#).unwrap();
        assert_eq!(raw.field("deviceId"), None);
    }

    #[test]
    fn test_simulated_event() {
        let raw = RawEvent::simulated(4);
        assert_eq!(raw.field("id"), Some(&json!("sim-4")));
        assert_eq!(raw.field("deviceId"), Some(&json!("simulator-001")));
        assert_eq!(raw.field("eventType"), Some(&json!("temperature")));
        assert_eq!(raw.field("payload").unwrap()["pressure"], 1013.25);
    }

    #[test]
    fn test_enriched_event_wire_format() {
        let event = EnrichedEvent {
            id: json!("t1"),
            device_id: json!("d1"),
            timestamp: json!("2024-05-01T12:00:00Z"),
            event_type: json!("temp"),
            payload: json!({"v": 1}),
            processing_metadata: ProcessingMetadata {
                ingested_at: "2024-05-01T12:00:01Z".parse().unwrap(),
                ingested_by: INGESTED_BY.to_string(),
                sequence_number: 3,
            },
        };

        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["deviceId"], "d1");
        assert_eq!(value["eventType"], "temp");
        assert_eq!(value["processingMetadata"]["ingestedBy"], "ingestion-service");
        assert_eq!(value["processingMetadata"]["sequenceNumber"], 3);
        assert!(value["processingMetadata"]["ingestedAt"]
            .as_str()
            .unwrap()
            .starts_with("2024-05-01T12:00:01"));
    }

    #[test]
    fn test_empty_stats_snapshot_serializes_null_time() {
        let snapshot = StatsSnapshot {
            events_processed: 0,
            last_event_time: None,
        };
        let value = serde_json::to_value(snapshot).unwrap();
        assert_eq!(value, json!({"eventsProcessed": 0, "lastEventTime": null}));
    }
}
