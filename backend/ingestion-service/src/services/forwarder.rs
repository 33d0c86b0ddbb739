//! Forwarder
//!
//! Hands enriched events to the Dapr sidecar's publish API instead of
//! talking to the message bus directly. The sidecar answers `204 No Content`
//! once the broker has accepted the message; anything else is a failure.

use async_trait::async_trait;
use reqwest::StatusCode;
use std::time::Duration;
use tracing::{debug, error, warn};

use crate::config::Config;
use crate::error::{ForwardError, IngestionError, Result};
use crate::models::EnrichedEvent;

/// Publishes one enriched event downstream.
#[async_trait]
pub trait Forwarder: Send + Sync {
    async fn forward(&self, event: &EnrichedEvent) -> std::result::Result<(), ForwardError>;
}

/// Dapr pub/sub publisher (`POST /v1.0/publish/{pubsub}/{topic}`)
#[derive(Debug, Clone)]
pub struct DaprPublisher {
    client: reqwest::Client,
    base_url: String,
    pubsub: String,
    topic: String,
}

impl DaprPublisher {
    pub fn new(
        base_url: impl Into<String>,
        pubsub: impl Into<String>,
        topic: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| IngestionError::Config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            pubsub: pubsub.into(),
            topic: topic.into(),
        })
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        Self::new(
            config.dapr_base_url(),
            &config.dapr_pubsub_name,
            &config.dapr_topic,
            config.forward_timeout(),
        )
    }

    /// Same sidecar and component, different topic (shares the connection pool).
    pub fn for_topic(&self, topic: impl Into<String>) -> Self {
        Self {
            client: self.client.clone(),
            base_url: self.base_url.clone(),
            pubsub: self.pubsub.clone(),
            topic: topic.into(),
        }
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    pub fn publish_url(&self) -> String {
        format!(
            "{}/v1.0/publish/{}/{}",
            self.base_url, self.pubsub, self.topic
        )
    }
}

#[async_trait]
impl Forwarder for DaprPublisher {
    async fn forward(&self, event: &EnrichedEvent) -> std::result::Result<(), ForwardError> {
        let response = self
            .client
            .post(self.publish_url())
            .json(event)
            .send()
            .await
            .map_err(|e| {
                error!(topic = %self.topic, error = %e, "Failed to publish to Dapr");
                ForwardError::from(e)
            })?;

        let status = response.status();
        if status == StatusCode::NO_CONTENT {
            debug!(
                topic = %self.topic,
                id = %event.id,
                sequence = event.processing_metadata.sequence_number,
                "Published event to Dapr pub/sub"
            );
            Ok(())
        } else {
            warn!(topic = %self.topic, status = status.as_u16(), "Dapr publish returned unexpected status");
            Err(ForwardError::Rejected {
                status: status.as_u16(),
            })
        }
    }
}
