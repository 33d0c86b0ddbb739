//! Delivery policy
//!
//! Wraps a [`Forwarder`] with the guarantee applied when a publish fails.
//! The pipeline only ever sees a `Forwarder`, so switching policy does not
//! change how events flow or when checkpoints move.

use async_trait::async_trait;
use resilience::{with_retry, RetryConfig};
use std::sync::Arc;
use tracing::{error, warn};

use super::forwarder::{DaprPublisher, Forwarder};
use crate::config::{Config, DeliveryMode};
use crate::error::{ForwardError, Result};
use crate::models::EnrichedEvent;

pub enum DeliveryPolicy {
    /// Single attempt; the failure is reported to the caller.
    None,
    /// Exponential backoff between attempts; the last failure is reported.
    Retry(RetryConfig),
    /// Failed events go to a dead-letter forwarder. A successful dead-letter
    /// publish counts as delivered.
    DeadLetter(Arc<dyn Forwarder>),
}

impl DeliveryPolicy {
    pub fn name(&self) -> &'static str {
        match self {
            DeliveryPolicy::None => "none",
            DeliveryPolicy::Retry(_) => "retry",
            DeliveryPolicy::DeadLetter(_) => "dead-letter",
        }
    }
}

/// Build the configured policy around `publisher`.
pub fn policy_from_config(config: &Config, publisher: &DaprPublisher) -> Result<DeliveryPolicy> {
    Ok(match config.delivery_mode()? {
        DeliveryMode::None => DeliveryPolicy::None,
        DeliveryMode::Retry { max_retries } => {
            DeliveryPolicy::Retry(RetryConfig::default().with_max_retries(max_retries))
        }
        DeliveryMode::DeadLetter { topic } => {
            DeliveryPolicy::DeadLetter(Arc::new(publisher.for_topic(topic)))
        }
    })
}

/// Forwarder with a delivery policy applied
pub struct GuardedForwarder {
    inner: Arc<dyn Forwarder>,
    policy: DeliveryPolicy,
}

impl GuardedForwarder {
    pub fn new(inner: Arc<dyn Forwarder>, policy: DeliveryPolicy) -> Self {
        Self { inner, policy }
    }
}

#[async_trait]
impl Forwarder for GuardedForwarder {
    async fn forward(&self, event: &EnrichedEvent) -> std::result::Result<(), ForwardError> {
        match &self.policy {
            DeliveryPolicy::None => self.inner.forward(event).await,
            DeliveryPolicy::Retry(config) => {
                let inner = &self.inner;
                with_retry(config, move || inner.forward(event))
                    .await
                    .map_err(|e| e.into_last())
            }
            DeliveryPolicy::DeadLetter(dead_letter) => {
                let primary = match self.inner.forward(event).await {
                    Ok(()) => return Ok(()),
                    Err(e) => e,
                };

                warn!(
                    sequence = event.processing_metadata.sequence_number,
                    error = %primary,
                    "Publish failed, routing event to dead-letter topic"
                );

                dead_letter.forward(event).await.map_err(|e| {
                    error!(error = %e, "Dead-letter publish failed");
                    primary
                })
            }
        }
    }
}
