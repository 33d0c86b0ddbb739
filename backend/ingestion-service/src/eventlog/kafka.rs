//! Event Hubs over its Kafka endpoint
//!
//! Authenticates with SASL/OAUTHBEARER using managed identity tokens. Offsets
//! are committed manually, one event at a time, after a successful forward.

use async_trait::async_trait;
use chrono::Duration as ChronoDuration;
use rdkafka::client::{ClientContext, OAuthToken};
use rdkafka::config::ClientConfig;
use rdkafka::consumer::{CommitMode, Consumer, ConsumerContext, StreamConsumer};
use rdkafka::message::Message;
use rdkafka::{Offset, TopicPartitionList};
use std::error::Error as StdError;
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::{CheckpointPosition, EventLog, LogEvent, StartPosition, Subscription};
use crate::config::Config;
use crate::credentials::{AccessToken, CredentialProvider};
use crate::error::{IngestionError, Result};

const REFRESH_MARGIN_MINUTES: i64 = 5;
const REFRESH_RETRY_DELAY: Duration = Duration::from_secs(30);

/// Hands the current token to librdkafka whenever it asks for one.
///
/// The callback runs synchronously inside the client's poll, so it only
/// reads the shared slot; a background task keeps the slot fresh.
pub struct TokenContext {
    token: Arc<RwLock<AccessToken>>,
}

impl ClientContext for TokenContext {
    const ENABLE_REFRESH_OAUTH_TOKEN: bool = true;

    fn generate_oauth_token(
        &self,
        _oauthbearer_config: Option<&str>,
    ) -> std::result::Result<OAuthToken, Box<dyn StdError>> {
        let token = self
            .token
            .read()
            .map_err(|_| "token slot poisoned".to_string())?;

        Ok(OAuthToken {
            token: token.secret().to_string(),
            principal_name: String::new(),
            lifetime_ms: token.expires_on_millis(),
        })
    }
}

impl ConsumerContext for TokenContext {}

#[derive(Debug, Clone)]
pub struct KafkaEventLog {
    bootstrap_servers: String,
    topic: String,
    group_id: String,
}

impl KafkaEventLog {
    pub fn new(
        bootstrap_servers: impl Into<String>,
        topic: impl Into<String>,
        group_id: impl Into<String>,
    ) -> Self {
        Self {
            bootstrap_servers: bootstrap_servers.into(),
            topic: topic.into(),
            group_id: group_id.into(),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(
            config.kafka_bootstrap(),
            &config.eventhub_name,
            &config.consumer_group,
        )
    }

    fn client_config(&self, start: StartPosition) -> ClientConfig {
        let mut config = ClientConfig::new();
        config
            .set("bootstrap.servers", &self.bootstrap_servers)
            .set("group.id", &self.group_id)
            .set("security.protocol", "SASL_SSL")
            .set("sasl.mechanisms", "OAUTHBEARER")
            .set("enable.auto.commit", "false")
            .set("auto.offset.reset", start.as_offset_reset())
            .set("session.timeout.ms", "30000")
            .set("max.poll.interval.ms", "300000")
            .set("enable.partition.eof", "false");
        config
    }
}

#[async_trait]
impl EventLog for KafkaEventLog {
    async fn subscribe(
        &self,
        token: AccessToken,
        credentials: Arc<dyn CredentialProvider>,
        start: StartPosition,
    ) -> Result<Box<dyn Subscription>> {
        let slot = Arc::new(RwLock::new(token));
        let context = TokenContext {
            token: slot.clone(),
        };

        let consumer: StreamConsumer<TokenContext> =
            self.client_config(start).create_with_context(context)?;
        consumer.subscribe(&[self.topic.as_str()])?;

        info!(
            bootstrap = %self.bootstrap_servers,
            topic = %self.topic,
            group = %self.group_id,
            start = start.as_offset_reset(),
            "Subscribed to event log"
        );

        let refresher = tokio::spawn(refresh_token(slot, credentials));

        Ok(Box::new(KafkaSubscription {
            consumer: Arc::new(consumer),
            refresher,
        }))
    }
}

/// Keep the shared token slot ahead of expiry for as long as the
/// subscription is open.
async fn refresh_token(slot: Arc<RwLock<AccessToken>>, credentials: Arc<dyn CredentialProvider>) {
    loop {
        let expires_on = match slot.read() {
            Ok(token) => token.expires_on,
            Err(_) => return,
        };
        let wait = (expires_on - ChronoDuration::minutes(REFRESH_MARGIN_MINUTES) - chrono::Utc::now())
            .to_std()
            .unwrap_or(Duration::ZERO)
            .max(REFRESH_RETRY_DELAY);
        tokio::time::sleep(wait).await;

        match credentials.acquire().await {
            Ok(fresh) => {
                debug!(expires_on = %fresh.expires_on, "Refreshed event log token");
                if let Ok(mut current) = slot.write() {
                    *current = fresh;
                }
            }
            Err(e) => warn!(error = %e, "Failed to refresh event log token"),
        }
    }
}

/// Commit request for the position after `position`.
fn checkpoint_list(position: &CheckpointPosition) -> Result<TopicPartitionList> {
    let mut tpl = TopicPartitionList::new();
    tpl.add_partition_offset(
        &position.topic,
        position.partition,
        Offset::Offset(position.offset + 1),
    )?;
    Ok(tpl)
}

pub struct KafkaSubscription {
    consumer: Arc<StreamConsumer<TokenContext>>,
    refresher: JoinHandle<()>,
}

#[async_trait]
impl Subscription for KafkaSubscription {
    async fn next_event(&mut self) -> Result<Option<LogEvent>> {
        let message = self.consumer.recv().await?;

        let position = CheckpointPosition {
            topic: message.topic().to_string(),
            partition: message.partition(),
            offset: message.offset(),
        };
        let body = message.payload().map(<[u8]>::to_vec).unwrap_or_default();

        Ok(Some(LogEvent { position, body }))
    }

    async fn checkpoint(&mut self, position: &CheckpointPosition) -> Result<()> {
        let tpl = checkpoint_list(position)?;
        let consumer = self.consumer.clone();

        // A sync commit waits for the broker, so failures surface here
        tokio::task::spawn_blocking(move || consumer.commit(&tpl, CommitMode::Sync))
            .await
            .map_err(|e| IngestionError::Internal(format!("Checkpoint task failed: {}", e)))?
            .map_err(|e| IngestionError::EventLog(format!("Checkpoint commit failed: {}", e)))
    }

    async fn close(&mut self) {
        self.refresher.abort();
        self.consumer.unsubscribe();
        info!("Event log subscription closed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_config() {
        let log = KafkaEventLog::new("evhns.servicebus.windows.net:9093", "telemetry", "ingestion");
        let config = log.client_config(StartPosition::Latest);

        assert_eq!(
            config.get("bootstrap.servers"),
            Some("evhns.servicebus.windows.net:9093")
        );
        assert_eq!(config.get("group.id"), Some("ingestion"));
        assert_eq!(config.get("security.protocol"), Some("SASL_SSL"));
        assert_eq!(config.get("sasl.mechanisms"), Some("OAUTHBEARER"));
        assert_eq!(config.get("enable.auto.commit"), Some("false"));
        assert_eq!(config.get("auto.offset.reset"), Some("latest"));

        let earliest = log.client_config(StartPosition::Earliest);
        assert_eq!(earliest.get("auto.offset.reset"), Some("earliest"));
    }

    #[test]
    fn test_checkpoint_list_commits_next_offset() {
        let position = CheckpointPosition {
            topic: "telemetry".to_string(),
            partition: 3,
            offset: 41,
        };

        let tpl = checkpoint_list(&position).unwrap();

        let elements = tpl.elements();
        assert_eq!(elements.len(), 1);
        assert_eq!(elements[0].topic(), "telemetry");
        assert_eq!(elements[0].partition(), 3);
        assert_eq!(elements[0].offset(), Offset::Offset(42));
    }

    #[test]
    fn test_from_config() {
        let config = Config::from_vars(vec![
            ("EVENTHUB_NAMESPACE".to_string(), "evhns-demo".to_string()),
            ("EVENTHUB_NAME".to_string(), "devices".to_string()),
        ])
        .unwrap();

        let log = KafkaEventLog::from_config(&config);
        assert_eq!(log.bootstrap_servers, "evhns-demo.servicebus.windows.net:9093");
        assert_eq!(log.topic, "devices");
        assert_eq!(log.group_id, "ingestion");
    }

    #[test]
    fn test_token_context_serves_current_token() {
        let expires_on = chrono::Utc::now() + ChronoDuration::hours(1);
        let slot = Arc::new(RwLock::new(AccessToken::new("tok-1", expires_on)));
        let context = TokenContext { token: slot.clone() };

        let token = context.generate_oauth_token(None).unwrap();
        assert_eq!(token.token, "tok-1");
        assert_eq!(token.lifetime_ms, expires_on.timestamp_millis());

        *slot.write().unwrap() = AccessToken::new("tok-2", expires_on);
        assert_eq!(context.generate_oauth_token(None).unwrap().token, "tok-2");
    }
}
