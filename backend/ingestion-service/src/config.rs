//! Configuration management
//!
//! Every field maps to an upper-cased environment variable (`EVENTHUB_NAMESPACE`,
//! `DAPR_HTTP_PORT`, ...). All of them have defaults, so an empty environment
//! yields a runnable service with the consumer disabled.

use serde::Deserialize;
use std::time::Duration;
use tracing::info;

use crate::error::{IngestionError, Result};

const EVENTHUB_HOST_SUFFIX: &str = ".servicebus.windows.net";
const EVENTHUB_KAFKA_PORT: u16 = 9093;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Event Hubs namespace; empty disables the consumer
    #[serde(default)]
    pub eventhub_namespace: String,
    #[serde(default = "default_eventhub_name")]
    pub eventhub_name: String,
    #[serde(default = "default_consumer_group")]
    pub consumer_group: String,

    /// User-assigned managed identity; empty uses the system identity
    #[serde(default)]
    pub azure_client_id: String,
    #[serde(default)]
    pub identity_endpoint: Option<String>,
    #[serde(default)]
    pub identity_header: Option<String>,

    #[serde(default = "default_dapr_http_port")]
    pub dapr_http_port: u16,
    #[serde(default = "default_dapr_pubsub_name")]
    pub dapr_pubsub_name: String,
    #[serde(default = "default_dapr_topic")]
    pub dapr_topic: String,

    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_simulate_delay_ms")]
    pub simulate_delay_ms: u64,
    #[serde(default = "default_forward_timeout_secs")]
    pub forward_timeout_secs: u64,

    /// `none`, `retry` or `dead-letter`
    #[serde(default = "default_delivery_policy")]
    pub delivery_policy: String,
    #[serde(default = "default_delivery_max_retries")]
    pub delivery_max_retries: u32,
    #[serde(default = "default_dead_letter_topic")]
    pub dead_letter_topic: String,

    #[serde(default)]
    pub consumer_restart_delay_secs: Option<u64>,
}

fn default_eventhub_name() -> String {
    "telemetry".to_string()
}

fn default_consumer_group() -> String {
    "ingestion".to_string()
}

fn default_dapr_http_port() -> u16 {
    3500
}

fn default_dapr_pubsub_name() -> String {
    "pubsub".to_string()
}

fn default_dapr_topic() -> String {
    "telemetry-events".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_simulate_delay_ms() -> u64 {
    500
}

fn default_forward_timeout_secs() -> u64 {
    10
}

fn default_delivery_policy() -> String {
    "none".to_string()
}

fn default_delivery_max_retries() -> u32 {
    3
}

fn default_dead_letter_topic() -> String {
    "telemetry-events-dlq".to_string()
}

/// Which delivery guarantee wraps the publisher.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryMode {
    None,
    Retry { max_retries: u32 },
    DeadLetter { topic: String },
}

impl Config {
    pub fn from_env() -> std::result::Result<Self, envy::Error> {
        dotenvy::dotenv().ok();
        envy::from_env()
    }

    /// Build from explicit key/value pairs (keys as environment variable names).
    pub fn from_vars<I>(vars: I) -> std::result::Result<Self, envy::Error>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        envy::from_iter(vars)
    }

    pub fn consumer_enabled(&self) -> bool {
        !self.eventhub_namespace.trim().is_empty()
    }

    /// `evhns-x` becomes `evhns-x.servicebus.windows.net`; full hostnames pass through.
    pub fn fully_qualified_namespace(&self) -> String {
        let namespace = self.eventhub_namespace.trim();
        if namespace.contains(EVENTHUB_HOST_SUFFIX) {
            namespace.to_string()
        } else {
            format!("{}{}", namespace, EVENTHUB_HOST_SUFFIX)
        }
    }

    pub fn kafka_bootstrap(&self) -> String {
        format!("{}:{}", self.fully_qualified_namespace(), EVENTHUB_KAFKA_PORT)
    }

    pub fn dapr_base_url(&self) -> String {
        format!("http://localhost:{}", self.dapr_http_port)
    }

    pub fn client_id(&self) -> Option<&str> {
        let id = self.azure_client_id.trim();
        (!id.is_empty()).then_some(id)
    }

    pub fn simulate_delay(&self) -> Duration {
        Duration::from_millis(self.simulate_delay_ms)
    }

    pub fn forward_timeout(&self) -> Duration {
        Duration::from_secs(self.forward_timeout_secs)
    }

    pub fn restart_delay(&self) -> Option<Duration> {
        self.consumer_restart_delay_secs.map(Duration::from_secs)
    }

    pub fn delivery_mode(&self) -> Result<DeliveryMode> {
        match self.delivery_policy.trim().to_ascii_lowercase().as_str() {
            "" | "none" => Ok(DeliveryMode::None),
            "retry" => Ok(DeliveryMode::Retry {
                max_retries: self.delivery_max_retries,
            }),
            "dead-letter" | "deadletter" | "dlq" => Ok(DeliveryMode::DeadLetter {
                topic: self.dead_letter_topic.clone(),
            }),
            other => Err(IngestionError::Config(format!(
                "Unknown DELIVERY_POLICY '{}' (expected none, retry or dead-letter)",
                other
            ))),
        }
    }

    pub fn log_config(&self) {
        info!(
            eventhub_namespace = %self.eventhub_namespace,
            eventhub_name = %self.eventhub_name,
            consumer_group = %self.consumer_group,
            managed_identity = self.client_id().unwrap_or("default"),
            dapr_http_port = self.dapr_http_port,
            dapr_topic = %self.dapr_topic,
            delivery_policy = %self.delivery_policy,
            port = self.port,
            "Configuration loaded"
        );
    }
}
