//! Managed identity credentials
//!
//! Tokens for the Event Hubs resource come from the Container Apps identity
//! endpoint when `IDENTITY_ENDPOINT`/`IDENTITY_HEADER` are set, otherwise
//! from the instance metadata service.

use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, TimeZone, Utc};
use serde::Deserialize;
use std::fmt;
use std::sync::Mutex;
use std::time::Duration;
use tracing::{debug, info};

use crate::config::Config;
use crate::error::{IngestionError, Result};

pub const EVENTHUBS_RESOURCE: &str = "https://eventhubs.azure.net";
pub const IMDS_TOKEN_URL: &str = "http://169.254.169.254/metadata/identity/oauth2/token";

const IMDS_API_VERSION: &str = "2018-02-01";
const APP_SERVICE_API_VERSION: &str = "2019-08-01";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Bearer token with its expiry
#[derive(Clone, PartialEq, Eq)]
pub struct AccessToken {
    secret: String,
    pub expires_on: DateTime<Utc>,
}

impl AccessToken {
    pub fn new(secret: impl Into<String>, expires_on: DateTime<Utc>) -> Self {
        Self {
            secret: secret.into(),
            expires_on,
        }
    }

    pub fn secret(&self) -> &str {
        &self.secret
    }

    pub fn expires_within(&self, window: ChronoDuration) -> bool {
        self.expires_on - window <= Utc::now()
    }

    /// Expiry as Unix milliseconds, the form SASL/OAUTHBEARER expects
    pub fn expires_on_millis(&self) -> i64 {
        self.expires_on.timestamp_millis()
    }
}

impl fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccessToken")
            .field("secret", &"<redacted>")
            .field("expires_on", &self.expires_on)
            .finish()
    }
}

/// Source of tokens for the event log.
///
/// `release` is called once per consumption attempt after the subscription
/// has been closed.
#[async_trait]
pub trait CredentialProvider: Send + Sync {
    async fn acquire(&self) -> Result<AccessToken>;
    async fn release(&self);
}

#[derive(Debug, Clone)]
enum IdentitySource {
    AppService { endpoint: String, header: String },
    Imds { url: String },
}

/// Token response; `expires_on` arrives as a string on some endpoints
#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_on: ExpiresOn,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ExpiresOn {
    Seconds(i64),
    Text(String),
}

impl ExpiresOn {
    fn to_datetime(&self) -> Result<DateTime<Utc>> {
        let seconds = match self {
            ExpiresOn::Seconds(s) => *s,
            ExpiresOn::Text(text) => text.trim().parse::<i64>().map_err(|_| {
                IngestionError::Credential(format!("Invalid expires_on value '{}'", text))
            })?,
        };
        Utc.timestamp_opt(seconds, 0).single().ok_or_else(|| {
            IngestionError::Credential(format!("expires_on out of range: {}", seconds))
        })
    }
}

pub struct ManagedIdentityCredential {
    client: reqwest::Client,
    source: IdentitySource,
    client_id: Option<String>,
    cached: Mutex<Option<AccessToken>>,
}

impl ManagedIdentityCredential {
    pub fn from_config(config: &Config) -> Result<Self> {
        let source = match (&config.identity_endpoint, &config.identity_header) {
            (Some(endpoint), Some(header)) if !endpoint.trim().is_empty() => {
                IdentitySource::AppService {
                    endpoint: endpoint.clone(),
                    header: header.clone(),
                }
            }
            _ => IdentitySource::Imds {
                url: IMDS_TOKEN_URL.to_string(),
            },
        };

        let credential = Self::with_source(source, config.client_id().map(str::to_string))?;
        match config.client_id() {
            Some(id) => info!(client_id = %id, "Using user-assigned managed identity"),
            None => info!("Using system-assigned managed identity"),
        }
        Ok(credential)
    }

    /// Identity endpoint with its secret header (Container Apps / App Service).
    pub fn app_service(
        endpoint: impl Into<String>,
        header: impl Into<String>,
        client_id: Option<String>,
    ) -> Result<Self> {
        Self::with_source(
            IdentitySource::AppService {
                endpoint: endpoint.into(),
                header: header.into(),
            },
            client_id,
        )
    }

    /// Instance metadata service at `url`.
    pub fn imds(url: impl Into<String>, client_id: Option<String>) -> Result<Self> {
        Self::with_source(IdentitySource::Imds { url: url.into() }, client_id)
    }

    fn with_source(source: IdentitySource, client_id: Option<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| IngestionError::Config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            source,
            client_id,
            cached: Mutex::new(None),
        })
    }

    async fn request_token(&self) -> Result<AccessToken> {
        let mut query = vec![("resource", EVENTHUBS_RESOURCE.to_string())];
        if let Some(id) = &self.client_id {
            query.push(("client_id", id.clone()));
        }

        let request = match &self.source {
            IdentitySource::AppService { endpoint, header } => {
                query.push(("api-version", APP_SERVICE_API_VERSION.to_string()));
                self.client
                    .get(endpoint)
                    .header("X-IDENTITY-HEADER", header)
                    .query(&query)
            }
            IdentitySource::Imds { url } => {
                query.push(("api-version", IMDS_API_VERSION.to_string()));
                self.client.get(url).header("Metadata", "true").query(&query)
            }
        };

        let response = request
            .send()
            .await
            .map_err(|e| IngestionError::Credential(format!("Token request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(IngestionError::Credential(format!(
                "Token endpoint returned {}: {}",
                status, body
            )));
        }

        let token: TokenResponse = response
            .json()
            .await
            .map_err(|e| IngestionError::Credential(format!("Invalid token response: {}", e)))?;

        Ok(AccessToken::new(
            token.access_token,
            token.expires_on.to_datetime()?,
        ))
    }
}

#[async_trait]
impl CredentialProvider for ManagedIdentityCredential {
    async fn acquire(&self) -> Result<AccessToken> {
        let cached = self.cached.lock().ok().and_then(|c| c.clone());
        if let Some(token) = cached {
            if !token.expires_within(ChronoDuration::minutes(5)) {
                return Ok(token);
            }
        }

        let token = self.request_token().await?;
        debug!(expires_on = %token.expires_on, "Acquired managed identity token");
        if let Ok(mut cached) = self.cached.lock() {
            *cached = Some(token.clone());
        }
        Ok(token)
    }

    async fn release(&self) {
        if let Ok(mut cached) = self.cached.lock() {
            cached.take();
        }
        debug!("Released managed identity credential");
    }
}
