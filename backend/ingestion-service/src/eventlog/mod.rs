//! Event log abstraction
//!
//! A partitioned, append-only log read through a consumer group. Positions
//! are per partition; committing a checkpoint for an event means a restarted
//! consumer in the same group resumes after it.

pub mod kafka;

use async_trait::async_trait;
use std::sync::Arc;

use crate::credentials::{AccessToken, CredentialProvider};
use crate::error::Result;

pub use kafka::KafkaEventLog;

/// Position of one event within its partition
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CheckpointPosition {
    pub topic: String,
    pub partition: i32,
    pub offset: i64,
}

/// Where to start when the consumer group has no committed position
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum StartPosition {
    /// Skip the backlog and read only new events
    #[default]
    Latest,
    Earliest,
}

impl StartPosition {
    pub fn as_offset_reset(&self) -> &'static str {
        match self {
            StartPosition::Latest => "latest",
            StartPosition::Earliest => "earliest",
        }
    }
}

/// One delivered record
#[derive(Debug, Clone)]
pub struct LogEvent {
    pub position: CheckpointPosition,
    pub body: Vec<u8>,
}

#[async_trait]
pub trait EventLog: Send + Sync {
    /// Open a subscription authenticated with `token`. `credentials` is kept
    /// for token refresh while the subscription is open.
    async fn subscribe(
        &self,
        token: AccessToken,
        credentials: Arc<dyn CredentialProvider>,
        start: StartPosition,
    ) -> Result<Box<dyn Subscription>>;
}

/// An open subscription.
///
/// Events arrive in partition order. `next_event` returns `Ok(None)` when the
/// log has nothing more to deliver and the subscription has ended.
#[async_trait]
pub trait Subscription: Send {
    async fn next_event(&mut self) -> Result<Option<LogEvent>>;

    async fn checkpoint(&mut self, position: &CheckpointPosition) -> Result<()>;

    async fn close(&mut self);
}
