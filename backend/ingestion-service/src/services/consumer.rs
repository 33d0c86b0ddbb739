//! Consumption loop
//!
//! One attempt: acquire a credential, subscribe, then receive and process
//! events until shutdown, a subscription-level error, or the end of the
//! log. Every exit path after the credential was acquired drains: the
//! subscription is closed and the credential released before returning.
//!
//! A log position is checkpointed only after its event was forwarded.
//! Checkpoints are cumulative per partition, so once a forward fails the
//! partition is held at its last checkpoint for the rest of the attempt.
//! The next attempt resumes there and delivers the failed event again,
//! along with anything after it.

use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use super::pipeline::IngestPipeline;
use crate::credentials::CredentialProvider;
use crate::error::Result;
use crate::eventlog::{EventLog, LogEvent, StartPosition, Subscription};
use crate::metrics;
use crate::models::RawEvent;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsumerState {
    Idle,
    Subscribing,
    Receiving,
    Processing,
    Draining,
    Stopped,
}

/// How a successful attempt ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptOutcome {
    /// The shutdown signal fired
    Shutdown,
    /// The log closed the subscription
    Ended,
}

/// Resolves once `true` is published on the shutdown channel or its sender
/// is gone.
pub async fn shutdown_requested(shutdown: &mut watch::Receiver<bool>) {
    loop {
        if *shutdown.borrow() {
            return;
        }
        if shutdown.changed().await.is_err() {
            return;
        }
    }
}

pub struct ConsumptionLoop {
    log: Arc<dyn EventLog>,
    credentials: Arc<dyn CredentialProvider>,
    pipeline: Arc<IngestPipeline>,
    start: StartPosition,
    state_tx: watch::Sender<ConsumerState>,
}

impl ConsumptionLoop {
    pub fn new(
        log: Arc<dyn EventLog>,
        credentials: Arc<dyn CredentialProvider>,
        pipeline: Arc<IngestPipeline>,
    ) -> Self {
        let (state_tx, _) = watch::channel(ConsumerState::Idle);
        Self {
            log,
            credentials,
            pipeline,
            start: StartPosition::default(),
            state_tx,
        }
    }

    pub fn with_start(mut self, start: StartPosition) -> Self {
        self.start = start;
        self
    }

    /// Observe state transitions.
    pub fn state(&self) -> watch::Receiver<ConsumerState> {
        self.state_tx.subscribe()
    }

    fn set_state(&self, state: ConsumerState) {
        let previous = self.state_tx.send_replace(state);
        if previous != state {
            debug!(from = ?previous, to = ?state, "Consumer state changed");
        }
    }

    /// Run a single subscription attempt.
    ///
    /// `Err` means the attempt failed at the subscription level (credential,
    /// subscribe, receive or checkpoint). Per-event forward failures never
    /// end an attempt.
    pub async fn run(&self, shutdown: &mut watch::Receiver<bool>) -> Result<AttemptOutcome> {
        self.set_state(ConsumerState::Subscribing);
        metrics::record_subscription_attempt();

        let token = tokio::select! {
            biased;
            _ = shutdown_requested(shutdown) => {
                self.set_state(ConsumerState::Stopped);
                return Ok(AttemptOutcome::Shutdown);
            }
            result = self.credentials.acquire() => match result {
                Ok(token) => token,
                Err(e) => {
                    error!(error = %e, "Failed to acquire event log credential");
                    self.set_state(ConsumerState::Stopped);
                    return Err(e);
                }
            },
        };

        let subscribed = tokio::select! {
            biased;
            _ = shutdown_requested(shutdown) => None,
            result = self.log.subscribe(token, self.credentials.clone(), self.start) => Some(result),
        };

        let mut subscription = match subscribed {
            Some(Ok(subscription)) => subscription,
            Some(Err(e)) => {
                error!(error = %e, "Failed to subscribe to event log");
                self.release_credential().await;
                return Err(e);
            }
            None => {
                self.release_credential().await;
                return Ok(AttemptOutcome::Shutdown);
            }
        };

        let outcome = self.receive(subscription.as_mut(), shutdown).await;

        self.set_state(ConsumerState::Draining);
        subscription.close().await;
        self.credentials.release().await;
        self.set_state(ConsumerState::Stopped);

        if let Err(e) = &outcome {
            error!(error = %e, "Event Hub consumer error");
        }
        outcome
    }

    async fn release_credential(&self) {
        self.set_state(ConsumerState::Draining);
        self.credentials.release().await;
        self.set_state(ConsumerState::Stopped);
    }

    async fn receive(
        &self,
        subscription: &mut dyn Subscription,
        shutdown: &mut watch::Receiver<bool>,
    ) -> Result<AttemptOutcome> {
        // Partitions with a failed forward in this attempt
        let mut held: HashSet<i32> = HashSet::new();

        loop {
            self.set_state(ConsumerState::Receiving);
            let next = tokio::select! {
                biased;
                _ = shutdown_requested(shutdown) => return Ok(AttemptOutcome::Shutdown),
                next = subscription.next_event() => next?,
            };

            let Some(event) = next else {
                info!("Event log subscription ended");
                return Ok(AttemptOutcome::Ended);
            };

            self.set_state(ConsumerState::Processing);
            tokio::select! {
                biased;
                _ = shutdown_requested(shutdown) => return Ok(AttemptOutcome::Shutdown),
                result = self.process(subscription, event, &mut held) => result?,
            }
        }
    }

    async fn process(
        &self,
        subscription: &mut dyn Subscription,
        event: LogEvent,
        held: &mut HashSet<i32>,
    ) -> Result<()> {
        let position = event.position;

        let raw = match RawEvent::from_slice(&event.body) {
            Ok(raw) => raw,
            Err(e) => {
                metrics::record_decode_failure();
                warn!(
                    partition = position.partition,
                    offset = position.offset,
                    error = %e,
                    "Skipping event with undecodable body"
                );
                return Ok(());
            }
        };

        let outcome = self.pipeline.ingest(&raw).await;
        match outcome.delivery {
            Ok(()) if held.contains(&position.partition) => {
                debug!(
                    partition = position.partition,
                    offset = position.offset,
                    "Partition held after earlier failure, checkpoint not advanced"
                );
            }
            Ok(()) => {
                subscription.checkpoint(&position).await?;
                metrics::record_checkpoint();
                debug!(
                    partition = position.partition,
                    offset = position.offset,
                    "Checkpoint updated"
                );
            }
            Err(e) => {
                held.insert(position.partition);
                error!(
                    partition = position.partition,
                    offset = position.offset,
                    sequence = outcome.event.processing_metadata.sequence_number,
                    error = %e,
                    "Error processing event, checkpoint not advanced"
                );
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_shutdown_requested_waits_for_true() {
        let (tx, mut rx) = watch::channel(false);

        let waiter = tokio::spawn(async move {
            shutdown_requested(&mut rx).await;
        });

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiter.is_finished());

        tx.send(true).unwrap();
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn test_shutdown_requested_when_sender_dropped() {
        let (tx, mut rx) = watch::channel(false);
        drop(tx);

        tokio::time::timeout(Duration::from_secs(1), shutdown_requested(&mut rx))
            .await
            .unwrap();
    }
}
