//! Background consumer lifecycle
//!
//! Runs the consumption loop on its own task next to the HTTP server.
//! Without a restart delay a failed attempt leaves the consumer stopped and
//! the HTTP surface keeps serving.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use super::consumer::{shutdown_requested, AttemptOutcome, ConsumerState, ConsumptionLoop};
use super::pipeline::IngestPipeline;
use crate::config::Config;
use crate::credentials::ManagedIdentityCredential;
use crate::error::Result;
use crate::eventlog::KafkaEventLog;

pub struct ConsumerHandle {
    shutdown_tx: watch::Sender<bool>,
    join: JoinHandle<()>,
    state: watch::Receiver<ConsumerState>,
}

impl ConsumerHandle {
    pub fn watch_state(&self) -> watch::Receiver<ConsumerState> {
        self.state.clone()
    }

    /// Signal shutdown and wait until the loop has drained.
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(true);
        if let Err(e) = self.join.await {
            error!(error = %e, "Consumer task terminated abnormally");
        }
        info!("Consumer shut down");
    }
}

/// Spawn `consumption` on the runtime.
///
/// With `restart_delay` set, a new attempt starts that long after an attempt
/// ends for any reason other than shutdown.
pub fn spawn_consumption(
    consumption: ConsumptionLoop,
    restart_delay: Option<Duration>,
) -> ConsumerHandle {
    let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
    let state = consumption.state();

    let join = tokio::spawn(async move {
        let mut attempt: u32 = 0;
        loop {
            attempt += 1;
            match consumption.run(&mut shutdown_rx).await {
                Ok(AttemptOutcome::Shutdown) => break,
                Ok(AttemptOutcome::Ended) => info!(attempt, "Consumer attempt ended"),
                Err(e) => warn!(attempt, error = %e, "Consumer attempt failed"),
            }

            let Some(delay) = restart_delay else {
                warn!("Consumer stopped, no restart configured");
                break;
            };

            info!(attempt, delay_secs = delay.as_secs(), "Restarting consumer after delay");
            tokio::select! {
                biased;
                _ = shutdown_requested(&mut shutdown_rx) => break,
                _ = tokio::time::sleep(delay) => {}
            }
        }
    });

    ConsumerHandle {
        shutdown_tx,
        join,
        state,
    }
}

/// Start the Event Hubs consumer when a namespace is configured.
pub fn start_from_config(
    config: &Config,
    pipeline: Arc<IngestPipeline>,
) -> Result<Option<ConsumerHandle>> {
    if !config.consumer_enabled() {
        warn!("No Event Hub namespace configured (EVENTHUB_NAMESPACE)");
        return Ok(None);
    }

    let credentials = Arc::new(ManagedIdentityCredential::from_config(config)?);
    let log = Arc::new(KafkaEventLog::from_config(config));

    info!(
        eventhub_name = %config.eventhub_name,
        namespace = %config.fully_qualified_namespace(),
        consumer_group = %config.consumer_group,
        "Starting Event Hub consumer"
    );

    let consumption = ConsumptionLoop::new(log, credentials, pipeline);
    Ok(Some(spawn_consumption(consumption, config.restart_delay())))
}
