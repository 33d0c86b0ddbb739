//! Test doubles for the event log, credentials and forwarder.
#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, Utc};
use ingestion_service::credentials::{AccessToken, CredentialProvider};
use ingestion_service::error::{ForwardError, IngestionError, Result};
use ingestion_service::eventlog::{
    CheckpointPosition, EventLog, LogEvent, StartPosition, Subscription,
};
use ingestion_service::models::EnrichedEvent;
use ingestion_service::services::Forwarder;
use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Notify;

pub const TOPIC: &str = "telemetry";

#[derive(Default)]
struct LogState {
    partitions: Vec<Vec<Vec<u8>>>,
    /// Next offset to read per partition, as committed by checkpoints
    committed: HashMap<i32, i64>,
    checkpoints: Vec<CheckpointPosition>,
}

/// In-memory partitioned log with consumer-group checkpoints.
///
/// A finite log ends a subscription once every partition is read; otherwise
/// `next_event` waits for `append`.
pub struct MemoryLog {
    state: Arc<Mutex<LogState>>,
    notify: Arc<Notify>,
    finite: bool,
    fail_subscribe: AtomicBool,
    subscribe_attempts: AtomicU32,
    closed: Arc<AtomicU32>,
}

impl MemoryLog {
    pub fn new(partitions: usize, finite: bool) -> Arc<Self> {
        let state = LogState {
            partitions: vec![Vec::new(); partitions],
            ..Default::default()
        };
        Arc::new(Self {
            state: Arc::new(Mutex::new(state)),
            notify: Arc::new(Notify::new()),
            finite,
            fail_subscribe: AtomicBool::new(false),
            subscribe_attempts: AtomicU32::new(0),
            closed: Arc::new(AtomicU32::new(0)),
        })
    }

    pub fn append(&self, partition: i32, body: impl Into<Vec<u8>>) {
        self.state.lock().unwrap().partitions[partition as usize].push(body.into());
        self.notify.notify_one();
    }

    pub fn append_json(&self, partition: i32, value: serde_json::Value) {
        self.append(partition, value.to_string());
    }

    pub fn set_fail_subscribe(&self, fail: bool) {
        self.fail_subscribe.store(fail, Ordering::SeqCst);
    }

    pub fn checkpoints(&self) -> Vec<CheckpointPosition> {
        self.state.lock().unwrap().checkpoints.clone()
    }

    pub fn checkpointed_offsets(&self, partition: i32) -> Vec<i64> {
        self.checkpoints()
            .into_iter()
            .filter(|c| c.partition == partition)
            .map(|c| c.offset)
            .collect()
    }

    pub fn subscribe_attempts(&self) -> u32 {
        self.subscribe_attempts.load(Ordering::SeqCst)
    }

    pub fn closed_subscriptions(&self) -> u32 {
        self.closed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl EventLog for MemoryLog {
    async fn subscribe(
        &self,
        _token: AccessToken,
        _credentials: Arc<dyn CredentialProvider>,
        start: StartPosition,
    ) -> Result<Box<dyn Subscription>> {
        self.subscribe_attempts.fetch_add(1, Ordering::SeqCst);
        if self.fail_subscribe.load(Ordering::SeqCst) {
            return Err(IngestionError::EventLog("broker unreachable".into()));
        }

        let cursors = {
            let state = self.state.lock().unwrap();
            state
                .partitions
                .iter()
                .enumerate()
                .map(|(p, events)| match state.committed.get(&(p as i32)) {
                    Some(next) => *next,
                    None => match start {
                        StartPosition::Latest => events.len() as i64,
                        StartPosition::Earliest => 0,
                    },
                })
                .collect()
        };

        Ok(Box::new(MemorySubscription {
            state: self.state.clone(),
            notify: self.notify.clone(),
            closed: self.closed.clone(),
            finite: self.finite,
            cursors,
            next_partition: 0,
        }))
    }
}

struct MemorySubscription {
    state: Arc<Mutex<LogState>>,
    notify: Arc<Notify>,
    closed: Arc<AtomicU32>,
    finite: bool,
    cursors: Vec<i64>,
    next_partition: usize,
}

impl MemorySubscription {
    /// Round-robin over partitions with unread events
    fn poll_next(&mut self) -> Option<LogEvent> {
        let state = self.state.lock().unwrap();
        let count = state.partitions.len();
        for step in 0..count {
            let p = (self.next_partition + step) % count;
            let cursor = self.cursors[p];
            if let Some(body) = state.partitions[p].get(cursor as usize) {
                self.cursors[p] += 1;
                self.next_partition = (p + 1) % count;
                return Some(LogEvent {
                    position: CheckpointPosition {
                        topic: TOPIC.to_string(),
                        partition: p as i32,
                        offset: cursor,
                    },
                    body: body.clone(),
                });
            }
        }
        None
    }
}

#[async_trait]
impl Subscription for MemorySubscription {
    async fn next_event(&mut self) -> Result<Option<LogEvent>> {
        loop {
            if let Some(event) = self.poll_next() {
                return Ok(Some(event));
            }
            if self.finite {
                return Ok(None);
            }
            self.notify.notified().await;
        }
    }

    async fn checkpoint(&mut self, position: &CheckpointPosition) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.committed.insert(position.partition, position.offset + 1);
        state.checkpoints.push(position.clone());
        Ok(())
    }

    async fn close(&mut self) {
        self.closed.fetch_add(1, Ordering::SeqCst);
    }
}

/// Credential that counts acquire/release calls
#[derive(Default)]
pub struct StaticCredential {
    pub fail: AtomicBool,
    acquired: AtomicU32,
    released: AtomicU32,
}

impl StaticCredential {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn failing() -> Arc<Self> {
        let credential = Self::default();
        credential.fail.store(true, Ordering::SeqCst);
        Arc::new(credential)
    }

    pub fn acquired(&self) -> u32 {
        self.acquired.load(Ordering::SeqCst)
    }

    pub fn released(&self) -> u32 {
        self.released.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CredentialProvider for StaticCredential {
    async fn acquire(&self) -> Result<AccessToken> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(IngestionError::Credential("identity not found".into()));
        }
        self.acquired.fetch_add(1, Ordering::SeqCst);
        Ok(AccessToken::new(
            "test-token",
            Utc::now() + ChronoDuration::hours(1),
        ))
    }

    async fn release(&self) {
        self.released.fetch_add(1, Ordering::SeqCst);
    }
}

/// Forwarder that rejects chosen event ids and records every attempt
#[derive(Default)]
pub struct RecordingForwarder {
    reject_all: AtomicBool,
    reject_ids: Mutex<HashSet<String>>,
    attempts: Mutex<Vec<EnrichedEvent>>,
}

impl RecordingForwarder {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn rejecting() -> Arc<Self> {
        let forwarder = Self::default();
        forwarder.reject_all.store(true, Ordering::SeqCst);
        Arc::new(forwarder)
    }

    pub fn set_reject_all(&self, reject: bool) {
        self.reject_all.store(reject, Ordering::SeqCst);
    }

    pub fn reject_id(&self, id: &str) {
        self.reject_ids.lock().unwrap().insert(id.to_string());
    }

    pub fn accept_all(&self) {
        self.set_reject_all(false);
        self.reject_ids.lock().unwrap().clear();
    }

    pub fn attempts(&self) -> Vec<EnrichedEvent> {
        self.attempts.lock().unwrap().clone()
    }

    pub fn attempted_ids(&self) -> Vec<String> {
        self.attempts()
            .iter()
            .map(|e| e.id.as_str().unwrap_or_default().to_string())
            .collect()
    }
}

#[async_trait]
impl Forwarder for RecordingForwarder {
    async fn forward(&self, event: &EnrichedEvent) -> std::result::Result<(), ForwardError> {
        self.attempts.lock().unwrap().push(event.clone());

        let id = event.id.as_str().unwrap_or_default();
        if self.reject_all.load(Ordering::SeqCst) || self.reject_ids.lock().unwrap().contains(id) {
            Err(ForwardError::Rejected { status: 500 })
        } else {
            Ok(())
        }
    }
}

/// Forwarder that parks every call until released
#[derive(Default)]
pub struct BlockingForwarder {
    pub entered: Notify,
    pub release: Notify,
    completed: AtomicU32,
}

impl BlockingForwarder {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn completed(&self) -> u32 {
        self.completed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Forwarder for BlockingForwarder {
    async fn forward(&self, _event: &EnrichedEvent) -> std::result::Result<(), ForwardError> {
        self.entered.notify_one();
        self.release.notified().await;
        self.completed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Poll `condition` until it holds or `timeout` passes.
pub async fn wait_until<F>(timeout: Duration, mut condition: F) -> bool
where
    F: FnMut() -> bool,
{
    let deadline = tokio::time::Instant::now() + timeout;
    while tokio::time::Instant::now() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    condition()
}

/// Await `future` with a generous upper bound so a hung test fails instead.
pub async fn bounded<T>(future: impl Future<Output = T>) -> T {
    tokio::time::timeout(Duration::from_secs(5), future)
        .await
        .expect("operation timed out")
}
