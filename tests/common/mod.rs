//! Shared test doubles for delivery tests.

#![allow(dead_code)]

use async_trait::async_trait;
use bytes::Bytes;
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::time::Instant;

use result_courier::{
    codec, CourierConfig, DeliveryEvent, DeliveryOutcome, ResultTransport, RetryPolicy, TaskId,
    TaskResult,
};

/// Transport that replays scripted outcomes per task id.
///
/// Ids without a script (or whose script ran out) get `fallback`.
pub struct StubTransport {
    scripts: Mutex<HashMap<TaskId, VecDeque<DeliveryOutcome>>>,
    fallback: DeliveryOutcome,
    latency: Option<Duration>,
    calls: Mutex<Vec<(TaskId, Instant)>>,
}

impl StubTransport {
    pub fn new(fallback: DeliveryOutcome) -> Self {
        Self {
            scripts: Mutex::new(HashMap::new()),
            fallback,
            latency: None,
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn script(self, id: TaskId, outcomes: impl IntoIterator<Item = DeliveryOutcome>) -> Self {
        self.scripts
            .lock()
            .unwrap()
            .insert(id, outcomes.into_iter().collect());
        self
    }

    /// Every submit takes `latency` before answering.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    pub fn calls_for(&self, id: TaskId) -> usize {
        self.calls.lock().unwrap().iter().filter(|(c, _)| *c == id).count()
    }

    pub fn total_calls(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    pub fn call_times(&self, id: TaskId) -> Vec<Instant> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|(c, _)| *c == id)
            .map(|(_, at)| *at)
            .collect()
    }
}

#[async_trait]
impl ResultTransport for StubTransport {
    async fn submit(&self, body: Bytes) -> DeliveryOutcome {
        let result = codec::decode(&body).expect("courier sent an undecodable body");
        self.calls
            .lock()
            .unwrap()
            .push((result.id(), Instant::now()));
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
        let scripted = self
            .scripts
            .lock()
            .unwrap()
            .get_mut(&result.id())
            .and_then(VecDeque::pop_front);
        scripted.unwrap_or_else(|| self.fallback.clone())
    }
}

/// Listening post stand-in that stores results keyed by task id, so
/// repeated submissions of one id have a single effect.
#[derive(Default)]
pub struct DedupServer {
    stored: Mutex<HashMap<TaskId, TaskResult>>,
    requests: Mutex<usize>,
}

impl DedupServer {
    pub fn stored(&self) -> HashMap<TaskId, TaskResult> {
        self.stored.lock().unwrap().clone()
    }

    pub fn requests(&self) -> usize {
        *self.requests.lock().unwrap()
    }
}

#[async_trait]
impl ResultTransport for DedupServer {
    async fn submit(&self, body: Bytes) -> DeliveryOutcome {
        *self.requests.lock().unwrap() += 1;
        match codec::decode_batch(&body) {
            Ok(results) => {
                let mut stored = self.stored.lock().unwrap();
                for result in results {
                    stored.insert(result.id(), result);
                }
                DeliveryOutcome::Acknowledged
            }
            Err(err) => DeliveryOutcome::Rejected(err.to_string()),
        }
    }
}

/// Deterministic policy: no jitter, 500ms doubling backoff.
pub fn policy(max_attempts: u32) -> RetryPolicy {
    RetryPolicy::default()
        .with_max_attempts(max_attempts)
        .with_backoff(Duration::from_millis(500), Duration::from_secs(30))
        .with_multiplier(2.0)
        .with_jitter(0.0)
}

pub fn config(policy: RetryPolicy) -> CourierConfig {
    CourierConfig::default().with_retry(policy)
}

pub fn uuid(n: u8) -> TaskId {
    let mut bytes = [0u8; 16];
    bytes[15] = n;
    bytes[6] = 0x40;
    bytes[8] = 0x80;
    TaskId::from_bytes(bytes)
}

/// Collects every event already sent.
pub fn drain(rx: &mut broadcast::Receiver<DeliveryEvent>) -> Vec<DeliveryEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}
