//! In-memory fakes for the coordinator seams.
//!
//! These stand in for the DynamoDB lock table, the ECS registrar and the
//! backoff sleep so protocol tests run without AWS and without real delays.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;

use crate::lock::{CreateOutcome, LockRecord, LockState, LockTable, LockTableError};
use crate::registrar::{RegistrationError, ResourceRegistrar};
use crate::sleep::Sleeper;

fn guard<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Lock table backed by a mutex-guarded map, with per-operation call counts.
#[derive(Debug, Default)]
pub struct InMemoryLockTable {
    records: Mutex<BTreeMap<String, LockRecord>>,
    reads: AtomicUsize,
    creates: AtomicUsize,
    updates: AtomicUsize,
}

impl InMemoryLockTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a row as if another invocation had written it earlier.
    pub fn seed(&self, record: LockRecord) {
        guard(&self.records).insert(record.key.clone(), record);
    }

    /// Flips a row to `REGISTERED` outside the protocol, simulating the lock
    /// owner finishing in another process.
    pub fn set_registered(&self, key: &str, artifact_reference: &str) {
        guard(&self.records).insert(
            key.to_string(),
            LockRecord::registered(key, artifact_reference),
        );
    }

    pub fn record(&self, key: &str) -> Option<LockRecord> {
        guard(&self.records).get(key).cloned()
    }

    pub fn len(&self) -> usize {
        guard(&self.records).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn read_calls(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }

    pub fn create_calls(&self) -> usize {
        self.creates.load(Ordering::SeqCst)
    }

    pub fn update_calls(&self) -> usize {
        self.updates.load(Ordering::SeqCst)
    }

    pub fn total_calls(&self) -> usize {
        self.read_calls() + self.create_calls() + self.update_calls()
    }
}

#[async_trait]
impl LockTable for InMemoryLockTable {
    async fn read(&self, key: &str) -> Result<Option<LockRecord>, LockTableError> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        Ok(self.record(key))
    }

    async fn create_if_absent(&self, key: &str) -> Result<CreateOutcome, LockTableError> {
        self.creates.fetch_add(1, Ordering::SeqCst);
        let mut records = guard(&self.records);
        if records.contains_key(key) {
            return Ok(CreateOutcome::AlreadyExists);
        }
        records.insert(key.to_string(), LockRecord::locked(key));
        Ok(CreateOutcome::Created)
    }

    async fn mark_registered(
        &self,
        key: &str,
        artifact_reference: &str,
    ) -> Result<(), LockTableError> {
        self.updates.fetch_add(1, Ordering::SeqCst);
        let mut records = guard(&self.records);
        match records.get(key).map(|record| &record.state) {
            Some(LockState::Locked) => {
                records.insert(
                    key.to_string(),
                    LockRecord::registered(key, artifact_reference),
                );
                Ok(())
            }
            Some(LockState::Registered { .. }) => Err(LockTableError::InvalidTransition {
                key: key.to_string(),
                reason: "record is already REGISTERED".to_string(),
            }),
            None => Err(LockTableError::InvalidTransition {
                key: key.to_string(),
                reason: "record does not exist".to_string(),
            }),
        }
    }
}

/// Registrar that records every call and returns deterministic references.
#[derive(Debug, Default)]
pub struct RecordingRegistrar {
    calls: Mutex<Vec<(String, String)>>,
    failure: Option<String>,
    delay: Option<Duration>,
}

impl RecordingRegistrar {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing(message: impl Into<String>) -> Self {
        Self {
            failure: Some(message.into()),
            ..Self::default()
        }
    }

    /// Holds each registration open for `delay` before answering.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn reference_for(name: &str, version: &str) -> String {
        format!("arn:aws:ecs:us-east-2:123456789012:task-definition/{name}_baseline:{version}")
    }

    pub fn calls(&self) -> Vec<(String, String)> {
        guard(&self.calls).clone()
    }

    pub fn call_count(&self) -> usize {
        guard(&self.calls).len()
    }
}

#[async_trait]
impl ResourceRegistrar for RecordingRegistrar {
    async fn register(&self, name: &str, version: &str) -> Result<String, RegistrationError> {
        guard(&self.calls).push((name.to_string(), version.to_string()));
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        match &self.failure {
            Some(message) => Err(RegistrationError::Provider(message.clone())),
            None => Ok(Self::reference_for(name, version)),
        }
    }
}

type SleepHook = Box<dyn Fn() + Send + Sync>;

/// Sleeper that returns immediately and remembers the requested durations.
#[derive(Default)]
pub struct RecordingSleeper {
    sleeps: Mutex<Vec<Duration>>,
    on_sleep: Option<SleepHook>,
}

impl RecordingSleeper {
    pub fn new() -> Self {
        Self::default()
    }

    /// Runs `hook` on every sleep, e.g. to release a lock mid-backoff.
    pub fn with_hook(hook: impl Fn() + Send + Sync + 'static) -> Self {
        Self {
            sleeps: Mutex::new(Vec::new()),
            on_sleep: Some(Box::new(hook)),
        }
    }

    pub fn sleeps(&self) -> Vec<Duration> {
        guard(&self.sleeps).clone()
    }
}

impl std::fmt::Debug for RecordingSleeper {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecordingSleeper")
            .field("sleeps", &self.sleeps())
            .field("has_hook", &self.on_sleep.is_some())
            .finish()
    }
}

#[async_trait]
impl Sleeper for RecordingSleeper {
    async fn sleep(&self, duration: Duration) {
        guard(&self.sleeps).push(duration);
        if let Some(hook) = &self.on_sleep {
            hook();
        }
    }
}
