//! Lock-based memoization of task definition registrations.
//!
//! Every `(name, version)` pair maps to one lock record. The invocation that
//! creates the record registers the task definition and publishes its ARN;
//! every other invocation reads the ARN, waiting a bounded amount of time if
//! the owner is still registering.

use std::time::Duration;

use tracing::{error, info};

use crate::contract::DeployerVersions;
use crate::lock::{CreateOutcome, LockTable, LockTableError};
use crate::naming::lock_key;
use crate::registrar::{RegistrationError, ResourceRegistrar};
use crate::sleep::{Sleeper, TokioSleeper};

pub const DEFAULT_LOCK_BACKOFF: Duration = Duration::from_secs(10);
pub const DEFAULT_LOCK_WAIT_RETRIES: u32 = 1;

const COMPONENT: &str = "coordinator";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CoordinatorConfig {
    /// Sleep between polls of a record another invocation holds.
    pub lock_backoff: Duration,
    /// Number of sleep-then-poll rounds before giving up on a held lock.
    pub lock_wait_retries: u32,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            lock_backoff: DEFAULT_LOCK_BACKOFF,
            lock_wait_retries: DEFAULT_LOCK_WAIT_RETRIES,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CoordinatorError {
    #[error("deployer version {key} remained LOCKED after waiting {waited:?}")]
    LockTimeout { key: String, waited: Duration },
    #[error("failed to register task definition for {key}: {source}")]
    Registration {
        key: String,
        #[source]
        source: RegistrationError,
    },
    #[error("lock table failure for {key}: {source}")]
    LockTable {
        key: String,
        #[source]
        source: LockTableError,
    },
}

impl CoordinatorError {
    pub fn key(&self) -> &str {
        match self {
            Self::LockTimeout { key, .. }
            | Self::Registration { key, .. }
            | Self::LockTable { key, .. } => key,
        }
    }
}

pub struct Coordinator<T, R, S = TokioSleeper> {
    table: T,
    registrar: R,
    sleeper: S,
    config: CoordinatorConfig,
}

impl<T, R> Coordinator<T, R, TokioSleeper>
where
    T: LockTable,
    R: ResourceRegistrar,
{
    pub fn new(table: T, registrar: R, config: CoordinatorConfig) -> Self {
        Self::with_sleeper(table, registrar, TokioSleeper, config)
    }
}

impl<T, R, S> Coordinator<T, R, S>
where
    T: LockTable,
    R: ResourceRegistrar,
    S: Sleeper,
{
    pub fn with_sleeper(table: T, registrar: R, sleeper: S, config: CoordinatorConfig) -> Self {
        Self {
            table,
            registrar,
            sleeper,
            config,
        }
    }

    pub fn config(&self) -> &CoordinatorConfig {
        &self.config
    }

    /// Resolves every pair of `batch` in order. The first failing pair fails
    /// the whole batch.
    pub async fn resolve_batch(
        &self,
        batch: &DeployerVersions,
    ) -> Result<DeployerVersions, CoordinatorError> {
        let mut resolved = DeployerVersions::new();
        for (name, version) in batch {
            let reference = self.resolve(name, version).await?;
            resolved.insert(name.clone(), reference);
        }
        Ok(resolved)
    }

    pub async fn resolve(&self, name: &str, version: &str) -> Result<String, CoordinatorError> {
        let key = lock_key(name, version);

        if let Some(reference) = self.registered_reference(&key).await? {
            info!(
                component = COMPONENT,
                event = "lock_cache_hit",
                %key,
                artifact_reference = %reference,
                "task definition found"
            );
            return Ok(reference);
        }

        let outcome = self
            .table
            .create_if_absent(&key)
            .await
            .map_err(|source| lock_table_error(&key, source))?;

        match outcome {
            CreateOutcome::Created => self.register_as_owner(name, version, &key).await,
            CreateOutcome::AlreadyExists => self.wait_for_owner(&key).await,
        }
    }

    async fn register_as_owner(
        &self,
        name: &str,
        version: &str,
        key: &str,
    ) -> Result<String, CoordinatorError> {
        info!(
            component = COMPONENT,
            event = "lock_acquired",
            %key,
            "creating new task definition"
        );

        let reference = match self.registrar.register(name, version).await {
            Ok(reference) => reference,
            Err(source) => {
                error!(
                    component = COMPONENT,
                    event = "registration_failed",
                    %key,
                    error = %source,
                    "lock left in LOCKED state"
                );
                return Err(CoordinatorError::Registration {
                    key: key.to_string(),
                    source,
                });
            }
        };

        self.table
            .mark_registered(key, &reference)
            .await
            .map_err(|source| lock_table_error(key, source))?;

        info!(
            component = COMPONENT,
            event = "task_definition_registered",
            %key,
            artifact_reference = %reference,
            "task definition created"
        );
        Ok(reference)
    }

    async fn wait_for_owner(&self, key: &str) -> Result<String, CoordinatorError> {
        info!(
            component = COMPONENT,
            event = "lock_contended",
            %key,
            "another invocation holds the lock"
        );

        if let Some(reference) = self.registered_reference(key).await? {
            self.log_wait_resolved(key, &reference);
            return Ok(reference);
        }

        let mut waited = Duration::ZERO;
        for attempt in 1..=self.config.lock_wait_retries {
            info!(
                component = COMPONENT,
                event = "lock_wait_backoff",
                %key,
                attempt,
                backoff_ms = millis(self.config.lock_backoff),
                "waiting for lock owner to register"
            );
            self.sleeper.sleep(self.config.lock_backoff).await;
            waited = waited.saturating_add(self.config.lock_backoff);

            if let Some(reference) = self.registered_reference(key).await? {
                self.log_wait_resolved(key, &reference);
                return Ok(reference);
            }
        }

        error!(
            component = COMPONENT,
            event = "lock_timeout",
            %key,
            waited_ms = millis(waited),
            "deployer version still LOCKED"
        );
        Err(CoordinatorError::LockTimeout {
            key: key.to_string(),
            waited,
        })
    }

    /// Reference of a `REGISTERED` record; `None` when the record is missing
    /// or still `LOCKED`.
    async fn registered_reference(&self, key: &str) -> Result<Option<String>, CoordinatorError> {
        let record = self
            .table
            .read(key)
            .await
            .map_err(|source| lock_table_error(key, source))?;
        Ok(record.and_then(|record| record.artifact_reference().map(str::to_string)))
    }

    fn log_wait_resolved(&self, key: &str, reference: &str) {
        info!(
            component = COMPONENT,
            event = "lock_wait_resolved",
            %key,
            artifact_reference = %reference,
            "task definition registered by lock owner"
        );
    }
}

fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

fn lock_table_error(key: &str, source: LockTableError) -> CoordinatorError {
    CoordinatorError::LockTable {
        key: key.to_string(),
        source,
    }
}
