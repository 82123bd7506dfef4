//! Lock records and the table seam used to coordinate registrations.

use std::sync::Arc;

use async_trait::async_trait;

pub const STATUS_LOCKED: &str = "LOCKED";
pub const STATUS_REGISTERED: &str = "REGISTERED";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockStatus {
    Locked,
    Registered,
}

impl LockStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Locked => STATUS_LOCKED,
            Self::Registered => STATUS_REGISTERED,
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            STATUS_LOCKED => Some(Self::Locked),
            STATUS_REGISTERED => Some(Self::Registered),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LockState {
    Locked,
    Registered { artifact_reference: String },
}

impl LockState {
    pub fn status(&self) -> LockStatus {
        match self {
            Self::Locked => LockStatus::Locked,
            Self::Registered { .. } => LockStatus::Registered,
        }
    }

    pub fn artifact_reference(&self) -> Option<&str> {
        match self {
            Self::Locked => None,
            Self::Registered { artifact_reference } => Some(artifact_reference),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockRecord {
    pub key: String,
    pub state: LockState,
}

impl LockRecord {
    pub fn locked(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            state: LockState::Locked,
        }
    }

    pub fn registered(key: impl Into<String>, artifact_reference: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            state: LockState::Registered {
                artifact_reference: artifact_reference.into(),
            },
        }
    }

    /// Rebuilds a record from its stored attributes.
    pub fn from_parts(
        key: impl Into<String>,
        status: &str,
        artifact_reference: Option<String>,
    ) -> Result<Self, LockTableError> {
        let key = key.into();
        match (LockStatus::parse(status), artifact_reference) {
            (Some(LockStatus::Locked), _) => Ok(Self::locked(key)),
            (Some(LockStatus::Registered), Some(reference)) if !reference.is_empty() => {
                Ok(Self::registered(key, reference))
            }
            (Some(LockStatus::Registered), _) => Err(LockTableError::CorruptRecord {
                key,
                reason: "REGISTERED record has no artifact reference".to_string(),
            }),
            (None, _) => Err(LockTableError::CorruptRecord {
                key,
                reason: format!("unknown lock status '{status}'"),
            }),
        }
    }

    pub fn artifact_reference(&self) -> Option<&str> {
        self.state.artifact_reference()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CreateOutcome {
    Created,
    AlreadyExists,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LockTableError {
    #[error("lock table request failed: {0}")]
    Backend(String),
    #[error("lock record '{key}' is corrupt: {reason}")]
    CorruptRecord { key: String, reason: String },
    #[error("lock record '{key}' cannot transition to REGISTERED: {reason}")]
    InvalidTransition { key: String, reason: String },
}

/// Atomic primitives over the shared lock table.
///
/// `create_if_absent` reports an existing record as
/// [`CreateOutcome::AlreadyExists`], never as an error. `mark_registered` is
/// only called by the invocation that created the record.
#[async_trait]
pub trait LockTable: Send + Sync {
    async fn read(&self, key: &str) -> Result<Option<LockRecord>, LockTableError>;

    async fn create_if_absent(&self, key: &str) -> Result<CreateOutcome, LockTableError>;

    async fn mark_registered(
        &self,
        key: &str,
        artifact_reference: &str,
    ) -> Result<(), LockTableError>;
}

#[async_trait]
impl<T: LockTable + ?Sized> LockTable for Arc<T> {
    async fn read(&self, key: &str) -> Result<Option<LockRecord>, LockTableError> {
        (**self).read(key).await
    }

    async fn create_if_absent(&self, key: &str) -> Result<CreateOutcome, LockTableError> {
        (**self).create_if_absent(key).await
    }

    async fn mark_registered(
        &self,
        key: &str,
        artifact_reference: &str,
    ) -> Result<(), LockTableError> {
        (**self).mark_registered(key, artifact_reference).await
    }
}
