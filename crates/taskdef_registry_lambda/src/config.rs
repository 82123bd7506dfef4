use std::time::Duration;

use taskdef_registry_core::coordinator::{
    CoordinatorConfig, DEFAULT_LOCK_BACKOFF, DEFAULT_LOCK_WAIT_RETRIES,
};
use taskdef_registry_core::naming::{
    ContainerImagePolicy, DEFAULT_SIDECAR_IMAGE_MARKERS, DEFAULT_TASK_FAMILY_SUFFIX,
};

pub const DEFAULT_REGION: &str = "us-east-2";

pub const ENV_TABLE_NAME: &str = "DYNAMODB_TABLE_NAME";
pub const ENV_ECR_REPOSITORY: &str = "ECR_REPOSITORY";
pub const ENV_REGION: &str = "REGION";
pub const ENV_LOCK_BACKOFF_SECS: &str = "LOCK_BACKOFF_SECS";
pub const ENV_LOCK_WAIT_RETRIES: &str = "LOCK_WAIT_RETRIES";
pub const ENV_TASK_FAMILY_SUFFIX: &str = "TASK_FAMILY_SUFFIX";
pub const ENV_SIDECAR_IMAGE_MARKERS: &str = "SIDECAR_IMAGE_MARKERS";

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("{0} must be configured")]
    Missing(&'static str),
    #[error("{name} must be {expected}, got '{value}'")]
    Invalid {
        name: &'static str,
        expected: &'static str,
        value: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandlerConfig {
    pub table_name: String,
    pub ecr_repository: String,
    pub region: String,
    pub lock_backoff: Duration,
    pub lock_wait_retries: u32,
    pub task_family_suffix: String,
    pub sidecar_image_markers: Vec<String>,
}

impl HandlerConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let value = |name: &str| {
            lookup(name)
                .map(|raw| raw.trim().to_string())
                .filter(|raw| !raw.is_empty())
        };

        let table_name = value(ENV_TABLE_NAME).ok_or(ConfigError::Missing(ENV_TABLE_NAME))?;
        let ecr_repository =
            value(ENV_ECR_REPOSITORY).ok_or(ConfigError::Missing(ENV_ECR_REPOSITORY))?;
        let region = value(ENV_REGION).unwrap_or_else(|| DEFAULT_REGION.to_string());

        let lock_backoff = match value(ENV_LOCK_BACKOFF_SECS) {
            Some(raw) => Duration::from_secs(raw.parse::<u64>().map_err(|_| {
                ConfigError::Invalid {
                    name: ENV_LOCK_BACKOFF_SECS,
                    expected: "a whole number of seconds",
                    value: raw.clone(),
                }
            })?),
            None => DEFAULT_LOCK_BACKOFF,
        };

        let lock_wait_retries = match value(ENV_LOCK_WAIT_RETRIES) {
            Some(raw) => raw.parse::<u32>().map_err(|_| ConfigError::Invalid {
                name: ENV_LOCK_WAIT_RETRIES,
                expected: "a non-negative integer",
                value: raw.clone(),
            })?,
            None => DEFAULT_LOCK_WAIT_RETRIES,
        };

        let task_family_suffix = lookup(ENV_TASK_FAMILY_SUFFIX)
            .map(|raw| raw.trim().to_string())
            .unwrap_or_else(|| DEFAULT_TASK_FAMILY_SUFFIX.to_string());

        let sidecar_image_markers = match value(ENV_SIDECAR_IMAGE_MARKERS) {
            Some(raw) => raw
                .split(',')
                .map(str::trim)
                .filter(|marker| !marker.is_empty())
                .map(str::to_string)
                .collect(),
            None => DEFAULT_SIDECAR_IMAGE_MARKERS
                .iter()
                .map(|marker| marker.to_string())
                .collect(),
        };

        Ok(Self {
            table_name,
            ecr_repository,
            region,
            lock_backoff,
            lock_wait_retries,
            task_family_suffix,
            sidecar_image_markers,
        })
    }

    pub fn coordinator_config(&self) -> CoordinatorConfig {
        CoordinatorConfig {
            lock_backoff: self.lock_backoff,
            lock_wait_retries: self.lock_wait_retries,
        }
    }

    pub fn image_policy(&self) -> ContainerImagePolicy {
        ContainerImagePolicy::new(
            self.ecr_repository.clone(),
            self.sidecar_image_markers.clone(),
        )
    }
}
