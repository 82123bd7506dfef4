use std::sync::Arc;

use async_trait::async_trait;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistrationError {
    #[error("no active task definition found for family '{family}'")]
    NoTemplate { family: String },
    #[error("task definition '{arn}' is incomplete: {reason}")]
    IncompleteTemplate { arn: String, reason: String },
    #[error("{0}")]
    Provider(String),
}

/// Materializes a new versioned artifact and returns its stable reference.
#[async_trait]
pub trait ResourceRegistrar: Send + Sync {
    async fn register(&self, name: &str, version: &str) -> Result<String, RegistrationError>;
}

#[async_trait]
impl<R: ResourceRegistrar + ?Sized> ResourceRegistrar for Arc<R> {
    async fn register(&self, name: &str, version: &str) -> Result<String, RegistrationError> {
        (**self).register(name, version).await
    }
}
