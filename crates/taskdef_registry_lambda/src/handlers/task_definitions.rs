use serde_json::Value;
use taskdef_registry_core::contract::{parse_bom_event, ValidationError};
use taskdef_registry_core::coordinator::{Coordinator, CoordinatorError};
use taskdef_registry_core::lock::LockTable;
use taskdef_registry_core::registrar::ResourceRegistrar;
use taskdef_registry_core::sleep::Sleeper;
use tracing::{error, info};

const COMPONENT: &str = "task_definitions_handler";

#[derive(Debug, thiserror::Error)]
pub enum HandlerError {
    #[error("invalid task definition request: {0}")]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Coordinator(#[from] CoordinatorError),
}

/// Replaces every deployer version in the event's BOM with a task definition
/// ARN running that version.
pub async fn handle_task_definition_event<T, R, S>(
    event: Value,
    coordinator: &Coordinator<T, R, S>,
) -> Result<Value, HandlerError>
where
    T: LockTable,
    R: ResourceRegistrar,
    S: Sleeper,
{
    let bom = match parse_bom_event(event) {
        Ok(bom) => bom,
        Err(validation) => {
            error!(
                component = COMPONENT,
                event = "bom_rejected",
                error = %validation,
                "invalid BOM event"
            );
            return Err(validation.into());
        }
    };

    info!(
        component = COMPONENT,
        event = "bom_received",
        deployers = ?bom.deployers(),
        "resolving deployer task definitions"
    );

    let resolved = coordinator.resolve_batch(bom.deployers()).await?;
    let response = Value::Object(bom.into_resolved(resolved));

    info!(
        component = COMPONENT,
        event = "bom_resolved",
        bom = %response,
        "converted deployer versions to task definition ARNs"
    );
    Ok(response)
}
