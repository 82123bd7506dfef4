use aws_config::{BehaviorVersion, Region};
use lambda_runtime::{service_fn, Error, LambdaEvent};
use serde_json::Value;
use taskdef_registry_core::coordinator::Coordinator;
use taskdef_registry_lambda::adapters::dynamodb_lock_table::DynamoDbLockTable;
use taskdef_registry_lambda::adapters::ecs_registrar::EcsTaskDefinitionRegistrar;
use taskdef_registry_lambda::config::HandlerConfig;
use taskdef_registry_lambda::handlers::task_definitions::handle_task_definition_event;
use taskdef_registry_lambda::logging::init_logging;

#[tokio::main]
async fn main() -> Result<(), Error> {
    init_logging();

    let config = HandlerConfig::from_env()?;
    let aws_config = aws_config::defaults(BehaviorVersion::latest())
        .region(Region::new(config.region.clone()))
        .load()
        .await;

    let table = DynamoDbLockTable::new(
        aws_sdk_dynamodb::Client::new(&aws_config),
        config.table_name.clone(),
    );
    let registrar = EcsTaskDefinitionRegistrar::new(
        aws_sdk_ecs::Client::new(&aws_config),
        config.task_family_suffix.clone(),
        config.image_policy(),
    );
    let coordinator = Coordinator::new(table, registrar, config.coordinator_config());
    let coordinator = &coordinator;

    lambda_runtime::run(service_fn(move |event: LambdaEvent<Value>| async move {
        handle_task_definition_event(event.payload, coordinator)
            .await
            .map_err(Error::from)
    }))
    .await
}
