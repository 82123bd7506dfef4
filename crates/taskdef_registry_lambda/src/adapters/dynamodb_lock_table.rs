//! DynamoDB-backed lock table.
//!
//! ```text
//! Primary key:
//!   - Name_Version (String, partition key): "{deployer}:{version}"
//!
//! Attributes:
//!   - Lock_Status: String ("LOCKED" | "REGISTERED")
//!   - TaskDefinitionArn: String, present once REGISTERED
//! ```

use std::collections::HashMap;

use async_trait::async_trait;
use aws_sdk_dynamodb::error::{DisplayErrorContext, SdkError};
use aws_sdk_dynamodb::operation::put_item::PutItemError;
use aws_sdk_dynamodb::operation::update_item::UpdateItemError;
use aws_sdk_dynamodb::types::AttributeValue;
use aws_sdk_dynamodb::Client;
use taskdef_registry_core::lock::{
    CreateOutcome, LockRecord, LockStatus, LockTable, LockTableError,
};

pub const ATTR_NAME_VERSION: &str = "Name_Version";
pub const ATTR_LOCK_STATUS: &str = "Lock_Status";
pub const ATTR_TASK_DEFINITION_ARN: &str = "TaskDefinitionArn";

#[derive(Clone)]
pub struct DynamoDbLockTable {
    client: Client,
    table_name: String,
}

impl std::fmt::Debug for DynamoDbLockTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DynamoDbLockTable")
            .field("table_name", &self.table_name)
            .finish()
    }
}

impl DynamoDbLockTable {
    pub fn new(client: Client, table_name: impl Into<String>) -> Self {
        Self {
            client,
            table_name: table_name.into(),
        }
    }

    pub fn table_name(&self) -> &str {
        &self.table_name
    }
}

/// Converts a stored item into a lock record.
pub fn item_to_record(
    key: &str,
    item: &HashMap<String, AttributeValue>,
) -> Result<LockRecord, LockTableError> {
    let status = item
        .get(ATTR_LOCK_STATUS)
        .and_then(|value| value.as_s().ok())
        .ok_or_else(|| LockTableError::CorruptRecord {
            key: key.to_string(),
            reason: format!("missing string attribute {ATTR_LOCK_STATUS}"),
        })?;
    let artifact_reference = item
        .get(ATTR_TASK_DEFINITION_ARN)
        .and_then(|value| value.as_s().ok())
        .cloned();

    LockRecord::from_parts(key, status, artifact_reference)
}

fn backend_error<E>(operation: &str, error: SdkError<E>) -> LockTableError
where
    E: std::error::Error + 'static,
{
    LockTableError::Backend(format!(
        "DynamoDB {operation} failed: {}",
        DisplayErrorContext(&error)
    ))
}

fn is_put_conditional_check_failed(error: &SdkError<PutItemError>) -> bool {
    match error {
        SdkError::ServiceError(service_error) => matches!(
            service_error.err(),
            PutItemError::ConditionalCheckFailedException(_)
        ),
        _ => false,
    }
}

fn is_update_conditional_check_failed(error: &SdkError<UpdateItemError>) -> bool {
    match error {
        SdkError::ServiceError(service_error) => matches!(
            service_error.err(),
            UpdateItemError::ConditionalCheckFailedException(_)
        ),
        _ => false,
    }
}

#[async_trait]
impl LockTable for DynamoDbLockTable {
    async fn read(&self, key: &str) -> Result<Option<LockRecord>, LockTableError> {
        let response = self
            .client
            .get_item()
            .table_name(&self.table_name)
            .key(ATTR_NAME_VERSION, AttributeValue::S(key.to_string()))
            .consistent_read(true)
            .send()
            .await
            .map_err(|error| backend_error("GetItem", error))?;

        response
            .item()
            .map(|item| item_to_record(key, item))
            .transpose()
    }

    async fn create_if_absent(&self, key: &str) -> Result<CreateOutcome, LockTableError> {
        let result = self
            .client
            .put_item()
            .table_name(&self.table_name)
            .item(ATTR_NAME_VERSION, AttributeValue::S(key.to_string()))
            .item(
                ATTR_LOCK_STATUS,
                AttributeValue::S(LockStatus::Locked.as_str().to_string()),
            )
            .condition_expression("attribute_not_exists(#pk)")
            .expression_attribute_names("#pk", ATTR_NAME_VERSION)
            .send()
            .await;

        match result {
            Ok(_) => Ok(CreateOutcome::Created),
            Err(error) if is_put_conditional_check_failed(&error) => {
                Ok(CreateOutcome::AlreadyExists)
            }
            Err(error) => Err(backend_error("PutItem", error)),
        }
    }

    async fn mark_registered(
        &self,
        key: &str,
        artifact_reference: &str,
    ) -> Result<(), LockTableError> {
        let result = self
            .client
            .update_item()
            .table_name(&self.table_name)
            .key(ATTR_NAME_VERSION, AttributeValue::S(key.to_string()))
            .update_expression("SET #arn = :arn, #status = :registered")
            .condition_expression("attribute_exists(#pk) AND #status = :locked")
            .expression_attribute_names("#pk", ATTR_NAME_VERSION)
            .expression_attribute_names("#arn", ATTR_TASK_DEFINITION_ARN)
            .expression_attribute_names("#status", ATTR_LOCK_STATUS)
            .expression_attribute_values(":arn", AttributeValue::S(artifact_reference.to_string()))
            .expression_attribute_values(
                ":registered",
                AttributeValue::S(LockStatus::Registered.as_str().to_string()),
            )
            .expression_attribute_values(
                ":locked",
                AttributeValue::S(LockStatus::Locked.as_str().to_string()),
            )
            .send()
            .await;

        match result {
            Ok(_) => Ok(()),
            Err(error) if is_update_conditional_check_failed(&error) => {
                Err(LockTableError::InvalidTransition {
                    key: key.to_string(),
                    reason: "record is missing or no longer LOCKED".to_string(),
                })
            }
            Err(error) => Err(backend_error("UpdateItem", error)),
        }
    }
}

#[cfg(test)]
mod tests {
    use aws_sdk_dynamodb::operation::get_item::GetItemOutput;
    use aws_sdk_dynamodb::operation::put_item::PutItemOutput;
    use aws_sdk_dynamodb::operation::update_item::UpdateItemOutput;
    use aws_sdk_dynamodb::types::error::{
        ConditionalCheckFailedException, ResourceNotFoundException,
    };
    use aws_smithy_mocks::{mock, mock_client};
    use taskdef_registry_core::lock::LockState;

    use super::*;

    const TABLE: &str = "deployer-task-definitions";

    fn conditional_check_failed() -> ConditionalCheckFailedException {
        ConditionalCheckFailedException::builder()
            .message("The conditional request failed")
            .build()
    }

    fn item(pairs: &[(&str, AttributeValue)]) -> HashMap<String, AttributeValue> {
        pairs
            .iter()
            .map(|(name, value)| (name.to_string(), value.clone()))
            .collect()
    }

    #[test]
    fn converts_registered_item() {
        let stored = item(&[
            (
                ATTR_NAME_VERSION,
                AttributeValue::S("test_deployer:1.0.0".to_string()),
            ),
            (ATTR_LOCK_STATUS, AttributeValue::S("REGISTERED".to_string())),
            (
                ATTR_TASK_DEFINITION_ARN,
                AttributeValue::S("arn-test_deployer-1.0.0".to_string()),
            ),
        ]);

        let record = item_to_record("test_deployer:1.0.0", &stored).expect("item should convert");
        assert_eq!(
            record,
            LockRecord::registered("test_deployer:1.0.0", "arn-test_deployer-1.0.0")
        );
    }

    #[test]
    fn converts_locked_item() {
        let stored = item(&[(ATTR_LOCK_STATUS, AttributeValue::S("LOCKED".to_string()))]);

        let record = item_to_record("test_deployer:1.0.1", &stored).expect("item should convert");
        assert_eq!(record.state, LockState::Locked);
    }

    #[test]
    fn rejects_item_without_status() {
        let stored = item(&[(
            ATTR_TASK_DEFINITION_ARN,
            AttributeValue::S("arn".to_string()),
        )]);

        let error = item_to_record("a:1", &stored).expect_err("item should fail");
        assert_eq!(
            error,
            LockTableError::CorruptRecord {
                key: "a:1".to_string(),
                reason: "missing string attribute Lock_Status".to_string(),
            }
        );
    }

    #[test]
    fn rejects_registered_item_with_non_string_arn() {
        let stored = item(&[
            (ATTR_LOCK_STATUS, AttributeValue::S("REGISTERED".to_string())),
            (ATTR_TASK_DEFINITION_ARN, AttributeValue::N("7".to_string())),
        ]);

        let error = item_to_record("a:1", &stored).expect_err("item should fail");
        assert!(matches!(error, LockTableError::CorruptRecord { .. }));
    }

    #[tokio::test]
    async fn read_uses_consistent_get_and_converts_item() {
        let get = mock!(Client::get_item)
            .match_requests(|input| {
                input.table_name() == Some(TABLE)
                    && input.consistent_read() == Some(true)
                    && input.key().and_then(|key| key.get(ATTR_NAME_VERSION))
                        == Some(&AttributeValue::S("test_deployer:1.0.0".to_string()))
            })
            .then_output(|| {
                GetItemOutput::builder()
                    .item(
                        ATTR_NAME_VERSION,
                        AttributeValue::S("test_deployer:1.0.0".to_string()),
                    )
                    .item(ATTR_LOCK_STATUS, AttributeValue::S("REGISTERED".to_string()))
                    .item(
                        ATTR_TASK_DEFINITION_ARN,
                        AttributeValue::S("arn-test_deployer-1.0.0".to_string()),
                    )
                    .build()
            });
        let table = DynamoDbLockTable::new(mock_client!(aws_sdk_dynamodb, [&get]), TABLE);

        let record = table
            .read("test_deployer:1.0.0")
            .await
            .expect("read should succeed");

        assert_eq!(
            record,
            Some(LockRecord::registered(
                "test_deployer:1.0.0",
                "arn-test_deployer-1.0.0"
            ))
        );
        assert_eq!(get.num_calls(), 1);
    }

    #[tokio::test]
    async fn read_of_missing_item_is_none() {
        let get = mock!(Client::get_item).then_output(|| GetItemOutput::builder().build());
        let table = DynamoDbLockTable::new(mock_client!(aws_sdk_dynamodb, [&get]), TABLE);

        let record = table.read("a:1").await.expect("read should succeed");

        assert_eq!(record, None);
    }

    #[tokio::test]
    async fn create_writes_locked_row_with_absence_condition() {
        let put = mock!(Client::put_item)
            .match_requests(|input| {
                input.condition_expression() == Some("attribute_not_exists(#pk)")
                    && input.item().and_then(|item| item.get(ATTR_LOCK_STATUS))
                        == Some(&AttributeValue::S("LOCKED".to_string()))
            })
            .then_output(|| PutItemOutput::builder().build());
        let table = DynamoDbLockTable::new(mock_client!(aws_sdk_dynamodb, [&put]), TABLE);

        let outcome = table
            .create_if_absent("test_deployer:1.0.1")
            .await
            .expect("create should succeed");

        assert_eq!(outcome, CreateOutcome::Created);
        assert_eq!(put.num_calls(), 1);
    }

    #[tokio::test]
    async fn failed_create_condition_means_already_exists() {
        let put = mock!(Client::put_item)
            .then_error(|| PutItemError::ConditionalCheckFailedException(conditional_check_failed()));
        let table = DynamoDbLockTable::new(mock_client!(aws_sdk_dynamodb, [&put]), TABLE);

        let outcome = table
            .create_if_absent("test_deployer:1.0.1")
            .await
            .expect("lost race is not an error");

        assert_eq!(outcome, CreateOutcome::AlreadyExists);
    }

    #[tokio::test]
    async fn other_create_failures_are_backend_errors() {
        let put = mock!(Client::put_item).then_error(|| {
            PutItemError::ResourceNotFoundException(
                ResourceNotFoundException::builder()
                    .message("Requested resource not found")
                    .build(),
            )
        });
        let table = DynamoDbLockTable::new(mock_client!(aws_sdk_dynamodb, [&put]), TABLE);

        let error = table
            .create_if_absent("a:1")
            .await
            .expect_err("missing table should fail");

        match error {
            LockTableError::Backend(message) => assert!(message.contains("PutItem")),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn mark_registered_sets_arn_only_on_locked_rows() {
        let update = mock!(Client::update_item)
            .match_requests(|input| {
                input.update_expression() == Some("SET #arn = :arn, #status = :registered")
                    && input.condition_expression()
                        == Some("attribute_exists(#pk) AND #status = :locked")
                    && input
                        .expression_attribute_values()
                        .and_then(|values| values.get(":arn"))
                        == Some(&AttributeValue::S("arn-a-1".to_string()))
            })
            .then_output(|| UpdateItemOutput::builder().build());
        let table = DynamoDbLockTable::new(mock_client!(aws_sdk_dynamodb, [&update]), TABLE);

        table
            .mark_registered("a:1", "arn-a-1")
            .await
            .expect("update should succeed");

        assert_eq!(update.num_calls(), 1);
    }

    #[tokio::test]
    async fn failed_update_condition_is_an_invalid_transition() {
        let update = mock!(Client::update_item).then_error(|| {
            UpdateItemError::ConditionalCheckFailedException(conditional_check_failed())
        });
        let table = DynamoDbLockTable::new(mock_client!(aws_sdk_dynamodb, [&update]), TABLE);

        let error = table
            .mark_registered("a:1", "arn-a-1")
            .await
            .expect_err("row is not LOCKED");

        assert_eq!(
            error,
            LockTableError::InvalidTransition {
                key: "a:1".to_string(),
                reason: "record is missing or no longer LOCKED".to_string(),
            }
        );
    }
}
