use async_trait::async_trait;
use aws_sdk_ecs::error::{DisplayErrorContext, SdkError};
use aws_sdk_ecs::types::{
    ContainerDefinition, SortOrder, TaskDefinitionField, TaskDefinitionStatus,
};
use aws_sdk_ecs::Client;
use taskdef_registry_core::naming::{task_family, ContainerImagePolicy};
use taskdef_registry_core::registrar::{RegistrationError, ResourceRegistrar};
use tracing::info;

const COMPONENT: &str = "ecs_registrar";

/// Registers a new revision of `{deployer}{suffix}` whose deployer containers
/// run the requested version. The latest active revision is the template.
#[derive(Clone)]
pub struct EcsTaskDefinitionRegistrar {
    client: Client,
    task_family_suffix: String,
    image_policy: ContainerImagePolicy,
}

impl std::fmt::Debug for EcsTaskDefinitionRegistrar {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EcsTaskDefinitionRegistrar")
            .field("task_family_suffix", &self.task_family_suffix)
            .field("image_policy", &self.image_policy)
            .finish()
    }
}

impl EcsTaskDefinitionRegistrar {
    pub fn new(
        client: Client,
        task_family_suffix: impl Into<String>,
        image_policy: ContainerImagePolicy,
    ) -> Self {
        Self {
            client,
            task_family_suffix: task_family_suffix.into(),
            image_policy,
        }
    }

    async fn latest_active_revision(&self, family: &str) -> Result<String, RegistrationError> {
        let listed = self
            .client
            .list_task_definitions()
            .family_prefix(family)
            .status(TaskDefinitionStatus::Active)
            .sort(SortOrder::Desc)
            .send()
            .await
            .map_err(|error| provider_error("ListTaskDefinitions", error))?;

        listed
            .task_definition_arns()
            .first()
            .cloned()
            .ok_or_else(|| RegistrationError::NoTemplate {
                family: family.to_string(),
            })
    }
}

/// Points every non-sidecar container at the deployer version.
pub fn retarget_containers(
    containers: &[ContainerDefinition],
    policy: &ContainerImagePolicy,
    name: &str,
    version: &str,
) -> Vec<ContainerDefinition> {
    containers
        .iter()
        .cloned()
        .map(|mut container| {
            if let Some(image) = policy.replacement_for(container.image(), name, version) {
                container.image = Some(image);
            }
            container
        })
        .collect()
}

fn provider_error<E>(operation: &str, error: SdkError<E>) -> RegistrationError
where
    E: std::error::Error + 'static,
{
    RegistrationError::Provider(format!(
        "ECS {operation} failed: {}",
        DisplayErrorContext(&error)
    ))
}

#[async_trait]
impl ResourceRegistrar for EcsTaskDefinitionRegistrar {
    async fn register(&self, name: &str, version: &str) -> Result<String, RegistrationError> {
        let family = task_family(name, &self.task_family_suffix);
        let template_arn = self.latest_active_revision(&family).await?;
        info!(
            component = COMPONENT,
            event = "template_selected",
            %family,
            template_arn = %template_arn,
            "latest task definition revision"
        );

        let described = self
            .client
            .describe_task_definition()
            .task_definition(&template_arn)
            .include(TaskDefinitionField::Tags)
            .send()
            .await
            .map_err(|error| provider_error("DescribeTaskDefinition", error))?;

        let template =
            described
                .task_definition()
                .ok_or_else(|| RegistrationError::IncompleteTemplate {
                    arn: template_arn.clone(),
                    reason: "describe response has no task definition".to_string(),
                })?;

        let containers = retarget_containers(
            template.container_definitions(),
            &self.image_policy,
            name,
            version,
        );
        if containers.is_empty() {
            return Err(RegistrationError::IncompleteTemplate {
                arn: template_arn,
                reason: "template has no container definitions".to_string(),
            });
        }

        let tags = described.tags().to_vec();
        let registered = self
            .client
            .register_task_definition()
            .family(&family)
            .set_container_definitions(Some(containers))
            .set_cpu(template.cpu().map(str::to_string))
            .set_memory(template.memory().map(str::to_string))
            .set_network_mode(template.network_mode().cloned())
            .set_requires_compatibilities(Some(template.requires_compatibilities().to_vec()))
            .set_execution_role_arn(template.execution_role_arn().map(str::to_string))
            .set_task_role_arn(template.task_role_arn().map(str::to_string))
            .set_volumes(Some(template.volumes().to_vec()))
            .set_tags((!tags.is_empty()).then_some(tags))
            .send()
            .await
            .map_err(|error| provider_error("RegisterTaskDefinition", error))?;

        registered
            .task_definition()
            .and_then(|definition| definition.task_definition_arn())
            .map(str::to_string)
            .ok_or_else(|| RegistrationError::IncompleteTemplate {
                arn: template_arn,
                reason: "register response has no task definition ARN".to_string(),
            })
    }
}
