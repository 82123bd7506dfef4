pub const BASE_DEPLOYER: &str = "base_deployer";
pub const BASE_DEPLOYER_REPOSITORY: &str = "baseline_base_deployer";
pub const DEFAULT_TASK_FAMILY_SUFFIX: &str = "_baseline";
pub const DEFAULT_SIDECAR_IMAGE_MARKERS: &[&str] = &["falcon"];

/// Lock table key for one deployer version.
pub fn lock_key(name: &str, version: &str) -> String {
    format!("{name}:{version}")
}

pub fn task_family(name: &str, suffix: &str) -> String {
    format!("{name}{suffix}")
}

/// Registry repository holding a deployer's images.
pub fn image_repository(name: &str) -> &str {
    if name == BASE_DEPLOYER {
        BASE_DEPLOYER_REPOSITORY
    } else {
        name
    }
}

pub fn deployer_image(ecr_repository: &str, name: &str, version: &str) -> String {
    format!(
        "{}/{}:{version}",
        ecr_repository.trim_end_matches('/'),
        image_repository(name)
    )
}

/// Decides which container images of a task definition template are
/// re-pointed at a new deployer version.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerImagePolicy {
    ecr_repository: String,
    sidecar_markers: Vec<String>,
}

impl ContainerImagePolicy {
    pub fn new(ecr_repository: impl Into<String>, sidecar_markers: Vec<String>) -> Self {
        Self {
            ecr_repository: ecr_repository.into(),
            sidecar_markers,
        }
    }

    pub fn with_default_sidecars(ecr_repository: impl Into<String>) -> Self {
        Self::new(
            ecr_repository,
            DEFAULT_SIDECAR_IMAGE_MARKERS
                .iter()
                .map(|marker| marker.to_string())
                .collect(),
        )
    }

    pub fn ecr_repository(&self) -> &str {
        &self.ecr_repository
    }

    pub fn is_sidecar(&self, image: &str) -> bool {
        self.sidecar_markers
            .iter()
            .any(|marker| !marker.is_empty() && image.contains(marker.as_str()))
    }

    /// Returns the image a container should run, or `None` when the current
    /// image belongs to a sidecar and must be kept.
    pub fn replacement_for(
        &self,
        current_image: Option<&str>,
        name: &str,
        version: &str,
    ) -> Option<String> {
        if current_image.is_some_and(|image| self.is_sidecar(image)) {
            return None;
        }
        Some(deployer_image(&self.ecr_repository, name, version))
    }
}
