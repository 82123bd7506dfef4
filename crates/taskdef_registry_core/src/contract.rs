use std::collections::BTreeMap;

use serde_json::{Map, Value};

/// Keys of a BOM containing this marker name a deployer and carry its version.
pub const DEPLOYER_KEY_MARKER: &str = "deployer";

pub const INPUT_FIELD: &str = "input";

/// Deployer name to version string, or to a resolved task definition ARN once
/// the coordinator has run.
pub type DeployerVersions = BTreeMap<String, String>;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct ValidationError {
    message: String,
}

impl ValidationError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

/// A bill of materials as received by the task definition creator.
///
/// The full document is retained so keys that do not name a deployer pass
/// through to the response untouched.
#[derive(Debug, Clone, PartialEq)]
pub struct BillOfMaterials {
    document: Map<String, Value>,
    deployers: DeployerVersions,
}

impl BillOfMaterials {
    pub fn document(&self) -> &Map<String, Value> {
        &self.document
    }

    pub fn deployers(&self) -> &DeployerVersions {
        &self.deployers
    }

    /// Replaces each resolved deployer's version with its artifact reference.
    pub fn into_resolved(mut self, resolved: DeployerVersions) -> Map<String, Value> {
        for (name, reference) in resolved {
            self.document.insert(name, Value::String(reference));
        }
        self.document
    }
}

pub fn is_deployer_key(key: &str) -> bool {
    key.contains(DEPLOYER_KEY_MARKER)
}

pub fn parse_bom_event(event: Value) -> Result<BillOfMaterials, ValidationError> {
    let Value::Object(mut object) = event else {
        return Err(ValidationError::new("Event payload must be a JSON object"));
    };

    let Some(input) = object.remove(INPUT_FIELD) else {
        return Err(ValidationError::new("Event payload is missing 'input'"));
    };

    let Value::Object(document) = input else {
        return Err(ValidationError::new("'input' must be a JSON object"));
    };

    let mut deployers = DeployerVersions::new();
    for (name, value) in &document {
        if !is_deployer_key(name) {
            continue;
        }
        let Some(version) = value.as_str() else {
            return Err(ValidationError::new(format!(
                "Deployer '{name}' version must be a string"
            )));
        };
        if version.trim().is_empty() {
            return Err(ValidationError::new(format!(
                "Deployer '{name}' version cannot be empty"
            )));
        }
        deployers.insert(name.clone(), version.to_string());
    }

    Ok(BillOfMaterials {
        document,
        deployers,
    })
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn parse_bom_event_selects_deployer_keys_only() {
        let bom = parse_bom_event(json!({
            "input": {
                "base_deployer": "2.1.0",
                "network_deployer": "1.0.0",
                "account_id": "123456789012",
                "region": "us-east-2"
            }
        }))
        .expect("event should parse");

        assert_eq!(
            bom.deployers(),
            &BTreeMap::from([
                ("base_deployer".to_string(), "2.1.0".to_string()),
                ("network_deployer".to_string(), "1.0.0".to_string()),
            ])
        );
        assert_eq!(bom.document().len(), 4);
    }

    #[test]
    fn parse_bom_event_rejects_missing_input() {
        let error = parse_bom_event(json!({"bom": {}})).expect_err("event should fail");
        assert_eq!(error.message(), "Event payload is missing 'input'");
    }

    #[test]
    fn parse_bom_event_rejects_non_object_input() {
        let error = parse_bom_event(json!({"input": ["base_deployer"]}))
            .expect_err("event should fail");
        assert_eq!(error.message(), "'input' must be a JSON object");
    }

    #[test]
    fn parse_bom_event_rejects_non_string_version() {
        let error = parse_bom_event(json!({"input": {"cicd_deployer": 3}}))
            .expect_err("event should fail");
        assert_eq!(error.message(), "Deployer 'cicd_deployer' version must be a string");
    }

    #[test]
    fn parse_bom_event_rejects_blank_version() {
        let error = parse_bom_event(json!({"input": {"cicd_deployer": "  "}}))
            .expect_err("event should fail");
        assert_eq!(error.message(), "Deployer 'cicd_deployer' version cannot be empty");
    }

    #[test]
    fn non_deployer_values_are_not_validated() {
        let bom = parse_bom_event(json!({"input": {"tags": {"team": "platform"}}}))
            .expect("event should parse");
        assert!(bom.deployers().is_empty());
    }

    #[test]
    fn into_resolved_keeps_passthrough_keys() {
        let bom = parse_bom_event(json!({
            "input": {"logging_deployer": "1.4.0", "environment": "prod"}
        }))
        .expect("event should parse");

        let resolved = bom.into_resolved(BTreeMap::from([(
            "logging_deployer".to_string(),
            "arn:aws:ecs:us-east-2:123456789012:task-definition/logging_deployer_baseline:7"
                .to_string(),
        )]));

        assert_eq!(
            Value::Object(resolved),
            json!({
                "logging_deployer": "arn:aws:ecs:us-east-2:123456789012:task-definition/logging_deployer_baseline:7",
                "environment": "prod"
            })
        );
    }
}
