//! Scenario files: named variables, keywords, an optional dataset and the
//! root step list, written as JSON or YAML.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

use crate::ast::Step;
use crate::dataset::DatasetSpec;
use crate::keyword::KeywordDefinition;

#[derive(Error, Debug)]
pub enum ScenarioError {
    #[error("failed to read scenario {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid JSON scenario: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid YAML scenario: {0}")]
    Yaml(#[from] serde_yaml_ng::Error),
    #[error("unsupported scenario format: {0}")]
    UnsupportedFormat(String),
    #[error("invalid scenario: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Scenario {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Seeded as globals before the first step; values are resolved in
    /// order, so later entries may refer to earlier ones.
    #[serde(default)]
    pub variables: Map<String, Value>,
    #[serde(default)]
    pub keywords: BTreeMap<String, KeywordDefinition>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<DatasetSpec>,
    #[serde(default)]
    pub continue_on_error: bool,
    pub steps: Vec<Step>,
}

impl Scenario {
    /// Load by extension: `.json`, `.yaml` or `.yml`.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ScenarioError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ScenarioError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let extension = path
            .extension()
            .and_then(|ext| ext.to_str())
            .unwrap_or_default();
        match extension {
            "json" => Self::from_json_str(&content),
            "yaml" | "yml" => Self::from_yaml_str(&content),
            other => Err(ScenarioError::UnsupportedFormat(other.to_string())),
        }
    }

    pub fn from_json_str(content: &str) -> Result<Self, ScenarioError> {
        let scenario: Scenario = serde_json::from_str(content)?;
        scenario.validate()?;
        Ok(scenario)
    }

    pub fn from_yaml_str(content: &str) -> Result<Self, ScenarioError> {
        let scenario: Scenario = serde_yaml_ng::from_str(content)?;
        scenario.validate()?;
        Ok(scenario)
    }

    pub fn validate(&self) -> Result<(), ScenarioError> {
        if self.steps.is_empty() {
            return Err(ScenarioError::Invalid(format!(
                "scenario '{}' has no steps",
                self.name
            )));
        }
        if let Some((name, _)) = self.keywords.iter().find(|(_, k)| k.steps.is_empty()) {
            return Err(ScenarioError::Invalid(format!(
                "keyword '{}' has no steps",
                name
            )));
        }
        Ok(())
    }
}
