//! Row sources for data-driven runs.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::debug;

#[derive(Error, Debug)]
pub enum DatasetError {
    #[error("failed to read dataset {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid JSON dataset: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid YAML dataset: {0}")]
    Yaml(#[from] serde_yaml_ng::Error),
    #[error("dataset {0} must contain a list of rows")]
    NotAList(String),
}

/// Where the rows of a data-driven run come from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DatasetSpec {
    Inline { rows: Vec<Value> },
    File { path: PathBuf },
}

#[async_trait]
pub trait DatasetSource: Send + Sync {
    async fn load(&self, spec: &DatasetSpec) -> Result<Vec<Value>, DatasetError>;
}

/// Serves inline rows and reads JSON or YAML files, relative paths being
/// taken from `base_dir` when one is set.
#[derive(Debug, Clone, Default)]
pub struct FileDatasetSource {
    base_dir: Option<PathBuf>,
}

impl FileDatasetSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_base_dir(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: Some(base_dir.into()),
        }
    }

    fn locate(&self, path: &Path) -> PathBuf {
        match &self.base_dir {
            Some(base) if path.is_relative() => base.join(path),
            _ => path.to_path_buf(),
        }
    }
}

#[async_trait]
impl DatasetSource for FileDatasetSource {
    async fn load(&self, spec: &DatasetSpec) -> Result<Vec<Value>, DatasetError> {
        let path = match spec {
            DatasetSpec::Inline { rows } => return Ok(rows.clone()),
            DatasetSpec::File { path } => self.locate(path),
        };
        let shown = path.display().to_string();
        let content = tokio::fs::read_to_string(&path)
            .await
            .map_err(|source| DatasetError::Io {
                path: shown.clone(),
                source,
            })?;

        let is_yaml = path
            .extension()
            .is_some_and(|ext| ext == "yaml" || ext == "yml");
        let parsed: Value = if is_yaml {
            serde_yaml_ng::from_str(&content)?
        } else {
            serde_json::from_str(&content)?
        };

        match parsed {
            Value::Array(rows) => {
                debug!(path = %shown, rows = rows.len(), "dataset loaded");
                Ok(rows)
            }
            _ => Err(DatasetError::NotAList(shown)),
        }
    }
}
