use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::ast::Step;
use crate::error::{EvalError, EvalResult};

/// A named, parameterized step list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeywordDefinition {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub params: Vec<String>,
    pub steps: Vec<Step>,
    /// Reference resolved in the keyword's frame after its last step, when
    /// no `return` step ended the call earlier.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub returns: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl KeywordDefinition {
    pub fn new(name: impl Into<String>, params: Vec<String>, steps: Vec<Step>) -> Self {
        Self {
            name: name.into(),
            params,
            steps,
            returns: None,
            description: None,
        }
    }

    pub fn with_returns(mut self, reference: impl Into<String>) -> Self {
        self.returns = Some(reference.into());
        self
    }

    /// Bind call arguments to parameter names.
    ///
    /// Arguments bind left to right. A single object argument instead binds
    /// each parameter from the field of the same name; fields that are not
    /// parameters are ignored. Parameters left unbound are `null`.
    pub fn bind_arguments(&self, args: Vec<Value>) -> Map<String, Value> {
        let mut bindings: Map<String, Value> = self
            .params
            .iter()
            .map(|param| (param.clone(), Value::Null))
            .collect();

        match args.as_slice() {
            [Value::Object(fields)] => {
                for param in &self.params {
                    if let Some(value) = fields.get(param) {
                        bindings.insert(param.clone(), value.clone());
                    }
                }
            }
            _ => {
                for (param, arg) in self.params.iter().zip(args.iter()) {
                    bindings.insert(param.clone(), arg.clone());
                }
            }
        }
        bindings
    }
}

/// Fallback source of keyword definitions, consulted on a registry miss.
#[mockall::automock]
pub trait KeywordLibrary: Send + Sync {
    fn try_resolve(&self, name: &str) -> Option<KeywordDefinition>;
}

/// Registered keywords plus the ordered libraries used to resolve misses.
#[derive(Default)]
pub struct KeywordRegistry {
    definitions: DashMap<String, Arc<KeywordDefinition>>,
    libraries: Vec<Arc<dyn KeywordLibrary>>,
}

impl KeywordRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_libraries(libraries: Vec<Arc<dyn KeywordLibrary>>) -> Self {
        Self {
            definitions: DashMap::new(),
            libraries,
        }
    }

    /// Store `definition` under `name`, replacing any earlier entry.
    pub fn register(&self, name: &str, mut definition: KeywordDefinition) -> EvalResult<()> {
        if definition.steps.is_empty() {
            return Err(EvalError::InvalidKeyword {
                name: name.to_string(),
                reason: "step list is empty".to_string(),
            });
        }
        definition.name = name.to_string();
        if self
            .definitions
            .insert(name.to_string(), Arc::new(definition))
            .is_some()
        {
            warn!(keyword = name, "keyword redefined, replacing previous definition");
        }
        Ok(())
    }

    /// Look up `name`, falling back to the libraries in order. Library hits
    /// are cached.
    pub fn resolve(&self, name: &str) -> Option<Arc<KeywordDefinition>> {
        if let Some(definition) = self.definitions.get(name) {
            return Some(definition.clone());
        }
        for library in &self.libraries {
            let Some(mut definition) = library.try_resolve(name) else {
                continue;
            };
            if definition.steps.is_empty() {
                warn!(keyword = name, "library returned a keyword without steps, skipping");
                continue;
            }
            debug!(keyword = name, "resolved keyword from library");
            definition.name = name.to_string();
            let definition = Arc::new(definition);
            self.definitions.insert(name.to_string(), definition.clone());
            return Some(definition);
        }
        None
    }

    pub fn contains(&self, name: &str) -> bool {
        self.definitions.contains_key(name)
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.definitions.iter().map(|e| e.key().clone()).collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.definitions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.definitions.is_empty()
    }
}

/// In-memory library.
#[derive(Debug, Default, Clone)]
pub struct StaticKeywordLibrary {
    definitions: HashMap<String, KeywordDefinition>,
}

impl StaticKeywordLibrary {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: &str, definition: KeywordDefinition) -> Self {
        self.definitions.insert(name.to_string(), definition);
        self
    }
}

impl KeywordLibrary for StaticKeywordLibrary {
    fn try_resolve(&self, name: &str) -> Option<KeywordDefinition> {
        self.definitions.get(name).cloned()
    }
}

/// Loads `<root>/<name>.yaml`, `.yml` or `.json` on demand.
#[derive(Debug, Clone)]
pub struct DirectoryKeywordLibrary {
    root: PathBuf,
}

impl DirectoryKeywordLibrary {
    const EXTENSIONS: [&'static str; 3] = ["yaml", "yml", "json"];

    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn load(path: &Path) -> Option<KeywordDefinition> {
        let content = match std::fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "failed to read keyword file");
                return None;
            }
        };
        let parsed = if path.extension().is_some_and(|ext| ext == "json") {
            serde_json::from_str(&content).map_err(|e| e.to_string())
        } else {
            serde_yaml_ng::from_str(&content).map_err(|e| e.to_string())
        };
        match parsed {
            Ok(definition) => Some(definition),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "failed to parse keyword file");
                None
            }
        }
    }
}

impl KeywordLibrary for DirectoryKeywordLibrary {
    fn try_resolve(&self, name: &str) -> Option<KeywordDefinition> {
        if name.is_empty() || name.contains(['/', '\\']) || name.contains("..") {
            return None;
        }
        Self::EXTENSIONS
            .iter()
            .map(|ext| self.root.join(format!("{}.{}", name, ext)))
            .find(|path| path.is_file())
            .and_then(|path| Self::load(&path))
    }
}
