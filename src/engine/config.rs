//! Parsed theme declarations with nested lookup.

use std::path::{Path, PathBuf};

use serde_json::{Map, Value};

use super::error::ThemeError;

/// Structured theme data. Lookups return `None` on any missing level.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ThemeConfig {
    root: Value,
}

impl ThemeConfig {
    pub fn new(root: Value) -> Self {
        Self { root }
    }

    pub async fn load(path: &Path) -> Result<Self, ThemeError> {
        let raw = tokio::fs::read(path)
            .await
            .map_err(|source| ThemeError::ConfigRead {
                path: path.to_path_buf(),
                source,
            })?;
        let root = serde_json::from_slice(&raw).map_err(|source| ThemeError::ConfigParse {
            path: PathBuf::from(path),
            source,
        })?;
        Ok(Self { root })
    }

    pub fn get(&self, keys: &[&str]) -> Option<&Value> {
        keys.iter()
            .try_fold(&self.root, |current, key| current.as_object()?.get(*key))
    }

    pub fn get_str(&self, keys: &[&str]) -> Option<&str> {
        self.get(keys).and_then(Value::as_str)
    }

    pub fn get_bool(&self, keys: &[&str]) -> Option<bool> {
        self.get(keys).and_then(Value::as_bool)
    }

    pub fn get_object(&self, keys: &[&str]) -> Option<&Map<String, Value>> {
        self.get(keys).and_then(Value::as_object)
    }
}

/// Declarations of one group, split around a template's own assets.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GroupDecl {
    pub before: Vec<Value>,
    pub after: Vec<Value>,
}

impl GroupDecl {
    /// `{before, after}` objects bracket; any other value is a `before`
    /// list. Single declarations become one-element lists.
    pub fn parse(value: &Value) -> Self {
        match value {
            Value::Null => Self::default(),
            Value::Object(map) if map.contains_key("before") || map.contains_key("after") => Self {
                before: as_list(map.get("before")),
                after: as_list(map.get("after")),
            },
            other => Self {
                before: as_list(Some(other)),
                after: Vec::new(),
            },
        }
    }
}

fn as_list(value: Option<&Value>) -> Vec<Value> {
    match value {
        None | Some(Value::Null) => Vec::new(),
        Some(Value::Array(items)) => items.clone(),
        Some(single) => vec![single.clone()],
    }
}
