//! Option structs shared by assets, layouts and themes.

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::error::LayoutError;

pub const DEFAULT_CONFIG_FILE: &str = "theme.json";
pub const DEFAULT_GLOBALS_FILE: &str = "assets/globals.json";
pub const DEFAULT_STATIC_FILES: &str = "./";

/// Per-asset options. Unset flags defer to the group or theme default.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AssetOptions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub minify: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub concat: Option<bool>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl AssetOptions {
    /// Overlay `other` on top of `self`; flags set in `other` win.
    pub fn merge(&mut self, other: &AssetOptions) {
        if other.minify.is_some() {
            self.minify = other.minify;
        }
        if other.concat.is_some() {
            self.concat = other.concat;
        }
        for (key, value) in &other.extra {
            self.extra.insert(key.clone(), value.clone());
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LayoutOptions {
    /// Group-level default for concatenation during precompile.
    pub concat: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThemeOptions {
    /// Theme config file, relative to the theme location.
    pub config_file: PathBuf,
    /// Global asset declarations, relative to the theme location.
    pub globals: PathBuf,
    /// Root for static files, relative to the theme location.
    pub static_files: PathBuf,
    pub minify: bool,
    pub concat: bool,
    /// Install the built-in asset types, strategies and actions.
    pub setup: bool,
}

impl Default for ThemeOptions {
    fn default() -> Self {
        Self {
            config_file: PathBuf::from(DEFAULT_CONFIG_FILE),
            globals: PathBuf::from(DEFAULT_GLOBALS_FILE),
            static_files: PathBuf::from(DEFAULT_STATIC_FILES),
            minify: false,
            concat: false,
            setup: true,
        }
    }
}

/// Options one strategy run receives.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct StrategyOptions {
    #[serde(default)]
    pub concat: Option<bool>,
    /// Rendering context; only meaningful for the content group.
    #[serde(default)]
    pub context: Option<Map<String, Value>>,
    #[serde(default)]
    pub embed: Option<bool>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl StrategyOptions {
    /// Concatenation flag, falling back to the layout default.
    pub fn concat_or(&self, default: bool) -> bool {
        self.concat.unwrap_or(default)
    }
}

/// Options handed to a layout action.
///
/// Keys naming a registered group carry that group's options; every other
/// key applies to all groups. Group-specific values win.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ActionOptions {
    values: Map<String, Value>,
}

impl ActionOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_map(values: Map<String, Value>) -> Self {
        Self { values }
    }

    /// Non-object values are treated as empty options.
    pub fn from_value(value: Value) -> Self {
        match value {
            Value::Object(values) => Self { values },
            _ => Self::default(),
        }
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    pub fn insert(&mut self, key: impl Into<String>, value: Value) {
        self.values.insert(key.into(), value);
    }

    pub fn with(mut self, key: impl Into<String>, value: Value) -> Self {
        self.insert(key, value);
        self
    }

    /// Merge `context` into `<group>.context`, keeping any existing keys that
    /// `context` does not override.
    pub fn merge_context(&mut self, group: &str, context: Map<String, Value>) {
        let entry = self
            .values
            .entry(group.to_string())
            .or_insert_with(|| Value::Object(Map::new()));
        if !entry.is_object() {
            *entry = Value::Object(Map::new());
        }
        let Value::Object(group_options) = entry else {
            return;
        };
        let slot = group_options
            .entry("context".to_string())
            .or_insert_with(|| Value::Object(Map::new()));
        match slot {
            Value::Object(existing) => existing.extend(context),
            other => *other = Value::Object(context),
        }
    }

    /// Split these options into per-group [`StrategyOptions`].
    pub fn resolve<'a, I>(&self, groups: I) -> Result<BTreeMap<String, StrategyOptions>, LayoutError>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let groups: Vec<&str> = groups.into_iter().collect();
        let shared: Map<String, Value> = self
            .values
            .iter()
            .filter(|(key, _)| !groups.contains(&key.as_str()))
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect();

        let mut resolved = BTreeMap::new();
        for group in groups {
            let mut merged = shared.clone();
            if let Some(Value::Object(specific)) = self.values.get(group) {
                for (key, value) in specific {
                    merged.insert(key.clone(), value.clone());
                }
            }
            let options = serde_json::from_value(Value::Object(merged)).map_err(|err| {
                LayoutError::InvalidOptions {
                    group: group.to_string(),
                    reason: err.to_string(),
                }
            })?;
            resolved.insert(group.to_string(), options);
        }
        Ok(resolved)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn group_specific_options_override_shared_ones() {
        let options = ActionOptions::from_value(json!({
            "concat": true,
            "scripts": { "concat": false },
        }));

        let resolved = options.resolve(["scripts", "styles"]).unwrap();
        assert_eq!(resolved["scripts"].concat, Some(false));
        assert_eq!(resolved["styles"].concat, Some(true));
    }

    #[test]
    fn group_keys_do_not_leak_into_other_groups() {
        let options = ActionOptions::from_value(json!({ "styles": { "embed": true } }));
        let resolved = options.resolve(["scripts", "styles"]).unwrap();
        assert!(resolved["scripts"].extra.is_empty());
        assert_eq!(resolved["scripts"].embed, None);
        assert_eq!(resolved["styles"].embed, Some(true));
    }

    #[test]
    fn mistyped_flags_are_rejected() {
        let options = ActionOptions::from_value(json!({ "concat": "yes" }));
        let err = options.resolve(["scripts"]).unwrap_err();
        assert!(matches!(err, LayoutError::InvalidOptions { ref group, .. } if group == "scripts"));
    }

    #[test]
    fn merge_context_extends_existing_context() {
        let mut options = ActionOptions::from_value(json!({
            "content": { "context": { "a": 1, "b": 1 } }
        }));
        let mut context = Map::new();
        context.insert("b".into(), json!(2));
        context.insert("c".into(), json!(3));
        options.merge_context("content", context);

        let resolved = options.resolve(["content"]).unwrap();
        assert_eq!(
            Value::Object(resolved["content"].context.clone().unwrap()),
            json!({ "a": 1, "b": 2, "c": 3 })
        );
    }

    #[test]
    fn asset_options_merge_prefers_overlay() {
        let mut base = AssetOptions {
            minify: Some(true),
            concat: None,
            extra: Map::new(),
        };
        base.merge(&AssetOptions {
            minify: None,
            concat: Some(false),
            extra: Map::new(),
        });
        assert_eq!(base.minify, Some(true));
        assert_eq!(base.concat, Some(false));
    }
}
