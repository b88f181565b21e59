//! Asset type registry.
//!
//! Maps file extensions to semantic types and holds the one-time prefilter
//! each type runs when an asset is created.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::trace;

use super::asset::Asset;
use super::error::AssetError;

/// Theme-wide settings visible to prefilters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PrefilterContext {
    pub minify: bool,
}

/// One-time transformation applied to a freshly created asset.
///
/// A prefilter may rewrite the asset's type, name and content, or attach a
/// template, before the asset joins any group.
#[async_trait]
pub trait Prefilter: Send + Sync {
    async fn apply(&self, asset: Asset, ctx: &PrefilterContext) -> Result<Asset, AssetError>;
}

#[derive(Clone)]
struct AssetTypeEntry {
    name: String,
    extensions: Vec<String>,
    prefilter: Option<Arc<dyn Prefilter>>,
}

#[derive(Clone, Default)]
pub struct AssetTypes {
    entries: Vec<AssetTypeEntry>,
}

impl fmt::Debug for AssetTypes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map()
            .entries(
                self.entries
                    .iter()
                    .map(|entry| (&entry.name, &entry.extensions)),
            )
            .finish()
    }
}

impl AssetTypes {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `extensions` under `asset_type`. Registering an existing type
    /// adds the new extensions; a given prefilter replaces the old one.
    pub fn register<I, S>(&mut self, asset_type: &str, extensions: I, prefilter: Option<Arc<dyn Prefilter>>)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let index = match self.entries.iter().position(|entry| entry.name == asset_type) {
            Some(index) => index,
            None => {
                self.entries.push(AssetTypeEntry {
                    name: asset_type.to_string(),
                    extensions: Vec::new(),
                    prefilter: None,
                });
                self.entries.len() - 1
            }
        };
        let entry = &mut self.entries[index];
        for extension in extensions {
            let extension = normalize_extension(extension.as_ref());
            if !extension.is_empty() && !entry.extensions.contains(&extension) {
                entry.extensions.push(extension);
            }
        }
        if prefilter.is_some() {
            entry.prefilter = prefilter;
        }
    }

    /// Type registered for `extension`; the earliest registration wins.
    pub fn extension_type(&self, extension: &str) -> Option<&str> {
        let extension = normalize_extension(extension);
        self.entries
            .iter()
            .find(|entry| entry.extensions.contains(&extension))
            .map(|entry| entry.name.as_str())
    }

    pub fn contains(&self, asset_type: &str) -> bool {
        self.entries.iter().any(|entry| entry.name == asset_type)
    }

    /// Run the prefilter registered for the asset's type, if any.
    pub async fn prefilter(&self, asset: Asset, ctx: &PrefilterContext) -> Result<Asset, AssetError> {
        let prefilter = self
            .entries
            .iter()
            .find(|entry| entry.name == asset.asset_type)
            .and_then(|entry| entry.prefilter.clone());
        match prefilter {
            Some(prefilter) => {
                trace!(asset_id = %asset.id(), asset_type = %asset.asset_type, "Running prefilter");
                prefilter.apply(asset, ctx).await
            }
            None => Ok(asset),
        }
    }
}

fn normalize_extension(extension: &str) -> String {
    extension.trim().trim_start_matches('.').to_ascii_lowercase()
}
