//! Cached units of theme content.
//!
//! An [`Asset`] owns exactly one [`CacheStore`] entry keyed by its namespace
//! and id. Content goes through the store base64-encoded so binary payloads
//! survive text-oriented backends.

use std::fmt;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use bytes::{Bytes, BytesMut};
use metrics::counter;
use serde::Deserialize;
use serde_json::{Map, Value};
use tracing::{debug, instrument};
use url::Url;
use uuid::Uuid;

use crate::cache::{CacheKey, CacheStore, Namespace};

use super::error::AssetError;
use super::options::AssetOptions;
use super::template::Template;

pub const DEFAULT_NAMESPACE: &str = "trellis::theme-assets";
pub const DEFAULT_ASSET_TYPE: &str = "text";
pub const STATIC_TYPE: &str = "static";

const METRIC_ASSET_EVICTED: &str = "trellis_asset_evicted_total";

/// Retrieves remote asset content.
#[async_trait]
pub trait RemoteFetch: Send + Sync {
    /// Fetch `url`. Responses with a status of 400 or above must fail with
    /// [`AssetError::RemoteFetch`].
    async fn fetch(&self, url: &Url) -> Result<Bytes, AssetError>;
}

/// Structured asset declaration.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AssetSpec {
    pub file: Option<String>,
    pub content: Option<Bytes>,
    pub name: Option<String>,
    pub asset_type: Option<String>,
    /// Cache namespace overriding the factory default.
    pub location: Option<String>,
    pub options: AssetOptions,
}

impl AssetSpec {
    pub fn file(file: impl Into<String>) -> Self {
        Self {
            file: Some(file.into()),
            ..Self::default()
        }
    }

    pub fn content(content: impl Into<Bytes>) -> Self {
        Self {
            content: Some(content.into()),
            ..Self::default()
        }
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn typed(mut self, asset_type: impl Into<String>) -> Self {
        self.asset_type = Some(asset_type.into());
        self
    }

    pub fn with_options(mut self, options: AssetOptions) -> Self {
        self.options = options;
        self
    }
}

#[derive(Debug, Deserialize)]
struct SpecFields {
    #[serde(default)]
    file: Option<String>,
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    name: Option<String>,
    #[serde(default, rename = "type")]
    asset_type: Option<String>,
    #[serde(default)]
    location: Option<String>,
    #[serde(default)]
    options: AssetOptions,
}

/// What an asset is created from.
#[derive(Debug, Clone, PartialEq)]
pub enum AssetSource {
    /// A local file path when one exists under that name, inline content
    /// otherwise.
    Text(String),
    Spec(AssetSpec),
}

impl AssetSource {
    /// Accepts a JSON string or object; anything else is invalid.
    pub fn from_value(value: Value) -> Result<Self, AssetError> {
        match value {
            Value::String(text) => Ok(Self::Text(text)),
            Value::Object(map) => {
                let fields: SpecFields = serde_json::from_value(Value::Object(map))
                    .map_err(|err| AssetError::invalid(err.to_string()))?;
                Ok(Self::Spec(AssetSpec {
                    file: fields.file,
                    content: fields.content.map(Bytes::from),
                    name: fields.name,
                    asset_type: fields.asset_type,
                    location: fields.location,
                    options: fields.options,
                }))
            }
            other => Err(AssetError::invalid(format!(
                "expected a string or an object, found `{other}`"
            ))),
        }
    }
}

impl From<AssetSpec> for AssetSource {
    fn from(spec: AssetSpec) -> Self {
        Self::Spec(spec)
    }
}

/// A named, typed unit of cached content.
///
/// Cloning an `Asset` yields another handle to the same cache entry; use
/// [`Asset::duplicate`] for an independent copy.
#[derive(Clone)]
pub struct Asset {
    id: Uuid,
    pub asset_type: String,
    pub name: String,
    pub file: Option<String>,
    location: Option<Namespace>,
    pub options: AssetOptions,
    group: Option<String>,
    template: Option<Arc<dyn Template>>,
    store: Arc<dyn CacheStore>,
}

impl fmt::Debug for Asset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Asset")
            .field("id", &self.id)
            .field("asset_type", &self.asset_type)
            .field("name", &self.name)
            .field("file", &self.file)
            .field("location", &self.location)
            .field("group", &self.group)
            .field("template", &self.template.is_some())
            .finish_non_exhaustive()
    }
}

impl Asset {
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn location(&self) -> Option<&Namespace> {
        self.location.as_ref()
    }

    /// Group the asset was last added to.
    pub fn group(&self) -> Option<&str> {
        self.group.as_deref()
    }

    pub(crate) fn set_group(&mut self, group: &str) {
        self.group = Some(group.to_string());
    }

    pub fn is_static(&self) -> bool {
        self.asset_type == STATIC_TYPE
    }

    pub fn template(&self) -> Option<&Arc<dyn Template>> {
        self.template.as_ref()
    }

    pub fn set_template(&mut self, template: Arc<dyn Template>) {
        self.template = Some(template);
    }

    pub fn cache_key(&self) -> Result<CacheKey, AssetError> {
        let location = self.location.as_ref().ok_or_else(|| AssetError::NoLocation {
            name: self.name.clone(),
        })?;
        Ok(location.key(self.id.simple()))
    }

    /// Replace the content, or with `safe` store it only when no content
    /// exists yet. Returns whether the store accepted the write.
    pub async fn write(&self, content: impl Into<Bytes>, safe: bool) -> Result<bool, AssetError> {
        let key = self.cache_key()?;
        let encoded = Bytes::from(BASE64.encode(content.into()));
        if safe {
            Ok(self.store.set_if_absent(&key, encoded).await?.stored())
        } else {
            self.store.set(&key, encoded).await?;
            Ok(true)
        }
    }

    pub async fn append(&self, content: impl Into<Bytes>) -> Result<bool, AssetError> {
        let content = content.into();
        let existing = self.to_bytes().await?;
        let mut joined = BytesMut::with_capacity(existing.len() + content.len());
        joined.extend_from_slice(&existing);
        joined.extend_from_slice(&content);
        self.write(joined.freeze(), false).await
    }

    /// Current content; empty when the asset has no location or no entry.
    pub async fn to_bytes(&self) -> Result<Bytes, AssetError> {
        if self.location.is_none() {
            return Ok(Bytes::new());
        }
        let key = self.cache_key()?;
        let Some(encoded) = self.store.get(&key).await? else {
            return Ok(Bytes::new());
        };
        BASE64
            .decode(&encoded)
            .map(Bytes::from)
            .map_err(|source| AssetError::Corrupt { key, source })
    }

    /// Content decoded as UTF-8, replacing invalid sequences.
    pub async fn to_text(&self) -> Result<String, AssetError> {
        let bytes = self.to_bytes().await?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }

    /// Public fields as a JSON object, without the keys named in `omit`.
    ///
    /// Content is only read from the store when `"content"` is not omitted.
    pub async fn to_value(&self, omit: &[&str]) -> Result<Value, AssetError> {
        let mut object = Map::new();
        object.insert("id".into(), Value::String(self.id.to_string()));
        object.insert("type".into(), Value::String(self.asset_type.clone()));
        object.insert("name".into(), Value::String(self.name.clone()));
        object.insert(
            "file".into(),
            self.file.clone().map(Value::String).unwrap_or(Value::Null),
        );
        object.insert(
            "location".into(),
            self.location
                .as_ref()
                .map(|location| Value::String(location.to_string()))
                .unwrap_or(Value::Null),
        );
        object.insert(
            "group".into(),
            self.group.clone().map(Value::String).unwrap_or(Value::Null),
        );
        object.insert(
            "options".into(),
            serde_json::to_value(&self.options).unwrap_or(Value::Null),
        );
        if !omit.contains(&"content") {
            object.insert("content".into(), Value::String(self.to_text().await?));
        }
        for key in omit {
            object.remove(*key);
        }
        Ok(Value::Object(object))
    }

    /// Independent copy with a new id and its own cache entry.
    pub async fn duplicate(&self) -> Result<Asset, AssetError> {
        let copy = Asset {
            id: Uuid::new_v4(),
            group: None,
            ..self.clone()
        };
        if copy.location.is_some() {
            let content = self.to_bytes().await?;
            if !content.is_empty() {
                copy.write(content, false).await?;
            }
        }
        Ok(copy)
    }

    /// Evict the cache entry. Assets without a location own no entry.
    #[instrument(skip_all, fields(asset_id = %self.id, name = %self.name))]
    pub async fn destroy(&self) -> Result<(), AssetError> {
        if self.location.is_none() {
            return Ok(());
        }
        let key = self.cache_key()?;
        self.store.delete(&key).await?;
        counter!(METRIC_ASSET_EVICTED).increment(1);
        debug!(key = %key, "Evicted asset");
        Ok(())
    }
}

/// Builds assets against one store and namespace.
#[derive(Clone)]
pub struct AssetFactory {
    store: Arc<dyn CacheStore>,
    fetcher: Arc<dyn RemoteFetch>,
    namespace: Namespace,
}

impl fmt::Debug for AssetFactory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AssetFactory")
            .field("namespace", &self.namespace)
            .finish_non_exhaustive()
    }
}

impl AssetFactory {
    pub fn new(
        store: Arc<dyn CacheStore>,
        fetcher: Arc<dyn RemoteFetch>,
        namespace: Namespace,
    ) -> Self {
        Self {
            store,
            fetcher,
            namespace,
        }
    }

    pub fn namespace(&self) -> &Namespace {
        &self.namespace
    }

    pub fn store(&self) -> &Arc<dyn CacheStore> {
        &self.store
    }

    /// Factory writing below `segment` of this factory's namespace.
    pub fn child(&self, segment: impl AsRef<str>) -> Self {
        Self {
            namespace: self.namespace.child(segment),
            ..self.clone()
        }
    }

    /// Empty asset with no content and no cache entry yet.
    pub fn blank(&self, name: impl Into<String>, asset_type: impl Into<String>) -> Asset {
        let asset_type = asset_type.into();
        let location = (asset_type != STATIC_TYPE).then(|| self.namespace.clone());
        Asset {
            id: Uuid::new_v4(),
            asset_type,
            name: name.into(),
            file: None,
            location,
            options: AssetOptions::default(),
            group: None,
            template: None,
            store: self.store.clone(),
        }
    }

    #[instrument(skip_all)]
    pub async fn create(&self, source: impl Into<AssetSource>) -> Result<Asset, AssetError> {
        let spec = match source.into() {
            AssetSource::Spec(spec) => spec,
            AssetSource::Text(text) => {
                if is_local_file(Path::new(&text)).await {
                    AssetSpec::file(text)
                } else {
                    AssetSpec::content(text)
                }
            }
        };

        let asset_type = spec
            .asset_type
            .filter(|asset_type| !asset_type.is_empty())
            .unwrap_or_else(|| DEFAULT_ASSET_TYPE.to_string());
        let file = spec.file.filter(|file| !file.is_empty());
        let name = spec
            .name
            .filter(|name| !name.is_empty())
            .or_else(|| file.as_deref().and_then(file_name))
            .unwrap_or_else(|| Uuid::new_v4().simple().to_string());

        let location = if asset_type == STATIC_TYPE {
            None
        } else {
            Some(match spec.location.as_deref() {
                Some(location) => Namespace::parse(location),
                None => self.namespace.clone(),
            })
        };

        let asset = Asset {
            id: Uuid::new_v4(),
            asset_type,
            name,
            file,
            location,
            options: spec.options,
            group: None,
            template: None,
            store: self.store.clone(),
        };
        if asset.location.is_none() {
            return Ok(asset);
        }

        let content = match spec.content.filter(|content| !content.is_empty()) {
            Some(content) => Some(content),
            None => self.load(asset.file.as_deref()).await?,
        };
        if let Some(content) = content {
            asset.write(content, false).await?;
        }
        debug!(asset_id = %asset.id, name = %asset.name, asset_type = %asset.asset_type, "Created asset");
        Ok(asset)
    }

    async fn load(&self, file: Option<&str>) -> Result<Option<Bytes>, AssetError> {
        let Some(file) = file else {
            return Ok(None);
        };
        if let Some(url) = remote_url(file) {
            return self.fetcher.fetch(&url).await.map(Some);
        }
        let path = Path::new(file);
        if !is_local_file(path).await {
            return Err(AssetError::unreadable(
                path,
                std::io::Error::new(std::io::ErrorKind::NotFound, "not a file"),
            ));
        }
        tokio::fs::read(path)
            .await
            .map(|content| Some(Bytes::from(content)))
            .map_err(|err| AssetError::unreadable(path, err))
    }
}

/// Parse `file` as an absolute URL with a host.
pub(crate) fn remote_url(file: &str) -> Option<Url> {
    Url::parse(file).ok().filter(|url| url.has_host())
}

pub(crate) async fn is_local_file(path: &Path) -> bool {
    tokio::fs::metadata(path)
        .await
        .map(|meta| meta.is_file())
        .unwrap_or(false)
}

fn file_name(file: &str) -> Option<String> {
    let path = match remote_url(file) {
        Some(url) => url.path().to_string(),
        None => file.to_string(),
    };
    Path::new(&path)
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
}
