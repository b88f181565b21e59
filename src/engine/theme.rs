//! Theme: registries plus the factory composing layouts from declarations.

use std::collections::{BTreeMap, HashSet};
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use bytes::Bytes;
use serde_json::{Map, Value};
use tokio::sync::broadcast;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use super::asset::{Asset, AssetFactory, AssetSource, AssetSpec, STATIC_TYPE, is_local_file, remote_url};
use super::builtin;
use super::config::{GroupDecl, ThemeConfig};
use super::error::{AssetError, ThemeError};
use super::layout::{AssetSummary, Layout};
use super::options::{LayoutOptions, ThemeOptions};
use super::published::{PublishedAssets, asset_route};
use super::strategy::{Action, Strategy};
use super::types::{AssetTypes, Prefilter, PrefilterContext};

const EVENT_CAPACITY: usize = 64;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ThemeEvent {
    NewAsset { asset: AssetSummary },
    NewLayout { layout_id: Uuid, template: String },
}

/// Bytes and content type of an asset resolved by route.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServedAsset {
    pub content_type: String,
    pub body: Bytes,
}

pub struct Theme {
    location: PathBuf,
    options: ThemeOptions,
    config: ThemeConfig,
    globals: Map<String, Value>,
    globals_dir: PathBuf,
    asset_types: AssetTypes,
    strategies: Vec<(String, Arc<dyn Strategy>)>,
    actions: BTreeMap<String, Arc<dyn Action>>,
    factory: AssetFactory,
    published: Arc<PublishedAssets>,
    events: broadcast::Sender<ThemeEvent>,
}

impl std::fmt::Debug for Theme {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Theme")
            .field("location", &self.location)
            .field("options", &self.options)
            .field("asset_types", &self.asset_types)
            .field("strategies", &self.strategy_names())
            .field("actions", &self.actions.keys().collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}

impl Theme {
    /// Load the theme rooted at `location`.
    ///
    /// The config file must exist. The globals file is optional. With
    /// `options.setup` the built-in types, strategies and actions are
    /// registered.
    #[instrument(skip_all, fields(location = %location.as_ref().display()))]
    pub async fn open(
        location: impl AsRef<Path>,
        mut options: ThemeOptions,
        factory: AssetFactory,
    ) -> Result<Self, ThemeError> {
        let location = location.as_ref().to_path_buf();
        let config_path = location.join(&options.config_file);
        if !is_local_file(&config_path).await {
            return Err(ThemeError::MissingConfig {
                location,
                file: options.config_file.display().to_string(),
            });
        }
        let config = ThemeConfig::load(&config_path).await?;

        let globals_path = location.join(&options.globals);
        let globals = if is_local_file(&globals_path).await {
            match ThemeConfig::load(&globals_path).await?.get(&[]) {
                Some(Value::Object(map)) => map.clone(),
                _ => {
                    warn!(path = %globals_path.display(), "Globals file is not an object; ignoring");
                    Map::new()
                }
            }
        } else {
            Map::new()
        };
        let globals_dir = globals_path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| location.clone());

        if let Some(static_files) = config.get_str(&["options", "static_files"]) {
            options.static_files = PathBuf::from(static_files);
        }

        let setup = options.setup;
        let mut theme = Self {
            location,
            options,
            config,
            globals,
            globals_dir,
            asset_types: AssetTypes::new(),
            strategies: Vec::new(),
            actions: BTreeMap::new(),
            factory,
            published: Arc::new(PublishedAssets::new()),
            events: broadcast::channel(EVENT_CAPACITY).0,
        };
        if setup {
            builtin::install(&mut theme);
        }
        info!(
            templates = theme
                .config
                .get_object(&["templates"])
                .map_or(0, Map::len),
            globals = theme.globals.len(),
            "Theme loaded"
        );
        Ok(theme)
    }

    pub fn location(&self) -> &Path {
        &self.location
    }

    pub fn options(&self) -> &ThemeOptions {
        &self.options
    }

    pub fn config(&self) -> &ThemeConfig {
        &self.config
    }

    pub fn factory(&self) -> &AssetFactory {
        &self.factory
    }

    pub fn published(&self) -> &Arc<PublishedAssets> {
        &self.published
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ThemeEvent> {
        self.events.subscribe()
    }

    fn emit(&self, event: ThemeEvent) {
        let _ = self.events.send(event);
    }

    pub fn register_asset_type<I, S>(
        &mut self,
        asset_type: &str,
        extensions: I,
        prefilter: Option<Arc<dyn Prefilter>>,
    ) where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.asset_types.register(asset_type, extensions, prefilter);
    }

    pub fn extension_type(&self, extension: &str) -> Option<&str> {
        self.asset_types.extension_type(extension)
    }

    pub async fn prefilter(&self, asset: Asset) -> Result<Asset, AssetError> {
        let ctx = PrefilterContext {
            minify: self.options.minify,
        };
        self.asset_types.prefilter(asset, &ctx).await
    }

    /// Register the strategy for `group`. Every new layout gets the group.
    pub fn register_strategy(&mut self, group: &str, strategy: Arc<dyn Strategy>) {
        match self.strategies.iter_mut().find(|(name, _)| name == group) {
            Some(entry) => entry.1 = strategy,
            None => self.strategies.push((group.to_string(), strategy)),
        }
    }

    pub fn strategy_names(&self) -> Vec<&str> {
        self.strategies.iter().map(|(name, _)| name.as_str()).collect()
    }

    pub fn register_action(&mut self, name: &str, action: Arc<dyn Action>) {
        self.actions.insert(name.to_string(), action);
    }

    /// Build an asset from a declaration in the theme's namespace.
    pub async fn new_asset(&self, decl: &Value, base: Option<&Path>) -> Result<Asset, ThemeError> {
        self.new_asset_with(&self.factory, decl, base).await
    }

    /// Build an asset from a declaration using `factory`.
    ///
    /// Strings naming a global declaration resolve to it, relative to the
    /// globals file. Local files resolve relative to `base` (the theme
    /// location by default); strings only count as files when they carry
    /// an extension. Remote URLs are kept as they are.
    pub async fn new_asset_with(
        &self,
        factory: &AssetFactory,
        decl: &Value,
        base: Option<&Path>,
    ) -> Result<Asset, ThemeError> {
        let (decl, base) = self.resolve_global(decl, base)?;
        let forced_static = self.config.get_bool(&["options", "static_assets"]) == Some(true);

        let filename = match &decl {
            Value::String(text) => Some(text.as_str()),
            Value::Object(map) => map.get("file").and_then(Value::as_str),
            _ => None,
        };

        let mut extension = None;
        let mut file = None;
        if let Some(filename) = filename {
            match remote_url(filename) {
                Some(url) => {
                    extension = path_extension(url.path());
                    file = Some(url.to_string());
                }
                None => {
                    extension = path_extension(filename);
                    if forced_static {
                        file = Some(filename.to_string());
                    } else if extension.is_some() || decl.is_object() {
                        file = Some(base.join(filename).display().to_string());
                    }
                }
            }
            if forced_static && file.is_none() {
                file = Some(filename.to_string());
            }
        }

        let mut spec = match &decl {
            Value::String(text) => match &file {
                Some(file) => AssetSpec::file(file.clone()),
                None => AssetSpec::content(text.clone()),
            },
            other => match AssetSource::from_value(other.clone())? {
                AssetSource::Spec(mut spec) => {
                    spec.file = file;
                    spec
                }
                AssetSource::Text(text) => AssetSpec::content(text),
            },
        };

        spec.asset_type = if forced_static {
            Some(STATIC_TYPE.to_string())
        } else {
            spec.asset_type
                .filter(|asset_type| !asset_type.is_empty())
                .or_else(|| {
                    extension
                        .as_deref()
                        .and_then(|extension| self.extension_type(extension))
                        .map(str::to_string)
                })
                .or_else(|| {
                    self.config
                        .get_str(&["options", "default_asset_type"])
                        .map(str::to_string)
                })
        };

        let asset = factory.create(spec).await?;
        let asset = self.prefilter(asset).await?;
        debug!(asset_id = %asset.id(), name = %asset.name, asset_type = %asset.asset_type, "New asset");
        self.emit(ThemeEvent::NewAsset {
            asset: AssetSummary::from(&asset),
        });
        Ok(asset)
    }

    /// Follow global references until a concrete declaration is reached.
    fn resolve_global(&self, decl: &Value, base: Option<&Path>) -> Result<(Value, PathBuf), ThemeError> {
        let mut decl = decl.clone();
        let mut base = base.map_or_else(|| self.location.clone(), Path::to_path_buf);
        let mut seen = HashSet::new();
        while let Value::String(name) = &decl {
            let Some(global) = self.globals.get(name) else {
                break;
            };
            if !seen.insert(name.clone()) {
                return Err(ThemeError::GlobalCycle { name: name.clone() });
            }
            decl = global.clone();
            base = self.globals_dir.clone();
        }
        Ok((decl, base))
    }

    /// Build the layout for `template`.
    ///
    /// Each strategy group receives the layout's `before` declarations, then
    /// the template's own (its `before` list followed by its `after` list),
    /// then the layout's `after` declarations. The theme's strategies and
    /// actions are copied into the layout, so later registrations do not
    /// affect it.
    ///
    /// Cached assets are evicted only by [`Layout::teardown`]. Dropping the
    /// layout withdraws its published routes but leaves its cache entries.
    #[instrument(skip(self, options))]
    pub async fn new_layout(
        &self,
        template: &str,
        options: Option<LayoutOptions>,
    ) -> Result<Layout, ThemeError> {
        let Some(template_decl) = self.config.get_object(&["templates", template]) else {
            return Err(ThemeError::template_not_found(template));
        };
        let layout_decl = template_decl
            .get("layout")
            .and_then(Value::as_str)
            .and_then(|layout| self.config.get_object(&["layouts", layout]));

        let options = options.unwrap_or(LayoutOptions {
            concat: self.options.concat,
        });
        let mut layout = Layout::new(template, options, &self.factory);
        for (name, action) in &self.actions {
            layout.register_action(name.clone(), action.clone());
        }
        for (group, strategy) in &self.strategies {
            layout.register_group(group, Some(strategy.clone()));
        }
        let layout_id = layout.id();
        layout.set_public_url(Arc::new(move |asset: &Asset| {
            format!(
                "/assets/{}",
                asset_route(layout_id, asset.group().unwrap_or_default(), &asset.name)
            )
        }));
        layout.set_published(self.published.clone());

        if let Err(err) = self.populate(&mut layout, template_decl, layout_decl).await {
            if let Err(cleanup) = layout.teardown().await {
                warn!(error = %cleanup, "Failed to evict assets of an abandoned layout");
            }
            return Err(err);
        }

        info!(layout_id = %layout.id(), template, "New layout");
        self.emit(ThemeEvent::NewLayout {
            layout_id: layout.id(),
            template: template.to_string(),
        });
        Ok(layout)
    }

    async fn populate(
        &self,
        layout: &mut Layout,
        template_decl: &Map<String, Value>,
        layout_decl: Option<&Map<String, Value>>,
    ) -> Result<(), ThemeError> {
        for (group, _) in &self.strategies {
            let bracket = layout_decl
                .and_then(|decl| decl.get(group))
                .map(GroupDecl::parse)
                .unwrap_or_default();
            let own = template_decl
                .get(group)
                .map(GroupDecl::parse)
                .unwrap_or_default();

            let decls = bracket
                .before
                .iter()
                .chain(own.before.iter())
                .chain(own.after.iter())
                .chain(bracket.after.iter());
            for decl in decls {
                let factory = layout.factory().clone();
                let asset = self.new_asset_with(&factory, decl, None).await?;
                layout.add_asset(group, asset);
            }
        }
        Ok(())
    }

    /// Build a layout for `template`, or else for the first template whose
    /// `type` is `layout_type`.
    ///
    /// Any failure of the named template is swallowed before the scan.
    pub async fn new_layout_by_type(
        &self,
        layout_type: &str,
        template: Option<&str>,
        options: Option<LayoutOptions>,
    ) -> Result<Option<Layout>, ThemeError> {
        if let Some(template) = template {
            match self.new_layout(template, options).await {
                Ok(layout) => return Ok(Some(layout)),
                Err(err) => debug!(template, error = %err, "Falling back to a template scan"),
            }
        }

        let found = self.config.get_object(&["templates"]).and_then(|templates| {
            templates
                .iter()
                .find(|(_, decl)| decl.get("type").and_then(Value::as_str) == Some(layout_type))
                .map(|(name, _)| name.clone())
        });
        match found {
            Some(name) => Ok(Some(self.new_layout(&name, options).await?)),
            None => Ok(None),
        }
    }

    /// Static-root file for `route`, when one exists. Never cached.
    pub async fn new_static_asset(&self, route: &str) -> Result<Option<Asset>, ThemeError> {
        let Some(path) = self.static_path(route) else {
            return Ok(None);
        };
        if !is_local_file(&path).await {
            return Ok(None);
        }
        let asset = self
            .factory
            .create(AssetSpec::file(path.display().to_string()).typed(STATIC_TYPE))
            .await?;
        Ok(Some(asset))
    }

    fn static_path(&self, route: &str) -> Option<PathBuf> {
        let relative = Path::new(route.trim_start_matches('/'));
        if relative
            .components()
            .any(|component| !matches!(component, Component::Normal(_) | Component::CurDir))
        {
            return None;
        }
        Some(self.location.join(&self.options.static_files).join(relative))
    }

    /// Serve `route` from the published index, else from the static root.
    pub async fn resolve_public_asset(&self, route: &str) -> Result<Option<ServedAsset>, ThemeError> {
        if let Some(entry) = self.published.get(route) {
            return Ok(Some(ServedAsset {
                content_type: entry.content_type,
                body: entry.asset.to_bytes().await?,
            }));
        }

        let Some(asset) = self.new_static_asset(route).await? else {
            return Ok(None);
        };
        let Some(file) = asset.file.as_deref() else {
            return Ok(None);
        };
        let body = tokio::fs::read(file)
            .await
            .map_err(|err| AssetError::unreadable(file, err))?;
        Ok(Some(ServedAsset {
            content_type: mime_guess::from_path(file)
                .first_or_octet_stream()
                .to_string(),
            body: Bytes::from(body),
        }))
    }
}

fn path_extension(path: &str) -> Option<String> {
    Path::new(path)
        .extension()
        .map(|extension| extension.to_string_lossy().into_owned())
        .filter(|extension| !extension.is_empty())
}
