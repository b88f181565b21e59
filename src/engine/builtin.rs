//! Default asset types, strategies and actions every theme starts with.

use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use metrics::histogram;
use serde_json::{Map, Value};
use tracing::{debug, info};

use super::asset::{Asset, remote_url};
use super::concat::concat;
use super::error::{AssetError, LayoutError};
use super::html::{SCRIPT, STYLESHEET, asset_html};
use super::layout::{COMPILE, Layout, LayoutState, PRECOMPILE};
use super::minify::{minify_css, minify_js};
use super::options::{ActionOptions, StrategyOptions};
use super::strategy::{Action, ActionOutcome, Phase, Strategy, StrategyContext};
use super::template::CompiledTemplate;
use super::theme::Theme;
use super::types::{Prefilter, PrefilterContext};

pub const CONTENT: &str = "content";
pub const SCRIPTS: &str = "scripts";
pub const STYLES: &str = "styles";
pub const HEADERS: &str = "headers";

const METRIC_PRECOMPILE_MS: &str = "trellis_layout_precompile_ms";
const METRIC_COMPILE_MS: &str = "trellis_layout_compile_ms";

/// Register the default types, strategies and actions on `theme`.
pub fn install(theme: &mut Theme) {
    theme.register_asset_type("html", ["html", "htm"], None);
    theme.register_asset_type("text", ["txt"], None);
    theme.register_asset_type("image", ["png", "gif", "jpg", "jpeg"], None);
    theme.register_asset_type("font", ["ttf", "woff", "eot"], None);
    theme.register_asset_type("svg", ["svg"], None);
    theme.register_asset_type(
        "template",
        ["hbs", "handlebar", "hbr", "tmpl"],
        Some(Arc::new(TemplatePrefilter)),
    );
    theme.register_asset_type("markdown", ["md", "markdown"], Some(Arc::new(MarkdownPrefilter)));
    theme.register_asset_type("css", ["css"], Some(Arc::new(MinifyPrefilter::Css)));
    theme.register_asset_type("javascript", ["js"], Some(Arc::new(MinifyPrefilter::Js)));

    theme.register_strategy(CONTENT, Arc::new(ContentStrategy));
    theme.register_strategy(SCRIPTS, Arc::new(ConcatStrategy));
    theme.register_strategy(STYLES, Arc::new(ConcatStrategy));
    theme.register_strategy(HEADERS, Arc::new(HeadersStrategy));

    theme.register_action(PRECOMPILE, Arc::new(PrecompileAction));
    theme.register_action(COMPILE, Arc::new(CompileAction));
}

/// Compiles template sources into a render function; the asset becomes
/// `html`.
pub struct TemplatePrefilter;

#[async_trait]
impl Prefilter for TemplatePrefilter {
    async fn apply(&self, mut asset: Asset, _ctx: &PrefilterContext) -> Result<Asset, AssetError> {
        let source = asset.to_text().await?;
        let base_dir = asset
            .file
            .as_deref()
            .filter(|file| remote_url(file).is_none())
            .and_then(|file| Path::new(file).parent());
        let template = CompiledTemplate::compile(&source, base_dir).await?;
        asset.set_template(Arc::new(template));
        asset.asset_type = "html".to_string();
        asset.name.push_str(".html");
        Ok(asset)
    }
}

pub struct MarkdownPrefilter;

#[async_trait]
impl Prefilter for MarkdownPrefilter {
    async fn apply(&self, mut asset: Asset, _ctx: &PrefilterContext) -> Result<Asset, AssetError> {
        let source = asset.to_text().await?;
        let html = comrak::markdown_to_html(&source, &comrak::Options::default());
        asset.write(html, false).await?;
        asset.asset_type = "html".to_string();
        asset.name.push_str(".html");
        Ok(asset)
    }
}

/// Minifies when the asset asks for it, else when the theme does.
pub enum MinifyPrefilter {
    Css,
    Js,
}

#[async_trait]
impl Prefilter for MinifyPrefilter {
    async fn apply(&self, asset: Asset, ctx: &PrefilterContext) -> Result<Asset, AssetError> {
        if !(asset.options.minify.unwrap_or(false) || ctx.minify) {
            return Ok(asset);
        }
        let source = asset.to_text().await?;
        let minified = match self {
            Self::Css => minify_css(&source),
            Self::Js => minify_js(&source),
        };
        asset.write(minified, false).await?;
        Ok(asset)
    }
}

/// Renders every asset against the context and joins the results into one
/// `content` asset. Passes through while preparing.
pub struct ContentStrategy;

#[async_trait]
impl Strategy for ContentStrategy {
    async fn run(
        &self,
        ctx: &StrategyContext<'_>,
        assets: &[Asset],
        options: &StrategyOptions,
    ) -> Result<Vec<Asset>, LayoutError> {
        if ctx.phase == Phase::Preparing {
            return Ok(assets.to_vec());
        }

        let base = options.context.clone().unwrap_or_default();
        let document = ctx.factory.blank(CONTENT, "html");
        for asset in assets {
            let rendered = match asset.template() {
                Some(template) => {
                    let mut context = base.clone();
                    context.insert("_asset".into(), asset.to_value(&["content"]).await?);
                    template
                        .render(&Value::Object(context))
                        .map_err(AssetError::from)?
                }
                None => asset.to_text().await?,
            };
            document.append(rendered).await?;
        }
        Ok(vec![document])
    }
}

/// Concatenates while preparing when `concat` is set; passes through
/// otherwise.
pub struct ConcatStrategy;

#[async_trait]
impl Strategy for ConcatStrategy {
    async fn run(
        &self,
        ctx: &StrategyContext<'_>,
        assets: &[Asset],
        options: &StrategyOptions,
    ) -> Result<Vec<Asset>, LayoutError> {
        match ctx.phase {
            Phase::Preparing if options.concat_or(ctx.layout.concat) => {
                Ok(concat(assets).await?)
            }
            _ => Ok(assets.to_vec()),
        }
    }
}

/// Like [`ConcatStrategy`] while preparing; reduces everything into one
/// `headers` asset when ready.
pub struct HeadersStrategy;

#[async_trait]
impl Strategy for HeadersStrategy {
    async fn run(
        &self,
        ctx: &StrategyContext<'_>,
        assets: &[Asset],
        options: &StrategyOptions,
    ) -> Result<Vec<Asset>, LayoutError> {
        if ctx.phase == Phase::Preparing {
            return ConcatStrategy.run(ctx, assets, options).await;
        }
        let headers = ctx.factory.blank(HEADERS, "text");
        for asset in assets {
            headers.append(asset.to_bytes().await?).await?;
        }
        Ok(vec![headers])
    }
}

/// Normalizes every group and leaves the layout `ready`.
///
/// Prior assets missing from a strategy's output are evicted; the output
/// replaces the group.
pub struct PrecompileAction;

#[async_trait]
impl Action for PrecompileAction {
    async fn run(
        &self,
        layout: &mut Layout,
        options: ActionOptions,
    ) -> Result<ActionOutcome, LayoutError> {
        let started = Instant::now();
        layout.change_state(LayoutState::Preparing);

        let groups: Vec<String> = layout
            .group_names()
            .into_iter()
            .map(str::to_string)
            .collect();
        let resolved = options.resolve(groups.iter().map(String::as_str))?;

        let mut evicted = 0usize;
        for group in &groups {
            let options = resolved.get(group).cloned().unwrap_or_default();
            let output = layout.execute(group, &options).await?;
            for asset in layout.assets(group)? {
                if !output.iter().any(|kept| kept.id() == asset.id()) {
                    asset.destroy().await?;
                    evicted += 1;
                }
            }
            layout.remove_assets(group)?;
            layout.add_assets(group, output);
        }

        layout.change_state(LayoutState::Ready);
        let elapsed_ms = started.elapsed().as_secs_f64() * 1000.0;
        histogram!(METRIC_PRECOMPILE_MS).record(elapsed_ms);
        info!(
            layout_id = %layout.id(),
            layout = layout.name(),
            groups = groups.len(),
            evicted,
            elapsed_ms,
            "Layout precompiled"
        );
        Ok(ActionOutcome::Done)
    }
}

/// Renders the layout into one document without disturbing its groups.
pub struct CompileAction;

#[async_trait]
impl Action for CompileAction {
    async fn run(
        &self,
        layout: &mut Layout,
        options: ActionOptions,
    ) -> Result<ActionOutcome, LayoutError> {
        let started = Instant::now();
        let resolved = options.resolve(layout.group_names())?;
        let options_for = |group: &str| resolved.get(group).cloned().unwrap_or_default();

        let styles_options = options_for(STYLES);
        let scripts_options = options_for(SCRIPTS);
        let styles = layout.execute(STYLES, &styles_options).await?;
        let scripts = layout.execute(SCRIPTS, &scripts_options).await?;
        let headers = layout.execute(HEADERS, &options_for(HEADERS)).await?;

        let public_url = |asset: &Asset| layout.public_url(asset);
        let mut fragments = Map::new();
        fragments.insert(
            HEADERS.into(),
            Value::String(match headers.first() {
                Some(asset) => asset.to_text().await?,
                None => String::new(),
            }),
        );
        fragments.insert(
            STYLES.into(),
            Value::String(
                asset_html(
                    &styles,
                    STYLESHEET,
                    styles_options.embed.unwrap_or(false),
                    &public_url,
                )
                .await?,
            ),
        );
        fragments.insert(
            SCRIPTS.into(),
            Value::String(
                asset_html(
                    &scripts,
                    SCRIPT,
                    scripts_options.embed.unwrap_or(false),
                    &public_url,
                )
                .await?,
            ),
        );

        let mut content_options = options_for(CONTENT);
        let mut context = content_options.context.take().unwrap_or_default();
        context.extend(fragments);
        content_options.context = Some(context);

        let content = layout.execute(CONTENT, &content_options).await?;
        let document = match content.first() {
            Some(asset) => asset.to_text().await?,
            None => String::new(),
        };

        discard_transient(layout, HEADERS, &headers).await?;
        discard_transient(layout, CONTENT, &content).await?;

        let elapsed_ms = started.elapsed().as_secs_f64() * 1000.0;
        histogram!(METRIC_COMPILE_MS).record(elapsed_ms);
        debug!(layout_id = %layout.id(), bytes = document.len(), elapsed_ms, "Layout compiled");
        Ok(ActionOutcome::Rendered(document))
    }
}

/// Evict strategy outputs that are not part of `group`'s steady state.
async fn discard_transient(layout: &Layout, group: &str, output: &[Asset]) -> Result<(), LayoutError> {
    let current = layout.assets(group)?;
    for asset in output {
        if !current.iter().any(|kept| kept.id() == asset.id()) {
            asset.destroy().await?;
        }
    }
    Ok(())
}
