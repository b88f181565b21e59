//! Layouts: named asset groups driven through `initial → preparing → ready`.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;
use tokio::sync::broadcast;
use tracing::{debug, info, instrument};
use uuid::Uuid;

use super::asset::{Asset, AssetFactory};
use super::error::LayoutError;
use super::options::{ActionOptions, LayoutOptions, StrategyOptions};
use super::published::PublishedAssets;
use super::strategy::{Action, ActionOutcome, Phase, PublicUrl, Strategy, StrategyContext};

pub const PRECOMPILE: &str = "precompile";
pub const COMPILE: &str = "compile";

const EVENT_CAPACITY: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LayoutState {
    Initial,
    Preparing,
    Ready,
}

impl LayoutState {
    /// Phase strategies run in while the layout is in this state.
    pub fn phase(self) -> Phase {
        match self {
            Self::Initial | Self::Preparing => Phase::Preparing,
            Self::Ready => Phase::Ready,
        }
    }
}

impl fmt::Display for LayoutState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Initial => "initial",
            Self::Preparing => "preparing",
            Self::Ready => "ready",
        })
    }
}

/// Metadata snapshot of one asset, carried by events and summaries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AssetSummary {
    pub id: Uuid,
    pub name: String,
    pub asset_type: String,
    pub file: Option<String>,
}

impl From<&Asset> for AssetSummary {
    fn from(asset: &Asset) -> Self {
        Self {
            id: asset.id(),
            name: asset.name.clone(),
            asset_type: asset.asset_type.clone(),
            file: asset.file.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GroupSummary {
    pub name: String,
    pub assets: Vec<AssetSummary>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LayoutEvent {
    StateChanged {
        layout_id: Uuid,
        from: LayoutState,
        to: LayoutState,
    },
    BeforeStrategy {
        layout_id: Uuid,
        group: String,
        assets: Vec<AssetSummary>,
    },
    AfterStrategy {
        layout_id: Uuid,
        group: String,
        assets: Vec<AssetSummary>,
    },
}

pub struct AssetGroup {
    name: String,
    assets: Vec<Asset>,
    strategy: Option<Arc<dyn Strategy>>,
}

impl AssetGroup {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn assets(&self) -> &[Asset] {
        &self.assets
    }

    pub fn has_strategy(&self) -> bool {
        self.strategy.is_some()
    }
}

/// Compiled-output unit for one template.
pub struct Layout {
    id: Uuid,
    name: String,
    state: LayoutState,
    options: LayoutOptions,
    groups: Vec<AssetGroup>,
    actions: BTreeMap<String, Arc<dyn Action>>,
    public_url: Option<PublicUrl>,
    factory: AssetFactory,
    events: broadcast::Sender<LayoutEvent>,
    published: Option<Arc<PublishedAssets>>,
}

impl fmt::Debug for Layout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Layout")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("state", &self.state)
            .field("groups", &self.group_names())
            .field("actions", &self.actions.keys().collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}

impl Layout {
    /// New layout whose assets live below `factory`'s namespace, nested
    /// under the layout id.
    pub fn new(name: impl Into<String>, options: LayoutOptions, factory: &AssetFactory) -> Self {
        let id = Uuid::new_v4();
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            id,
            name: name.into(),
            state: LayoutState::Initial,
            options,
            groups: Vec::new(),
            actions: BTreeMap::new(),
            public_url: None,
            factory: factory.child(id.simple().to_string()),
            events,
            published: None,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn state(&self) -> LayoutState {
        self.state
    }

    pub fn options(&self) -> &LayoutOptions {
        &self.options
    }

    /// Factory for assets owned by this layout.
    pub fn factory(&self) -> &AssetFactory {
        &self.factory
    }

    pub fn subscribe(&self) -> broadcast::Receiver<LayoutEvent> {
        self.events.subscribe()
    }

    pub fn set_public_url(&mut self, public_url: PublicUrl) {
        self.public_url = Some(public_url);
    }

    pub fn has_public_url(&self) -> bool {
        self.public_url.is_some()
    }

    /// URL `asset` is served from; `/assets/<name>` without a resolver.
    pub fn public_url(&self, asset: &Asset) -> String {
        match &self.public_url {
            Some(resolve) => resolve(asset),
            None => format!("/assets/{}", asset.name),
        }
    }

    pub(crate) fn set_published(&mut self, published: Arc<PublishedAssets>) {
        self.published = Some(published);
    }

    /// Move to `state`, notifying observers. Finishing a preparing pass
    /// publishes the layout's servable assets.
    pub fn change_state(&mut self, state: LayoutState) {
        let from = std::mem::replace(&mut self.state, state);
        debug!(layout_id = %self.id, %from, to = %state, "Layout state changed");
        if from == LayoutState::Preparing
            && state == LayoutState::Ready
            && let Some(published) = self.published.clone()
        {
            published.publish(self);
        }
        self.emit(LayoutEvent::StateChanged {
            layout_id: self.id,
            from,
            to: state,
        });
    }

    fn emit(&self, event: LayoutEvent) {
        // No receivers is fine.
        let _ = self.events.send(event);
    }

    pub fn register_action(&mut self, name: impl Into<String>, action: Arc<dyn Action>) {
        self.actions.insert(name.into(), action);
    }

    pub fn has_action(&self, name: &str) -> bool {
        self.actions.contains_key(name)
    }

    #[instrument(skip(self, options), fields(layout_id = %self.id))]
    pub async fn do_action(
        &mut self,
        action: &str,
        options: ActionOptions,
    ) -> Result<ActionOutcome, LayoutError> {
        let Some(handler) = self.actions.get(action).cloned() else {
            return Err(LayoutError::unknown_action(action));
        };
        handler.run(self, options).await
    }

    /// Register `group`, or replace its strategy when `strategy` is given.
    pub fn register_group(&mut self, group: &str, strategy: Option<Arc<dyn Strategy>>) {
        match self.groups.iter_mut().find(|entry| entry.name == group) {
            Some(entry) => {
                if strategy.is_some() {
                    entry.strategy = strategy;
                }
            }
            None => self.groups.push(AssetGroup {
                name: group.to_string(),
                assets: Vec::new(),
                strategy,
            }),
        }
    }

    /// Remove `group`, evicting every asset it holds.
    pub async fn unregister_group(&mut self, group: &str) -> Result<(), LayoutError> {
        let index = self.group_index(group)?;
        let removed = self.groups.remove(index);
        for asset in &removed.assets {
            asset.destroy().await?;
        }
        debug!(layout_id = %self.id, group, evicted = removed.assets.len(), "Unregistered group");
        Ok(())
    }

    /// Group names in registration order.
    pub fn group_names(&self) -> Vec<&str> {
        self.groups.iter().map(|group| group.name.as_str()).collect()
    }

    pub fn group(&self, group: &str) -> Option<&AssetGroup> {
        self.groups.iter().find(|entry| entry.name == group)
    }

    fn group_index(&self, group: &str) -> Result<usize, LayoutError> {
        self.groups
            .iter()
            .position(|entry| entry.name == group)
            .ok_or_else(|| LayoutError::unknown_group(group))
    }

    fn group_mut(&mut self, group: &str) -> Result<&mut AssetGroup, LayoutError> {
        let index = self.group_index(group)?;
        Ok(&mut self.groups[index])
    }

    /// Append `asset` to `group`, registering the group when missing.
    pub fn add_asset(&mut self, group: &str, mut asset: Asset) {
        if self.group(group).is_none() {
            self.register_group(group, None);
        }
        asset.set_group(group);
        if let Ok(entry) = self.group_mut(group) {
            entry.assets.push(asset);
        }
    }

    pub fn add_assets(&mut self, group: &str, assets: impl IntoIterator<Item = Asset>) {
        if self.group(group).is_none() {
            self.register_group(group, None);
        }
        for asset in assets {
            self.add_asset(group, asset);
        }
    }

    pub fn assets(&self, group: &str) -> Result<&[Asset], LayoutError> {
        self.group(group)
            .map(AssetGroup::assets)
            .ok_or_else(|| LayoutError::unknown_group(group))
    }

    /// First asset in `group` called `name`.
    pub fn asset(&self, group: &str, name: &str) -> Result<Option<&Asset>, LayoutError> {
        Ok(self.assets(group)?.iter().find(|asset| asset.name == name))
    }

    /// Detach the first asset called `name` without evicting it.
    pub fn remove_asset(&mut self, group: &str, name: &str) -> Result<Option<Asset>, LayoutError> {
        let entry = self.group_mut(group)?;
        let Some(index) = entry.assets.iter().position(|asset| asset.name == name) else {
            return Ok(None);
        };
        Ok(Some(entry.assets.remove(index)))
    }

    /// Detach every asset of `group` without evicting them.
    pub fn remove_assets(&mut self, group: &str) -> Result<Vec<Asset>, LayoutError> {
        Ok(std::mem::take(&mut self.group_mut(group)?.assets))
    }

    /// Run `group`'s strategy for the current phase. A group without a
    /// strategy yields its assets unchanged.
    #[instrument(skip(self, options), fields(layout_id = %self.id, phase = %self.state.phase()))]
    pub async fn execute(
        &self,
        group: &str,
        options: &StrategyOptions,
    ) -> Result<Vec<Asset>, LayoutError> {
        let entry = self
            .group(group)
            .ok_or_else(|| LayoutError::unknown_group(group))?;

        self.emit(LayoutEvent::BeforeStrategy {
            layout_id: self.id,
            group: group.to_string(),
            assets: entry.assets.iter().map(AssetSummary::from).collect(),
        });

        let output = match &entry.strategy {
            Some(strategy) => {
                let ctx = StrategyContext {
                    phase: self.state.phase(),
                    group,
                    layout: &self.options,
                    factory: &self.factory,
                };
                strategy.run(&ctx, &entry.assets, options).await?
            }
            None => entry.assets.clone(),
        };

        self.emit(LayoutEvent::AfterStrategy {
            layout_id: self.id,
            group: group.to_string(),
            assets: output.iter().map(AssetSummary::from).collect(),
        });
        Ok(output)
    }

    /// Run the `precompile` action.
    pub async fn precompile(&mut self, options: ActionOptions) -> Result<(), LayoutError> {
        self.do_action(PRECOMPILE, options).await?;
        Ok(())
    }

    /// Render the layout against `context`, precompiling first when the
    /// layout is still `initial`.
    ///
    /// `context` must be a JSON object. It is merged into the content
    /// group's `context` option, overriding keys given there.
    #[instrument(skip_all, fields(layout_id = %self.id, layout = %self.name))]
    pub async fn compile(
        &mut self,
        context: Value,
        options: ActionOptions,
    ) -> Result<String, LayoutError> {
        let Value::Object(context) = context else {
            return Err(LayoutError::InvalidContext);
        };
        if self.state == LayoutState::Initial {
            info!("Precompiling before first compile");
            self.do_action(PRECOMPILE, ActionOptions::new()).await?;
        }
        if self.state != LayoutState::Ready {
            return Err(LayoutError::NotReady { state: self.state });
        }

        let mut options = options;
        options.merge_context(super::builtin::CONTENT, context);
        match self.do_action(COMPILE, options).await? {
            ActionOutcome::Rendered(document) => Ok(document),
            ActionOutcome::Done => Ok(String::new()),
        }
    }

    /// Unregister every group, evicting all assets.
    pub async fn teardown(&mut self) -> Result<(), LayoutError> {
        let names: Vec<String> = self.groups.iter().map(|group| group.name.clone()).collect();
        for name in names {
            self.unregister_group(&name).await?;
        }
        if let Some(published) = &self.published {
            published.unpublish(self.id);
        }
        Ok(())
    }

    pub fn summary(&self) -> Vec<GroupSummary> {
        self.groups
            .iter()
            .map(|group| GroupSummary {
                name: group.name.clone(),
                assets: group.assets.iter().map(AssetSummary::from).collect(),
            })
            .collect()
    }
}

impl Drop for Layout {
    fn drop(&mut self) {
        if let Some(published) = &self.published {
            published.unpublish(self.id);
        }
    }
}
