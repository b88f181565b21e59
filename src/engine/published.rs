//! Index of precompiled assets that can be served by route.

use dashmap::DashMap;
use tracing::debug;
use uuid::Uuid;

use super::asset::Asset;
use super::layout::Layout;

/// Groups whose assets are published, with the asset types served from each.
const PUBLISHED_GROUPS: &[(&str, &[&str])] =
    &[("scripts", &["javascript"]), ("styles", &["css"])];

#[derive(Debug, Clone)]
pub struct PublishedAsset {
    pub layout_id: Uuid,
    pub asset: Asset,
    pub content_type: String,
}

/// Route of a published asset relative to `/assets/`.
pub fn asset_route(layout_id: Uuid, group: &str, name: &str) -> String {
    format!("{}/{group}/{name}", layout_id.simple())
}

#[derive(Debug, Default)]
pub struct PublishedAssets {
    entries: DashMap<String, PublishedAsset>,
}

impl PublishedAssets {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace every entry of `layout` with its current script and style
    /// assets.
    pub fn publish(&self, layout: &Layout) {
        self.unpublish(layout.id());
        let mut published = 0usize;
        for (group, types) in PUBLISHED_GROUPS {
            let Ok(assets) = layout.assets(group) else {
                continue;
            };
            for asset in assets
                .iter()
                .filter(|asset| types.contains(&asset.asset_type.as_str()))
            {
                let content_type = mime_guess::from_path(&asset.name)
                    .first_or_octet_stream()
                    .to_string();
                self.entries.insert(
                    asset_route(layout.id(), group, &asset.name),
                    PublishedAsset {
                        layout_id: layout.id(),
                        asset: asset.clone(),
                        content_type,
                    },
                );
                published += 1;
            }
        }
        debug!(layout_id = %layout.id(), published, "Published layout assets");
    }

    pub fn unpublish(&self, layout_id: Uuid) {
        self.entries.retain(|_, entry| entry.layout_id != layout_id);
    }

    /// Look up `route`, with or without a leading `/assets/`.
    pub fn get(&self, route: &str) -> Option<PublishedAsset> {
        let route = route.trim_start_matches('/');
        let route = route.strip_prefix("assets/").unwrap_or(route);
        self.entries.get(route).map(|entry| entry.value().clone())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::super::testing::factory;
    use super::*;
    use crate::engine::asset::AssetSpec;
    use crate::engine::layout::LayoutState;
    use crate::engine::options::LayoutOptions;

    #[tokio::test]
    async fn finishing_precompile_publishes_scripts_and_styles() {
        let published = Arc::new(PublishedAssets::new());
        let mut layout = Layout::new("page", LayoutOptions::default(), &factory());
        layout.set_published(published.clone());

        let js = layout
            .factory()
            .create(AssetSpec::content("x").named("app.js").typed("javascript"))
            .await
            .unwrap();
        let txt = layout
            .factory()
            .create(AssetSpec::content("x").named("notes.txt"))
            .await
            .unwrap();
        layout.add_asset("scripts", js);
        layout.add_asset("scripts", txt);

        layout.change_state(LayoutState::Preparing);
        assert!(published.is_empty());
        layout.change_state(LayoutState::Ready);

        let route = format!("/assets/{}", asset_route(layout.id(), "scripts", "app.js"));
        let entry = published.get(&route).expect("published");
        assert_eq!(entry.asset.name, "app.js");
        assert!(entry.content_type.ends_with("javascript"));
        assert_eq!(published.len(), 1);

        published.unpublish(layout.id());
        assert!(published.is_empty());
    }
}
