use std::path::Path;

use tracing::trace;

use crate::cache::digest_hex;

use super::asset::Asset;
use super::error::AssetError;

/// Concatenate runs of concatenable assets, preserving order.
///
/// Every output is a fresh duplicate, so the inputs stay untouched. Static
/// assets and assets with `concat: false` end the current run and pass
/// through on their own. A run that absorbs a second asset is renamed after
/// a digest of the last absorbed name, keeping its extension.
pub async fn concat(assets: &[Asset]) -> Result<Vec<Asset>, AssetError> {
    let mut out = Vec::with_capacity(assets.len());
    let mut current: Option<Asset> = None;

    for asset in assets {
        let concatenable = !asset.is_static() && asset.options.concat.unwrap_or(true);
        if !concatenable {
            if let Some(run) = current.take() {
                out.push(run);
            }
            out.push(asset.duplicate().await?);
            continue;
        }

        match current.as_mut() {
            None => current = Some(asset.duplicate().await?),
            Some(run) => {
                let name = merged_name(&asset.name);
                trace!(from = %asset.name, into = %name, "Concatenating asset");
                run.name = name.clone();
                run.file = Some(name);
                run.append(asset.to_bytes().await?).await?;
            }
        }
    }

    if let Some(run) = current {
        out.push(run);
    }
    Ok(out)
}

fn merged_name(name: &str) -> String {
    let digest = digest_hex(name);
    let stem = &digest[..32];
    match Path::new(name).extension() {
        Some(extension) => format!("{stem}.{}", extension.to_string_lossy()),
        None => stem.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::super::testing::factory_with_store;
    use super::*;
    use crate::cache::MemoryStore;
    use crate::engine::asset::{AssetSpec, STATIC_TYPE};
    use crate::engine::options::AssetOptions;
    use std::sync::Arc;

    #[tokio::test]
    async fn runs_are_joined_in_order() {
        let store = Arc::new(MemoryStore::new());
        let factory = factory_with_store(store.clone());
        let a = factory.create(AssetSpec::content("a;").named("a.js")).await.unwrap();
        let b = factory.create(AssetSpec::content("b;").named("b.js")).await.unwrap();
        let c = factory.create(AssetSpec::content("c;").named("c.js")).await.unwrap();

        let out = concat(&[a.clone(), b, c]).await.unwrap();
        assert_eq!(out.len(), 1);
        assert_ne!(out[0].id(), a.id());
        assert_eq!(out[0].to_text().await.unwrap(), "a;b;c;");
        assert!(out[0].name.ends_with(".js"));
        assert_eq!(out[0].name.len(), 35);
        assert_eq!(store.len(), 4);
    }

    #[tokio::test]
    async fn standalone_assets_split_runs() {
        let factory = factory_with_store(Arc::new(MemoryStore::new()));
        let a = factory.create(AssetSpec::content("a").named("a.js")).await.unwrap();
        let solo = factory
            .create(AssetSpec::content("s").named("s.js").with_options(AssetOptions {
                concat: Some(false),
                ..AssetOptions::default()
            }))
            .await
            .unwrap();
        let cdn = factory
            .create(AssetSpec::file("https://cdn.example/x.js").typed(STATIC_TYPE))
            .await
            .unwrap();
        let b = factory.create(AssetSpec::content("b").named("b.js")).await.unwrap();
        let c = factory.create(AssetSpec::content("c").named("c.js")).await.unwrap();

        let out = concat(&[a, solo, cdn, b, c]).await.unwrap();
        let names: Vec<&str> = out.iter().map(|asset| asset.name.as_str()).collect();
        assert_eq!(names.len(), 4);
        assert_eq!(names[0], "a.js");
        assert_eq!(names[1], "s.js");
        assert_eq!(names[2], "x.js");
        assert_eq!(out[3].to_text().await.unwrap(), "bc");
    }

    #[test]
    fn merged_names_are_stable() {
        assert_eq!(merged_name("b.css"), merged_name("b.css"));
        assert!(merged_name("noext").len() == 32);
    }
}
