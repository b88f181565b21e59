//! HTML fragments referencing or embedding assets.

use super::asset::Asset;
use super::error::AssetError;

/// How one group renders into a fragment. `{src}` and `{content}` are the
/// placeholders substituted per asset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HtmlFormat {
    pub src_format: &'static str,
    pub embed_format: &'static str,
}

pub const STYLESHEET: HtmlFormat = HtmlFormat {
    src_format: "<link rel=\"stylesheet\" href=\"{src}\" type=\"text/css\"/>\n",
    embed_format: "<style type=\"text/css\">\n{content}\n</style>\n",
};

pub const SCRIPT: HtmlFormat = HtmlFormat {
    src_format: "<script src=\"{src}\" type=\"text/javascript\"></script>\n",
    embed_format: "<script type=\"text/javascript\">\n{content}\n</script>\n",
};

/// Render `assets` in order. With `embed`, non-static assets that have
/// content are inlined; everything else is referenced by URL. Static assets
/// and unnamed assets are referenced by their file.
pub async fn asset_html(
    assets: &[Asset],
    format: HtmlFormat,
    embed: bool,
    public_url: &(dyn Fn(&Asset) -> String + Send + Sync),
) -> Result<String, AssetError> {
    let mut html = String::new();
    for asset in assets {
        if embed && !asset.is_static() {
            let content = asset.to_text().await?;
            if !content.is_empty() {
                html.push_str(&format.embed_format.replace("{content}", &content));
                continue;
            }
        }
        let src = if asset.is_static() || asset.name.is_empty() {
            asset.file.clone().unwrap_or_default()
        } else {
            public_url(asset)
        };
        html.push_str(&format.src_format.replace("{src}", &src));
    }
    Ok(html)
}

#[cfg(test)]
mod tests {
    use super::super::testing::factory;
    use super::*;
    use crate::engine::asset::{AssetSpec, STATIC_TYPE};

    fn url(asset: &Asset) -> String {
        format!("/assets/{}", asset.name)
    }

    #[tokio::test]
    async fn references_named_assets_through_public_url() {
        let factory = factory();
        let local = factory.create(AssetSpec::content("x").named("app.js")).await.unwrap();
        let cdn = factory
            .create(AssetSpec::file("https://cdn.example/lib.js").typed(STATIC_TYPE))
            .await
            .unwrap();

        let html = asset_html(&[local, cdn], SCRIPT, false, &url).await.unwrap();
        assert_eq!(
            html,
            "<script src=\"/assets/app.js\" type=\"text/javascript\"></script>\n\
             <script src=\"https://cdn.example/lib.js\" type=\"text/javascript\"></script>\n"
        );
    }

    #[tokio::test]
    async fn embeds_content_when_asked() {
        let factory = factory();
        let css = factory.create(AssetSpec::content("p{}").named("a.css")).await.unwrap();
        let html = asset_html(&[css], STYLESHEET, true, &url).await.unwrap();
        assert_eq!(html, "<style type=\"text/css\">\np{}\n</style>\n");
    }
}
