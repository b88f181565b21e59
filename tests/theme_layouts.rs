use std::{path::Path, sync::Arc};

use serde_json::json;
use tempfile::TempDir;
use trellis::{
    cache::{CacheStore, MemoryStore, Namespace},
    config::FetchSettings,
    engine::{
        ActionOptions, AssetFactory, LayoutError, LayoutState, Theme, ThemeError, ThemeOptions,
    },
    infra::fetch::HttpFetcher,
};

fn fetch_settings() -> FetchSettings {
    FetchSettings {
        timeout_seconds: std::num::NonZeroU64::new(5).expect("non-zero"),
        user_agent: "trellis-tests".to_string(),
    }
}

fn write(dir: &Path, name: &str, contents: &str) {
    let path = dir.join(name);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).expect("create fixture dir");
    }
    std::fs::write(path, contents).expect("write fixture");
}

fn write_theme(dir: &Path) {
    write(dir, "js/jquery.js", "var jq = 1;");
    write(dir, "js/home.js", "home();");
    write(dir, "js/footer.js", "footer();");
    write(dir, "css/site.css", "body { margin: 0; }");
    write(
        dir,
        "page.hbs",
        "<html><head>{{{styles}}}</head><body><h1>{{title}}</h1>{{{scripts}}}</body></html>",
    );
    write(dir, "public/robots.txt", "User-agent: *");
    write(
        dir,
        "theme.json",
        r#"{
            "layouts": {
                "base": {
                    "scripts": { "before": ["js/jquery.js"], "after": ["js/footer.js"] }
                }
            },
            "templates": {
                "home": {
                    "type": "page",
                    "layout": "base",
                    "scripts": ["js/home.js"],
                    "styles": ["css/site.css"],
                    "content": "page.hbs"
                }
            }
        }"#,
    );
}

async fn open_theme(dir: &Path, store: Arc<MemoryStore>) -> Theme {
    let store: Arc<dyn CacheStore> = store;
    let fetcher = Arc::new(HttpFetcher::new(&fetch_settings()).expect("http client"));
    let factory = AssetFactory::new(store, fetcher, Namespace::parse("it::assets"));
    let options = ThemeOptions {
        static_files: "public".into(),
        ..ThemeOptions::default()
    };
    Theme::open(dir, options, factory).await.expect("theme opens")
}

fn names(theme_layout: &trellis::engine::Layout, group: &str) -> Vec<String> {
    theme_layout
        .assets(group)
        .expect("group exists")
        .iter()
        .map(|asset| asset.name.clone())
        .collect()
}

#[tokio::test]
async fn layout_goes_from_initial_to_ready_and_renders() {
    let dir = TempDir::new().expect("temp dir");
    write_theme(dir.path());
    let store = Arc::new(MemoryStore::new());
    let theme = open_theme(dir.path(), store.clone()).await;

    let mut layout = theme.new_layout("home", None).await.expect("layout builds");
    assert_eq!(layout.state(), LayoutState::Initial);
    assert_eq!(names(&layout, "scripts"), ["jquery.js", "home.js", "footer.js"]);
    assert_eq!(names(&layout, "content"), ["page.hbs.html"]);

    let document = layout
        .compile(json!({ "title": "Welcome" }), ActionOptions::new())
        .await
        .expect("compile succeeds");
    assert_eq!(layout.state(), LayoutState::Ready);
    assert!(document.contains("<h1>Welcome</h1>"));
    assert!(document.contains("rel=\"stylesheet\""));

    let jquery = document.find("jquery.js").expect("jquery tag");
    let home = document.find("home.js").expect("home tag");
    let footer = document.find("footer.js").expect("footer tag");
    assert!(jquery < home && home < footer);
}

#[tokio::test]
async fn repeated_compiles_are_stable() {
    let dir = TempDir::new().expect("temp dir");
    write_theme(dir.path());
    let store = Arc::new(MemoryStore::new());
    let theme = open_theme(dir.path(), store.clone()).await;
    let mut layout = theme.new_layout("home", None).await.expect("layout builds");

    let first = layout
        .compile(json!({ "title": "Same" }), ActionOptions::new())
        .await
        .expect("first compile");
    let entries = store.len();
    let second = layout
        .compile(json!({ "title": "Same" }), ActionOptions::new())
        .await
        .expect("second compile");

    assert_eq!(first, second);
    assert_eq!(store.len(), entries);
}

#[tokio::test]
async fn compile_rejects_non_object_context() {
    let dir = TempDir::new().expect("temp dir");
    write_theme(dir.path());
    let theme = open_theme(dir.path(), Arc::new(MemoryStore::new())).await;
    let mut layout = theme.new_layout("home", None).await.expect("layout builds");

    let err = layout
        .compile(json!(["not", "an", "object"]), ActionOptions::new())
        .await
        .expect_err("array context rejected");
    assert!(matches!(err, LayoutError::InvalidContext));
}

#[tokio::test]
async fn layouts_own_disjoint_cache_keys() {
    let dir = TempDir::new().expect("temp dir");
    write_theme(dir.path());
    let store = Arc::new(MemoryStore::new());
    let theme = open_theme(dir.path(), store.clone()).await;

    let mut first = theme.new_layout("home", None).await.expect("first layout");
    let second = theme.new_layout("home", None).await.expect("second layout");
    let first_id = first.id().simple().to_string();
    let second_id = second.id().simple().to_string();

    let keys = store.keys();
    assert!(keys.iter().any(|key| key.contains(&first_id)));
    assert!(keys.iter().any(|key| key.contains(&second_id)));
    assert!(!keys.iter().any(|key| key.contains(&first_id) && key.contains(&second_id)));

    first.teardown().await.expect("teardown");
    let keys = store.keys();
    assert!(!keys.iter().any(|key| key.contains(&first_id)));
    assert!(keys.iter().any(|key| key.contains(&second_id)));
}

#[tokio::test]
async fn published_scripts_are_served_by_route() {
    let dir = TempDir::new().expect("temp dir");
    write_theme(dir.path());
    let theme = open_theme(dir.path(), Arc::new(MemoryStore::new())).await;
    let mut layout = theme.new_layout("home", None).await.expect("layout builds");
    layout.precompile(ActionOptions::new()).await.expect("precompile");

    let route = format!("/assets/{}/scripts/home.js", layout.id().simple());
    let served = theme
        .resolve_public_asset(&route)
        .await
        .expect("resolve")
        .expect("published script");
    assert_eq!(served.body.as_ref(), b"home();");
    assert!(served.content_type.ends_with("javascript"));

    layout.teardown().await.expect("teardown");
    let gone = theme
        .resolve_public_asset(&route)
        .await
        .expect("resolve after teardown");
    assert!(gone.is_none());
}

#[tokio::test]
async fn static_files_fall_back_to_the_static_root() {
    let dir = TempDir::new().expect("temp dir");
    write_theme(dir.path());
    let store = Arc::new(MemoryStore::new());
    let theme = open_theme(dir.path(), store.clone()).await;

    let served = theme
        .resolve_public_asset("/robots.txt")
        .await
        .expect("resolve")
        .expect("static file");
    assert_eq!(served.body.as_ref(), b"User-agent: *");
    assert!(store.is_empty());
    assert!(theme.resolve_public_asset("/../theme.json").await.expect("resolve").is_none());
}

#[tokio::test]
async fn layout_by_type_falls_back_to_a_scan() {
    let dir = TempDir::new().expect("temp dir");
    write_theme(dir.path());
    let theme = open_theme(dir.path(), Arc::new(MemoryStore::new())).await;

    let layout = theme
        .new_layout_by_type("page", Some("missing"), None)
        .await
        .expect("lookup succeeds")
        .expect("page template found");
    assert_eq!(layout.name(), "home");

    assert!(
        theme
            .new_layout_by_type("feed", None, None)
            .await
            .expect("lookup succeeds")
            .is_none()
    );
    let err = theme.new_layout("missing", None).await.expect_err("unknown template");
    assert!(matches!(err, ThemeError::TemplateNotFound { .. }));
}

fn write_concat_theme(dir: &Path) {
    write(dir, "a.js", "alpha();");
    write(dir, "b.js", "beta();");
    write(
        dir,
        "theme.json",
        r#"{
            "layouts": { "base": { "scripts": { "before": [], "after": [] } } },
            "templates": {
                "single": { "layout": "base", "scripts": ["a.js"] },
                "pair": { "layout": "base", "scripts": ["a.js", "b.js"] }
            }
        }"#,
    );
}

async fn open_concat_theme(dir: &Path, store: Arc<MemoryStore>) -> Theme {
    let store: Arc<dyn CacheStore> = store;
    let fetcher = Arc::new(HttpFetcher::new(&fetch_settings()).expect("http client"));
    let factory = AssetFactory::new(store, fetcher, Namespace::parse("it::assets"));
    let options = ThemeOptions {
        concat: true,
        ..ThemeOptions::default()
    };
    Theme::open(dir, options, factory).await.expect("theme opens")
}

#[tokio::test]
async fn single_script_is_concatenated_into_a_fresh_asset() {
    let dir = TempDir::new().expect("temp dir");
    write_concat_theme(dir.path());
    let store = Arc::new(MemoryStore::new());
    let theme = open_concat_theme(dir.path(), store.clone()).await;

    let mut layout = theme.new_layout("single", None).await.expect("layout builds");
    assert_eq!(names(&layout, "scripts"), ["a.js"]);
    let original = layout.assets("scripts").expect("scripts")[0].clone();
    let original_key = original.cache_key().expect("cached asset");
    assert!(store.contains(&original_key));

    layout.precompile(ActionOptions::new()).await.expect("precompile");

    let scripts = layout.assets("scripts").expect("scripts");
    assert_eq!(scripts.len(), 1);
    assert_ne!(scripts[0].id(), original.id());
    assert_eq!(scripts[0].to_text().await.expect("read"), "alpha();");
    assert!(!store.contains(&original_key));
}

#[tokio::test]
async fn script_runs_collapse_into_their_ordered_concatenation() {
    let dir = TempDir::new().expect("temp dir");
    write_concat_theme(dir.path());
    let store = Arc::new(MemoryStore::new());
    let theme = open_concat_theme(dir.path(), store.clone()).await;

    let mut layout = theme.new_layout("pair", None).await.expect("layout builds");
    assert_eq!(names(&layout, "scripts"), ["a.js", "b.js"]);
    let originals: Vec<_> = layout
        .assets("scripts")
        .expect("scripts")
        .iter()
        .map(|asset| asset.cache_key().expect("cached asset"))
        .collect();

    layout.precompile(ActionOptions::new()).await.expect("precompile");

    let scripts = layout.assets("scripts").expect("scripts");
    assert_eq!(scripts.len(), 1);
    assert_eq!(scripts[0].to_text().await.expect("read"), "alpha();beta();");
    assert!(scripts[0].name.ends_with(".js"));
    assert!(originals.iter().all(|key| !store.contains(key)));
}

#[tokio::test]
async fn dropping_a_layout_withdraws_its_routes() {
    let dir = TempDir::new().expect("temp dir");
    write_theme(dir.path());
    let theme = open_theme(dir.path(), Arc::new(MemoryStore::new())).await;
    let mut layout = theme.new_layout("home", None).await.expect("layout builds");
    layout.precompile(ActionOptions::new()).await.expect("precompile");

    let route = format!("/assets/{}/scripts/home.js", layout.id().simple());
    assert!(theme.resolve_public_asset(&route).await.expect("resolve").is_some());

    drop(layout);
    let gone = theme.resolve_public_asset(&route).await.expect("resolve after drop");
    assert!(gone.is_none());
}
