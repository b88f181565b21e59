use std::{net::SocketAddr, num::NonZeroU64, path::Path, sync::Arc};

use axum::{Router, http::StatusCode, routing::get};
use serde_json::json;
use tempfile::TempDir;
use tokio::net::TcpListener;
use trellis::{
    cache::{CacheStore, MemoryStore, Namespace},
    config::FetchSettings,
    engine::{ActionOptions, AssetError, AssetFactory, Theme, ThemeError, ThemeOptions},
    infra::fetch::HttpFetcher,
};

async fn spawn_server() -> SocketAddr {
    let app = Router::new()
        .route("/lib/remote.js", get(|| async { "remote();" }))
        .route("/lib/broken.js", get(|| async { StatusCode::INTERNAL_SERVER_ERROR }));
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("local addr");
    tokio::spawn(async move {
        axum::serve(listener, app).await.expect("server runs");
    });
    addr
}

async fn open_theme(dir: &Path, scripts: serde_json::Value, store: Arc<MemoryStore>) -> Theme {
    std::fs::write(dir.join("page.hbs"), "<body>{{{scripts}}}</body>").expect("page");
    let config = json!({
        "templates": {
            "home": { "type": "page", "scripts": scripts, "content": "page.hbs" }
        }
    });
    std::fs::write(dir.join("theme.json"), config.to_string()).expect("theme.json");

    let settings = FetchSettings {
        timeout_seconds: NonZeroU64::new(5).expect("non-zero"),
        user_agent: "trellis-tests".to_string(),
    };
    let fetcher = Arc::new(HttpFetcher::new(&settings).expect("http client"));
    let store: Arc<dyn CacheStore> = store;
    let factory = AssetFactory::new(store, fetcher, Namespace::parse("it::remote"));
    Theme::open(dir, ThemeOptions::default(), factory)
        .await
        .expect("theme opens")
}

#[tokio::test]
async fn remote_scripts_are_fetched_and_cached() {
    let addr = spawn_server().await;
    let dir = TempDir::new().expect("temp dir");
    let store = Arc::new(MemoryStore::new());
    let url = format!("http://{addr}/lib/remote.js");
    let theme = open_theme(dir.path(), json!([url]), store.clone()).await;

    let mut layout = theme.new_layout("home", None).await.expect("layout builds");
    let scripts = layout.assets("scripts").expect("scripts group");
    assert_eq!(scripts.len(), 1);
    assert_eq!(scripts[0].name, "remote.js");
    assert_eq!(scripts[0].asset_type, "javascript");
    assert_eq!(scripts[0].to_text().await.expect("cached text"), "remote();");

    let document = layout
        .compile(json!({}), ActionOptions::new())
        .await
        .expect("compile");
    assert!(document.contains("remote.js"));
    assert!(!store.is_empty());
}

#[tokio::test]
async fn failed_remote_fetch_leaves_no_cache_entries() {
    let addr = spawn_server().await;
    let dir = TempDir::new().expect("temp dir");
    let store = Arc::new(MemoryStore::new());
    let scripts = json!([
        format!("http://{addr}/lib/remote.js"),
        format!("http://{addr}/lib/missing.js"),
    ]);
    let theme = open_theme(dir.path(), scripts, store.clone()).await;

    let err = theme
        .new_layout("home", None)
        .await
        .expect_err("missing script fails the layout");
    match err {
        ThemeError::Asset(AssetError::RemoteFetch { status, .. }) => assert_eq!(status, Some(404)),
        other => panic!("unexpected error: {other}"),
    }
    assert!(store.is_empty());
}

#[tokio::test]
async fn server_errors_surface_their_status() {
    let addr = spawn_server().await;
    let dir = TempDir::new().expect("temp dir");
    let store = Arc::new(MemoryStore::new());
    let theme = open_theme(
        dir.path(),
        json!([format!("http://{addr}/lib/broken.js")]),
        store.clone(),
    )
    .await;

    let err = theme.new_layout("home", None).await.expect_err("broken script");
    assert!(matches!(
        err,
        ThemeError::Asset(AssetError::RemoteFetch { status: Some(500), .. })
    ));
    assert!(store.is_empty());
}
