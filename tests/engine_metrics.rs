use std::{collections::HashSet, num::NonZeroU64, sync::Arc};

use axum::Router;
use metrics_util::debugging::DebuggingRecorder;
use serde_json::json;
use tempfile::TempDir;
use tokio::net::TcpListener;
use trellis::{
    cache::{CacheStore, MemoryStore, Namespace},
    config::FetchSettings,
    engine::{ActionOptions, AssetFactory, Theme, ThemeOptions},
    infra::fetch::HttpFetcher,
};

#[tokio::test]
async fn engine_paths_emit_expected_metric_keys() {
    let recorder = DebuggingRecorder::new();
    let snapshotter = recorder.snapshotter();
    recorder
        .install()
        .expect("debug metrics recorder should install in this test process");

    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("local addr");
    tokio::spawn(async move {
        axum::serve(listener, Router::new()).await.expect("server runs");
    });

    let dir = TempDir::new().expect("temp dir");
    std::fs::write(dir.path().join("app.js"), "app();").expect("script");
    std::fs::write(dir.path().join("page.hbs"), "<p>{{title}}</p>").expect("page");
    std::fs::write(
        dir.path().join("theme.json"),
        json!({
            "templates": {
                "home": { "type": "page", "scripts": ["app.js"], "content": "page.hbs" },
                "remote": { "type": "feed", "scripts": [format!("http://{addr}/gone.js")] }
            }
        })
        .to_string(),
    )
    .expect("theme.json");

    let settings = FetchSettings {
        timeout_seconds: NonZeroU64::new(5).expect("non-zero"),
        user_agent: "trellis-tests".to_string(),
    };
    let store: Arc<dyn CacheStore> = Arc::new(MemoryStore::new());
    let fetcher = Arc::new(HttpFetcher::new(&settings).expect("http client"));
    let factory = AssetFactory::new(store, fetcher, Namespace::parse("it::metrics"));
    let theme = Theme::open(dir.path(), ThemeOptions::default(), factory)
        .await
        .expect("theme opens");

    let mut layout = theme.new_layout("home", None).await.expect("layout builds");
    layout
        .compile(json!({ "title": "metrics" }), ActionOptions::new())
        .await
        .expect("compile");
    let script = layout.assets("scripts").expect("scripts")[0].clone();
    layout.teardown().await.expect("teardown");
    assert!(script.to_bytes().await.expect("read after destroy").is_empty());

    assert!(theme.new_layout("remote", None).await.is_err());

    let names: HashSet<String> = snapshotter
        .snapshot()
        .into_vec()
        .into_iter()
        .map(|(composite_key, _, _, _)| composite_key.key().name().to_string())
        .collect();

    let expected = [
        "trellis_cache_hit_total",
        "trellis_cache_miss_total",
        "trellis_asset_evicted_total",
        "trellis_layout_precompile_ms",
        "trellis_layout_compile_ms",
        "trellis_remote_fetch_total",
    ];

    for metric in expected {
        assert!(names.contains(metric), "missing metric: {metric}");
    }
}
