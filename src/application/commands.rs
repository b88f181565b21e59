//! Command handlers behind the CLI.

use std::{path::Path, sync::Arc, time::Instant};

use bytes::Bytes;
use serde::Serialize;
use serde_json::{Map, Value};
use tracing::{info, instrument};
use uuid::Uuid;

use crate::{
    application::error::AppError,
    cache::{CacheStore, DocumentCache, MemoryStore},
    config::{RenderArgs, Settings},
    engine::{
        ActionOptions, AssetFactory, LayoutPool, LayoutState, RemoteFetch, RenderRequest, Theme,
        layout::GroupSummary,
    },
    infra::fetch::HttpFetcher,
};

const DOCUMENTS_SEGMENT: &str = "documents";

/// Theme plus the pooled layouts rendered from it.
pub struct Runtime {
    pool: LayoutPool,
}

/// Output of `inspect`.
#[derive(Debug, Serialize)]
pub struct InspectReport {
    pub layout_id: Uuid,
    pub template: String,
    pub state: LayoutState,
    pub groups: Vec<GroupSummary>,
}

impl Runtime {
    /// Open the configured theme over an in-memory store and HTTP fetcher.
    pub async fn from_settings(settings: &Settings) -> Result<Self, AppError> {
        let fetcher: Arc<dyn RemoteFetch> = Arc::new(HttpFetcher::new(&settings.fetch)?);
        let store: Arc<dyn CacheStore> = Arc::new(MemoryStore::new());
        Self::open(settings, store, fetcher).await
    }

    pub async fn open(
        settings: &Settings,
        store: Arc<dyn CacheStore>,
        fetcher: Arc<dyn RemoteFetch>,
    ) -> Result<Self, AppError> {
        let factory = AssetFactory::new(store.clone(), fetcher, settings.cache.namespace.clone());
        let theme = Theme::open(
            &settings.theme.location,
            settings.theme.options.clone(),
            factory,
        )
        .await?;
        let documents = DocumentCache::new(
            store,
            settings.cache.namespace.child(DOCUMENTS_SEGMENT),
            settings.cache.document_ttl,
        );
        Ok(Self {
            pool: LayoutPool::new(Arc::new(theme), Some(documents)),
        })
    }

    pub fn theme(&self) -> &Arc<Theme> {
        self.pool.theme()
    }

    pub fn pool(&self) -> &LayoutPool {
        &self.pool
    }

    #[instrument(skip_all, fields(layout_type = %args.layout_type))]
    pub async fn render(&self, args: &RenderArgs) -> Result<String, AppError> {
        let started = Instant::now();
        let context = match args.context.as_deref() {
            Some(path) => read_context(path).await?,
            None => Value::Object(Map::new()),
        };

        let request = RenderRequest {
            layout_type: args.layout_type.clone(),
            template: args.template.clone(),
            context,
            options: ActionOptions::new(),
            route: args.route.clone(),
        };
        let document = self
            .pool
            .render(request)
            .await?
            .ok_or_else(|| AppError::not_found(format!("layout of type `{}`", args.layout_type)))?;

        info!(
            op = "render",
            result = "ok",
            bytes = document.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Rendered document"
        );
        Ok(document)
    }

    /// Precompile `template` and describe the resulting groups. The layout is
    /// torn down afterwards.
    #[instrument(skip(self))]
    pub async fn inspect(&self, template: &str) -> Result<InspectReport, AppError> {
        let mut layout = self.theme().new_layout(template, None).await?;
        if let Err(err) = layout.precompile(ActionOptions::new()).await {
            layout.teardown().await?;
            return Err(err.into());
        }

        let report = InspectReport {
            layout_id: layout.id(),
            template: template.to_string(),
            state: layout.state(),
            groups: layout.summary(),
        };
        layout.teardown().await?;
        Ok(report)
    }

    #[instrument(skip(self))]
    pub async fn asset(&self, route: &str) -> Result<(String, Bytes), AppError> {
        let served = self
            .theme()
            .resolve_public_asset(route)
            .await?
            .ok_or_else(|| AppError::not_found(format!("asset `{route}`")))?;
        info!(
            op = "asset",
            result = "ok",
            content_type = %served.content_type,
            bytes = served.body.len(),
            "Resolved asset"
        );
        Ok((served.content_type, served.body))
    }
}

async fn read_context(path: &Path) -> Result<Value, AppError> {
    let raw = tokio::fs::read(path).await?;
    Ok(serde_json::from_slice(&raw)?)
}
