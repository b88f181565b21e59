//! Long-lived layouts shared across requests.
//!
//! One layout is kept per `(type, template)` pair. Each sits behind its own
//! async mutex so precompile and compile of the same layout never interleave,
//! while different layouts render concurrently.

use std::sync::Arc;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use serde_json::Value;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::cache::DocumentCache;

use super::error::{LayoutError, ThemeError};
use super::layout::Layout;
use super::options::ActionOptions;
use super::theme::Theme;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct PoolKey {
    layout_type: String,
    template: Option<String>,
}

/// One render call.
#[derive(Debug, Clone, Default)]
pub struct RenderRequest {
    pub layout_type: String,
    pub template: Option<String>,
    pub context: Value,
    pub options: ActionOptions,
    /// Caches the document under this route when a document cache is set.
    pub route: Option<String>,
}

pub struct LayoutPool {
    theme: Arc<Theme>,
    layouts: DashMap<PoolKey, Arc<Mutex<Layout>>>,
    documents: Option<DocumentCache>,
}

impl LayoutPool {
    pub fn new(theme: Arc<Theme>, documents: Option<DocumentCache>) -> Self {
        Self {
            theme,
            layouts: DashMap::new(),
            documents,
        }
    }

    pub fn theme(&self) -> &Arc<Theme> {
        &self.theme
    }

    pub fn len(&self) -> usize {
        self.layouts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.layouts.is_empty()
    }

    /// Shared layout for `(layout_type, template)`, built and precompiled on
    /// first use. `None` when the theme has no matching template.
    pub async fn layout(
        &self,
        layout_type: &str,
        template: Option<&str>,
    ) -> Result<Option<Arc<Mutex<Layout>>>, ThemeError> {
        let key = PoolKey {
            layout_type: layout_type.to_string(),
            template: template.map(str::to_string),
        };
        if let Some(existing) = self.layouts.get(&key) {
            return Ok(Some(existing.clone()));
        }

        let Some(mut layout) = self
            .theme
            .new_layout_by_type(layout_type, template, None)
            .await?
        else {
            return Ok(None);
        };
        if let Err(err) = layout.precompile(ActionOptions::new()).await {
            release(&mut layout).await;
            return Err(err.into());
        }

        let (handle, lost) = match self.layouts.entry(key) {
            Entry::Occupied(occupied) => (occupied.get().clone(), Some(layout)),
            Entry::Vacant(vacant) => {
                debug!(layout_id = %layout.id(), layout_type, "Pooled new layout");
                let handle = Arc::new(Mutex::new(layout));
                vacant.insert(handle.clone());
                (handle, None)
            }
        };
        if let Some(mut lost) = lost {
            release(&mut lost).await;
        }
        Ok(Some(handle))
    }

    /// Render a document, serving and filling the document cache when the
    /// request names a route. `None` when no layout matches.
    pub async fn render(&self, request: RenderRequest) -> Result<Option<String>, ThemeError> {
        let cache = self.documents.as_ref().zip(request.route.as_deref());
        if let Some((documents, route)) = cache
            && let Some(document) = documents.get(route).await?
        {
            return Ok(Some(document));
        }

        let Some(layout) = self
            .layout(&request.layout_type, request.template.as_deref())
            .await?
        else {
            return Ok(None);
        };
        let document = {
            let mut layout = layout.lock().await;
            layout.compile(request.context, request.options).await?
        };

        if let Some((documents, route)) = cache {
            documents.put(route, &document).await?;
        }
        Ok(Some(document))
    }

    /// Drop the pooled layout, evicting all of its assets.
    pub async fn evict(&self, layout_type: &str, template: Option<&str>) -> Result<bool, LayoutError> {
        let key = PoolKey {
            layout_type: layout_type.to_string(),
            template: template.map(str::to_string),
        };
        let Some((_, handle)) = self.layouts.remove(&key) else {
            return Ok(false);
        };
        handle.lock().await.teardown().await?;
        Ok(true)
    }
}

async fn release(layout: &mut Layout) {
    if let Err(err) = layout.teardown().await {
        warn!(layout_id = %layout.id(), error = %err, "Failed to release layout assets");
    }
}
