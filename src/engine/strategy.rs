//! Group strategies and layout actions.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;

use super::asset::{Asset, AssetFactory};
use super::error::LayoutError;
use super::layout::Layout;
use super::options::{ActionOptions, LayoutOptions, StrategyOptions};

/// Lifecycle phase a strategy runs in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Normalization pass; outputs replace the group's assets.
    Preparing,
    /// Rendering pass; outputs are transient.
    Ready,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Preparing => "preparing",
            Self::Ready => "ready",
        })
    }
}

/// Everything a strategy may consult besides its assets and options.
pub struct StrategyContext<'a> {
    pub phase: Phase,
    pub group: &'a str,
    pub layout: &'a LayoutOptions,
    /// Creates synthetic assets inside the layout's namespace.
    pub factory: &'a AssetFactory,
}

/// Collapses a group's assets for one phase.
///
/// Implementations process assets sequentially and must not destroy their
/// inputs; the layout decides what to evict.
#[async_trait]
pub trait Strategy: Send + Sync {
    async fn run(
        &self,
        ctx: &StrategyContext<'_>,
        assets: &[Asset],
        options: &StrategyOptions,
    ) -> Result<Vec<Asset>, LayoutError>;
}

/// What an action produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActionOutcome {
    Done,
    Rendered(String),
}

/// Named lifecycle operation run against a layout.
#[async_trait]
pub trait Action: Send + Sync {
    async fn run(
        &self,
        layout: &mut Layout,
        options: ActionOptions,
    ) -> Result<ActionOutcome, LayoutError>;
}

/// Maps an asset to the URL it is served from.
pub type PublicUrl = Arc<dyn Fn(&Asset) -> String + Send + Sync>;
