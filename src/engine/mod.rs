//! Theme asset compilation engine.
//!
//! A [`Theme`] reads declarative template and layout configuration, turns
//! asset declarations into cached [`Asset`]s and assembles them into
//! [`Layout`]s. A layout is precompiled once (concatenating and evicting
//! intermediate assets) and then compiled any number of times against
//! different rendering contexts.

pub mod asset;
pub mod builtin;
pub mod concat;
pub mod config;
pub mod error;
pub mod html;
pub mod layout;
pub mod minify;
pub mod options;
pub mod pool;
pub mod published;
pub mod strategy;
pub mod template;
pub mod theme;
pub mod types;

#[cfg(test)]
mod testing;

pub use asset::{Asset, AssetFactory, AssetSource, AssetSpec, RemoteFetch};
pub use error::{AssetError, LayoutError, ThemeError};
pub use layout::{Layout, LayoutEvent, LayoutState};
pub use options::{ActionOptions, AssetOptions, LayoutOptions, StrategyOptions, ThemeOptions};
pub use pool::{LayoutPool, RenderRequest};
pub use published::PublishedAssets;
pub use strategy::{Action, ActionOutcome, Phase, Strategy, StrategyContext};
pub use template::{CompiledTemplate, Template, TemplateError};
pub use theme::{ServedAsset, Theme, ThemeEvent};
pub use types::{AssetTypes, Prefilter, PrefilterContext};
