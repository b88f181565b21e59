use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::cache::{CacheError, CacheKey};

use super::layout::LayoutState;
use super::template::TemplateError;

/// Boxed error returned by custom strategies, actions and prefilters.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

#[derive(Debug, Error)]
pub enum AssetError {
    #[error("invalid asset declaration: {reason}")]
    Invalid { reason: String },
    #[error("asset source `{}` is unreadable: {source}", path.display())]
    Source {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("remote asset `{url}` could not be retrieved: {message}")]
    RemoteFetch {
        url: String,
        status: Option<u16>,
        message: String,
    },
    #[error("asset `{name}` has no cache location")]
    NoLocation { name: String },
    #[error("cached content under `{key}` is not valid base64")]
    Corrupt {
        key: CacheKey,
        #[source]
        source: base64::DecodeError,
    },
    #[error(transparent)]
    Template(#[from] TemplateError),
    #[error("prefilter for `{asset_type}` failed: {source}")]
    Prefilter {
        asset_type: String,
        #[source]
        source: BoxError,
    },
    #[error(transparent)]
    Cache(#[from] CacheError),
}

impl AssetError {
    pub fn invalid(reason: impl Into<String>) -> Self {
        Self::Invalid {
            reason: reason.into(),
        }
    }

    pub fn unreadable(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Source {
            path: path.into(),
            source,
        }
    }

    pub fn remote_status(url: impl Into<String>, status: u16) -> Self {
        Self::RemoteFetch {
            url: url.into(),
            status: Some(status),
            message: format!("status code {status}"),
        }
    }

    pub fn remote_transport(url: impl Into<String>, message: impl Into<String>) -> Self {
        Self::RemoteFetch {
            url: url.into(),
            status: None,
            message: message.into(),
        }
    }
}

#[derive(Debug, Error)]
pub enum LayoutError {
    #[error("no asset group named `{group}`")]
    UnknownGroup { group: String },
    #[error("no action named `{action}`")]
    UnknownAction { action: String },
    #[error("layout is `{state}`; compile requires `ready`")]
    NotReady { state: LayoutState },
    #[error("compile context must be a JSON object")]
    InvalidContext,
    #[error("invalid options for group `{group}`: {reason}")]
    InvalidOptions { group: String, reason: String },
    #[error(transparent)]
    Asset(#[from] AssetError),
    #[error(transparent)]
    Custom(BoxError),
}

impl LayoutError {
    pub fn unknown_group(group: impl Into<String>) -> Self {
        Self::UnknownGroup {
            group: group.into(),
        }
    }

    pub fn unknown_action(action: impl Into<String>) -> Self {
        Self::UnknownAction {
            action: action.into(),
        }
    }

    pub fn custom(error: impl Into<BoxError>) -> Self {
        Self::Custom(error.into())
    }
}

impl From<CacheError> for LayoutError {
    fn from(error: CacheError) -> Self {
        Self::Asset(AssetError::Cache(error))
    }
}

#[derive(Debug, Error)]
pub enum ThemeError {
    #[error("no `{file}` found in `{}`", location.display())]
    MissingConfig { location: PathBuf, file: String },
    #[error("failed to read theme file `{}`: {source}", path.display())]
    ConfigRead {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to parse theme file `{}`: {source}", path.display())]
    ConfigParse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("no template `{name}` declared in the theme config")]
    TemplateNotFound { name: String },
    #[error("global asset `{name}` references itself")]
    GlobalCycle { name: String },
    #[error(transparent)]
    Asset(#[from] AssetError),
    #[error(transparent)]
    Layout(#[from] LayoutError),
}

impl ThemeError {
    pub fn template_not_found(name: impl Into<String>) -> Self {
        Self::TemplateNotFound { name: name.into() }
    }
}

impl From<CacheError> for ThemeError {
    fn from(error: CacheError) -> Self {
        Self::Asset(AssetError::Cache(error))
    }
}
