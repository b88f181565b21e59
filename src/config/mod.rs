//! Configuration layer: typed settings with layered precedence (file → env → CLI).

use std::{num::NonZeroU64, path::PathBuf, str::FromStr, time::Duration};

use clap::Parser;
use config::{Config, Environment, File};
use serde::Deserialize;
use thiserror::Error;
use tracing::level_filters::LevelFilter;

use crate::cache::Namespace;
use crate::engine::ThemeOptions;
use crate::engine::asset::DEFAULT_NAMESPACE;

mod cli;

pub use cli::{AssetArgs, CliArgs, Command, GlobalOverrides, InspectArgs, RenderArgs};

const DEFAULT_CONFIG_BASENAME: &str = "config/default";
const LOCAL_CONFIG_BASENAME: &str = "trellis";
const DEFAULT_THEME_LOCATION: &str = "theme";
const DEFAULT_DOCUMENT_TTL_SECS: u64 = 300;
const DEFAULT_FETCH_TIMEOUT_SECS: u64 = 10;
const DEFAULT_USER_AGENT: &str = concat!("trellis/", env!("CARGO_PKG_VERSION"));

/// Fully-resolved settings after precedence resolution and validation.
#[derive(Debug, Clone)]
pub struct Settings {
    pub logging: LoggingSettings,
    pub theme: ThemeSettings,
    pub cache: CacheSettings,
    pub fetch: FetchSettings,
}

#[derive(Debug, Clone)]
pub struct LoggingSettings {
    pub level: LevelFilter,
    pub format: LogFormat,
}

#[derive(Debug, Clone, Copy)]
pub enum LogFormat {
    Json,
    Compact,
}

#[derive(Debug, Clone)]
pub struct ThemeSettings {
    pub location: PathBuf,
    pub options: ThemeOptions,
}

#[derive(Debug, Clone)]
pub struct CacheSettings {
    pub namespace: Namespace,
    /// `None` keeps rendered documents until the process exits.
    pub document_ttl: Option<Duration>,
}

#[derive(Debug, Clone)]
pub struct FetchSettings {
    pub timeout_seconds: NonZeroU64,
    pub user_agent: String,
}

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to build configuration: {0}")]
    Build(#[from] config::ConfigError),
    #[error("invalid configuration for `{key}`: {reason}")]
    Invalid { key: &'static str, reason: String },
}

impl LoadError {
    fn invalid(key: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            key,
            reason: reason.into(),
        }
    }
}

/// Load settings using the configured precedence (file → environment → CLI).
pub fn load(cli: &CliArgs) -> Result<Settings, LoadError> {
    let mut builder = Config::builder()
        .add_source(File::with_name(DEFAULT_CONFIG_BASENAME).required(false))
        .add_source(File::with_name(LOCAL_CONFIG_BASENAME).required(false));

    if let Some(path) = cli.config_file.as_ref() {
        builder = builder.add_source(File::from(path.as_path()).required(true));
    }

    builder = builder.add_source(Environment::with_prefix("TRELLIS").separator("__"));

    let mut raw: RawSettings = builder.build()?.try_deserialize()?;
    raw.apply_overrides(&cli.overrides);

    Settings::from_raw(raw)
}

/// Resolve configuration using the process arguments, returning both for downstream use.
pub fn load_with_cli() -> Result<(CliArgs, Settings), LoadError> {
    let args = CliArgs::parse();
    let settings = load(&args)?;
    Ok((args, settings))
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawSettings {
    logging: RawLoggingSettings,
    theme: RawThemeSettings,
    cache: RawCacheSettings,
    fetch: RawFetchSettings,
}

impl RawSettings {
    fn apply_overrides(&mut self, overrides: &GlobalOverrides) {
        if let Some(location) = overrides.theme_location.as_ref() {
            self.theme.location = Some(location.clone());
        }
        if let Some(minify) = overrides.minify {
            self.theme.minify = Some(minify);
        }
        if let Some(concat) = overrides.concat {
            self.theme.concat = Some(concat);
        }
        if let Some(level) = overrides.log_level.as_ref() {
            self.logging.level = Some(level.clone());
        }
        if let Some(json) = overrides.log_json {
            self.logging.json = Some(json);
        }
    }
}

impl Settings {
    fn from_raw(raw: RawSettings) -> Result<Self, LoadError> {
        let RawSettings {
            logging,
            theme,
            cache,
            fetch,
        } = raw;

        Ok(Self {
            logging: build_logging_settings(logging)?,
            theme: build_theme_settings(theme)?,
            cache: build_cache_settings(cache)?,
            fetch: build_fetch_settings(fetch)?,
        })
    }
}

fn build_logging_settings(logging: RawLoggingSettings) -> Result<LoggingSettings, LoadError> {
    let level = match logging.level {
        Some(level) => LevelFilter::from_str(level.as_str()).map_err(|err| {
            LoadError::invalid("logging.level", format!("failed to parse: {err}"))
        })?,
        None => LevelFilter::INFO,
    };

    let format = if logging.json.unwrap_or(false) {
        LogFormat::Json
    } else {
        LogFormat::Compact
    };

    Ok(LoggingSettings { level, format })
}

fn build_theme_settings(theme: RawThemeSettings) -> Result<ThemeSettings, LoadError> {
    let location = theme
        .location
        .unwrap_or_else(|| PathBuf::from(DEFAULT_THEME_LOCATION));
    if location.as_os_str().is_empty() {
        return Err(LoadError::invalid("theme.location", "must not be empty"));
    }

    let defaults = ThemeOptions::default();
    let options = ThemeOptions {
        config_file: non_empty_path(theme.config_file, "theme.config_file")?
            .unwrap_or(defaults.config_file),
        globals: non_empty_path(theme.globals, "theme.globals")?.unwrap_or(defaults.globals),
        static_files: non_empty_path(theme.static_files, "theme.static_files")?
            .unwrap_or(defaults.static_files),
        minify: theme.minify.unwrap_or(defaults.minify),
        concat: theme.concat.unwrap_or(defaults.concat),
        setup: theme.setup.unwrap_or(defaults.setup),
    };

    Ok(ThemeSettings { location, options })
}

fn build_cache_settings(cache: RawCacheSettings) -> Result<CacheSettings, LoadError> {
    let raw_namespace = cache
        .namespace
        .map(|value| value.trim().to_string())
        .unwrap_or_else(|| DEFAULT_NAMESPACE.to_string());
    let namespace = Namespace::parse(&raw_namespace);
    if namespace.is_empty() {
        return Err(LoadError::invalid("cache.namespace", "must not be empty"));
    }

    let ttl_seconds = cache
        .document_ttl_seconds
        .unwrap_or(DEFAULT_DOCUMENT_TTL_SECS);
    let document_ttl = (ttl_seconds > 0).then(|| Duration::from_secs(ttl_seconds));

    Ok(CacheSettings {
        namespace,
        document_ttl,
    })
}

fn build_fetch_settings(fetch: RawFetchSettings) -> Result<FetchSettings, LoadError> {
    let seconds = fetch.timeout_seconds.unwrap_or(DEFAULT_FETCH_TIMEOUT_SECS);
    let timeout_seconds = NonZeroU64::new(seconds)
        .ok_or_else(|| LoadError::invalid("fetch.timeout_seconds", "must be greater than zero"))?;

    let user_agent = match fetch.user_agent {
        Some(value) if value.trim().is_empty() => {
            return Err(LoadError::invalid("fetch.user_agent", "must not be empty"));
        }
        Some(value) => value.trim().to_string(),
        None => DEFAULT_USER_AGENT.to_string(),
    };

    Ok(FetchSettings {
        timeout_seconds,
        user_agent,
    })
}

fn non_empty_path(value: Option<PathBuf>, key: &'static str) -> Result<Option<PathBuf>, LoadError> {
    match value {
        Some(path) if path.as_os_str().is_empty() => {
            Err(LoadError::invalid(key, "must not be empty"))
        }
        other => Ok(other),
    }
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawLoggingSettings {
    level: Option<String>,
    json: Option<bool>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawThemeSettings {
    location: Option<PathBuf>,
    config_file: Option<PathBuf>,
    globals: Option<PathBuf>,
    static_files: Option<PathBuf>,
    minify: Option<bool>,
    concat: Option<bool>,
    setup: Option<bool>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawCacheSettings {
    namespace: Option<String>,
    document_ttl_seconds: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawFetchSettings {
    timeout_seconds: Option<u64>,
    user_agent: Option<String>,
}
