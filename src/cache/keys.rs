//! Cache key definitions.
//!
//! Keys are built from namespace segments joined with [`SEPARATOR`]. The
//! separator is deliberately distinct from `/` so keys never read as
//! filesystem paths.

use std::fmt;

use sha2::{Digest, Sha256};

/// Separator placed between namespace segments.
pub const SEPARATOR: &str = "::";

/// Hierarchical key prefix, e.g. `trellis::theme-assets::<layout id>`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Namespace {
    segments: Vec<String>,
}

impl Namespace {
    /// Parse a `::`-separated namespace, normalizing every segment.
    ///
    /// Empty segments are dropped, so `"::a::::b"` and `"a::b"` are equal.
    pub fn parse(raw: &str) -> Self {
        let segments = raw
            .split(SEPARATOR)
            .filter_map(normalize_segment)
            .collect();
        Self { segments }
    }

    /// Build a namespace from already separate segments.
    pub fn from_segments<I, S>(segments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let segments = segments
            .into_iter()
            .filter_map(|segment| normalize_segment(segment.as_ref()))
            .collect();
        Self { segments }
    }

    /// Returns a new namespace nested one level below this one.
    pub fn child(&self, segment: impl AsRef<str>) -> Self {
        let mut segments = self.segments.clone();
        if let Some(segment) = normalize_segment(segment.as_ref()) {
            segments.push(segment);
        }
        Self { segments }
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    /// Derive the key of an entry living directly in this namespace.
    pub fn key(&self, leaf: impl fmt::Display) -> CacheKey {
        let leaf = leaf.to_string();
        if self.segments.is_empty() {
            return CacheKey(leaf);
        }
        CacheKey(format!("{}{SEPARATOR}{leaf}", self.segments.join(SEPARATOR)))
    }
}

impl fmt::Display for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.segments.join(SEPARATOR))
    }
}

fn normalize_segment(raw: &str) -> Option<String> {
    let slug = slug::slugify(raw.trim());
    (!slug.is_empty()).then_some(slug)
}

/// Fully qualified key of one cache entry.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CacheKey(String);

impl CacheKey {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Stable hex digest used where arbitrary input (routes, names) must become
/// a fixed-width key segment.
pub fn digest_hex(input: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(input.as_bytes());
    hex::encode(hasher.finalize())
}
