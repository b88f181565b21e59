//! Trellis cache layer
//!
//! Every asset's bytes live in a [`CacheStore`] under a key derived from the
//! asset's namespace and id:
//!
//! ```text
//! trellis::theme-assets::<layout id>::<asset id>
//! ```
//!
//! Rendered documents are cached separately by [`DocumentCache`].

mod document;
mod keys;
mod lock;
mod store;

pub use document::DocumentCache;
pub use keys::{CacheKey, Namespace, SEPARATOR, digest_hex};
pub use store::{CacheError, CacheStore, MemoryStore, SetOutcome};
