//! Theme asset compilation: declarative templates, cached assets and
//! two-phase layout compilation.

pub mod application;
pub mod cache;
pub mod config;
pub mod engine;
pub mod infra;
