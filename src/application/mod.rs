//! Command handlers wiring settings, the theme and its layout pool.

pub mod commands;
pub mod error;

pub use commands::{InspectReport, Runtime};
pub use error::{AppError, ErrorReport};
