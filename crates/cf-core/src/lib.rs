//! cf-core: shared types, errors, the format registry, the compression
//! policy, progress reporting, and configuration.
//!
//! This crate is the foundational dependency for the other cf-* crates and
//! for the conversion engine itself. Nothing in here performs I/O.

pub mod artifact;
pub mod compression;
pub mod config;
pub mod error;
pub mod formats;
pub mod progress;

// Re-export the most commonly used items at the crate root.
pub use artifact::Artifact;
pub use compression::{
    CompressionLevel, CompressionSettings, DocumentSettings, ImageSettings, MediaSettings,
};
pub use error::{Error, ErrorKind, Result};
pub use formats::{Format, FormatGroup};
pub use progress::{ProgressFn, ProgressReporter};
