//! Convertforge - file conversion engine
//!
//! Converts documents, spreadsheets, images, audio and video between the
//! formats in [`cf_core::formats`]. Jobs go through a bounded
//! [`queue::ConversionQueue`]; media work shares one lazily loaded engine;
//! batches are delivered through [`packager::BatchPackager`].
//! [`service::ConversionService`] ties these together.

pub mod config;
pub mod convert;
pub mod packager;
pub mod queue;
pub mod service;

pub use cf_core::{
    Artifact, CompressionLevel, CompressionSettings, Error, ErrorKind, Format, FormatGroup,
    ProgressFn, Result,
};
pub use convert::{ConverterTable, FormatConverter};
pub use packager::{BatchPackager, Deliverable};
pub use queue::{ConversionQueue, JobHandle, JobRequest};
pub use service::{BatchInput, BatchOutcome, ConversionService};
