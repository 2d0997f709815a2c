//! Per-family format converters.
//!
//! Every conversion goes through one [`FormatConverter`] chosen by the
//! source format's [`FormatGroup`]:
//!
//! - **document**: txt / rtf / docx / odt / doc via a normalized block model
//! - **spreadsheet**: csv / xlsx / xls via typed cell grids
//! - **image**: png / jpeg / gif via the `image` crate, heic via the engine
//! - **media**: wav / mp3 / mp4 / mov via the engine, plus stills
//!
//! [`run_conversion`] is the single entry point the queue uses. It reports
//! admission progress, acquires the engine only when the chosen converter
//! needs it for this pair, and finishes the progress stream.

mod container;
pub mod document;
pub mod image;
pub mod media;
pub mod spreadsheet;

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use uuid::Uuid;

use cf_av::{Engine, EngineHandle};
use cf_core::config::Config;
use cf_core::progress::ADMITTED;
use cf_core::{CompressionSettings, Error, Format, FormatGroup, ProgressReporter, Result};

pub use self::document::DocumentConverter;
pub use self::image::ImageConverter;
pub use self::media::MediaConverter;
pub use self::spreadsheet::SpreadsheetConverter;

/// Input to a single conversion.
#[derive(Debug, Clone)]
pub struct ConversionRequest {
    pub bytes: Bytes,
    pub source: Format,
    pub target: Format,
    pub settings: CompressionSettings,
}

/// Per-job state handed to a converter alongside the request.
pub struct ConversionContext<'a> {
    pub job_id: Uuid,
    /// Present when [`FormatConverter::requires_engine`] returned true.
    pub engine: Option<Arc<dyn Engine>>,
    pub progress: &'a ProgressReporter,
}

impl ConversionContext<'_> {
    /// The acquired engine, or an internal error if the converter asked for
    /// it without declaring the need.
    pub fn engine(&self) -> Result<&Arc<dyn Engine>> {
        self.engine
            .as_ref()
            .ok_or_else(|| Error::Internal("engine required but not acquired".into()))
    }

    /// Job-scoped engine workspace file name.
    pub fn scoped_name(&self, role: &str, format: Format) -> String {
        format!("{}-{role}.{}", self.job_id, format.extension())
    }
}

/// Byte-level transformation for one format family.
#[async_trait]
pub trait FormatConverter: Send + Sync {
    /// Short identifier used in logs.
    fn name(&self) -> &'static str;

    /// Whether converting `source` to `target` needs the shared engine.
    fn requires_engine(&self, _source: Format, _target: Format) -> bool {
        false
    }

    async fn convert(
        &self,
        request: &ConversionRequest,
        ctx: &ConversionContext<'_>,
    ) -> Result<Vec<u8>>;
}

/// Closed dispatch table, one converter per family.
#[derive(Clone)]
pub struct ConverterTable {
    document: Arc<dyn FormatConverter>,
    spreadsheet: Arc<dyn FormatConverter>,
    image: Arc<dyn FormatConverter>,
    media: Arc<dyn FormatConverter>,
}

impl ConverterTable {
    /// The production converters, configured from `config`.
    pub fn new(config: &Config) -> Self {
        let image = Arc::new(ImageConverter::new(config.image.max_dimension));
        Self {
            document: Arc::new(DocumentConverter),
            spreadsheet: Arc::new(SpreadsheetConverter),
            media: Arc::new(MediaConverter::new(Arc::clone(&image))),
            image,
        }
    }

    /// Build a table from explicit converters.
    pub fn with_converters(
        document: Arc<dyn FormatConverter>,
        spreadsheet: Arc<dyn FormatConverter>,
        image: Arc<dyn FormatConverter>,
        media: Arc<dyn FormatConverter>,
    ) -> Self {
        Self {
            document,
            spreadsheet,
            image,
            media,
        }
    }

    pub fn for_group(&self, group: FormatGroup) -> &Arc<dyn FormatConverter> {
        match group {
            FormatGroup::Document => &self.document,
            FormatGroup::Spreadsheet => &self.spreadsheet,
            FormatGroup::Image => &self.image,
            FormatGroup::Audio | FormatGroup::Video => &self.media,
        }
    }

    /// The converter responsible for reading `source`.
    pub fn for_source(&self, source: Format) -> &Arc<dyn FormatConverter> {
        self.for_group(source.group())
    }
}

impl Default for ConverterTable {
    fn default() -> Self {
        Self::new(&Config::default())
    }
}

/// Run one conversion end to end: admission progress, optional engine
/// acquisition, the transform, and the terminal progress report.
pub async fn run_conversion(
    table: &ConverterTable,
    engine: &EngineHandle,
    job_id: Uuid,
    request: &ConversionRequest,
    progress: &ProgressReporter,
) -> Result<Vec<u8>> {
    progress.report(ADMITTED);

    let result = convert_inner(table, engine, job_id, request, progress).await;
    match &result {
        Ok(bytes) => {
            progress.complete();
            tracing::debug!(job = %job_id, bytes = bytes.len(), "conversion produced output");
        }
        Err(e) => {
            progress.fail();
            tracing::debug!(job = %job_id, error = %e, "conversion failed");
        }
    }
    result
}

async fn convert_inner(
    table: &ConverterTable,
    engine: &EngineHandle,
    job_id: Uuid,
    request: &ConversionRequest,
    progress: &ProgressReporter,
) -> Result<Vec<u8>> {
    if request.bytes.is_empty() {
        return Err(Error::EmptyInput(format!("{} input has no bytes", request.source)));
    }

    let converter = table.for_source(request.source);
    let engine = if converter.requires_engine(request.source, request.target) {
        Some(engine.acquire().await?)
    } else {
        None
    };

    let ctx = ConversionContext {
        job_id,
        engine,
        progress,
    };
    tracing::debug!(
        job = %job_id,
        converter = converter.name(),
        from = %request.source,
        to = %request.target,
        engine = ctx.engine.is_some(),
        "dispatching"
    );
    converter.convert(request, &ctx).await
}

/// Wrap a synchronous transform failure with its stage.
pub(crate) fn stage<E: std::fmt::Display>(name: &'static str) -> impl FnOnce(E) -> Error {
    move |e| Error::conversion(name, e)
}

/// Run CPU-bound work on the blocking pool.
pub(crate) async fn blocking<T, F>(f: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| Error::Internal(format!("blocking task failed: {e}")))?
}
