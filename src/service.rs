//! The public conversion API.
//!
//! [`ConversionService`] wires the converter table, the engine handle, the
//! queue and the packager together from one [`Config`]. Callers submit
//! single files or whole batches; a batch resolves to per-file results plus
//! the packaged deliverable built from whatever succeeded.

use std::sync::Arc;

use bytes::Bytes;
use futures::future::join_all;
use serde::Serialize;

use cf_av::{EngineHandle, EngineLoader, EngineStatus, FfmpegLoader};
use cf_core::config::Config;
use cf_core::formats::possible_targets_for;
use cf_core::{Artifact, CompressionLevel, Error, ErrorKind, Format, ProgressFn, Result};

use crate::convert::ConverterTable;
use crate::packager::{BatchPackager, Deliverable};
use crate::queue::{ConversionQueue, JobHandle, JobRequest};

/// Progress callback for batches: `(input index, percent)`.
pub type BatchProgressFn = Arc<dyn Fn(usize, u8) + Send + Sync>;

/// One input file of a batch.
#[derive(Debug, Clone)]
pub struct BatchInput {
    pub bytes: Bytes,
    pub filename: String,
}

impl BatchInput {
    pub fn new(bytes: impl Into<Bytes>, filename: impl Into<String>) -> Self {
        Self {
            bytes: bytes.into(),
            filename: filename.into(),
        }
    }
}

/// Result for one file of a batch.
#[derive(Debug)]
pub struct FileResult {
    pub filename: String,
    pub result: Result<Artifact>,
}

/// Per-line summary of a failed file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FailureSummary {
    pub filename: String,
    pub kind: ErrorKind,
    pub message: String,
}

/// Everything a finished batch produced.
#[derive(Debug)]
pub struct BatchOutcome {
    /// One entry per input, in input order.
    pub results: Vec<FileResult>,
    /// Built from the successful artifacts; `None` when nothing succeeded.
    pub deliverable: Option<Deliverable>,
}

impl BatchOutcome {
    pub fn succeeded(&self) -> usize {
        self.results.iter().filter(|r| r.result.is_ok()).count()
    }

    pub fn failed(&self) -> usize {
        self.results.len() - self.succeeded()
    }

    pub fn failures(&self) -> Vec<FailureSummary> {
        self.results
            .iter()
            .filter_map(|r| match &r.result {
                Ok(_) => None,
                Err(e) => Some(FailureSummary {
                    filename: r.filename.clone(),
                    kind: e.kind(),
                    message: e.to_string(),
                }),
            })
            .collect()
    }
}

/// Facade over the queue, engine and packager.
#[derive(Debug, Clone)]
pub struct ConversionService {
    config: Arc<Config>,
    queue: ConversionQueue,
    packager: BatchPackager,
}

impl ConversionService {
    /// Service using ffmpeg as the engine.
    pub fn new(config: Config) -> Self {
        let loader = Arc::new(FfmpegLoader::new(config.engine.clone()));
        Self::with_loader(config, loader)
    }

    /// Service with a custom engine loader.
    pub fn with_loader(config: Config, loader: Arc<dyn EngineLoader>) -> Self {
        let converters = ConverterTable::new(&config);
        Self::with_parts(config, converters, loader)
    }

    /// Service with custom converters and engine loader.
    pub fn with_parts(
        config: Config,
        converters: ConverterTable,
        loader: Arc<dyn EngineLoader>,
    ) -> Self {
        let engine = EngineHandle::new(loader);
        let queue = ConversionQueue::new(&config.queue, converters, engine);
        let packager = BatchPackager::new(&config.packaging);
        tracing::debug!(ceiling = queue.ceiling(), "conversion service ready");
        Self {
            config: Arc::new(config),
            queue,
            packager,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn queue(&self) -> &ConversionQueue {
        &self.queue
    }

    pub fn engine_status(&self) -> EngineStatus {
        self.queue.engine().status()
    }

    /// Formats `filename` can be converted to within its group.
    pub fn possible_targets(&self, filename: &str) -> Vec<Format> {
        possible_targets_for(filename)
    }

    /// Queue one file. Must be called from within a Tokio runtime.
    pub fn submit(
        &self,
        bytes: impl Into<Bytes>,
        filename: &str,
        target: &str,
        level: CompressionLevel,
        on_progress: Option<ProgressFn>,
    ) -> JobHandle {
        let mut request = JobRequest::new(bytes, filename, target, level);
        request.on_progress = on_progress;
        self.queue.submit(request)
    }

    /// Convert every input to `target`, wait for all of them, and package
    /// the successes. Individual failures are reported in the outcome; only
    /// a packaging failure fails the whole call.
    pub async fn convert_batch(
        &self,
        inputs: Vec<BatchInput>,
        target: &str,
        level: CompressionLevel,
        on_progress: Option<BatchProgressFn>,
    ) -> Result<BatchOutcome> {
        if inputs.is_empty() {
            return Err(Error::EmptyInput("batch has no files".into()));
        }

        let handles: Vec<JobHandle> = inputs
            .into_iter()
            .enumerate()
            .map(|(index, input)| {
                let per_file = on_progress.clone().map(|f| -> ProgressFn {
                    Arc::new(move |pct| f(index, pct))
                });
                self.submit(input.bytes, &input.filename, target, level, per_file)
            })
            .collect();

        let filenames: Vec<String> = handles.iter().map(|h| h.filename().to_string()).collect();
        let outcomes = join_all(handles).await;

        let results: Vec<FileResult> = filenames
            .into_iter()
            .zip(outcomes)
            .map(|(filename, result)| FileResult { filename, result })
            .collect();

        let artifacts: Vec<Artifact> = results
            .iter()
            .filter_map(|r| r.result.as_ref().ok().cloned())
            .collect();
        let deliverable = self.packager.package(&artifacts)?;

        let outcome = BatchOutcome {
            results,
            deliverable,
        };
        tracing::info!(
            to = %target,
            succeeded = outcome.succeeded(),
            failed = outcome.failed(),
            deliverable = outcome
                .deliverable
                .as_ref()
                .map(|d| d.artifact().filename.as_str())
                .unwrap_or("none"),
            "batch finished"
        );
        Ok(outcome)
    }
}
