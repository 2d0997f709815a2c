//! Bounded-concurrency conversion queue.
//!
//! Jobs are admitted in FIFO order and run as tokio tasks, at most
//! `ceiling` at a time. All scheduling state lives behind one mutex and is
//! only changed by [`drain`], which holds that lock for the whole
//! pop-and-spawn loop. A running job owns an [`ActiveSlot`]; dropping the
//! slot (on success, failure or panic) gives the capacity back and drains
//! again, so a failed job can never strand the queue.

use std::collections::VecDeque;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Instant;

use bytes::Bytes;
use futures::FutureExt;
use parking_lot::Mutex;
use tokio::sync::oneshot;
use uuid::Uuid;

use cf_av::EngineHandle;
use cf_core::config::QueueConfig;
use cf_core::formats::{extension_of, resolve_path};
use cf_core::{
    compression, Artifact, CompressionLevel, Error, ProgressFn, ProgressReporter, Result,
};

use crate::convert::{run_conversion, ConversionRequest, ConverterTable};

/// One file to convert, as handed to [`ConversionQueue::submit`].
#[derive(Clone)]
pub struct JobRequest {
    pub bytes: Bytes,
    pub filename: String,
    /// Target extension, e.g. `"pdf"` or `".png"`.
    pub target: String,
    pub level: CompressionLevel,
    pub on_progress: Option<ProgressFn>,
}

impl JobRequest {
    pub fn new(
        bytes: impl Into<Bytes>,
        filename: impl Into<String>,
        target: impl Into<String>,
        level: CompressionLevel,
    ) -> Self {
        Self {
            bytes: bytes.into(),
            filename: filename.into(),
            target: target.into(),
            level,
            on_progress: None,
        }
    }

    /// Attach a progress callback.
    pub fn on_progress(mut self, f: impl Fn(u8) + Send + Sync + 'static) -> Self {
        self.on_progress = Some(Arc::new(f));
        self
    }
}

impl std::fmt::Debug for JobRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobRequest")
            .field("filename", &self.filename)
            .field("bytes", &self.bytes.len())
            .field("target", &self.target)
            .field("level", &self.level)
            .finish()
    }
}

/// Resolves to the job's artifact or its error.
#[derive(Debug)]
pub struct JobHandle {
    id: Uuid,
    filename: String,
    rx: oneshot::Receiver<Result<Artifact>>,
}

impl JobHandle {
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Name of the submitted file.
    pub fn filename(&self) -> &str {
        &self.filename
    }
}

impl Future for JobHandle {
    type Output = Result<Artifact>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        Pin::new(&mut this.rx).poll(cx).map(|received| {
            received.unwrap_or_else(|_| Err(Error::Internal("job dropped without a result".into())))
        })
    }
}

struct QueuedJob {
    id: Uuid,
    filename: String,
    request: ConversionRequest,
    progress: ProgressReporter,
    reply: oneshot::Sender<Result<Artifact>>,
}

#[derive(Default)]
struct QueueState {
    pending: VecDeque<QueuedJob>,
    active: usize,
}

struct QueueInner {
    state: Mutex<QueueState>,
    ceiling: usize,
    converters: ConverterTable,
    engine: EngineHandle,
    release_when_idle: bool,
}

/// FIFO conversion queue with a fixed concurrency ceiling.
#[derive(Clone)]
pub struct ConversionQueue {
    inner: Arc<QueueInner>,
}

impl ConversionQueue {
    pub fn new(config: &QueueConfig, converters: ConverterTable, engine: EngineHandle) -> Self {
        Self {
            inner: Arc::new(QueueInner {
                state: Mutex::new(QueueState::default()),
                ceiling: config.concurrency.max(1),
                converters,
                engine,
                release_when_idle: config.release_engine_when_idle,
            }),
        }
    }

    /// Queue a job. Must be called from within a Tokio runtime.
    ///
    /// Requests with an unregistered extension or no conversion path resolve
    /// immediately with [`Error::UnsupportedFormat`] and never occupy a slot.
    pub fn submit(&self, request: JobRequest) -> JobHandle {
        let id = Uuid::new_v4();
        let (reply, rx) = oneshot::channel();
        let handle = JobHandle {
            id,
            filename: request.filename.clone(),
            rx,
        };

        let source_ext = extension_of(&request.filename);
        let (source, target) = match resolve_path(&source_ext, &request.target) {
            Ok(path) => path,
            Err(e) => {
                tracing::warn!(job = %id, file = %request.filename, error = %e, "job rejected");
                let _ = reply.send(Err(e));
                return handle;
            }
        };

        let job = QueuedJob {
            id,
            filename: request.filename,
            request: ConversionRequest {
                bytes: request.bytes,
                source,
                target,
                settings: compression::resolve(target, request.level),
            },
            progress: ProgressReporter::from_fn(request.on_progress),
            reply,
        };
        tracing::debug!(job = %id, file = %job.filename, from = %source, to = %target, level = %request.level, "job queued");
        self.inner.state.lock().pending.push_back(job);
        drain(&self.inner);
        handle
    }

    /// Drop every job that has not started. Their handles resolve with
    /// [`Error::Cancelled`]; running jobs are unaffected. Returns the number
    /// of jobs dropped.
    pub fn clear(&self) -> usize {
        let dropped: Vec<QueuedJob> = self.inner.state.lock().pending.drain(..).collect();
        let count = dropped.len();
        for job in dropped {
            job.progress.fail();
            let _ = job
                .reply
                .send(Err(Error::Cancelled(format!("{} was never started", job.filename))));
        }
        if count > 0 {
            tracing::info!(count, "cleared pending jobs");
        }
        count
    }

    pub fn pending_count(&self) -> usize {
        self.inner.state.lock().pending.len()
    }

    pub fn active_count(&self) -> usize {
        self.inner.state.lock().active
    }

    pub fn ceiling(&self) -> usize {
        self.inner.ceiling
    }

    /// The engine handle shared by this queue's jobs.
    pub fn engine(&self) -> &EngineHandle {
        &self.inner.engine
    }
}

impl std::fmt::Debug for ConversionQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.inner.state.lock();
        f.debug_struct("ConversionQueue")
            .field("ceiling", &self.inner.ceiling)
            .field("active", &state.active)
            .field("pending", &state.pending.len())
            .finish()
    }
}

/// Start pending jobs while capacity remains. Holds the state lock for the
/// whole loop, so `active` never exceeds the ceiling.
fn drain(inner: &Arc<QueueInner>) {
    let mut state = inner.state.lock();
    while state.active < inner.ceiling {
        let Some(job) = state.pending.pop_front() else {
            break;
        };
        state.active += 1;
        let slot = ActiveSlot {
            inner: Arc::clone(inner),
        };
        tokio::spawn(run_job(slot, job));
    }
}

/// One unit of queue capacity, returned on drop.
struct ActiveSlot {
    inner: Arc<QueueInner>,
}

impl Drop for ActiveSlot {
    fn drop(&mut self) {
        let idle = {
            let mut state = self.inner.state.lock();
            state.active = state.active.saturating_sub(1);
            state.active == 0 && state.pending.is_empty()
        };
        if idle && self.inner.release_when_idle && self.inner.engine.release() {
            tracing::debug!("queue idle; engine released");
        }
        drain(&self.inner);
    }
}

async fn run_job(slot: ActiveSlot, job: QueuedJob) {
    let QueuedJob {
        id,
        filename,
        request,
        progress,
        reply,
    } = job;
    let inner = Arc::clone(&slot.inner);
    let started = Instant::now();
    tracing::info!(
        job = %id,
        file = %filename,
        from = %request.source,
        to = %request.target,
        "conversion started"
    );

    let outcome = AssertUnwindSafe(run_conversion(
        &inner.converters,
        &inner.engine,
        id,
        &request,
        &progress,
    ))
    .catch_unwind()
    .await;

    let result = match outcome {
        Ok(Ok(bytes)) => Ok(Artifact::new(bytes, &filename, request.target)),
        Ok(Err(e)) => Err(e),
        Err(panic) => {
            progress.fail();
            Err(Error::Internal(format!(
                "converter panicked: {}",
                panic_message(panic.as_ref())
            )))
        }
    };

    // Capacity goes back before the caller observes the result.
    drop(slot);

    let elapsed_ms = started.elapsed().as_millis() as u64;
    match &result {
        Ok(artifact) => tracing::info!(
            job = %id,
            output = %artifact.filename,
            bytes = artifact.len(),
            elapsed_ms,
            "conversion finished"
        ),
        Err(e) => tracing::warn!(job = %id, file = %filename, error = %e, elapsed_ms, "conversion failed"),
    }
    let _ = reply.send(result);
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::convert::{ConversionContext, FormatConverter};
    use async_trait::async_trait;
    use cf_av::{Engine, EngineLoader};
    use cf_core::ErrorKind;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    struct NoEngine;

    #[async_trait]
    impl EngineLoader for NoEngine {
        async fn load(&self) -> Result<Arc<dyn Engine>> {
            Err(Error::EngineLoad("no engine in unit tests".into()))
        }
    }

    /// Echoes its input after a delay and records concurrency.
    #[derive(Default)]
    struct Probe {
        running: AtomicUsize,
        peak: AtomicUsize,
        started: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl FormatConverter for Probe {
        fn name(&self) -> &'static str {
            "probe"
        }

        async fn convert(
            &self,
            request: &ConversionRequest,
            _ctx: &ConversionContext<'_>,
        ) -> Result<Vec<u8>> {
            let now = self.running.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            self.started
                .lock()
                .push(String::from_utf8_lossy(&request.bytes).to_string());

            tokio::time::sleep(Duration::from_millis(20)).await;
            self.running.fetch_sub(1, Ordering::SeqCst);

            match request.bytes.as_ref() {
                b"fail" => Err(Error::conversion("probe", "asked to fail")),
                b"panic" => panic!("probe asked to panic"),
                other => Ok(other.to_vec()),
            }
        }
    }

    fn queue(ceiling: usize) -> (ConversionQueue, Arc<Probe>) {
        let probe = Arc::new(Probe::default());
        let table = ConverterTable::with_converters(
            probe.clone(),
            probe.clone(),
            probe.clone(),
            probe.clone(),
        );
        let config = QueueConfig {
            concurrency: ceiling,
            ..QueueConfig::default()
        };
        let queue = ConversionQueue::new(&config, table, EngineHandle::new(Arc::new(NoEngine)));
        (queue, probe)
    }

    fn job(content: &str) -> JobRequest {
        JobRequest::new(content.as_bytes().to_vec(), "in.png", "jpg", CompressionLevel::Low)
    }

    #[tokio::test]
    async fn never_exceeds_ceiling() {
        let (queue, probe) = queue(2);
        let handles: Vec<_> = (0..5).map(|i| queue.submit(job(&format!("img{i}")))).collect();
        assert_eq!(queue.active_count(), 2);
        assert_eq!(queue.pending_count(), 3);

        for h in handles {
            let artifact = h.await.unwrap();
            assert_eq!(artifact.filename, "in.jpg");
            assert!(queue.active_count() <= 2);
        }
        assert_eq!(probe.peak.load(Ordering::SeqCst), 2);
        assert_eq!(queue.active_count(), 0);
        assert_eq!(queue.pending_count(), 0);
    }

    #[tokio::test]
    async fn starts_in_admission_order() {
        let (queue, probe) = queue(1);
        let handles: Vec<_> = ["a", "b", "c", "d"].iter().map(|c| queue.submit(job(c))).collect();
        for h in handles {
            h.await.unwrap();
        }
        assert_eq!(*probe.started.lock(), vec!["a", "b", "c", "d"]);
    }

    #[tokio::test]
    async fn failure_only_rejects_its_own_job() {
        let (queue, _) = queue(2);
        let ok1 = queue.submit(job("one"));
        let bad = queue.submit(job("fail"));
        let ok2 = queue.submit(job("two"));

        assert_eq!(ok1.await.unwrap().bytes.as_ref(), b"one");
        assert_eq!(bad.await.unwrap_err().kind(), ErrorKind::ConversionFailure);
        assert_eq!(ok2.await.unwrap().bytes.as_ref(), b"two");
    }

    #[tokio::test]
    async fn panic_does_not_leak_a_slot() {
        let (queue, _) = queue(1);
        let boom = queue.submit(job("panic"));
        let after = queue.submit(job("after"));

        let err = boom.await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Internal);
        assert!(err.to_string().contains("probe asked to panic"));
        assert_eq!(after.await.unwrap().bytes.as_ref(), b"after");
        assert_eq!(queue.active_count(), 0);
    }

    #[tokio::test]
    async fn unregistered_extension_is_rejected_without_a_slot() {
        let (queue, probe) = queue(2);
        let handle = queue.submit(JobRequest::new(
            b"data".to_vec(),
            "mystery.xyz",
            "png",
            CompressionLevel::None,
        ));
        assert_eq!(queue.active_count(), 0);
        assert_eq!(handle.await.unwrap_err().kind(), ErrorKind::UnsupportedFormat);
        assert!(probe.started.lock().is_empty());
    }

    #[tokio::test]
    async fn cross_family_target_is_rejected() {
        let (queue, _) = queue(2);
        let handle = queue.submit(JobRequest::new(
            b"data".to_vec(),
            "notes.txt",
            "png",
            CompressionLevel::None,
        ));
        assert_eq!(handle.await.unwrap_err().kind(), ErrorKind::UnsupportedFormat);
    }

    #[tokio::test]
    async fn clear_cancels_only_pending_jobs() {
        let (queue, _) = queue(1);
        let running = queue.submit(job("first"));
        let second = queue.submit(job("second"));
        let third = queue.submit(job("third"));

        assert_eq!(queue.clear(), 2);
        assert_eq!(queue.pending_count(), 0);

        assert_eq!(running.await.unwrap().bytes.as_ref(), b"first");
        assert_eq!(second.await.unwrap_err().kind(), ErrorKind::Cancelled);
        assert_eq!(third.await.unwrap_err().kind(), ErrorKind::Cancelled);
    }

    #[tokio::test]
    async fn progress_is_monotonic_and_completes() {
        let (queue, _) = queue(2);
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let handle = queue.submit(job("p").on_progress(move |p| sink.lock().push(p)));
        handle.await.unwrap();

        let seen = seen.lock().clone();
        assert_eq!(seen.first(), Some(&10));
        assert_eq!(seen.last(), Some(&100));
        assert!(seen.windows(2).all(|w| w[0] < w[1]));
    }

    #[tokio::test]
    async fn failed_job_emits_nothing_after_failure() {
        let (queue, _) = queue(2);
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let handle = queue.submit(job("fail").on_progress(move |p| sink.lock().push(p)));
        handle.await.unwrap_err();
        assert_eq!(*seen.lock(), vec![10]);
    }

    #[tokio::test]
    async fn empty_input_is_rejected() {
        let (queue, probe) = queue(2);
        let handle = queue.submit(job(""));
        assert_eq!(handle.await.unwrap_err().kind(), ErrorKind::EmptyInput);
        assert!(probe.started.lock().is_empty());
    }
}
