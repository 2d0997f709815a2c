//! Lazily loaded, shared engine instance.
//!
//! [`EngineHandle`] holds at most one live [`Engine`]. The first
//! [`acquire`](EngineHandle::acquire) starts a load; every acquire that
//! arrives while the load is in flight waits for that same load. A failed
//! load is reported to every waiter and the next acquire starts a fresh one.

use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use futures::FutureExt;
use parking_lot::Mutex;
use tokio::sync::oneshot;

use cf_core::{Error, Result};

use crate::engine::{Engine, EngineLoader};

type LoadOutcome = std::result::Result<Arc<dyn Engine>, String>;

enum EngineState {
    Unloaded,
    Loading {
        waiters: Vec<oneshot::Sender<LoadOutcome>>,
    },
    Ready(Arc<dyn Engine>),
    Failed(String),
}

/// Observable lifecycle state of an [`EngineHandle`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineStatus {
    Unloaded,
    Loading,
    Ready,
    /// The last load attempt failed with this message.
    Failed(String),
}

struct HandleInner {
    loader: Arc<dyn EngineLoader>,
    state: Mutex<EngineState>,
    loads: AtomicUsize,
}

/// Shared handle to the lazily loaded engine. Cloning is cheap; all clones
/// refer to the same instance.
#[derive(Clone)]
pub struct EngineHandle {
    inner: Arc<HandleInner>,
}

impl EngineHandle {
    pub fn new(loader: Arc<dyn EngineLoader>) -> Self {
        Self {
            inner: Arc::new(HandleInner {
                loader,
                state: Mutex::new(EngineState::Unloaded),
                loads: AtomicUsize::new(0),
            }),
        }
    }

    /// Return the live engine, loading it first if needed.
    ///
    /// Concurrent callers during a load share that load. Cancelling the
    /// returned future does not cancel the load.
    pub async fn acquire(&self) -> Result<Arc<dyn Engine>> {
        let rx = {
            let mut state = self.inner.state.lock();
            match &mut *state {
                EngineState::Ready(engine) => return Ok(Arc::clone(engine)),
                EngineState::Loading { waiters } => {
                    let (tx, rx) = oneshot::channel();
                    waiters.push(tx);
                    rx
                }
                EngineState::Unloaded | EngineState::Failed(_) => {
                    let (tx, rx) = oneshot::channel();
                    *state = EngineState::Loading { waiters: vec![tx] };
                    self.spawn_load();
                    rx
                }
            }
        };

        match rx.await {
            Ok(Ok(engine)) => Ok(engine),
            Ok(Err(message)) => Err(Error::EngineLoad(message)),
            Err(_) => Err(Error::EngineLoad(
                "engine load ended without a result".into(),
            )),
        }
    }

    /// Drop the live engine if nobody else holds it. Returns whether the
    /// engine was released. A handle that is loading or unloaded is left
    /// untouched.
    pub fn release(&self) -> bool {
        let mut state = self.inner.state.lock();
        let releasable = matches!(&*state, EngineState::Ready(engine) if Arc::strong_count(engine) == 1);
        if releasable {
            *state = EngineState::Unloaded;
            tracing::debug!("engine released");
        }
        releasable
    }

    pub fn status(&self) -> EngineStatus {
        match &*self.inner.state.lock() {
            EngineState::Unloaded => EngineStatus::Unloaded,
            EngineState::Loading { .. } => EngineStatus::Loading,
            EngineState::Ready(_) => EngineStatus::Ready,
            EngineState::Failed(message) => EngineStatus::Failed(message.clone()),
        }
    }

    pub fn is_ready(&self) -> bool {
        matches!(&*self.inner.state.lock(), EngineState::Ready(_))
    }

    /// Number of load attempts started so far.
    pub fn load_count(&self) -> usize {
        self.inner.loads.load(Ordering::SeqCst)
    }

    /// Caller must hold the state lock and have set `Loading`.
    fn spawn_load(&self) {
        let inner = Arc::clone(&self.inner);
        inner.loads.fetch_add(1, Ordering::SeqCst);
        tokio::spawn(async move {
            tracing::debug!("loading engine");
            let outcome: LoadOutcome =
                match AssertUnwindSafe(inner.loader.load()).catch_unwind().await {
                    Ok(Ok(engine)) => Ok(engine),
                    Ok(Err(e)) => Err(e.to_string()),
                    Err(_) => Err("engine loader panicked".to_string()),
                };

            let waiters = {
                let mut state = inner.state.lock();
                let next = match &outcome {
                    Ok(engine) => EngineState::Ready(Arc::clone(engine)),
                    Err(message) => EngineState::Failed(message.clone()),
                };
                match std::mem::replace(&mut *state, next) {
                    EngineState::Loading { waiters } => waiters,
                    _ => Vec::new(),
                }
            };

            match &outcome {
                Ok(engine) => tracing::info!(engine = engine.name(), "engine ready"),
                Err(message) => tracing::error!(error = %message, "engine load failed"),
            }

            for waiter in waiters {
                // A waiter that gave up has dropped its receiver.
                let _ = waiter.send(outcome.clone());
            }
        });
    }
}

impl fmt::Debug for EngineHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EngineHandle")
            .field("status", &self.status())
            .field("loads", &self.load_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::AtomicBool;
    use std::time::Duration;

    struct NullEngine;

    #[async_trait]
    impl Engine for NullEngine {
        fn name(&self) -> &str {
            "null"
        }
        async fn write_file(&self, _name: &str, _data: &[u8]) -> Result<()> {
            Ok(())
        }
        async fn exec(&self, _args: &[String]) -> Result<()> {
            Ok(())
        }
        async fn read_file(&self, _name: &str) -> Result<Vec<u8>> {
            Ok(Vec::new())
        }
        async fn delete_file(&self, _name: &str) -> Result<()> {
            Ok(())
        }
    }

    /// Slow loader that counts invocations and can fail its first call.
    struct TestLoader {
        calls: AtomicUsize,
        fail_first: AtomicBool,
        panic: bool,
    }

    impl TestLoader {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
                fail_first: AtomicBool::new(false),
                panic: false,
            })
        }
    }

    #[async_trait]
    impl EngineLoader for TestLoader {
        async fn load(&self) -> Result<Arc<dyn Engine>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(50)).await;
            if self.panic {
                panic!("loader exploded");
            }
            if self.fail_first.swap(false, Ordering::SeqCst) {
                return Err(Error::EngineLoad("first load fails".into()));
            }
            Ok(Arc::new(NullEngine))
        }
    }

    #[tokio::test]
    async fn concurrent_acquirers_share_one_load() {
        let loader = TestLoader::new();
        let handle = EngineHandle::new(loader.clone());

        let tasks: Vec<_> = (0..8)
            .map(|_| {
                let h = handle.clone();
                tokio::spawn(async move { h.acquire().await })
            })
            .collect();

        let mut engines = Vec::new();
        for task in tasks {
            engines.push(task.await.unwrap().unwrap());
        }

        assert_eq!(loader.calls.load(Ordering::SeqCst), 1);
        assert_eq!(handle.load_count(), 1);
        for e in &engines[1..] {
            assert!(Arc::ptr_eq(&engines[0], e));
        }
        assert_eq!(handle.status(), EngineStatus::Ready);
    }

    #[tokio::test]
    async fn ready_engine_is_reused() {
        let loader = TestLoader::new();
        let handle = EngineHandle::new(loader.clone());
        let a = handle.acquire().await.unwrap();
        let b = handle.acquire().await.unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(loader.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn failure_reaches_all_waiters_then_retry_succeeds() {
        let loader = TestLoader::new();
        loader.fail_first.store(true, Ordering::SeqCst);
        let handle = EngineHandle::new(loader.clone());

        let (a, b) = tokio::join!(handle.acquire(), handle.acquire());
        assert_eq!(a.err().unwrap().kind(), cf_core::ErrorKind::EngineLoadFailure);
        assert_eq!(b.err().unwrap().kind(), cf_core::ErrorKind::EngineLoadFailure);
        assert!(matches!(handle.status(), EngineStatus::Failed(_)));

        assert!(handle.acquire().await.is_ok());
        assert_eq!(loader.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn panicking_loader_is_a_load_failure() {
        let loader = Arc::new(TestLoader {
            calls: AtomicUsize::new(0),
            fail_first: AtomicBool::new(false),
            panic: true,
        });
        let handle = EngineHandle::new(loader);
        let err = handle.acquire().await.err().unwrap();
        assert_eq!(err.kind(), cf_core::ErrorKind::EngineLoadFailure);
        assert!(err.to_string().contains("panicked"));
    }

    #[tokio::test]
    async fn release_only_when_unused() {
        let loader = TestLoader::new();
        let handle = EngineHandle::new(loader.clone());

        assert!(!handle.release());

        let engine = handle.acquire().await.unwrap();
        assert!(!handle.release(), "released while in use");
        drop(engine);
        assert!(handle.release());
        assert_eq!(handle.status(), EngineStatus::Unloaded);

        handle.acquire().await.unwrap();
        assert_eq!(loader.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn dropped_acquirer_does_not_cancel_load() {
        let loader = TestLoader::new();
        let handle = EngineHandle::new(loader.clone());

        let h = handle.clone();
        let early = tokio::spawn(async move { h.acquire().await });
        tokio::time::sleep(Duration::from_millis(5)).await;
        early.abort();

        let engine = handle.acquire().await;
        assert!(engine.is_ok());
        assert_eq!(loader.calls.load(Ordering::SeqCst), 1);
    }
}
