//! Shared test harness for integration tests.
//!
//! Provides [`FakeEngine`], an in-memory engine whose `exec` copies the
//! `-i` input to the last argument, and [`FakeLoader`] which counts loads
//! and can be told to fail. [`TestHarness`] builds a full
//! [`ConversionService`] on top of them.

#![allow(dead_code)]

use std::collections::HashMap;
use std::io::Cursor;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use cf_av::{Engine, EngineLoader};
use cf_core::config::Config;
use cf_core::{Error, Result};
use convertforge::ConversionService;

/// Workspace shared by every engine a [`FakeLoader`] produces, so tests can
/// inspect it after the handle has released its engine.
#[derive(Default)]
pub struct FakeWorkspace {
    files: Mutex<HashMap<String, Vec<u8>>>,
    commands: Mutex<Vec<Vec<String>>>,
    /// Largest number of files held at once.
    pub peak_files: AtomicUsize,
    fail_exec: AtomicBool,
    exec_delay_ms: AtomicU64,
}

impl FakeWorkspace {
    pub fn file_names(&self) -> Vec<String> {
        self.files.lock().keys().cloned().collect()
    }

    pub fn commands(&self) -> Vec<Vec<String>> {
        self.commands.lock().clone()
    }

    pub fn set_fail_exec(&self, fail: bool) {
        self.fail_exec.store(fail, Ordering::SeqCst);
    }

    /// How long each `exec` takes. Never less than 5ms.
    pub fn set_exec_delay(&self, delay: Duration) {
        self.exec_delay_ms
            .store(delay.as_millis() as u64, Ordering::SeqCst);
    }
}

/// In-memory engine. Files live in a map; `exec` copies input to output.
pub struct FakeEngine {
    ws: Arc<FakeWorkspace>,
}

#[async_trait]
impl Engine for FakeEngine {
    fn name(&self) -> &str {
        "fake"
    }

    async fn write_file(&self, name: &str, data: &[u8]) -> Result<()> {
        let mut files = self.ws.files.lock();
        files.insert(name.to_string(), data.to_vec());
        self.ws.peak_files.fetch_max(files.len(), Ordering::SeqCst);
        Ok(())
    }

    async fn exec(&self, args: &[String]) -> Result<()> {
        self.ws.commands.lock().push(args.to_vec());
        // Let other jobs interleave between staging and reading back.
        let delay_ms = self.ws.exec_delay_ms.load(Ordering::SeqCst).max(5);
        tokio::time::sleep(Duration::from_millis(delay_ms)).await;

        if self.ws.fail_exec.load(Ordering::SeqCst) {
            return Err(Error::tool("fake", "exec failed on request"));
        }
        let input = args
            .iter()
            .position(|a| a == "-i")
            .and_then(|i| args.get(i + 1))
            .ok_or_else(|| Error::tool("fake", "no -i argument"))?;
        let output = args
            .last()
            .ok_or_else(|| Error::tool("fake", "no output argument"))?;

        let mut files = self.ws.files.lock();
        let data = files
            .get(input)
            .cloned()
            .ok_or_else(|| Error::tool("fake", format!("{input}: no such file")))?;
        files.insert(output.clone(), data);
        self.ws.peak_files.fetch_max(files.len(), Ordering::SeqCst);
        Ok(())
    }

    async fn read_file(&self, name: &str) -> Result<Vec<u8>> {
        self.ws.files
            .lock()
            .get(name)
            .cloned()
            .ok_or_else(|| Error::conversion("engine output", format!("{name} was not produced")))
    }

    async fn delete_file(&self, name: &str) -> Result<()> {
        self.ws.files.lock().remove(name);
        Ok(())
    }
}

/// Loader handing out a fresh [`FakeEngine`] per load, all over one
/// [`FakeWorkspace`].
pub struct FakeLoader {
    pub workspace: Arc<FakeWorkspace>,
    pub loads: AtomicUsize,
    pub fail: AtomicBool,
    pub delay: Duration,
}

impl FakeLoader {
    pub fn new() -> Arc<Self> {
        Self::with_delay(Duration::from_millis(10))
    }

    pub fn with_delay(delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            workspace: Arc::new(FakeWorkspace::default()),
            loads: AtomicUsize::new(0),
            fail: AtomicBool::new(false),
            delay,
        })
    }

    pub fn failing() -> Arc<Self> {
        let loader = Self::new();
        loader.fail.store(true, Ordering::SeqCst);
        loader
    }

    pub fn load_count(&self) -> usize {
        self.loads.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl EngineLoader for FakeLoader {
    async fn load(&self) -> Result<Arc<dyn Engine>> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(self.delay).await;
        if self.fail.load(Ordering::SeqCst) {
            return Err(Error::EngineLoad("fake engine refused to load".into()));
        }
        Ok(Arc::new(FakeEngine {
            ws: Arc::clone(&self.workspace),
        }))
    }
}

/// A [`ConversionService`] backed by a [`FakeLoader`].
pub struct TestHarness {
    pub service: ConversionService,
    pub loader: Arc<FakeLoader>,
}

impl TestHarness {
    pub fn new() -> Self {
        Self::with_config(Config::default())
    }

    pub fn with_config(config: Config) -> Self {
        Self::with_loader(config, FakeLoader::new())
    }

    pub fn with_loader(config: Config, loader: Arc<FakeLoader>) -> Self {
        let service = ConversionService::with_loader(config, loader.clone());
        Self { service, loader }
    }

    pub fn workspace(&self) -> &FakeWorkspace {
        &self.loader.workspace
    }
}

/// A small PNG with a gradient.
pub fn png_bytes(width: u32, height: u32) -> Vec<u8> {
    let img = image::RgbaImage::from_fn(width, height, |x, y| {
        image::Rgba([(x * 9 % 256) as u8, (y * 5 % 256) as u8, 128, 255])
    });
    let mut out = Vec::new();
    image::DynamicImage::ImageRgba8(img)
        .write_to(&mut Cursor::new(&mut out), image::ImageFormat::Png)
        .unwrap();
    out
}
