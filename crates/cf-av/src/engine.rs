//! The heavy codec engine.
//!
//! An [`Engine`] exposes a private file workspace plus a command runner that
//! sees only that workspace. Converters stage input with
//! [`Engine::write_file`], run a command, read the result back and delete
//! what they wrote. [`FfmpegEngine`] is the production implementation;
//! tests substitute their own.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use cf_core::config::EngineConfig;
use cf_core::{Error, Result};

use crate::command::ToolCommand;
use crate::tools;
use crate::workspace::EngineWorkspace;

/// A loaded codec engine with a private workspace.
#[async_trait]
pub trait Engine: Send + Sync {
    /// Short identifier used in logs.
    fn name(&self) -> &str;

    /// Stage `data` under `name` in the engine workspace.
    async fn write_file(&self, name: &str, data: &[u8]) -> Result<()>;

    /// Run one command. Arguments refer to workspace files by bare name.
    async fn exec(&self, args: &[String]) -> Result<()>;

    /// Read a file from the engine workspace.
    async fn read_file(&self, name: &str) -> Result<Vec<u8>>;

    /// Remove a file from the engine workspace. Missing files are ignored.
    async fn delete_file(&self, name: &str) -> Result<()>;
}

/// Produces an [`Engine`]. Called at most once per load cycle by
/// [`EngineHandle`](crate::EngineHandle).
#[async_trait]
pub trait EngineLoader: Send + Sync {
    async fn load(&self) -> Result<Arc<dyn Engine>>;
}

// ---------------------------------------------------------------------------
// ffmpeg
// ---------------------------------------------------------------------------

/// ffmpeg running inside an [`EngineWorkspace`].
#[derive(Debug)]
pub struct FfmpegEngine {
    program: PathBuf,
    version: Option<String>,
    workspace: EngineWorkspace,
    timeout: Duration,
    retries: u32,
}

impl FfmpegEngine {
    pub fn new(program: PathBuf, workspace: EngineWorkspace, config: &EngineConfig) -> Self {
        Self {
            program,
            version: None,
            workspace,
            timeout: Duration::from_secs(config.exec_timeout_secs),
            retries: config.exec_retries,
        }
    }

    pub fn version(&self) -> Option<&str> {
        self.version.as_deref()
    }

    pub fn workspace(&self) -> &EngineWorkspace {
        &self.workspace
    }

    fn command(&self, args: &[String]) -> ToolCommand {
        let mut cmd = ToolCommand::new(self.program.clone());
        cmd.args(["-hide_banner", "-nostdin", "-loglevel", "error", "-y"])
            .args(args.iter().cloned())
            .current_dir(self.workspace.dir())
            .timeout(self.timeout);
        cmd
    }
}

#[async_trait]
impl Engine for FfmpegEngine {
    fn name(&self) -> &str {
        "ffmpeg"
    }

    async fn write_file(&self, name: &str, data: &[u8]) -> Result<()> {
        self.workspace.write(name, data).await
    }

    async fn exec(&self, args: &[String]) -> Result<()> {
        let mut attempt = 0;
        loop {
            match self.command(args).execute().await {
                Ok(_) => return Ok(()),
                Err(e) if e.is_transient() && attempt < self.retries => {
                    attempt += 1;
                    tracing::warn!(attempt, error = %e, "ffmpeg timed out; retrying");
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn read_file(&self, name: &str) -> Result<Vec<u8>> {
        self.workspace.read(name).await
    }

    async fn delete_file(&self, name: &str) -> Result<()> {
        self.workspace.remove(name).await
    }
}

/// Locates ffmpeg, checks that it runs, and opens a fresh workspace.
#[derive(Debug, Clone, Default)]
pub struct FfmpegLoader {
    config: EngineConfig,
}

impl FfmpegLoader {
    pub fn new(config: EngineConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl EngineLoader for FfmpegLoader {
    async fn load(&self) -> Result<Arc<dyn Engine>> {
        let program = tools::locate_ffmpeg(&self.config).ok_or_else(|| {
            Error::EngineLoad("ffmpeg not found; is it installed and in PATH?".into())
        })?;

        let output = ToolCommand::new(program.clone())
            .arg("-version")
            .timeout(Duration::from_secs(30))
            .execute()
            .await
            .map_err(|e| Error::EngineLoad(format!("ffmpeg -version failed: {e}")))?;
        let version = output.stdout.lines().next().map(str::to_string);

        let workspace = EngineWorkspace::new(self.config.workspace_dir.as_deref())
            .map_err(|e| Error::EngineLoad(e.to_string()))?;

        tracing::info!(
            path = %program.display(),
            version = version.as_deref().unwrap_or("unknown"),
            workspace = %workspace.dir().display(),
            "ffmpeg engine loaded"
        );

        let mut engine = FfmpegEngine::new(program, workspace, &self.config);
        engine.version = version;
        Ok(Arc::new(engine))
    }
}
