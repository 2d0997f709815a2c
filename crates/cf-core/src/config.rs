//! Configuration types.
//!
//! The top-level [`Config`] carries one section per component. Every section
//! defaults sensibly so an empty file is valid; the binary decides how the
//! file is read and parsed.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::error::{Error, Result};

// ---------------------------------------------------------------------------
// Top-level Config
// ---------------------------------------------------------------------------

/// Root configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub queue: QueueConfig,
    pub engine: EngineConfig,
    pub image: ImageConfig,
    pub packaging: PackagingConfig,
}

impl Config {
    /// Deserialize a `Config` from a JSON string.
    pub fn from_json(json_str: &str) -> Result<Self> {
        serde_json::from_str(json_str)
            .map_err(|e| Error::Validation(format!("config parse error: {e}")))
    }

    /// Return a list of validation warnings (non-fatal issues).
    pub fn validate(&self) -> Vec<String> {
        let mut warnings = Vec::new();

        if self.queue.concurrency > 4 {
            warnings.push(format!(
                "queue.concurrency is {}; heavy media jobs may exhaust memory",
                self.queue.concurrency
            ));
        }
        if self.engine.exec_timeout_secs == 0 {
            warnings.push("engine.exec_timeout_secs is 0; every engine command will time out".into());
        }
        if let Some(ref path) = self.engine.ffmpeg_path {
            if !path.exists() {
                warnings.push(format!(
                    "engine.ffmpeg_path {} does not exist; falling back to PATH",
                    path.display()
                ));
            }
        }
        if self.image.max_dimension < 64 {
            warnings.push(format!(
                "image.max_dimension is {}; output images will be tiny",
                self.image.max_dimension
            ));
        }
        if self.packaging.archive_name.trim().is_empty() {
            warnings.push("packaging.archive_name is empty; using the default name".into());
        }

        warnings
    }

    /// Hard errors that make the configuration unusable.
    pub fn check(&self) -> Result<()> {
        if self.queue.concurrency == 0 {
            return Err(Error::Validation("queue.concurrency must be at least 1".into()));
        }
        if self.image.max_dimension == 0 {
            return Err(Error::Validation("image.max_dimension must be positive".into()));
        }
        if self.packaging.compression_level > 9 {
            return Err(Error::Validation(format!(
                "packaging.compression_level must be 0..=9, got {}",
                self.packaging.compression_level
            )));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Sections
// ---------------------------------------------------------------------------

/// Conversion queue settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    /// Maximum number of jobs running at once.
    pub concurrency: usize,
    /// Drop the engine instance when the queue has nothing left to run.
    pub release_engine_when_idle: bool,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            concurrency: 2,
            release_engine_when_idle: true,
        }
    }
}

/// Heavy codec engine settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Explicit ffmpeg binary. Falls back to `PATH` when unset or missing.
    pub ffmpeg_path: Option<PathBuf>,
    /// Per-command timeout.
    pub exec_timeout_secs: u64,
    /// How many times a timed-out command is re-run.
    pub exec_retries: u32,
    /// Parent directory for the engine workspace (system temp dir if unset).
    pub workspace_dir: Option<PathBuf>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            ffmpeg_path: None,
            exec_timeout_secs: 300,
            exec_retries: 1,
            workspace_dir: None,
        }
    }
}

/// Image converter settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ImageConfig {
    /// Longest edge, in pixels, an image is worked on at.
    pub max_dimension: u32,
}

impl Default for ImageConfig {
    fn default() -> Self {
        Self { max_dimension: 4096 }
    }
}

/// Batch packaging settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PackagingConfig {
    /// Archive file stem; `.zip` is appended.
    pub archive_name: String,
    /// Deflate level 0..=9.
    pub compression_level: u8,
}

impl Default for PackagingConfig {
    fn default() -> Self {
        Self {
            archive_name: "converted_files".into(),
            compression_level: 6,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let cfg = Config::default();
        assert_eq!(cfg.queue.concurrency, 2);
        assert!(cfg.queue.release_engine_when_idle);
        assert_eq!(cfg.engine.exec_timeout_secs, 300);
        assert_eq!(cfg.engine.exec_retries, 1);
        assert_eq!(cfg.image.max_dimension, 4096);
        assert_eq!(cfg.packaging.archive_name, "converted_files");
        assert_eq!(cfg.packaging.compression_level, 6);
        assert!(cfg.check().is_ok());
    }

    #[test]
    fn default_config_no_warnings() {
        let warnings = Config::default().validate();
        assert!(warnings.is_empty(), "unexpected warnings: {:?}", warnings);
    }

    #[test]
    fn parse_empty_json_uses_defaults() {
        let cfg = Config::from_json("{}").unwrap();
        assert_eq!(cfg.queue.concurrency, 2);
    }

    #[test]
    fn parse_partial_json() {
        let cfg = Config::from_json(r#"{"queue": {"concurrency": 3}}"#).unwrap();
        assert_eq!(cfg.queue.concurrency, 3);
        assert!(cfg.queue.release_engine_when_idle);
    }

    #[test]
    fn zero_concurrency_rejected() {
        let mut cfg = Config::default();
        cfg.queue.concurrency = 0;
        assert!(cfg.check().is_err());
    }

    #[test]
    fn high_concurrency_warns() {
        let mut cfg = Config::default();
        cfg.queue.concurrency = 8;
        let warnings = cfg.validate();
        assert!(warnings.iter().any(|w| w.contains("queue.concurrency")));
    }

    #[test]
    fn bad_compression_level_rejected() {
        let mut cfg = Config::default();
        cfg.packaging.compression_level = 12;
        assert!(cfg.check().is_err());
    }
}
