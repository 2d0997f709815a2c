//! External tool detection.
//!
//! Only ffmpeg is required, and only by the media family and HEIC decode.
//! Discovery honours an explicit path from [`EngineConfig`] when it exists
//! and otherwise searches `PATH` with [`which::which`].

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use cf_core::config::EngineConfig;

/// Tools the engine knows how to use.
pub const KNOWN_TOOLS: &[&str] = &["ffmpeg"];

/// Availability information for a tool, returned by [`check_all`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolInfo {
    pub name: String,
    pub available: bool,
    /// First line of `-version` output, if the tool ran.
    pub version: Option<String>,
    pub path: Option<PathBuf>,
}

/// Resolve a tool, preferring `custom_path` when it exists.
pub fn locate(name: &str, custom_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(p) = custom_path {
        if p.exists() {
            return Some(p.to_path_buf());
        }
        tracing::warn!(
            tool = name,
            path = %p.display(),
            "configured path does not exist; searching PATH"
        );
    }
    which::which(name).ok()
}

/// Resolve ffmpeg according to the engine configuration.
pub fn locate_ffmpeg(config: &EngineConfig) -> Option<PathBuf> {
    locate("ffmpeg", config.ffmpeg_path.as_deref())
}

/// Check every known tool and report availability.
pub fn check_all(config: &EngineConfig) -> Vec<ToolInfo> {
    KNOWN_TOOLS
        .iter()
        .map(|&name| {
            let custom = match name {
                "ffmpeg" => config.ffmpeg_path.as_deref(),
                _ => None,
            };
            match locate(name, custom) {
                Some(path) => ToolInfo {
                    name: name.to_string(),
                    available: true,
                    version: detect_version(&path),
                    path: Some(path),
                },
                None => ToolInfo {
                    name: name.to_string(),
                    available: false,
                    version: None,
                    path: None,
                },
            }
        })
        .collect()
}

/// Run `<tool> -version` and return the first line of stdout.
pub fn detect_version(path: &Path) -> Option<String> {
    let output = std::process::Command::new(path)
        .arg("-version")
        .output()
        .ok()?;

    if !output.status.success() {
        return None;
    }

    String::from_utf8_lossy(&output.stdout)
        .lines()
        .next()
        .map(|s| s.to_string())
}
