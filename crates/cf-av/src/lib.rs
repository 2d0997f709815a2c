//! # cf-av
//!
//! The heavy codec engine and the external tooling behind it.
//!
//! This crate provides:
//!
//! - **Tool discovery** ([`tools`]) -- locate ffmpeg and report versions.
//! - **Command execution** ([`ToolCommand`]) -- async builder with a working
//!   directory, a deadline, and kill-on-drop.
//! - **Engine workspace** ([`EngineWorkspace`]) -- private scratch directory
//!   addressed by bare file names.
//! - **Engine** ([`Engine`], [`EngineLoader`], [`FfmpegEngine`]) -- the
//!   write/exec/read/delete contract converters use.
//! - **Engine handle** ([`EngineHandle`]) -- lazy singleton with coalesced
//!   loading and explicit release.

pub mod command;
pub mod engine;
pub mod handle;
pub mod tools;
pub mod workspace;

// ---- Re-exports for convenience ----

pub use command::{ToolCommand, ToolOutput};
pub use engine::{Engine, EngineLoader, FfmpegEngine, FfmpegLoader};
pub use handle::{EngineHandle, EngineStatus};
pub use tools::ToolInfo;
pub use workspace::EngineWorkspace;
