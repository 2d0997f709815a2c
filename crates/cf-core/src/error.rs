//! Unified error type for convertforge.
//!
//! Every crate funnels its failures into [`Error`]. Callers that need to
//! branch on the failure class (per-file notifications, exit codes) use
//! [`Error::kind`] rather than matching on variants directly.

use std::fmt;

/// Stable classification of an [`Error`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    UnsupportedFormat,
    UnsupportedTarget,
    EmptyInput,
    ConversionFailure,
    EngineLoadFailure,
    Cancelled,
    Invalid,
    Internal,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::UnsupportedFormat => "unsupported_format",
            Self::UnsupportedTarget => "unsupported_target",
            Self::EmptyInput => "empty_input",
            Self::ConversionFailure => "conversion_failure",
            Self::EngineLoadFailure => "engine_load_failure",
            Self::Cancelled => "cancelled",
            Self::Invalid => "invalid",
            Self::Internal => "internal",
        };
        f.write_str(s)
    }
}

/// Error type covering every failure mode of the conversion engine.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The extension is not registered, or there is no path from the source
    /// format to the requested target.
    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    /// The family converter cannot produce the requested target.
    #[error("Unsupported target format: {0}")]
    UnsupportedTarget(String),

    /// The input parsed but holds nothing to convert (e.g. zero sheets).
    #[error("Empty input: {0}")]
    EmptyInput(String),

    /// A transform step failed.
    #[error("Conversion failed [{stage}]: {message}")]
    Conversion {
        /// The step that failed (e.g. "decode", "encode", "read docx").
        stage: String,
        /// Human-readable cause.
        message: String,
    },

    /// The shared engine could not be initialized.
    #[error("Engine failed to load: {0}")]
    EngineLoad(String),

    /// An external tool returned an error.
    #[error("Tool error [{tool}]: {message}")]
    Tool {
        /// Name of the tool that failed.
        tool: String,
        /// Human-readable error description.
        message: String,
    },

    /// An external tool did not finish in time.
    #[error("Tool [{tool}] timed out after {seconds}s")]
    Timeout {
        /// Name of the tool that was killed.
        tool: String,
        /// Configured limit.
        seconds: u64,
    },

    /// The job was discarded before it started.
    #[error("Job cancelled: {0}")]
    Cancelled(String),

    /// Caller-supplied data failed validation.
    #[error("Validation error: {0}")]
    Validation(String),

    /// An I/O operation failed.
    #[error("IO error: {source}")]
    Io {
        /// The underlying I/O error.
        #[from]
        source: std::io::Error,
    },

    /// Catch-all for unexpected internal errors.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Classify this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::UnsupportedFormat(_) => ErrorKind::UnsupportedFormat,
            Error::UnsupportedTarget(_) => ErrorKind::UnsupportedTarget,
            Error::EmptyInput(_) => ErrorKind::EmptyInput,
            Error::Conversion { .. }
            | Error::Tool { .. }
            | Error::Timeout { .. }
            | Error::Io { .. } => ErrorKind::ConversionFailure,
            Error::EngineLoad(_) => ErrorKind::EngineLoadFailure,
            Error::Cancelled(_) => ErrorKind::Cancelled,
            Error::Validation(_) => ErrorKind::Invalid,
            Error::Internal(_) => ErrorKind::Internal,
        }
    }

    /// Whether retrying the same operation could succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, Error::Timeout { .. } | Error::EngineLoad(_))
    }

    /// Convenience constructor for [`Error::Conversion`].
    pub fn conversion(stage: impl Into<String>, message: impl fmt::Display) -> Self {
        Error::Conversion {
            stage: stage.into(),
            message: message.to_string(),
        }
    }

    /// Convenience constructor for [`Error::Tool`].
    pub fn tool(tool: impl Into<String>, message: impl Into<String>) -> Self {
        Error::Tool {
            tool: tool.into(),
            message: message.into(),
        }
    }

    /// Convenience constructor for [`Error::UnsupportedTarget`].
    pub fn unsupported_target(source: impl fmt::Display, target: impl fmt::Display) -> Self {
        Error::UnsupportedTarget(format!("cannot write {target} from {source}"))
    }
}

/// Result alias using the crate-level [`Error`].
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unsupported_format_display() {
        let err = Error::UnsupportedFormat("xyz".into());
        assert_eq!(err.to_string(), "Unsupported format: xyz");
        assert_eq!(err.kind(), ErrorKind::UnsupportedFormat);
    }

    #[test]
    fn conversion_display() {
        let err = Error::conversion("decode", "truncated PNG");
        assert_eq!(err.to_string(), "Conversion failed [decode]: truncated PNG");
        assert_eq!(err.kind(), ErrorKind::ConversionFailure);
    }

    #[test]
    fn tool_and_timeout_are_conversion_failures() {
        assert_eq!(
            Error::tool("ffmpeg", "exit code 1").kind(),
            ErrorKind::ConversionFailure
        );
        let timeout = Error::Timeout {
            tool: "ffmpeg".into(),
            seconds: 300,
        };
        assert_eq!(timeout.to_string(), "Tool [ffmpeg] timed out after 300s");
        assert_eq!(timeout.kind(), ErrorKind::ConversionFailure);
        assert!(timeout.is_transient());
    }

    #[test]
    fn engine_load_kind() {
        let err = Error::EngineLoad("ffmpeg not found".into());
        assert_eq!(err.kind(), ErrorKind::EngineLoadFailure);
        assert_eq!(err.kind().to_string(), "engine_load_failure");
    }

    #[test]
    fn io_from_std() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file missing");
        let err = Error::from(io_err);
        assert!(matches!(err, Error::Io { .. }));
        assert!(!err.is_transient());
    }

    #[test]
    fn unsupported_target_message() {
        let err = Error::unsupported_target("png", "heic");
        assert_eq!(
            err.to_string(),
            "Unsupported target format: cannot write heic from png"
        );
    }
}
