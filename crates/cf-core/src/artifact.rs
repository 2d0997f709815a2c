//! Conversion output.

use bytes::Bytes;
use serde::Serialize;

use crate::formats::Format;

/// The bytes produced by one successful conversion, with the name and MIME
/// type they should be saved under.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Artifact {
    #[serde(skip)]
    pub bytes: Bytes,
    pub filename: String,
    pub mime_type: String,
}

impl Artifact {
    /// Build an artifact for `target`, naming it after `source_name`.
    pub fn new(bytes: impl Into<Bytes>, source_name: &str, target: Format) -> Self {
        Self {
            bytes: bytes.into(),
            filename: output_filename(source_name, target),
            mime_type: target.mime_type().to_string(),
        }
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// `<stem of source>.<target extension>`, with any directory part dropped.
pub fn output_filename(source_name: &str, target: Format) -> String {
    let name = source_name
        .rsplit(|c| c == '/' || c == '\\')
        .next()
        .unwrap_or(source_name);
    let stem = match name.rfind('.') {
        Some(0) | None => name,
        Some(idx) => &name[..idx],
    };
    let stem = if stem.is_empty() { "converted" } else { stem };
    format!("{stem}.{}", target.extension())
}
