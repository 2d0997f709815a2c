//! Batch result packaging.
//!
//! A batch with one artifact is delivered as that artifact. Two or more are
//! bundled into a single zip archive, one entry per artifact.

use std::collections::HashSet;
use std::io::{Cursor, Write};

use bytes::Bytes;
use serde::Serialize;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

use cf_core::config::PackagingConfig;
use cf_core::{Artifact, Error, Result};

const ZIP_MIME: &str = "application/zip";

/// What the caller should save for a finished batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Deliverable {
    /// Exactly one artifact, unwrapped.
    Single(Artifact),
    /// Several artifacts zipped together.
    Archive {
        artifact: Artifact,
        /// Entry names in archive order.
        entries: Vec<String>,
    },
}

impl Deliverable {
    /// The file to save.
    pub fn artifact(&self) -> &Artifact {
        match self {
            Deliverable::Single(artifact) | Deliverable::Archive { artifact, .. } => artifact,
        }
    }

    pub fn into_artifact(self) -> Artifact {
        match self {
            Deliverable::Single(artifact) | Deliverable::Archive { artifact, .. } => artifact,
        }
    }

    pub fn is_archive(&self) -> bool {
        matches!(self, Deliverable::Archive { .. })
    }
}

/// Assembles the deliverable for a set of successful artifacts.
#[derive(Debug, Clone)]
pub struct BatchPackager {
    archive_name: String,
    compression_level: u8,
}

impl BatchPackager {
    pub fn new(config: &PackagingConfig) -> Self {
        Self {
            archive_name: config.archive_name.clone(),
            compression_level: config.compression_level.min(9),
        }
    }

    /// File name of the archive, including `.zip`.
    pub fn archive_filename(&self) -> String {
        let stem = self.archive_name.trim();
        let stem = stem.strip_suffix(".zip").unwrap_or(stem);
        if stem.is_empty() {
            "converted_files.zip".to_string()
        } else {
            format!("{stem}.zip")
        }
    }

    /// `None` for an empty batch, the artifact itself for one, a zip for more.
    pub fn package(&self, artifacts: &[Artifact]) -> Result<Option<Deliverable>> {
        match artifacts {
            [] => Ok(None),
            [single] => Ok(Some(Deliverable::Single(single.clone()))),
            many => self.archive(many).map(Some),
        }
    }

    fn archive(&self, artifacts: &[Artifact]) -> Result<Deliverable> {
        let names = unique_names(artifacts.iter().map(|a| a.filename.as_str()));
        let options = SimpleFileOptions::default()
            .compression_method(CompressionMethod::Deflated)
            .compression_level(Some(i64::from(self.compression_level)));

        let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
        for (name, artifact) in names.iter().zip(artifacts) {
            zip.start_file(name.as_str(), options)
                .map_err(|e| Error::conversion("package", e))?;
            zip.write_all(&artifact.bytes)?;
        }
        let bytes = zip
            .finish()
            .map_err(|e| Error::conversion("package", e))?
            .into_inner();

        let filename = self.archive_filename();
        tracing::debug!(
            archive = %filename,
            entries = names.len(),
            bytes = bytes.len(),
            "batch packaged"
        );

        Ok(Deliverable::Archive {
            artifact: Artifact {
                bytes: Bytes::from(bytes),
                filename,
                mime_type: ZIP_MIME.to_string(),
            },
            entries: names,
        })
    }
}

impl Default for BatchPackager {
    fn default() -> Self {
        Self::new(&PackagingConfig::default())
    }
}

/// Make entry names unique (case-insensitively) by inserting ` (n)` before
/// the extension of each repeat.
pub fn unique_names<'a>(names: impl IntoIterator<Item = &'a str>) -> Vec<String> {
    let names: Vec<&str> = names.into_iter().collect();
    let mut taken: HashSet<String> = HashSet::new();
    let mut out = Vec::with_capacity(names.len());

    for name in names {
        let mut candidate = name.to_string();
        let mut n = 1;
        while taken.contains(&candidate.to_lowercase()) {
            candidate = match name.rfind('.') {
                Some(idx) if idx > 0 => format!("{} ({n}){}", &name[..idx], &name[idx..]),
                _ => format!("{name} ({n})"),
            };
            n += 1;
        }
        taken.insert(candidate.to_lowercase());
        out.push(candidate);
    }
    out
}
