//! The engine's private scratch directory.
//!
//! An [`EngineWorkspace`] owns a temporary directory for the lifetime of one
//! engine instance. Files are addressed by bare names only; anything that
//! could escape the directory is rejected.

use std::path::{Path, PathBuf};

use tempfile::TempDir;

use cf_core::{Error, Result};

/// Temporary directory holding engine inputs and outputs.
#[derive(Debug)]
pub struct EngineWorkspace {
    temp_dir: TempDir,
}

impl EngineWorkspace {
    /// Create a workspace under `parent`, or the system temp dir.
    pub fn new(parent: Option<&Path>) -> Result<Self> {
        let builder_result = match parent {
            Some(p) => tempfile::Builder::new().prefix("convertforge-").tempdir_in(p),
            None => tempfile::Builder::new().prefix("convertforge-").tempdir(),
        };
        let temp_dir = builder_result.map_err(|e| Error::Tool {
            tool: "workspace".to_string(),
            message: format!("failed to create temp dir: {e}"),
        })?;
        Ok(Self { temp_dir })
    }

    /// Path to the workspace directory.
    pub fn dir(&self) -> &Path {
        self.temp_dir.path()
    }

    /// Resolve a bare file name inside the workspace.
    pub fn path_for(&self, name: &str) -> Result<PathBuf> {
        validate_name(name)?;
        Ok(self.temp_dir.path().join(name))
    }

    pub async fn write(&self, name: &str, data: &[u8]) -> Result<()> {
        let path = self.path_for(name)?;
        tokio::fs::write(&path, data).await?;
        Ok(())
    }

    pub async fn read(&self, name: &str) -> Result<Vec<u8>> {
        let path = self.path_for(name)?;
        match tokio::fs::read(&path).await {
            Ok(data) => Ok(data),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(Error::conversion(
                "engine output",
                format!("{name} was not produced"),
            )),
            Err(e) => Err(e.into()),
        }
    }

    /// Remove a file. Missing files are not an error.
    pub async fn remove(&self, name: &str) -> Result<()> {
        let path = self.path_for(name)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// Names of the files currently in the workspace.
    pub fn list(&self) -> Result<Vec<String>> {
        let mut names = Vec::new();
        for entry in std::fs::read_dir(self.temp_dir.path())? {
            let entry = entry?;
            names.push(entry.file_name().to_string_lossy().to_string());
        }
        names.sort();
        Ok(names)
    }
}

/// A workspace file name must be a single, non-empty path component.
pub fn validate_name(name: &str) -> Result<()> {
    if name.is_empty()
        || name == "."
        || name == ".."
        || name.contains('/')
        || name.contains('\\')
        || name.contains("..")
        || name.contains('\0')
    {
        return Err(Error::Validation(format!(
            "invalid workspace file name '{name}'"
        )));
    }
    Ok(())
}
