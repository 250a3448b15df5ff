use crate::document::{StagedFile, UploadedDocument};
use crate::error::{AnalysisError, Result};
use log::debug;
use std::io::Write;
use std::path::{Path, PathBuf};

const STAGED_FILE_PREFIX: &str = "risk-analyst-";

/// Local temporary storage for uploaded documents.
pub trait StagingArea: Send + Sync {
    fn stage(&self, document: &UploadedDocument) -> Result<StagedFile>;

    fn remove(&self, staged: &StagedFile) -> Result<()>;
}

/// Writes each document to a uniquely named file that keeps the original extension.
#[derive(Debug, Clone)]
pub struct TempStaging {
    dir: PathBuf,
}

impl TempStaging {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

impl Default for TempStaging {
    fn default() -> Self {
        Self::new(std::env::temp_dir())
    }
}

impl StagingArea for TempStaging {
    fn stage(&self, document: &UploadedDocument) -> Result<StagedFile> {
        let suffix = document.extension_suffix();
        let mut file = tempfile::Builder::new()
            .prefix(STAGED_FILE_PREFIX)
            .suffix(&suffix)
            .tempfile_in(&self.dir)
            .map_err(|e| AnalysisError::local_io(&self.dir, e))?;

        file.write_all(&document.bytes)
            .and_then(|_| file.flush())
            .map_err(|e| AnalysisError::local_io(file.path(), e))?;

        let (_, local_path) = file
            .keep()
            .map_err(|e| AnalysisError::local_io(&self.dir, e.error))?;

        debug!(
            "Staged {} ({} bytes) at {}",
            document.name,
            document.bytes.len(),
            local_path.display()
        );

        Ok(StagedFile {
            local_path,
            original_name: document.name.clone(),
        })
    }

    fn remove(&self, staged: &StagedFile) -> Result<()> {
        std::fs::remove_file(&staged.local_path)
            .map_err(|e| AnalysisError::local_io(&staged.local_path, e))
    }
}
