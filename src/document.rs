use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// A user-selected file as supplied by the upload source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadedDocument {
    pub name: String,
    pub bytes: Vec<u8>,
}

impl UploadedDocument {
    pub fn new(name: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            name: name.into(),
            bytes: bytes.into(),
        }
    }

    /// Extension of the original file name including the leading dot, if any.
    pub fn extension_suffix(&self) -> String {
        Path::new(&self.name)
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| format!(".{}", ext))
            .unwrap_or_default()
    }
}

/// An uploaded document written to local temporary storage for one run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagedFile {
    pub local_path: PathBuf,
    pub original_name: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FileState {
    Processing,
    Active,
    Failed,
}

impl FileState {
    /// Maps a wire state string. Anything unknown (including
    /// `STATE_UNSPECIFIED`) is still being processed.
    pub fn from_wire(state: &str) -> Self {
        match state {
            "ACTIVE" => FileState::Active,
            "FAILED" => FileState::Failed,
            _ => FileState::Processing,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            FileState::Processing => "PROCESSING",
            FileState::Active => "ACTIVE",
            FileState::Failed => "FAILED",
        }
    }
}

impl std::fmt::Display for FileState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Reference to a file ingested by the remote inference service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteFileHandle {
    /// Resource name used for status checks and deletion (e.g. `files/abc123`).
    pub remote_id: String,
    pub display_name: String,
    /// URI used to reference the file inside a generate request.
    pub uri: String,
    pub mime_type: String,
    pub state: FileState,
}
