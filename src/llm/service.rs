use async_trait::async_trait;
use std::path::Path;

use crate::document::{FileState, RemoteFileHandle};
use crate::error::Result;

/// A remote service that ingests files and generates text from a prompt plus files.
#[async_trait]
pub trait InferenceService: Send + Sync {
    /// Submits a local file for asynchronous processing.
    async fn ingest(&self, path: &Path, display_name: &str) -> Result<RemoteFileHandle>;

    async fn poll_status(&self, remote_id: &str) -> Result<FileState>;

    /// `handles` are referenced in the order given, after the prompt.
    async fn generate(&self, prompt: &str, handles: &[RemoteFileHandle]) -> Result<String>;

    async fn delete(&self, remote_id: &str) -> Result<()>;
}
