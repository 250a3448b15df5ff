use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AnalysisError {
    #[error("No documents were provided for analysis")]
    NoDocuments,

    #[error("Local file error at {}: {source}", path.display())]
    LocalIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("The remote service failed to process document: {document}")]
    IngestionFailed { document: String },

    #[error("Document {document} was still processing after {attempts} status checks ({elapsed:?})")]
    IngestionTimeout {
        document: String,
        attempts: u32,
        elapsed: Duration,
    },

    #[error("Remote service error: {0}")]
    Transport(String),

    #[error("Credential error: {0}")]
    Credential(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),
}

impl AnalysisError {
    pub(crate) fn local_io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        AnalysisError::LocalIo {
            path: path.into(),
            source,
        }
    }

    /// True for errors caused by a document the remote service could not ingest.
    pub fn is_ingestion_failure(&self) -> bool {
        matches!(
            self,
            AnalysisError::IngestionFailed { .. } | AnalysisError::IngestionTimeout { .. }
        )
    }
}

impl From<reqwest::Error> for AnalysisError {
    fn from(err: reqwest::Error) -> Self {
        AnalysisError::Transport(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, AnalysisError>;
