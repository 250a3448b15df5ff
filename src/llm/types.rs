use serde::{Deserialize, Serialize};

use crate::document::{FileState, RemoteFileHandle};
use crate::error::{AnalysisError, Result};

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateContentRequest {
    pub contents: Vec<Content>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Content {
    #[serde(default)]
    pub role: String,
    #[serde(default)]
    pub parts: Vec<Part>,
}

impl Content {
    /// A user turn: the prompt text followed by the files, in the given order.
    pub fn user_with_files(text: impl Into<String>, files: &[RemoteFileHandle]) -> Self {
        let mut parts = vec![Part::Text { text: text.into() }];
        parts.extend(files.iter().map(|file| Part::FileData {
            file_data: FileData {
                mime_type: file.mime_type.clone(),
                file_uri: file.uri.clone(),
            },
        }));
        Self {
            role: "user".to_string(),
            parts,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Part {
    Text {
        text: String,
    },
    FileData {
        #[serde(rename = "fileData")]
        file_data: FileData,
    },
    Other(serde_json::Value),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileData {
    pub mime_type: String,
    pub file_uri: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateContentResponse {
    pub candidates: Option<Vec<Candidate>>,
    pub prompt_feedback: Option<PromptFeedback>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Candidate {
    pub content: Option<Content>,
    pub finish_reason: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PromptFeedback {
    pub block_reason: Option<String>,
}

impl GenerateContentResponse {
    /// Text of the first candidate, parts concatenated in order.
    pub fn into_text(self) -> Result<String> {
        let block_reason = self.prompt_feedback.and_then(|f| f.block_reason);
        let candidate = self
            .candidates
            .and_then(|c| c.into_iter().next())
            .ok_or_else(|| match block_reason {
                Some(reason) => {
                    AnalysisError::Transport(format!("Prompt was blocked: {}", reason))
                }
                None => AnalysisError::Transport("No candidates returned".to_string()),
            })?;

        let finish_reason = candidate.finish_reason;
        let parts = candidate.content.map(|c| c.parts).unwrap_or_default();
        let text: String = parts
            .into_iter()
            .filter_map(|part| match part {
                Part::Text { text } => Some(text),
                _ => None,
            })
            .collect();

        if text.is_empty() {
            return Err(AnalysisError::Transport(format!(
                "Model returned no text (finish reason: {})",
                finish_reason.as_deref().unwrap_or("unknown")
            )));
        }
        Ok(text)
    }
}

/// A file resource as returned by the Files API.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileResource {
    pub name: String,
    pub display_name: Option<String>,
    pub mime_type: Option<String>,
    pub uri: Option<String>,
    pub state: Option<String>,
}

impl FileResource {
    pub fn file_state(&self) -> FileState {
        FileState::from_wire(self.state.as_deref().unwrap_or("PROCESSING"))
    }

    /// Builds a handle, falling back to the values known locally.
    pub fn into_handle(self, display_name: &str, mime_type: &str) -> Result<RemoteFileHandle> {
        let state = self.file_state();
        let uri = self.uri.ok_or_else(|| {
            AnalysisError::Transport("Upload response missing uri".to_string())
        })?;
        Ok(RemoteFileHandle {
            remote_id: self.name,
            display_name: self.display_name.unwrap_or_else(|| display_name.to_string()),
            uri,
            mime_type: self.mime_type.unwrap_or_else(|| mime_type.to_string()),
            state,
        })
    }

    /// Accepts both `{"file": {...}}` and a bare resource.
    pub fn from_json(value: serde_json::Value) -> Result<Self> {
        let value = match value {
            serde_json::Value::Object(mut map) if map.contains_key("file") => {
                map.remove("file").unwrap_or_default()
            }
            other => other,
        };
        Ok(serde_json::from_value(value)?)
    }
}
