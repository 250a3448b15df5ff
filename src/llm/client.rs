use crate::config::{AnalyzerConfig, DEFAULT_MODEL, GEMINI_BASE_URL, GEMINI_UPLOAD_URL};
use crate::credential::Credential;
use crate::document::{FileState, RemoteFileHandle};
use crate::error::{AnalysisError, Result};
use crate::llm::service::InferenceService;
use crate::llm::types::*;
use async_trait::async_trait;
use log::{debug, warn};
use reqwest::{Client, Response};
use serde_json::json;
use std::path::Path;
use tokio::fs;

const API_KEY_HEADER: &str = "x-goog-api-key";

#[derive(Clone)]
pub struct GeminiClient {
    client: Client,
    api_key: Credential,
    base_url: String,
    upload_url: String,
    model: String,
}

impl GeminiClient {
    pub fn new(api_key: Credential) -> Self {
        Self {
            client: Client::new(),
            api_key,
            base_url: GEMINI_BASE_URL.to_string(),
            upload_url: GEMINI_UPLOAD_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
        }
    }

    pub fn from_config(api_key: Credential, config: &AnalyzerConfig) -> Self {
        Self::new(api_key)
            .with_base_url(&config.base_url)
            .with_upload_url(&config.upload_url)
            .with_model(&config.model)
    }

    pub fn with_base_url(mut self, url: &str) -> Self {
        self.base_url = url.trim_end_matches('/').to_string();
        self
    }

    pub fn with_upload_url(mut self, url: &str) -> Self {
        self.upload_url = url.to_string();
        self
    }

    pub fn with_model(mut self, model: &str) -> Self {
        self.model = model.to_string();
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn file_url(&self, remote_id: &str) -> String {
        format!("{}/{}", self.base_url, remote_id)
    }

    async fn get_file(&self, remote_id: &str) -> Result<FileResource> {
        let res = self
            .client
            .get(self.file_url(remote_id))
            .header(API_KEY_HEADER, self.api_key.expose())
            .send()
            .await?;
        let res = ensure_success(res, "File status check").await?;
        FileResource::from_json(res.json().await?)
    }
}

impl std::fmt::Debug for GeminiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GeminiClient")
            .field("api_key", &self.api_key)
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .finish()
    }
}

/// Turns a non-2xx response into a transport error carrying status and body.
async fn ensure_success(res: Response, context: &str) -> Result<Response> {
    let status = res.status();
    if status.is_success() {
        return Ok(res);
    }
    let error_text = res.text().await.unwrap_or_default();
    Err(AnalysisError::Transport(format!(
        "{} failed (status {}): {}",
        context, status, error_text
    )))
}

#[async_trait]
impl InferenceService for GeminiClient {
    async fn ingest(&self, path: &Path, display_name: &str) -> Result<RemoteFileHandle> {
        let file_bytes = fs::read(path)
            .await
            .map_err(|e| AnalysisError::local_io(path, e))?;
        let file_size = file_bytes.len();
        let mime_type = mime_guess::from_path(path)
            .first_or_octet_stream()
            .to_string();

        let metadata = json!({ "file": { "display_name": display_name } });

        let init_res = self
            .client
            .post(&self.upload_url)
            .header(API_KEY_HEADER, self.api_key.expose())
            .header("X-Goog-Upload-Protocol", "resumable")
            .header("X-Goog-Upload-Command", "start")
            .header("X-Goog-Upload-Header-Content-Length", file_size.to_string())
            .header("X-Goog-Upload-Header-Content-Type", &mime_type)
            .json(&metadata)
            .send()
            .await?;
        let init_res = ensure_success(init_res, "Upload init").await?;

        let upload_url = init_res
            .headers()
            .get("x-goog-upload-url")
            .ok_or_else(|| AnalysisError::Transport("No upload URL in headers".to_string()))?
            .to_str()
            .map_err(|e| AnalysisError::Transport(e.to_string()))?
            .to_string();

        let upload_res = self
            .client
            .post(&upload_url)
            .header("X-Goog-Upload-Offset", "0")
            .header("X-Goog-Upload-Command", "upload, finalize")
            .body(file_bytes)
            .send()
            .await?;
        let upload_res = ensure_success(upload_res, "File upload").await?;

        let body: serde_json::Value = upload_res.json().await?;
        let uploaded_name = body
            .get("file")
            .unwrap_or(&body)
            .get("name")
            .and_then(|v| v.as_str())
            .map(str::to_string);

        let handle = match FileResource::from_json(body)
            .and_then(|resource| resource.into_handle(display_name, &mime_type))
        {
            Ok(handle) => handle,
            Err(err) => {
                // The file exists remotely but no handle reaches the caller.
                if let Some(name) = uploaded_name {
                    if let Err(e) = self.delete(&name).await {
                        warn!("Could not delete unusable upload {}: {}", name, e);
                    }
                }
                return Err(err);
            }
        };

        debug!(
            "Uploaded {} as {} ({} bytes, {})",
            display_name, handle.remote_id, file_size, handle.state
        );

        Ok(handle)
    }

    async fn poll_status(&self, remote_id: &str) -> Result<FileState> {
        Ok(self.get_file(remote_id).await?.file_state())
    }

    async fn generate(&self, prompt: &str, handles: &[RemoteFileHandle]) -> Result<String> {
        let url = format!("{}/models/{}:generateContent", self.base_url, self.model);

        let payload = GenerateContentRequest {
            contents: vec![Content::user_with_files(prompt, handles)],
        };

        let res = self
            .client
            .post(&url)
            .header(API_KEY_HEADER, self.api_key.expose())
            .json(&payload)
            .send()
            .await?;
        let res = ensure_success(res, "Gemini API request").await?;

        let body: GenerateContentResponse = res.json().await?;
        body.into_text()
    }

    async fn delete(&self, remote_id: &str) -> Result<()> {
        let res = self
            .client
            .delete(self.file_url(remote_id))
            .header(API_KEY_HEADER, self.api_key.expose())
            .send()
            .await?;
        ensure_success(res, "File delete").await?;
        Ok(())
    }
}
