//! Analyzer configuration.
//!
//! Values come from an optional TOML file, then environment overrides, then
//! whatever the host applies on top (CLI flags).

use crate::credential::DEFAULT_API_KEY_VAR;
use crate::error::{AnalysisError, Result};
use crate::llm::prompts::{PromptTemplate, BUILTIN_PROMPTS};
use log::debug;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_MODEL: &str = "gemini-2.0-flash-001";
pub const GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
pub const GEMINI_UPLOAD_URL: &str = "https://generativelanguage.googleapis.com/upload/v1beta/files";

pub const ENV_MODEL: &str = "RISK_ANALYST_MODEL";
pub const ENV_BASE_URL: &str = "RISK_ANALYST_BASE_URL";
pub const ENV_UPLOAD_URL: &str = "RISK_ANALYST_UPLOAD_URL";
pub const ENV_STAGING_DIR: &str = "RISK_ANALYST_STAGING_DIR";

/// Bounded schedule for re-checking a file that is still processing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PollPolicy {
    #[serde(default = "default_initial_interval_ms")]
    pub initial_interval_ms: u64,
    /// Growth factor applied to the interval after every check (1.0 = fixed).
    #[serde(default = "default_multiplier")]
    pub multiplier: f64,
    #[serde(default = "default_max_interval_ms")]
    pub max_interval_ms: u64,
    /// Maximum number of status checks per document.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Hard limit on time spent waiting for one document, status requests included.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

fn default_initial_interval_ms() -> u64 {
    1_000
}
fn default_multiplier() -> f64 {
    1.5
}
fn default_max_interval_ms() -> u64 {
    10_000
}
fn default_max_attempts() -> u32 {
    120
}
fn default_timeout_ms() -> u64 {
    300_000
}

fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            initial_interval_ms: default_initial_interval_ms(),
            multiplier: default_multiplier(),
            max_interval_ms: default_max_interval_ms(),
            max_attempts: default_max_attempts(),
            timeout_ms: default_timeout_ms(),
        }
    }
}

impl PollPolicy {
    /// Fixed interval, no backoff. Durations are kept at millisecond precision.
    pub fn fixed(interval: Duration, max_attempts: u32, timeout: Duration) -> Self {
        let interval_ms = millis(interval);
        Self {
            initial_interval_ms: interval_ms,
            multiplier: 1.0,
            max_interval_ms: interval_ms,
            max_attempts,
            timeout_ms: millis(timeout),
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Delay before status check number `attempt` (zero-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = self.multiplier.max(1.0).powi(attempt.min(64) as i32);
        let millis = (self.initial_interval_ms as f64 * factor).min(self.max_interval_ms as f64);
        Duration::from_millis(millis as u64)
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_attempts == 0 {
            return Err(AnalysisError::Config(
                "poll.max_attempts must be at least 1".to_string(),
            ));
        }
        if !self.multiplier.is_finite() || self.multiplier < 1.0 {
            return Err(AnalysisError::Config(format!(
                "poll.multiplier {} must be a finite number >= 1.0",
                self.multiplier
            )));
        }
        if self.max_interval_ms < self.initial_interval_ms {
            return Err(AnalysisError::Config(
                "poll.max_interval_ms must not be smaller than poll.initial_interval_ms"
                    .to_string(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalyzerConfig {
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_upload_url")]
    pub upload_url: String,
    /// Environment variable holding the API key
    #[serde(default = "default_api_key_var")]
    pub api_key_var: String,
    /// Directory for staged uploads (default: OS temp dir)
    #[serde(default)]
    pub staging_dir: Option<PathBuf>,
    /// Custom prompt template file; takes precedence over `prompt_template`
    #[serde(default)]
    pub prompt_file: Option<PathBuf>,
    /// Name of a built-in prompt template (default: `credit_risk`)
    #[serde(default)]
    pub prompt_template: Option<String>,
    #[serde(default)]
    pub poll: PollPolicy,
}

fn default_model() -> String {
    DEFAULT_MODEL.to_string()
}
fn default_base_url() -> String {
    GEMINI_BASE_URL.to_string()
}
fn default_upload_url() -> String {
    GEMINI_UPLOAD_URL.to_string()
}
fn default_api_key_var() -> String {
    DEFAULT_API_KEY_VAR.to_string()
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        Self {
            model: default_model(),
            base_url: default_base_url(),
            upload_url: default_upload_url(),
            api_key_var: default_api_key_var(),
            staging_dir: None,
            prompt_file: None,
            prompt_template: None,
            poll: PollPolicy::default(),
        }
    }
}

impl AnalyzerConfig {
    /// Reads the TOML file if one is given, then applies environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            AnalysisError::Config(format!("cannot read {}: {}", path.display(), e))
        })?;
        Self::from_toml(&raw)
            .map_err(|e| AnalysisError::Config(format!("{}: {}", path.display(), e)))
    }

    pub fn from_toml(raw: &str) -> Result<Self> {
        toml::from_str(raw).map_err(|e| AnalysisError::Config(e.to_string()))
    }

    pub fn apply_env_overrides(&mut self) {
        if let Ok(model) = std::env::var(ENV_MODEL) {
            debug!("Model overridden by {}", ENV_MODEL);
            self.model = model;
        }
        if let Ok(url) = std::env::var(ENV_BASE_URL) {
            self.base_url = url;
        }
        if let Ok(url) = std::env::var(ENV_UPLOAD_URL) {
            self.upload_url = url;
        }
        if let Ok(dir) = std::env::var(ENV_STAGING_DIR) {
            self.staging_dir = Some(PathBuf::from(dir));
        }
    }

    pub fn with_model(mut self, model: &str) -> Self {
        self.model = model.to_string();
        self
    }

    /// The prompt file if one is set, otherwise the named or default built-in template.
    pub fn prompt_template(&self) -> Result<PromptTemplate> {
        if let Some(path) = &self.prompt_file {
            return PromptTemplate::from_file(path);
        }
        match &self.prompt_template {
            Some(name) => PromptTemplate::builtin(name).ok_or_else(|| {
                AnalysisError::Config(format!(
                    "unknown prompt template '{}' (available: {})",
                    name,
                    BUILTIN_PROMPTS.join(", ")
                ))
            }),
            None => Ok(PromptTemplate::credit_risk()),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.model.trim().is_empty() {
            return Err(AnalysisError::Config("model must not be empty".to_string()));
        }
        self.poll.validate()
    }
}
