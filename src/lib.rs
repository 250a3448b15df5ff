//! # Financial Risk Analyst
//!
//! Sends financial-statement documents to Gemini together with a credit-risk
//! instruction set and returns the narrative report the model writes.
//!
//! The scoring rules live in the prompt and are applied by the remote model;
//! this crate only orchestrates the run:
//!
//! - **Stage**: each upload is written to a uniquely named temporary file
//! - **Ingest**: each file is uploaded and polled until the service marks it ACTIVE
//! - **Generate**: one request carries the prompt followed by the files in upload order
//! - **Cleanup**: remote files and staged files are deleted on every exit path
//!
//! ## Example
//!
//! ```rust,ignore
//! use financial_risk_analyst::*;
//!
//! let credential = EnvCredential::default().resolve()?;
//! let config = AnalyzerConfig::load(None)?;
//! let analyzer = DocumentAnalyzer::from_config(credential, &config)?;
//!
//! let documents = vec![UploadedDocument::new("balance_2023.pdf", std::fs::read("balance_2023.pdf")?)];
//! let report = analyzer.run(&documents, None).await?;
//! println!("{}", report);
//! ```

pub mod config;
pub mod credential;
pub mod document;
pub mod error;
pub mod llm;
pub mod orchestrator;
pub mod progress;
pub mod staging;

pub use config::{AnalyzerConfig, PollPolicy};
pub use credential::{Credential, CredentialProvider, EnvCredential, StaticCredential};
pub use document::{FileState, RemoteFileHandle, StagedFile, UploadedDocument};
pub use error::{AnalysisError, Result};
pub use llm::{GeminiClient, InferenceService, PromptTemplate};
pub use orchestrator::{analyze_documents, CleanupSummary, DocumentAnalyzer};
pub use progress::{ProgressEvent, ProgressReporter, RunPhase};
pub use staging::{StagingArea, TempStaging};
