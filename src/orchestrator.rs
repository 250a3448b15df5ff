//! Runs one analysis: stage the uploads, ingest them remotely, wait for
//! processing, generate the report and release every artifact afterwards.

use futures::FutureExt;
use log::{debug, info, warn};
use std::panic::AssertUnwindSafe;
use std::time::Duration;
use tokio::sync::mpsc::Sender;
use tokio::time::{sleep_until, timeout_at, Instant};

use crate::config::{AnalyzerConfig, PollPolicy};
use crate::credential::Credential;
use crate::document::{FileState, RemoteFileHandle, StagedFile, UploadedDocument};
use crate::error::{AnalysisError, Result};
use crate::llm::{GeminiClient, InferenceService, PromptTemplate};
use crate::progress::{
    ingestion_fraction, ProgressEvent, ProgressReporter, RunPhase, COMPLETE_FRACTION,
    GENERATING_FRACTION,
};
use crate::staging::{StagingArea, TempStaging};

/// Artifacts created by one run. Everything in here is released by cleanup.
#[derive(Debug)]
struct AnalysisRun {
    phase: RunPhase,
    staged: Vec<StagedFile>,
    handles: Vec<RemoteFileHandle>,
}

impl AnalysisRun {
    fn new() -> Self {
        Self {
            phase: RunPhase::Idle,
            staged: Vec::new(),
            handles: Vec::new(),
        }
    }

    async fn enter(&mut self, phase: RunPhase, reporter: &ProgressReporter) {
        debug!("Run phase {:?} -> {:?}", self.phase, phase);
        self.phase = phase;
        reporter.phase(phase).await;
    }
}

/// What cleanup managed to release.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CleanupSummary {
    pub remote_deleted: usize,
    pub remote_failed: usize,
    pub local_deleted: usize,
    pub local_failed: usize,
}

pub struct DocumentAnalyzer<S, L = TempStaging> {
    service: S,
    staging: L,
    prompt: PromptTemplate,
    poll: PollPolicy,
}

impl DocumentAnalyzer<GeminiClient, TempStaging> {
    /// Gemini-backed analyzer using the configured model, staging dir, prompt and poll policy.
    pub fn from_config(credential: Credential, config: &AnalyzerConfig) -> Result<Self> {
        config.validate()?;
        let prompt = config.prompt_template()?;
        let staging = match &config.staging_dir {
            Some(dir) => TempStaging::new(dir),
            None => TempStaging::default(),
        };

        Ok(DocumentAnalyzer::new(
            GeminiClient::from_config(credential, config),
            staging,
        )
        .with_prompt(prompt)
        .with_poll_policy(config.poll.clone()))
    }
}

impl<S: InferenceService, L: StagingArea> DocumentAnalyzer<S, L> {
    pub fn new(service: S, staging: L) -> Self {
        Self {
            service,
            staging,
            prompt: PromptTemplate::default(),
            poll: PollPolicy::default(),
        }
    }

    pub fn with_prompt(mut self, prompt: PromptTemplate) -> Self {
        self.prompt = prompt;
        self
    }

    pub fn with_poll_policy(mut self, poll: PollPolicy) -> Self {
        self.poll = poll;
        self
    }

    pub fn prompt(&self) -> &PromptTemplate {
        &self.prompt
    }

    /// Runs the full pipeline and returns the generated report verbatim.
    ///
    /// Cleanup runs on every exit path, including a panic inside the service
    /// or staging implementation, which is resumed once artifacts are released.
    pub async fn run(
        &self,
        documents: &[UploadedDocument],
        progress: Option<Sender<ProgressEvent>>,
    ) -> Result<String> {
        if documents.is_empty() {
            return Err(AnalysisError::NoDocuments);
        }

        info!(
            "Analyzing {} document(s) with prompt '{}'",
            documents.len(),
            self.prompt.name()
        );

        let mut reporter = ProgressReporter::new(progress);
        let mut run = AnalysisRun::new();

        let outcome = AssertUnwindSafe(self.execute(documents, &mut run, &mut reporter))
            .catch_unwind()
            .await;

        let result = match outcome {
            Ok(Ok(report)) => {
                run.enter(RunPhase::Succeeded, &reporter).await;
                reporter.progress(COMPLETE_FRACTION).await;
                reporter.send(ProgressEvent::Cleared).await;
                info!("Analysis complete ({} characters)", report.len());
                Ok(report)
            }
            Ok(Err(err)) => {
                warn!("Analysis failed during {:?}: {}", run.phase, err);
                run.enter(RunPhase::Failed, &reporter).await;
                reporter
                    .send(ProgressEvent::Failed {
                        reason: err.to_string(),
                    })
                    .await;
                reporter.send(ProgressEvent::Cleared).await;
                Err(err)
            }
            Err(panic) => {
                warn!("Analysis panicked during {:?}; releasing artifacts", run.phase);
                self.cleanup(&run).await;
                std::panic::resume_unwind(panic);
            }
        };

        let summary = self.cleanup(&run).await;
        debug!("Cleanup finished: {:?}", summary);
        run.enter(RunPhase::CleanedUp, &reporter).await;
        run.enter(RunPhase::Idle, &reporter).await;

        result
    }

    async fn execute(
        &self,
        documents: &[UploadedDocument],
        run: &mut AnalysisRun,
        reporter: &mut ProgressReporter,
    ) -> Result<String> {
        run.enter(RunPhase::Staging, reporter).await;
        for document in documents {
            let staged = self.staging.stage(document)?;
            run.staged.push(staged);
        }

        run.enter(RunPhase::Ingesting, reporter).await;
        let total = run.staged.len();
        for index in 0..total {
            let staged = run.staged[index].clone();
            reporter
                .send(ProgressEvent::Uploading {
                    index,
                    total,
                    name: staged.original_name.clone(),
                })
                .await;

            let handle = self
                .service
                .ingest(&staged.local_path, &staged.original_name)
                .await?;
            run.handles.push(handle);

            if let Some(handle) = run.handles.last_mut() {
                self.wait_until_active(handle, &staged.original_name).await?;
            }

            reporter.progress(ingestion_fraction(index + 1, total)).await;
        }

        run.enter(RunPhase::Generating, reporter).await;
        reporter.progress(GENERATING_FRACTION).await;

        self.service.generate(self.prompt.text(), &run.handles).await
    }

    /// Polls until the handle leaves PROCESSING, within the poll policy's limits.
    ///
    /// Both the sleeps and the status requests are bounded by the policy deadline.
    async fn wait_until_active(&self, handle: &mut RemoteFileHandle, document: &str) -> Result<()> {
        let started = Instant::now();
        // A timeout too large for the clock never expires.
        let deadline = started
            .checked_add(self.poll.timeout())
            .unwrap_or_else(|| started + Duration::from_secs(100 * 365 * 24 * 3600));
        let mut attempts: u32 = 0;

        let timed_out = |attempts: u32| AnalysisError::IngestionTimeout {
            document: document.to_string(),
            attempts,
            elapsed: started.elapsed(),
        };

        while handle.state == FileState::Processing {
            if attempts >= self.poll.max_attempts || Instant::now() >= deadline {
                return Err(timed_out(attempts));
            }

            let wake = Instant::now()
                .checked_add(self.poll.delay_for(attempts))
                .map_or(deadline, |wake| wake.min(deadline));
            sleep_until(wake).await;
            if Instant::now() >= deadline {
                return Err(timed_out(attempts));
            }

            handle.state = timeout_at(deadline, self.service.poll_status(&handle.remote_id))
                .await
                .map_err(|_| timed_out(attempts))??;
            attempts += 1;
            debug!(
                "{} is {} after {} check(s)",
                handle.remote_id, handle.state, attempts
            );
        }

        match handle.state {
            FileState::Failed => Err(AnalysisError::IngestionFailed {
                document: document.to_string(),
            }),
            _ => Ok(()),
        }
    }

    /// Best-effort release of every artifact. Failures are logged, never raised.
    async fn cleanup(&self, run: &AnalysisRun) -> CleanupSummary {
        let mut summary = CleanupSummary::default();

        // FAILED files were already discarded by the remote service.
        for handle in run
            .handles
            .iter()
            .filter(|h| h.state != FileState::Failed)
        {
            match self.service.delete(&handle.remote_id).await {
                Ok(()) => summary.remote_deleted += 1,
                Err(e) => {
                    summary.remote_failed += 1;
                    warn!("Could not delete remote file {}: {}", handle.remote_id, e);
                }
            }
        }

        for staged in &run.staged {
            match self.staging.remove(staged) {
                Ok(()) => summary.local_deleted += 1,
                Err(e) => {
                    summary.local_failed += 1;
                    warn!("Could not delete staged file: {}", e);
                }
            }
        }

        summary
    }
}

/// Resolves a Gemini analyzer from configuration and runs it once.
pub async fn analyze_documents(
    documents: &[UploadedDocument],
    credential: Credential,
    config: &AnalyzerConfig,
    progress: Option<Sender<ProgressEvent>>,
) -> Result<String> {
    DocumentAnalyzer::from_config(credential, config)?
        .run(documents, progress)
        .await
}
