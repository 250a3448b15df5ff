use async_trait::async_trait;
use financial_risk_analyst::*;
use futures::FutureExt;
use std::collections::{HashMap, VecDeque};
use std::panic::AssertUnwindSafe;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;

#[derive(Default)]
struct StubState {
    /// Per display name: state returned by ingest, then by each poll.
    scripts: Mutex<HashMap<String, VecDeque<FileState>>>,
    generate_reply: Mutex<Option<std::result::Result<String, String>>>,
    fail_deletes: bool,
    panic_on_generate: bool,
    remove_local_on_ingest: bool,
    fail_ingest_for: Option<String>,
    fail_poll_for: Option<String>,
    panic_on_poll_for: Option<String>,
    ingested: Mutex<Vec<String>>,
    polls: Mutex<usize>,
    deleted: Mutex<Vec<String>>,
    generate_calls: Mutex<Vec<(String, Vec<String>)>>,
}

struct StubService {
    state: Arc<StubState>,
}

impl StubState {
    fn script(self, name: &str, states: &[FileState]) -> Self {
        self.scripts
            .lock()
            .unwrap()
            .insert(name.to_string(), states.iter().copied().collect());
        self
    }

    fn reply(self, reply: std::result::Result<&str, &str>) -> Self {
        *self.generate_reply.lock().unwrap() =
            Some(reply.map(str::to_string).map_err(str::to_string));
        self
    }

    fn next_state(&self, name: &str) -> FileState {
        let mut scripts = self.scripts.lock().unwrap();
        let queue = scripts.entry(name.to_string()).or_default();
        if queue.len() > 1 {
            queue.pop_front().unwrap()
        } else {
            queue.front().copied().unwrap_or(FileState::Active)
        }
    }
}

#[async_trait]
impl InferenceService for StubService {
    async fn ingest(&self, path: &Path, display_name: &str) -> Result<RemoteFileHandle> {
        assert!(path.exists(), "staged file must exist before ingest");
        if self.state.remove_local_on_ingest {
            std::fs::remove_file(path).unwrap();
        }
        if self.state.fail_ingest_for.as_deref() == Some(display_name) {
            return Err(AnalysisError::Transport(format!(
                "File upload failed (status 503): {}",
                display_name
            )));
        }
        self.state
            .ingested
            .lock()
            .unwrap()
            .push(display_name.to_string());
        Ok(RemoteFileHandle {
            remote_id: format!("files/{}", display_name),
            display_name: display_name.to_string(),
            uri: format!("mem://files/{}", display_name),
            mime_type: "application/pdf".to_string(),
            state: self.state.next_state(display_name),
        })
    }

    async fn poll_status(&self, remote_id: &str) -> Result<FileState> {
        *self.state.polls.lock().unwrap() += 1;
        let name = remote_id.trim_start_matches("files/");
        if self.state.panic_on_poll_for.as_deref() == Some(name) {
            panic!("status decoder exploded");
        }
        if self.state.fail_poll_for.as_deref() == Some(name) {
            return Err(AnalysisError::Transport(
                "File status check failed (status 500): backend error".to_string(),
            ));
        }
        Ok(self.state.next_state(name))
    }

    async fn generate(&self, prompt: &str, handles: &[RemoteFileHandle]) -> Result<String> {
        if self.state.panic_on_generate {
            panic!("model exploded");
        }
        self.state.generate_calls.lock().unwrap().push((
            prompt.to_string(),
            handles.iter().map(|h| h.remote_id.clone()).collect(),
        ));
        match self.state.generate_reply.lock().unwrap().clone() {
            Some(Ok(text)) => Ok(text),
            Some(Err(message)) => Err(AnalysisError::Transport(message)),
            None => Ok(String::new()),
        }
    }

    async fn delete(&self, remote_id: &str) -> Result<()> {
        self.state.deleted.lock().unwrap().push(remote_id.to_string());
        if self.state.fail_deletes {
            return Err(AnalysisError::Transport("delete refused".to_string()));
        }
        Ok(())
    }
}

#[derive(Default)]
struct StagingCounters {
    staged: Mutex<Vec<PathBuf>>,
    removals: Mutex<usize>,
}

/// Real temp-file staging that records what it did; fails on the document named `fail_on`.
struct CountingStaging {
    inner: TempStaging,
    counters: Arc<StagingCounters>,
    fail_on: Option<String>,
}

impl StagingArea for CountingStaging {
    fn stage(&self, document: &UploadedDocument) -> Result<StagedFile> {
        if self.fail_on.as_deref() == Some(document.name.as_str()) {
            return Err(AnalysisError::LocalIo {
                path: self.inner.dir().to_path_buf(),
                source: std::io::Error::new(std::io::ErrorKind::Other, "disk full"),
            });
        }
        let staged = self.inner.stage(document)?;
        self.counters
            .staged
            .lock()
            .unwrap()
            .push(staged.local_path.clone());
        Ok(staged)
    }

    fn remove(&self, staged: &StagedFile) -> Result<()> {
        *self.counters.removals.lock().unwrap() += 1;
        self.inner.remove(staged)
    }
}

struct Harness {
    analyzer: DocumentAnalyzer<StubService, CountingStaging>,
    service: Arc<StubState>,
    staging: Arc<StagingCounters>,
    dir: tempfile::TempDir,
}

fn harness(state: StubState, fail_on: Option<&str>) -> Harness {
    let dir = tempfile::tempdir().unwrap();
    let service = Arc::new(state);
    let staging = Arc::new(StagingCounters::default());
    let analyzer = DocumentAnalyzer::new(
        StubService {
            state: service.clone(),
        },
        CountingStaging {
            inner: TempStaging::new(dir.path()),
            counters: staging.clone(),
            fail_on: fail_on.map(str::to_string),
        },
    )
    .with_poll_policy(PollPolicy::fixed(
        Duration::from_millis(1),
        50,
        Duration::from_secs(5),
    ));

    Harness {
        analyzer,
        service,
        staging,
        dir,
    }
}

fn docs(names: &[&str]) -> Vec<UploadedDocument> {
    names
        .iter()
        .map(|name| UploadedDocument::new(*name, format!("%PDF {}", name).into_bytes()))
        .collect()
}

fn dir_is_empty(dir: &Path) -> bool {
    std::fs::read_dir(dir).unwrap().next().is_none()
}

#[tokio::test]
async fn test_single_document_active_after_two_polls() {
    let h = harness(
        StubState::default()
            .script(
                "balance.pdf",
                &[FileState::Processing, FileState::Processing, FileState::Active],
            )
            .reply(Ok("OK")),
        None,
    );

    let report = h.analyzer.run(&docs(&["balance.pdf"]), None).await.unwrap();

    assert_eq!(report, "OK");
    assert_eq!(*h.service.polls.lock().unwrap(), 2);
    assert_eq!(*h.service.deleted.lock().unwrap(), vec!["files/balance.pdf"]);
    assert_eq!(*h.staging.removals.lock().unwrap(), 1);
    assert!(dir_is_empty(h.dir.path()));

    let calls = h.service.generate_calls.lock().unwrap();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].0, PromptTemplate::credit_risk().text());
}

#[tokio::test]
async fn test_second_document_failed_aborts_before_generate() {
    let h = harness(
        StubState::default()
            .script("2022.pdf", &[FileState::Active])
            .script("2023.pdf", &[FileState::Processing, FileState::Failed])
            .reply(Ok("never")),
        None,
    );

    let err = h
        .analyzer
        .run(&docs(&["2022.pdf", "2023.pdf"]), None)
        .await
        .unwrap_err();

    match err {
        AnalysisError::IngestionFailed { document } => assert_eq!(document, "2023.pdf"),
        other => panic!("expected ingestion failure, got {:?}", other),
    }
    assert!(h.service.generate_calls.lock().unwrap().is_empty());
    assert_eq!(*h.service.deleted.lock().unwrap(), vec!["files/2022.pdf"]);
    assert_eq!(*h.staging.removals.lock().unwrap(), 2);
    assert!(dir_is_empty(h.dir.path()));
}

#[tokio::test]
async fn test_empty_upload_creates_nothing() {
    let h = harness(StubState::default(), None);

    let err = h.analyzer.run(&[], None).await.unwrap_err();

    assert!(matches!(err, AnalysisError::NoDocuments));
    assert!(h.service.ingested.lock().unwrap().is_empty());
    assert!(h.staging.staged.lock().unwrap().is_empty());
    assert_eq!(*h.staging.removals.lock().unwrap(), 0);
    assert!(dir_is_empty(h.dir.path()));
}

#[tokio::test]
async fn test_generate_receives_handles_in_upload_order() {
    let h = harness(
        StubState::default()
            .script("c_dec_2021.pdf", &[FileState::Processing, FileState::Active])
            .script("a_dec_2022.pdf", &[FileState::Active])
            .script("b_jun_2023.pdf", &[FileState::Processing, FileState::Processing, FileState::Active])
            .reply(Ok("report")),
        None,
    );

    h.analyzer
        .run(
            &docs(&["c_dec_2021.pdf", "a_dec_2022.pdf", "b_jun_2023.pdf"]),
            None,
        )
        .await
        .unwrap();

    let calls = h.service.generate_calls.lock().unwrap();
    assert_eq!(
        calls[0].1,
        vec![
            "files/c_dec_2021.pdf",
            "files/a_dec_2022.pdf",
            "files/b_jun_2023.pdf"
        ]
    );
    assert_eq!(
        *h.service.ingested.lock().unwrap(),
        vec!["c_dec_2021.pdf", "a_dec_2022.pdf", "b_jun_2023.pdf"]
    );
}

#[tokio::test]
async fn test_transport_error_is_surfaced_verbatim_and_cleaned_up() {
    let h = harness(
        StubState::default().reply(Err("Gemini API request failed (status 429): quota")),
        None,
    );

    let err = h
        .analyzer
        .run(&docs(&["a.pdf", "b.pdf"]), None)
        .await
        .unwrap_err();

    match err {
        AnalysisError::Transport(message) => {
            assert_eq!(message, "Gemini API request failed (status 429): quota")
        }
        other => panic!("expected transport error, got {:?}", other),
    }
    assert_eq!(h.service.deleted.lock().unwrap().len(), 2);
    assert_eq!(*h.staging.removals.lock().unwrap(), 2);
}

#[tokio::test]
async fn test_remote_delete_failures_are_swallowed() {
    let state = StubState {
        fail_deletes: true,
        ..StubState::default()
    }
    .reply(Ok("fine"));
    let h = harness(state, None);

    let report = h.analyzer.run(&docs(&["a.pdf", "b.pdf"]), None).await.unwrap();

    assert_eq!(report, "fine");
    assert_eq!(h.service.deleted.lock().unwrap().len(), 2);
    assert_eq!(*h.staging.removals.lock().unwrap(), 2);
}

#[tokio::test]
async fn test_missing_staged_file_does_not_fail_cleanup() {
    let state = StubState {
        remove_local_on_ingest: true,
        ..StubState::default()
    }
    .reply(Ok("fine"));
    let h = harness(state, None);

    let report = h.analyzer.run(&docs(&["a.pdf"]), None).await.unwrap();

    assert_eq!(report, "fine");
    assert_eq!(*h.staging.removals.lock().unwrap(), 1);
}

#[tokio::test]
async fn test_staging_failure_releases_earlier_files() {
    let h = harness(StubState::default().reply(Ok("never")), Some("b.pdf"));

    let err = h
        .analyzer
        .run(&docs(&["a.pdf", "b.pdf", "c.pdf"]), None)
        .await
        .unwrap_err();

    assert!(matches!(err, AnalysisError::LocalIo { .. }));
    assert!(h.service.ingested.lock().unwrap().is_empty());
    assert!(h.service.deleted.lock().unwrap().is_empty());
    assert_eq!(h.staging.staged.lock().unwrap().len(), 1);
    assert_eq!(*h.staging.removals.lock().unwrap(), 1);
    assert!(dir_is_empty(h.dir.path()));
}

#[tokio::test]
async fn test_panic_in_service_still_cleans_up() {
    let state = StubState {
        panic_on_generate: true,
        ..StubState::default()
    };
    let h = harness(state, None);
    let documents = docs(&["a.pdf", "b.pdf"]);

    let outcome = AssertUnwindSafe(h.analyzer.run(&documents, None))
        .catch_unwind()
        .await;

    assert!(outcome.is_err(), "panic should propagate to the caller");
    assert_eq!(h.service.deleted.lock().unwrap().len(), 2);
    assert_eq!(*h.staging.removals.lock().unwrap(), 2);
    assert!(dir_is_empty(h.dir.path()));
}

#[tokio::test]
async fn test_progress_events_for_successful_run() {
    let h = harness(StubState::default().reply(Ok("done")), None);
    let (tx, mut rx) = mpsc::channel(64);

    h.analyzer
        .run(&docs(&["a.pdf", "b.pdf"]), Some(tx))
        .await
        .unwrap();

    let mut events = Vec::new();
    while let Some(event) = rx.recv().await {
        events.push(event);
    }

    let fractions: Vec<f64> = events.iter().filter_map(|e| e.fraction()).collect();
    assert_eq!(fractions, vec![0.25, 0.5, 0.75, 1.0]);

    let phases: Vec<RunPhase> = events
        .iter()
        .filter_map(|e| match e {
            ProgressEvent::Phase(phase) => Some(*phase),
            _ => None,
        })
        .collect();
    assert_eq!(
        phases,
        vec![
            RunPhase::Staging,
            RunPhase::Ingesting,
            RunPhase::Generating,
            RunPhase::Succeeded,
            RunPhase::CleanedUp,
            RunPhase::Idle
        ]
    );

    let uploads = events
        .iter()
        .filter(|e| matches!(e, ProgressEvent::Uploading { .. }))
        .count();
    assert_eq!(uploads, 2);
    assert!(events.contains(&ProgressEvent::Cleared));
}

#[tokio::test]
async fn test_progress_reports_failure_reason() {
    let h = harness(
        StubState::default().script("bad.pdf", &[FileState::Failed]),
        None,
    );
    let (tx, mut rx) = mpsc::channel(64);

    let _ = h.analyzer.run(&docs(&["bad.pdf"]), Some(tx)).await;

    let mut reason = None;
    let mut saw_generating = false;
    while let Some(event) = rx.recv().await {
        match event {
            ProgressEvent::Failed { reason: r } => reason = Some(r),
            ProgressEvent::Phase(RunPhase::Generating) => saw_generating = true,
            _ => {}
        }
    }
    assert!(reason.unwrap().contains("bad.pdf"));
    assert!(!saw_generating);
}

#[tokio::test]
async fn test_custom_prompt_is_sent_unmodified() {
    let prompt = PromptTemplate::new("liquidity", "Assess liquidity only.").unwrap();
    let h = harness(StubState::default().reply(Ok("ok")), None);
    let analyzer = h.analyzer.with_prompt(prompt);

    analyzer.run(&docs(&["a.pdf"]), None).await.unwrap();

    let calls = h.service.generate_calls.lock().unwrap();
    assert_eq!(calls[0].0, "Assess liquidity only.");
}

#[tokio::test]
async fn test_poll_error_on_second_document_releases_both() {
    let state = StubState {
        fail_poll_for: Some("b.pdf".to_string()),
        ..StubState::default()
    }
    .script("a.pdf", &[FileState::Active])
    .script("b.pdf", &[FileState::Processing])
    .reply(Ok("never"));
    let h = harness(state, None);

    let err = h
        .analyzer
        .run(&docs(&["a.pdf", "b.pdf"]), None)
        .await
        .unwrap_err();

    match err {
        AnalysisError::Transport(message) => assert!(message.contains("status 500"), "{}", message),
        other => panic!("expected transport error, got {:?}", other),
    }
    assert!(h.service.generate_calls.lock().unwrap().is_empty());
    assert_eq!(
        *h.service.deleted.lock().unwrap(),
        vec!["files/a.pdf", "files/b.pdf"]
    );
    assert_eq!(*h.staging.removals.lock().unwrap(), 2);
    assert!(dir_is_empty(h.dir.path()));
}

#[tokio::test]
async fn test_ingest_error_on_second_document_releases_first() {
    let state = StubState {
        fail_ingest_for: Some("b.pdf".to_string()),
        ..StubState::default()
    }
    .reply(Ok("never"));
    let h = harness(state, None);

    let err = h
        .analyzer
        .run(&docs(&["a.pdf", "b.pdf"]), None)
        .await
        .unwrap_err();

    assert!(matches!(err, AnalysisError::Transport(_)));
    assert!(h.service.generate_calls.lock().unwrap().is_empty());
    assert_eq!(*h.service.deleted.lock().unwrap(), vec!["files/a.pdf"]);
    assert_eq!(*h.staging.removals.lock().unwrap(), 2);
    assert!(dir_is_empty(h.dir.path()));
}

#[tokio::test]
async fn test_panic_while_polling_deletes_processing_file() {
    let state = StubState {
        panic_on_poll_for: Some("b.pdf".to_string()),
        ..StubState::default()
    }
    .script("a.pdf", &[FileState::Active])
    .script("b.pdf", &[FileState::Processing]);
    let h = harness(state, None);
    let documents = docs(&["a.pdf", "b.pdf"]);

    let outcome = AssertUnwindSafe(h.analyzer.run(&documents, None))
        .catch_unwind()
        .await;

    assert!(outcome.is_err(), "panic should propagate to the caller");
    assert!(h.service.generate_calls.lock().unwrap().is_empty());
    assert_eq!(
        *h.service.deleted.lock().unwrap(),
        vec!["files/a.pdf", "files/b.pdf"]
    );
    assert_eq!(*h.staging.removals.lock().unwrap(), 2);
    assert!(dir_is_empty(h.dir.path()));
}
