use serde::{Deserialize, Serialize};
use tokio::sync::mpsc::Sender;

/// Share of the progress bar reserved for ingestion.
pub const INGESTION_SHARE: f64 = 0.5;
/// Reported once every document is ingested and generation starts.
pub const GENERATING_FRACTION: f64 = 0.75;
pub const COMPLETE_FRACTION: f64 = 1.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RunPhase {
    Idle,
    Staging,
    Ingesting,
    Generating,
    Succeeded,
    Failed,
    CleanedUp,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ProgressEvent {
    Phase(RunPhase),
    Uploading {
        index: usize,
        total: usize,
        name: String,
    },
    Progress {
        fraction: f64,
    },
    Failed {
        reason: String,
    },
    /// The progress indication should be removed.
    Cleared,
}

impl ProgressEvent {
    pub fn fraction(&self) -> Option<f64> {
        match self {
            ProgressEvent::Progress { fraction } => Some(*fraction),
            _ => None,
        }
    }
}

/// Fraction reported after `completed` of `total` documents are ingested.
pub fn ingestion_fraction(completed: usize, total: usize) -> f64 {
    if total == 0 {
        return 0.0;
    }
    completed as f64 / total as f64 * INGESTION_SHARE
}

/// Sends events to an optional listener. A dropped receiver is ignored.
#[derive(Debug, Clone, Default)]
pub struct ProgressReporter {
    sender: Option<Sender<ProgressEvent>>,
    last_fraction: f64,
}

impl ProgressReporter {
    pub fn new(sender: Option<Sender<ProgressEvent>>) -> Self {
        Self {
            sender,
            last_fraction: 0.0,
        }
    }

    pub async fn send(&self, event: ProgressEvent) {
        if let Some(tx) = &self.sender {
            let _ = tx.send(event).await;
        }
    }

    /// Reports a fraction, never moving backwards.
    pub async fn progress(&mut self, fraction: f64) {
        let fraction = fraction.clamp(self.last_fraction, COMPLETE_FRACTION);
        self.last_fraction = fraction;
        self.send(ProgressEvent::Progress { fraction }).await;
    }

    pub async fn phase(&self, phase: RunPhase) {
        self.send(ProgressEvent::Phase(phase)).await;
    }
}
