use crate::session::{FinishedRecording, OutputPair};
use crate::types::CameraPosition;
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::Instant;

/// Observable recording signals
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct RecordingState {
    pub is_recording: bool,
    /// 0.0..=1.0, non-decreasing within one recording
    pub progress: f64,
    pub error: Option<String>,
    /// Composition or persistence still running for a finished recording
    pub finalizing: bool,
    pub last_asset: Option<PathBuf>,
    pub completed_recordings: u64,
}

/// Aborts the progress tick task when the recording ends, on every path
pub(crate) struct TickGuard(pub(crate) JoinHandle<()>);

impl Drop for TickGuard {
    fn drop(&mut self) {
        self.0.abort();
    }
}

/// Bookkeeping for the recording in flight
pub(crate) struct RecordingSession {
    pub id: u64,
    pub started_at: Instant,
    pub target: Duration,
    pub outputs: OutputPair,
    /// Outputs whose completion has not arrived yet
    pub pending: HashSet<CameraPosition>,
    pub finished: HashMap<CameraPosition, FinishedRecording>,
    pub failures: Vec<String>,
    pub stop_requested: bool,
    pub progress: f64,
    pub ticker: Option<TickGuard>,
}

impl RecordingSession {
    /// Advance progress from elapsed time. Never moves backwards.
    pub fn update_progress(&mut self, now: Instant) -> f64 {
        let elapsed = now.saturating_duration_since(self.started_at);
        let fraction = (elapsed.as_secs_f64() / self.target.as_secs_f64()).min(1.0);
        self.progress = self.progress.max(fraction);
        self.progress
    }
}
