//! Movie-file outputs and their completion contract

use crate::errors::BackendError;
use crate::types::{CameraPosition, RgbFrame, Size};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::sync::mpsc;

/// A finalized per-camera movie file
#[derive(Debug, Clone, PartialEq)]
pub struct FinishedRecording {
    pub path: PathBuf,
    pub duration: Duration,
    pub video_size: Size,
    pub has_audio: bool,
    pub poster: Option<RgbFrame>,
}

/// Completion message posted once per output per recording
#[derive(Debug, Clone)]
pub struct OutputCompletion {
    pub position: CameraPosition,
    pub recording_id: u64,
    pub result: Result<FinishedRecording, BackendError>,
}

/// One-shot completion channel handed to an output when recording starts.
///
/// Consuming `finish` guarantees at most one completion; dropping the handle
/// unfinished posts a failure so the coordinator never waits forever.
#[derive(Debug)]
pub struct CompletionHandle {
    position: CameraPosition,
    recording_id: u64,
    tx: Option<mpsc::UnboundedSender<OutputCompletion>>,
}

impl CompletionHandle {
    pub fn new(
        position: CameraPosition,
        recording_id: u64,
        tx: mpsc::UnboundedSender<OutputCompletion>,
    ) -> Self {
        Self {
            position,
            recording_id,
            tx: Some(tx),
        }
    }

    pub fn position(&self) -> CameraPosition {
        self.position
    }

    pub fn finish(mut self, result: Result<FinishedRecording, BackendError>) {
        self.send(result);
    }

    fn send(&mut self, result: Result<FinishedRecording, BackendError>) {
        if let Some(tx) = self.tx.take() {
            let completion = OutputCompletion {
                position: self.position,
                recording_id: self.recording_id,
                result,
            };
            if tx.send(completion).is_err() {
                log::debug!("{} completion dropped: coordinator gone", self.position);
            }
        }
    }
}

impl Drop for CompletionHandle {
    fn drop(&mut self) {
        if self.tx.is_some() {
            log::warn!("{} output released its recording without finishing it", self.position);
            self.send(Err(BackendError::new("output dropped without completing")));
        }
    }
}

/// A sink that writes one continuous movie file from its session connections.
///
/// At most one recording may be active; `start_recording` while recording is
/// an error. `stop_recording` returns immediately; finalization is reported
/// through the completion handle, from any thread.
pub trait MovieFileOutput: Send + Sync {
    fn position(&self) -> CameraPosition;

    fn start_recording(
        &self,
        destination: &Path,
        completion: CompletionHandle,
    ) -> Result<(), BackendError>;

    fn stop_recording(&self);

    fn is_recording(&self) -> bool;
}
