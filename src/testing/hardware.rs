//! Simulated capture hardware
//!
//! Behaves like a multi-camera session: outputs write a placeholder movie file
//! and report completion through their handle, either inline on stop or from a
//! separate thread when a finalize delay or completion barrier is set.

use super::synthetic_data::{synthetic_video_frame, SimulatedCameraProfile};
use crate::discovery::{DeviceProvider, DiscoveredCamera};
use crate::errors::BackendError;
use crate::permissions::{AuthorizationProvider, MediaKind, PermissionInfo, PermissionStatus};
use crate::session::{
    CaptureBackend, CompletionHandle, Connection, FinishedRecording, InputDevice,
    MovieFileOutput, OutputId, SessionGraph,
};
use crate::types::{AudioDevice, CameraPosition, CaptureDevice, DeviceSet, Size};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Barrier, Mutex, MutexGuard};
use std::time::Duration;
use tokio::time::Instant;

/// Shortest recording a simulated output reports (one frame at 30 fps)
const MIN_RECORDED: Duration = Duration::from_millis(33);

struct ActiveRecording {
    destination: PathBuf,
    handle: CompletionHandle,
    started_at: Instant,
}

#[derive(Default)]
struct OutputBehavior {
    fail_next_start: Option<String>,
    fail_next_recording: Option<String>,
    recorded_duration: Option<Duration>,
    finalize_delay: Option<Duration>,
    open_delay: Option<Duration>,
    completion_barrier: Option<Arc<Barrier>>,
}

/// Movie-file output that writes placeholder files
pub struct SimulatedOutput {
    position: CameraPosition,
    profile: SimulatedCameraProfile,
    has_audio: bool,
    active: Mutex<Option<ActiveRecording>>,
    behavior: Mutex<OutputBehavior>,
    start_calls: AtomicUsize,
    stop_calls: AtomicUsize,
    /// The simulated device finished opening for the current recording
    opened: Arc<AtomicBool>,
}

impl SimulatedOutput {
    pub fn new(position: CameraPosition) -> Self {
        Self {
            position,
            profile: SimulatedCameraProfile::default(),
            has_audio: true,
            active: Mutex::new(None),
            behavior: Mutex::new(OutputBehavior::default()),
            start_calls: AtomicUsize::new(0),
            stop_calls: AtomicUsize::new(0),
            opened: Arc::new(AtomicBool::new(false)),
        }
    }

    fn behavior(&self) -> MutexGuard<'_, OutputBehavior> {
        self.behavior.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn active(&self) -> MutexGuard<'_, Option<ActiveRecording>> {
        self.active.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Reject the next `start_recording` call
    pub fn fail_next_start(&self, reason: &str) {
        self.behavior().fail_next_start = Some(reason.to_string());
    }

    /// Report the next recording as failed when it finalizes
    pub fn fail_next_recording(&self, reason: &str) {
        self.behavior().fail_next_recording = Some(reason.to_string());
    }

    /// Report a fixed duration instead of the measured one
    pub fn set_recorded_duration(&self, duration: Duration) {
        self.behavior().recorded_duration = Some(duration);
    }

    /// Finalize on a separate thread after `delay`
    pub fn set_finalize_delay(&self, delay: Duration) {
        self.behavior().finalize_delay = Some(delay);
    }

    /// Finish opening the device on a separate thread `delay` after
    /// `start_recording` has returned, the way a slow camera does
    pub fn set_open_delay(&self, delay: Duration) {
        self.behavior().open_delay = Some(delay);
    }

    /// Whether the current recording's device has finished opening
    pub fn is_open(&self) -> bool {
        self.opened.load(Ordering::SeqCst)
    }

    /// Finalize on a separate thread once every barrier party is ready
    pub fn set_completion_barrier(&self, barrier: Arc<Barrier>) {
        self.behavior().completion_barrier = Some(barrier);
    }

    pub fn start_calls(&self) -> usize {
        self.start_calls.load(Ordering::SeqCst)
    }

    pub fn stop_calls(&self) -> usize {
        self.stop_calls.load(Ordering::SeqCst)
    }

    fn finished(&self, recording: &ActiveRecording, fail: Option<String>, duration: Option<Duration>) -> Result<FinishedRecording, BackendError> {
        if let Some(reason) = fail {
            return Err(BackendError::new(reason));
        }
        write_placeholder(&recording.destination)?;

        let duration = duration.unwrap_or_else(|| recording.started_at.elapsed().max(MIN_RECORDED));
        let (width, height) = self.profile.resolution;
        let (poster_w, poster_h) = self.profile.poster_resolution;
        Ok(FinishedRecording {
            path: recording.destination.clone(),
            duration,
            video_size: Size::new(width as f64, height as f64),
            has_audio: self.has_audio,
            poster: Some(synthetic_video_frame(self.position, 0, poster_w, poster_h)),
        })
    }
}

fn write_placeholder(path: &Path) -> Result<(), BackendError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .map_err(|e| BackendError::new(format!("cannot create {}: {}", parent.display(), e)))?;
    }
    std::fs::write(path, b"simulated movie")
        .map_err(|e| BackendError::new(format!("cannot write {}: {}", path.display(), e)))
}

impl MovieFileOutput for SimulatedOutput {
    fn position(&self) -> CameraPosition {
        self.position
    }

    fn start_recording(&self, destination: &Path, completion: CompletionHandle) -> Result<(), BackendError> {
        self.start_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(reason) = self.behavior().fail_next_start.take() {
            return Err(BackendError::new(reason));
        }

        let mut active = self.active();
        if active.is_some() {
            return Err(BackendError::new("output is already recording"));
        }
        *active = Some(ActiveRecording {
            destination: destination.to_path_buf(),
            handle: completion,
            started_at: Instant::now(),
        });

        self.opened.store(false, Ordering::SeqCst);
        match self.behavior().open_delay {
            Some(delay) => {
                let opened = self.opened.clone();
                std::thread::spawn(move || {
                    std::thread::sleep(delay);
                    opened.store(true, Ordering::SeqCst);
                });
            }
            None => self.opened.store(true, Ordering::SeqCst),
        }
        log::debug!("Simulated {} output recording to {:?}", self.position, destination);
        Ok(())
    }

    fn stop_recording(&self) {
        self.stop_calls.fetch_add(1, Ordering::SeqCst);
        let Some(recording) = self.active().take() else {
            return;
        };

        let (fail, duration, delay, barrier) = {
            let mut behavior = self.behavior();
            (
                behavior.fail_next_recording.take(),
                behavior.recorded_duration,
                behavior.finalize_delay,
                behavior.completion_barrier.clone(),
            )
        };
        let result = self.finished(&recording, fail, duration);
        let handle = recording.handle;

        if delay.is_none() && barrier.is_none() {
            handle.finish(result);
            return;
        }

        std::thread::spawn(move || {
            if let Some(delay) = delay {
                std::thread::sleep(delay);
            }
            if let Some(barrier) = barrier {
                barrier.wait();
            }
            handle.finish(result);
        });
    }

    fn is_recording(&self) -> bool {
        self.active().is_some()
    }
}

/// Failure to inject into a [`SimulatedBackend`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendFault {
    NoMultiCam,
    RejectInput(String),
    RejectOutput(CameraPosition),
    RejectConnection(CameraPosition),
    RejectCommit,
    FailStart,
}

/// Multi-camera session backed by [`SimulatedOutput`]s
#[derive(Default)]
pub struct SimulatedBackend {
    faults: Vec<BackendFault>,
    outputs: Mutex<HashMap<CameraPosition, Arc<SimulatedOutput>>>,
    applied: AtomicUsize,
    running: AtomicBool,
    stop_calls: AtomicUsize,
}

impl SimulatedBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_fault(mut self, fault: BackendFault) -> Self {
        self.faults.push(fault);
        self
    }

    fn has_fault(&self, fault: &BackendFault) -> bool {
        self.faults.contains(fault)
    }

    /// Most recently created output for `position`
    pub fn output(&self, position: CameraPosition) -> Option<Arc<SimulatedOutput>> {
        self.outputs
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(&position)
            .cloned()
    }

    pub fn applied_configurations(&self) -> usize {
        self.applied.load(Ordering::SeqCst)
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub fn stop_calls(&self) -> usize {
        self.stop_calls.load(Ordering::SeqCst)
    }
}

impl CaptureBackend for SimulatedBackend {
    fn supports_multi_cam(&self) -> bool {
        !self.has_fault(&BackendFault::NoMultiCam)
    }

    fn open_input(&self, device: InputDevice<'_>) -> Result<(), BackendError> {
        if self.has_fault(&BackendFault::RejectInput(device.id().to_string())) {
            return Err(BackendError::new("device is in use by another session"));
        }
        Ok(())
    }

    fn create_movie_output(&self, position: CameraPosition) -> Result<Arc<dyn MovieFileOutput>, BackendError> {
        if self.has_fault(&BackendFault::RejectOutput(position)) {
            return Err(BackendError::new("session cannot add another output"));
        }
        let output = Arc::new(SimulatedOutput::new(position));
        self.outputs
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(position, output.clone());
        Ok(output)
    }

    fn can_add_connection(&self, connection: &Connection) -> Result<(), BackendError> {
        let OutputId(position) = connection.output;
        if self.has_fault(&BackendFault::RejectConnection(position)) {
            return Err(BackendError::new("connection not supported by hardware"));
        }
        Ok(())
    }

    fn apply_configuration(&self, graph: &SessionGraph) -> Result<(), BackendError> {
        if self.has_fault(&BackendFault::RejectCommit) {
            return Err(BackendError::new("hardware cost exceeded"));
        }
        self.applied.fetch_add(1, Ordering::SeqCst);
        log::debug!("Simulated session applied {} connections", graph.connections().len());
        Ok(())
    }

    fn start_running(&self) -> Result<(), BackendError> {
        if self.has_fault(&BackendFault::FailStart) {
            return Err(BackendError::new("camera hardware failed to start"));
        }
        self.running.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn stop_running(&self) {
        self.stop_calls.fetch_add(1, Ordering::SeqCst);
        self.running.store(false, Ordering::SeqCst);
    }
}

/// Device provider returning a fixed device list
#[derive(Debug, Clone)]
pub struct SimulatedDevices {
    cameras: Vec<DiscoveredCamera>,
    microphones: Vec<AudioDevice>,
    failure: Option<String>,
}

impl SimulatedDevices {
    fn default_microphone() -> AudioDevice {
        AudioDevice::new("sim-mic", SimulatedCameraProfile::default().mic_name)
    }

    /// Front camera, back camera and a microphone
    pub fn dual() -> Self {
        let profile = SimulatedCameraProfile::default();
        Self {
            cameras: vec![
                DiscoveredCamera::new("sim-front", profile.front_name).at(CameraPosition::Front),
                DiscoveredCamera::new("sim-back", profile.back_name).at(CameraPosition::Back),
            ],
            microphones: vec![Self::default_microphone()],
            failure: None,
        }
    }

    pub fn back_only() -> Self {
        let profile = SimulatedCameraProfile::default();
        Self {
            cameras: vec![DiscoveredCamera::new("sim-back", profile.back_name).at(CameraPosition::Back)],
            microphones: vec![Self::default_microphone()],
            failure: None,
        }
    }

    pub fn from_cameras(cameras: Vec<DiscoveredCamera>) -> Self {
        Self {
            cameras,
            microphones: vec![Self::default_microphone()],
            failure: None,
        }
    }

    pub fn without_audio(mut self) -> Self {
        self.microphones.clear();
        self
    }

    pub fn failing(mut self, message: &str) -> Self {
        self.failure = Some(message.to_string());
        self
    }
}

impl DeviceProvider for SimulatedDevices {
    fn video_devices(&self) -> Result<Vec<DiscoveredCamera>, BackendError> {
        match &self.failure {
            Some(message) => Err(BackendError::new(message.clone())),
            None => Ok(self.cameras.clone()),
        }
    }

    fn audio_devices(&self) -> Result<Vec<AudioDevice>, BackendError> {
        match &self.failure {
            Some(message) => Err(BackendError::new(message.clone())),
            None => Ok(self.microphones.clone()),
        }
    }
}

/// The device set [`SimulatedDevices::dual`] resolves to
pub fn simulated_device_set() -> DeviceSet {
    let profile = SimulatedCameraProfile::default();
    DeviceSet {
        front: CaptureDevice::new("sim-front", profile.front_name, CameraPosition::Front),
        back: CaptureDevice::new("sim-back", profile.back_name, CameraPosition::Back),
        audio: SimulatedDevices::default_microphone(),
    }
}

/// Authorization provider with scripted answers
#[derive(Debug)]
pub struct SimulatedAuthorization {
    camera: PermissionStatus,
    microphone: PermissionStatus,
    undetermined: bool,
    delays: HashMap<MediaKind, Duration>,
    requests: AtomicUsize,
}

impl SimulatedAuthorization {
    pub fn new(camera: PermissionStatus, microphone: PermissionStatus) -> Self {
        Self {
            camera,
            microphone,
            undetermined: false,
            delays: HashMap::new(),
            requests: AtomicUsize::new(0),
        }
    }

    pub fn granting() -> Self {
        Self::new(PermissionStatus::Granted, PermissionStatus::Granted)
    }

    /// Report `NotDetermined` until asked, then answer with the scripted status
    pub fn undetermined(mut self) -> Self {
        self.undetermined = true;
        self
    }

    /// Block the request for `kind` for `delay`, like a pending system prompt
    pub fn with_request_delay(mut self, kind: MediaKind, delay: Duration) -> Self {
        self.delays.insert(kind, delay);
        self
    }

    pub fn request_count(&self) -> usize {
        self.requests.load(Ordering::SeqCst)
    }

    fn scripted(&self, kind: MediaKind) -> PermissionStatus {
        match kind {
            MediaKind::Video => self.camera,
            MediaKind::Audio => self.microphone,
        }
    }
}

impl AuthorizationProvider for SimulatedAuthorization {
    fn status(&self, kind: MediaKind) -> PermissionInfo {
        if self.undetermined {
            return PermissionInfo::new(
                PermissionStatus::NotDetermined,
                format!("{} access not requested yet", kind.as_str()),
                true,
            );
        }
        let status = self.scripted(kind);
        PermissionInfo::new(
            status,
            format!("simulated {} access: {}", kind.as_str(), status),
            status == PermissionStatus::NotDetermined,
        )
    }

    fn request(&self, kind: MediaKind) -> PermissionInfo {
        self.requests.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delays.get(&kind) {
            std::thread::sleep(*delay);
        }
        let status = self.scripted(kind);
        PermissionInfo::new(status, format!("simulated {} prompt: {}", kind.as_str(), status), false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    #[tokio::test]
    async fn test_output_reports_completion_on_stop() {
        let dir = tempfile::tempdir().unwrap();
        let output = SimulatedOutput::new(CameraPosition::Front);
        let (tx, mut rx) = mpsc::unbounded_channel();
        let path = dir.path().join("front.mp4");

        output
            .start_recording(&path, CompletionHandle::new(CameraPosition::Front, 3, tx))
            .unwrap();
        assert!(output.is_recording());
        output.stop_recording();
        output.stop_recording();

        let completion = rx.recv().await.unwrap();
        let recording = completion.result.unwrap();
        assert_eq!(recording.path, path);
        assert!(path.exists());
        assert!(recording.poster.unwrap().is_valid());
        assert!(!output.is_recording());
        assert_eq!(output.stop_calls(), 2);
    }

    #[tokio::test]
    async fn test_second_start_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let output = SimulatedOutput::new(CameraPosition::Back);
        let (tx, _rx) = mpsc::unbounded_channel();
        output
            .start_recording(&dir.path().join("a.mp4"), CompletionHandle::new(CameraPosition::Back, 1, tx.clone()))
            .unwrap();
        assert!(output
            .start_recording(&dir.path().join("b.mp4"), CompletionHandle::new(CameraPosition::Back, 1, tx))
            .is_err());
    }

    #[test]
    fn test_open_delay_does_not_hold_start() {
        let dir = tempfile::tempdir().unwrap();
        let output = SimulatedOutput::new(CameraPosition::Front);
        output.set_open_delay(Duration::from_millis(200));
        let (tx, _rx) = mpsc::unbounded_channel();

        let issued = std::time::Instant::now();
        output
            .start_recording(&dir.path().join("f.mp4"), CompletionHandle::new(CameraPosition::Front, 1, tx))
            .unwrap();
        assert!(issued.elapsed() < Duration::from_millis(200));
        assert!(!output.is_open());

        std::thread::sleep(Duration::from_millis(300));
        assert!(output.is_open());
    }

    #[test]
    fn test_backend_tracks_outputs() {
        let backend = SimulatedBackend::new();
        assert!(backend.output(CameraPosition::Front).is_none());
        backend.create_movie_output(CameraPosition::Front).unwrap();
        assert!(backend.output(CameraPosition::Front).is_some());
    }
}
