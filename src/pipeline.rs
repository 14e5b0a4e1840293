//! End-to-end dual-camera pipeline
//!
//! Wires permission gate, discovery, session manager, recording coordinator,
//! composition and persistence from explicitly injected dependencies.

use crate::composition::{AssetExporter, AssetLoader, CompositionEngine};
use crate::config::{DualPovConfig, RecordingConfig};
use crate::coordinator::{CoordinatorSettings, RecordingCoordinator, RecordingState};
use crate::discovery::{DeviceDiscovery, DeviceProvider};
use crate::errors::{PipelineError, SetupError};
use crate::finalize::AssetFinalizer;
use crate::permissions::{
    AuthorizationOutcome, AuthorizationProvider, AuthorizationState, PermissionGate,
};
use crate::persistence::{PersistenceSink, PhotoLibrarySink, VideoEntry, VideoStore};
use crate::session::{CaptureBackend, CaptureSessionManager, SessionState};
use crate::types::DeviceSet;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// User-selectable recording length
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordingPreset {
    #[default]
    Short,
    Long,
}

impl RecordingPreset {
    pub fn duration(&self, config: &RecordingConfig) -> Duration {
        match self {
            RecordingPreset::Short => Duration::from_secs(config.short_duration_secs),
            RecordingPreset::Long => Duration::from_secs(config.long_duration_secs),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RecordingPreset::Short => "short",
            RecordingPreset::Long => "long",
        }
    }
}

impl std::str::FromStr for RecordingPreset {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "short" => Ok(RecordingPreset::Short),
            "long" => Ok(RecordingPreset::Long),
            other => Err(format!("unknown preset '{}' (expected short or long)", other)),
        }
    }
}

/// Hardware and storage the pipeline runs against
pub struct PipelineDeps {
    pub authorization: Arc<dyn AuthorizationProvider>,
    pub devices: Arc<dyn DeviceProvider>,
    pub backend: Arc<dyn CaptureBackend>,
    /// Reads track metadata of the files the backend writes
    pub loader: Arc<dyn AssetLoader>,
    pub exporter: Arc<dyn AssetExporter>,
    /// Local video store; also registered as a persistence sink
    pub store: Option<Arc<VideoStore>>,
    pub extra_sinks: Vec<Arc<dyn PersistenceSink>>,
}

/// Receivers for every observable pipeline signal
#[derive(Clone)]
pub struct PipelineSignals {
    pub authorization: watch::Receiver<AuthorizationState>,
    pub session: watch::Receiver<SessionState>,
    pub recording: watch::Receiver<RecordingState>,
}

/// Serializable snapshot for UI surfaces
#[derive(Debug, Clone, Serialize)]
pub struct PipelineStatus {
    pub authorization: AuthorizationState,
    pub session: SessionState,
    pub recording: RecordingState,
    pub preset: RecordingPreset,
    pub preset_duration_secs: u64,
}

pub struct DualCameraPipeline {
    config: DualPovConfig,
    gate: PermissionGate,
    discovery: Arc<DeviceDiscovery>,
    manager: Arc<CaptureSessionManager>,
    coordinator: RecordingCoordinator,
    coordinator_task: Mutex<Option<JoinHandle<()>>>,
    store: Option<Arc<VideoStore>>,
    preset: Mutex<RecordingPreset>,
}

impl DualCameraPipeline {
    /// Build the pipeline. Must be called inside a tokio runtime.
    pub fn new(config: DualPovConfig, deps: PipelineDeps) -> Self {
        let manager = Arc::new(CaptureSessionManager::new(
            deps.backend,
            config.capture.clone(),
        ));

        let mut sinks: Vec<Arc<dyn PersistenceSink>> = Vec::new();
        if let Some(store) = &deps.store {
            sinks.push(store.clone());
        }
        if let Some(dir) = &config.storage.library_directory {
            sinks.push(Arc::new(PhotoLibrarySink::new(dir.clone())));
        }
        sinks.extend(deps.extra_sinks);

        let engine = CompositionEngine::new(
            deps.loader,
            deps.exporter,
            &config.composition,
            config.storage.working_directory.clone(),
        );
        let finalizer = Arc::new(AssetFinalizer::new(engine, sinks));

        let (coordinator, task) = RecordingCoordinator::spawn(
            manager.clone(),
            finalizer,
            CoordinatorSettings::from_config(&config),
        );

        Self {
            gate: PermissionGate::new(deps.authorization),
            discovery: Arc::new(DeviceDiscovery::new(deps.devices, config.capture.clone())),
            manager,
            coordinator,
            coordinator_task: Mutex::new(Some(task)),
            store: deps.store,
            preset: Mutex::new(RecordingPreset::default()),
            config,
        }
    }

    pub fn config(&self) -> &DualPovConfig {
        &self.config
    }

    /// Ask for camera and microphone access without touching the session
    pub async fn request_authorization(&self) -> AuthorizationOutcome {
        self.gate.request_authorization().await
    }

    /// Authorize, discover, build and start the capture session.
    ///
    /// Any failure leaves capture unavailable and is published as the
    /// recording error signal.
    pub async fn prepare(&self) -> Result<DeviceSet, PipelineError> {
        let outcome = self.gate.request_authorization().await;
        if !outcome.all_granted() {
            let err = SetupError::NotAuthorized {
                camera: outcome.camera_granted,
                microphone: outcome.microphone_granted,
            };
            return Err(self.setup_failed(err).await);
        }

        let discovery = self.discovery.clone();
        let manager = self.manager.clone();
        let wired = tokio::task::spawn_blocking(move || -> Result<DeviceSet, SetupError> {
            let devices = discovery.discover_devices()?.require()?;
            manager.build(&devices)?;
            Ok(devices)
        })
        .await
        .map_err(|e| SetupError::StartFailed(format!("setup worker failed: {}", e)))
        .and_then(|r| r);

        let devices = match wired {
            Ok(devices) => devices,
            Err(e) => return Err(self.setup_failed(e).await),
        };

        if let Err(e) = self.manager.start().await {
            return Err(self.setup_failed(e).await);
        }

        log::info!(
            "Pipeline ready: front={}, back={}, audio={}",
            devices.front.name,
            devices.back.name,
            devices.audio.name
        );
        Ok(devices)
    }

    async fn setup_failed(&self, err: SetupError) -> PipelineError {
        log::error!("Capture setup failed: {}", err);
        self.coordinator.report_error(err.to_string()).await;
        err.into()
    }

    pub fn preset(&self) -> RecordingPreset {
        *self.preset.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Takes effect from the next recording
    pub fn set_preset(&self, preset: RecordingPreset) {
        *self.preset.lock().unwrap_or_else(|e| e.into_inner()) = preset;
        log::info!(
            "Recording preset set to {} ({}s)",
            preset.as_str(),
            preset.duration(&self.config.recording).as_secs()
        );
    }

    /// Record for the current preset's duration
    pub async fn start_recording(&self) -> Result<(), PipelineError> {
        let duration = self.preset().duration(&self.config.recording);
        self.start_recording_for(duration).await
    }

    pub async fn start_recording_for(&self, duration: Duration) -> Result<(), PipelineError> {
        Ok(self.coordinator.start_recording(duration).await?)
    }

    pub async fn stop_recording(&self) -> Result<(), PipelineError> {
        Ok(self.coordinator.stop_recording().await?)
    }

    pub fn signals(&self) -> PipelineSignals {
        PipelineSignals {
            authorization: self.gate.subscribe(),
            session: self.manager.subscribe(),
            recording: self.coordinator.subscribe(),
        }
    }

    pub fn status(&self) -> PipelineStatus {
        let preset = self.preset();
        PipelineStatus {
            authorization: self.gate.current(),
            session: self.manager.state(),
            recording: self.coordinator.state(),
            preset,
            preset_duration_secs: preset.duration(&self.config.recording).as_secs(),
        }
    }

    /// Wait until the current recording has finished and been finalized
    pub async fn wait_for_idle(&self) {
        self.coordinator.wait_until_idle().await;
    }

    /// Stored videos, newest first
    pub fn library(&self) -> Vec<VideoEntry> {
        self.store.as_ref().map(|s| s.list()).unwrap_or_default()
    }

    pub fn store(&self) -> Option<&Arc<VideoStore>> {
        self.store.as_ref()
    }

    /// Stop recording, drain finalization and stop the session
    pub async fn shutdown(&self) {
        self.coordinator.shutdown().await;
        let task = self
            .coordinator_task
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();
        if let Some(task) = task {
            if let Err(e) = task.await {
                log::warn!("Recording coordinator ended abnormally: {}", e);
            }
        }
        self.manager.stop().await;
        log::info!("Pipeline shut down");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::RecordingError;
    use crate::permissions::PermissionStatus;
    use crate::composition::AssetCatalog;
    use crate::testing::{PlanExporter, SimulatedAuthorization, SimulatedBackend, SimulatedDevices};

    fn config(dir: &std::path::Path) -> DualPovConfig {
        let mut config = DualPovConfig::default();
        config.storage.working_directory = dir.join("work");
        config.storage.store_directory = dir.join("store");
        config
    }

    fn deps(authorization: SimulatedAuthorization, devices: SimulatedDevices) -> PipelineDeps {
        PipelineDeps {
            authorization: Arc::new(authorization),
            devices: Arc::new(devices),
            backend: Arc::new(SimulatedBackend::new()),
            loader: Arc::new(AssetCatalog::new(["mp4"])),
            exporter: Arc::new(PlanExporter),
            store: None,
            extra_sinks: vec![],
        }
    }

    #[test]
    fn test_preset_durations() {
        let rec = DualPovConfig::default().recording;
        assert_eq!(RecordingPreset::Short.duration(&rec), Duration::from_secs(15));
        assert_eq!(RecordingPreset::Long.duration(&rec), Duration::from_secs(30));
        assert_eq!("LONG".parse::<RecordingPreset>().unwrap(), RecordingPreset::Long);
        assert!("medium".parse::<RecordingPreset>().is_err());
    }

    #[tokio::test]
    async fn test_denied_camera_reports_error() {
        let dir = tempfile::tempdir().unwrap();
        let pipeline = DualCameraPipeline::new(
            config(dir.path()),
            deps(
                SimulatedAuthorization::new(PermissionStatus::Denied, PermissionStatus::Granted),
                SimulatedDevices::dual(),
            ),
        );

        let err = pipeline.prepare().await.unwrap_err();
        assert!(matches!(err, PipelineError::Setup(SetupError::NotAuthorized { .. })));

        let mut recording = pipeline.signals().recording;
        let state = recording
            .wait_for(|s| s.error.is_some())
            .await
            .unwrap()
            .clone();
        assert!(state.error.unwrap().contains("not authorized"));
        assert!(pipeline.status().authorization.needs_permission_prompt);
        assert_ne!(pipeline.status().session, SessionState::Running);
    }

    #[tokio::test]
    async fn test_missing_back_camera_blocks_capture() {
        let dir = tempfile::tempdir().unwrap();
        let pipeline = DualCameraPipeline::new(
            config(dir.path()),
            deps(
                SimulatedAuthorization::granting(),
                SimulatedDevices::from_cameras(vec![crate::discovery::DiscoveredCamera::new(
                    "cam0",
                    "FaceTime HD Camera",
                )]),
            ),
        );

        let err = pipeline.prepare().await.unwrap_err();
        assert!(matches!(
            err,
            PipelineError::Setup(SetupError::MissingDevice("back camera"))
        ));
        assert!(matches!(
            pipeline.start_recording().await,
            Err(PipelineError::Recording(RecordingError::SessionNotRunning))
        ));
    }

    #[tokio::test]
    async fn test_prepare_then_record() {
        let dir = tempfile::tempdir().unwrap();
        let pipeline = DualCameraPipeline::new(
            config(dir.path()),
            deps(SimulatedAuthorization::granting(), SimulatedDevices::dual()),
        );

        let devices = pipeline.prepare().await.unwrap();
        assert_eq!(devices.front.id, "sim-front");
        assert_eq!(pipeline.status().session, SessionState::Running);

        pipeline.set_preset(RecordingPreset::Long);
        pipeline.start_recording().await.unwrap();
        pipeline.stop_recording().await.unwrap();
        pipeline.wait_for_idle().await;

        let status = pipeline.status();
        assert_eq!(status.preset_duration_secs, 30);
        assert!(status.recording.last_asset.is_some());
        assert!(status.recording.error.is_none());

        pipeline.shutdown().await;
        assert_eq!(pipeline.status().session, SessionState::Stopped);
    }
}
