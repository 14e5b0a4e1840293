use super::backend::{CaptureBackend, InputDevice};
use super::graph::{Connection, ConnectionSettings, InputId, InputKind, InputNode, InputPort, OutputId, SessionGraph};
use super::output::MovieFileOutput;
use crate::config::CaptureConfig;
use crate::errors::SetupError;
use crate::permissions::MediaKind;
use crate::types::{CameraPosition, DeviceSet};
use serde::Serialize;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::watch;

/// Session lifecycle.
///
/// `Configuring` covers both an in-progress build and a built session that
/// has not been started yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SessionState {
    Uninitialized,
    Configuring,
    Running,
    Stopped,
}

impl SessionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionState::Uninitialized => "uninitialized",
            SessionState::Configuring => "configuring",
            SessionState::Running => "running",
            SessionState::Stopped => "stopped",
        }
    }
}

/// Output handles the recording coordinator is allowed to start and stop
#[derive(Clone)]
pub struct OutputPair {
    pub front: Arc<dyn MovieFileOutput>,
    pub back: Arc<dyn MovieFileOutput>,
}

impl OutputPair {
    pub fn get(&self, position: CameraPosition) -> &Arc<dyn MovieFileOutput> {
        match position {
            CameraPosition::Front => &self.front,
            CameraPosition::Back => &self.back,
        }
    }
}

struct ManagerInner {
    state: SessionState,
    graph: Option<SessionGraph>,
}

/// Exclusive owner of the capture session graph
pub struct CaptureSessionManager {
    backend: Arc<dyn CaptureBackend>,
    config: CaptureConfig,
    inner: Mutex<ManagerInner>,
    lifecycle: tokio::sync::Mutex<()>,
    state_tx: watch::Sender<SessionState>,
}

impl CaptureSessionManager {
    pub fn new(backend: Arc<dyn CaptureBackend>, config: CaptureConfig) -> Self {
        let (state_tx, _) = watch::channel(SessionState::Uninitialized);
        Self {
            backend,
            config,
            inner: Mutex::new(ManagerInner {
                state: SessionState::Uninitialized,
                graph: None,
            }),
            lifecycle: tokio::sync::Mutex::new(()),
            state_tx,
        }
    }

    fn lock(&self) -> MutexGuard<'_, ManagerInner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn set_state(&self, inner: &mut ManagerInner, state: SessionState) {
        if inner.state != state {
            log::debug!("Capture session: {} -> {}", inner.state.as_str(), state.as_str());
        }
        inner.state = state;
        self.state_tx.send_replace(state);
    }

    pub fn state(&self) -> SessionState {
        self.lock().state
    }

    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.state_tx.subscribe()
    }

    /// Snapshot of the committed graph
    pub fn graph(&self) -> Option<SessionGraph> {
        self.lock().graph.clone()
    }

    pub fn outputs(&self) -> Option<OutputPair> {
        let inner = self.lock();
        let graph = inner.graph.as_ref()?;
        Some(OutputPair {
            front: graph.output(CameraPosition::Front)?.clone(),
            back: graph.output(CameraPosition::Back)?.clone(),
        })
    }

    /// Wire the dual-camera topology in one configuration transaction.
    ///
    /// On any failure the previous graph is discarded and the session returns
    /// to `Uninitialized`; no partially wired session is kept.
    pub fn build(&self, devices: &DeviceSet) -> Result<(), SetupError> {
        let mut inner = self.lock();
        match inner.state {
            SessionState::Uninitialized | SessionState::Stopped | SessionState::Configuring => {}
            SessionState::Running => {
                return Err(SetupError::InvalidState {
                    expected: "not running",
                    found: inner.state.as_str(),
                })
            }
        }

        self.set_state(&mut inner, SessionState::Configuring);
        inner.graph = None;

        match self.wire(devices) {
            Ok(graph) => {
                log::info!(
                    "Capture session configured: {} inputs, {} outputs, {} connections",
                    graph.inputs().count(),
                    graph.outputs().count(),
                    graph.connections().len()
                );
                inner.graph = Some(graph);
                Ok(())
            }
            Err(e) => {
                log::error!("Capture session setup failed: {}", e);
                self.set_state(&mut inner, SessionState::Uninitialized);
                Err(e)
            }
        }
    }

    fn wire(&self, devices: &DeviceSet) -> Result<SessionGraph, SetupError> {
        if !self.backend.supports_multi_cam() {
            return Err(SetupError::CommitRejected(
                "hardware does not support simultaneous cameras".to_string(),
            ));
        }

        let mut cfg = SessionGraph::empty().begin_configuration();

        for position in CameraPosition::both() {
            let device = devices.camera(position);
            self.backend
                .open_input(InputDevice::Camera(device))
                .map_err(|e| SetupError::InputRejected {
                    device_id: device.id.clone(),
                    reason: e.message,
                })?;
            cfg.add_input(InputNode {
                id: camera_input_id(position, &device.id),
                device_id: device.id.clone(),
                device_name: device.name.clone(),
                kind: InputKind::Camera(position),
            })?;
        }

        self.backend
            .open_input(InputDevice::Microphone(&devices.audio))
            .map_err(|e| SetupError::InputRejected {
                device_id: devices.audio.id.clone(),
                reason: e.message,
            })?;
        let audio_input = InputId(format!("mic:{}", devices.audio.id));
        cfg.add_input(InputNode {
            id: audio_input.clone(),
            device_id: devices.audio.id.clone(),
            device_name: devices.audio.name.clone(),
            kind: InputKind::Microphone,
        })?;

        for position in CameraPosition::both() {
            let output = self
                .backend
                .create_movie_output(position)
                .map_err(|e| SetupError::OutputRejected {
                    position: position.to_string(),
                    reason: e.message,
                })?;
            let output_id = cfg.add_output(output)?;

            let video = Connection {
                port: InputPort {
                    input: camera_input_id(position, &devices.camera(position).id),
                    media: MediaKind::Video,
                },
                output: output_id,
                settings: self.video_settings(position),
            };
            let audio = Connection {
                port: InputPort {
                    input: audio_input.clone(),
                    media: MediaKind::Audio,
                },
                output: output_id,
                settings: ConnectionSettings::default(),
            };

            for connection in [video, audio] {
                self.backend
                    .can_add_connection(&connection)
                    .map_err(|e| SetupError::ConnectionRejected {
                        output: connection.output.to_string(),
                        reason: e.message,
                    })?;
                cfg.add_connection(connection)?;
            }
        }

        let backend = &self.backend;
        cfg.commit(|graph| {
            backend
                .apply_configuration(graph)
                .map_err(|e| SetupError::CommitRejected(e.message))
        })
    }

    /// Front connection mirrors explicitly so the recording matches the preview.
    fn video_settings(&self, position: CameraPosition) -> ConnectionSettings {
        match position {
            CameraPosition::Front => ConnectionSettings {
                orientation: self.config.orientation,
                automatically_adjusts_mirroring: false,
                mirrored: self.config.mirror_front,
            },
            CameraPosition::Back => ConnectionSettings {
                orientation: self.config.orientation,
                ..ConnectionSettings::default()
            },
        }
    }

    /// Start the session on a blocking worker. No-op when already running.
    pub async fn start(&self) -> Result<(), SetupError> {
        let _lifecycle = self.lifecycle.lock().await;
        {
            let inner = self.lock();
            match (inner.state, inner.graph.is_some()) {
                (SessionState::Running, _) => return Ok(()),
                (SessionState::Configuring | SessionState::Stopped, true) => {}
                (state, _) => {
                    return Err(SetupError::InvalidState {
                        expected: "configured",
                        found: state.as_str(),
                    })
                }
            }
        }

        let backend = self.backend.clone();
        tokio::task::spawn_blocking(move || backend.start_running())
            .await
            .map_err(|e| SetupError::StartFailed(e.to_string()))?
            .map_err(|e| SetupError::StartFailed(e.message))?;

        let mut inner = self.lock();
        self.set_state(&mut inner, SessionState::Running);
        log::info!("Capture session running");
        Ok(())
    }

    /// Stop the session. Safe to call repeatedly.
    pub async fn stop(&self) {
        let _lifecycle = self.lifecycle.lock().await;
        if self.state() != SessionState::Running {
            log::debug!("Capture session stop ignored: not running");
            return;
        }

        let backend = self.backend.clone();
        if let Err(e) = tokio::task::spawn_blocking(move || backend.stop_running()).await {
            log::warn!("Session stop worker failed: {}", e);
        }

        let mut inner = self.lock();
        self.set_state(&mut inner, SessionState::Stopped);
        log::info!("Capture session stopped");
    }
}

fn camera_input_id(position: CameraPosition, device_id: &str) -> InputId {
    InputId(format!("{}:{}", position, device_id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DualPovConfig;
    use crate::testing::{simulated_device_set, BackendFault, SimulatedBackend};

    fn manager(backend: SimulatedBackend) -> (Arc<SimulatedBackend>, CaptureSessionManager) {
        let backend = Arc::new(backend);
        let manager = CaptureSessionManager::new(backend.clone(), DualPovConfig::default().capture);
        (backend, manager)
    }

    #[tokio::test]
    async fn test_build_wires_two_outputs() {
        let (_, manager) = manager(SimulatedBackend::new());
        manager.build(&simulated_device_set()).unwrap();

        let graph = manager.graph().unwrap();
        assert_eq!(graph.outputs().count(), 2);
        for position in CameraPosition::both() {
            let edges: Vec<_> = graph.connections_to(OutputId(position)).collect();
            assert_eq!(edges.len(), 2);
        }
        assert_eq!(manager.state(), SessionState::Configuring);
    }

    #[tokio::test]
    async fn test_front_connection_is_mirrored() {
        let (_, manager) = manager(SimulatedBackend::new());
        manager.build(&simulated_device_set()).unwrap();
        let graph = manager.graph().unwrap();

        let front = graph.video_connection(CameraPosition::Front).unwrap();
        assert!(!front.settings.automatically_adjusts_mirroring);
        assert!(front.settings.mirrored);

        let back = graph.video_connection(CameraPosition::Back).unwrap();
        assert!(back.settings.automatically_adjusts_mirroring);
        assert!(!back.settings.mirrored);
    }

    #[tokio::test]
    async fn test_failed_build_leaves_nothing_behind() {
        let (backend, manager) =
            manager(SimulatedBackend::new().with_fault(BackendFault::RejectConnection(CameraPosition::Back)));
        let err = manager.build(&simulated_device_set()).unwrap_err();

        assert!(matches!(err, SetupError::ConnectionRejected { .. }));
        assert!(manager.graph().is_none());
        assert_eq!(manager.state(), SessionState::Uninitialized);
        assert_eq!(backend.applied_configurations(), 0);
        assert!(manager.start().await.is_err());
        assert!(!backend.is_running());
    }

    #[tokio::test]
    async fn test_start_stop_lifecycle() {
        let (backend, manager) = manager(SimulatedBackend::new());
        manager.build(&simulated_device_set()).unwrap();

        manager.start().await.unwrap();
        assert_eq!(manager.state(), SessionState::Running);
        assert!(backend.is_running());

        manager.stop().await;
        manager.stop().await;
        assert_eq!(manager.state(), SessionState::Stopped);
        assert_eq!(backend.stop_calls(), 1);
    }

    #[tokio::test]
    async fn test_rebuild_after_stop() {
        let (_, manager) = manager(SimulatedBackend::new());
        manager.build(&simulated_device_set()).unwrap();
        manager.start().await.unwrap();
        assert!(manager.build(&simulated_device_set()).is_err());

        manager.stop().await;
        manager.build(&simulated_device_set()).unwrap();
        manager.start().await.unwrap();
        assert_eq!(manager.state(), SessionState::Running);
    }

    #[tokio::test]
    async fn test_start_failure_is_reported() {
        let (_, manager) = manager(SimulatedBackend::new().with_fault(BackendFault::FailStart));
        manager.build(&simulated_device_set()).unwrap();
        let err = manager.start().await.unwrap_err();
        assert!(matches!(err, SetupError::StartFailed(_)));
        assert_ne!(manager.state(), SessionState::Running);
    }
}
