//! Hardware session seam

use super::graph::{Connection, SessionGraph};
use super::output::MovieFileOutput;
use crate::errors::BackendError;
use crate::types::{AudioDevice, CameraPosition, CaptureDevice};
use std::sync::Arc;

/// Device about to be attached to the session as an input
#[derive(Debug, Clone, Copy)]
pub enum InputDevice<'a> {
    Camera(&'a CaptureDevice),
    Microphone(&'a AudioDevice),
}

impl InputDevice<'_> {
    pub fn id(&self) -> &str {
        match self {
            InputDevice::Camera(d) => &d.id,
            InputDevice::Microphone(d) => &d.id,
        }
    }
}

/// Operations a multi-camera hardware session must provide.
///
/// `start_running` and `stop_running` may block; callers run them off the
/// async executor.
pub trait CaptureBackend: Send + Sync + 'static {
    /// Whether the hardware can run two cameras on one session clock
    fn supports_multi_cam(&self) -> bool;

    fn open_input(&self, device: InputDevice<'_>) -> Result<(), BackendError>;

    fn create_movie_output(
        &self,
        position: CameraPosition,
    ) -> Result<Arc<dyn MovieFileOutput>, BackendError>;

    fn can_add_connection(&self, connection: &Connection) -> Result<(), BackendError>;

    /// Atomically apply a validated topology
    fn apply_configuration(&self, graph: &SessionGraph) -> Result<(), BackendError>;

    fn start_running(&self) -> Result<(), BackendError>;

    fn stop_running(&self);
}
