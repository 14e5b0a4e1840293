//! Error taxonomy for the capture pipeline
//!
//! Each layer owns one error type. `PipelineError` unifies them for callers
//! that drive the whole pipeline.

use std::path::PathBuf;
use thiserror::Error;

/// Failure reported by a hardware backend (camera, session, output)
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct BackendError {
    pub message: String,
}

impl BackendError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Device and session wiring failures. Fatal to starting capture, never retried.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SetupError {
    #[error("camera access not authorized (camera: {camera}, microphone: {microphone})")]
    NotAuthorized { camera: bool, microphone: bool },

    #[error("required device missing: {0}")]
    MissingDevice(&'static str),

    #[error("device discovery failed: {0}")]
    Discovery(String),

    #[error("cannot add input for device {device_id}: {reason}")]
    InputRejected { device_id: String, reason: String },

    #[error("cannot add {position} movie output: {reason}")]
    OutputRejected { position: String, reason: String },

    #[error("cannot add connection to {output}: {reason}")]
    ConnectionRejected { output: String, reason: String },

    #[error("configuration commit rejected: {0}")]
    CommitRejected(String),

    #[error("invalid session state: expected {expected}, found {found}")]
    InvalidState {
        expected: &'static str,
        found: &'static str,
    },

    #[error("session failed to start: {0}")]
    StartFailed(String),
}

/// Start/stop precondition violations and terminal recording failures
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RecordingError {
    #[error("a recording is already in progress")]
    AlreadyRecording,

    #[error("capture session is not running")]
    SessionNotRunning,

    #[error("invalid recording duration: {0:?}")]
    InvalidDuration(std::time::Duration),

    #[error("cannot prepare destination {path}: {reason}")]
    Destination { path: PathBuf, reason: String },

    #[error("failed to start {position} output: {reason}")]
    OutputStart { position: String, reason: String },

    #[error("both camera outputs failed to finalize")]
    BothOutputsFailed,

    #[error("recording coordinator is shut down")]
    CoordinatorClosed,
}

/// Post-recording composition failures
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CompositionError {
    #[error("unknown asset format: {0}")]
    UnknownAssetFormat(PathBuf),

    #[error("track extraction failed for {path}: {reason}")]
    TrackExtraction { path: PathBuf, reason: String },

    #[error("composition time range is empty")]
    EmptyTimeRange,

    #[error("export failed: {0}")]
    Export(String),
}

/// Save failures. The produced asset is never rolled back.
#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("persistence I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("store index is corrupt: {0}")]
    CorruptIndex(String),

    #[error("thumbnail generation failed: {0}")]
    Thumbnail(String),
}

impl PersistenceError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// Configuration load/validate failures
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Read(#[from] std::io::Error),

    #[error("failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("failed to layer configuration: {0}")]
    Layered(#[from] ::config::ConfigError),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Umbrella error for pipeline-level operations
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Setup(#[from] SetupError),

    #[error(transparent)]
    Recording(#[from] RecordingError),

    #[error(transparent)]
    Composition(#[from] CompositionError),

    #[error(transparent)]
    Persistence(#[from] PersistenceError),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_setup_error_messages() {
        let err = SetupError::MissingDevice("front camera");
        assert_eq!(err.to_string(), "required device missing: front camera");

        let err = SetupError::NotAuthorized {
            camera: true,
            microphone: false,
        };
        assert!(err.to_string().contains("microphone: false"));
    }

    #[test]
    fn test_pipeline_error_is_transparent() {
        let err: PipelineError = RecordingError::AlreadyRecording.into();
        assert_eq!(err.to_string(), "a recording is already in progress");
    }

    #[test]
    fn test_persistence_error_keeps_source() {
        use std::error::Error;
        let err = PersistenceError::io(
            "/nowhere",
            std::io::Error::new(std::io::ErrorKind::NotFound, "gone"),
        );
        assert!(err.source().is_some());
        assert!(err.to_string().contains("/nowhere"));
    }
}
