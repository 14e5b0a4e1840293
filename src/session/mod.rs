//! Shared dual-camera capture session
//!
//! One session owns two camera inputs, one microphone input and two
//! movie-file outputs. Each output receives an explicit video connection from
//! its own camera and an audio connection from the shared microphone.

mod backend;
mod graph;
mod manager;
mod output;

pub use backend::{CaptureBackend, InputDevice};
pub use graph::{
    Configuration, Connection, ConnectionSettings, InputId, InputKind, InputNode, InputPort,
    OutputId, OutputNode, SessionGraph,
};
pub use manager::{CaptureSessionManager, OutputPair, SessionState};
pub use output::{CompletionHandle, FinishedRecording, MovieFileOutput, OutputCompletion};
