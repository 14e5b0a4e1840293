//! Capture session object graph
//!
//! Inputs and outputs are identity-keyed nodes; connections are an edge list
//! from an input port to an output. A committed [`SessionGraph`] is
//! immutable. Changes go through a [`Configuration`], which stages edits on a
//! private copy and only produces a new graph on a successful commit.

use super::output::MovieFileOutput;
use crate::errors::SetupError;
use crate::permissions::MediaKind;
use crate::types::{CameraPosition, VideoOrientation};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// Input node identity (one per device)
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct InputId(pub String);

/// Output node identity (one per camera position)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct OutputId(pub CameraPosition);

impl fmt::Display for InputId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "input:{}", self.0)
    }
}

impl fmt::Display for OutputId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "output:{}", self.0)
    }
}

/// What an input node captures
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum InputKind {
    Camera(CameraPosition),
    Microphone,
}

impl InputKind {
    pub fn media(&self) -> MediaKind {
        match self {
            InputKind::Camera(_) => MediaKind::Video,
            InputKind::Microphone => MediaKind::Audio,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InputNode {
    pub id: InputId,
    /// Hardware id of the device behind this input
    pub device_id: String,
    pub device_name: String,
    pub kind: InputKind,
}

#[derive(Clone)]
pub struct OutputNode {
    pub id: OutputId,
    pub output: Arc<dyn MovieFileOutput>,
}

impl fmt::Debug for OutputNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OutputNode").field("id", &self.id).finish()
    }
}

/// A single media port on an input
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InputPort {
    pub input: InputId,
    pub media: MediaKind,
}

/// Per-connection capture settings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ConnectionSettings {
    pub orientation: VideoOrientation,
    pub automatically_adjusts_mirroring: bool,
    pub mirrored: bool,
}

impl Default for ConnectionSettings {
    fn default() -> Self {
        Self {
            orientation: VideoOrientation::Portrait,
            automatically_adjusts_mirroring: true,
            mirrored: false,
        }
    }
}

/// Explicit edge from an input port to an output
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Connection {
    pub port: InputPort,
    pub output: OutputId,
    pub settings: ConnectionSettings,
}

/// Committed, read-only session topology
#[derive(Debug, Clone, Default)]
pub struct SessionGraph {
    inputs: BTreeMap<InputId, InputNode>,
    outputs: BTreeMap<OutputId, OutputNode>,
    connections: Vec<Connection>,
}

impl SessionGraph {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn begin_configuration(&self) -> Configuration {
        Configuration {
            staged: self.clone(),
        }
    }

    pub fn inputs(&self) -> impl Iterator<Item = &InputNode> {
        self.inputs.values()
    }

    pub fn outputs(&self) -> impl Iterator<Item = &OutputNode> {
        self.outputs.values()
    }

    pub fn output(&self, position: CameraPosition) -> Option<&Arc<dyn MovieFileOutput>> {
        self.outputs.get(&OutputId(position)).map(|node| &node.output)
    }

    pub fn connections(&self) -> &[Connection] {
        &self.connections
    }

    pub fn connections_to(&self, output: OutputId) -> impl Iterator<Item = &Connection> {
        self.connections.iter().filter(move |c| c.output == output)
    }

    /// Video connection feeding the given output, if wired
    pub fn video_connection(&self, position: CameraPosition) -> Option<&Connection> {
        self.connections_to(OutputId(position))
            .find(|c| c.port.media == MediaKind::Video)
    }

    /// Dual-camera topology: two outputs, each fed by its own camera's video
    /// port and the one shared audio port.
    pub fn validate_dual_topology(&self) -> Result<(), SetupError> {
        if self.outputs.len() != 2 {
            return Err(SetupError::CommitRejected(format!(
                "expected 2 outputs, found {}",
                self.outputs.len()
            )));
        }

        let microphones: Vec<&InputNode> = self
            .inputs
            .values()
            .filter(|i| i.kind == InputKind::Microphone)
            .collect();
        if microphones.len() != 1 {
            return Err(SetupError::CommitRejected(format!(
                "expected 1 shared audio input, found {}",
                microphones.len()
            )));
        }
        let audio_input = &microphones[0].id;

        for position in CameraPosition::both() {
            let id = OutputId(position);
            if !self.outputs.contains_key(&id) {
                return Err(SetupError::CommitRejected(format!("{} is missing", id)));
            }

            let edges: Vec<&Connection> = self.connections_to(id).collect();
            let video: Vec<&&Connection> =
                edges.iter().filter(|c| c.port.media == MediaKind::Video).collect();
            let audio: Vec<&&Connection> =
                edges.iter().filter(|c| c.port.media == MediaKind::Audio).collect();

            if video.len() != 1 || audio.len() != 1 {
                return Err(SetupError::CommitRejected(format!(
                    "{} needs exactly one video and one audio connection (found {} video, {} audio)",
                    id,
                    video.len(),
                    audio.len()
                )));
            }

            let source = self.inputs.get(&video[0].port.input);
            if source.map(|i| i.kind) != Some(InputKind::Camera(position)) {
                return Err(SetupError::CommitRejected(format!(
                    "{} video is not fed by the {} camera",
                    id, position
                )));
            }
            if &audio[0].port.input != audio_input {
                return Err(SetupError::CommitRejected(format!(
                    "{} audio is not fed by the shared audio input",
                    id
                )));
            }
        }

        Ok(())
    }
}

/// Staged, uncommitted changes to a session graph
pub struct Configuration {
    staged: SessionGraph,
}

impl Configuration {
    pub fn add_input(&mut self, node: InputNode) -> Result<(), SetupError> {
        if self.staged.inputs.contains_key(&node.id) {
            return Err(SetupError::InputRejected {
                device_id: node.device_id.clone(),
                reason: "input already present in session".to_string(),
            });
        }
        self.staged.inputs.insert(node.id.clone(), node);
        Ok(())
    }

    pub fn add_output(&mut self, output: Arc<dyn MovieFileOutput>) -> Result<OutputId, SetupError> {
        let id = OutputId(output.position());
        if self.staged.outputs.contains_key(&id) {
            return Err(SetupError::OutputRejected {
                position: id.0.to_string(),
                reason: "output already present in session".to_string(),
            });
        }
        self.staged.outputs.insert(id, OutputNode { id, output });
        Ok(id)
    }

    pub fn add_connection(&mut self, connection: Connection) -> Result<(), SetupError> {
        let reject = |reason: String| SetupError::ConnectionRejected {
            output: connection.output.to_string(),
            reason,
        };

        let input = self
            .staged
            .inputs
            .get(&connection.port.input)
            .ok_or_else(|| reject(format!("unknown {}", connection.port.input)))?;
        if input.kind.media() != connection.port.media {
            return Err(reject(format!(
                "{} has no {:?} port",
                connection.port.input, connection.port.media
            )));
        }
        if !self.staged.outputs.contains_key(&connection.output) {
            return Err(reject("unknown output".to_string()));
        }
        if self
            .staged
            .connections_to(connection.output)
            .any(|c| c.port.media == connection.port.media)
        {
            return Err(reject(format!(
                "output already has a {:?} connection",
                connection.port.media
            )));
        }

        self.staged.connections.push(connection);
        Ok(())
    }

    /// Read-only view of the staged graph, for backend validation
    pub fn staged(&self) -> &SessionGraph {
        &self.staged
    }

    /// Validate the staged topology and let `apply` accept it. On any error
    /// the staged graph is dropped.
    pub fn commit<F>(self, apply: F) -> Result<SessionGraph, SetupError>
    where
        F: FnOnce(&SessionGraph) -> Result<(), SetupError>,
    {
        self.staged.validate_dual_topology()?;
        apply(&self.staged)?;
        Ok(self.staged)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::SimulatedOutput;

    fn camera(position: CameraPosition) -> InputNode {
        InputNode {
            id: InputId(format!("{}-cam", position)),
            device_id: format!("{}-device", position),
            device_name: format!("{} camera", position),
            kind: InputKind::Camera(position),
        }
    }

    fn microphone() -> InputNode {
        InputNode {
            id: InputId("mic".to_string()),
            device_id: "mic-device".to_string(),
            device_name: "Microphone".to_string(),
            kind: InputKind::Microphone,
        }
    }

    fn edge(input: &str, media: MediaKind, position: CameraPosition) -> Connection {
        Connection {
            port: InputPort {
                input: InputId(input.to_string()),
                media,
            },
            output: OutputId(position),
            settings: ConnectionSettings::default(),
        }
    }

    fn wired() -> Configuration {
        let mut cfg = SessionGraph::empty().begin_configuration();
        cfg.add_input(camera(CameraPosition::Front)).unwrap();
        cfg.add_input(camera(CameraPosition::Back)).unwrap();
        cfg.add_input(microphone()).unwrap();
        for position in CameraPosition::both() {
            cfg.add_output(Arc::new(SimulatedOutput::new(position))).unwrap();
        }
        cfg
    }

    #[test]
    fn test_full_wiring_commits() {
        let mut cfg = wired();
        for position in CameraPosition::both() {
            cfg.add_connection(edge(&format!("{}-cam", position), MediaKind::Video, position))
                .unwrap();
            cfg.add_connection(edge("mic", MediaKind::Audio, position)).unwrap();
        }
        let graph = cfg.commit(|_| Ok(())).unwrap();
        assert_eq!(graph.outputs().count(), 2);
        assert_eq!(graph.connections().len(), 4);
        assert!(graph.video_connection(CameraPosition::Front).is_some());
    }

    #[test]
    fn test_missing_audio_edge_fails_commit() {
        let mut cfg = wired();
        for position in CameraPosition::both() {
            cfg.add_connection(edge(&format!("{}-cam", position), MediaKind::Video, position))
                .unwrap();
        }
        cfg.add_connection(edge("mic", MediaKind::Audio, CameraPosition::Back))
            .unwrap();
        assert!(matches!(
            cfg.commit(|_| Ok(())),
            Err(SetupError::CommitRejected(_))
        ));
    }

    #[test]
    fn test_crossed_video_edge_fails_commit() {
        let mut cfg = wired();
        cfg.add_connection(edge("back-cam", MediaKind::Video, CameraPosition::Front))
            .unwrap();
        cfg.add_connection(edge("front-cam", MediaKind::Video, CameraPosition::Back))
            .unwrap();
        for position in CameraPosition::both() {
            cfg.add_connection(edge("mic", MediaKind::Audio, position)).unwrap();
        }
        assert!(cfg.commit(|_| Ok(())).is_err());
    }

    #[test]
    fn test_duplicate_media_edge_rejected() {
        let mut cfg = wired();
        cfg.add_connection(edge("mic", MediaKind::Audio, CameraPosition::Front))
            .unwrap();
        let err = cfg
            .add_connection(edge("mic", MediaKind::Audio, CameraPosition::Front))
            .unwrap_err();
        assert!(matches!(err, SetupError::ConnectionRejected { .. }));
    }

    #[test]
    fn test_port_kind_must_match_input() {
        let mut cfg = wired();
        let err = cfg
            .add_connection(edge("mic", MediaKind::Video, CameraPosition::Front))
            .unwrap_err();
        assert!(matches!(err, SetupError::ConnectionRejected { .. }));
    }

    #[test]
    fn test_staged_changes_do_not_touch_source_graph() {
        let graph = SessionGraph::empty();
        let mut cfg = graph.begin_configuration();
        cfg.add_input(microphone()).unwrap();
        assert_eq!(graph.inputs().count(), 0);
        assert_eq!(cfg.staged().inputs().count(), 1);
    }
}
