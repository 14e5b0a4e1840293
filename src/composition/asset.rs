//! Source media descriptions and loading

use super::layout::AffineTransform;
use crate::errors::CompositionError;
use crate::session::FinishedRecording;
use crate::types::Size;
use serde::Serialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TrackKind {
    Video,
    Audio,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AssetTrack {
    pub track_id: u32,
    pub kind: TrackKind,
    pub duration: Duration,
    /// Encoded frame size (video tracks only)
    pub natural_size: Option<Size>,
    pub preferred_transform: AffineTransform,
}

/// A loaded source movie
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MediaAsset {
    pub path: PathBuf,
    pub duration: Duration,
    pub tracks: Vec<AssetTrack>,
}

impl MediaAsset {
    pub fn first_track(&self, kind: TrackKind) -> Option<&AssetTrack> {
        self.tracks.iter().find(|t| t.kind == kind)
    }

    pub fn video_track(&self) -> Result<&AssetTrack, CompositionError> {
        let track = self
            .first_track(TrackKind::Video)
            .ok_or_else(|| CompositionError::TrackExtraction {
                path: self.path.clone(),
                reason: "asset has no video track".to_string(),
            })?;
        match track.natural_size {
            Some(size) if !size.is_empty() => Ok(track),
            _ => Err(CompositionError::TrackExtraction {
                path: self.path.clone(),
                reason: "video track has no natural size".to_string(),
            }),
        }
    }

    /// Display size of the first video track after its preferred transform
    pub fn display_size(&self) -> Result<Size, CompositionError> {
        let track = self.video_track()?;
        let natural = track.natural_size.unwrap_or_default();
        Ok(track.preferred_transform.transformed_size(natural))
    }

    pub fn from_recording(recording: &FinishedRecording) -> Self {
        let mut tracks = vec![AssetTrack {
            track_id: 1,
            kind: TrackKind::Video,
            duration: recording.duration,
            natural_size: Some(recording.video_size),
            preferred_transform: AffineTransform::identity(),
        }];
        if recording.has_audio {
            tracks.push(AssetTrack {
                track_id: 2,
                kind: TrackKind::Audio,
                duration: recording.duration,
                natural_size: None,
                preferred_transform: AffineTransform::identity(),
            });
        }
        Self {
            path: recording.path.clone(),
            duration: recording.duration,
            tracks,
        }
    }
}

/// Reads track metadata for a movie file
pub trait AssetLoader: Send + Sync {
    fn load(&self, path: &Path) -> Result<MediaAsset, CompositionError>;

    /// Told about a recording before it is composed. Loaders that read the
    /// file itself ignore this.
    fn register(&self, _recording: &FinishedRecording) {}

    /// The recording is no longer needed
    fn forget(&self, _path: &Path) {}
}

/// Loader backed by metadata reported by the outputs that wrote the files.
///
/// Used with outputs whose files cannot be parsed, such as the simulated
/// hardware.
pub struct AssetCatalog {
    entries: Mutex<HashMap<PathBuf, MediaAsset>>,
    extensions: Vec<String>,
}

impl AssetCatalog {
    pub fn new<I, S>(extensions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            entries: Mutex::new(HashMap::new()),
            extensions: extensions
                .into_iter()
                .map(|e| e.into().to_lowercase())
                .collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn is_supported(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|e| e.to_str())
            .map(|e| self.extensions.iter().any(|known| known == &e.to_lowercase()))
            .unwrap_or(false)
    }
}

impl AssetLoader for AssetCatalog {
    fn register(&self, recording: &FinishedRecording) {
        let asset = MediaAsset::from_recording(recording);
        self.entries
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(asset.path.clone(), asset);
    }

    fn forget(&self, path: &Path) {
        self.entries
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(path);
    }

    fn load(&self, path: &Path) -> Result<MediaAsset, CompositionError> {
        if !self.is_supported(path) {
            return Err(CompositionError::UnknownAssetFormat(path.to_path_buf()));
        }

        if let Some(asset) = self
            .entries
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(path)
        {
            return Ok(asset.clone());
        }

        let reason = if path.exists() {
            "no track metadata recorded for file"
        } else {
            "file not found"
        };
        Err(CompositionError::TrackExtraction {
            path: path.to_path_buf(),
            reason: reason.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn recording(path: &str, secs: f64, has_audio: bool) -> FinishedRecording {
        FinishedRecording {
            path: PathBuf::from(path),
            duration: Duration::from_secs_f64(secs),
            video_size: Size::new(1080.0, 1920.0),
            has_audio,
            poster: None,
        }
    }

    #[test]
    fn test_catalog_round_trip() {
        let catalog = AssetCatalog::new(["mp4", "mov"]);
        catalog.register(&recording("/work/a.mp4", 3.0, true));

        let asset = catalog.load(Path::new("/work/a.mp4")).unwrap();
        assert_eq!(asset.tracks.len(), 2);
        assert!(asset.first_track(TrackKind::Audio).is_some());

        catalog.forget(Path::new("/work/a.mp4"));
        assert!(catalog.is_empty());
    }

    #[test]
    fn test_unknown_extension() {
        let catalog = AssetCatalog::new(["mp4"]);
        let err = catalog.load(Path::new("/work/a.gif")).unwrap_err();
        assert!(matches!(err, CompositionError::UnknownAssetFormat(_)));
    }

    #[test]
    fn test_unregistered_file_fails_extraction() {
        let catalog = AssetCatalog::new(["MP4"]);
        let err = catalog.load(Path::new("/definitely/missing.mp4")).unwrap_err();
        assert!(matches!(err, CompositionError::TrackExtraction { .. }));
    }

    #[test]
    fn test_video_track_requires_size() {
        let mut asset = MediaAsset::from_recording(&recording("/w/b.mp4", 1.0, false));
        asset.tracks[0].natural_size = Some(Size::new(0.0, 0.0));
        assert!(asset.video_track().is_err());
    }
}
