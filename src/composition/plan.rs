//! Composition plan: track insertion, time alignment and render instruction

use super::asset::{MediaAsset, TrackKind};
use super::layout::{AffineTransform, Layout};
use crate::errors::CompositionError;
use crate::types::{CameraPosition, Size};
use serde::Serialize;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TimeRange {
    pub start: Duration,
    pub duration: Duration,
}

impl TimeRange {
    pub fn from_zero(duration: Duration) -> Self {
        Self {
            start: Duration::ZERO,
            duration,
        }
    }

    pub fn end(&self) -> Duration {
        self.start + self.duration
    }
}

/// Composition track slots. Back video is the primary, full-frame track.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub enum TrackSlot {
    /// Back camera video
    A,
    /// Front camera video
    B,
    /// Canonical audio
    C,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CompositionTrack {
    pub slot: TrackSlot,
    pub kind: TrackKind,
    pub source: PathBuf,
    pub source_track_id: u32,
    pub source_camera: CameraPosition,
    /// Range taken from the source, inserted at time zero
    pub time_range: TimeRange,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LayerInstruction {
    pub slot: TrackSlot,
    /// Static transform, applied at `at`
    pub transform: AffineTransform,
    pub at: Duration,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RenderInstruction {
    pub canvas: Size,
    pub time_range: TimeRange,
    /// Top-most layer first
    pub layers: Vec<LayerInstruction>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CompositionPlan {
    pub duration: Duration,
    pub tracks: Vec<CompositionTrack>,
    pub render: RenderInstruction,
}

impl CompositionPlan {
    pub fn track(&self, slot: TrackSlot) -> Option<&CompositionTrack> {
        self.tracks.iter().find(|t| t.slot == slot)
    }
}

/// Build the dual-camera composition.
///
/// The shorter recording caps the output: both sources are cut to
/// `[0, min(front, back))`. Audio comes from the back camera when present,
/// otherwise from the front camera.
pub fn plan_composition(
    front: &MediaAsset,
    back: &MediaAsset,
    layout: &Layout,
) -> Result<CompositionPlan, CompositionError> {
    let back_video = back.video_track()?;
    let front_video = front.video_track()?;

    let duration = front.duration.min(back.duration);
    if duration.is_zero() {
        return Err(CompositionError::EmptyTimeRange);
    }
    let range = TimeRange::from_zero(duration);

    let mut tracks = vec![
        CompositionTrack {
            slot: TrackSlot::A,
            kind: TrackKind::Video,
            source: back.path.clone(),
            source_track_id: back_video.track_id,
            source_camera: CameraPosition::Back,
            time_range: range,
        },
        CompositionTrack {
            slot: TrackSlot::B,
            kind: TrackKind::Video,
            source: front.path.clone(),
            source_track_id: front_video.track_id,
            source_camera: CameraPosition::Front,
            time_range: range,
        },
    ];

    let audio = back
        .first_track(TrackKind::Audio)
        .map(|t| (back, t, CameraPosition::Back))
        .or_else(|| {
            front
                .first_track(TrackKind::Audio)
                .map(|t| (front, t, CameraPosition::Front))
        });
    match audio {
        Some((asset, track, camera)) => tracks.push(CompositionTrack {
            slot: TrackSlot::C,
            kind: TrackKind::Audio,
            source: asset.path.clone(),
            source_track_id: track.track_id,
            source_camera: camera,
            time_range: range,
        }),
        None => log::warn!("Neither recording has an audio track; composing silent video"),
    }

    let canvas = back.display_size()?;
    let front_size = front.display_size()?;
    let front_transform = front_video
        .preferred_transform
        .then(&layout.front_transform(front_size, canvas));

    let render = RenderInstruction {
        canvas,
        time_range: range,
        layers: vec![
            LayerInstruction {
                slot: TrackSlot::B,
                transform: front_transform,
                at: Duration::ZERO,
            },
            LayerInstruction {
                slot: TrackSlot::A,
                transform: back_video.preferred_transform,
                at: Duration::ZERO,
            },
        ],
    };

    Ok(CompositionPlan {
        duration,
        tracks,
        render,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::composition::OverlayCorner;
    use crate::session::FinishedRecording;

    fn asset(path: &str, secs: f64, has_audio: bool) -> MediaAsset {
        MediaAsset::from_recording(&FinishedRecording {
            path: PathBuf::from(path),
            duration: Duration::from_secs_f64(secs),
            video_size: Size::new(1080.0, 1920.0),
            has_audio,
            poster: None,
        })
    }

    fn pip() -> Layout {
        Layout::PictureInPicture {
            scale: 0.25,
            margin: 16.0,
            corner: OverlayCorner::TopRight,
        }
    }

    #[test]
    fn test_skewed_durations_cap_to_shorter() {
        let front = asset("/w/front.mp4", 10.0, true);
        let back = asset("/w/back.mp4", 10.3, true);
        let plan = plan_composition(&front, &back, &pip()).unwrap();

        assert_eq!(plan.duration, Duration::from_secs(10));
        assert_eq!(plan.render.time_range.end(), Duration::from_secs(10));
        assert!(plan.tracks.iter().all(|t| t.time_range == TimeRange::from_zero(plan.duration)));
    }

    #[test]
    fn test_slots_and_canonical_audio() {
        let front = asset("/w/front.mp4", 5.0, true);
        let back = asset("/w/back.mp4", 5.0, true);
        let plan = plan_composition(&front, &back, &pip()).unwrap();

        assert_eq!(plan.track(TrackSlot::A).unwrap().source_camera, CameraPosition::Back);
        assert_eq!(plan.track(TrackSlot::B).unwrap().source_camera, CameraPosition::Front);
        assert_eq!(plan.track(TrackSlot::C).unwrap().source_camera, CameraPosition::Back);
        assert_eq!(plan.render.canvas, Size::new(1080.0, 1920.0));
    }

    #[test]
    fn test_front_audio_used_when_back_is_silent() {
        let front = asset("/w/front.mp4", 5.0, true);
        let back = asset("/w/back.mp4", 5.0, false);
        let plan = plan_composition(&front, &back, &pip()).unwrap();
        assert_eq!(plan.track(TrackSlot::C).unwrap().source_camera, CameraPosition::Front);
    }

    #[test]
    fn test_silent_sources_compose_without_audio() {
        let front = asset("/w/front.mp4", 5.0, false);
        let back = asset("/w/back.mp4", 5.0, false);
        let plan = plan_composition(&front, &back, &pip()).unwrap();
        assert!(plan.track(TrackSlot::C).is_none());
        assert_eq!(plan.tracks.len(), 2);
    }

    #[test]
    fn test_front_layer_is_on_top_and_transformed() {
        let front = asset("/w/front.mp4", 5.0, true);
        let back = asset("/w/back.mp4", 5.0, true);
        let plan = plan_composition(&front, &back, &pip()).unwrap();

        assert_eq!(plan.render.layers[0].slot, TrackSlot::B);
        assert!(!plan.render.layers[0].transform.is_identity());
        assert!(plan.render.layers[1].transform.is_identity());
        assert!(plan.render.layers.iter().all(|l| l.at.is_zero()));
    }

    #[test]
    fn test_zero_length_recording_rejected() {
        let front = asset("/w/front.mp4", 0.0, true);
        let back = asset("/w/back.mp4", 4.0, true);
        assert_eq!(
            plan_composition(&front, &back, &pip()).unwrap_err(),
            CompositionError::EmptyTimeRange
        );
    }

    #[test]
    fn test_missing_video_track_is_extraction_error() {
        let mut front = asset("/w/front.mp4", 3.0, true);
        front.tracks.retain(|t| t.kind != TrackKind::Video);
        let back = asset("/w/back.mp4", 3.0, true);
        assert!(matches!(
            plan_composition(&front, &back, &pip()),
            Err(CompositionError::TrackExtraction { .. })
        ));
    }
}
