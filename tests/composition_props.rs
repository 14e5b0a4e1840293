//! Property-Based Tests for DualPOV Composition
//!
//! These tests verify the invariants of composition planning using proptest
//! for input generation and shrinking.
//!
//! Run with: cargo test --test composition_props

use dualpov::composition::{
    plan_composition, Layout, MediaAsset, OverlayCorner, TrackKind, TrackSlot,
};
use dualpov::session::FinishedRecording;
use dualpov::types::{CameraPosition, Size};
use proptest::prelude::*;
use std::path::PathBuf;
use std::time::Duration;

fn asset(position: CameraPosition, millis: u64, has_audio: bool) -> MediaAsset {
    MediaAsset::from_recording(&FinishedRecording {
        path: PathBuf::from(format!("/work/{}.mp4", position)),
        duration: Duration::from_millis(millis),
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

proptest! {
    /// INVARIANT: The composed duration is the shorter of the two recordings
    #[test]
    fn composed_duration_is_minimum(
        front_ms in 1u64..120_000,
        back_ms in 1u64..120_000,
    ) {
        let plan = plan_composition(
            &asset(CameraPosition::Front, front_ms, true),
            &asset(CameraPosition::Back, back_ms, true),
            &pip(),
        ).expect("non-empty recordings compose");

        let expected = Duration::from_millis(front_ms.min(back_ms));
        prop_assert_eq!(plan.duration, expected);
        prop_assert_eq!(plan.render.time_range.duration, expected);
        for track in &plan.tracks {
            prop_assert_eq!(track.time_range.start, Duration::ZERO);
            prop_assert_eq!(track.time_range.duration, expected);
        }
    }

    /// INVARIANT: Audio prefers the back camera and falls back to the front
    #[test]
    fn audio_source_preference(front_audio in any::<bool>(), back_audio in any::<bool>()) {
        let plan = plan_composition(
            &asset(CameraPosition::Front, 5_000, front_audio),
            &asset(CameraPosition::Back, 5_000, back_audio),
            &pip(),
        ).unwrap();

        let audio = plan.track(TrackSlot::C);
        match (back_audio, front_audio) {
            (true, _) => prop_assert_eq!(audio.map(|t| t.source_camera), Some(CameraPosition::Back)),
            (false, true) => prop_assert_eq!(audio.map(|t| t.source_camera), Some(CameraPosition::Front)),
            (false, false) => prop_assert!(audio.is_none()),
        }
        if let Some(track) = audio {
            prop_assert_eq!(track.kind, TrackKind::Audio);
        }
    }

    /// INVARIANT: The picture-in-picture inset stays inside the canvas
    #[test]
    fn inset_stays_inside_canvas(
        scale in 0.05f64..0.5,
        margin in 0.0f64..64.0,
        corner in prop_oneof![
            Just(OverlayCorner::TopLeft),
            Just(OverlayCorner::TopRight),
            Just(OverlayCorner::BottomLeft),
            Just(OverlayCorner::BottomRight),
        ],
    ) {
        let layout = Layout::PictureInPicture { scale, margin, corner };
        let canvas = Size::new(1080.0, 1920.0);
        let transform = layout.front_transform(Size::new(1080.0, 1920.0), canvas);

        for (x, y) in [(0.0, 0.0), (1080.0, 0.0), (0.0, 1920.0), (1080.0, 1920.0)] {
            let (px, py) = transform.apply(x, y);
            prop_assert!(px >= -1e-6 && px <= canvas.width + 1e-6, "x {} outside canvas", px);
            prop_assert!(py >= -1e-6 && py <= canvas.height + 1e-6, "y {} outside canvas", py);
        }
    }
}

#[test]
fn front_layer_is_on_top_of_back() {
    let plan = plan_composition(
        &asset(CameraPosition::Front, 15_000, true),
        &asset(CameraPosition::Back, 14_900, true),
        &pip(),
    )
    .unwrap();

    let order: Vec<TrackSlot> = plan.render.layers.iter().map(|l| l.slot).collect();
    assert_eq!(order, vec![TrackSlot::B, TrackSlot::A]);
    assert!(plan.render.layers.iter().all(|l| l.at == Duration::ZERO));
    assert_eq!(plan.render.canvas, Size::new(1080.0, 1920.0));
    assert_eq!(plan.track(TrackSlot::A).unwrap().source_camera, CameraPosition::Back);
    assert_eq!(plan.track(TrackSlot::B).unwrap().source_camera, CameraPosition::Front);
}

#[test]
fn zero_length_recording_cannot_compose() {
    let result = plan_composition(
        &asset(CameraPosition::Front, 0, true),
        &asset(CameraPosition::Back, 15_000, true),
        &pip(),
    );
    assert_eq!(result.unwrap_err(), dualpov::CompositionError::EmptyTimeRange);
}
