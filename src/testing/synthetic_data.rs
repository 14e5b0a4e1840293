//! Synthetic frames and device profiles for offline testing
//!
//! Frames follow the gradient pattern used for encoder tests: content changes
//! per frame so temporal encoding is exercised, and front/back differ in hue
//! so a composed poster shows which camera ended up where.

use crate::types::{CameraPosition, RgbFrame};

/// Create a synthetic RGB24 frame for one camera
pub fn synthetic_video_frame(position: CameraPosition, frame_number: u64, width: u32, height: u32) -> RgbFrame {
    let mut rgb = vec![0u8; (width as usize) * (height as usize) * 3];

    let base = (frame_number % 256) as u8;
    let tint: u8 = match position {
        CameraPosition::Front => 0xC0,
        CameraPosition::Back => 0x20,
    };
    for y in 0..height {
        for x in 0..width {
            let idx = ((y * width + x) * 3) as usize;
            rgb[idx] = tint; // R identifies the camera
            rgb[idx + 1] = base.wrapping_add((y % 256) as u8);
            rgb[idx + 2] = base.wrapping_add(((x + y) % 256) as u8);
        }
    }

    RgbFrame::new(width, height, rgb)
}

/// Portrait hardware profile used by the simulated devices
#[derive(Debug, Clone)]
pub struct SimulatedCameraProfile {
    /// Encoded frame size (portrait)
    pub resolution: (u32, u32),
    pub frame_rate: f32,
    /// Poster frame size written with each recording
    pub poster_resolution: (u32, u32),
    pub front_name: &'static str,
    pub back_name: &'static str,
    pub mic_name: &'static str,
}

impl Default for SimulatedCameraProfile {
    fn default() -> Self {
        Self {
            resolution: (1080, 1920),
            frame_rate: 30.0,
            poster_resolution: (90, 160),
            front_name: "Simulated Front Camera",
            back_name: "Simulated Back Camera",
            mic_name: "Simulated Microphone",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_synthetic_video_frame_correct_size() {
        let frame = synthetic_video_frame(CameraPosition::Back, 0, 320, 240);
        assert_eq!(frame.width, 320);
        assert_eq!(frame.height, 240);
        assert!(frame.is_valid());
    }

    #[test]
    fn test_synthetic_video_frames_differ() {
        let frame0 = synthetic_video_frame(CameraPosition::Back, 0, 32, 24);
        let frame1 = synthetic_video_frame(CameraPosition::Back, 1, 32, 24);
        assert_ne!(frame0.rgb[1], frame1.rgb[1]);
    }

    #[test]
    fn test_cameras_are_distinguishable() {
        let front = synthetic_video_frame(CameraPosition::Front, 0, 4, 4);
        let back = synthetic_video_frame(CameraPosition::Back, 0, 4, 4);
        assert_ne!(front.rgb[0], back.rgb[0]);
    }

    #[test]
    fn test_default_profile_is_portrait() {
        let profile = SimulatedCameraProfile::default();
        assert!(profile.resolution.1 > profile.resolution.0);
        assert!(profile.poster_resolution.1 > profile.poster_resolution.0);
    }
}
