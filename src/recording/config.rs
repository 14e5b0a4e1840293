//! Encoder configuration types

use serde::{Deserialize, Serialize};

/// Quality presets for the per-camera movie files
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EncoderQuality {
    /// 720x1280 portrait, lower bitrate
    Low,
    /// 1080x1920 portrait, standard bitrate
    Medium,
    /// 1080x1920 portrait, high bitrate
    #[default]
    High,
    /// Explicit dimensions
    Custom,
}

impl EncoderQuality {
    /// Recommended bitrate in bits per second
    pub fn bitrate(&self) -> u32 {
        match self {
            EncoderQuality::Low => 2_500_000,
            EncoderQuality::Medium => 5_000_000,
            EncoderQuality::High => 10_000_000,
            EncoderQuality::Custom => 5_000_000,
        }
    }

    /// Recommended portrait resolution (width, height)
    pub fn resolution(&self) -> (u32, u32) {
        match self {
            EncoderQuality::Low => (720, 1280),
            EncoderQuality::Medium | EncoderQuality::High | EncoderQuality::Custom => (1080, 1920),
        }
    }
}

/// Settings shared by both camera encoders
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EncoderSettings {
    /// Video width in pixels (even)
    pub width: u32,
    /// Video height in pixels (even)
    pub height: u32,
    pub fps: f64,
    /// Target bitrate in bits per second
    pub bitrate: u32,
    pub quality: EncoderQuality,
    /// Write the moov atom before mdat
    pub fast_start: bool,
    pub title: Option<String>,
    /// Width of the poster still kept from the first frame
    pub poster_width: u32,
    /// Microphone channels muxed when audio is connected (1 or 2)
    #[serde(default = "default_audio_channels")]
    pub audio_channels: u16,
    /// Opus bitrate in bits per second
    #[serde(default = "default_audio_bitrate")]
    pub audio_bitrate: u32,
}

fn default_audio_channels() -> u16 {
    1
}

fn default_audio_bitrate() -> u32 {
    96_000
}

impl EncoderSettings {
    /// Explicit dimensions
    pub fn new(width: u32, height: u32, fps: f64) -> Self {
        Self {
            width,
            height,
            fps,
            bitrate: 5_000_000,
            quality: EncoderQuality::Custom,
            fast_start: true,
            title: None,
            poster_width: 180,
            audio_channels: default_audio_channels(),
            audio_bitrate: default_audio_bitrate(),
        }
    }

    pub fn from_quality(quality: EncoderQuality) -> Self {
        let (width, height) = quality.resolution();
        Self {
            bitrate: quality.bitrate(),
            quality,
            ..Self::new(width, height, 30.0)
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn with_bitrate(mut self, bitrate: u32) -> Self {
        self.bitrate = bitrate;
        self
    }

    pub fn with_poster_width(mut self, width: u32) -> Self {
        self.poster_width = width;
        self
    }

    pub fn with_audio_channels(mut self, channels: u16) -> Self {
        self.audio_channels = channels;
        self
    }

    pub fn frame_interval(&self) -> std::time::Duration {
        std::time::Duration::from_secs_f64(1.0 / self.fps.max(1.0))
    }

    /// Dimensions the encoder accepts: non-zero and even
    pub fn is_encodable(&self) -> bool {
        self.width > 0
            && self.height > 0
            && self.width % 2 == 0
            && self.height % 2 == 0
            && self.fps > 0.0
    }
}

impl Default for EncoderSettings {
    fn default() -> Self {
        Self::from_quality(EncoderQuality::High)
    }
}

/// Statistics returned after finishing a movie file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordingStats {
    pub video_frames: u64,
    /// Opus packets muxed; zero for video-only files
    pub audio_frames: u64,
    pub duration_secs: f64,
    pub bytes_written: u64,
    /// Average frames per second achieved
    pub actual_fps: f64,
    pub dropped_frames: u64,
    pub output_path: String,
}

impl RecordingStats {
    /// Average bitrate achieved in bits per second
    pub fn avg_bitrate(&self) -> f64 {
        if self.duration_secs > 0.0 {
            (self.bytes_written as f64 * 8.0) / self.duration_secs
        } else {
            0.0
        }
    }
}
