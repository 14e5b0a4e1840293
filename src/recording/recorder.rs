//! Movie writer combining encoder and muxer

use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use std::time::Instant;

use muxide::api::{AudioCodec, Metadata, MuxerBuilder, VideoCodec};

use super::config::{EncoderSettings, RecordingStats};
use super::encoder::H264Encoder;
use crate::errors::BackendError;
use crate::types::RgbFrame;

/// Opus is muxed at its native rate
const AUDIO_SAMPLE_RATE: u32 = 48_000;

/// Encodes RGB frames to H.264 and muxes them into one MP4 file, with an
/// optional Opus audio track
pub struct MovieWriter {
    encoder: H264Encoder,
    muxer: muxide::api::Muxer<BufWriter<File>>,
    settings: EncoderSettings,
    output_path: PathBuf,
    audio_channels: Option<u16>,
    frame_count: u64,
    audio_packets: u64,
    dropped_frames: u64,
    start_time: Option<Instant>,
    frame_duration_secs: f64,
}

impl MovieWriter {
    pub fn create<P: AsRef<Path>>(output_path: P, settings: EncoderSettings) -> Result<Self, BackendError> {
        Self::create_with_audio(output_path, settings, None)
    }

    /// Declare an Opus track with `audio_channels` channels next to the video
    pub fn create_with_audio<P: AsRef<Path>>(
        output_path: P,
        settings: EncoderSettings,
        audio_channels: Option<u16>,
    ) -> Result<Self, BackendError> {
        let output_path = output_path.as_ref().to_path_buf();
        if !settings.is_encodable() {
            return Err(BackendError::new(format!(
                "Cannot encode {}x{} at {} fps",
                settings.width, settings.height, settings.fps
            )));
        }

        let file = File::create(&output_path).map_err(|e| {
            BackendError::new(format!("Failed to create {}: {}", output_path.display(), e))
        })?;
        let writer = BufWriter::new(file);

        let encoder = H264Encoder::new(settings.width, settings.height)?;

        let mut metadata = Metadata::new().with_current_time();
        if let Some(ref title) = settings.title {
            metadata = metadata.with_title(title);
        }
        let mut builder = MuxerBuilder::new(writer)
            .video(VideoCodec::H264, settings.width, settings.height, settings.fps);
        if let Some(channels) = audio_channels {
            builder = builder.audio(AudioCodec::Opus, AUDIO_SAMPLE_RATE, channels);
        }
        let muxer = builder
            .with_fast_start(settings.fast_start)
            .with_metadata(metadata)
            .build()
            .map_err(|e| BackendError::new(format!("Failed to create muxer: {}", e)))?;

        let frame_duration_secs = 1.0 / settings.fps;

        Ok(Self {
            encoder,
            muxer,
            settings,
            output_path,
            audio_channels,
            frame_count: 0,
            audio_packets: 0,
            dropped_frames: 0,
            start_time: None,
            frame_duration_secs,
        })
    }

    pub fn write_frame(&mut self, frame: &RgbFrame) -> Result<(), BackendError> {
        if self.start_time.is_none() {
            self.start_time = Some(Instant::now());
        }

        let encoded = self.encoder.encode(frame)?;

        // The encoder may skip a frame under rate control
        if encoded.data.is_empty() {
            self.dropped_frames += 1;
            return Ok(());
        }

        let pts = self.frame_count as f64 * self.frame_duration_secs;
        self.muxer
            .write_video(pts, &encoded.data, encoded.is_keyframe)
            .map_err(|e| BackendError::new(format!("Failed to write frame: {}", e)))?;

        self.frame_count += 1;
        Ok(())
    }

    /// Mux one Opus packet. Packets written before the first video frame
    /// are dropped so the file starts on a keyframe.
    pub fn write_audio(&mut self, pts: f64, packet: &[u8]) -> Result<(), BackendError> {
        if self.audio_channels.is_none() {
            return Err(BackendError::new(format!(
                "{} has no audio track",
                self.output_path.display()
            )));
        }
        if self.frame_count == 0 {
            return Ok(());
        }
        self.muxer
            .write_audio(pts.max(0.0), packet)
            .map_err(|e| BackendError::new(format!("Failed to write audio: {}", e)))?;
        self.audio_packets += 1;
        Ok(())
    }

    /// Finalize the file and return statistics
    pub fn finish(self) -> Result<RecordingStats, BackendError> {
        if self.frame_count == 0 {
            return Err(BackendError::new(format!(
                "No frames written to {}",
                self.output_path.display()
            )));
        }

        let muxer_stats = self
            .muxer
            .finish_with_stats()
            .map_err(|e| BackendError::new(format!("Failed to finalize recording: {}", e)))?;

        let wall_clock = self
            .start_time
            .map(|start| start.elapsed().as_secs_f64())
            .unwrap_or(muxer_stats.duration_secs);
        let actual_fps = if wall_clock > 0.0 {
            self.frame_count as f64 / wall_clock
        } else {
            0.0
        };

        log::debug!(
            "Finished {} ({} frames, {} audio packets, {} dropped, {:.1} fps target {:.1})",
            self.output_path.display(),
            muxer_stats.video_frames,
            muxer_stats.audio_frames,
            self.dropped_frames,
            actual_fps,
            self.settings.fps
        );

        Ok(RecordingStats {
            video_frames: muxer_stats.video_frames,
            audio_frames: muxer_stats.audio_frames,
            duration_secs: muxer_stats.duration_secs,
            bytes_written: muxer_stats.bytes_written,
            actual_fps,
            dropped_frames: self.dropped_frames,
            output_path: self.output_path.to_string_lossy().to_string(),
        })
    }

    pub fn frame_count(&self) -> u64 {
        self.frame_count
    }

    pub fn audio_packets(&self) -> u64 {
        self.audio_packets
    }

    pub fn has_audio_track(&self) -> bool {
        self.audio_channels.is_some()
    }

    pub fn settings(&self) -> &EncoderSettings {
        &self.settings
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejects_odd_dimensions() {
        let dir = tempfile::tempdir().unwrap();
        let result = MovieWriter::create(dir.path().join("odd.mp4"), EncoderSettings::new(63, 48, 30.0));
        assert!(result.is_err());
    }

    #[test]
    fn test_finish_without_frames_fails() {
        let dir = tempfile::tempdir().unwrap();
        let writer = MovieWriter::create(dir.path().join("empty.mp4"), EncoderSettings::new(64, 48, 30.0)).unwrap();
        assert!(writer.finish().is_err());
    }

    #[test]
    fn test_write_frames() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("frames.mp4");
        let settings = EncoderSettings::new(64, 48, 30.0).with_title("Test Recording");
        let mut writer = MovieWriter::create(&output, settings).expect("Writer creation failed");

        for i in 0..30u8 {
            let frame = RgbFrame::new(64, 48, vec![i.wrapping_mul(8); 64 * 48 * 3]);
            writer.write_frame(&frame).expect("Frame write should succeed");
        }
        assert_eq!(writer.frame_count(), 30);

        let stats = writer.finish().expect("Finish should succeed");
        assert_eq!(stats.video_frames, 30);
        assert!(stats.bytes_written > 0);
        assert!(stats.duration_secs > 0.0);
        assert!(std::fs::metadata(&output).unwrap().len() > 0);
    }

    #[test]
    fn test_audio_needs_a_declared_track() {
        let dir = tempfile::tempdir().unwrap();
        let mut writer = MovieWriter::create(dir.path().join("silent.mp4"), EncoderSettings::new(64, 48, 30.0)).unwrap();
        assert!(!writer.has_audio_track());
        assert!(writer.write_audio(0.0, &[0xf8, 0xff, 0xfe]).is_err());
    }

    #[test]
    fn test_audio_before_first_frame_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let mut writer =
            MovieWriter::create_with_audio(dir.path().join("av.mp4"), EncoderSettings::new(64, 48, 30.0), Some(1))
                .unwrap();
        writer.write_audio(0.0, &[0xf8, 0xff, 0xfe]).unwrap();
        assert_eq!(writer.audio_packets(), 0);

        writer.write_frame(&RgbFrame::new(64, 48, vec![90; 64 * 48 * 3])).unwrap();
        writer.write_audio(0.02, &[0xf8, 0xff, 0xfe]).unwrap();
        assert_eq!(writer.audio_packets(), 1);

        let stats = writer.finish().unwrap();
        assert_eq!(stats.audio_frames, 1);
    }
}
