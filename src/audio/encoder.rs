//! Opus audio encoder
//!
//! Accumulates interleaved f32 PCM into 20 ms frames and encodes each to one
//! raw Opus packet, the form muxide accepts for MP4 audio tracks.

use super::feed::AudioFrame;
use crate::errors::BackendError;

/// Opus only runs at 48 kHz here; no resampling is done
pub const OPUS_SAMPLE_RATE: u32 = 48_000;

/// 20 ms at 48 kHz, per channel
const OPUS_FRAME_SAMPLES: usize = 960;

/// OPUS_APPLICATION_AUDIO from opus.h
const OPUS_APPLICATION_AUDIO: i32 = 2049;

/// Largest packet libopus will emit for one frame
const MAX_PACKET_BYTES: usize = 4000;

#[derive(Debug, Clone)]
pub struct EncodedAudio {
    pub data: Vec<u8>,
    /// Presentation timestamp in seconds
    pub timestamp: f64,
    pub duration: f64,
}

/// Opus encoder owned by a single writer thread.
///
/// `Send` but not `Sync`: the libopus state may move between threads but is
/// never shared.
pub struct OpusEncoder {
    encoder: *mut libopus_sys::OpusEncoder,
    channels: u16,
    sample_buffer: Vec<f32>,
    /// Timestamp of the first buffered sample; fixed for the encoder's life
    start_pts: Option<f64>,
    samples_encoded: u64,
}

// SAFETY: the encoder pointer is owned exclusively by this value and libopus
// encoders may be used from any one thread at a time.
unsafe impl Send for OpusEncoder {}

impl OpusEncoder {
    pub fn new(channels: u16, bitrate: u32) -> Result<Self, BackendError> {
        if channels != 1 && channels != 2 {
            return Err(BackendError::new(format!(
                "Opus supports mono or stereo, not {} channels",
                channels
            )));
        }

        let mut error: i32 = 0;
        let encoder = unsafe {
            libopus_sys::opus_encoder_create(
                OPUS_SAMPLE_RATE as i32,
                channels as i32,
                OPUS_APPLICATION_AUDIO,
                &mut error,
            )
        };
        if encoder.is_null() || error != 0 {
            return Err(BackendError::new(format!(
                "Failed to create Opus encoder: error code {}",
                error
            )));
        }

        let result = unsafe {
            libopus_sys::opus_encoder_ctl(
                encoder,
                libopus_sys::OPUS_SET_BITRATE_REQUEST as i32,
                bitrate as i32,
            )
        };
        if result != 0 {
            unsafe { libopus_sys::opus_encoder_destroy(encoder) };
            return Err(BackendError::new(format!(
                "Failed to set Opus bitrate: error code {}",
                result
            )));
        }

        Ok(Self {
            encoder,
            channels,
            sample_buffer: Vec::with_capacity(OPUS_FRAME_SAMPLES * channels as usize * 2),
            start_pts: None,
            samples_encoded: 0,
        })
    }

    pub fn channels(&self) -> u16 {
        self.channels
    }

    /// Encode every complete 20 ms frame now buffered
    pub fn encode(&mut self, frame: &AudioFrame) -> Result<Vec<EncodedAudio>, BackendError> {
        if frame.sample_rate != OPUS_SAMPLE_RATE || frame.channels != self.channels {
            return Err(BackendError::new(format!(
                "Audio format {} Hz x{} does not match encoder {} Hz x{}",
                frame.sample_rate, frame.channels, OPUS_SAMPLE_RATE, self.channels
            )));
        }
        if self.start_pts.is_none() && !frame.samples.is_empty() {
            self.start_pts = Some(frame.timestamp);
        }
        self.sample_buffer.extend_from_slice(&frame.samples);
        self.drain_frames()
    }

    /// Pad the tail with silence and encode it
    pub fn flush(&mut self) -> Result<Vec<EncodedAudio>, BackendError> {
        let samples_per_frame = self.samples_per_frame();
        let remainder = self.sample_buffer.len() % samples_per_frame;
        if remainder != 0 {
            self.sample_buffer
                .resize(self.sample_buffer.len() + samples_per_frame - remainder, 0.0);
        }
        self.drain_frames()
    }

    fn samples_per_frame(&self) -> usize {
        OPUS_FRAME_SAMPLES * self.channels as usize
    }

    fn drain_frames(&mut self) -> Result<Vec<EncodedAudio>, BackendError> {
        let samples_per_frame = self.samples_per_frame();
        let frame_duration = OPUS_FRAME_SAMPLES as f64 / OPUS_SAMPLE_RATE as f64;
        let mut packets = Vec::new();

        while self.sample_buffer.len() >= samples_per_frame {
            let samples: Vec<f32> = self.sample_buffer.drain(..samples_per_frame).collect();
            let mut output = vec![0u8; MAX_PACKET_BYTES];
            let len = unsafe {
                libopus_sys::opus_encode_float(
                    self.encoder,
                    samples.as_ptr(),
                    OPUS_FRAME_SAMPLES as i32,
                    output.as_mut_ptr(),
                    output.len() as i32,
                )
            };
            if len < 0 {
                return Err(BackendError::new(format!(
                    "Opus encoding failed: error code {}",
                    len
                )));
            }
            output.truncate(len as usize);

            // Position comes from the sample count, not from capture jitter
            let offset = self.samples_encoded as f64 / OPUS_SAMPLE_RATE as f64;
            packets.push(EncodedAudio {
                data: output,
                timestamp: self.start_pts.unwrap_or(0.0) + offset,
                duration: frame_duration,
            });
            self.samples_encoded += OPUS_FRAME_SAMPLES as u64;
        }
        Ok(packets)
    }
}

impl Drop for OpusEncoder {
    fn drop(&mut self) {
        if !self.encoder.is_null() {
            unsafe { libopus_sys::opus_encoder_destroy(self.encoder) };
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(samples: usize, channels: u16, timestamp: f64) -> AudioFrame {
        AudioFrame {
            samples: vec![0.0; samples],
            sample_rate: OPUS_SAMPLE_RATE,
            channels,
            timestamp,
        }
    }

    #[test]
    fn test_rejects_surround() {
        assert!(OpusEncoder::new(6, 96_000).is_err());
    }

    #[test]
    fn test_full_frame_yields_one_packet() {
        let mut encoder = OpusEncoder::new(1, 96_000).unwrap();
        let packets = encoder.encode(&frame(OPUS_FRAME_SAMPLES, 1, 0.5)).unwrap();
        assert_eq!(packets.len(), 1);
        assert!(!packets[0].data.is_empty());
        assert_eq!(packets[0].timestamp, 0.5);
    }

    #[test]
    fn test_timestamps_follow_sample_count() {
        let mut encoder = OpusEncoder::new(2, 128_000).unwrap();
        let packets = encoder.encode(&frame(OPUS_FRAME_SAMPLES * 2 * 3, 2, 1.0)).unwrap();
        assert_eq!(packets.len(), 3);
        for (packet, expected) in packets.iter().zip([1.0, 1.02, 1.04]) {
            assert!((packet.timestamp - expected).abs() < 1e-9, "{} != {}", packet.timestamp, expected);
        }
    }

    #[test]
    fn test_partial_frame_waits_for_flush() {
        let mut encoder = OpusEncoder::new(1, 96_000).unwrap();
        assert!(encoder.encode(&frame(100, 1, 0.0)).unwrap().is_empty());
        assert_eq!(encoder.flush().unwrap().len(), 1);
        assert!(encoder.flush().unwrap().is_empty());
    }

    #[test]
    fn test_format_mismatch_is_rejected() {
        let mut encoder = OpusEncoder::new(1, 96_000).unwrap();
        let mut wrong = frame(960, 1, 0.0);
        wrong.sample_rate = 44_100;
        assert!(encoder.encode(&wrong).is_err());
    }
}
