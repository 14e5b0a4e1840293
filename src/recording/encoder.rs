//! H.264 encoder wrapper using openh264

use crate::errors::BackendError;
use crate::types::RgbFrame;
use openh264::encoder::{Encoder, FrameType};
use openh264::formats::YUVBuffer;

/// H.264 encoder for one camera stream
pub struct H264Encoder {
    encoder: Encoder,
    width: u32,
    height: u32,
    frame_count: u64,
}

impl H264Encoder {
    /// Dimensions are inferred from the YUV source at encode time; they are
    /// kept here to validate incoming frames.
    pub fn new(width: u32, height: u32) -> Result<Self, BackendError> {
        let encoder = Encoder::new()
            .map_err(|e| BackendError::new(format!("Failed to create encoder: {}", e)))?;

        Ok(Self {
            encoder,
            width,
            height,
            frame_count: 0,
        })
    }

    /// Encode an RGB frame to Annex B NAL units
    pub fn encode(&mut self, frame: &RgbFrame) -> Result<EncodedFrame, BackendError> {
        if frame.width != self.width || frame.height != self.height || !frame.is_valid() {
            return Err(BackendError::new(format!(
                "Frame {}x{} ({} bytes) does not match encoder {}x{}",
                frame.width,
                frame.height,
                frame.rgb.len(),
                self.width,
                self.height
            )));
        }

        let yuv = rgb_to_yuv420(&frame.rgb, self.width, self.height);
        let yuv_buffer = YUVBuffer::from_vec(yuv, self.width as usize, self.height as usize);

        let bitstream = self
            .encoder
            .encode(&yuv_buffer)
            .map_err(|e| BackendError::new(format!("Encoding failed: {}", e)))?;

        self.frame_count += 1;
        let is_keyframe = matches!(bitstream.frame_type(), FrameType::IDR | FrameType::I);

        Ok(EncodedFrame {
            data: bitstream.to_vec(),
            is_keyframe,
        })
    }

    pub fn frame_count(&self) -> u64 {
        self.frame_count
    }
}

/// Result of encoding a single frame
#[derive(Debug, Clone)]
pub struct EncodedFrame {
    /// Annex B data (with start codes)
    pub data: Vec<u8>,
    pub is_keyframe: bool,
}

/// Flip a frame left-to-right in place
pub fn mirror_horizontal(frame: &mut RgbFrame) {
    let row_len = frame.width as usize * 3;
    if row_len == 0 {
        return;
    }
    for row in frame.rgb.chunks_exact_mut(row_len) {
        let (mut left, mut right) = (0usize, frame.width as usize - 1);
        while left < right {
            for c in 0..3 {
                row.swap(left * 3 + c, right * 3 + c);
            }
            left += 1;
            right -= 1;
        }
    }
}

/// Convert RGB24 to YUV420 planar (BT.601)
fn rgb_to_yuv420(rgb: &[u8], width: u32, height: u32) -> Vec<u8> {
    let w = width as usize;
    let h = height as usize;

    let y_size = w * h;
    let uv_size = (w / 2) * (h / 2);
    let mut yuv = vec![0u8; y_size + uv_size * 2];

    let (y_plane, uv_planes) = yuv.split_at_mut(y_size);
    let (u_plane, v_plane) = uv_planes.split_at_mut(uv_size);

    for y in 0..h {
        for x in 0..w {
            let rgb_idx = (y * w + x) * 3;
            let r = rgb[rgb_idx] as i32;
            let g = rgb[rgb_idx + 1] as i32;
            let b = rgb[rgb_idx + 2] as i32;

            let y_val = ((66 * r + 129 * g + 25 * b + 128) >> 8) + 16;
            y_plane[y * w + x] = y_val.clamp(0, 255) as u8;

            // 2x2 chroma subsampling
            if y % 2 == 0 && x % 2 == 0 {
                let uv_idx = (y / 2) * (w / 2) + (x / 2);
                let u_val = ((-38 * r - 74 * g + 112 * b + 128) >> 8) + 128;
                let v_val = ((112 * r - 94 * g - 18 * b + 128) >> 8) + 128;
                u_plane[uv_idx] = u_val.clamp(0, 255) as u8;
                v_plane[uv_idx] = v_val.clamp(0, 255) as u8;
            }
        }
    }

    yuv
}
