//! Frame sources feeding the encoded outputs
//!
//! Sources are opened on the writer thread and never leave it, so camera
//! handles do not need to be `Send`.

use super::config::EncoderSettings;
use crate::errors::BackendError;
use crate::testing::synthetic_video_frame;
use crate::types::{CameraPosition, RgbFrame};
use image::{imageops, RgbImage};
use nokhwa::pixel_format::RgbFormat;
use nokhwa::utils::{CameraIndex, RequestedFormat, RequestedFormatType};
use nokhwa::Camera;
use std::time::{Duration, Instant};

/// Blocking producer of RGB frames at the encoder's dimensions
pub trait FrameSource {
    fn next_frame(&mut self) -> Result<RgbFrame, BackendError>;
}

/// Where an output gets its frames from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    /// Generated gradient frames paced at the configured frame rate
    Synthetic,
    /// A physical camera opened through nokhwa
    Camera,
}

impl SourceKind {
    pub(crate) fn open(
        &self,
        position: CameraPosition,
        device_id: Option<&str>,
        settings: &EncoderSettings,
    ) -> Result<Box<dyn FrameSource>, BackendError> {
        match self {
            SourceKind::Synthetic => Ok(Box::new(SyntheticSource::new(position, settings))),
            SourceKind::Camera => {
                let device_id = device_id.ok_or_else(|| {
                    BackendError::new(format!("no {} camera is connected to this output", position))
                })?;
                Ok(Box::new(CameraSource::open(device_id, settings)?))
            }
        }
    }
}

/// Synthetic frames, one per frame interval
pub struct SyntheticSource {
    position: CameraPosition,
    width: u32,
    height: u32,
    interval: Duration,
    frame_number: u64,
    next_due: Option<Instant>,
}

impl SyntheticSource {
    pub fn new(position: CameraPosition, settings: &EncoderSettings) -> Self {
        Self {
            position,
            width: settings.width,
            height: settings.height,
            interval: settings.frame_interval(),
            frame_number: 0,
            next_due: None,
        }
    }
}

impl FrameSource for SyntheticSource {
    fn next_frame(&mut self) -> Result<RgbFrame, BackendError> {
        let now = Instant::now();
        let due = *self.next_due.get_or_insert(now);
        if due > now {
            std::thread::sleep(due - now);
        }
        self.next_due = Some(due + self.interval);

        let frame = synthetic_video_frame(self.position, self.frame_number, self.width, self.height);
        self.frame_number += 1;
        Ok(frame)
    }
}

/// Live camera frames, scaled to the encoder's dimensions
pub struct CameraSource {
    camera: Camera,
    width: u32,
    height: u32,
}

impl CameraSource {
    pub fn open(device_id: &str, settings: &EncoderSettings) -> Result<Self, BackendError> {
        let index = device_id
            .parse::<u32>()
            .map(CameraIndex::Index)
            .unwrap_or_else(|_| CameraIndex::String(device_id.to_string()));
        let requested = RequestedFormat::new::<RgbFormat>(RequestedFormatType::None);

        let mut camera = Camera::new(index, requested)
            .map_err(|e| BackendError::new(format!("Failed to open camera {}: {}", device_id, e)))?;
        camera
            .open_stream()
            .map_err(|e| BackendError::new(format!("Failed to start stream: {}", e)))?;

        log::info!("Opened camera {} for recording", device_id);
        Ok(Self {
            camera,
            width: settings.width,
            height: settings.height,
        })
    }
}

impl FrameSource for CameraSource {
    fn next_frame(&mut self) -> Result<RgbFrame, BackendError> {
        let buffer = self
            .camera
            .frame()
            .map_err(|e| BackendError::new(format!("Failed to capture frame: {}", e)))?;
        let decoded = buffer
            .decode_image::<RgbFormat>()
            .map_err(|e| BackendError::new(format!("Failed to decode frame: {}", e)))?;

        let (width, height) = (decoded.width(), decoded.height());
        let image = RgbImage::from_raw(width, height, decoded.into_raw())
            .ok_or_else(|| BackendError::new("camera returned a truncated frame"))?;

        let image = if (width, height) == (self.width, self.height) {
            image
        } else {
            imageops::resize(&image, self.width, self.height, imageops::FilterType::Triangle)
        };
        Ok(RgbFrame::new(self.width, self.height, image.into_raw()))
    }
}

impl Drop for CameraSource {
    fn drop(&mut self) {
        if let Err(e) = self.camera.stop_stream() {
            log::warn!("Failed to stop camera stream: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_synthetic_source_matches_settings() {
        let settings = EncoderSettings::new(32, 24, 120.0);
        let mut source = SyntheticSource::new(CameraPosition::Front, &settings);
        let first = source.next_frame().unwrap();
        let second = source.next_frame().unwrap();
        assert_eq!((first.width, first.height), (32, 24));
        assert!(first.is_valid());
        assert_ne!(first.rgb, second.rgb);
    }

    #[test]
    fn test_synthetic_source_is_paced() {
        let settings = EncoderSettings::new(8, 8, 50.0);
        let mut source = SyntheticSource::new(CameraPosition::Back, &settings);
        let started = Instant::now();
        for _ in 0..4 {
            source.next_frame().unwrap();
        }
        // First frame is immediate, the next three wait 20ms each
        assert!(started.elapsed() >= Duration::from_millis(55));
    }

    #[test]
    fn test_camera_source_requires_device() {
        let settings = EncoderSettings::new(8, 8, 30.0);
        let result = SourceKind::Camera.open(CameraPosition::Front, None, &settings);
        assert!(result.is_err());
    }
}
