//! Front/back camera and microphone discovery

use crate::config::CaptureConfig;
use crate::errors::{BackendError, SetupError};
use crate::types::{AudioDevice, CameraPosition, CaptureDevice, DeviceSet};
use std::sync::Arc;

/// Camera as reported by a provider, before position resolution
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveredCamera {
    pub id: String,
    pub name: String,
    /// Known placement, when the hardware reports one
    pub position: Option<CameraPosition>,
}

impl DiscoveredCamera {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            position: None,
        }
    }

    pub fn at(mut self, position: CameraPosition) -> Self {
        self.position = Some(position);
        self
    }
}

/// Hardware enumeration seam
pub trait DeviceProvider: Send + Sync {
    fn video_devices(&self) -> Result<Vec<DiscoveredCamera>, BackendError>;
    fn audio_devices(&self) -> Result<Vec<AudioDevice>, BackendError>;
}

/// Result of one discovery pass. Any slot may be empty.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DiscoveredDevices {
    pub front: Option<CaptureDevice>,
    pub back: Option<CaptureDevice>,
    pub audio: Option<AudioDevice>,
}

impl DiscoveredDevices {
    /// Every slot must be filled; a partially wired session is never built.
    pub fn require(self) -> Result<DeviceSet, SetupError> {
        let front = self.front.ok_or(SetupError::MissingDevice("front camera"))?;
        let back = self.back.ok_or(SetupError::MissingDevice("back camera"))?;
        let audio = self.audio.ok_or(SetupError::MissingDevice("audio input"))?;
        Ok(DeviceSet { front, back, audio })
    }
}

pub struct DeviceDiscovery {
    provider: Arc<dyn DeviceProvider>,
    config: CaptureConfig,
}

impl DeviceDiscovery {
    pub fn new(provider: Arc<dyn DeviceProvider>, config: CaptureConfig) -> Self {
        Self { provider, config }
    }

    pub fn discover_devices(&self) -> Result<DiscoveredDevices, SetupError> {
        let cameras = self
            .provider
            .video_devices()
            .map_err(|e| SetupError::Discovery(e.message))?;
        let microphones = self
            .provider
            .audio_devices()
            .map_err(|e| SetupError::Discovery(e.message))?;

        log::debug!(
            "Discovered {} camera(s) and {} audio input(s)",
            cameras.len(),
            microphones.len()
        );

        let front = self.resolve(&cameras, CameraPosition::Front);
        let back = self.resolve(&cameras, CameraPosition::Back);
        let audio = match &self.config.audio_device_id {
            Some(id) => microphones.into_iter().find(|m| &m.id == id),
            None => microphones.into_iter().next(),
        };

        match (&front, &back) {
            (Some(f), Some(b)) if f.id == b.id => {
                log::warn!("Front and back resolved to the same device {}", f.id);
                return Ok(DiscoveredDevices {
                    front: Some(f.clone()),
                    back: None,
                    audio,
                });
            }
            _ => {}
        }

        for device in [&front, &back].into_iter().flatten() {
            log::info!("Using {} camera: {} ({})", device.position, device.name, device.id);
        }
        if let Some(mic) = &audio {
            log::info!("Using audio input: {} ({})", mic.name, mic.id);
        }

        Ok(DiscoveredDevices { front, back, audio })
    }

    fn resolve(&self, cameras: &[DiscoveredCamera], position: CameraPosition) -> Option<CaptureDevice> {
        let configured = match position {
            CameraPosition::Front => &self.config.front_device_id,
            CameraPosition::Back => &self.config.back_device_id,
        };

        let found = match configured {
            Some(id) => cameras.iter().find(|c| &c.id == id),
            None => cameras
                .iter()
                .find(|c| c.position == Some(position))
                .or_else(|| {
                    cameras
                        .iter()
                        .find(|c| c.position.is_none() && position_from_name(&c.name) == Some(position))
                }),
        }?;

        Some(CaptureDevice::new(found.id.clone(), found.name.clone(), position))
    }
}

/// Infer placement from common device naming conventions
pub fn position_from_name(name: &str) -> Option<CameraPosition> {
    let lower = name.to_lowercase();
    const FRONT: [&str; 5] = ["front", "user", "selfie", "facetime", "integrated"];
    const BACK: [&str; 4] = ["back", "rear", "environment", "world"];

    if BACK.iter().any(|k| lower.contains(k)) {
        Some(CameraPosition::Back)
    } else if FRONT.iter().any(|k| lower.contains(k)) {
        Some(CameraPosition::Front)
    } else {
        None
    }
}
