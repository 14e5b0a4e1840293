//! Desktop hardware enumeration
//!
//! Cameras come from nokhwa; the microphone comes from cpal when the
//! `audio` feature is enabled. With the `recording` feature,
//! [`system_deps`] assembles everything a pipeline needs to run on the
//! host's own cameras.

use crate::discovery::{DeviceProvider, DiscoveredCamera};
use crate::errors::BackendError;
use crate::types::{AudioDevice, Platform};

/// Device provider backed by the host's camera and audio stacks
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemDevices;

impl SystemDevices {
    fn api_backend() -> nokhwa::utils::ApiBackend {
        match Platform::current() {
            Platform::Linux => nokhwa::utils::ApiBackend::Video4Linux,
            Platform::MacOS => nokhwa::utils::ApiBackend::AVFoundation,
            Platform::Windows => nokhwa::utils::ApiBackend::MediaFoundation,
            Platform::Unknown => nokhwa::utils::ApiBackend::Auto,
        }
    }
}

impl DeviceProvider for SystemDevices {
    fn video_devices(&self) -> Result<Vec<DiscoveredCamera>, BackendError> {
        let cameras = nokhwa::query(Self::api_backend())
            .map_err(|e| BackendError::new(format!("Failed to query cameras: {}", e)))?;

        Ok(cameras
            .into_iter()
            .map(|info| DiscoveredCamera::new(info.index().to_string(), info.human_name()))
            .collect())
    }

    #[cfg(feature = "audio")]
    fn audio_devices(&self) -> Result<Vec<AudioDevice>, BackendError> {
        use cpal::traits::{DeviceTrait, HostTrait};

        let host = cpal::default_host();
        let default_name = host.default_input_device().and_then(|d| d.name().ok());

        let mut devices: Vec<(bool, AudioDevice)> = host
            .input_devices()
            .map_err(|e| BackendError::new(format!("Failed to enumerate audio devices: {}", e)))?
            .enumerate()
            .filter_map(|(index, device)| {
                let name = device.name().ok()?;
                let is_default = default_name.as_ref() == Some(&name);
                Some((is_default, AudioDevice::new(format!("audio_{}", index), name)))
            })
            .collect();

        // Default input first, then by name
        devices.sort_by(|a, b| b.0.cmp(&a.0).then_with(|| a.1.name.cmp(&b.1.name)));
        Ok(devices.into_iter().map(|(_, d)| d).collect())
    }

    #[cfg(not(feature = "audio"))]
    fn audio_devices(&self) -> Result<Vec<AudioDevice>, BackendError> {
        log::warn!("Built without the audio feature; no microphone can be discovered");
        Ok(Vec::new())
    }
}

/// Host authorization, cameras, microphone and encoder, with the configured
/// video store. Compositions are rendered to MP4 from the recorded files.
#[cfg(feature = "recording")]
pub fn system_deps(
    config: &crate::config::DualPovConfig,
    encoder: crate::recording::EncoderSettings,
) -> Result<crate::pipeline::PipelineDeps, crate::errors::PipelineError> {
    use crate::permissions::SystemAuthorization;
    use crate::persistence::VideoStore;
    use crate::recording::{EncodedBackend, MovieExporter, Mp4AssetLoader};
    use std::sync::Arc;

    let store = VideoStore::open(&config.storage.store_directory, config.storage.thumbnail_width)?;
    let backend = EncodedBackend::cameras(encoder.clone());
    #[cfg(feature = "audio")]
    let backend = backend.with_audio(crate::audio::AudioSourceKind::Microphone);

    Ok(crate::pipeline::PipelineDeps {
        authorization: Arc::new(SystemAuthorization),
        devices: Arc::new(SystemDevices),
        backend: Arc::new(backend),
        loader: Arc::new(Mp4AssetLoader::new()),
        exporter: Arc::new(MovieExporter::new(encoder)),
        store: Some(Arc::new(store)),
        extra_sinks: Vec::new(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    #[ignore = "Requires camera hardware - run manually"]
    fn test_system_devices_enumerate() {
        let cameras = SystemDevices.video_devices().unwrap();
        for camera in cameras {
            println!("{}: {}", camera.id, camera.name);
        }
    }

    #[test]
    fn test_audio_enumeration_does_not_panic() {
        let _ = SystemDevices.audio_devices();
    }
}
