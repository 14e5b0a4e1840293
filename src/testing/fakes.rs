//! Exporter and sink doubles, plus a ready-made finalizer

use crate::composition::{
    AssetCatalog, AssetExporter, AssetLoader, CompositionEngine, CompositionPlan, ExportPreset,
    ExportRequest,
};
use crate::config::DualPovConfig;
use crate::errors::{CompositionError, PersistenceError};
use crate::finalize::{AssetFinalizer, FinalAsset};
use crate::persistence::{PersistenceSink, VideoStore};
use crate::pipeline::PipelineDeps;
use crate::session::CaptureBackend;
use crate::testing::{SimulatedAuthorization, SimulatedDevices};
use serde::Serialize;
use std::fs;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// Writes the composition plan as JSON instead of rendering it.
///
/// The simulated outputs write placeholder files that cannot be decoded, so
/// offline pipelines export the plan they would have rendered.
#[derive(Debug, Default, Clone)]
pub struct PlanExporter;

#[derive(Serialize)]
struct PlanDocument<'a> {
    format: &'static str,
    preset: ExportPreset,
    duration_secs: f64,
    plan: &'a CompositionPlan,
}

impl AssetExporter for PlanExporter {
    fn export(&self, request: &ExportRequest) -> Result<(), CompositionError> {
        let document = PlanDocument {
            format: "dualpov-plan",
            preset: request.preset,
            duration_secs: request.plan.duration.as_secs_f64(),
            plan: &request.plan,
        };
        let json = serde_json::to_vec_pretty(&document)
            .map_err(|e| CompositionError::Export(e.to_string()))?;

        if let Some(parent) = request.destination.parent() {
            fs::create_dir_all(parent).map_err(|e| {
                CompositionError::Export(format!("cannot create {}: {}", parent.display(), e))
            })?;
        }
        fs::write(&request.destination, json).map_err(|e| {
            CompositionError::Export(format!(
                "cannot write {}: {}",
                request.destination.display(),
                e
            ))
        })
    }

    fn file_extension(&self) -> &str {
        "json"
    }
}

/// Exporter that always fails
#[derive(Debug, Default)]
pub struct FailingExporter {
    attempts: AtomicUsize,
}

impl FailingExporter {
    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

impl AssetExporter for FailingExporter {
    fn export(&self, _request: &ExportRequest) -> Result<(), CompositionError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        Err(CompositionError::Export("simulated export failure".to_string()))
    }

    fn file_extension(&self) -> &str {
        "json"
    }
}

/// Plan exporter that counts the compositions it writes
#[derive(Debug, Default)]
pub struct CountingExporter {
    inner: PlanExporter,
    exports: AtomicUsize,
}

impl CountingExporter {
    pub fn exports(&self) -> usize {
        self.exports.load(Ordering::SeqCst)
    }
}

impl AssetExporter for CountingExporter {
    fn export(&self, request: &ExportRequest) -> Result<(), CompositionError> {
        self.inner.export(request)?;
        self.exports.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn file_extension(&self) -> &str {
        self.inner.file_extension()
    }
}

/// Sink that remembers what it was given, optionally failing every time
#[derive(Debug, Default)]
pub struct RecordingSink {
    persisted: Mutex<Vec<PathBuf>>,
    failure: Option<String>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing(reason: &str) -> Self {
        Self {
            persisted: Mutex::new(Vec::new()),
            failure: Some(reason.to_string()),
        }
    }

    pub fn persisted(&self) -> Vec<PathBuf> {
        self.persisted
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}

impl PersistenceSink for RecordingSink {
    fn name(&self) -> &str {
        "recording sink"
    }

    fn persist(&self, asset: &FinalAsset) -> Result<(), PersistenceError> {
        if let Some(reason) = &self.failure {
            return Err(PersistenceError::io(
                &asset.path,
                std::io::Error::new(std::io::ErrorKind::Other, reason.clone()),
            ));
        }
        self.persisted
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(asset.path.clone());
        Ok(())
    }
}

/// Finalizer composing with `exporter` into the configured working
/// directory, reading assets through `loader`
pub fn finalizer_with_loader(
    config: &DualPovConfig,
    loader: Arc<dyn AssetLoader>,
    exporter: Arc<dyn AssetExporter>,
    sinks: Vec<Arc<dyn PersistenceSink>>,
) -> Arc<AssetFinalizer> {
    let engine = CompositionEngine::new(
        loader,
        exporter,
        &config.composition,
        config.storage.working_directory.clone(),
    );
    Arc::new(AssetFinalizer::new(engine, sinks))
}

/// Finalizer over simulated recordings, whose metadata comes from the
/// outputs rather than the files
pub fn finalizer_with(
    config: &DualPovConfig,
    exporter: Arc<dyn AssetExporter>,
    sinks: Vec<Arc<dyn PersistenceSink>>,
) -> Arc<AssetFinalizer> {
    finalizer_with_loader(config, catalog_for(config), exporter, sinks)
}

/// Finalizer exporting composition plans of simulated recordings
pub fn plan_finalizer(
    config: &DualPovConfig,
    sinks: Vec<Arc<dyn PersistenceSink>>,
) -> Arc<AssetFinalizer> {
    finalizer_with(config, Arc::new(PlanExporter), sinks)
}

fn catalog_for(config: &DualPovConfig) -> Arc<AssetCatalog> {
    Arc::new(AssetCatalog::new([config.recording.file_extension.clone()]))
}

/// Pipeline dependencies for a granted, fully equipped simulated device
pub fn simulated_deps(backend: Arc<dyn CaptureBackend>, store: Option<Arc<VideoStore>>) -> PipelineDeps {
    PipelineDeps {
        authorization: Arc::new(SimulatedAuthorization::granting()),
        devices: Arc::new(SimulatedDevices::dual()),
        backend,
        loader: Arc::new(AssetCatalog::new(["mp4", "mov"])),
        exporter: Arc::new(PlanExporter),
        store,
        extra_sinks: Vec::new(),
    }
}

/// Simulated devices recording real MP4 files from synthetic frames, with
/// the movie exporter and a tone on the shared microphone when the `audio`
/// feature is on
#[cfg(feature = "recording")]
pub fn encoded_deps(
    settings: crate::recording::EncoderSettings,
    store: Option<Arc<VideoStore>>,
) -> PipelineDeps {
    use crate::recording::{EncodedBackend, MovieExporter, Mp4AssetLoader};

    let backend = EncodedBackend::synthetic(settings.clone());
    #[cfg(feature = "audio")]
    let backend = backend.with_audio(crate::audio::AudioSourceKind::Synthetic);

    PipelineDeps {
        authorization: Arc::new(SimulatedAuthorization::granting()),
        devices: Arc::new(SimulatedDevices::dual()),
        backend: Arc::new(backend),
        loader: Arc::new(Mp4AssetLoader::new()),
        exporter: Arc::new(MovieExporter::new(settings)),
        store,
        extra_sinks: Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::composition::{plan_composition, Layout, MediaAsset};
    use crate::session::FinishedRecording;
    use crate::types::Size;
    use std::time::Duration;

    fn request(destination: PathBuf) -> ExportRequest {
        let asset = |path: &str, secs: u64| {
            MediaAsset::from_recording(&FinishedRecording {
                path: PathBuf::from(path),
                duration: Duration::from_secs(secs),
                video_size: Size::new(720.0, 1280.0),
                has_audio: true,
                poster: None,
            })
        };
        ExportRequest {
            plan: plan_composition(&asset("/w/f.mp4", 4), &asset("/w/b.mp4", 5), &Layout::Stacked).unwrap(),
            destination,
            preset: ExportPreset::HighestQuality,
        }
    }

    #[test]
    fn test_plan_document_written() {
        let dir = tempfile::tempdir().unwrap();
        let destination = dir.path().join("out").join("composed.json");
        PlanExporter.export(&request(destination.clone())).unwrap();

        let value: serde_json::Value = serde_json::from_slice(&fs::read(&destination).unwrap()).unwrap();
        assert_eq!(value["format"], "dualpov-plan");
        assert_eq!(value["duration_secs"], 4.0);
        assert_eq!(value["plan"]["tracks"].as_array().unwrap().len(), 3);
    }

    #[test]
    fn test_unwritable_destination_is_export_error() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("file");
        fs::write(&blocker, b"x").unwrap();
        assert!(matches!(
            PlanExporter.export(&request(blocker.join("composed.json"))),
            Err(CompositionError::Export(_))
        ));
    }
}
