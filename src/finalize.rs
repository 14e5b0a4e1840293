//! Turning finished per-camera recordings into one persisted asset

use crate::composition::CompositionEngine;
use crate::persistence::PersistenceSink;
use crate::session::FinishedRecording;
use crate::types::{CameraPosition, RgbFrame};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

/// What the outputs produced once both completions arrived
#[derive(Debug, Clone)]
pub enum RecordingOutcome {
    Dual {
        front: FinishedRecording,
        back: FinishedRecording,
    },
    Single {
        position: CameraPosition,
        recording: FinishedRecording,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssetSource {
    Composed,
    SingleCamera(CameraPosition),
}

/// The file handed to persistence sinks and the UI
#[derive(Debug, Clone)]
pub struct FinalAsset {
    pub path: PathBuf,
    pub duration: Duration,
    pub source: AssetSource,
    pub poster: Option<RgbFrame>,
}

impl FinalAsset {
    fn single(position: CameraPosition, recording: FinishedRecording) -> Self {
        Self {
            path: recording.path,
            duration: recording.duration,
            source: AssetSource::SingleCamera(position),
            poster: recording.poster,
        }
    }
}

#[derive(Debug, Clone)]
pub struct FinalizeReport {
    pub asset: FinalAsset,
    /// Composition fallback and sink failures, in the order they happened
    pub warnings: Vec<String>,
}

pub struct AssetFinalizer {
    engine: CompositionEngine,
    sinks: Vec<Arc<dyn PersistenceSink>>,
}

impl AssetFinalizer {
    pub fn new(engine: CompositionEngine, sinks: Vec<Arc<dyn PersistenceSink>>) -> Self {
        Self { engine, sinks }
    }

    /// Compose (or pick) the final asset and hand it to every sink. Once a
    /// composed asset has been through the sinks, the per-camera files it
    /// was made from are deleted.
    pub async fn finalize(&self, outcome: RecordingOutcome) -> FinalizeReport {
        let mut warnings = Vec::new();
        let mut sources = Vec::new();

        let asset = match outcome {
            RecordingOutcome::Dual { front, back } => {
                let (front_path, back_path) = (front.path.clone(), back.path.clone());
                let asset = self.compose(front, back, &mut warnings).await;
                if asset.source == AssetSource::Composed {
                    sources = vec![front_path, back_path];
                }
                asset
            }
            RecordingOutcome::Single {
                position,
                recording,
            } => {
                log::info!("Using {} camera recording as final asset", position);
                FinalAsset::single(position, recording)
            }
        };

        for sink in &self.sinks {
            let sink = sink.clone();
            let target = asset.clone();
            let name = sink.name().to_string();
            let result = tokio::task::spawn_blocking(move || sink.persist(&target)).await;
            match result {
                Ok(Ok(())) => log::debug!("Persisted {:?} to {}", asset.path, name),
                Ok(Err(e)) => {
                    log::error!("Failed to persist to {}: {}", name, e);
                    warnings.push(format!("{}: {}", name, e));
                }
                Err(e) => {
                    log::error!("Persistence worker for {} failed: {}", name, e);
                    warnings.push(format!("{}: worker failed", name));
                }
            }
        }

        for source in sources.iter().filter(|p| p.as_path() != asset.path) {
            remove_source(source).await;
        }

        FinalizeReport { asset, warnings }
    }

    async fn compose(
        &self,
        front: FinishedRecording,
        back: FinishedRecording,
        warnings: &mut Vec<String>,
    ) -> FinalAsset {
        let loader = self.engine.loader();
        loader.register(&front);
        loader.register(&back);

        let result = self.engine.compose(&front.path, &back.path).await;

        loader.forget(&front.path);
        loader.forget(&back.path);

        match result {
            Ok(composed) => {
                let poster = match (&front.poster, &back.poster) {
                    (Some(f), Some(b)) => self
                        .engine
                        .poster_for(&composed.plan, front.video_size, b, f)
                        .or_else(|| back.poster.clone()),
                    _ => back.poster.clone(),
                };
                log::info!(
                    "Composed dual recording {:?} ({:.2}s)",
                    composed.path,
                    composed.duration.as_secs_f64()
                );
                FinalAsset {
                    path: composed.path,
                    duration: composed.duration,
                    source: AssetSource::Composed,
                    poster,
                }
            }
            Err(e) => {
                log::error!("Composition failed, keeping back camera recording: {}", e);
                warnings.push(format!("composition failed ({}); saved back camera only", e));
                FinalAsset::single(CameraPosition::Back, back)
            }
        }
    }
}

/// Delete a per-camera file the composed asset replaced
async fn remove_source(path: &Path) {
    match tokio::fs::remove_file(path).await {
        Ok(()) => log::debug!("Removed source recording {:?}", path),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => log::warn!("Failed to remove source recording {:?}: {}", path, e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::composition::AssetCatalog;
    use crate::config::DualPovConfig;
    use crate::testing::{FailingExporter, PlanExporter, RecordingSink};
    use crate::types::Size;

    fn recording(dir: &Path, name: &str, secs: f64) -> FinishedRecording {
        let path = dir.join(name);
        std::fs::write(&path, b"movie").unwrap();
        FinishedRecording {
            path,
            duration: Duration::from_secs_f64(secs),
            video_size: Size::new(720.0, 1280.0),
            has_audio: true,
            poster: None,
        }
    }

    fn finalizer(
        dir: &Path,
        exporter: Arc<dyn crate::composition::AssetExporter>,
        sinks: Vec<Arc<dyn PersistenceSink>>,
    ) -> AssetFinalizer {
        let engine = CompositionEngine::new(
            Arc::new(AssetCatalog::new(["mp4"])),
            exporter,
            &DualPovConfig::default().composition,
            dir,
        );
        AssetFinalizer::new(engine, sinks)
    }

    #[tokio::test]
    async fn test_dual_outcome_is_composed_and_persisted() {
        let dir = tempfile::tempdir().unwrap();
        let sink = Arc::new(RecordingSink::new());
        let finalizer = finalizer(dir.path(), Arc::new(PlanExporter), vec![sink.clone()]);

        let report = finalizer
            .finalize(RecordingOutcome::Dual {
                front: recording(dir.path(), "f.mp4", 10.0),
                back: recording(dir.path(), "b.mp4", 10.3),
            })
            .await;

        assert_eq!(report.asset.source, AssetSource::Composed);
        assert_eq!(report.asset.duration, Duration::from_secs(10));
        assert!(report.warnings.is_empty());
        assert_eq!(sink.persisted(), vec![report.asset.path.clone()]);
    }

    #[tokio::test]
    async fn test_composed_asset_replaces_camera_files() {
        let dir = tempfile::tempdir().unwrap();
        let finalizer = finalizer(dir.path(), Arc::new(PlanExporter), vec![]);
        let front = recording(dir.path(), "f.mp4", 3.0);
        let back = recording(dir.path(), "b.mp4", 3.0);

        let report = finalizer
            .finalize(RecordingOutcome::Dual {
                front: front.clone(),
                back: back.clone(),
            })
            .await;

        assert_eq!(report.asset.source, AssetSource::Composed);
        assert!(report.asset.path.exists());
        assert!(!front.path.exists());
        assert!(!back.path.exists());
    }

    #[tokio::test]
    async fn test_failed_composition_falls_back_to_back_camera() {
        let dir = tempfile::tempdir().unwrap();
        let finalizer = finalizer(dir.path(), Arc::new(FailingExporter::default()), vec![]);
        let back = recording(dir.path(), "b.mp4", 4.0);

        let report = finalizer
            .finalize(RecordingOutcome::Dual {
                front: recording(dir.path(), "f.mp4", 4.0),
                back: back.clone(),
            })
            .await;

        assert_eq!(report.asset.path, back.path);
        assert_eq!(
            report.asset.source,
            AssetSource::SingleCamera(CameraPosition::Back)
        );
        assert_eq!(report.warnings.len(), 1);
        // Nothing is deleted when composition fails
        assert!(back.path.exists());
        assert!(dir.path().join("f.mp4").exists());
    }

    #[tokio::test]
    async fn test_sink_failure_keeps_asset() {
        let dir = tempfile::tempdir().unwrap();
        let sink = Arc::new(RecordingSink::failing("no space left on device"));
        let finalizer = finalizer(dir.path(), Arc::new(PlanExporter), vec![sink]);
        let front = recording(dir.path(), "f.mp4", 2.0);

        let report = finalizer
            .finalize(RecordingOutcome::Single {
                position: CameraPosition::Front,
                recording: front.clone(),
            })
            .await;

        assert_eq!(report.asset.path, front.path);
        assert!(front.path.exists());
        assert_eq!(report.warnings.len(), 1);
    }
}
