//! Dual-camera composition
//!
//! Loads the two per-camera recordings, aligns them on a common time range
//! and exports one file with the front camera laid over the back camera.

mod asset;
mod export;
mod layout;
mod plan;
mod poster;

pub use asset::{AssetCatalog, AssetLoader, AssetTrack, MediaAsset, TrackKind};
pub use export::{AssetExporter, ExportPreset, ExportRequest};
pub use layout::{AffineTransform, Layout, LayoutKind, OverlayCorner};
pub use plan::{
    plan_composition, CompositionPlan, CompositionTrack, LayerInstruction, RenderInstruction,
    TimeRange, TrackSlot,
};
pub use poster::compose_poster;

use crate::config::CompositionConfig;
use crate::errors::CompositionError;
use crate::types::RgbFrame;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

/// Result of a successful composition
#[derive(Debug, Clone)]
pub struct ComposedAsset {
    pub path: PathBuf,
    pub duration: Duration,
    pub plan: CompositionPlan,
}

pub struct CompositionEngine {
    loader: Arc<dyn AssetLoader>,
    exporter: Arc<dyn AssetExporter>,
    layout: Layout,
    preset: ExportPreset,
    output_dir: PathBuf,
}

impl CompositionEngine {
    pub fn new(
        loader: Arc<dyn AssetLoader>,
        exporter: Arc<dyn AssetExporter>,
        config: &CompositionConfig,
        output_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            loader,
            exporter,
            layout: Layout::from_config(config),
            preset: config.preset,
            output_dir: output_dir.into(),
        }
    }

    pub fn layout(&self) -> &Layout {
        &self.layout
    }

    pub fn loader(&self) -> &Arc<dyn AssetLoader> {
        &self.loader
    }

    /// Compose the front and back recordings into one file.
    ///
    /// Loading, planning and export run on a blocking worker.
    pub async fn compose(
        &self,
        front: &Path,
        back: &Path,
    ) -> Result<ComposedAsset, CompositionError> {
        let loader = self.loader.clone();
        let exporter = self.exporter.clone();
        let layout = self.layout;
        let preset = self.preset;
        let destination = self.output_dir.join(format!(
            "dualpov-{}.{}",
            uuid::Uuid::new_v4(),
            exporter.file_extension()
        ));
        let (front, back) = (front.to_path_buf(), back.to_path_buf());

        tokio::task::spawn_blocking(move || -> Result<ComposedAsset, CompositionError> {
            let front_asset = loader.load(&front)?;
            let back_asset = loader.load(&back)?;
            let plan = plan_composition(&front_asset, &back_asset, &layout)?;

            log::info!(
                "Composing {} + {} over {:.2}s",
                front.display(),
                back.display(),
                plan.duration.as_secs_f64()
            );

            let request = ExportRequest {
                plan,
                destination,
                preset,
            };
            exporter.export(&request)?;

            Ok(ComposedAsset {
                path: request.destination,
                duration: request.plan.duration,
                plan: request.plan,
            })
        })
        .await
        .map_err(|e| CompositionError::Export(format!("composition worker failed: {}", e)))?
    }

    /// Poster of the composed output, built from both camera posters
    pub fn poster_for(
        &self,
        plan: &CompositionPlan,
        front_size: crate::types::Size,
        back: &RgbFrame,
        front: &RgbFrame,
    ) -> Option<RgbFrame> {
        let layer = plan.render.layers.iter().find(|l| l.slot == TrackSlot::B)?;
        compose_poster(back, front, plan.render.canvas, front_size, &layer.transform)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DualPovConfig;
    use crate::session::FinishedRecording;
    use crate::types::Size;

    fn recording(dir: &Path, name: &str, secs: f64) -> FinishedRecording {
        let path = dir.join(name);
        std::fs::write(&path, b"movie").unwrap();
        FinishedRecording {
            path,
            duration: Duration::from_secs_f64(secs),
            video_size: Size::new(1080.0, 1920.0),
            has_audio: true,
            poster: None,
        }
    }

    fn engine(catalog: Arc<AssetCatalog>, dir: &Path) -> CompositionEngine {
        CompositionEngine::new(
            catalog,
            Arc::new(crate::testing::PlanExporter),
            &DualPovConfig::default().composition,
            dir,
        )
    }

    #[tokio::test]
    async fn test_compose_uses_shorter_duration() {
        let dir = tempfile::tempdir().unwrap();
        let catalog = Arc::new(AssetCatalog::new(["mp4"]));
        let front = recording(dir.path(), "front.mp4", 10.0);
        let back = recording(dir.path(), "back.mp4", 10.3);
        catalog.register(&front);
        catalog.register(&back);

        let composed = engine(catalog, dir.path())
            .compose(&front.path, &back.path)
            .await
            .unwrap();

        assert_eq!(composed.duration, Duration::from_secs(10));
        assert!(composed.path.exists());
        assert!(composed
            .path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap()
            .starts_with("dualpov-"));
    }

    #[tokio::test]
    async fn test_compose_unknown_format() {
        let dir = tempfile::tempdir().unwrap();
        let catalog = Arc::new(AssetCatalog::new(["mp4"]));
        let err = engine(catalog, dir.path())
            .compose(Path::new("/w/front.avi"), Path::new("/w/back.mp4"))
            .await
            .unwrap_err();
        assert!(matches!(err, CompositionError::UnknownAssetFormat(_)));
    }

    #[tokio::test]
    async fn test_compose_missing_back_recording() {
        let dir = tempfile::tempdir().unwrap();
        let catalog = Arc::new(AssetCatalog::new(["mp4"]));
        let front = recording(dir.path(), "front.mp4", 3.0);
        catalog.register(&front);

        let err = engine(catalog, dir.path())
            .compose(&front.path, &dir.path().join("back.mp4"))
            .await
            .unwrap_err();
        assert!(matches!(err, CompositionError::TrackExtraction { .. }));
    }
}
