//! Export of a composition plan to a single output file

use super::plan::CompositionPlan;
use crate::errors::CompositionError;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Export quality preset
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExportPreset {
    HighestQuality,
    Balanced,
    Passthrough,
}

impl ExportPreset {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExportPreset::HighestQuality => "highest_quality",
            ExportPreset::Balanced => "balanced",
            ExportPreset::Passthrough => "passthrough",
        }
    }

    /// Target bitrate hint in kbps, `None` keeps source bitrate
    pub fn bitrate_kbps(&self) -> Option<u32> {
        match self {
            ExportPreset::HighestQuality => Some(12_000),
            ExportPreset::Balanced => Some(6_000),
            ExportPreset::Passthrough => None,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ExportRequest {
    pub plan: CompositionPlan,
    pub destination: PathBuf,
    pub preset: ExportPreset,
}

/// Renders a composition plan into one file at `request.destination`
pub trait AssetExporter: Send + Sync {
    fn export(&self, request: &ExportRequest) -> Result<(), CompositionError>;

    /// Extension of the files this exporter produces
    fn file_extension(&self) -> &str;
}
