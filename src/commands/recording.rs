//! Tauri commands for dual-camera recording
//!
//! All commands act on the managed [`DualCameraPipeline`](crate::pipeline::DualCameraPipeline);
//! progress and errors are also pushed as events, see [`crate::init`].

use super::PipelineState;
use crate::coordinator::RecordingState;
use crate::pipeline::{PipelineStatus, RecordingPreset};
use crate::types::DeviceSet;
use tauri::command;

/// Authorize, discover devices and start the capture session
#[command]
pub async fn prepare_capture(pipeline: PipelineState<'_>) -> Result<DeviceSet, String> {
    pipeline.prepare().await.map_err(|e| e.to_string())
}

/// Start a recording for the current preset's duration
#[command]
pub async fn start_dual_recording(pipeline: PipelineState<'_>) -> Result<(), String> {
    log::info!("Starting dual recording ({})", pipeline.preset().as_str());
    pipeline.start_recording().await.map_err(|e| e.to_string())
}

/// Stop early; finalization continues in the background
#[command]
pub async fn stop_dual_recording(pipeline: PipelineState<'_>) -> Result<(), String> {
    pipeline.stop_recording().await.map_err(|e| e.to_string())
}

/// Select the short or long recording preset
#[command]
pub async fn set_recording_preset(
    pipeline: PipelineState<'_>,
    preset: String,
) -> Result<PipelineStatus, String> {
    let preset: RecordingPreset = preset.parse()?;
    pipeline.set_preset(preset);
    Ok(pipeline.status())
}

#[command]
pub async fn get_recording_state(pipeline: PipelineState<'_>) -> Result<RecordingState, String> {
    Ok(pipeline.status().recording)
}

#[command]
pub async fn get_pipeline_status(pipeline: PipelineState<'_>) -> Result<PipelineStatus, String> {
    Ok(pipeline.status())
}
