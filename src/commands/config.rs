use super::PipelineState;
use crate::config::DualPovConfig;
use tauri::command;

/// Effective configuration the pipeline was built with
#[command]
pub async fn get_config(pipeline: PipelineState<'_>) -> Result<DualPovConfig, String> {
    Ok(pipeline.config().clone())
}

/// Validate and save a configuration; applies on next launch
#[command]
pub async fn save_config(new_config: DualPovConfig) -> Result<(), String> {
    new_config.validate().map_err(|e| e.to_string())?;
    new_config
        .save_to_file(DualPovConfig::default_path())
        .map_err(|e| e.to_string())
}
