use super::PipelineState;
use crate::persistence::VideoEntry;
use tauri::command;

/// Stored videos, newest first
#[command]
pub async fn list_videos(pipeline: PipelineState<'_>) -> Result<Vec<VideoEntry>, String> {
    Ok(pipeline.library())
}

/// Absolute path of a stored video, for the asset protocol
#[command]
pub async fn get_video_path(pipeline: PipelineState<'_>, id: String) -> Result<String, String> {
    let id = uuid::Uuid::parse_str(&id).map_err(|e| format!("Invalid video id: {}", e))?;
    let store = pipeline
        .store()
        .ok_or_else(|| "Video store is not enabled".to_string())?;
    let entry = store
        .get(id)
        .ok_or_else(|| format!("No stored video with id {}", id))?;
    Ok(store.file_path(&entry).to_string_lossy().to_string())
}
