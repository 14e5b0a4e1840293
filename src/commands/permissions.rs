use super::PipelineState;
use crate::permissions::{
    check_permission_detailed, AuthorizationOutcome, AuthorizationState, MediaKind, PermissionInfo,
};
use tauri::command;

/// Prompt for camera and microphone access where the platform allows it
#[command]
pub async fn request_capture_authorization(
    pipeline: PipelineState<'_>,
) -> Result<AuthorizationOutcome, String> {
    log::info!("Requesting capture authorization");
    let outcome = pipeline.request_authorization().await;
    if !outcome.all_granted() {
        log::warn!(
            "Capture authorization incomplete (camera: {}, microphone: {})",
            outcome.camera_granted,
            outcome.microphone_granted
        );
    }
    Ok(outcome)
}

/// Current authorization signal
#[command]
pub async fn get_authorization_state(
    pipeline: PipelineState<'_>,
) -> Result<AuthorizationState, String> {
    Ok(pipeline.status().authorization)
}

/// Detailed OS permission status for one media kind ("video" or "audio")
#[command]
pub async fn check_permission_status(kind: String) -> Result<PermissionInfo, String> {
    let kind = parse_media_kind(&kind)?;
    Ok(check_permission_detailed(kind))
}

fn parse_media_kind(kind: &str) -> Result<MediaKind, String> {
    match kind.to_ascii_lowercase().as_str() {
        "video" | "camera" => Ok(MediaKind::Video),
        "audio" | "microphone" => Ok(MediaKind::Audio),
        other => Err(format!("Unknown media kind: {}", other)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_media_kind() {
        assert_eq!(parse_media_kind("camera").unwrap(), MediaKind::Video);
        assert_eq!(parse_media_kind("Audio").unwrap(), MediaKind::Audio);
        assert!(parse_media_kind("lidar").is_err());
    }
}
