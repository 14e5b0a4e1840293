//! DualPOV: simultaneous front/back camera recording for Tauri applications
//!
//! This crate captures both cameras of a device on one hardware session,
//! records each to its own movie file, composes the pair into a single
//! picture-in-picture (or split) video and persists the result.
//!
//! # Features
//! - Permission gating and device discovery
//! - Transactional capture session configuration
//! - Time-bounded dual recording with progress and error signals
//! - Composition with single-camera fallback
//! - Local video store with thumbnails, optional photo library copy
//! - `recording` feature: H.264/MP4 encoding of the per-camera files and the
//!   composed movie
//! - `audio` feature: microphone capture muxed as Opus into both files
//!
//! # Usage
//! ```rust,ignore
//! use std::sync::Arc;
//!
//! fn main() {
//!     tauri::Builder::default()
//!         .setup(|app| {
//!             let pipeline = tauri::async_runtime::block_on(async {
//!                 let config = dualpov::config::DualPovConfig::load_or_default();
//!                 let encoder = dualpov::recording::EncoderSettings::default();
//!                 let deps = dualpov::platform::system_deps(&config, encoder)?;
//!                 Ok::<_, dualpov::errors::PipelineError>(Arc::new(
//!                     dualpov::DualCameraPipeline::new(config, deps),
//!                 ))
//!             })?;
//!             app.handle().plugin(dualpov::init(pipeline))?;
//!             Ok(())
//!         })
//!         .run(tauri::generate_context!())
//!         .expect("error while running tauri application");
//! }
//! ```
pub mod commands;
pub mod composition;
pub mod config;
pub mod coordinator;
pub mod discovery;
pub mod errors;
pub mod finalize;
pub mod permissions;
pub mod persistence;
pub mod pipeline;
pub mod platform;
pub mod session;
pub mod types;

#[cfg(feature = "audio")]
pub mod audio;

#[cfg(feature = "recording")]
pub mod recording;

// Testing utilities - simulated hardware for offline testing
pub mod testing;

// Re-exports for convenience
pub use coordinator::{RecordingCoordinator, RecordingState};
pub use errors::{
    BackendError, CompositionError, ConfigError, PersistenceError, PipelineError, RecordingError,
    SetupError,
};
pub use pipeline::{DualCameraPipeline, PipelineDeps, PipelineStatus, RecordingPreset};
pub use types::{AudioDevice, CameraPosition, CaptureDevice, DeviceSet, Platform};

use std::sync::Arc;
use tauri::{
    plugin::{Builder, TauriPlugin},
    Emitter, Manager, Runtime,
};

/// Event carrying every [`RecordingState`] change
pub const RECORDING_STATE_EVENT: &str = "dualpov://recording-state";
/// Event carrying every authorization change
pub const AUTHORIZATION_EVENT: &str = "dualpov://authorization";
/// Event carrying every capture session state change
pub const SESSION_STATE_EVENT: &str = "dualpov://session-state";

/// Initialize the DualPOV plugin around an already constructed pipeline
pub fn init<R: Runtime>(pipeline: Arc<DualCameraPipeline>) -> TauriPlugin<R> {
    Builder::new("dualpov")
        .invoke_handler(tauri::generate_handler![
            // Permission commands
            commands::permissions::request_capture_authorization,
            commands::permissions::get_authorization_state,
            commands::permissions::check_permission_status,
            // Recording commands
            commands::recording::prepare_capture,
            commands::recording::start_dual_recording,
            commands::recording::stop_dual_recording,
            commands::recording::set_recording_preset,
            commands::recording::get_recording_state,
            commands::recording::get_pipeline_status,
            // Library commands
            commands::library::list_videos,
            commands::library::get_video_path,
            // Configuration commands
            commands::config::get_config,
            commands::config::save_config,
        ])
        .setup(move |app, _api| {
            forward_signals(app.clone(), &pipeline);
            app.manage(pipeline);
            Ok(())
        })
        .build()
}

/// Push pipeline signals to the webview as events
fn forward_signals<R: Runtime>(app: tauri::AppHandle<R>, pipeline: &DualCameraPipeline) {
    let signals = pipeline.signals();

    let mut recording = signals.recording;
    let handle = app.clone();
    tauri::async_runtime::spawn(async move {
        while recording.changed().await.is_ok() {
            let state = recording.borrow_and_update().clone();
            if let Err(e) = handle.emit(RECORDING_STATE_EVENT, state) {
                log::warn!("Failed to emit recording state: {}", e);
            }
        }
    });

    let mut authorization = signals.authorization;
    let handle = app.clone();
    tauri::async_runtime::spawn(async move {
        while authorization.changed().await.is_ok() {
            let state = *authorization.borrow_and_update();
            if let Err(e) = handle.emit(AUTHORIZATION_EVENT, state) {
                log::warn!("Failed to emit authorization state: {}", e);
            }
        }
    });

    let mut session = signals.session;
    tauri::async_runtime::spawn(async move {
        while session.changed().await.is_ok() {
            let state = *session.borrow_and_update();
            if let Err(e) = app.emit(SESSION_STATE_EVENT, state) {
                log::warn!("Failed to emit session state: {}", e);
            }
        }
    });
}

/// Detect the current platform
pub fn current_platform() -> Platform {
    Platform::current()
}

/// Initialize logging for the pipeline
pub fn init_logging() {
    if std::env::var("RUST_LOG").is_err() {
        std::env::set_var("RUST_LOG", "dualpov=info");
    }
    let _ = env_logger::try_init();
}

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const NAME: &str = env!("CARGO_PKG_NAME");
pub const DESCRIPTION: &str = env!("CARGO_PKG_DESCRIPTION");

/// Get crate information
pub fn get_info() -> CrateInfo {
    CrateInfo {
        name: NAME.to_string(),
        version: VERSION.to_string(),
        description: DESCRIPTION.to_string(),
        platform: Platform::current(),
        encoding: cfg!(feature = "recording"),
    }
}

/// Crate information structure
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct CrateInfo {
    pub name: String,
    pub version: String,
    pub description: String,
    pub platform: Platform,
    /// Built with the `recording` feature
    pub encoding: bool,
}
