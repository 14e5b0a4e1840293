pub mod config;
pub mod library;
pub mod permissions;
pub mod recording;

pub use config::*;
pub use library::*;
pub use permissions::*;
pub use recording::*;

use crate::pipeline::DualCameraPipeline;
use std::sync::Arc;

/// Pipeline handle held in Tauri managed state
pub type PipelineState<'a> = tauri::State<'a, Arc<DualCameraPipeline>>;
