//! Destinations for finished assets
//!
//! A sink receives the final file after composition (or single-camera
//! fallback). Sink failures are reported but never remove the asset.

mod library;
mod store;

pub use library::PhotoLibrarySink;
pub use store::{VideoEntry, VideoStore};

use crate::errors::PersistenceError;
use crate::finalize::FinalAsset;

pub trait PersistenceSink: Send + Sync {
    fn name(&self) -> &str;

    fn persist(&self, asset: &FinalAsset) -> Result<(), PersistenceError>;
}
