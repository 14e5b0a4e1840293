use super::PersistenceSink;
use crate::errors::PersistenceError;
use crate::finalize::FinalAsset;
use std::fs;
use std::path::PathBuf;

/// Copies final assets into a user-visible photo library directory
pub struct PhotoLibrarySink {
    directory: PathBuf,
}

impl PhotoLibrarySink {
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        Self {
            directory: directory.into(),
        }
    }

    fn destination_for(&self, asset: &FinalAsset) -> PathBuf {
        let extension = asset
            .path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("mp4");
        let stamp = chrono::Local::now().format("%Y%m%d_%H%M%S");
        let suffix = &uuid::Uuid::new_v4().simple().to_string()[..8];
        self.directory
            .join(format!("DualPOV_{}_{}.{}", stamp, suffix, extension))
    }
}

impl PersistenceSink for PhotoLibrarySink {
    fn name(&self) -> &str {
        "photo library"
    }

    fn persist(&self, asset: &FinalAsset) -> Result<(), PersistenceError> {
        fs::create_dir_all(&self.directory)
            .map_err(|e| PersistenceError::io(&self.directory, e))?;
        let destination = self.destination_for(asset);
        fs::copy(&asset.path, &destination).map_err(|e| PersistenceError::io(&asset.path, e))?;
        log::info!("Saved {:?} to photo library", destination);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::finalize::AssetSource;
    use std::time::Duration;

    #[test]
    fn test_copy_into_library() {
        let work = tempfile::tempdir().unwrap();
        let library = tempfile::tempdir().unwrap();
        let path = work.path().join("final.mp4");
        fs::write(&path, b"movie").unwrap();

        let sink = PhotoLibrarySink::new(library.path().join("Movies"));
        let asset = FinalAsset {
            path: path.clone(),
            duration: Duration::from_secs(2),
            source: AssetSource::Composed,
            poster: None,
        };
        sink.persist(&asset).unwrap();

        let copied: Vec<_> = fs::read_dir(library.path().join("Movies"))
            .unwrap()
            .collect();
        assert_eq!(copied.len(), 1);
        assert!(path.exists());
    }
}
