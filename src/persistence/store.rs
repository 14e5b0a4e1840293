//! Local video store: copied files, JPEG thumbnails and a JSON index

use super::PersistenceSink;
use crate::errors::PersistenceError;
use crate::finalize::{AssetSource, FinalAsset};
use crate::types::RgbFrame;
use chrono::{DateTime, Utc};
use image::codecs::jpeg::JpegEncoder;
use image::imageops::{self, FilterType};
use image::RgbImage;
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use uuid::Uuid;

const INDEX_FILE: &str = "index.json";
const THUMBNAIL_QUALITY: u8 = 85;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VideoEntry {
    pub id: Uuid,
    /// File name inside the store directory
    pub file: String,
    pub thumbnail: Option<String>,
    pub duration_secs: f64,
    pub created_at: DateTime<Utc>,
    pub source: AssetSource,
}

/// Append-only store, newest entry first
pub struct VideoStore {
    root: PathBuf,
    thumbnail_width: u32,
    entries: Mutex<Vec<VideoEntry>>,
}

impl VideoStore {
    /// Open (or create) the store at `root`
    pub fn open(root: impl Into<PathBuf>, thumbnail_width: u32) -> Result<Self, PersistenceError> {
        let root = root.into();
        fs::create_dir_all(&root).map_err(|e| PersistenceError::io(&root, e))?;

        let index = root.join(INDEX_FILE);
        let entries = if index.exists() {
            let bytes = fs::read(&index).map_err(|e| PersistenceError::io(&index, e))?;
            serde_json::from_slice::<Vec<VideoEntry>>(&bytes)
                .map_err(|e| PersistenceError::CorruptIndex(e.to_string()))?
        } else {
            Vec::new()
        };

        log::info!("Opened video store at {:?} ({} entries)", root, entries.len());
        Ok(Self {
            root,
            thumbnail_width,
            entries: Mutex::new(entries),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn lock(&self) -> MutexGuard<'_, Vec<VideoEntry>> {
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn list(&self) -> Vec<VideoEntry> {
        self.lock().clone()
    }

    pub fn get(&self, id: Uuid) -> Option<VideoEntry> {
        self.lock().iter().find(|e| e.id == id).cloned()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn file_path(&self, entry: &VideoEntry) -> PathBuf {
        self.root.join(&entry.file)
    }

    /// Copy `asset` into the store and prepend its entry to the index
    pub fn add(&self, asset: &FinalAsset) -> Result<VideoEntry, PersistenceError> {
        let id = Uuid::new_v4();
        let extension = asset
            .path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("mp4");
        let file = format!("{}.{}", id, extension);
        let destination = self.root.join(&file);
        fs::copy(&asset.path, &destination).map_err(|e| PersistenceError::io(&asset.path, e))?;

        let thumbnail = match &asset.poster {
            Some(poster) => {
                let name = format!("{}.jpg", id);
                match write_thumbnail(poster, self.thumbnail_width, &self.root.join(&name)) {
                    Ok(()) => Some(name),
                    Err(e) => {
                        log::warn!("Storing {} without thumbnail: {}", id, e);
                        None
                    }
                }
            }
            None => None,
        };

        let entry = VideoEntry {
            id,
            file,
            thumbnail,
            duration_secs: asset.duration.as_secs_f64(),
            created_at: Utc::now(),
            source: asset.source,
        };

        let mut entries = self.lock();
        entries.insert(0, entry.clone());
        if let Err(e) = self.write_index(&entries) {
            entries.remove(0);
            let _ = fs::remove_file(&destination);
            return Err(e);
        }

        log::info!(
            "Stored video {} ({:.1}s) in {:?}",
            entry.id,
            entry.duration_secs,
            self.root
        );
        Ok(entry)
    }

    fn write_index(&self, entries: &[VideoEntry]) -> Result<(), PersistenceError> {
        let index = self.root.join(INDEX_FILE);
        let staging = self.root.join(format!("{}.tmp", INDEX_FILE));
        let json = serde_json::to_vec_pretty(entries)
            .map_err(|e| PersistenceError::CorruptIndex(e.to_string()))?;
        fs::write(&staging, json).map_err(|e| PersistenceError::io(&staging, e))?;
        fs::rename(&staging, &index).map_err(|e| PersistenceError::io(&index, e))
    }
}

impl PersistenceSink for VideoStore {
    fn name(&self) -> &str {
        "video store"
    }

    fn persist(&self, asset: &FinalAsset) -> Result<(), PersistenceError> {
        self.add(asset).map(|_| ())
    }
}

/// Encode `poster` as a JPEG no wider than `max_width`
fn write_thumbnail(poster: &RgbFrame, max_width: u32, path: &Path) -> Result<(), PersistenceError> {
    let img = RgbImage::from_raw(poster.width, poster.height, poster.rgb.clone())
        .ok_or_else(|| PersistenceError::Thumbnail("poster frame size mismatch".to_string()))?;

    let img = if img.width() > max_width {
        let height = ((img.height() as u64 * max_width as u64) / img.width() as u64).max(1) as u32;
        imageops::resize(&img, max_width, height, FilterType::Triangle)
    } else {
        img
    };

    let file = File::create(path).map_err(|e| PersistenceError::io(path, e))?;
    let encoder = JpegEncoder::new_with_quality(BufWriter::new(file), THUMBNAIL_QUALITY);
    image::DynamicImage::ImageRgb8(img)
        .write_with_encoder(encoder)
        .map_err(|e| PersistenceError::Thumbnail(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::CameraPosition;
    use std::time::Duration;

    fn asset(dir: &Path, name: &str, poster: Option<RgbFrame>) -> FinalAsset {
        let path = dir.join(name);
        fs::write(&path, b"composed movie").unwrap();
        FinalAsset {
            path,
            duration: Duration::from_millis(10_500),
            source: AssetSource::Composed,
            poster,
        }
    }

    fn poster(width: u32, height: u32) -> RgbFrame {
        RgbFrame {
            width,
            height,
            rgb: vec![128; (width * height * 3) as usize],
        }
    }

    #[test]
    fn test_add_is_newest_first() {
        let work = tempfile::tempdir().unwrap();
        let root = tempfile::tempdir().unwrap();
        let store = VideoStore::open(root.path(), 320).unwrap();

        let first = store.add(&asset(work.path(), "a.mp4", None)).unwrap();
        let second = store.add(&asset(work.path(), "b.mp4", None)).unwrap();

        let listed = store.list();
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0].id, second.id);
        assert_eq!(listed[1].id, first.id);
        assert!(store.file_path(&first).exists());
        assert_eq!(first.duration_secs, 10.5);
    }

    #[test]
    fn test_index_survives_reopen() {
        let work = tempfile::tempdir().unwrap();
        let root = tempfile::tempdir().unwrap();
        let id = {
            let store = VideoStore::open(root.path(), 320).unwrap();
            store.add(&asset(work.path(), "a.mp4", None)).unwrap().id
        };

        let reopened = VideoStore::open(root.path(), 320).unwrap();
        assert_eq!(reopened.len(), 1);
        assert!(reopened.get(id).is_some());
    }

    #[test]
    fn test_thumbnail_is_scaled_down() {
        let work = tempfile::tempdir().unwrap();
        let root = tempfile::tempdir().unwrap();
        let store = VideoStore::open(root.path(), 320).unwrap();

        let entry = store
            .add(&asset(work.path(), "a.mp4", Some(poster(640, 360))))
            .unwrap();
        let thumb = root.path().join(entry.thumbnail.unwrap());
        let img = image::open(thumb).unwrap();
        assert_eq!((img.width(), img.height()), (320, 180));
    }

    #[test]
    fn test_bad_poster_still_stores_video() {
        let work = tempfile::tempdir().unwrap();
        let root = tempfile::tempdir().unwrap();
        let store = VideoStore::open(root.path(), 320).unwrap();

        let broken = RgbFrame {
            width: 10,
            height: 10,
            rgb: vec![0; 3],
        };
        let entry = store.add(&asset(work.path(), "a.mp4", Some(broken))).unwrap();
        assert!(entry.thumbnail.is_none());
    }

    #[test]
    fn test_corrupt_index_is_reported() {
        let root = tempfile::tempdir().unwrap();
        fs::write(root.path().join(INDEX_FILE), b"{ not json").unwrap();
        assert!(matches!(
            VideoStore::open(root.path(), 320),
            Err(PersistenceError::CorruptIndex(_))
        ));
    }

    #[test]
    fn test_missing_source_file_fails() {
        let root = tempfile::tempdir().unwrap();
        let store = VideoStore::open(root.path(), 320).unwrap();
        let missing = FinalAsset {
            path: root.path().join("nowhere.mp4"),
            duration: Duration::from_secs(1),
            source: AssetSource::SingleCamera(CameraPosition::Back),
            poster: None,
        };
        assert!(matches!(store.add(&missing), Err(PersistenceError::Io { .. })));
        assert!(store.is_empty());
    }
}
