//! Configuration management for DualPOV
//!
//! Provides loading, saving and validation of capture, recording,
//! composition and storage settings. Files are TOML; `load_layered` also
//! honours `DUALPOV__<SECTION>__<KEY>` environment overrides.

use crate::composition::{ExportPreset, LayoutKind, OverlayCorner};
use crate::errors::ConfigError;
use crate::types::VideoOrientation;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Root configuration structure
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DualPovConfig {
    pub capture: CaptureConfig,
    pub recording: RecordingConfig,
    pub composition: CompositionConfig,
    pub storage: StorageConfig,
}

/// Device selection and connection settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaptureConfig {
    /// Explicit device id for the front camera (overrides name matching)
    pub front_device_id: Option<String>,
    /// Explicit device id for the back camera (overrides name matching)
    pub back_device_id: Option<String>,
    /// Explicit audio input device id
    pub audio_device_id: Option<String>,
    /// Orientation applied to both video connections
    pub orientation: VideoOrientation,
    /// Mirror the front camera so it matches what the user sees
    pub mirror_front: bool,
}

/// Recording time budget settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordingConfig {
    /// Duration of the short preset in seconds
    pub short_duration_secs: u64,
    /// Duration of the long preset in seconds
    pub long_duration_secs: u64,
    /// Progress tick cadence in milliseconds
    pub progress_interval_ms: u64,
    /// Container extension for the per-camera files
    pub file_extension: String,
}

/// Composition layout and export settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompositionConfig {
    pub layout: LayoutKind,
    /// Inset scale for picture-in-picture (fraction of canvas width)
    pub inset_scale: f64,
    /// Inset margin in pixels
    pub inset_margin: f64,
    pub inset_corner: OverlayCorner,
    pub preset: ExportPreset,
}

/// Storage locations
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Private working directory for in-flight recordings and compositions
    pub working_directory: PathBuf,
    /// Local video store directory
    pub store_directory: PathBuf,
    /// Photo library directory; `None` disables the library sink
    pub library_directory: Option<PathBuf>,
    /// Maximum thumbnail width in pixels
    pub thumbnail_width: u32,
}

impl Default for DualPovConfig {
    fn default() -> Self {
        let data_root = default_data_root();
        Self {
            capture: CaptureConfig {
                front_device_id: None,
                back_device_id: None,
                audio_device_id: None,
                orientation: VideoOrientation::Portrait,
                mirror_front: true,
            },
            recording: RecordingConfig {
                short_duration_secs: 15,
                long_duration_secs: 30,
                progress_interval_ms: 100,
                file_extension: "mp4".to_string(),
            },
            composition: CompositionConfig {
                layout: LayoutKind::PictureInPicture,
                inset_scale: 0.25,
                inset_margin: 16.0,
                inset_corner: OverlayCorner::TopRight,
                preset: ExportPreset::HighestQuality,
            },
            storage: StorageConfig {
                working_directory: data_root.join("work"),
                store_directory: data_root.join("library"),
                library_directory: None,
                thumbnail_width: 320,
            },
        }
    }
}

/// App-private data root. Never the OS shared temp directory.
fn default_data_root() -> PathBuf {
    directories::ProjectDirs::from("app", "DualPov", "dualpov")
        .map(|dirs| dirs.data_local_dir().to_path_buf())
        .unwrap_or_else(|| PathBuf::from(".dualpov"))
}

/// Canonical form of `path`, resolved through its nearest existing ancestor
/// so directories that are not created yet still compare correctly
fn resolve_path(path: &Path) -> PathBuf {
    let absolute = match std::env::current_dir() {
        Ok(cwd) if path.is_relative() => cwd.join(path),
        _ => path.to_path_buf(),
    };

    let mut existing = absolute.as_path();
    let mut missing = Vec::new();
    loop {
        if let Ok(canonical) = existing.canonicalize() {
            return missing.iter().rev().fold(canonical, |acc, part| acc.join(part));
        }
        match (existing.parent(), existing.file_name()) {
            (Some(parent), Some(name)) => {
                missing.push(name.to_os_string());
                existing = parent;
            }
            _ => return absolute,
        }
    }
}

impl RecordingConfig {
    pub fn progress_interval(&self) -> Duration {
        Duration::from_millis(self.progress_interval_ms)
    }
}

impl DualPovConfig {
    /// Load configuration from TOML file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();

        if !path.exists() {
            log::info!("Config file not found at {:?}, using defaults", path);
            return Ok(Self::default());
        }

        let contents = fs::read_to_string(path)?;
        let config: DualPovConfig = toml::from_str(&contents)?;
        config.validate()?;

        log::info!("Loaded configuration from {:?}", path);
        Ok(config)
    }

    /// Load the TOML file (optional) and apply environment overrides on top
    pub fn load_layered<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let defaults = toml::to_string(&Self::default())?;
        let layered = ::config::Config::builder()
            .add_source(::config::File::from_str(
                &defaults,
                ::config::FileFormat::Toml,
            ))
            .add_source(::config::File::from(path.as_ref()).required(false))
            .add_source(
                ::config::Environment::with_prefix("DUALPOV")
                    .prefix_separator("__")
                    .separator("__"),
            )
            .build()?;

        let config: DualPovConfig = layered.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to TOML file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let toml_string = toml::to_string_pretty(self)?;
        fs::write(path, toml_string)?;

        log::info!("Saved configuration to {:?}", path);
        Ok(())
    }

    /// Get default config file path
    pub fn default_path() -> PathBuf {
        PathBuf::from("dualpov.toml")
    }

    /// Load from default location or fall back to defaults
    pub fn load_or_default() -> Self {
        Self::load_layered(Self::default_path()).unwrap_or_else(|e| {
            log::warn!("Failed to load config, using defaults: {}", e);
            Self::default()
        })
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), ConfigError> {
        let rec = &self.recording;
        if rec.short_duration_secs == 0 || rec.long_duration_secs == 0 {
            return Err(ConfigError::Invalid(
                "recording durations must be at least 1 second".to_string(),
            ));
        }
        if rec.short_duration_secs > rec.long_duration_secs {
            return Err(ConfigError::Invalid(
                "short preset must not be longer than long preset".to_string(),
            ));
        }
        if rec.progress_interval_ms == 0 || rec.progress_interval_ms > 1000 {
            return Err(ConfigError::Invalid(
                "progress interval must be between 1 and 1000 ms".to_string(),
            ));
        }
        if rec.file_extension.is_empty() {
            return Err(ConfigError::Invalid("file extension is empty".to_string()));
        }

        let comp = &self.composition;
        if !(comp.inset_scale > 0.0 && comp.inset_scale <= 1.0) {
            return Err(ConfigError::Invalid(
                "inset scale must be in (0.0, 1.0]".to_string(),
            ));
        }
        if comp.inset_margin < 0.0 {
            return Err(ConfigError::Invalid("inset margin is negative".to_string()));
        }

        if self.storage.thumbnail_width == 0 || self.storage.thumbnail_width > 4096 {
            return Err(ConfigError::Invalid(
                "thumbnail width must be between 1 and 4096".to_string(),
            ));
        }
        let working = resolve_path(&self.storage.working_directory);
        if working.starts_with(resolve_path(&std::env::temp_dir())) {
            return Err(ConfigError::Invalid(
                "working directory must be app-private, not inside the shared temp dir".to_string(),
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = DualPovConfig::default();
        assert_eq!(config.recording.short_duration_secs, 15);
        assert_eq!(config.recording.progress_interval(), Duration::from_millis(100));
        assert!(config.capture.mirror_front);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation() {
        let mut bad = DualPovConfig::default();
        bad.recording.short_duration_secs = 60;
        assert!(bad.validate().is_err());

        let mut bad = DualPovConfig::default();
        bad.composition.inset_scale = 1.5;
        assert!(bad.validate().is_err());

        let mut bad = DualPovConfig::default();
        bad.storage.working_directory = std::env::temp_dir();
        assert!(bad.validate().is_err());
    }

    #[test]
    fn test_working_directory_inside_temp_dir_rejected() {
        let mut bad = DualPovConfig::default();
        bad.storage.working_directory = std::env::temp_dir().join("dualpov").join("work");
        assert!(bad.validate().is_err());

        // Existing subdirectory, reached through a non-canonical path
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("nested")).unwrap();
        bad.storage.working_directory = dir.path().join("nested").join("..").join("work");
        assert!(bad.validate().is_err());

        let mut good = DualPovConfig::default();
        good.storage.working_directory = PathBuf::from("/var/lib/dualpov-work");
        assert!(good.validate().is_ok());
    }

    #[test]
    fn test_config_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dualpov.toml");

        let mut config = DualPovConfig::default();
        config.recording.long_duration_secs = 45;
        config.save_to_file(&path).unwrap();

        let loaded = DualPovConfig::load_from_file(&path).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_config_toml_format() {
        let toml_string = toml::to_string_pretty(&DualPovConfig::default()).unwrap();
        assert!(toml_string.contains("[capture]"));
        assert!(toml_string.contains("[recording]"));
        assert!(toml_string.contains("[composition]"));
        assert!(toml_string.contains("[storage]"));
        assert!(toml_string.contains("short_duration_secs"));
    }

    #[test]
    fn test_load_nonexistent_file() {
        let loaded = DualPovConfig::load_from_file("nonexistent_dualpov.toml").unwrap();
        assert_eq!(loaded.recording.short_duration_secs, 15);
    }

    #[test]
    fn test_layered_file_overrides_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("layered.toml");
        fs::write(&path, "[recording]\nlong_duration_secs = 50\n").unwrap();

        let loaded = DualPovConfig::load_layered(&path).unwrap();
        assert_eq!(loaded.recording.long_duration_secs, 50);
        assert_eq!(loaded.recording.short_duration_secs, 15);
    }
}
