//! Encoded movie-file outputs for DualPOV
//!
//! Each camera output records on its own writer thread using:
//! - openh264 for H.264 encoding
//! - muxide for MP4 muxing
//! - the shared microphone feed for an Opus track (`audio` feature)
//!
//! The composed movie is produced by [`MovieExporter`], which decodes both
//! camera files with the mp4 demuxer and openh264's decoder, draws the front
//! layer over the back one and re-encodes through [`MovieWriter`].
//!
//! # Example
//! ```rust,ignore
//! use dualpov::recording::{EncodedBackend, EncoderSettings, EncoderQuality};
//!
//! let backend = EncodedBackend::cameras(EncoderSettings::from_quality(EncoderQuality::Medium));
//! // Hand the backend to the pipeline as its `CaptureBackend`
//! ```

#[cfg(feature = "audio")]
mod audio_track;
mod config;
mod demux;
mod encoder;
mod export;
mod output;
mod recorder;
mod source;

pub use config::{EncoderQuality, EncoderSettings, RecordingStats};
pub use demux::{opus_channels, AudioPacket, Mp4AssetLoader, Mp4AudioReader, Mp4VideoReader};
pub use encoder::{mirror_horizontal, EncodedFrame, H264Encoder};
pub use export::MovieExporter;
pub use output::{EncodedBackend, EncodedMovieOutput};
pub use recorder::MovieWriter;
pub use source::{CameraSource, FrameSource, SourceKind, SyntheticSource};
