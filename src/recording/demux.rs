//! Reading back the MP4 files the outputs write
//!
//! `Mp4AssetLoader` reads track metadata from the file header;
//! `Mp4VideoReader` decodes the H.264 track to RGB frames and
//! `Mp4AudioReader` hands out the Opus packets untouched.

use crate::composition::{AffineTransform, AssetLoader, AssetTrack, MediaAsset, TrackKind};
use crate::errors::CompositionError;
use crate::types::{RgbFrame, Size};
use mp4::{Mp4Reader, TrackType};
use openh264::decoder::Decoder;
use openh264::formats::YUVSource;
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::time::Duration;

const ANNEX_B_START: [u8; 4] = [0, 0, 0, 1];

/// Extensions the muxer output is known by
const MOVIE_EXTENSIONS: [&str; 3] = ["mp4", "m4v", "mov"];

fn extraction(path: &Path, reason: impl Into<String>) -> CompositionError {
    CompositionError::TrackExtraction {
        path: path.to_path_buf(),
        reason: reason.into(),
    }
}

fn open_reader(path: &Path) -> Result<Mp4Reader<BufReader<File>>, CompositionError> {
    let file = File::open(path).map_err(|e| extraction(path, e.to_string()))?;
    let size = file
        .metadata()
        .map_err(|e| extraction(path, e.to_string()))?
        .len();
    Mp4Reader::read_header(BufReader::new(file), size).map_err(|e| extraction(path, e.to_string()))
}

/// Loads track metadata straight from the MP4 header
#[derive(Debug, Default, Clone)]
pub struct Mp4AssetLoader;

impl Mp4AssetLoader {
    pub fn new() -> Self {
        Self
    }

    fn is_supported(path: &Path) -> bool {
        path.extension()
            .and_then(|e| e.to_str())
            .map(|e| MOVIE_EXTENSIONS.contains(&e.to_lowercase().as_str()))
            .unwrap_or(false)
    }
}

impl AssetLoader for Mp4AssetLoader {
    fn load(&self, path: &Path) -> Result<MediaAsset, CompositionError> {
        if !Self::is_supported(path) {
            return Err(CompositionError::UnknownAssetFormat(path.to_path_buf()));
        }
        if !path.exists() {
            return Err(extraction(path, "file not found"));
        }

        let reader = open_reader(path)?;
        let mut tracks: Vec<AssetTrack> = reader
            .tracks()
            .values()
            .filter_map(|track| {
                let kind = match track.track_type() {
                    Ok(TrackType::Video) => TrackKind::Video,
                    Ok(TrackType::Audio) => TrackKind::Audio,
                    _ => return None,
                };
                let natural_size = (kind == TrackKind::Video)
                    .then(|| Size::new(track.width() as f64, track.height() as f64));
                Some(AssetTrack {
                    track_id: track.track_id(),
                    kind,
                    duration: track.duration(),
                    natural_size,
                    preferred_transform: AffineTransform::identity(),
                })
            })
            .collect();
        tracks.sort_by_key(|t| t.track_id);

        // mvhd can be zero when the muxer skipped it; fall back to the tracks
        let duration = match reader.duration() {
            d if !d.is_zero() => d,
            _ => tracks
                .iter()
                .map(|t| t.duration)
                .max()
                .unwrap_or(Duration::ZERO),
        };

        log::debug!(
            "Loaded {} ({} tracks, {:.2}s)",
            path.display(),
            tracks.len(),
            duration.as_secs_f64()
        );
        Ok(MediaAsset {
            path: path.to_path_buf(),
            duration,
            tracks,
        })
    }
}

/// Decodes one H.264 track to RGB frames in presentation order
pub struct Mp4VideoReader {
    path: PathBuf,
    reader: Mp4Reader<BufReader<File>>,
    decoder: Decoder,
    track_id: u32,
    timescale: u32,
    sample_count: u32,
    next_sample: u32,
    parameter_sets: Vec<u8>,
    size: (u32, u32),
}

impl Mp4VideoReader {
    pub fn open(path: &Path, track_id: u32) -> Result<Self, CompositionError> {
        let reader = open_reader(path)?;
        let track = reader
            .tracks()
            .get(&track_id)
            .ok_or_else(|| extraction(path, format!("no track {}", track_id)))?;
        if !matches!(track.track_type(), Ok(TrackType::Video)) {
            return Err(extraction(path, format!("track {} is not video", track_id)));
        }

        let mut parameter_sets = Vec::new();
        for set in [track.sequence_parameter_set(), track.picture_parameter_set()] {
            let set = set.map_err(|e| extraction(path, e.to_string()))?;
            parameter_sets.extend_from_slice(&ANNEX_B_START);
            parameter_sets.extend_from_slice(set);
        }

        let timescale = track.timescale().max(1);
        let sample_count = track.sample_count();
        let size = (track.width() as u32, track.height() as u32);
        let decoder = Decoder::new()
            .map_err(|e| extraction(path, format!("Failed to create decoder: {}", e)))?;

        Ok(Self {
            path: path.to_path_buf(),
            reader,
            decoder,
            track_id,
            timescale,
            sample_count,
            next_sample: 1,
            parameter_sets,
            size,
        })
    }

    /// Coded frame size from the track header
    pub fn size(&self) -> (u32, u32) {
        self.size
    }

    /// Next decoded frame and its presentation time, `None` at end of track
    pub fn next_frame(&mut self) -> Result<Option<(Duration, RgbFrame)>, CompositionError> {
        while self.next_sample <= self.sample_count {
            let sample_id = self.next_sample;
            self.next_sample += 1;

            let sample = self
                .reader
                .read_sample(self.track_id, sample_id)
                .map_err(|e| extraction(&self.path, e.to_string()))?;
            let Some(sample) = sample else {
                continue;
            };

            let mut packet = Vec::with_capacity(sample.bytes.len() + self.parameter_sets.len());
            if sample.is_sync {
                packet.extend_from_slice(&self.parameter_sets);
            }
            avcc_to_annex_b(&sample.bytes, &mut packet)
                .ok_or_else(|| extraction(&self.path, format!("sample {} is truncated", sample_id)))?;

            let decoded = self
                .decoder
                .decode(&packet)
                .map_err(|e| extraction(&self.path, format!("decode failed: {}", e)))?;
            let Some(yuv) = decoded else {
                continue;
            };

            let (width, height) = yuv.dimensions();
            let mut rgb = vec![0u8; width * height * 3];
            yuv.write_rgb8(&mut rgb);

            let ticks = (sample.start_time as i64 + sample.rendering_offset as i64).max(0) as u64;
            let pts = Duration::from_secs_f64(ticks as f64 / self.timescale as f64);
            return Ok(Some((pts, RgbFrame::new(width as u32, height as u32, rgb))));
        }
        Ok(None)
    }
}

/// Rewrite 4-byte length-prefixed NAL units with start codes. `None` when
/// a length runs past the sample.
fn avcc_to_annex_b(sample: &[u8], out: &mut Vec<u8>) -> Option<()> {
    let mut rest = sample;
    while !rest.is_empty() {
        let (len, body) = rest.split_at_checked(4)?;
        let len = u32::from_be_bytes([len[0], len[1], len[2], len[3]]) as usize;
        let (nal, tail) = body.split_at_checked(len)?;
        out.extend_from_slice(&ANNEX_B_START);
        out.extend_from_slice(nal);
        rest = tail;
    }
    Some(())
}

/// Opus packet with its presentation time
#[derive(Debug, Clone)]
pub struct AudioPacket {
    pub pts: Duration,
    pub data: Vec<u8>,
}

/// Reads one audio track's packets in order without decoding them
pub struct Mp4AudioReader {
    path: PathBuf,
    reader: Mp4Reader<BufReader<File>>,
    track_id: u32,
    timescale: u32,
    sample_count: u32,
    next_sample: u32,
}

impl Mp4AudioReader {
    pub fn open(path: &Path, track_id: u32) -> Result<Self, CompositionError> {
        let reader = open_reader(path)?;
        let track = reader
            .tracks()
            .get(&track_id)
            .ok_or_else(|| extraction(path, format!("no track {}", track_id)))?;
        if !matches!(track.track_type(), Ok(TrackType::Audio)) {
            return Err(extraction(path, format!("track {} is not audio", track_id)));
        }
        let timescale = track.timescale().max(1);
        let sample_count = track.sample_count();
        Ok(Self {
            path: path.to_path_buf(),
            reader,
            track_id,
            timescale,
            sample_count,
            next_sample: 1,
        })
    }

    pub fn next_packet(&mut self) -> Result<Option<AudioPacket>, CompositionError> {
        while self.next_sample <= self.sample_count {
            let sample_id = self.next_sample;
            self.next_sample += 1;
            let sample = self
                .reader
                .read_sample(self.track_id, sample_id)
                .map_err(|e| extraction(&self.path, e.to_string()))?;
            if let Some(sample) = sample {
                return Ok(Some(AudioPacket {
                    pts: Duration::from_secs_f64(sample.start_time as f64 / self.timescale as f64),
                    data: sample.bytes.to_vec(),
                }));
            }
        }
        Ok(None)
    }
}

/// Channel count from an Opus packet's TOC byte (RFC 6716 section 3.1)
pub fn opus_channels(packet: &[u8]) -> Option<u16> {
    packet.first().map(|toc| if toc & 0x04 != 0 { 2 } else { 1 })
}
