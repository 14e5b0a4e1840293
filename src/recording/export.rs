//! Renders a composition plan into one H.264/MP4 file

use super::config::EncoderSettings;
use super::demux::{opus_channels, AudioPacket, Mp4AudioReader, Mp4VideoReader};
use super::recorder::MovieWriter;
use crate::composition::{
    compose_poster, AssetExporter, CompositionPlan, CompositionTrack, ExportRequest, TrackSlot,
};
use crate::errors::CompositionError;
use crate::types::{RgbFrame, Size};
use image::{imageops, RgbImage};
use std::fs;
use std::time::Duration;

/// Decodes both camera files over the plan's time range, draws the front
/// layer over the back one frame by frame and encodes the result. Audio
/// from track C is copied without re-encoding.
#[derive(Debug, Clone)]
pub struct MovieExporter {
    settings: EncoderSettings,
}

impl MovieExporter {
    /// Frame rate, title and fallback bitrate come from `settings`; the
    /// canvas size comes from each plan
    pub fn new(settings: EncoderSettings) -> Self {
        Self { settings }
    }

    fn output_settings(&self, request: &ExportRequest) -> EncoderSettings {
        let canvas = request.plan.render.canvas;
        let mut settings = self.settings.clone();
        settings.width = even(canvas.width);
        settings.height = even(canvas.height);
        if let Some(kbps) = request.preset.bitrate_kbps() {
            settings.bitrate = kbps * 1000;
        }
        settings
    }
}

impl Default for MovieExporter {
    fn default() -> Self {
        Self::new(EncoderSettings::default())
    }
}

fn even(value: f64) -> u32 {
    (value.max(0.0) as u32) & !1
}

fn export_error(message: impl Into<String>) -> CompositionError {
    CompositionError::Export(message.into())
}

fn video_track(plan: &CompositionPlan, slot: TrackSlot) -> Result<&CompositionTrack, CompositionError> {
    plan.track(slot)
        .ok_or_else(|| export_error(format!("plan has no track {:?}", slot)))
}

/// Holds the latest decoded frame at or before the render time
struct HeldVideo {
    reader: Mp4VideoReader,
    current: Option<RgbFrame>,
    upcoming: Option<(Duration, RgbFrame)>,
}

impl HeldVideo {
    fn new(mut reader: Mp4VideoReader) -> Result<Self, CompositionError> {
        let upcoming = reader.next_frame()?;
        Ok(Self {
            reader,
            current: None,
            upcoming,
        })
    }

    /// The first frame stands in for any time before it
    fn frame_at(&mut self, at: Duration) -> Result<Option<&RgbFrame>, CompositionError> {
        loop {
            let due = match &self.upcoming {
                Some((pts, _)) => *pts <= at || self.current.is_none(),
                None => false,
            };
            if !due {
                break;
            }
            if let Some((_, frame)) = self.upcoming.take() {
                self.current = Some(frame);
            }
            self.upcoming = self.reader.next_frame()?;
        }
        Ok(self.current.as_ref())
    }
}

/// Scale `frame` to exactly `width` x `height`
fn fit(frame: RgbFrame, width: u32, height: u32) -> Option<RgbFrame> {
    if frame.width == width && frame.height == height {
        return Some(frame);
    }
    let image = RgbImage::from_raw(frame.width, frame.height, frame.rgb)?;
    let scaled = imageops::resize(&image, width, height, imageops::FilterType::Triangle);
    Some(RgbFrame::new(width, height, scaled.into_raw()))
}

impl AssetExporter for MovieExporter {
    fn export(&self, request: &ExportRequest) -> Result<(), CompositionError> {
        let plan = &request.plan;
        let settings = self.output_settings(request);
        if !settings.is_encodable() {
            return Err(export_error(format!(
                "canvas {}x{} cannot be encoded",
                plan.render.canvas.width, plan.render.canvas.height
            )));
        }

        let back_track = video_track(plan, TrackSlot::A)?;
        let front_track = video_track(plan, TrackSlot::B)?;
        let front_layer = plan
            .render
            .layers
            .iter()
            .find(|l| l.slot == TrackSlot::B)
            .ok_or_else(|| export_error("plan has no front layer"))?;

        let mut back = HeldVideo::new(Mp4VideoReader::open(&back_track.source, back_track.source_track_id)?)?;
        let front_reader = Mp4VideoReader::open(&front_track.source, front_track.source_track_id)?;
        let (front_w, front_h) = front_reader.size();
        let front_size = Size::new(front_w as f64, front_h as f64);
        let mut front = HeldVideo::new(front_reader)?;

        let mut audio = match plan.track(TrackSlot::C) {
            Some(track) => Some(Mp4AudioReader::open(&track.source, track.source_track_id)?),
            None => None,
        };
        let mut pending_audio = match audio.as_mut() {
            Some(reader) => reader.next_packet()?,
            None => None,
        };
        let audio_channels = pending_audio.as_ref().and_then(|p| opus_channels(&p.data));

        if let Some(parent) = request.destination.parent() {
            fs::create_dir_all(parent)
                .map_err(|e| export_error(format!("cannot create {}: {}", parent.display(), e)))?;
        }
        let mut writer = MovieWriter::create_with_audio(&request.destination, settings.clone(), audio_channels)
            .map_err(|e| export_error(e.to_string()))?;

        let range = plan.render.time_range;
        let frame_interval = settings.frame_interval().as_secs_f64();
        let total = (range.duration.as_secs_f64() / frame_interval).ceil().max(1.0) as u64;

        for index in 0..total {
            let at = range.start + Duration::from_secs_f64(index as f64 * frame_interval);
            let Some(back_frame) = back.frame_at(at)?.cloned() else {
                break;
            };
            let composed = match front.frame_at(at)? {
                Some(front_frame) => compose_poster(
                    &back_frame,
                    front_frame,
                    plan.render.canvas,
                    front_size,
                    &front_layer.transform,
                ),
                None => Some(back_frame),
            }
            .and_then(|frame| fit(frame, settings.width, settings.height))
            .ok_or_else(|| export_error(format!("malformed frame at {:.3}s", at.as_secs_f64())))?;

            writer
                .write_frame(&composed)
                .map_err(|e| export_error(e.to_string()))?;

            // Interleave audio up to the frame just written
            while let Some(packet) = pending_audio.take_if(|p| p.pts <= at) {
                write_packet(&mut writer, &packet, range.start)?;
                pending_audio = next_packet(audio.as_mut())?;
            }
        }

        // Remaining audio inside the range
        let end = range.end();
        while let Some(packet) = pending_audio.take_if(|p| p.pts < end) {
            write_packet(&mut writer, &packet, range.start)?;
            pending_audio = next_packet(audio.as_mut())?;
        }

        let stats = writer.finish().map_err(|e| export_error(e.to_string()))?;
        log::info!(
            "Exported {} ({} frames, {} audio packets, {:.2}s, preset {})",
            request.destination.display(),
            stats.video_frames,
            stats.audio_frames,
            stats.duration_secs,
            request.preset.as_str()
        );
        Ok(())
    }

    fn file_extension(&self) -> &str {
        "mp4"
    }
}

fn next_packet(reader: Option<&mut Mp4AudioReader>) -> Result<Option<AudioPacket>, CompositionError> {
    match reader {
        Some(reader) => reader.next_packet(),
        None => Ok(None),
    }
}

fn write_packet(writer: &mut MovieWriter, packet: &AudioPacket, start: Duration) -> Result<(), CompositionError> {
    let pts = packet.pts.saturating_sub(start).as_secs_f64();
    writer
        .write_audio(pts, &packet.data)
        .map_err(|e| export_error(e.to_string()))
}
