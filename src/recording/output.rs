//! Encoded movie-file outputs and the backend that hosts them

use super::config::EncoderSettings;
use super::encoder::mirror_horizontal;
use super::recorder::MovieWriter;
use super::source::SourceKind;
#[cfg(feature = "audio")]
use super::audio_track::{AudioTrack, SharedAudio};
#[cfg(feature = "audio")]
use crate::audio::{AudioFeed, AudioSourceKind};
use crate::errors::BackendError;
use crate::permissions::MediaKind;
use crate::session::{
    CaptureBackend, CompletionHandle, Connection, FinishedRecording, InputDevice, InputKind,
    MovieFileOutput, OutputId, SessionGraph,
};
use crate::types::{CameraPosition, RgbFrame, Size};
use image::{imageops, RgbImage};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;

/// What the backend wires into an output on commit
#[derive(Debug, Clone, Default)]
struct OutputWiring {
    device_id: Option<String>,
    mirrored: bool,
    /// The microphone is connected to this output
    audio: bool,
}

/// Movie-file output that encodes frames on a dedicated writer thread.
///
/// `start_recording` returns as soon as the writer thread is spawned; the
/// camera and file are opened on that thread and any failure to open them
/// arrives through the completion handle. With the `audio` feature the
/// shared microphone is muxed when it is connected to this output.
pub struct EncodedMovieOutput {
    position: CameraPosition,
    settings: EncoderSettings,
    source: SourceKind,
    wiring: Mutex<OutputWiring>,
    recording: Arc<AtomicBool>,
    stop: Mutex<Option<Arc<AtomicBool>>>,
    worker: Mutex<Option<JoinHandle<()>>>,
    #[cfg(feature = "audio")]
    audio: SharedAudio,
}

impl EncodedMovieOutput {
    pub fn new(position: CameraPosition, settings: EncoderSettings, source: SourceKind) -> Self {
        Self {
            position,
            settings,
            source,
            wiring: Mutex::new(OutputWiring::default()),
            recording: Arc::new(AtomicBool::new(false)),
            stop: Mutex::new(None),
            worker: Mutex::new(None),
            #[cfg(feature = "audio")]
            audio: SharedAudio::default(),
        }
    }

    #[cfg(feature = "audio")]
    fn with_audio(mut self, audio: SharedAudio) -> Self {
        self.audio = audio;
        self
    }

    fn wire(&self, wiring: OutputWiring) {
        *self.wiring.lock().unwrap_or_else(|e| e.into_inner()) = wiring;
    }

    /// Whether the microphone is connected to this output
    pub fn has_audio_connection(&self) -> bool {
        self.wiring.lock().unwrap_or_else(|e| e.into_inner()).audio
    }

    pub fn is_mirrored(&self) -> bool {
        self.wiring.lock().unwrap_or_else(|e| e.into_inner()).mirrored
    }

    pub fn device_id(&self) -> Option<String> {
        self.wiring
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .device_id
            .clone()
    }
}

impl MovieFileOutput for EncodedMovieOutput {
    fn position(&self) -> CameraPosition {
        self.position
    }

    fn start_recording(&self, destination: &Path, completion: CompletionHandle) -> Result<(), BackendError> {
        if self.recording.swap(true, Ordering::SeqCst) {
            return Err(BackendError::new(format!(
                "{} output is already recording",
                self.position
            )));
        }

        // The previous writer has finished once `recording` dropped back to false
        if let Some(previous) = self.worker.lock().unwrap_or_else(|e| e.into_inner()).take() {
            if previous.join().is_err() {
                log::warn!("{} writer thread panicked", self.position);
            }
        }

        let wiring = self.wiring.lock().unwrap_or_else(|e| e.into_inner()).clone();
        let stop = Arc::new(AtomicBool::new(false));
        let job = WriterJob {
            position: self.position,
            destination: destination.to_path_buf(),
            settings: self.settings.clone(),
            source: self.source,
            wiring,
            stop: stop.clone(),
            recording: self.recording.clone(),
            #[cfg(feature = "audio")]
            audio: self.audio.clone(),
        };

        let spawned = std::thread::Builder::new()
            .name(format!("dualpov-writer-{}", self.position))
            .spawn(move || job.run(completion));
        let handle = match spawned {
            Ok(handle) => handle,
            Err(e) => {
                self.recording.store(false, Ordering::SeqCst);
                return Err(BackendError::new(format!("Failed to spawn writer thread: {}", e)));
            }
        };

        *self.worker.lock().unwrap_or_else(|e| e.into_inner()) = Some(handle);
        *self.stop.lock().unwrap_or_else(|e| e.into_inner()) = Some(stop);
        log::info!("{} output recording to {}", self.position, destination.display());
        Ok(())
    }

    fn stop_recording(&self) {
        if let Some(stop) = self.stop.lock().unwrap_or_else(|e| e.into_inner()).take() {
            stop.store(true, Ordering::SeqCst);
        }
    }

    fn is_recording(&self) -> bool {
        self.recording.load(Ordering::SeqCst)
    }
}

/// State moved onto the writer thread
struct WriterJob {
    position: CameraPosition,
    destination: PathBuf,
    settings: EncoderSettings,
    source: SourceKind,
    wiring: OutputWiring,
    stop: Arc<AtomicBool>,
    recording: Arc<AtomicBool>,
    #[cfg(feature = "audio")]
    audio: SharedAudio,
}

impl WriterJob {
    fn run(self, completion: CompletionHandle) {
        let result = self.record();
        if let Err(ref e) = result {
            log::error!("{} recording failed: {}", self.position, e);
        }
        self.recording.store(false, Ordering::SeqCst);
        completion.finish(result);
    }

    fn record(&self) -> Result<FinishedRecording, BackendError> {
        let mut source = self
            .source
            .open(self.position, self.wiring.device_id.as_deref(), &self.settings)?;

        #[cfg(feature = "audio")]
        let mut audio = if self.wiring.audio {
            AudioTrack::attach(&self.audio, self.settings.audio_bitrate)?
        } else {
            None
        };
        #[cfg(feature = "audio")]
        let audio_channels = audio.as_ref().map(AudioTrack::channels);
        #[cfg(not(feature = "audio"))]
        let audio_channels = None;

        let mut writer =
            MovieWriter::create_with_audio(&self.destination, self.settings.clone(), audio_channels)?;

        let mut poster = None;
        let mut failure = None;
        loop {
            let written = source.next_frame().and_then(|mut frame| {
                if self.wiring.mirrored {
                    mirror_horizontal(&mut frame);
                }
                writer.write_frame(&frame)?;
                if poster.is_none() {
                    poster = poster_from(&frame, self.settings.poster_width);
                }
                #[cfg(feature = "audio")]
                if let Some(track) = audio.as_mut() {
                    track.pump(&mut writer)?;
                }
                Ok(())
            });
            if let Err(e) = written {
                failure = Some(e);
                break;
            }
            if self.stop.load(Ordering::SeqCst) {
                break;
            }
        }
        drop(source);

        #[cfg(feature = "audio")]
        if let (None, Some(track)) = (failure.as_ref(), audio.take()) {
            if let Err(e) = track.finish(&mut writer) {
                failure = Some(e);
            }
        }
        if let Some(e) = failure {
            return Err(e);
        }

        let stats = writer.finish()?;
        Ok(FinishedRecording {
            path: self.destination.clone(),
            duration: Duration::from_secs_f64(stats.duration_secs.max(0.0)),
            video_size: Size::new(self.settings.width as f64, self.settings.height as f64),
            has_audio: stats.audio_frames > 0,
            poster,
        })
    }
}

/// Downscale a frame to `width` pixels wide, keeping its aspect ratio
fn poster_from(frame: &RgbFrame, width: u32) -> Option<RgbFrame> {
    let image = RgbImage::from_raw(frame.width, frame.height, frame.rgb.clone())?;
    let width = width.clamp(1, frame.width);
    let height = ((frame.height as u64 * width as u64) / frame.width as u64).max(1) as u32;
    let scaled = imageops::resize(&image, width, height, imageops::FilterType::Triangle);
    Some(RgbFrame::new(width, height, scaled.into_raw()))
}

/// Capture backend whose outputs encode real MP4 files.
///
/// Cameras are not held open between recordings; each writer thread opens
/// its own frame source for the duration of a recording. The microphone is
/// opened once while the session runs and shared by both outputs.
pub struct EncodedBackend {
    settings: EncoderSettings,
    source: SourceKind,
    outputs: Mutex<HashMap<CameraPosition, Arc<EncodedMovieOutput>>>,
    running: AtomicBool,
    #[cfg(feature = "audio")]
    audio_source: Option<AudioSourceKind>,
    #[cfg(feature = "audio")]
    microphone: Mutex<Option<String>>,
    #[cfg(feature = "audio")]
    audio: SharedAudio,
}

impl EncodedBackend {
    pub fn new(settings: EncoderSettings, source: SourceKind) -> Self {
        Self {
            settings,
            source,
            outputs: Mutex::new(HashMap::new()),
            running: AtomicBool::new(false),
            #[cfg(feature = "audio")]
            audio_source: None,
            #[cfg(feature = "audio")]
            microphone: Mutex::new(None),
            #[cfg(feature = "audio")]
            audio: SharedAudio::default(),
        }
    }

    /// Mux audio from `source` into every output the microphone is
    /// connected to
    #[cfg(feature = "audio")]
    pub fn with_audio(mut self, source: AudioSourceKind) -> Self {
        self.audio_source = Some(source);
        self
    }

    /// Whether the shared microphone is open
    #[cfg(feature = "audio")]
    pub fn audio_running(&self) -> bool {
        self.audio.lock().unwrap_or_else(|e| e.into_inner()).is_some()
    }

    /// Synthetic frames; runs anywhere
    pub fn synthetic(settings: EncoderSettings) -> Self {
        Self::new(settings, SourceKind::Synthetic)
    }

    /// Physical cameras through nokhwa
    pub fn cameras(settings: EncoderSettings) -> Self {
        Self::new(settings, SourceKind::Camera)
    }

    pub fn output(&self, position: CameraPosition) -> Option<Arc<EncodedMovieOutput>> {
        self.outputs
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(&position)
            .cloned()
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }
}

impl CaptureBackend for EncodedBackend {
    fn supports_multi_cam(&self) -> bool {
        true
    }

    fn open_input(&self, device: InputDevice<'_>) -> Result<(), BackendError> {
        if let InputDevice::Camera(camera) = device {
            log::debug!("Accepted {} camera {}", camera.position, camera.id);
        }
        Ok(())
    }

    fn create_movie_output(&self, position: CameraPosition) -> Result<Arc<dyn MovieFileOutput>, BackendError> {
        if !self.settings.is_encodable() {
            return Err(BackendError::new(format!(
                "encoder cannot produce {}x{}",
                self.settings.width, self.settings.height
            )));
        }
        let output = EncodedMovieOutput::new(position, self.settings.clone(), self.source);
        #[cfg(feature = "audio")]
        let output = output.with_audio(self.audio.clone());
        let output = Arc::new(output);
        self.outputs
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(position, output.clone());
        Ok(output)
    }

    fn can_add_connection(&self, _connection: &Connection) -> Result<(), BackendError> {
        Ok(())
    }

    fn apply_configuration(&self, graph: &SessionGraph) -> Result<(), BackendError> {
        let outputs = self.outputs.lock().unwrap_or_else(|e| e.into_inner());
        for position in CameraPosition::both() {
            let Some(output) = outputs.get(&position) else {
                continue;
            };
            let connection = graph.video_connection(position);
            let device_id = connection.and_then(|c| {
                graph
                    .inputs()
                    .find(|i| i.id == c.port.input && i.kind == InputKind::Camera(position))
                    .map(|i| i.device_id.clone())
            });
            let mirrored = connection.map(|c| c.settings.mirrored).unwrap_or(false);
            let audio = graph
                .connections_to(OutputId(position))
                .any(|c| c.port.media == MediaKind::Audio);
            output.wire(OutputWiring {
                device_id,
                mirrored,
                audio,
            });
        }

        #[cfg(feature = "audio")]
        {
            let microphone = graph
                .inputs()
                .find(|i| i.kind == InputKind::Microphone)
                .map(|i| i.device_name.clone());
            *self.microphone.lock().unwrap_or_else(|e| e.into_inner()) = microphone;
        }
        Ok(())
    }

    fn start_running(&self) -> Result<(), BackendError> {
        #[cfg(feature = "audio")]
        self.open_microphone();
        self.running.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn stop_running(&self) {
        self.running.store(false, Ordering::SeqCst);
        {
            let outputs = self.outputs.lock().unwrap_or_else(|e| e.into_inner());
            for output in outputs.values() {
                output.stop_recording();
            }
        }
        #[cfg(feature = "audio")]
        if let Some(mut feed) = self.audio.lock().unwrap_or_else(|e| e.into_inner()).take() {
            feed.stop();
        }
    }
}

#[cfg(feature = "audio")]
impl EncodedBackend {
    /// Open the shared feed when a microphone is in the graph. A microphone
    /// that fails to open leaves the recordings video-only.
    fn open_microphone(&self) {
        let Some(kind) = self.audio_source else {
            return;
        };
        let Some(name) = self.microphone.lock().unwrap_or_else(|e| e.into_inner()).clone() else {
            return;
        };
        let mut shared = self.audio.lock().unwrap_or_else(|e| e.into_inner());
        if shared.is_some() {
            return;
        }
        match AudioFeed::start(kind, Some(&name), self.settings.audio_channels) {
            Ok(feed) => *shared = Some(feed),
            Err(e) => log::warn!("Recording without audio, microphone '{}' failed: {}", name, e),
        }
    }
}
