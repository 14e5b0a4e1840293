//! Microphone feed shared by both camera outputs
//!
//! The capture runs on its own thread (cpal streams are not `Send`) and
//! publishes timestamped PCM frames to every subscriber through bounded
//! channels. A slow subscriber loses frames; it never stalls the capture or
//! the other output.

use super::clock::PTSClock;
use super::encoder::OPUS_SAMPLE_RATE;
use crate::errors::BackendError;
use crossbeam_channel::{Receiver, Sender, TrySendError};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

/// Per-subscriber backlog. At 20 ms per frame this is about five seconds.
const MAX_BUFFER_FRAMES: usize = 256;

/// Synthetic tone frame length
const TONE_FRAME: Duration = Duration::from_millis(20);

/// Interleaved f32 PCM captured at `timestamp`
#[derive(Debug, Clone)]
pub struct AudioFrame {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
    pub channels: u16,
    /// Seconds on the feed clock, or since subscribing once drained
    pub timestamp: f64,
}

/// Where the feed gets its samples from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AudioSourceKind {
    /// 440 Hz tone paced in real time
    Synthetic,
    /// Input device opened through cpal
    Microphone,
}

type Subscribers = Arc<Mutex<Vec<Sender<AudioFrame>>>>;

fn publish(subscribers: &Subscribers, frame: AudioFrame) {
    let mut subscribers = subscribers.lock().unwrap_or_else(|e| e.into_inner());
    subscribers.retain(|tx| !matches!(tx.try_send(frame.clone()), Err(TrySendError::Disconnected(_))));
}

/// Frames published after `subscribe`, rebased to the subscription time
pub struct AudioSubscription {
    receiver: Receiver<AudioFrame>,
    start_pts: f64,
}

impl AudioSubscription {
    /// Everything buffered so far, without blocking
    pub fn drain(&self) -> Vec<AudioFrame> {
        self.receiver
            .try_iter()
            .filter(|frame| frame.timestamp >= self.start_pts)
            .map(|mut frame| {
                frame.timestamp -= self.start_pts;
                frame
            })
            .collect()
    }
}

/// A running audio capture
pub struct AudioFeed {
    kind: AudioSourceKind,
    channels: u16,
    clock: PTSClock,
    subscribers: Subscribers,
    stop: Option<mpsc::Sender<()>>,
    worker: Option<JoinHandle<()>>,
}

impl AudioFeed {
    /// Open the source and start publishing. Blocks until the source is open.
    pub fn start(kind: AudioSourceKind, device_name: Option<&str>, channels: u16) -> Result<Self, BackendError> {
        let clock = PTSClock::new();
        let subscribers: Subscribers = Arc::new(Mutex::new(Vec::new()));
        let (stop_tx, stop_rx) = mpsc::channel();
        let (ready_tx, ready_rx) = mpsc::channel();

        let worker_clock = clock.clone();
        let worker_subscribers = subscribers.clone();
        let device_name = device_name.map(str::to_string);
        let worker = std::thread::Builder::new()
            .name("dualpov-audio".to_string())
            .spawn(move || match kind {
                AudioSourceKind::Synthetic => {
                    let _ = ready_tx.send(Ok(()));
                    run_tone(channels, worker_clock, worker_subscribers, stop_rx);
                }
                AudioSourceKind::Microphone => run_microphone(
                    device_name.as_deref(),
                    channels,
                    worker_clock,
                    worker_subscribers,
                    stop_rx,
                    ready_tx,
                ),
            })
            .map_err(|e| BackendError::new(format!("Failed to spawn audio thread: {}", e)))?;

        let ready = ready_rx
            .recv()
            .unwrap_or_else(|_| Err(BackendError::new("audio thread exited during startup")));
        if let Err(e) = ready {
            let _ = worker.join();
            return Err(e);
        }

        log::info!("Audio feed started ({:?}, {} ch)", kind, channels);
        Ok(Self {
            kind,
            channels,
            clock,
            subscribers,
            stop: Some(stop_tx),
            worker: Some(worker),
        })
    }

    pub fn kind(&self) -> AudioSourceKind {
        self.kind
    }

    pub fn channels(&self) -> u16 {
        self.channels
    }

    pub fn sample_rate(&self) -> u32 {
        OPUS_SAMPLE_RATE
    }

    pub fn subscribe(&self) -> AudioSubscription {
        let (tx, rx) = crossbeam_channel::bounded(MAX_BUFFER_FRAMES);
        self.subscribers
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(tx);
        AudioSubscription {
            receiver: rx,
            start_pts: self.clock.pts(),
        }
    }

    /// Stop publishing and join the capture thread (idempotent)
    pub fn stop(&mut self) {
        drop(self.stop.take());
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                log::warn!("Audio capture thread panicked");
            }
            log::info!("Audio feed stopped");
        }
    }
}

impl Drop for AudioFeed {
    fn drop(&mut self) {
        self.stop();
    }
}

fn run_tone(channels: u16, clock: PTSClock, subscribers: Subscribers, stop: mpsc::Receiver<()>) {
    let frame_samples = (OPUS_SAMPLE_RATE as u64 * TONE_FRAME.as_millis() as u64 / 1000) as usize;
    let step = 2.0 * std::f32::consts::PI * 440.0 / OPUS_SAMPLE_RATE as f32;
    let mut phase = 0.0f32;
    let mut due = Instant::now();

    loop {
        let mut samples = Vec::with_capacity(frame_samples * channels as usize);
        for _ in 0..frame_samples {
            let value = phase.sin() * 0.2;
            samples.extend(std::iter::repeat(value).take(channels as usize));
            phase = (phase + step) % (2.0 * std::f32::consts::PI);
        }
        publish(
            &subscribers,
            AudioFrame {
                samples,
                sample_rate: OPUS_SAMPLE_RATE,
                channels,
                timestamp: clock.pts(),
            },
        );

        due += TONE_FRAME;
        match stop.recv_timeout(due.saturating_duration_since(Instant::now())) {
            Err(RecvTimeoutError::Timeout) => continue,
            _ => break,
        }
    }
}

fn run_microphone(
    device_name: Option<&str>,
    channels: u16,
    clock: PTSClock,
    subscribers: Subscribers,
    stop: mpsc::Receiver<()>,
    ready: mpsc::Sender<Result<(), BackendError>>,
) {
    use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};

    let opened = (|| -> Result<cpal::Stream, BackendError> {
        let host = cpal::default_host();
        let named = match device_name {
            Some(name) => host
                .input_devices()
                .map_err(|e| BackendError::new(format!("Failed to enumerate audio devices: {}", e)))?
                .find(|d| d.name().ok().as_deref() == Some(name)),
            None => None,
        };
        let device = match named {
            Some(device) => device,
            None => {
                if let Some(name) = device_name {
                    log::warn!("Microphone '{}' not found, using the default input", name);
                }
                host.default_input_device()
                    .ok_or_else(|| BackendError::new("No default audio input device"))?
            }
        };

        let config = cpal::StreamConfig {
            channels,
            sample_rate: cpal::SampleRate(OPUS_SAMPLE_RATE),
            buffer_size: cpal::BufferSize::Default,
        };
        let stream = device
            .build_input_stream(
                &config,
                move |data: &[f32], _: &cpal::InputCallbackInfo| {
                    publish(
                        &subscribers,
                        AudioFrame {
                            samples: data.to_vec(),
                            sample_rate: OPUS_SAMPLE_RATE,
                            channels,
                            timestamp: clock.pts(),
                        },
                    );
                },
                |err| log::error!("Audio capture error: {}", err),
                None,
            )
            .map_err(|e| BackendError::new(format!("Failed to build audio stream: {}", e)))?;
        stream
            .play()
            .map_err(|e| BackendError::new(format!("Failed to start audio stream: {}", e)))?;
        Ok(stream)
    })();

    let stream = match opened {
        Ok(stream) => stream,
        Err(e) => {
            let _ = ready.send(Err(e));
            return;
        }
    };
    let _ = ready.send(Ok(()));

    // Returns on stop or when the feed is dropped
    let _ = stop.recv();
    if let Err(e) = stream.pause() {
        log::warn!("Failed to pause audio stream: {}", e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tone_reaches_every_subscriber() {
        let mut feed = AudioFeed::start(AudioSourceKind::Synthetic, None, 1).unwrap();
        let first = feed.subscribe();
        let second = feed.subscribe();
        std::thread::sleep(Duration::from_millis(120));
        feed.stop();

        let a = first.drain();
        let b = second.drain();
        assert!(a.len() >= 3, "expected several frames, got {}", a.len());
        assert_eq!(a.len(), b.len());
        assert!(a.iter().all(|f| f.sample_rate == OPUS_SAMPLE_RATE && f.channels == 1));
        assert!(a.windows(2).all(|w| w[0].timestamp <= w[1].timestamp));
    }

    #[test]
    fn test_late_subscriber_starts_near_zero() {
        let feed = AudioFeed::start(AudioSourceKind::Synthetic, None, 2).unwrap();
        std::thread::sleep(Duration::from_millis(60));
        let late = feed.subscribe();
        std::thread::sleep(Duration::from_millis(60));

        let frames = late.drain();
        assert!(!frames.is_empty());
        assert!(frames[0].timestamp < 0.05, "first frame at {}", frames[0].timestamp);
        assert_eq!(frames[0].samples.len() % 2, 0);
    }

    #[test]
    fn test_dropped_subscriber_is_pruned() {
        let feed = AudioFeed::start(AudioSourceKind::Synthetic, None, 1).unwrap();
        drop(feed.subscribe());
        std::thread::sleep(Duration::from_millis(50));
        assert!(feed.subscribers.lock().unwrap().is_empty());
    }
}
